//! VM state management: registers, frames, staged arguments, extensions.

use eazy_common::{Instruction, Opcode, Program, Value};
use tracing::debug;

use crate::config::VmConfig;
use crate::error::Fault;
use crate::exception::{CatchFrame, ErrorKind};
use crate::extension::Extension;

/// Execution status of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Dispatching instructions.
    Running,
    /// Suspended by `break`; continue with [`Machine::resume`].
    Paused,
    /// Finished by `stop`.
    Stopped,
    /// An error was raised and no catch frame remains to handle it.
    Errored,
}

/// A call frame: where to go back to, and the caller's frame base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    pub return_address: usize,
    pub frame_base: usize,
}

/// A point-in-time copy of the observable machine state.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub isr: usize,
    pub vsr: usize,
    pub status: Status,
    pub var_stack: Vec<Value>,
    pub error_stack: Vec<Value>,
    pub call_depth: usize,
    pub catch_depth: usize,
}

impl Snapshot {
    /// The registers of the current frame, `r0` first.
    pub fn frame(&self) -> &[Value] {
        &self.var_stack[self.vsr.min(self.var_stack.len())..]
    }
}

/// The eazy virtual machine.
pub struct Machine {
    /// Instruction words. Append-only once execution starts.
    pub(crate) code: Vec<u32>,
    pub(crate) constants: Vec<Value>,
    /// Every frame's registers, caller frames below callee frames.
    pub(crate) var_stack: Vec<Value>,
    pub(crate) call_stack: Vec<CallFrame>,
    /// Arguments staged by `push_arg` for the next call.
    pub(crate) arg_stack: Vec<Value>,
    /// Captures staged by `push_env` for the next `closure`.
    pub(crate) env_stack: Vec<Value>,
    pub(crate) error_stack: Vec<Value>,
    pub(crate) catch_stack: Vec<CatchFrame>,
    /// Address of the next instruction.
    pub(crate) isr: usize,
    /// Index of `r0` of the current frame in `var_stack`.
    pub(crate) vsr: usize,
    pub(crate) status: Status,
    pub(crate) config: VmConfig,
    pub(crate) extensions: Vec<Box<dyn Extension>>,
    /// Set once a fault aborts the run.
    pub(crate) aborted: bool,
    /// Address of the instruction being executed.
    pub(crate) at: usize,
    /// Opcode of the instruction being executed.
    pub(crate) opcode: Opcode,
}

impl Machine {
    /// Create a machine ready to run `program` from its entry address.
    pub fn new(program: Program) -> Self {
        Self::with_config(program, VmConfig::default())
    }

    /// Create a machine with explicit resource limits.
    pub fn with_config(program: Program, config: VmConfig) -> Self {
        Self {
            code: program.code,
            constants: program.constants,
            var_stack: Vec::new(),
            call_stack: Vec::new(),
            arg_stack: Vec::new(),
            env_stack: Vec::new(),
            error_stack: Vec::new(),
            catch_stack: Vec::new(),
            isr: program.entry,
            vsr: 0,
            status: Status::Running,
            config,
            extensions: Vec::new(),
            aborted: false,
            at: program.entry,
            opcode: Opcode::Stop,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// The most recently raised error still on the error stack.
    pub fn last_error(&self) -> Option<&Value> {
        self.error_stack.last()
    }

    /// Copy out the observable state.
    pub fn inspect(&self) -> Snapshot {
        Snapshot {
            isr: self.isr,
            vsr: self.vsr,
            status: self.status,
            var_stack: self.var_stack.clone(),
            error_stack: self.error_stack.clone(),
            call_depth: self.call_stack.len(),
            catch_depth: self.catch_stack.len(),
        }
    }

    /// Append encoded words to the code and return the address of the first.
    ///
    /// Existing addresses stay valid, so this is safe between a pause and
    /// a resume.
    pub fn append_code(&mut self, words: &[u32]) -> usize {
        let start = self.code.len();
        self.code.extend_from_slice(words);
        debug!(start, count = words.len(), "appended code");
        start
    }

    /// Encode and append instructions. See [`Machine::append_code`].
    pub fn append_instructions(
        &mut self,
        instructions: &[Instruction],
    ) -> Result<usize, eazy_common::EncodingError> {
        let words = instructions
            .iter()
            .map(Instruction::encode)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.append_code(&words))
    }

    /// Register a host extension and return the id `call_extension` uses.
    pub fn register_extension(&mut self, extension: impl Extension + 'static) -> u32 {
        let id = self.extensions.len() as u32;
        self.extensions.push(Box::new(extension));
        debug!(id, "registered extension");
        id
    }

    // ---- registers ----

    /// Resolve register `x` of the current frame to a `var_stack` index.
    pub(crate) fn slot(&self, x: u8) -> Result<usize, Fault> {
        let index = self.vsr + x as usize;
        if index < self.var_stack.len() {
            Ok(index)
        } else {
            Err(Fault::RegisterOutOfRange {
                at: self.at,
                opcode: self.opcode,
                register: x,
                frame_size: self.var_stack.len().saturating_sub(self.vsr),
            })
        }
    }

    /// Read register `x`.
    pub(crate) fn reg(&self, x: u8) -> Result<Value, Fault> {
        let index = self.slot(x)?;
        Ok(self.var_stack[index].clone())
    }

    /// Write register `x`.
    pub(crate) fn set_reg(&mut self, x: u8, value: Value) -> Result<(), Fault> {
        let index = self.slot(x)?;
        self.var_stack[index] = value;
        Ok(())
    }

    // ---- frames ----

    /// Raise `StackOverflow` and return false if `additional` more registers
    /// would exceed the configured limit.
    pub(crate) fn reserve(&mut self, additional: usize) -> bool {
        let wanted = self.var_stack.len().saturating_add(additional);
        if wanted <= self.config.max_registers {
            return true;
        }
        self.raise_error(
            ErrorKind::StackOverflow,
            format!("register limit of {} exceeded", self.config.max_registers),
            "requested",
            Value::Number(wanted as f64),
        );
        false
    }

    /// Append `count` Nothing registers to the current frame.
    pub(crate) fn grow_frame(&mut self, count: usize) {
        if self.reserve(count) {
            let len = self.var_stack.len() + count;
            self.var_stack.resize(len, Value::Nothing);
        }
    }

    /// Make the current frame exactly `size` registers.
    pub(crate) fn resize_frame(&mut self, size: usize) {
        let current = self.var_stack.len() - self.vsr;
        if size <= current || self.reserve(size - current) {
            self.var_stack.resize(self.vsr + size, Value::Nothing);
        }
    }

    /// Append a value as the next register of the current frame.
    pub(crate) fn push_register(&mut self, value: Value) {
        if self.reserve(1) {
            self.var_stack.push(value);
        }
    }

    /// Stage an argument for the next call.
    pub(crate) fn stage_argument(&mut self, value: Value) {
        self.arg_stack.push(value);
    }

    /// Check that `target` addresses an instruction.
    pub(crate) fn check_target(&self, target: usize) -> Result<(), Fault> {
        if target < self.code.len() {
            Ok(())
        } else {
            Err(Fault::TargetOutOfRange {
                at: self.at,
                opcode: self.opcode,
                target,
                len: self.code.len(),
            })
        }
    }

    /// Enter a new frame at `target`.
    ///
    /// The callee's registers start with `environment`, followed by the
    /// staged arguments in push order. The caller's registers are left
    /// untouched below the new frame base.
    pub(crate) fn push_call(&mut self, target: usize, environment: &[Value]) -> Result<(), Fault> {
        self.check_target(target)?;
        if self.call_stack.len() >= self.config.max_call_depth {
            self.raise_error(
                ErrorKind::StackOverflow,
                format!("maximum call depth of {} exceeded", self.config.max_call_depth),
                "depth",
                Value::Number(self.call_stack.len() as f64),
            );
            return Ok(());
        }
        if !self.reserve(environment.len() + self.arg_stack.len()) {
            return Ok(());
        }

        self.call_stack.push(CallFrame {
            return_address: self.isr,
            frame_base: self.vsr,
        });
        self.vsr = self.var_stack.len();
        self.var_stack.extend(environment.iter().cloned());
        self.var_stack.append(&mut self.arg_stack);
        self.isr = target;
        debug!(
            target,
            depth = self.call_stack.len(),
            frame_base = self.vsr,
            "call"
        );
        Ok(())
    }

    /// Leave the current frame, handing `result` to the caller.
    ///
    /// The callee's registers are discarded and `result` becomes the
    /// caller's next register. Catch frames registered inside the callee
    /// are dropped with it.
    pub(crate) fn pop_call(&mut self, result: Value) -> Result<(), Fault> {
        let frame = self.call_stack.pop().ok_or(Fault::CallStackUnderflow {
            at: self.at,
            opcode: self.opcode,
        })?;
        self.var_stack.truncate(self.vsr);
        self.var_stack.push(result);
        self.vsr = frame.frame_base;
        self.isr = frame.return_address;
        let depth = self.call_stack.len();
        self.catch_stack.retain(|catch| catch.call_stack_length <= depth);
        debug!(return_address = frame.return_address, depth, "return");
        Ok(())
    }

    /// Fetch and decode the instruction at `isr`.
    pub(crate) fn fetch(&self) -> Result<Instruction, Fault> {
        let word = *self.code.get(self.isr).ok_or(Fault::CodeOutOfRange {
            at: self.isr,
            len: self.code.len(),
        })?;
        Instruction::decode(word).map_err(|source| Fault::Decode {
            at: self.isr,
            word,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> Machine {
        Machine::new(Program::new(vec![0x01, 0x01, 0x01], vec![]))
    }

    #[test]
    fn new_machine_state() {
        let vm = machine();
        let snapshot = vm.inspect();
        assert_eq!(snapshot.isr, 0);
        assert_eq!(snapshot.vsr, 0);
        assert_eq!(snapshot.status, Status::Running);
        assert!(snapshot.var_stack.is_empty());
        assert_eq!(snapshot.call_depth, 0);
    }

    #[test]
    fn registers_are_frame_relative() {
        let mut vm = machine();
        vm.grow_frame(2);
        vm.set_reg(1, Value::Number(7.0)).unwrap();
        assert_eq!(vm.reg(1).unwrap(), Value::Number(7.0));
        assert!(matches!(
            vm.reg(2),
            Err(Fault::RegisterOutOfRange {
                register: 2,
                frame_size: 2,
                ..
            })
        ));
    }

    #[test]
    fn call_seeds_frame_and_return_restores() {
        let mut vm = machine();
        vm.grow_frame(1);
        vm.stage_argument(Value::Number(1.0));
        vm.stage_argument(Value::Number(2.0));
        vm.isr = 1;
        vm.push_call(2, &[Value::string("env")]).unwrap();

        assert_eq!(vm.vsr, 1);
        assert_eq!(vm.isr, 2);
        assert!(vm.arg_stack.is_empty());
        assert_eq!(vm.reg(0).unwrap(), Value::string("env"));
        assert_eq!(vm.reg(1).unwrap(), Value::Number(1.0));
        assert_eq!(vm.reg(2).unwrap(), Value::Number(2.0));

        vm.pop_call(Value::Boolean(true)).unwrap();
        assert_eq!(vm.vsr, 0);
        assert_eq!(vm.isr, 1);
        assert_eq!(vm.var_stack.len(), 2);
        assert_eq!(vm.reg(1).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn call_to_missing_address_faults() {
        let mut vm = machine();
        assert!(matches!(
            vm.push_call(3, &[]),
            Err(Fault::TargetOutOfRange { target: 3, len: 3, .. })
        ));
    }

    #[test]
    fn return_without_call_faults() {
        let mut vm = machine();
        assert!(matches!(
            vm.pop_call(Value::Nothing),
            Err(Fault::CallStackUnderflow { .. })
        ));
    }

    #[test]
    fn call_depth_limit_raises() {
        let config = VmConfig::default().with_max_call_depth(1);
        let mut vm = Machine::with_config(Program::new(vec![0x01], vec![]), config);
        vm.push_call(0, &[]).unwrap();
        assert_eq!(vm.call_stack.len(), 1);
        vm.push_call(0, &[]).unwrap();
        assert_eq!(vm.call_stack.len(), 1);
        assert_eq!(vm.status, Status::Errored);
        let error = vm.last_error().unwrap();
        assert_eq!(error.field("type"), Some(Value::string("StackOverflow")));
    }

    #[test]
    fn register_limit_raises() {
        let config = VmConfig::default().with_max_registers(4);
        let mut vm = Machine::with_config(Program::new(vec![0x01], vec![]), config);
        vm.grow_frame(4);
        assert_eq!(vm.var_stack.len(), 4);
        vm.grow_frame(1);
        assert_eq!(vm.var_stack.len(), 4);
        assert_eq!(vm.status, Status::Errored);
    }

    #[test]
    fn resize_frame_shrinks_and_grows() {
        let mut vm = machine();
        vm.grow_frame(5);
        vm.resize_frame(2);
        assert_eq!(vm.var_stack.len(), 2);
        vm.resize_frame(3);
        assert_eq!(vm.var_stack, vec![Value::Nothing; 3]);
    }

    #[test]
    fn append_code_returns_start() {
        let mut vm = machine();
        assert_eq!(vm.append_code(&[0x01, 0x01]), 3);
        assert_eq!(vm.code.len(), 5);
    }

    #[test]
    fn fetch_reports_decode_faults() {
        let mut vm = Machine::new(Program::new(vec![0x0000_0009], vec![]));
        assert!(matches!(vm.fetch(), Err(Fault::Decode { at: 0, .. })));
        vm.isr = 1;
        assert!(matches!(
            vm.fetch(),
            Err(Fault::CodeOutOfRange { at: 1, len: 1 })
        ));
    }
}
