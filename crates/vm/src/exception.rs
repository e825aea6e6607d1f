//! Raising, catching, and unwinding errors.
//!
//! Raising pushes a value onto the error stack and marks the machine
//! `Errored`. After each instruction the dispatch loop performs one
//! unwind step: the innermost catch frame is popped and the machine state
//! is rolled back to the moment that frame was registered. With no catch
//! frame left the machine stays `Errored` and the run ends.

use eazy_common::{Value, ValueError};
use tracing::{debug, warn};

use crate::error::Fault;
use crate::machine::{Machine, Status};

/// Kinds of error value the machine raises on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TypeError,
    IndexError,
    StackOverflow,
    ExtensionError,
}

impl ErrorKind {
    /// The `type` field of error values of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::TypeError => "TypeError",
            ErrorKind::IndexError => "IndexError",
            ErrorKind::StackOverflow => "StackOverflow",
            ErrorKind::ExtensionError => "ExtensionError",
        }
    }
}

/// Machine state captured by `catch`, restored when an error is caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchFrame {
    pub resume_address: usize,
    pub var_stack_length: usize,
    pub call_stack_length: usize,
    pub frame_base: usize,
}

impl Machine {
    /// Register a catch frame that resumes at `resume_address`.
    pub(crate) fn register_catch(&mut self, resume_address: usize) -> Result<(), Fault> {
        self.check_target(resume_address)?;
        self.catch_stack.push(CatchFrame {
            resume_address,
            var_stack_length: self.var_stack.len(),
            call_stack_length: self.call_stack.len(),
            frame_base: self.vsr,
        });
        debug!(resume_address, depth = self.catch_stack.len(), "catch registered");
        Ok(())
    }

    /// Drop the innermost catch frame.
    pub(crate) fn end_catch(&mut self) -> Result<(), Fault> {
        self.catch_stack
            .pop()
            .map(|_| ())
            .ok_or(Fault::CatchStackUnderflow {
                at: self.at,
                opcode: self.opcode,
            })
    }

    /// Raise `value` as an error.
    pub(crate) fn raise(&mut self, value: Value) {
        debug!(at = self.at, error = %value, "raise");
        self.error_stack.push(value);
        self.status = Status::Errored;
    }

    /// Raise a machine error value of `kind`.
    ///
    /// The value is a Map with `type`, `message`, `stack`, and one extra
    /// entry named `key` describing what went wrong.
    pub(crate) fn raise_error(
        &mut self,
        kind: ErrorKind,
        message: impl Into<String>,
        key: &str,
        payload: Value,
    ) {
        let error = Value::map(vec![
            (Value::string("type"), Value::string(kind.name())),
            (Value::string("message"), Value::from(message.into())),
            (Value::string("stack"), self.stack_trace()),
            (Value::string(key), payload),
        ]);
        self.raise(error);
    }

    /// Raise a `TypeError` listing the offending operands.
    pub(crate) fn type_error(&mut self, message: impl Into<String>, operands: Vec<Value>) {
        self.raise_error(ErrorKind::TypeError, message, "operands", Value::list(operands));
    }

    /// Raise an `IndexError` listing the offending operands.
    pub(crate) fn index_error(&mut self, message: impl Into<String>, operands: Vec<Value>) {
        self.raise_error(ErrorKind::IndexError, message, "operands", Value::list(operands));
    }

    /// Raise the error value matching a failed value operation.
    pub(crate) fn value_error(&mut self, error: ValueError, operands: Vec<Value>) {
        match error {
            ValueError::IndexOutOfBounds { .. } => self.index_error(error.to_string(), operands),
            _ => self.type_error(error.to_string(), operands),
        }
    }

    /// Return addresses of every active call, outermost first, followed by
    /// the address of the current instruction.
    pub(crate) fn stack_trace(&self) -> Value {
        let trace = self
            .call_stack
            .iter()
            .map(|frame| Value::Number(frame.return_address as f64))
            .chain(std::iter::once(Value::Number(self.at as f64)))
            .collect();
        Value::list(trace)
    }

    /// Hand the pending error to the innermost catch frame, if any.
    pub(crate) fn unwind_step(&mut self) {
        let Some(frame) = self.catch_stack.pop() else {
            warn!(
                at = self.at,
                error = %self.error_stack.last().cloned().unwrap_or_default(),
                "uncaught error"
            );
            return;
        };
        self.var_stack.resize(frame.var_stack_length, Value::Nothing);
        self.call_stack.truncate(frame.call_stack_length);
        self.vsr = frame.frame_base;
        self.isr = frame.resume_address;
        self.arg_stack.clear();
        self.env_stack.clear();
        // Only the error being handled stays for `pop_error`; earlier
        // errors a handler never popped are dropped.
        let stale = self.error_stack.len().saturating_sub(1);
        self.error_stack.drain(..stale);
        self.status = Status::Running;
        debug!(
            resume_address = frame.resume_address,
            depth = self.call_stack.len(),
            "error caught"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eazy_common::Program;

    fn machine() -> Machine {
        Machine::new(Program::new(vec![0x01; 4], vec![]))
    }

    #[test]
    fn error_values_carry_type_message_and_stack() {
        let mut vm = machine();
        vm.at = 2;
        vm.type_error("bad", vec![Value::Number(1.0)]);

        assert_eq!(vm.status, Status::Errored);
        let error = vm.last_error().unwrap();
        assert_eq!(error.field("type"), Some(Value::string("TypeError")));
        assert_eq!(error.field("message"), Some(Value::string("bad")));
        assert_eq!(
            error.field("stack"),
            Some(Value::list(vec![Value::Number(2.0)]))
        );
        assert_eq!(
            error.field("operands"),
            Some(Value::list(vec![Value::Number(1.0)]))
        );
    }

    #[test]
    fn unwind_restores_registered_state() {
        let mut vm = machine();
        vm.grow_frame(2);
        vm.register_catch(3).unwrap();

        vm.isr = 1;
        vm.push_call(0, &[Value::Number(1.0)]).unwrap();
        vm.grow_frame(4);
        vm.stage_argument(Value::Nothing);
        vm.raise(Value::string("boom"));
        vm.unwind_step();

        assert_eq!(vm.status, Status::Running);
        assert_eq!(vm.isr, 3);
        assert_eq!(vm.vsr, 0);
        assert_eq!(vm.var_stack.len(), 2);
        assert!(vm.call_stack.is_empty());
        assert!(vm.arg_stack.is_empty());
        assert!(vm.catch_stack.is_empty());
        assert_eq!(vm.error_stack, vec![Value::string("boom")]);
    }

    #[test]
    fn unwind_keeps_only_the_live_error() {
        let mut vm = machine();
        vm.error_stack.push(Value::string("unpopped"));
        vm.register_catch(1).unwrap();
        vm.raise(Value::string("live"));
        vm.unwind_step();
        assert_eq!(vm.error_stack, vec![Value::string("live")]);
    }

    #[test]
    fn unwind_without_catch_stays_errored() {
        let mut vm = machine();
        vm.raise(Value::Nothing);
        vm.unwind_step();
        assert_eq!(vm.status, Status::Errored);
        assert_eq!(vm.error_stack.len(), 1);
    }

    #[test]
    fn innermost_catch_wins() {
        let mut vm = machine();
        vm.register_catch(1).unwrap();
        vm.register_catch(2).unwrap();
        vm.raise(Value::Nothing);
        vm.unwind_step();
        assert_eq!(vm.isr, 2);
        assert_eq!(vm.catch_stack.len(), 1);
    }

    #[test]
    fn end_catch_on_empty_stack_faults() {
        let mut vm = machine();
        assert!(matches!(
            vm.end_catch(),
            Err(Fault::CatchStackUnderflow { .. })
        ));
    }

    #[test]
    fn out_of_bounds_maps_to_index_error() {
        let mut vm = machine();
        vm.value_error(
            ValueError::IndexOutOfBounds {
                index: 3,
                length: 1,
            },
            vec![],
        );
        let error = vm.last_error().unwrap();
        assert_eq!(error.field("type"), Some(Value::string("IndexError")));
    }
}
