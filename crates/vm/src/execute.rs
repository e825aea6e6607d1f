//! Main execution loop and opcode dispatch for the eazy VM.

use eazy_common::{contains, equals, Instruction, Opcode, Operands, Value};
use tracing::{error, instrument, trace};

use crate::error::Fault;
use crate::exception::ErrorKind;
use crate::machine::{Machine, Status};

/// Convert a Number to a list or string index, if it is one.
fn to_index(n: f64) -> Option<usize> {
    if n >= 0.0 && n.fract() == 0.0 && n < usize::MAX as f64 {
        Some(n as usize)
    } else {
        None
    }
}

impl Machine {
    /// Execute until the machine stops, pauses, or ends on an uncaught error.
    ///
    /// Returns the final status. A fault aborts the machine for good: every
    /// later call returns [`Fault::Aborted`].
    #[instrument(level = "debug", skip(self), fields(isr = self.isr))]
    pub fn run(&mut self) -> Result<Status, Fault> {
        if self.aborted {
            return Err(Fault::Aborted);
        }
        if self.status != Status::Running {
            return Err(Fault::NotResumable {
                status: self.status,
            });
        }
        let result = self.dispatch();
        if let Err(fault) = &result {
            self.aborted = true;
            error!(%fault, "run aborted");
        }
        result
    }

    /// Continue a machine paused by `break`.
    pub fn resume(&mut self) -> Result<Status, Fault> {
        if self.aborted {
            return Err(Fault::Aborted);
        }
        if self.status != Status::Paused {
            return Err(Fault::NotResumable {
                status: self.status,
            });
        }
        self.status = Status::Running;
        self.run()
    }

    fn dispatch(&mut self) -> Result<Status, Fault> {
        while self.status == Status::Running {
            self.step()?;
            if self.status == Status::Errored {
                self.unwind_step();
            }
        }
        Ok(self.status)
    }

    /// Execute one instruction.
    fn step(&mut self) -> Result<(), Fault> {
        let instr = self.fetch()?;
        self.at = self.isr;
        self.opcode = instr.opcode;
        self.isr += 1;
        trace!(at = self.at, %instr, "dispatch");

        match instr.opcode {
            // Control
            Opcode::Stop => self.status = Status::Stopped,
            Opcode::Throw => {
                let value = self.reg(self.x(&instr)?)?;
                self.raise(value);
            }
            Opcode::Catch => self.register_catch(self.k(&instr)? as usize)?,
            Opcode::EndCatch => self.end_catch()?,
            Opcode::PopError => self.exec_pop_error(&instr)?,
            Opcode::Jump => self.jump(self.l(&instr)? as usize)?,
            Opcode::JumpIf => self.exec_jump_if(&instr)?,
            Opcode::Break => self.status = Status::Paused,

            // Registers
            Opcode::Alloc => self.grow_frame(self.x(&instr)? as usize),
            Opcode::Move => {
                let (x, y) = self.xy(&instr)?;
                let value = self.reg(x)?;
                self.set_reg(y, value)?;
            }
            Opcode::Swap => {
                let (x, y) = self.xy(&instr)?;
                let (i, j) = (self.slot(x)?, self.slot(y)?);
                self.var_stack.swap(i, j);
            }
            Opcode::Copy => {
                let (x, y) = self.xy(&instr)?;
                let value = self.reg(x)?.shallow_copy();
                self.set_reg(y, value)?;
            }

            // Arithmetic
            Opcode::Add => self.exec_arith(&instr, "+", |a, b| a + b)?,
            Opcode::Sub => self.exec_arith(&instr, "-", |a, b| a - b)?,
            Opcode::Mul => self.exec_arith(&instr, "*", |a, b| a * b)?,
            Opcode::Div => self.exec_arith(&instr, "/", |a, b| a / b)?,
            Opcode::Pow => self.exec_arith(&instr, "**", f64::powf)?,
            Opcode::Mod => self.exec_arith(&instr, "%", |a, b| a % b)?,

            // Logic
            Opcode::And => self.exec_logic(&instr, "and", |a, b| a && b)?,
            Opcode::Or => self.exec_logic(&instr, "or", |a, b| a || b)?,
            Opcode::Not => self.exec_not(&instr)?,

            // Comparison
            Opcode::Eq => self.exec_relation(&instr, |a, b| Ok(equals(a, b)))?,
            Opcode::Neq => self.exec_relation(&instr, |a, b| Ok(!equals(a, b)))?,
            Opcode::Is => self.exec_relation(&instr, |a, b| Ok(a.identical(b)))?,
            Opcode::IsNot => self.exec_relation(&instr, |a, b| Ok(!a.identical(b)))?,
            Opcode::In => self.exec_relation(&instr, contains)?,
            Opcode::NotIn => {
                self.exec_relation(&instr, |a, b| contains(a, b).map(|found| !found))?
            }
            Opcode::Lt => self.exec_compare(&instr, "<", |a, b| a < b)?,
            Opcode::Lte => self.exec_compare(&instr, "<=", |a, b| a <= b)?,
            Opcode::Gt => self.exec_compare(&instr, ">", |a, b| a > b)?,
            Opcode::Gte => self.exec_compare(&instr, ">=", |a, b| a >= b)?,

            // Loads
            Opcode::ExpandVars => self.resize_frame(self.x(&instr)? as usize),
            Opcode::LoadConst => self.exec_load_const(&instr)?,
            Opcode::LoadNothing => self.set_reg(self.x(&instr)?, Value::Nothing)?,
            Opcode::LoadBoolean => {
                let (x, y) = self.xy(&instr)?;
                self.set_reg(x, Value::Boolean(y != 0))?;
            }
            Opcode::LoadNumber => {
                let (x, l) = self.xl(&instr)?;
                self.set_reg(x, Value::Number(f64::from(l)))?;
            }
            Opcode::LoadString => self.set_reg(self.x(&instr)?, Value::string(""))?,
            Opcode::LoadList => self.set_reg(self.x(&instr)?, Value::list(Vec::new()))?,
            Opcode::LoadMap => self.set_reg(self.x(&instr)?, Value::map(Vec::new()))?,

            // Collections
            Opcode::Merge => self.exec_merge(&instr)?,
            Opcode::Get => self.exec_get(&instr)?,
            Opcode::Set => self.exec_set(&instr)?,
            Opcode::Push => self.exec_push(&instr)?,
            Opcode::Count => self.exec_count(&instr)?,
            Opcode::Freeze => match self.reg(self.x(&instr)?)? {
                Value::List(list) => list.freeze(),
                Value::Map(map) => map.freeze(),
                _ => {}
            },

            // Calls and closures
            Opcode::PushArg => {
                let value = self.reg(self.x(&instr)?)?;
                self.stage_argument(value);
            }
            Opcode::Call => self.push_call(self.k(&instr)? as usize, &[])?,
            Opcode::CallClosure => self.exec_call_closure(&instr)?,
            Opcode::CallExtension => self.exec_call_extension(&instr)?,
            Opcode::Return => {
                let result = self.reg(self.x(&instr)?)?;
                self.pop_call(result)?;
            }
            Opcode::PushEnv => {
                let value = self.reg(self.x(&instr)?)?;
                self.env_stack.push(value);
            }
            Opcode::Closure => self.exec_closure(&instr)?,

            // Introspection
            Opcode::Type => {
                let (x, y) = self.xy(&instr)?;
                let name = self.reg(x)?.type_tag().name();
                self.set_reg(y, Value::string(name))?;
            }
            Opcode::Describe => {
                let (x, y) = self.xy(&instr)?;
                let text = self.reg(x)?.to_string();
                self.set_reg(y, Value::from(text))?;
            }
            Opcode::StackTrace => {
                let trace = self.stack_trace();
                self.set_reg(self.x(&instr)?, trace)?;
            }
        }
        Ok(())
    }

    // ---- operand extraction ----

    fn shape_mismatch(&self) -> Fault {
        Fault::ShapeMismatch {
            at: self.at,
            opcode: self.opcode,
        }
    }

    fn x(&self, instr: &Instruction) -> Result<u8, Fault> {
        match instr.operands {
            Operands::X { x } => Ok(x),
            _ => Err(self.shape_mismatch()),
        }
    }

    fn xy(&self, instr: &Instruction) -> Result<(u8, u8), Fault> {
        match instr.operands {
            Operands::XY { x, y } => Ok((x, y)),
            _ => Err(self.shape_mismatch()),
        }
    }

    fn xyz(&self, instr: &Instruction) -> Result<(u8, u8, u8), Fault> {
        match instr.operands {
            Operands::XYZ { x, y, z } => Ok((x, y, z)),
            _ => Err(self.shape_mismatch()),
        }
    }

    fn xl(&self, instr: &Instruction) -> Result<(u8, u16), Fault> {
        match instr.operands {
            Operands::XL { x, l } => Ok((x, l)),
            _ => Err(self.shape_mismatch()),
        }
    }

    fn l(&self, instr: &Instruction) -> Result<u16, Fault> {
        match instr.operands {
            Operands::L { l } => Ok(l),
            _ => Err(self.shape_mismatch()),
        }
    }

    fn k(&self, instr: &Instruction) -> Result<u32, Fault> {
        match instr.operands {
            Operands::K { k } => Ok(k),
            _ => Err(self.shape_mismatch()),
        }
    }

    // ---- control ----

    fn jump(&mut self, target: usize) -> Result<(), Fault> {
        self.check_target(target)?;
        self.isr = target;
        Ok(())
    }

    fn exec_jump_if(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let (x, l) = self.xl(instr)?;
        match self.reg(x)? {
            Value::Boolean(true) => self.jump(l as usize)?,
            Value::Boolean(false) => {}
            condition => self.raise_error(
                ErrorKind::TypeError,
                "only a Boolean is allowed as a condition",
                "condition",
                condition,
            ),
        }
        Ok(())
    }

    fn exec_pop_error(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let x = self.x(instr)?;
        let index = self.slot(x)?;
        let error = self.error_stack.pop().ok_or(Fault::ErrorStackUnderflow {
            at: self.at,
            opcode: self.opcode,
        })?;
        self.var_stack[index] = error;
        Ok(())
    }

    // ---- operators ----

    fn exec_arith(
        &mut self,
        instr: &Instruction,
        symbol: &str,
        op: impl Fn(f64, f64) -> f64,
    ) -> Result<(), Fault> {
        let (x, y, z) = self.xyz(instr)?;
        let (a, b) = (self.reg(x)?, self.reg(y)?);
        match (&a, &b) {
            (Value::Number(a), Value::Number(b)) => self.set_reg(z, Value::Number(op(*a, *b)))?,
            _ => self.type_error(
                format!("operator {symbol} only works on Numbers"),
                vec![a, b],
            ),
        }
        Ok(())
    }

    fn exec_compare(
        &mut self,
        instr: &Instruction,
        symbol: &str,
        op: impl Fn(f64, f64) -> bool,
    ) -> Result<(), Fault> {
        let (x, y, z) = self.xyz(instr)?;
        let (a, b) = (self.reg(x)?, self.reg(y)?);
        match (&a, &b) {
            (Value::Number(a), Value::Number(b)) => self.set_reg(z, Value::Boolean(op(*a, *b)))?,
            _ => self.type_error(
                format!("operator {symbol} only works on Numbers"),
                vec![a, b],
            ),
        }
        Ok(())
    }

    fn exec_logic(
        &mut self,
        instr: &Instruction,
        name: &str,
        op: impl Fn(bool, bool) -> bool,
    ) -> Result<(), Fault> {
        let (x, y, z) = self.xyz(instr)?;
        let (a, b) = (self.reg(x)?, self.reg(y)?);
        match (&a, &b) {
            (Value::Boolean(a), Value::Boolean(b)) => self.set_reg(z, Value::Boolean(op(*a, *b)))?,
            _ => self.type_error(
                format!("operator {name} only works on Booleans"),
                vec![a, b],
            ),
        }
        Ok(())
    }

    fn exec_not(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let (x, y) = self.xy(instr)?;
        match self.reg(x)? {
            Value::Boolean(a) => self.set_reg(y, Value::Boolean(!a))?,
            a => self.type_error("operator not only works on Booleans", vec![a]),
        }
        Ok(())
    }

    /// Apply a relation that works on any operands, such as `eq` or `in`.
    fn exec_relation(
        &mut self,
        instr: &Instruction,
        op: impl Fn(&Value, &Value) -> Result<bool, eazy_common::ValueError>,
    ) -> Result<(), Fault> {
        let (x, y, z) = self.xyz(instr)?;
        let (a, b) = (self.reg(x)?, self.reg(y)?);
        match op(&a, &b) {
            Ok(result) => self.set_reg(z, Value::Boolean(result))?,
            Err(err) => self.value_error(err, vec![a, b]),
        }
        Ok(())
    }

    // ---- loads and collections ----

    fn exec_load_const(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let (x, l) = self.xl(instr)?;
        let index = l as usize;
        let value = self
            .constants
            .get(index)
            .cloned()
            .ok_or(Fault::ConstantOutOfRange {
                at: self.at,
                opcode: self.opcode,
                index,
                len: self.constants.len(),
            })?;
        self.set_reg(x, value)
    }

    fn exec_merge(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let (x, y, z) = self.xyz(instr)?;
        let (a, b) = (self.reg(x)?, self.reg(y)?);
        match a.merge(&b) {
            Some(merged) => self.set_reg(z, merged)?,
            None => self.type_error(
                "merge only works on two Strings, two Lists, or two Maps",
                vec![a, b],
            ),
        }
        Ok(())
    }

    fn exec_get(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let (x, y, z) = self.xyz(instr)?;
        let (collection, key) = (self.reg(x)?, self.reg(y)?);
        let element = match (&collection, &key) {
            (Value::Map(map), _) => Some(map.get(&key).unwrap_or_default()),
            (Value::List(list), Value::Number(n)) => to_index(*n).and_then(|i| list.get(i)),
            (Value::String(text), Value::Number(n)) => to_index(*n)
                .and_then(|i| text.chars().nth(i))
                .map(|c| Value::from(c.to_string())),
            _ if collection.type_tag().is_indexable() => {
                self.type_error(
                    "Lists and Strings can only be indexed by Numbers",
                    vec![collection, key],
                );
                return Ok(());
            }
            _ => {
                self.type_error(
                    "only Strings, Lists, and Maps can be indexed",
                    vec![collection, key],
                );
                return Ok(());
            }
        };
        match element {
            Some(value) => self.set_reg(z, value)?,
            None => self.index_error("index out of bounds", vec![collection, key]),
        }
        Ok(())
    }

    fn exec_set(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let (x, y, z) = self.xyz(instr)?;
        let (collection, key, value) = (self.reg(x)?, self.reg(y)?, self.reg(z)?);
        let outcome = match (&collection, &key) {
            (Value::Map(map), _) => map.insert(key.clone(), value),
            (Value::List(list), Value::Number(n)) => match to_index(*n) {
                Some(i) => list.set(i, value),
                None => {
                    self.index_error("index out of bounds", vec![collection, key]);
                    return Ok(());
                }
            },
            (Value::List(_), _) => {
                self.type_error("Lists can only be indexed by Numbers", vec![collection, key]);
                return Ok(());
            }
            (Value::String(_), _) => {
                self.type_error("Strings are immutable", vec![collection, key]);
                return Ok(());
            }
            _ => {
                self.type_error(
                    "only Lists and Maps can be assigned into",
                    vec![collection, key],
                );
                return Ok(());
            }
        };
        if let Err(err) = outcome {
            self.value_error(err, vec![collection, key]);
        }
        Ok(())
    }

    fn exec_push(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let (x, y) = self.xy(instr)?;
        let (collection, value) = (self.reg(x)?, self.reg(y)?);
        match &collection {
            Value::List(list) => {
                if let Err(err) = list.push(value) {
                    self.value_error(err, vec![collection]);
                }
            }
            _ => self.type_error("push only works on Lists", vec![collection]),
        }
        Ok(())
    }

    fn exec_count(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let (x, y) = self.xy(instr)?;
        let collection = self.reg(x)?;
        match collection.count() {
            Some(n) => self.set_reg(y, Value::Number(n as f64))?,
            None => self.type_error(
                "only Strings, Lists, and Maps can be counted",
                vec![collection],
            ),
        }
        Ok(())
    }

    // ---- calls ----

    fn exec_call_closure(&mut self, instr: &Instruction) -> Result<(), Fault> {
        match self.reg(self.x(instr)?)? {
            Value::Closure(closure) => self.push_call(closure.address, &closure.environment),
            other => {
                self.type_error("only Closures can be called", vec![other]);
                Ok(())
            }
        }
    }

    fn exec_call_extension(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let id = self.k(instr)?;
        let args = std::mem::take(&mut self.arg_stack);
        let extension = self
            .extensions
            .get_mut(id as usize)
            .ok_or(Fault::UnknownExtension {
                at: self.at,
                opcode: self.opcode,
                id,
            })?;
        match extension.call(&args) {
            Ok(result) => self.push_register(result),
            Err(cause) => self.raise_error(
                ErrorKind::ExtensionError,
                format!("extension {id} failed"),
                "cause",
                cause,
            ),
        }
        Ok(())
    }

    fn exec_closure(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let (x, l) = self.xl(instr)?;
        let address = l as usize;
        self.check_target(address)?;
        let environment = std::mem::take(&mut self.env_stack);
        self.set_reg(x, Value::closure(address, environment))
    }
}
