//! eazy virtual machine: executes encoded eazy instruction streams.
//!
//! The VM is a register machine with:
//! - A variable stack holding every frame's registers, addressed relative
//!   to the current frame base
//! - A call stack of return addresses and saved frame bases
//! - Catch frames that roll state back when an error is raised
//! - Host extensions reachable through `call_extension`
//!
//! Errors raised by the running program (a `throw`, a type mismatch, a
//! stack overflow) are values the program can catch. A [`Fault`] is
//! different: it means the code itself is corrupt, and it aborts the run.
//!
//! # Usage
//!
//! ```
//! use eazy_common::{Instruction, Opcode, Program, Value};
//! use eazy_vm::{init, run, Status};
//!
//! let program = Program::assemble(
//!     &[
//!         Instruction::x(Opcode::Alloc, 3),
//!         Instruction::xl(Opcode::LoadNumber, 0, 40),
//!         Instruction::xl(Opcode::LoadNumber, 1, 2),
//!         Instruction::xyz(Opcode::Add, 0, 1, 2),
//!         Instruction::op(Opcode::Stop),
//!     ],
//!     vec![],
//! )
//! .unwrap();
//!
//! let mut machine = init(program);
//! assert_eq!(run(&mut machine).unwrap(), Status::Stopped);
//! assert_eq!(machine.inspect().frame()[2], Value::Number(42.0));
//! ```

pub mod config;
pub mod error;
pub mod exception;
pub mod execute;
pub mod extension;
pub mod machine;

pub use config::{VmConfig, MAX_CALL_DEPTH, MAX_REGISTERS};
pub use error::Fault;
pub use exception::{CatchFrame, ErrorKind};
pub use extension::Extension;
pub use machine::{CallFrame, Machine, Snapshot, Status};

use eazy_common::Program;

/// Create a machine for `program` with the default limits.
pub fn init(program: Program) -> Machine {
    Machine::new(program)
}

/// Run `machine` until it stops, pauses, or ends on an uncaught error.
///
/// # Errors
///
/// Returns a [`Fault`] if the code is corrupt (undecodable word, register
/// outside the frame, target outside the code, ...). The machine cannot be
/// run again afterwards.
pub fn run(machine: &mut Machine) -> Result<Status, Fault> {
    machine.run()
}
