//! Internal faults raised by the eazy VM.
//!
//! A fault means the instruction stream is corrupt or the producer is
//! defective. Faults are never catchable by the running program: they abort
//! the run and are reported to the host with the instruction index (`at`)
//! and, once decoded, the offending opcode.

use eazy_common::{DecodeError, Opcode};
use thiserror::Error;

use crate::machine::Status;

/// Errors that abort execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// The instruction pointer left the code.
    #[error("instruction pointer {at} is past the end of the code ({len} words)")]
    CodeOutOfRange { at: usize, len: usize },

    /// The word at `at` has no valid decoding.
    #[error("cannot decode word {word:#010x} at instruction {at}: {source}")]
    Decode {
        at: usize,
        word: u32,
        #[source]
        source: DecodeError,
    },

    /// A register index reached outside the current frame.
    #[error("{opcode} at instruction {at}: register r{register} outside a frame of {frame_size} register(s)")]
    RegisterOutOfRange {
        at: usize,
        opcode: Opcode,
        register: u8,
        frame_size: usize,
    },

    /// `load_const` past the end of the constant table.
    #[error("{opcode} at instruction {at}: constant {index} outside a table of {len}")]
    ConstantOutOfRange {
        at: usize,
        opcode: Opcode,
        index: usize,
        len: usize,
    },

    /// A jump, call, catch, or closure address outside the code.
    #[error("{opcode} at instruction {at}: target {target} outside the code ({len} words)")]
    TargetOutOfRange {
        at: usize,
        opcode: Opcode,
        target: usize,
        len: usize,
    },

    /// `return` with no active call.
    #[error("{opcode} at instruction {at}: call stack is empty")]
    CallStackUnderflow { at: usize, opcode: Opcode },

    /// `end_catch` with no registered catch frame.
    #[error("{opcode} at instruction {at}: catch stack is empty")]
    CatchStackUnderflow { at: usize, opcode: Opcode },

    /// `pop_error` with nothing raised.
    #[error("{opcode} at instruction {at}: error stack is empty")]
    ErrorStackUnderflow { at: usize, opcode: Opcode },

    /// `call_extension` with an id the host never registered.
    #[error("{opcode} at instruction {at}: no extension registered with id {id}")]
    UnknownExtension { at: usize, opcode: Opcode, id: u32 },

    /// Operands that do not match the opcode's shape.
    #[error("{opcode} at instruction {at}: operands do not match its shape")]
    ShapeMismatch { at: usize, opcode: Opcode },

    /// `run` or `resume` from a status that does not allow it.
    #[error("cannot continue a machine with status {status:?}")]
    NotResumable { status: Status },

    /// A previous fault already aborted this machine.
    #[error("machine was aborted by an earlier fault")]
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        assert_eq!(
            Fault::CodeOutOfRange { at: 5, len: 5 }.to_string(),
            "instruction pointer 5 is past the end of the code (5 words)"
        );
        assert_eq!(
            Fault::RegisterOutOfRange {
                at: 2,
                opcode: Opcode::Add,
                register: 7,
                frame_size: 3,
            }
            .to_string(),
            "add at instruction 2: register r7 outside a frame of 3 register(s)"
        );
        assert_eq!(
            Fault::CallStackUnderflow {
                at: 9,
                opcode: Opcode::Return,
            }
            .to_string(),
            "return at instruction 9: call stack is empty"
        );
        assert_eq!(
            Fault::NotResumable {
                status: Status::Stopped
            }
            .to_string(),
            "cannot continue a machine with status Stopped"
        );
    }

    #[test]
    fn decode_fault_includes_source() {
        let fault = Fault::Decode {
            at: 0,
            word: 0,
            source: DecodeError::IllegalOpcode,
        };
        assert_eq!(
            fault.to_string(),
            "cannot decode word 0x00000000 at instruction 0: illegal opcode 0x00"
        );
    }
}
