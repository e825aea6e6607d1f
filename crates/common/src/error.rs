//! Error types for eazy instruction words and value operations.

use thiserror::Error;

use crate::instruction::OperandShape;
use crate::opcode::Opcode;
use crate::type_tag::TypeTag;

/// Errors that occur while decoding an instruction word.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Opcode 0x00 is illegal and always rejected.
    #[error("illegal opcode 0x00")]
    IllegalOpcode,

    /// Opcode byte has no table entry.
    #[error("reserved opcode: {0:#04x}")]
    ReservedOpcode(u8),

    /// Bits outside the opcode's operand shape are set.
    #[error("{opcode} ({shape:?}) has non-zero unused bits in word {word:#010x}")]
    NonZeroPadding {
        opcode: Opcode,
        shape: OperandShape,
        word: u32,
    },
}

/// Errors that occur while encoding an instruction word.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// Wrong number of fields for the opcode's operand shape.
    #[error("{opcode} takes {expected} operand(s), got {got}")]
    ArityMismatch {
        opcode: Opcode,
        expected: usize,
        got: usize,
    },

    /// A field does not fit in its bit width.
    #[error("{opcode} operand {field} = {value} exceeds {bits} bits")]
    FieldOverflow {
        opcode: Opcode,
        field: char,
        value: u64,
        bits: u32,
    },

    /// The typed operands do not match the opcode's shape.
    #[error("{opcode} expects {expected:?} operands, got {got:?}")]
    ShapeMismatch {
        opcode: Opcode,
        expected: OperandShape,
        got: OperandShape,
    },
}

/// Errors from value operations whose operands violate their contract.
///
/// The VM turns these into raised error values; they never abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// `in` on something that is not a String, List, or Map.
    #[error("operator in only works on Strings, Lists, and Maps")]
    NotAContainer,

    /// Substring test with a non-String needle.
    #[error("operator in expects a String as the first argument when the second argument is a String")]
    NeedleNotString,

    /// Mutation of a frozen List or Map.
    #[error("cannot modify a frozen {0}")]
    Frozen(TypeTag),

    /// List index past the end.
    #[error("index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: usize, length: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_illegal_opcode() {
        assert_eq!(
            DecodeError::IllegalOpcode.to_string(),
            "illegal opcode 0x00"
        );
    }

    #[test]
    fn display_reserved_opcode() {
        assert_eq!(
            DecodeError::ReservedOpcode(0x09).to_string(),
            "reserved opcode: 0x09"
        );
    }

    #[test]
    fn display_field_overflow() {
        let e = EncodingError::FieldOverflow {
            opcode: Opcode::Jump,
            field: 'l',
            value: 70_000,
            bits: 16,
        };
        assert_eq!(e.to_string(), "jump operand l = 70000 exceeds 16 bits");
    }

    #[test]
    fn display_frozen() {
        assert_eq!(
            ValueError::Frozen(TypeTag::List).to_string(),
            "cannot modify a frozen List"
        );
    }

    #[test]
    fn display_arity_mismatch() {
        let e = EncodingError::ArityMismatch {
            opcode: Opcode::Add,
            expected: 3,
            got: 1,
        };
        assert_eq!(e.to_string(), "add takes 3 operand(s), got 1");
    }
}
