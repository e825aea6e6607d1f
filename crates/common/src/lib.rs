//! eazy common types and instruction encoding.
//!
//! This crate provides the data structures shared between the code
//! generator and the virtual machine:
//!
//! - [`Opcode`]: the opcode table, one operand shape per opcode
//! - [`Instruction`]: the 32-bit instruction word with encode/decode
//! - [`Value`]: runtime values, structural equality, and membership
//! - [`TypeTag`]: dynamic type tags
//! - [`Program`]: code words, constant table, and entry address
//!
//! # Dependencies
//!
//! This crate uses `thiserror` (compile-time proc-macro, zero runtime cost)
//! and has no other dependencies.

pub mod error;
pub mod instruction;
pub mod opcode;
pub mod program;
pub mod type_tag;
pub mod value;

// Re-export commonly used types at the crate root.
pub use error::{DecodeError, EncodingError, ValueError};
pub use instruction::{encode_fields, Instruction, OperandShape, Operands};
pub use opcode::Opcode;
pub use program::Program;
pub use type_tag::TypeTag;
pub use value::{contains, equals, Closure, List, Map, Value};
