//! Program representation handed from the code generator to the VM.
//!
//! A program is a flat stream of instruction words, a constant table, and
//! the address execution starts at.

use crate::error::EncodingError;
use crate::instruction::Instruction;
use crate::value::Value;

/// An eazy program: code words, constants, and an entry address.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// The instruction stream, one encoded word per instruction.
    pub code: Vec<u32>,
    /// Values addressed by `load_const`.
    pub constants: Vec<Value>,
    /// Address of the first instruction to execute.
    pub entry: usize,
}

impl Program {
    /// Create a program from already-encoded words, entering at address 0.
    pub fn new(code: Vec<u32>, constants: Vec<Value>) -> Self {
        Self {
            code,
            constants,
            entry: 0,
        }
    }

    /// Encode instructions into a program, entering at address 0.
    ///
    /// Fails on the first instruction that does not encode.
    pub fn assemble(
        instructions: &[Instruction],
        constants: Vec<Value>,
    ) -> Result<Self, EncodingError> {
        let code = instructions
            .iter()
            .map(Instruction::encode)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(code, constants))
    }

    /// Set the entry address.
    pub fn with_entry(mut self, entry: usize) -> Self {
        self.entry = entry;
        self
    }

    /// Number of instructions in the program.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns true if the program has no instructions.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}
