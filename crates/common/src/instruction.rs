//! Instruction encoding and decoding for the eazy instruction set.
//!
//! Every instruction is one 32-bit word. The low byte is the opcode; the
//! remaining 24 bits are laid out according to the opcode's operand shape:
//! ```text
//! None:  opcode(8) 0(24)
//! X:     opcode(8) x(8) 0(16)
//! XY:    opcode(8) x(8) y(8) 0(8)
//! XYZ:   opcode(8) x(8) y(8) z(8)
//! XL:    opcode(8) x(8) l(16)
//! L:     opcode(8) 0(8) l(16)
//! K:     opcode(8) k(24)
//! ```
//! Fields are listed from the least significant bit upwards.

use std::fmt;

use crate::error::{DecodeError, EncodingError};
use crate::opcode::Opcode;

/// Largest value a 24-bit `k` field can hold.
pub const MAX_K: u32 = 0x00FF_FFFF;

/// The operand layout of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandShape {
    /// No operands.
    None,
    /// One register.
    X,
    /// Two registers.
    XY,
    /// Three registers.
    XYZ,
    /// A register and a 16-bit immediate or address.
    XL,
    /// A 16-bit address.
    L,
    /// A 24-bit address.
    K,
}

impl OperandShape {
    /// Field names and bit widths, in encoding order.
    pub fn fields(&self) -> &'static [(char, u32)] {
        match self {
            OperandShape::None => &[],
            OperandShape::X => &[('x', 8)],
            OperandShape::XY => &[('x', 8), ('y', 8)],
            OperandShape::XYZ => &[('x', 8), ('y', 8), ('z', 8)],
            OperandShape::XL => &[('x', 8), ('l', 16)],
            OperandShape::L => &[('l', 16)],
            OperandShape::K => &[('k', 24)],
        }
    }

    /// Bits a word of this shape may have set.
    fn mask(&self) -> u32 {
        match self {
            OperandShape::None => 0x0000_00FF,
            OperandShape::X => 0x0000_FFFF,
            OperandShape::XY => 0x00FF_FFFF,
            OperandShape::XYZ | OperandShape::XL | OperandShape::K => 0xFFFF_FFFF,
            OperandShape::L => 0xFFFF_00FF,
        }
    }
}

/// Decoded operand fields, one variant per shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    None,
    X { x: u8 },
    XY { x: u8, y: u8 },
    XYZ { x: u8, y: u8, z: u8 },
    XL { x: u8, l: u16 },
    L { l: u16 },
    K { k: u32 },
}

impl Operands {
    /// The shape these operands belong to.
    pub fn shape(&self) -> OperandShape {
        match self {
            Operands::None => OperandShape::None,
            Operands::X { .. } => OperandShape::X,
            Operands::XY { .. } => OperandShape::XY,
            Operands::XYZ { .. } => OperandShape::XYZ,
            Operands::XL { .. } => OperandShape::XL,
            Operands::L { .. } => OperandShape::L,
            Operands::K { .. } => OperandShape::K,
        }
    }
}

/// A single eazy instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// The operation to perform.
    pub opcode: Opcode,
    /// Operand fields. Must match `opcode.shape()` to encode.
    pub operands: Operands,
}

impl Instruction {
    /// Create a new instruction. Shape agreement is checked by [`encode`](Self::encode).
    pub fn new(opcode: Opcode, operands: Operands) -> Self {
        Self { opcode, operands }
    }

    pub fn op(opcode: Opcode) -> Self {
        Self::new(opcode, Operands::None)
    }

    pub fn x(opcode: Opcode, x: u8) -> Self {
        Self::new(opcode, Operands::X { x })
    }

    pub fn xy(opcode: Opcode, x: u8, y: u8) -> Self {
        Self::new(opcode, Operands::XY { x, y })
    }

    pub fn xyz(opcode: Opcode, x: u8, y: u8, z: u8) -> Self {
        Self::new(opcode, Operands::XYZ { x, y, z })
    }

    pub fn xl(opcode: Opcode, x: u8, l: u16) -> Self {
        Self::new(opcode, Operands::XL { x, l })
    }

    pub fn l(opcode: Opcode, l: u16) -> Self {
        Self::new(opcode, Operands::L { l })
    }

    pub fn k(opcode: Opcode, k: u32) -> Self {
        Self::new(opcode, Operands::K { k })
    }

    /// Encode this instruction to a word.
    ///
    /// Fails if the operands do not match the opcode's shape or if `k`
    /// exceeds 24 bits.
    pub fn encode(&self) -> Result<u32, EncodingError> {
        let expected = self.opcode.shape();
        let got = self.operands.shape();
        if expected != got {
            return Err(EncodingError::ShapeMismatch {
                opcode: self.opcode,
                expected,
                got,
            });
        }

        let op = self.opcode as u32;
        let word = match self.operands {
            Operands::None => op,
            Operands::X { x } => op | (x as u32) << 8,
            Operands::XY { x, y } => op | (x as u32) << 8 | (y as u32) << 16,
            Operands::XYZ { x, y, z } => {
                op | (x as u32) << 8 | (y as u32) << 16 | (z as u32) << 24
            }
            Operands::XL { x, l } => op | (x as u32) << 8 | (l as u32) << 16,
            Operands::L { l } => op | (l as u32) << 16,
            Operands::K { k } => {
                if k > MAX_K {
                    return Err(EncodingError::FieldOverflow {
                        opcode: self.opcode,
                        field: 'k',
                        value: k as u64,
                        bits: 24,
                    });
                }
                op | k << 8
            }
        };
        Ok(word)
    }

    /// Decode a word into an instruction.
    pub fn decode(word: u32) -> Result<Self, DecodeError> {
        let opcode = Opcode::try_from((word & 0xFF) as u8)?;
        let shape = opcode.shape();

        if word & !shape.mask() != 0 {
            return Err(DecodeError::NonZeroPadding {
                opcode,
                shape,
                word,
            });
        }

        let x = (word >> 8) as u8;
        let y = (word >> 16) as u8;
        let z = (word >> 24) as u8;
        let l = (word >> 16) as u16;

        let operands = match shape {
            OperandShape::None => Operands::None,
            OperandShape::X => Operands::X { x },
            OperandShape::XY => Operands::XY { x, y },
            OperandShape::XYZ => Operands::XYZ { x, y, z },
            OperandShape::XL => Operands::XL { x, l },
            OperandShape::L => Operands::L { l },
            OperandShape::K => Operands::K { k: word >> 8 },
        };

        Ok(Self { opcode, operands })
    }
}

/// Encode an opcode and raw field values, checking arity and bit widths.
///
/// This is the entry point for producers that compute addresses as wide
/// integers and must not silently truncate them.
pub fn encode_fields(opcode: Opcode, fields: &[u64]) -> Result<u32, EncodingError> {
    let layout = opcode.shape().fields();
    if layout.len() != fields.len() {
        return Err(EncodingError::ArityMismatch {
            opcode,
            expected: layout.len(),
            got: fields.len(),
        });
    }

    for (&(field, bits), &value) in layout.iter().zip(fields) {
        if value >> bits != 0 {
            return Err(EncodingError::FieldOverflow {
                opcode,
                field,
                value,
                bits,
            });
        }
    }

    // Widths are checked above, so the casts are lossless.
    let f = |i: usize| fields[i];
    let operands = match opcode.shape() {
        OperandShape::None => Operands::None,
        OperandShape::X => Operands::X { x: f(0) as u8 },
        OperandShape::XY => Operands::XY {
            x: f(0) as u8,
            y: f(1) as u8,
        },
        OperandShape::XYZ => Operands::XYZ {
            x: f(0) as u8,
            y: f(1) as u8,
            z: f(2) as u8,
        },
        OperandShape::XL => Operands::XL {
            x: f(0) as u8,
            l: f(1) as u16,
        },
        OperandShape::L => Operands::L { l: f(0) as u16 },
        OperandShape::K => Operands::K { k: f(0) as u32 },
    };

    Instruction::new(opcode, operands).encode()
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        match (self.opcode, self.operands) {
            (_, Operands::None) => Ok(()),
            (_, Operands::X { x }) => write!(f, " r{x}"),
            (Opcode::LoadBoolean, Operands::XY { x, y }) => write!(f, " r{x} {}", y != 0),
            (_, Operands::XY { x, y }) => write!(f, " r{x} r{y}"),
            (_, Operands::XYZ { x, y, z }) => write!(f, " r{x} r{y} r{z}"),
            (Opcode::LoadConst, Operands::XL { x, l }) => write!(f, " r{x} c{l}"),
            (Opcode::LoadNumber, Operands::XL { x, l }) => write!(f, " r{x} {l}"),
            (_, Operands::XL { x, l }) => write!(f, " r{x} @{l}"),
            (_, Operands::L { l }) => write!(f, " @{l}"),
            (_, Operands::K { k }) => write!(f, " @{k}"),
        }
    }
}
