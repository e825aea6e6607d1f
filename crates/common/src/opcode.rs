//! Opcode definitions for the eazy instruction set.
//!
//! Every opcode has exactly one [`OperandShape`], looked up through
//! [`Opcode::shape`]. The decoder never interprets a word under any other
//! shape.

use std::fmt;

use crate::error::DecodeError;
use crate::instruction::OperandShape;

/// Identifies the operation to perform.
///
/// The `#[repr(u8)]` attribute gives each variant a stable byte value; the
/// compiler rejects two variants sharing one.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Core
    /// Stop the machine.
    Stop = 0x01,
    /// Raise the value in register X.
    Throw = 0x02,
    /// Register a catch frame resuming at address K.
    Catch = 0x03,
    /// Discard the innermost catch frame.
    EndCatch = 0x04,
    /// Move the most recently raised value into register X.
    PopError = 0x05,
    /// Jump to address L.
    Jump = 0x06,
    /// Jump to address L if register X holds `true`.
    JumpIf = 0x07,
    /// Pause execution for the host.
    Break = 0x08,

    // Registers
    /// Append X registers to the current frame.
    Alloc = 0x10,
    /// Y = X.
    Move = 0x11,
    /// Exchange X and Y.
    Swap = 0x12,
    /// Y = shallow copy of X.
    Copy = 0x13,

    // Arithmetic
    Add = 0x20,
    Sub = 0x21,
    Mul = 0x22,
    Div = 0x23,
    Pow = 0x24,
    Mod = 0x25,
    And = 0x26,
    Or = 0x27,
    /// Y = not X.
    Not = 0x28,

    // Comparison
    Eq = 0x30,
    Neq = 0x31,
    Is = 0x32,
    IsNot = 0x33,
    In = 0x34,
    NotIn = 0x35,
    Lt = 0x36,
    Lte = 0x37,
    Gt = 0x38,
    Gte = 0x39,

    // Load
    /// Resize the current frame to X registers.
    ExpandVars = 0x40,
    /// X = constant L.
    LoadConst = 0x41,
    LoadNothing = 0x42,
    /// X = (Y != 0).
    LoadBoolean = 0x43,
    /// X = L as a Number.
    LoadNumber = 0x44,
    LoadString = 0x45,
    LoadList = 0x46,
    LoadMap = 0x47,

    // Collections
    /// Z = X ++ Y.
    Merge = 0x50,
    /// Z = X[Y].
    Get = 0x51,
    /// X[Y] = Z.
    Set = 0x52,
    /// Append Y to the list in X.
    Push = 0x53,
    /// Y = count of X.
    Count = 0x54,
    /// Make the collection in X immutable.
    Freeze = 0x55,

    // Functions
    PushArg = 0x60,
    Call = 0x61,
    CallClosure = 0x62,
    CallExtension = 0x63,
    Return = 0x64,
    PushEnv = 0x65,
    /// X = closure over the staged environment, entering at L.
    Closure = 0x66,

    // Reflection
    Type = 0x70,
    Describe = 0x71,
    StackTrace = 0x72,
}

/// All valid opcodes, in definition order. Useful for exhaustive testing.
pub const ALL_OPCODES: [Opcode; 55] = [
    Opcode::Stop,
    Opcode::Throw,
    Opcode::Catch,
    Opcode::EndCatch,
    Opcode::PopError,
    Opcode::Jump,
    Opcode::JumpIf,
    Opcode::Break,
    Opcode::Alloc,
    Opcode::Move,
    Opcode::Swap,
    Opcode::Copy,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::Pow,
    Opcode::Mod,
    Opcode::And,
    Opcode::Or,
    Opcode::Not,
    Opcode::Eq,
    Opcode::Neq,
    Opcode::Is,
    Opcode::IsNot,
    Opcode::In,
    Opcode::NotIn,
    Opcode::Lt,
    Opcode::Lte,
    Opcode::Gt,
    Opcode::Gte,
    Opcode::ExpandVars,
    Opcode::LoadConst,
    Opcode::LoadNothing,
    Opcode::LoadBoolean,
    Opcode::LoadNumber,
    Opcode::LoadString,
    Opcode::LoadList,
    Opcode::LoadMap,
    Opcode::Merge,
    Opcode::Get,
    Opcode::Set,
    Opcode::Push,
    Opcode::Count,
    Opcode::Freeze,
    Opcode::PushArg,
    Opcode::Call,
    Opcode::CallClosure,
    Opcode::CallExtension,
    Opcode::Return,
    Opcode::PushEnv,
    Opcode::Closure,
    Opcode::Type,
    Opcode::Describe,
    Opcode::StackTrace,
];

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Err(DecodeError::IllegalOpcode),

            0x01 => Ok(Opcode::Stop),
            0x02 => Ok(Opcode::Throw),
            0x03 => Ok(Opcode::Catch),
            0x04 => Ok(Opcode::EndCatch),
            0x05 => Ok(Opcode::PopError),
            0x06 => Ok(Opcode::Jump),
            0x07 => Ok(Opcode::JumpIf),
            0x08 => Ok(Opcode::Break),

            0x10 => Ok(Opcode::Alloc),
            0x11 => Ok(Opcode::Move),
            0x12 => Ok(Opcode::Swap),
            0x13 => Ok(Opcode::Copy),

            0x20 => Ok(Opcode::Add),
            0x21 => Ok(Opcode::Sub),
            0x22 => Ok(Opcode::Mul),
            0x23 => Ok(Opcode::Div),
            0x24 => Ok(Opcode::Pow),
            0x25 => Ok(Opcode::Mod),
            0x26 => Ok(Opcode::And),
            0x27 => Ok(Opcode::Or),
            0x28 => Ok(Opcode::Not),

            0x30 => Ok(Opcode::Eq),
            0x31 => Ok(Opcode::Neq),
            0x32 => Ok(Opcode::Is),
            0x33 => Ok(Opcode::IsNot),
            0x34 => Ok(Opcode::In),
            0x35 => Ok(Opcode::NotIn),
            0x36 => Ok(Opcode::Lt),
            0x37 => Ok(Opcode::Lte),
            0x38 => Ok(Opcode::Gt),
            0x39 => Ok(Opcode::Gte),

            0x40 => Ok(Opcode::ExpandVars),
            0x41 => Ok(Opcode::LoadConst),
            0x42 => Ok(Opcode::LoadNothing),
            0x43 => Ok(Opcode::LoadBoolean),
            0x44 => Ok(Opcode::LoadNumber),
            0x45 => Ok(Opcode::LoadString),
            0x46 => Ok(Opcode::LoadList),
            0x47 => Ok(Opcode::LoadMap),

            0x50 => Ok(Opcode::Merge),
            0x51 => Ok(Opcode::Get),
            0x52 => Ok(Opcode::Set),
            0x53 => Ok(Opcode::Push),
            0x54 => Ok(Opcode::Count),
            0x55 => Ok(Opcode::Freeze),

            0x60 => Ok(Opcode::PushArg),
            0x61 => Ok(Opcode::Call),
            0x62 => Ok(Opcode::CallClosure),
            0x63 => Ok(Opcode::CallExtension),
            0x64 => Ok(Opcode::Return),
            0x65 => Ok(Opcode::PushEnv),
            0x66 => Ok(Opcode::Closure),

            0x70 => Ok(Opcode::Type),
            0x71 => Ok(Opcode::Describe),
            0x72 => Ok(Opcode::StackTrace),

            _ => Err(DecodeError::ReservedOpcode(value)),
        }
    }
}

impl Opcode {
    /// The operand shape this opcode is always encoded with.
    pub fn shape(&self) -> OperandShape {
        match self {
            Opcode::Stop | Opcode::EndCatch | Opcode::Break => OperandShape::None,

            Opcode::Throw
            | Opcode::PopError
            | Opcode::Alloc
            | Opcode::ExpandVars
            | Opcode::LoadNothing
            | Opcode::LoadString
            | Opcode::LoadList
            | Opcode::LoadMap
            | Opcode::Freeze
            | Opcode::PushArg
            | Opcode::CallClosure
            | Opcode::Return
            | Opcode::PushEnv
            | Opcode::StackTrace => OperandShape::X,

            Opcode::Move
            | Opcode::Swap
            | Opcode::Copy
            | Opcode::Not
            | Opcode::LoadBoolean
            | Opcode::Push
            | Opcode::Count
            | Opcode::Type
            | Opcode::Describe => OperandShape::XY,

            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Pow
            | Opcode::Mod
            | Opcode::And
            | Opcode::Or
            | Opcode::Eq
            | Opcode::Neq
            | Opcode::Is
            | Opcode::IsNot
            | Opcode::In
            | Opcode::NotIn
            | Opcode::Lt
            | Opcode::Lte
            | Opcode::Gt
            | Opcode::Gte
            | Opcode::Merge
            | Opcode::Get
            | Opcode::Set => OperandShape::XYZ,

            Opcode::JumpIf | Opcode::LoadConst | Opcode::LoadNumber | Opcode::Closure => {
                OperandShape::XL
            }

            Opcode::Jump => OperandShape::L,

            Opcode::Catch | Opcode::Call | Opcode::CallExtension => OperandShape::K,
        }
    }

    /// Returns the assembly mnemonic for this opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Stop => "stop",
            Opcode::Throw => "throw",
            Opcode::Catch => "catch",
            Opcode::EndCatch => "end_catch",
            Opcode::PopError => "pop_error",
            Opcode::Jump => "jump",
            Opcode::JumpIf => "jump_if",
            Opcode::Break => "break",
            Opcode::Alloc => "alloc",
            Opcode::Move => "move",
            Opcode::Swap => "swap",
            Opcode::Copy => "copy",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Pow => "pow",
            Opcode::Mod => "mod",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Not => "not",
            Opcode::Eq => "eq",
            Opcode::Neq => "neq",
            Opcode::Is => "is",
            Opcode::IsNot => "is_not",
            Opcode::In => "in",
            Opcode::NotIn => "not_in",
            Opcode::Lt => "lt",
            Opcode::Lte => "lte",
            Opcode::Gt => "gt",
            Opcode::Gte => "gte",
            Opcode::ExpandVars => "expand_vars",
            Opcode::LoadConst => "load_const",
            Opcode::LoadNothing => "load_nothing",
            Opcode::LoadBoolean => "load_boolean",
            Opcode::LoadNumber => "load_number",
            Opcode::LoadString => "load_string",
            Opcode::LoadList => "load_list",
            Opcode::LoadMap => "load_map",
            Opcode::Merge => "merge",
            Opcode::Get => "get",
            Opcode::Set => "set",
            Opcode::Push => "push",
            Opcode::Count => "count",
            Opcode::Freeze => "freeze",
            Opcode::PushArg => "push_arg",
            Opcode::Call => "call",
            Opcode::CallClosure => "call_closure",
            Opcode::CallExtension => "call_extension",
            Opcode::Return => "return",
            Opcode::PushEnv => "push_env",
            Opcode::Closure => "closure",
            Opcode::Type => "type",
            Opcode::Describe => "describe",
            Opcode::StackTrace => "stack_trace",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
