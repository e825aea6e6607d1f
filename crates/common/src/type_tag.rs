//! Dynamic type tags for runtime values.

use std::fmt;

/// Identifies the dynamic type of a value. One tag per [`Value`](crate::Value) variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Nothing,
    Boolean,
    Number,
    String,
    List,
    Map,
    Closure,
}

impl TypeTag {
    /// Returns the name the `type` opcode reports for this tag.
    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Nothing => "Nothing",
            TypeTag::Boolean => "Boolean",
            TypeTag::Number => "Number",
            TypeTag::String => "String",
            TypeTag::List => "List",
            TypeTag::Map => "Map",
            TypeTag::Closure => "Closure",
        }
    }

    /// Returns true for the types that can be indexed with `get`.
    pub fn is_indexable(&self) -> bool {
        matches!(self, TypeTag::String | TypeTag::List | TypeTag::Map)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
