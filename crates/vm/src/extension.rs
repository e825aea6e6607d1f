//! Host extensions reachable through `call_extension`.

use eazy_common::Value;

/// A host function callable from bytecode.
///
/// Receives the staged arguments in the order they were pushed. An `Err`
/// value is raised in the running program as an `ExtensionError`.
pub trait Extension {
    fn call(&mut self, args: &[Value]) -> Result<Value, Value>;
}

impl<F> Extension for F
where
    F: FnMut(&[Value]) -> Result<Value, Value>,
{
    fn call(&mut self, args: &[Value]) -> Result<Value, Value> {
        self(args)
    }
}
