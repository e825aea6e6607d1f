//! Resource limits for a machine.

/// Default maximum number of nested calls.
pub const MAX_CALL_DEPTH: usize = 1024;

/// Default maximum length of the variable stack, across all frames.
pub const MAX_REGISTERS: usize = 65_536;

/// Limits applied while executing.
///
/// Exceeding either limit raises a catchable `StackOverflow` error in the
/// running program rather than aborting the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    pub max_call_depth: usize,
    pub max_registers: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: MAX_CALL_DEPTH,
            max_registers: MAX_REGISTERS,
        }
    }
}

impl VmConfig {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_registers(mut self, registers: usize) -> Self {
        self.max_registers = registers;
        self
    }
}
