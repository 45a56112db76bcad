use thiserror::Error;

use crate::bytecode::{OpCode, VerifyError};
use crate::vm::VMState;

/// Error type for VM operations
#[derive(Error, Debug)]
pub enum VMError {
    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Stack overflow (limit {0})")]
    StackOverflow(u32),

    #[error("Local stack overflow (limit {0})")]
    LocalStackOverflow(u32),

    #[error("Invalid local variable distance: {0}")]
    InvalidLocalIndex(u32),

    #[error("Cannot clear {0} local slot(s)")]
    InvalidScopeClear(u32),

    #[error("Invalid global slot: {0}")]
    InvalidGlobalIndex(u32),

    #[error("Call stack overflow (limit {0})")]
    CallStackOverflow(u32),

    #[error("Return without a matching call")]
    CallStackUnderflow,

    #[error("Invalid operand")]
    InvalidOperand,

    #[error("Cannot execute while the VM is {0}")]
    NotRunnable(VMState),

    #[error("Bytecode rejected: {0}")]
    Verification(#[from] VerifyError),

    #[error("Error at instruction {pc} ({opcode:?}): {source}")]
    Trap {
        pc: usize,
        opcode: OpCode,
        #[source]
        source: Box<VMError>,
    },
}

impl VMError {
    /// Strip the instruction location, if any
    pub fn root(&self) -> &VMError {
        match self {
            VMError::Trap { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for VM operations
pub type VMResult<T> = Result<T, VMError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_error_stack_underflow_display() {
        let error = VMError::StackUnderflow;
        assert_eq!(error.to_string(), "Stack underflow");
    }

    #[test]
    fn test_vm_error_limits_display() {
        assert_eq!(VMError::StackOverflow(16).to_string(), "Stack overflow (limit 16)");
        assert_eq!(
            VMError::CallStackOverflow(2048).to_string(),
            "Call stack overflow (limit 2048)"
        );
        assert_eq!(
            VMError::InvalidLocalIndex(5).to_string(),
            "Invalid local variable distance: 5"
        );
    }

    #[test]
    fn test_vm_error_not_runnable_display() {
        let error = VMError::NotRunnable(VMState::Halted);
        assert_eq!(error.to_string(), "Cannot execute while the VM is halted");
    }

    #[test]
    fn test_trap_display_and_root() {
        let error = VMError::Trap {
            pc: 7,
            opcode: OpCode::Pop,
            source: Box::new(VMError::StackUnderflow),
        };
        assert_eq!(error.to_string(), "Error at instruction 7 (Pop): Stack underflow");
        assert!(matches!(error.root(), VMError::StackUnderflow));
    }

    #[test]
    fn test_from_verify_error() {
        let error: VMError = VerifyError::NoImageBuffers.into();
        match error {
            VMError::Verification(VerifyError::NoImageBuffers) => {}
            other => panic!("Expected Verification, got {:?}", other),
        }
    }
}
