mod error;
mod execution_context;
mod interpreter;

pub use error::{VMError, VMResult};
pub use execution_context::ExecutionContext;
pub use interpreter::{DrawState, VM};

use std::fmt;
use std::time::Duration;

/// Lifecycle of a VM
///
/// ```text
/// Empty --load--> Loaded --execute--> Running --sleep--> Suspended
///                                        |                   |
///                                        |<----execute-------+
///                                        v
///                                     Halted
/// ```
///
/// `halt()` moves any state to `Halted`; `load()` is allowed from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VMState {
    Empty,
    Loaded,
    Running,
    Suspended,
    Halted,
}

impl fmt::Display for VMState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VMState::Empty => write!(f, "empty"),
            VMState::Loaded => write!(f, "loaded"),
            VMState::Running => write!(f, "running"),
            VMState::Suspended => write!(f, "suspended"),
            VMState::Halted => write!(f, "halted"),
        }
    }
}

/// Why a call to [`VM::execute`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The program finished or executed `HALT`
    Halted,
    /// The program executed `SLEEP`; call `execute` again after the delay
    Sleep(Duration),
}
