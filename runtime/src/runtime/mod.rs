mod config;
mod executor;

pub use config::RuntimeConfig;
pub use executor::{Execution, Runtime};

use thiserror::Error;

/// Errors that can occur in the runtime
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("VM error: {0}")]
    VMError(#[from] crate::vm::VMError),

    #[error("Bytecode loading error: {0}")]
    LoadError(#[from] crate::bytecode::LoadError),

    #[error("Cannot schedule sleep: no tokio runtime is running")]
    NoScheduler,

    #[error("Resumption task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
