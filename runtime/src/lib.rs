// cw2 - Bytecode loader and stack VM for CW2 drawing scripts

pub mod bytecode;
pub mod canvas;
pub mod runtime;
pub mod utils;
pub mod vm;

pub use bytecode::{BytecodeModule, Header, Instruction, OpCode, Operand};
pub use canvas::{Canvas, Pixel, RecordingCanvas, Rgba};
pub use runtime::{Execution, Runtime, RuntimeConfig, RuntimeError};
pub use vm::{Outcome, VMError, VMState, VM};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
