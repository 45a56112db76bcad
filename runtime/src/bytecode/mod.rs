mod instruction;
mod opcode;
mod parser;
mod verify;
mod writer;

pub use instruction::{Instruction, Operand};
pub use opcode::{OpCode, OperandKind, ALL_OPCODES};
pub use parser::{LoadError, Parser};
pub use verify::{verify, verify_header, VerifyError};
pub use writer::Writer;

pub const DEFAULT_IMAGE_BUFFERS: u32 = 1;
pub const DEFAULT_MAX_CALL_STACK: u32 = 2048;
pub const DEFAULT_MAX_LOCAL_STACK: u32 = 65536;
pub const DEFAULT_MAX_STACK: u32 = 65536;

/// Upper bounds a header may declare; buffers and globals are allocated up front
pub const MAX_IMAGE_BUFFERS: u32 = 255;
pub const MAX_GLOBAL_SLOTS: u32 = 65536;

/// Limits and sizes stored at the top of a bytecode file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Number of image buffers, buffer 0 being the live canvas
    pub image_buffers: u32,
    pub max_call_stack: u32,
    pub max_local_stack: u32,
    pub max_stack: u32,
    /// Number of global value slots
    pub global_slots: u32,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            image_buffers: DEFAULT_IMAGE_BUFFERS,
            max_call_stack: DEFAULT_MAX_CALL_STACK,
            max_local_stack: DEFAULT_MAX_LOCAL_STACK,
            max_stack: DEFAULT_MAX_STACK,
            global_slots: 0,
        }
    }
}

/// Represents a loaded bytecode program
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BytecodeModule {
    pub header: Header,
    pub instructions: Vec<Instruction>,
}

impl BytecodeModule {
    pub fn new(header: Header) -> Self {
        Self {
            header,
            instructions: Vec::new(),
        }
    }

    pub fn with_instructions(header: Header, instructions: Vec<Instruction>) -> Self {
        Self {
            header,
            instructions,
        }
    }

    /// Serialize to the `.cw2c` text format
    pub fn to_text(&self) -> String {
        let mut buffer = Vec::new();
        // Writing into a Vec cannot fail
        let _ = Writer::write(self, &mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Human readable listing, one instruction per line
    pub fn disassemble(&self) -> String {
        let mut listing = format!(
            "; buffers={} call_stack={} local_stack={} stack={} globals={}\n",
            self.header.image_buffers,
            self.header.max_call_stack,
            self.header.max_local_stack,
            self.header.max_stack,
            self.header.global_slots,
        );
        for (index, instruction) in self.instructions.iter().enumerate() {
            listing.push_str(&format!("{:5}  {}\n", index, instruction));
        }
        listing
    }
}
