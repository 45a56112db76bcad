use thiserror::Error;

use crate::bytecode::{BytecodeModule, Header, OpCode, MAX_GLOBAL_SLOTS, MAX_IMAGE_BUFFERS};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerifyError {
    #[error("Image buffer count must be at least 1")]
    NoImageBuffers,

    #[error("Header declares {count} image buffers, more than {max}")]
    TooManyImageBuffers { count: u32, max: u32 },

    #[error("Header declares {slots} global slots, more than {max}")]
    TooManyGlobals { slots: u32, max: u32 },

    #[error("Instruction {at} ({opcode:?}) has malformed operands")]
    MalformedOperands { at: usize, opcode: OpCode },

    #[error("Instruction {at} jumps to {target}, past the end of the program ({len} instructions)")]
    JumpOutOfRange { at: usize, target: u32, len: usize },

    #[error("Instruction {at} accesses global slots {index}..{end} but only {slots} exist")]
    GlobalOutOfRange { at: usize, index: u32, end: u64, slots: u32 },

    #[error("Instruction {at} refers to image buffer {index} but only {count} exist")]
    ImageOutOfRange { at: usize, index: u32, count: u32 },

    #[error("Instruction {at} addresses local distance {distance}, which is below {width}")]
    LocalDistance { at: usize, distance: u32, width: u32 },

    #[error("Instruction {at} ({opcode:?}) needs at least one argument")]
    EmptyVariadic { at: usize, opcode: OpCode },
}

/// Static checks run before a module is handed to the VM
///
/// After this passes, every jump target, global slot and buffer index in the
/// module is in range, so the VM only has to check things that depend on
/// run-time stack depth.
pub fn verify(module: &BytecodeModule) -> Result<(), VerifyError> {
    let header = &module.header;
    let len = module.instructions.len();

    verify_header(header)?;

    for (at, instruction) in module.instructions.iter().enumerate() {
        let opcode = instruction.opcode;
        if !instruction.is_well_formed() {
            return Err(VerifyError::MalformedOperands { at, opcode });
        }

        if opcode.is_jump() {
            let target = instruction.addr(0).unwrap_or(u32::MAX);
            if target as usize >= len {
                return Err(VerifyError::JumpOutOfRange { at, target, len });
            }
        }

        if let Some(width) = opcode.global_width() {
            let index = instruction.index(0).unwrap_or(u32::MAX);
            let end = index as u64 + width as u64;
            if end > header.global_slots as u64 {
                return Err(VerifyError::GlobalOutOfRange {
                    at,
                    index,
                    end,
                    slots: header.global_slots,
                });
            }
        }

        // A composite local at distance d occupies d, d-1, ... so it needs d >= width
        if let Some(width) = opcode.local_width() {
            let distance = instruction.index(0).unwrap_or(0);
            if distance < width {
                return Err(VerifyError::LocalDistance { at, distance, width });
            }
        }

        match opcode {
            OpCode::SetImage | OpCode::CopyImage => {
                for slot in 0..opcode.num_operands() {
                    let index = instruction.index(slot).unwrap_or(u32::MAX);
                    if index >= header.image_buffers {
                        return Err(VerifyError::ImageOutOfRange {
                            at,
                            index,
                            count: header.image_buffers,
                        });
                    }
                }
            }
            OpCode::Min | OpCode::Max | OpCode::Sum => {
                if instruction.index(0) == Some(0) {
                    return Err(VerifyError::EmptyVariadic { at, opcode });
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Bounds on what loading a header allocates
pub fn verify_header(header: &Header) -> Result<(), VerifyError> {
    if header.image_buffers == 0 {
        return Err(VerifyError::NoImageBuffers);
    }
    if header.image_buffers > MAX_IMAGE_BUFFERS {
        return Err(VerifyError::TooManyImageBuffers {
            count: header.image_buffers,
            max: MAX_IMAGE_BUFFERS,
        });
    }
    if header.global_slots > MAX_GLOBAL_SLOTS {
        return Err(VerifyError::TooManyGlobals {
            slots: header.global_slots,
            max: MAX_GLOBAL_SLOTS,
        });
    }
    Ok(())
}
