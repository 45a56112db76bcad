//! Bytecode emission with symbolic jump labels

mod context;
mod emit;

pub use context::{CompilerContext, CompilerOptions};
pub use emit::{generate_program, ControlSignal};

use cw2::bytecode::{Instruction, OpCode, Operand};
use log::debug;
use serde::Serialize;

/// Label operands are emitted as `LABEL_OFFSET + id` until patched
pub const LABEL_OFFSET: u32 = 0x0100_0000;

/// A jump target that is bound to an instruction index later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Label(u32);

impl Label {
    pub fn id(self) -> u32 {
        self.0
    }

    fn operand(self) -> Operand {
        Operand::Addr(LABEL_OFFSET + self.0)
    }
}

/// Flat instruction list plus the label table
#[derive(Debug, Default)]
pub struct CodeGenerator {
    instructions: Vec<Instruction>,
    labels: Vec<Option<u32>>,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn add_instruction(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn emit(&mut self, opcode: OpCode) {
        self.add_instruction(Instruction::new(opcode));
    }

    pub fn emit_imm(&mut self, opcode: OpCode, value: f32) {
        self.add_instruction(Instruction::new(opcode).with_operand(Operand::Imm(value)));
    }

    pub fn emit_index(&mut self, opcode: OpCode, index: u32) {
        self.add_instruction(Instruction::new(opcode).with_operand(Operand::Index(index)));
    }

    pub fn emit_jump(&mut self, opcode: OpCode, target: Label) {
        self.add_instruction(Instruction::new(opcode).with_operand(target.operand()));
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    /// Bind `label` to the index of the next emitted instruction
    pub fn set_label_at_next_instruction(&mut self, label: Label) {
        let at = self.instructions.len() as u32;
        if let Some(slot) = self.labels.get_mut(label.0 as usize) {
            *slot = Some(at);
        }
    }

    /// `CLEAR_SCOPE clear` when needed, then `GOTO target`
    pub fn add_jump_instruction(&mut self, clear: u32, target: Label) {
        if clear > 0 {
            self.emit_index(OpCode::ClearScope, clear);
        }
        self.emit_jump(OpCode::Goto, target);
    }

    /// `CLEAR_SCOPE clear` when needed, then `RET`
    pub fn add_return_instruction(&mut self, clear: u32) {
        if clear > 0 {
            self.emit_index(OpCode::ClearScope, clear);
        }
        self.emit(OpCode::Ret);
    }

    /// Patch every label operand with its bound instruction index
    pub fn replace_labels(self) -> Result<Vec<Instruction>, CodegenError> {
        let CodeGenerator {
            mut instructions,
            labels,
        } = self;

        for (at, instruction) in instructions.iter_mut().enumerate() {
            for operand in instruction.operands.iter_mut() {
                let raw = match operand {
                    Operand::Addr(raw) if *raw >= LABEL_OFFSET => *raw,
                    _ => continue,
                };
                let id = raw - LABEL_OFFSET;
                match labels.get(id as usize).copied().flatten() {
                    Some(target) => *operand = Operand::Addr(target),
                    None => return Err(CodegenError::UnresolvedLabel { label: id, at }),
                }
            }
        }

        debug!("patched {} label(s) in {} instruction(s)", labels.len(), instructions.len());
        Ok(instructions)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodegenError {
    #[error("Label {label} used by instruction {at} was never placed")]
    UnresolvedLabel { label: u32, at: usize },

    #[error("Program has {0} instructions, more than jump operands can address")]
    ProgramTooLarge(usize),

    #[error("Program needs {slots} global slots, more than the {max} a module may declare")]
    TooManyGlobals { slots: u32, max: u32 },
}
