use std::fmt;

use crate::bytecode::{OpCode, OperandKind};

/// A typed instruction operand
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Imm(f32),
    Index(u32),
    Addr(u32),
}

impl Operand {
    /// Decode a raw file value according to the slot kind
    pub fn from_raw(kind: OperandKind, raw: u32) -> Self {
        match kind {
            OperandKind::Imm => Operand::Imm(f32::from_bits(raw)),
            OperandKind::Index => Operand::Index(raw),
            OperandKind::Addr => Operand::Addr(raw),
        }
    }

    /// Raw value written to a bytecode file
    pub fn to_raw(self) -> u32 {
        match self {
            Operand::Imm(value) => value.to_bits(),
            Operand::Index(value) | Operand::Addr(value) => value,
        }
    }

    pub fn kind(self) -> OperandKind {
        match self {
            Operand::Imm(_) => OperandKind::Imm,
            Operand::Index(_) => OperandKind::Index,
            Operand::Addr(_) => OperandKind::Addr,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Imm(value) => write!(f, "{}", value),
            Operand::Index(value) => write!(f, "#{}", value),
            Operand::Addr(value) => write!(f, "@{}", value),
        }
    }
}

/// Represents a single bytecode instruction with its operands
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: OpCode,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(opcode: OpCode) -> Self {
        Self {
            opcode,
            operands: Vec::new(),
        }
    }

    pub fn with_operand(mut self, operand: Operand) -> Self {
        self.operands.push(operand);
        self
    }

    pub fn with_operands(mut self, operands: Vec<Operand>) -> Self {
        self.operands.extend(operands);
        self
    }

    /// Immediate operand at `slot`, if that slot holds one
    pub fn imm(&self, slot: usize) -> Option<f32> {
        match self.operands.get(slot) {
            Some(Operand::Imm(value)) => Some(*value),
            _ => None,
        }
    }

    /// Index operand at `slot`, if that slot holds one
    pub fn index(&self, slot: usize) -> Option<u32> {
        match self.operands.get(slot) {
            Some(Operand::Index(value)) => Some(*value),
            _ => None,
        }
    }

    /// Address operand at `slot`, if that slot holds one
    pub fn addr(&self, slot: usize) -> Option<u32> {
        match self.operands.get(slot) {
            Some(Operand::Addr(value)) => Some(*value),
            _ => None,
        }
    }

    /// Whether the operands match the opcode's declared kinds
    pub fn is_well_formed(&self) -> bool {
        let kinds = self.opcode.operand_kinds();
        kinds.len() == self.operands.len()
            && kinds.iter().zip(&self.operands).all(|(kind, operand)| operand.kind() == *kind)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.opcode)?;
        for operand in &self.operands {
            write!(f, " {}", operand)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let instruction = Instruction::new(OpCode::PushPoint)
            .with_operands(vec![Operand::Imm(1.5), Operand::Imm(-2.0)]);
        assert_eq!(instruction.imm(0), Some(1.5));
        assert_eq!(instruction.imm(1), Some(-2.0));
        assert_eq!(instruction.index(0), None);
        assert!(instruction.is_well_formed());
    }

    #[test]
    fn test_imm_raw_preserves_bits() {
        let operand = Operand::Imm(0.1);
        let raw = operand.to_raw();
        assert_eq!(Operand::from_raw(OperandKind::Imm, raw), operand);
    }

    #[test]
    fn test_wrong_operand_kind_is_not_well_formed() {
        let instruction = Instruction::new(OpCode::Goto).with_operand(Operand::Index(3));
        assert!(!instruction.is_well_formed());
        let instruction = Instruction::new(OpCode::Goto);
        assert!(!instruction.is_well_formed());
    }

    #[test]
    fn test_display() {
        let instruction = Instruction::new(OpCode::CopyImage)
            .with_operands(vec![Operand::Index(0), Operand::Index(2)]);
        assert_eq!(instruction.to_string(), "CopyImage #0 #2");
        let instruction = Instruction::new(OpCode::Call).with_operand(Operand::Addr(12));
        assert_eq!(instruction.to_string(), "Call @12");
    }
}
