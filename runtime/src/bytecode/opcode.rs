/// Opcodes for the VM
///
/// The discriminant is the opcode id written to `.cw2c` files, so the order
/// of this enum is part of the file format.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Nop = 0,

    // Operand stack
    Push = 1,          // Push immediate (1 operand)
    PushPoint = 2,     // Push two immediates (2 operands)
    Pop = 3,
    PopPoint = 4,
    PopColor = 5,

    // Field projection
    GetColorRed = 6,
    GetColorGreen = 7,
    GetColorBlue = 8,
    GetColorAlpha = 9,
    GetPointX = 10,
    GetPointY = 11,

    // Local stack
    AddLocal = 12,
    AddLocalPoint = 13,
    AddLocalColor = 14,
    ClearScope = 15,   // Drop n local slots (1 operand)

    // Locals, addressed by distance from the local stack top (1 operand)
    Load = 16,
    LoadPoint = 17,
    LoadColor = 18,
    Store = 19,
    StorePoint = 20,
    StoreColor = 21,

    // Globals, addressed by absolute slot (1 operand)
    LoadGlobal = 22,
    LoadPointGlobal = 23,
    LoadColorGlobal = 24,
    StoreGlobal = 25,
    StorePointGlobal = 26,
    StoreColorGlobal = 27,

    // Arithmetic
    Add = 28,
    AddPoint = 29,
    AddColor = 30,
    AddToPoint = 31,   // Point + Number broadcast
    AddToColor = 32,
    Sub = 33,
    SubPoint = 34,
    SubColor = 35,
    SubFromPoint = 36, // Point - Number broadcast
    SubFromColor = 37,
    Mul = 38,
    MulPointOnNumber = 39,
    MulColorOnNumber = 40,
    Div = 41,
    DivPointOnNumber = 42,
    DivColorOnNumber = 43,
    Mod = 44,
    ModPointOnNumber = 45,
    ModColorOnNumber = 46,
    Pow = 47,
    PowPointToNumber = 48,
    PowColorToNumber = 49,
    Neg = 50,
    NegPoint = 51,
    NegColor = 52,
    Inc = 53,
    Dec = 54,

    // Logic and comparison
    Not = 55,
    CmpEq = 56,
    CmpEqPoints = 57,
    CmpEqColors = 58,
    CmpNeq = 59,
    CmpNeqPoints = 60,
    CmpNeqColors = 61,
    CmpLt = 62,
    CmpGt = 63,
    CmpGe = 64,
    CmpLe = 65,
    And = 66,
    Or = 67,

    // Control flow (1 operand: instruction index)
    Goto = 68,
    GotoIfNot = 69,
    Call = 70,
    Ret = 71,
    Halt = 72,

    // Range loops
    InitRange = 73,
    CheckRange = 74,

    // Image and drawing
    PushWidth = 75,
    PushHeight = 76,
    SetImage = 77,     // Select target buffer (1 operand)
    CopyImage = 78,    // Copy buffer: destination, source (2 operands)
    Update = 79,
    SetColor = 80,
    SetWidth = 81,
    DrawPix = 82,
    DrawStroke = 83,
    DrawLine = 84,
    DrawRect = 85,
    DrawCircle = 86,
    FillRect = 87,
    FillCircle = 88,
    Sleep = 89,

    // Math intrinsics
    Abs = 90,
    Min = 91,          // Argument count (1 operand)
    Max = 92,
    Sum = 93,
    Round = 94,
    Floor = 95,
    Ceil = 96,
    Sin = 97,
    Cos = 98,
    Tan = 99,
    Cot = 100,
    Exp = 101,
    Log = 102,
    Length = 103,
    Distance = 104,
}

/// Kind of value an operand slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// A float immediate, stored as its bit pattern
    Imm,
    /// A slot index, distance, buffer index or count
    Index,
    /// An instruction index
    Addr,
}

use OperandKind::{Addr, Imm, Index};

const NO_OPERANDS: &[OperandKind] = &[];
const ONE_IMM: &[OperandKind] = &[Imm];
const TWO_IMM: &[OperandKind] = &[Imm, Imm];
const ONE_INDEX: &[OperandKind] = &[Index];
const TWO_INDEX: &[OperandKind] = &[Index, Index];
const ONE_ADDR: &[OperandKind] = &[Addr];

/// Every opcode, ordered by id
pub const ALL_OPCODES: [OpCode; 105] = [
    OpCode::Nop, OpCode::Push, OpCode::PushPoint, OpCode::Pop, OpCode::PopPoint,
    OpCode::PopColor, OpCode::GetColorRed, OpCode::GetColorGreen, OpCode::GetColorBlue,
    OpCode::GetColorAlpha, OpCode::GetPointX, OpCode::GetPointY, OpCode::AddLocal,
    OpCode::AddLocalPoint, OpCode::AddLocalColor, OpCode::ClearScope, OpCode::Load,
    OpCode::LoadPoint, OpCode::LoadColor, OpCode::Store, OpCode::StorePoint,
    OpCode::StoreColor, OpCode::LoadGlobal, OpCode::LoadPointGlobal,
    OpCode::LoadColorGlobal, OpCode::StoreGlobal, OpCode::StorePointGlobal,
    OpCode::StoreColorGlobal, OpCode::Add, OpCode::AddPoint, OpCode::AddColor,
    OpCode::AddToPoint, OpCode::AddToColor, OpCode::Sub, OpCode::SubPoint,
    OpCode::SubColor, OpCode::SubFromPoint, OpCode::SubFromColor, OpCode::Mul,
    OpCode::MulPointOnNumber, OpCode::MulColorOnNumber, OpCode::Div,
    OpCode::DivPointOnNumber, OpCode::DivColorOnNumber, OpCode::Mod,
    OpCode::ModPointOnNumber, OpCode::ModColorOnNumber, OpCode::Pow,
    OpCode::PowPointToNumber, OpCode::PowColorToNumber, OpCode::Neg, OpCode::NegPoint,
    OpCode::NegColor, OpCode::Inc, OpCode::Dec, OpCode::Not, OpCode::CmpEq,
    OpCode::CmpEqPoints, OpCode::CmpEqColors, OpCode::CmpNeq, OpCode::CmpNeqPoints,
    OpCode::CmpNeqColors, OpCode::CmpLt, OpCode::CmpGt, OpCode::CmpGe, OpCode::CmpLe,
    OpCode::And, OpCode::Or, OpCode::Goto, OpCode::GotoIfNot, OpCode::Call, OpCode::Ret,
    OpCode::Halt, OpCode::InitRange, OpCode::CheckRange, OpCode::PushWidth,
    OpCode::PushHeight, OpCode::SetImage, OpCode::CopyImage, OpCode::Update,
    OpCode::SetColor, OpCode::SetWidth, OpCode::DrawPix, OpCode::DrawStroke,
    OpCode::DrawLine, OpCode::DrawRect, OpCode::DrawCircle, OpCode::FillRect,
    OpCode::FillCircle, OpCode::Sleep, OpCode::Abs, OpCode::Min, OpCode::Max, OpCode::Sum,
    OpCode::Round, OpCode::Floor, OpCode::Ceil, OpCode::Sin, OpCode::Cos, OpCode::Tan,
    OpCode::Cot, OpCode::Exp, OpCode::Log, OpCode::Length, OpCode::Distance,
];

impl OpCode {
    /// Convert a byte to an opcode
    pub fn from_byte(byte: u8) -> Option<Self> {
        ALL_OPCODES.get(byte as usize).copied()
    }

    /// Convert an opcode id read from a bytecode file
    pub fn from_id(id: u32) -> Option<Self> {
        u8::try_from(id).ok().and_then(Self::from_byte)
    }

    /// Convert an opcode to a byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Kinds of the operands this opcode takes, in file order
    pub fn operand_kinds(self) -> &'static [OperandKind] {
        match self {
            OpCode::Push => ONE_IMM,
            OpCode::PushPoint => TWO_IMM,

            OpCode::ClearScope
            | OpCode::Load
            | OpCode::LoadPoint
            | OpCode::LoadColor
            | OpCode::Store
            | OpCode::StorePoint
            | OpCode::StoreColor
            | OpCode::LoadGlobal
            | OpCode::LoadPointGlobal
            | OpCode::LoadColorGlobal
            | OpCode::StoreGlobal
            | OpCode::StorePointGlobal
            | OpCode::StoreColorGlobal
            | OpCode::SetImage
            | OpCode::Min
            | OpCode::Max
            | OpCode::Sum => ONE_INDEX,

            OpCode::CopyImage => TWO_INDEX,

            OpCode::Goto | OpCode::GotoIfNot | OpCode::Call => ONE_ADDR,

            _ => NO_OPERANDS,
        }
    }

    /// Get the number of operands for this opcode
    pub fn num_operands(self) -> usize {
        self.operand_kinds().len()
    }

    /// Whether the single operand of this opcode is an instruction index
    pub fn is_jump(self) -> bool {
        matches!(self, OpCode::Goto | OpCode::GotoIfNot | OpCode::Call)
    }

    /// Number of global slots touched by a global load/store, if this is one
    pub fn global_width(self) -> Option<u32> {
        match self {
            OpCode::LoadGlobal | OpCode::StoreGlobal => Some(1),
            OpCode::LoadPointGlobal | OpCode::StorePointGlobal => Some(2),
            OpCode::LoadColorGlobal | OpCode::StoreColorGlobal => Some(4),
            _ => None,
        }
    }

    /// Number of local slots touched by a local load/store, if this is one
    pub fn local_width(self) -> Option<u32> {
        match self {
            OpCode::Load | OpCode::Store => Some(1),
            OpCode::LoadPoint | OpCode::StorePoint => Some(2),
            OpCode::LoadColor | OpCode::StoreColor => Some(4),
            _ => None,
        }
    }
}

impl From<OpCode> for u8 {
    fn from(opcode: OpCode) -> Self {
        opcode.to_byte()
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        OpCode::from_byte(byte).ok_or(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_discriminants() {
        for (id, opcode) in ALL_OPCODES.iter().enumerate() {
            assert_eq!(opcode.to_byte() as usize, id, "{:?} is out of order", opcode);
        }
    }

    #[test]
    fn test_from_byte_known_values() {
        assert_eq!(OpCode::from_byte(0), Some(OpCode::Nop));
        assert_eq!(OpCode::from_byte(1), Some(OpCode::Push));
        assert_eq!(OpCode::from_byte(68), Some(OpCode::Goto));
        assert_eq!(OpCode::from_byte(72), Some(OpCode::Halt));
        assert_eq!(OpCode::from_byte(104), Some(OpCode::Distance));
    }

    #[test]
    fn test_from_byte_unknown_values() {
        assert_eq!(OpCode::from_byte(105), None);
        assert_eq!(OpCode::from_byte(0xFF), None);
        assert_eq!(OpCode::from_id(1000), None);
    }

    #[test]
    fn test_try_from_u8() {
        assert_eq!(OpCode::try_from(89u8), Ok(OpCode::Sleep));
        assert_eq!(OpCode::try_from(200u8), Err(200));
        let byte: u8 = OpCode::CopyImage.into();
        assert_eq!(byte, 78);
    }

    #[test]
    fn test_operand_counts() {
        let expectations = [
            (OpCode::Nop, 0),
            (OpCode::Push, 1),
            (OpCode::PushPoint, 2),
            (OpCode::ClearScope, 1),
            (OpCode::LoadColor, 1),
            (OpCode::StoreColorGlobal, 1),
            (OpCode::Goto, 1),
            (OpCode::Call, 1),
            (OpCode::Ret, 0),
            (OpCode::SetImage, 1),
            (OpCode::CopyImage, 2),
            (OpCode::Min, 1),
            (OpCode::Sum, 1),
            (OpCode::DrawLine, 0),
            (OpCode::Sleep, 0),
        ];

        for (opcode, expected) in expectations {
            assert_eq!(opcode.num_operands(), expected, "operand count of {:?}", opcode);
        }
    }

    #[test]
    fn test_operand_kinds() {
        assert_eq!(OpCode::Push.operand_kinds(), &[OperandKind::Imm]);
        assert_eq!(OpCode::GotoIfNot.operand_kinds(), &[OperandKind::Addr]);
        assert_eq!(OpCode::CopyImage.operand_kinds(), &[OperandKind::Index, OperandKind::Index]);
    }

    #[test]
    fn test_widths() {
        assert_eq!(OpCode::LoadPointGlobal.global_width(), Some(2));
        assert_eq!(OpCode::StoreColor.local_width(), Some(4));
        assert_eq!(OpCode::Load.global_width(), None);
        assert!(OpCode::Call.is_jump());
        assert!(!OpCode::Ret.is_jump());
    }
}
