use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    // Literals
    Number,
    Identifier,

    // Declarations and statements
    Let,
    Global,
    Set,
    Call,
    Def,
    If,
    Else,
    While,
    For,
    Continue,
    Break,
    Return,
    Halt,
    To,
    In,
    Range,

    // Type names, which double as constructors
    NumberType,
    PointType,
    ColorType,

    // Built-in statements
    SetImageBuffer,
    SetImage,
    SetColor,
    SetWidth,
    CopyImage,
    Update,
    DrawPix,
    DrawStroke,
    DrawLine,
    DrawRect,
    DrawCircle,
    FillRect,
    FillCircle,
    Sleep,

    // Built-in functions
    Width,
    Height,
    Abs,
    Min,
    Max,
    Sum,
    Round,
    Floor,
    Ceil,
    Sin,
    Cos,
    Tan,
    Cot,
    Exp,
    Log,
    Length,
    Distance,

    // Operators
    Assign,       // =
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Percent,      // %
    StarStar,     // **
    Bang,         // !
    EqualEqual,   // ==
    BangEqual,    // !=
    Less,         // <
    Greater,      // >
    LessEqual,    // <=
    GreaterEqual, // >=
    AndAnd,       // &&
    OrOr,         // ||
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Semicolon,

    // End of file
    Eof,
}

const KEYWORDS: &[TokenType] = &[
    TokenType::Let,
    TokenType::Global,
    TokenType::Set,
    TokenType::Call,
    TokenType::Def,
    TokenType::If,
    TokenType::Else,
    TokenType::While,
    TokenType::For,
    TokenType::Continue,
    TokenType::Break,
    TokenType::Return,
    TokenType::Halt,
    TokenType::To,
    TokenType::In,
    TokenType::Range,
    TokenType::NumberType,
    TokenType::PointType,
    TokenType::ColorType,
    TokenType::SetImageBuffer,
    TokenType::SetImage,
    TokenType::SetColor,
    TokenType::SetWidth,
    TokenType::CopyImage,
    TokenType::Update,
    TokenType::DrawPix,
    TokenType::DrawStroke,
    TokenType::DrawLine,
    TokenType::DrawRect,
    TokenType::DrawCircle,
    TokenType::FillRect,
    TokenType::FillCircle,
    TokenType::Sleep,
    TokenType::Width,
    TokenType::Height,
    TokenType::Abs,
    TokenType::Min,
    TokenType::Max,
    TokenType::Sum,
    TokenType::Round,
    TokenType::Floor,
    TokenType::Ceil,
    TokenType::Sin,
    TokenType::Cos,
    TokenType::Tan,
    TokenType::Cot,
    TokenType::Exp,
    TokenType::Log,
    TokenType::Length,
    TokenType::Distance,
];

const OPERATORS: &[TokenType] = &[
    TokenType::Assign,
    TokenType::Plus,
    TokenType::Minus,
    TokenType::Star,
    TokenType::Slash,
    TokenType::Percent,
    TokenType::StarStar,
    TokenType::Bang,
    TokenType::EqualEqual,
    TokenType::BangEqual,
    TokenType::Less,
    TokenType::Greater,
    TokenType::LessEqual,
    TokenType::GreaterEqual,
    TokenType::AndAnd,
    TokenType::OrOr,
    TokenType::LeftParen,
    TokenType::RightParen,
    TokenType::LeftBrace,
    TokenType::RightBrace,
    TokenType::Comma,
    TokenType::Dot,
    TokenType::Semicolon,
];

/// Characters that can start or continue an operator
pub const OPERATOR_CHARS: &str = "<>=+-*/%&|!(){},.;";

impl TokenType {
    /// Source spelling of keywords and operators
    pub fn as_str(self) -> &'static str {
        match self {
            TokenType::Number => "number",
            TokenType::Identifier => "identifier",
            TokenType::Let => "let",
            TokenType::Global => "global",
            TokenType::Set => "set",
            TokenType::Call => "call",
            TokenType::Def => "def",
            TokenType::If => "if",
            TokenType::Else => "else",
            TokenType::While => "while",
            TokenType::For => "for",
            TokenType::Continue => "continue",
            TokenType::Break => "break",
            TokenType::Return => "return",
            TokenType::Halt => "halt",
            TokenType::To => "to",
            TokenType::In => "in",
            TokenType::Range => "range",
            TokenType::NumberType => "Number",
            TokenType::PointType => "Point",
            TokenType::ColorType => "Color",
            TokenType::SetImageBuffer => "set_image_buffer",
            TokenType::SetImage => "set_image",
            TokenType::SetColor => "set_color",
            TokenType::SetWidth => "set_width",
            TokenType::CopyImage => "copy_image",
            TokenType::Update => "update",
            TokenType::DrawPix => "draw_pix",
            TokenType::DrawStroke => "draw_stroke",
            TokenType::DrawLine => "draw_line",
            TokenType::DrawRect => "draw_rect",
            TokenType::DrawCircle => "draw_circle",
            TokenType::FillRect => "fill_rect",
            TokenType::FillCircle => "fill_circle",
            TokenType::Sleep => "sleep",
            TokenType::Width => "Width",
            TokenType::Height => "Height",
            TokenType::Abs => "abs",
            TokenType::Min => "min",
            TokenType::Max => "max",
            TokenType::Sum => "sum",
            TokenType::Round => "round",
            TokenType::Floor => "floor",
            TokenType::Ceil => "ceil",
            TokenType::Sin => "sin",
            TokenType::Cos => "cos",
            TokenType::Tan => "tan",
            TokenType::Cot => "cot",
            TokenType::Exp => "exp",
            TokenType::Log => "log",
            TokenType::Length => "length",
            TokenType::Distance => "distance",
            TokenType::Assign => "=",
            TokenType::Plus => "+",
            TokenType::Minus => "-",
            TokenType::Star => "*",
            TokenType::Slash => "/",
            TokenType::Percent => "%",
            TokenType::StarStar => "**",
            TokenType::Bang => "!",
            TokenType::EqualEqual => "==",
            TokenType::BangEqual => "!=",
            TokenType::Less => "<",
            TokenType::Greater => ">",
            TokenType::LessEqual => "<=",
            TokenType::GreaterEqual => ">=",
            TokenType::AndAnd => "&&",
            TokenType::OrOr => "||",
            TokenType::LeftParen => "(",
            TokenType::RightParen => ")",
            TokenType::LeftBrace => "{",
            TokenType::RightBrace => "}",
            TokenType::Comma => ",",
            TokenType::Dot => ".",
            TokenType::Semicolon => ";",
            TokenType::Eof => "end of file",
        }
    }

    /// Look up a reserved word
    pub fn keyword(text: &str) -> Option<TokenType> {
        KEYWORDS.iter().copied().find(|kind| kind.as_str() == text)
    }

    /// Look up an operator spelling
    pub fn operator(text: &str) -> Option<TokenType> {
        OPERATORS.iter().copied().find(|kind| kind.as_str() == text)
    }

    /// Whether this token names a value type
    pub fn is_type_name(self) -> bool {
        matches!(
            self,
            TokenType::NumberType | TokenType::PointType | TokenType::ColorType
        )
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Number | TokenType::Identifier | TokenType::Eof => write!(f, "{}", self.as_str()),
            _ => write!(f, "'{}'", self.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub line: usize,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: impl Into<String>, line: usize) -> Self {
        Self {
            token_type,
            lexeme: lexeme.into(),
            line,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.token_type {
            TokenType::Number | TokenType::Identifier => write!(f, "'{}'", self.lexeme),
            other => write!(f, "{}", other),
        }
    }
}
