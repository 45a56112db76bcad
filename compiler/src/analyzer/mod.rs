//! Value types, fields and scoped symbol bookkeeping used while parsing

mod symbols;

pub use symbols::{Cycle, Function, FunctionFrame, SymbolTable, Variable};

use crate::lexer::TokenType;
use serde::Serialize;
use std::fmt;

/// One of the three first-class value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueType {
    Number,
    Point,
    Color,
}

impl ValueType {
    /// Number of stack slots a value of this type occupies
    pub fn slots(self) -> u32 {
        match self {
            ValueType::Number => 1,
            ValueType::Point => 2,
            ValueType::Color => 4,
        }
    }

    pub fn from_token(token_type: TokenType) -> Option<Self> {
        match token_type {
            TokenType::NumberType => Some(ValueType::Number),
            TokenType::PointType => Some(ValueType::Point),
            TokenType::ColorType => Some(ValueType::Color),
            _ => None,
        }
    }

    pub fn is_tuple(self) -> bool {
        self != ValueType::Number
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Number => write!(f, "Number"),
            ValueType::Point => write!(f, "Point"),
            ValueType::Color => write!(f, "Color"),
        }
    }
}

/// Ordered list of value types; empty for `void`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Type(pub Vec<ValueType>);

impl Type {
    pub fn void() -> Self {
        Type(Vec::new())
    }

    pub fn single(value_type: ValueType) -> Self {
        Type(vec![value_type])
    }

    pub fn values(&self) -> &[ValueType] {
        &self.0
    }

    pub fn is_void(&self) -> bool {
        self.0.is_empty()
    }

    /// The element type when exactly one value is produced
    pub fn as_single(&self) -> Option<ValueType> {
        match self.0.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub fn slots(&self) -> u32 {
        self.0.iter().map(|t| t.slots()).sum()
    }

    pub fn concat(mut self, other: &Type) -> Self {
        self.0.extend_from_slice(&other.0);
        self
    }
}

impl From<ValueType> for Type {
    fn from(value_type: ValueType) -> Self {
        Type::single(value_type)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => write!(f, "void"),
            [only] => write!(f, "{}", only),
            many => {
                write!(f, "(")?;
                for (i, t) in many.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Named component of a Point or Color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Field {
    X,
    Y,
    Red,
    Green,
    Blue,
    Alpha,
}

impl Field {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "x" => Some(Field::X),
            "y" => Some(Field::Y),
            "r" | "red" => Some(Field::Red),
            "g" | "green" => Some(Field::Green),
            "b" | "blue" => Some(Field::Blue),
            "a" | "alpha" => Some(Field::Alpha),
            _ => None,
        }
    }

    pub fn owner(self) -> ValueType {
        match self {
            Field::X | Field::Y => ValueType::Point,
            _ => ValueType::Color,
        }
    }

    /// Slot offset of the component inside its owner
    pub fn offset(self) -> u32 {
        match self {
            Field::X | Field::Red => 0,
            Field::Y | Field::Green => 1,
            Field::Blue => 2,
            Field::Alpha => 3,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::X => "x",
            Field::Y => "y",
            Field::Red => "r",
            Field::Green => "g",
            Field::Blue => "b",
            Field::Alpha => "a",
        };
        write!(f, "{}", name)
    }
}
