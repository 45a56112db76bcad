//! Typed syntax tree.
//!
//! Every node is checked when it is built, and variable references carry
//! their resolved stack slot, so code generation never looks anything up.

use crate::analyzer::{Field, Type, ValueType};
use crate::codegen::Label;
use crate::lexer::TokenType;
use crate::parser::ParseError;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn from_token(token_type: TokenType) -> Option<Self> {
        match token_type {
            TokenType::Plus => Some(BinaryOp::Add),
            TokenType::Minus => Some(BinaryOp::Sub),
            TokenType::Star => Some(BinaryOp::Mul),
            TokenType::Slash => Some(BinaryOp::Div),
            TokenType::Percent => Some(BinaryOp::Mod),
            TokenType::StarStar => Some(BinaryOp::Pow),
            TokenType::EqualEqual => Some(BinaryOp::Equal),
            TokenType::BangEqual => Some(BinaryOp::NotEqual),
            TokenType::Less => Some(BinaryOp::Less),
            TokenType::Greater => Some(BinaryOp::Greater),
            TokenType::LessEqual => Some(BinaryOp::LessEqual),
            TokenType::GreaterEqual => Some(BinaryOp::GreaterEqual),
            TokenType::AndAnd => Some(BinaryOp::And),
            TokenType::OrOr => Some(BinaryOp::Or),
            _ => None,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// How the operand types of a binary operator line up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Shape {
    /// Both operands have this type
    Same(ValueType),
    /// A tuple combined with a Number; `number_first` when the Number is
    /// the left operand
    Broadcast { tuple: ValueType, number_first: bool },
}

/// Resolved storage of a variable, or of one of its fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Slot {
    /// Distance from the local stack top to the first slot
    Local { distance: u32 },
    Global { index: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Intrinsic {
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
    Point,
    Color,
}

impl Intrinsic {
    pub fn from_token(token_type: TokenType) -> Option<Self> {
        let intrinsic = match token_type {
            TokenType::Width => Intrinsic::Width,
            TokenType::Height => Intrinsic::Height,
            TokenType::Abs => Intrinsic::Abs,
            TokenType::Min => Intrinsic::Min,
            TokenType::Max => Intrinsic::Max,
            TokenType::Sum => Intrinsic::Sum,
            TokenType::Round => Intrinsic::Round,
            TokenType::Floor => Intrinsic::Floor,
            TokenType::Ceil => Intrinsic::Ceil,
            TokenType::Sin => Intrinsic::Sin,
            TokenType::Cos => Intrinsic::Cos,
            TokenType::Tan => Intrinsic::Tan,
            TokenType::Cot => Intrinsic::Cot,
            TokenType::Exp => Intrinsic::Exp,
            TokenType::Log => Intrinsic::Log,
            TokenType::Length => Intrinsic::Length,
            TokenType::Distance => Intrinsic::Distance,
            TokenType::PointType => Intrinsic::Point,
            TokenType::ColorType => Intrinsic::Color,
            _ => return None,
        };
        Some(intrinsic)
    }

    /// Whether any number of Number arguments is accepted
    pub fn is_variadic(self) -> bool {
        matches!(self, Intrinsic::Min | Intrinsic::Max | Intrinsic::Sum)
    }

    /// Fixed argument list, for everything but the variadic folds
    pub fn params(self) -> &'static [ValueType] {
        use ValueType::{Number, Point};
        match self {
            Intrinsic::Width | Intrinsic::Height => &[],
            Intrinsic::Length => &[Point],
            Intrinsic::Distance => &[Point, Point],
            Intrinsic::Point => &[Number, Number],
            Intrinsic::Color => &[Number, Number, Number, Number],
            Intrinsic::Min | Intrinsic::Max | Intrinsic::Sum => &[Number],
            _ => &[Number],
        }
    }

    pub fn result(self) -> ValueType {
        match self {
            Intrinsic::Point => ValueType::Point,
            Intrinsic::Color => ValueType::Color,
            _ => ValueType::Number,
        }
    }
}

/// Drawing and pen statements that take expression arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Command {
    SetColor,
    SetWidth,
    DrawPix,
    DrawStroke,
    DrawLine,
    DrawRect,
    DrawCircle,
    FillRect,
    FillCircle,
    Sleep,
}

impl Command {
    pub fn from_token(token_type: TokenType) -> Option<Self> {
        let command = match token_type {
            TokenType::SetColor => Command::SetColor,
            TokenType::SetWidth => Command::SetWidth,
            TokenType::DrawPix => Command::DrawPix,
            TokenType::DrawStroke => Command::DrawStroke,
            TokenType::DrawLine => Command::DrawLine,
            TokenType::DrawRect => Command::DrawRect,
            TokenType::DrawCircle => Command::DrawCircle,
            TokenType::FillRect => Command::FillRect,
            TokenType::FillCircle => Command::FillCircle,
            TokenType::Sleep => Command::Sleep,
            _ => return None,
        };
        Some(command)
    }

    pub fn params(self) -> &'static [ValueType] {
        use ValueType::{Color, Number, Point};
        match self {
            Command::SetColor => &[Color],
            Command::SetWidth | Command::Sleep => &[Number],
            Command::DrawPix => &[Point],
            Command::DrawStroke | Command::DrawCircle | Command::FillCircle => &[Point, Number],
            Command::DrawLine | Command::DrawRect | Command::FillRect => &[Point, Point],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Number(f32),
    Variable {
        name: String,
        value_type: ValueType,
        slot: Slot,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        value_type: ValueType,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        shape: Shape,
        value_type: ValueType,
    },
    Field {
        base: Box<Expr>,
        field: Field,
    },
    Intrinsic {
        function: Intrinsic,
        args: Vec<Expr>,
    },
    Call {
        name: String,
        entry: Label,
        args: Vec<Expr>,
        returns: Type,
    },
}

impl Expr {
    /// Types of the values this expression leaves on the stack
    pub fn ty(&self) -> Type {
        match self {
            Expr::Number(_) => ValueType::Number.into(),
            Expr::Variable { value_type, .. }
            | Expr::Unary { value_type, .. }
            | Expr::Binary { value_type, .. } => (*value_type).into(),
            Expr::Field { .. } => ValueType::Number.into(),
            Expr::Intrinsic { function, .. } => function.result().into(),
            Expr::Call { returns, .. } => returns.clone(),
        }
    }

    /// The single value type, or a type error naming `context`
    pub fn single(&self, context: &str, line: usize) -> Result<ValueType, ParseError> {
        let ty = self.ty();
        ty.as_single().ok_or_else(|| ParseError::Type {
            message: format!("{} needs a single value, found {}", context, ty),
            line,
        })
    }

    pub fn unary(op: UnaryOp, operand: Expr, line: usize) -> Result<Expr, ParseError> {
        let value_type = operand.single("unary operator", line)?;
        if op == UnaryOp::Not && value_type != ValueType::Number {
            return Err(ParseError::Type {
                message: format!("cannot apply '!' to {}", value_type),
                line,
            });
        }
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            value_type,
        })
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, line: usize) -> Result<Expr, ParseError> {
        use ValueType::Number;

        let context = format!("operator '{}'", op);
        let l = lhs.single(&context, line)?;
        let r = rhs.single(&context, line)?;

        let broadcast_right = l.is_tuple() && r == Number;
        let broadcast_left = l == Number && r.is_tuple();

        let typed = match op {
            BinaryOp::Add => {
                if l == r {
                    Some((Shape::Same(l), l))
                } else if broadcast_right {
                    Some((Shape::Broadcast { tuple: l, number_first: false }, l))
                } else if broadcast_left {
                    Some((Shape::Broadcast { tuple: r, number_first: true }, r))
                } else {
                    None
                }
            }
            BinaryOp::Sub => {
                if l == r {
                    Some((Shape::Same(l), l))
                } else if broadcast_right {
                    Some((Shape::Broadcast { tuple: l, number_first: false }, l))
                } else {
                    None
                }
            }
            BinaryOp::Mul => {
                if l == Number && r == Number {
                    Some((Shape::Same(Number), Number))
                } else if broadcast_right {
                    Some((Shape::Broadcast { tuple: l, number_first: false }, l))
                } else if broadcast_left {
                    Some((Shape::Broadcast { tuple: r, number_first: true }, r))
                } else {
                    None
                }
            }
            BinaryOp::Div | BinaryOp::Mod | BinaryOp::Pow => {
                if l == Number && r == Number {
                    Some((Shape::Same(Number), Number))
                } else if broadcast_right {
                    Some((Shape::Broadcast { tuple: l, number_first: false }, l))
                } else {
                    None
                }
            }
            BinaryOp::Equal | BinaryOp::NotEqual => {
                if l == r {
                    Some((Shape::Same(l), Number))
                } else {
                    None
                }
            }
            BinaryOp::Less
            | BinaryOp::Greater
            | BinaryOp::LessEqual
            | BinaryOp::GreaterEqual
            | BinaryOp::And
            | BinaryOp::Or => {
                if l == Number && r == Number {
                    Some((Shape::Same(Number), Number))
                } else {
                    None
                }
            }
        };

        match typed {
            Some((shape, value_type)) => Ok(Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                shape,
                value_type,
            }),
            None => Err(ParseError::Type {
                message: format!("cannot apply '{}' to {} and {}", op, l, r),
                line,
            }),
        }
    }

    pub fn field(base: Expr, name: &str, line: usize) -> Result<Expr, ParseError> {
        let owner = base.single("field access", line)?;
        match Field::from_name(name) {
            Some(field) if field.owner() == owner => Ok(Expr::Field {
                base: Box::new(base),
                field,
            }),
            _ => Err(ParseError::UnknownField {
                name: name.to_string(),
                value_type: owner,
                line,
            }),
        }
    }

    pub fn intrinsic(function: Intrinsic, args: Vec<Expr>, line: usize) -> Result<Expr, ParseError> {
        let found = args
            .iter()
            .map(|arg| arg.single("argument", line))
            .collect::<Result<Vec<_>, _>>()?;

        let accepted = if function.is_variadic() {
            !found.is_empty() && found.iter().all(|t| *t == ValueType::Number)
        } else {
            found == function.params()
        };

        if !accepted {
            let expected = if function.is_variadic() {
                "(Number, ...)".to_string()
            } else {
                format!("({})", join(function.params()))
            };
            return Err(ParseError::Type {
                message: format!(
                    "{:?} expects {}, found ({})",
                    function,
                    expected,
                    join(&found)
                ),
                line,
            });
        }

        Ok(Expr::Intrinsic { function, args })
    }
}

fn join(types: &[ValueType]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Checks a command's arguments against its parameter list
pub fn check_command(command: Command, args: &[Expr], line: usize) -> Result<(), ParseError> {
    let found = args
        .iter()
        .map(|arg| arg.single("argument", line))
        .collect::<Result<Vec<_>, _>>()?;
    if found != command.params() {
        return Err(ParseError::Type {
            message: format!(
                "{:?} expects ({}), found ({})",
                command,
                join(command.params()),
                join(&found)
            ),
            line,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Statement {
    Block {
        statements: Vec<Statement>,
        /// Local slots dropped when the block falls through
        clear: u32,
    },
    Declare {
        name: String,
        value_type: ValueType,
        /// Global slot, or `None` for a new local
        global: Option<u32>,
        value: Expr,
    },
    Assign {
        name: String,
        slot: Slot,
        value_type: ValueType,
        value: Expr,
    },
    If {
        condition: Expr,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
        else_label: Label,
        end_label: Label,
    },
    While {
        condition: Expr,
        body: Box<Statement>,
        begin: Label,
        end: Label,
    },
    For {
        name: String,
        from: Option<Expr>,
        to: Expr,
        step: Option<Expr>,
        body: Box<Statement>,
        /// Increment, the target of `continue`
        begin: Label,
        check: Label,
        end: Label,
    },
    Function {
        name: String,
        entry: Label,
        skip: Label,
        params: Vec<(String, ValueType)>,
        returns: Type,
        body: Box<Statement>,
        /// Argument slots dropped when a void body falls through
        epilogue: u32,
    },
    Command {
        command: Command,
        args: Vec<Expr>,
    },
    SetImage {
        index: u32,
    },
    CopyImage {
        dst: u32,
        src: u32,
    },
    Update,
    Expression {
        expr: Expr,
    },
    Return {
        values: Vec<Expr>,
        clear: u32,
    },
    Break {
        target: Label,
        clear: u32,
    },
    Continue {
        target: Label,
        clear: u32,
    },
    Halt,
}

impl Statement {
    /// Whether control can never fall out of the end of this statement
    pub fn terminates(&self) -> bool {
        match self {
            Statement::Block { statements, .. } => statements.iter().any(Statement::terminates),
            Statement::If {
                then_branch,
                else_branch: Some(else_branch),
                ..
            } => then_branch.terminates() && else_branch.terminates(),
            Statement::Return { .. }
            | Statement::Break { .. }
            | Statement::Continue { .. }
            | Statement::Halt => true,
            _ => false,
        }
    }
}
