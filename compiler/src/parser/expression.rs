use super::ast::{BinaryOp, Expr, Intrinsic, Slot, UnaryOp};
use super::{ParseError, Parser};
use crate::analyzer::Type;
use crate::lexer::TokenType;

type Level<'a> = fn(&mut Parser<'a>) -> Result<Expr, ParseError>;

impl<'a> Parser<'a> {
    pub(super) fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_logical()
    }

    fn parse_logical(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(&[TokenType::AndAnd, TokenType::OrOr], Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            &[
                TokenType::EqualEqual,
                TokenType::BangEqual,
                TokenType::Less,
                TokenType::Greater,
                TokenType::LessEqual,
                TokenType::GreaterEqual,
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(&[TokenType::Plus, TokenType::Minus], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            &[TokenType::Star, TokenType::Slash, TokenType::Percent],
            Self::parse_power,
        )
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(&[TokenType::StarStar], Self::parse_unary)
    }

    /// Left-associative chain of `operators` over operands from `next`
    fn parse_binary_level(
        &mut self,
        operators: &[TokenType],
        next: Level<'a>,
    ) -> Result<Expr, ParseError> {
        let mut expr = next(self)?;

        while let Some(op) = self.match_binary_operator(operators) {
            let line = self.previous().line;
            let right = next(self)?;
            expr = Expr::binary(op, expr, right, line)?;
        }

        Ok(expr)
    }

    fn match_binary_operator(&mut self, operators: &[TokenType]) -> Option<BinaryOp> {
        let token_type = self.peek().token_type;
        if !operators.contains(&token_type) {
            return None;
        }
        let op = BinaryOp::from_token(token_type)?;
        self.advance();
        Some(op)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.match_token_types(&[TokenType::Minus, TokenType::Bang]) {
            let token = self.previous().clone();
            let operand = self.parse_unary()?;
            return match (token.token_type, operand) {
                (TokenType::Minus, Expr::Number(value)) => Ok(Expr::Number(-value)),
                (TokenType::Minus, operand) => Expr::unary(UnaryOp::Neg, operand, token.line),
                (_, operand) => Expr::unary(UnaryOp::Not, operand, token.line),
            };
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;

        while self.match_token_types(&[TokenType::Dot]) {
            let field = self.consume(TokenType::Identifier, "field name")?;
            expr = Expr::field(expr, &field.lexeme, field.line)?;
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();

        match token.token_type {
            TokenType::Number => {
                self.advance();
                let value = token
                    .lexeme
                    .parse::<f32>()
                    .map_err(|_| ParseError::InvalidConstant {
                        text: token.lexeme.clone(),
                        line: token.line,
                    })?;
                Ok(Expr::Number(value))
            }

            TokenType::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.consume(TokenType::RightParen, "')'")?;
                Ok(expr)
            }

            TokenType::Identifier => {
                self.advance();
                if self.match_token_types(&[TokenType::LeftParen]) {
                    self.parse_call(token.lexeme, token.line)
                } else {
                    self.parse_variable(token.lexeme, token.line)
                }
            }

            // `Width` and `Height` may drop their parentheses
            TokenType::Width | TokenType::Height => {
                self.advance();
                if self.match_token_types(&[TokenType::LeftParen]) {
                    self.consume(TokenType::RightParen, "')'")?;
                }
                let function = if token.token_type == TokenType::Width {
                    Intrinsic::Width
                } else {
                    Intrinsic::Height
                };
                Expr::intrinsic(function, Vec::new(), token.line)
            }

            other => match Intrinsic::from_token(other) {
                Some(function) => {
                    self.advance();
                    self.consume(TokenType::LeftParen, "'('")?;
                    let args = self.parse_arguments()?;
                    Expr::intrinsic(function, args, token.line)
                }
                None => Err(self.unexpected(&token, "expression")),
            },
        }
    }

    /// Comma-separated expressions up to the closing `)`; the `(` is
    /// already consumed
    pub(super) fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "')'")?;
        Ok(args)
    }

    fn parse_call(&mut self, name: String, line: usize) -> Result<Expr, ParseError> {
        let args = self.parse_arguments()?;
        let arg_types = args
            .iter()
            .map(|arg| arg.single("argument", line))
            .collect::<Result<Vec<_>, _>>()?;
        let arg_types = Type(arg_types);

        match self.ctx.symbols.find_function(&name, &arg_types) {
            Some(function) => Ok(Expr::Call {
                entry: function.entry,
                returns: function.returns.clone(),
                name,
                args,
            }),
            None => Err(ParseError::UnknownFunction {
                name,
                args: arg_types,
                line,
            }),
        }
    }

    fn parse_variable(&mut self, name: String, line: usize) -> Result<Expr, ParseError> {
        let var = match self.ctx.symbols.find_variable(&name) {
            Some(var) => var.clone(),
            None => return Err(ParseError::UnknownVariable { name, line }),
        };

        let slot = if var.is_global {
            Slot::Global { index: var.index }
        } else {
            Slot::Local {
                distance: self.ctx.symbols.distance(&var),
            }
        };

        Ok(Expr::Variable {
            name,
            value_type: var.value_type,
            slot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ValueType;
    use crate::codegen::CompilerContext;
    use crate::lexer::Lexer;
    use crate::parser::ast::{Shape, Statement};

    fn parse_value(source: &str) -> Result<Expr, ParseError> {
        let tokens = Lexer::new(&format!("let Number probe = 0\nsleep {}", source))
            .tokenize()
            .unwrap();
        let mut ctx = CompilerContext::new();
        let mut statements = Parser::new(tokens, &mut ctx).parse()?;
        match statements.pop() {
            Some(Statement::Command { mut args, .. }) => Ok(args.remove(0)),
            other => panic!("Expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let expr = parse_value("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary { op, rhs, .. } => {
                assert_eq!(op, BinaryOp::Add);
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("Expected addition, got {:?}", other),
        }

        let expr = parse_value("2 * 3 ** 2").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Mul, .. }));

        let expr = parse_value("1 < 2 && 3 > 2").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn test_left_associative() {
        match parse_value("8 - 4 - 2").unwrap() {
            Expr::Binary { lhs, rhs, .. } => {
                assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Sub, .. }));
                assert_eq!(*rhs, Expr::Number(2.0));
            }
            other => panic!("Expected subtraction, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_literal_folds() {
        assert_eq!(parse_value("-4").unwrap(), Expr::Number(-4.0));
        assert!(matches!(
            parse_value("-probe").unwrap(),
            Expr::Unary { op: UnaryOp::Neg, .. }
        ));
    }

    #[test]
    fn test_fields_and_intrinsics() {
        assert!(parse_value("Point(1, 2).y + Color(1, 2, 3, 4).alpha").is_ok());
        assert!(parse_value("Width + Height() + min(1, 2, 3) + sum(probe)").is_ok());
        assert!(parse_value("distance(Point(0, 0), Point(3, 4))").is_ok());
        assert!(matches!(
            parse_value("length(1)"),
            Err(ParseError::Type { line: 2, .. })
        ));
    }

    #[test]
    fn test_broadcast_operand_order() {
        let tokens = Lexer::new("draw_pix 2 * Point(1, 1)").tokenize().unwrap();
        let mut ctx = CompilerContext::new();
        let statements = Parser::new(tokens, &mut ctx).parse().unwrap();
        match &statements[0] {
            Statement::Command { args, .. } => assert!(matches!(
                args[0],
                Expr::Binary {
                    shape: Shape::Broadcast {
                        tuple: ValueType::Point,
                        number_first: true
                    },
                    ..
                }
            )),
            other => panic!("Expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_multi_value_call_is_not_an_operand() {
        let tokens = Lexer::new("def pair() Number, Number { return 1, 2 }\nsleep pair() + 1")
            .tokenize()
            .unwrap();
        let mut ctx = CompilerContext::new();
        let err = Parser::new(tokens, &mut ctx).parse().unwrap_err();
        assert!(matches!(err, ParseError::Type { line: 2, .. }));
    }

    #[test]
    fn test_missing_operand() {
        assert_eq!(
            parse_value("1 +").unwrap_err(),
            ParseError::UnexpectedEof {
                expected: "expression".to_string()
            }
        );
        assert!(matches!(
            parse_value("(1"),
            Err(ParseError::UnexpectedEof { .. })
        ));
    }
}
