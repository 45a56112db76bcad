pub mod ast;
mod expression;

use crate::analyzer::{Field, Function, Type, ValueType};
use crate::codegen::CompilerContext;
use crate::lexer::{Token, TokenType};
use ast::{check_command, Command, Expr, Slot, Statement};
use log::debug;

/// Largest `set_image_buffer` value
pub use cw2::bytecode::MAX_IMAGE_BUFFERS;

/// A `def` header: name, parameters and result types
struct Signature {
    name: String,
    params: Vec<(String, ValueType)>,
    returns: Type,
    line: usize,
}

impl Signature {
    fn args(&self) -> Type {
        Type(self.params.iter().map(|(_, t)| *t).collect())
    }
}

/// Recursive-descent parser that type-checks and resolves names as it goes
pub struct Parser<'a> {
    tokens: Vec<Token>,
    current: usize,
    ctx: &'a mut CompilerContext,
}

impl<'a> Parser<'a> {
    pub fn new(mut tokens: Vec<Token>, ctx: &'a mut CompilerContext) -> Self {
        if tokens.last().map_or(true, |t| t.token_type != TokenType::Eof) {
            let line = tokens.last().map_or(1, |t| t.line);
            tokens.push(Token::new(TokenType::Eof, "", line));
        }
        Self {
            tokens,
            current: 0,
            ctx,
        }
    }

    pub fn parse(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.declare_functions()?;

        let mut statements = Vec::new();
        while !self.is_at_end() {
            if let Some(statement) = self.parse_statement()? {
                statements.push(statement);
            }
        }

        self.ctx.check_image_references()?;
        debug!("parsed {} top-level statement(s)", statements.len());
        Ok(statements)
    }

    /// Register every function signature so calls can precede definitions
    fn declare_functions(&mut self) -> Result<(), ParseError> {
        let starts: Vec<usize> = self
            .tokens
            .iter()
            .enumerate()
            .filter(|(_, token)| token.token_type == TokenType::Def)
            .map(|(i, _)| i)
            .collect();

        for start in starts {
            self.current = start + 1;
            let signature = self.parse_signature()?;
            let function = Function {
                name: signature.name.clone(),
                args: signature.args(),
                returns: signature.returns.clone(),
                entry: self.ctx.new_label(),
                line: signature.line,
            };
            if let Err(previous) = self.ctx.symbols.declare_function(function) {
                return Err(ParseError::DuplicateFunction {
                    args: signature.args(),
                    name: signature.name,
                    line: signature.line,
                    previous: previous.line,
                });
            }
        }

        self.current = 0;
        Ok(())
    }

    fn parse_statement(&mut self) -> Result<Option<Statement>, ParseError> {
        let token = self.peek().clone();

        let statement = match token.token_type {
            TokenType::Let | TokenType::Global => Some(self.parse_declaration()?),
            TokenType::Set => Some(self.parse_assignment()?),
            TokenType::If => Some(self.parse_if()?),
            TokenType::While => Some(self.parse_while()?),
            TokenType::For => Some(self.parse_for()?),
            TokenType::Def => Some(self.parse_function()?),
            TokenType::Return => Some(self.parse_return()?),
            TokenType::Break | TokenType::Continue => Some(self.parse_loop_jump()?),
            TokenType::LeftBrace => Some(self.parse_block()?),
            TokenType::Halt => {
                self.advance();
                Some(Statement::Halt)
            }
            TokenType::Call => {
                self.advance();
                let expr = self.parse_expression()?;
                Some(Statement::Expression { expr })
            }
            TokenType::Identifier
                if self.peek_next().map(|t| t.token_type) == Some(TokenType::LeftParen) =>
            {
                let expr = self.parse_expression()?;
                Some(Statement::Expression { expr })
            }
            TokenType::SetImageBuffer => {
                self.parse_image_buffer()?;
                None
            }
            TokenType::SetImage => {
                self.advance();
                let index = self.parse_image_index()?;
                Some(Statement::SetImage { index })
            }
            TokenType::CopyImage => {
                self.advance();
                // `copy_image a to b` overwrites buffer `a` with the contents of `b`
                let dst = self.parse_image_index()?;
                self.consume(TokenType::To, "'to'")?;
                let src = self.parse_image_index()?;
                Some(Statement::CopyImage { dst, src })
            }
            TokenType::Update => {
                self.advance();
                if self.match_token_types(&[TokenType::LeftParen]) {
                    self.consume(TokenType::RightParen, "')'")?;
                }
                Some(Statement::Update)
            }
            other => match Command::from_token(other) {
                Some(command) => Some(self.parse_command(command)?),
                None => return Err(self.unexpected(&token, "statement")),
            },
        };

        self.match_token_types(&[TokenType::Semicolon]);
        Ok(statement)
    }

    /// `{ statements }` in a fresh scope
    fn parse_block(&mut self) -> Result<Statement, ParseError> {
        self.consume(TokenType::LeftBrace, "'{'")?;
        self.ctx.symbols.push_scope();

        let mut statements = Vec::new();
        while !self.check(TokenType::RightBrace) {
            if self.is_at_end() {
                return Err(ParseError::UnexpectedEof {
                    expected: "'}'".to_string(),
                });
            }
            if let Some(statement) = self.parse_statement()? {
                statements.push(statement);
            }
        }
        self.consume(TokenType::RightBrace, "'}'")?;

        let clear = self.ctx.symbols.pop_scope();
        Ok(Statement::Block { statements, clear })
    }

    /// Body of `if`, `else`, `while` or `for`: a block or one statement,
    /// scoped either way
    fn parse_body(&mut self) -> Result<Statement, ParseError> {
        if self.check(TokenType::LeftBrace) {
            return self.parse_block();
        }
        self.ctx.symbols.push_scope();
        let statement = self.parse_statement()?;
        let clear = self.ctx.symbols.pop_scope();
        Ok(Statement::Block {
            statements: statement.into_iter().collect(),
            clear,
        })
    }

    fn parse_declaration(&mut self) -> Result<Statement, ParseError> {
        let is_global = self.advance().token_type == TokenType::Global;
        let value_type = self.parse_type()?;
        let name = self.consume(TokenType::Identifier, "variable name")?.lexeme;
        self.consume(TokenType::Assign, "'='")?;

        let line = self.peek().line;
        let value = self.parse_expression()?;
        let found = value.single("initializer", line)?;
        if found != value_type {
            return Err(ParseError::Type {
                message: format!("cannot initialize {} '{}' with {}", value_type, name, found),
                line,
            });
        }

        // Declared after the initializer, so `let x = x` sees the outer `x`
        let var = self.ctx.add_variable(&name, value_type, is_global);
        Ok(Statement::Declare {
            name,
            value_type,
            global: is_global.then(|| var.index),
            value,
        })
    }

    fn parse_assignment(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        let name_token = self.consume(TokenType::Identifier, "variable name")?;
        let line = name_token.line;
        let name = name_token.lexeme;

        let var = self
            .ctx
            .symbols
            .find_variable(&name)
            .cloned()
            .ok_or_else(|| ParseError::UnknownVariable {
                name: name.clone(),
                line,
            })?;

        let (value_type, offset) = if self.match_token_types(&[TokenType::Dot]) {
            let field_name = self.consume(TokenType::Identifier, "field name")?.lexeme;
            match Field::from_name(&field_name) {
                Some(field) if field.owner() == var.value_type => (ValueType::Number, field.offset()),
                _ => {
                    return Err(ParseError::UnknownField {
                        name: field_name,
                        value_type: var.value_type,
                        line,
                    })
                }
            }
        } else {
            (var.value_type, 0)
        };

        self.consume(TokenType::To, "'to'")?;
        let value = self.parse_expression()?;
        let found = value.single("assignment", line)?;
        if found != value_type {
            return Err(ParseError::Type {
                message: format!("cannot assign {} to {} '{}'", found, value_type, name),
                line,
            });
        }

        let slot = if var.is_global {
            Slot::Global {
                index: var.index + offset,
            }
        } else {
            Slot::Local {
                distance: self.ctx.symbols.distance(&var) - offset,
            }
        };

        Ok(Statement::Assign {
            name,
            slot,
            value_type,
            value,
        })
    }

    fn parse_condition(&mut self, keyword: &str) -> Result<Expr, ParseError> {
        let line = self.peek().line;
        let condition = self.parse_expression()?;
        let found = condition.single(keyword, line)?;
        if found != ValueType::Number {
            return Err(ParseError::Type {
                message: format!("'{}' condition must be Number, found {}", keyword, found),
                line,
            });
        }
        Ok(condition)
    }

    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        let condition = self.parse_condition("if")?;
        let then_branch = Box::new(self.parse_body()?);
        let else_branch = if self.match_token_types(&[TokenType::Else]) {
            Some(Box::new(self.parse_body()?))
        } else {
            None
        };

        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
            else_label: self.ctx.new_label(),
            end_label: self.ctx.new_label(),
        })
    }

    fn parse_while(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        let condition = self.parse_condition("while")?;

        let begin = self.ctx.new_label();
        let end = self.ctx.new_label();
        self.ctx.symbols.push_cycle(begin, end);
        let body = self.parse_body();
        self.ctx.symbols.pop_cycle();

        Ok(Statement::While {
            condition,
            body: Box::new(body?),
            begin,
            end,
        })
    }

    fn parse_for(&mut self) -> Result<Statement, ParseError> {
        let line = self.advance().line;
        let name = self.consume(TokenType::Identifier, "loop variable")?.lexeme;
        self.consume(TokenType::In, "'in'")?;
        self.consume(TokenType::Range, "'range'")?;
        self.consume(TokenType::LeftParen, "'('")?;
        // Range bounds resolve in the enclosing scope, before the loop variable exists
        let mut args = self.parse_arguments()?;

        for arg in &args {
            let found = arg.single("range argument", line)?;
            if found != ValueType::Number {
                return Err(ParseError::Type {
                    message: format!("range arguments must be Number, found {}", found),
                    line,
                });
            }
        }

        let (from, to, step) = match args.len() {
            1 => (None, args.remove(0), None),
            2 => {
                let to = args.remove(1);
                (Some(args.remove(0)), to, None)
            }
            3 => {
                let step = args.remove(2);
                let to = args.remove(1);
                (Some(args.remove(0)), to, Some(step))
            }
            count => {
                return Err(ParseError::Type {
                    message: format!("range takes 1 to 3 arguments, found {}", count),
                    line,
                })
            }
        };

        // Hidden locals sit below the iterator: [$step, $to, name]
        self.ctx.symbols.push_scope();
        self.ctx.add_variable("$step", ValueType::Number, false);
        self.ctx.add_variable("$to", ValueType::Number, false);
        self.ctx.add_variable(&name, ValueType::Number, false);

        let begin = self.ctx.new_label();
        let check = self.ctx.new_label();
        let end = self.ctx.new_label();
        self.ctx.symbols.push_cycle(begin, end);
        let body = self.parse_body();
        self.ctx.symbols.pop_cycle();
        self.ctx.symbols.pop_scope();

        Ok(Statement::For {
            name,
            from,
            to,
            step,
            body: Box::new(body?),
            begin,
            check,
            end,
        })
    }

    fn parse_signature(&mut self) -> Result<Signature, ParseError> {
        let name_token = self.consume(TokenType::Identifier, "function name")?;
        self.consume(TokenType::LeftParen, "'('")?;

        let mut params = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                let value_type = self.parse_type()?;
                let name = self.consume(TokenType::Identifier, "parameter name")?.lexeme;
                params.push((name, value_type));
                if !self.match_token_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "')'")?;

        let mut returns = Vec::new();
        if self.peek().token_type.is_type_name() {
            loop {
                returns.push(self.parse_type()?);
                if !self.match_token_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        Ok(Signature {
            name: name_token.lexeme,
            params,
            returns: Type(returns),
            line: name_token.line,
        })
    }

    fn parse_function(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        let signature = self.parse_signature()?;
        let entry = self
            .ctx
            .symbols
            .find_function(&signature.name, &signature.args())
            .map(|function| function.entry)
            .ok_or_else(|| ParseError::UnknownFunction {
                name: signature.name.clone(),
                args: signature.args(),
                line: signature.line,
            })?;
        let skip = self.ctx.new_label();

        self.ctx.symbols.enter_function(signature.returns.clone());
        for (name, value_type) in &signature.params {
            self.ctx.add_variable(name, *value_type, false);
        }
        let body = self.parse_function_body(&signature);
        let epilogue = self.ctx.symbols.exit_function();
        let body = body?;

        if !signature.returns.is_void() && !body.terminates() {
            return Err(ParseError::MissingReturn {
                name: signature.name,
                returns: signature.returns,
                line: signature.line,
            });
        }

        Ok(Statement::Function {
            name: signature.name,
            entry,
            skip,
            params: signature.params,
            returns: signature.returns,
            body: Box::new(body),
            epilogue,
        })
    }

    fn parse_function_body(&mut self, signature: &Signature) -> Result<Statement, ParseError> {
        if !self.match_token_types(&[TokenType::Assign]) {
            return self.parse_block();
        }

        // Short form `def f(...) T = expr`
        let line = self.peek().line;
        let (returns, clear) = self.ctx.return_target(line)?;
        let value = self.parse_expression()?;
        if returns.is_void() || value.ty() != returns {
            return Err(ParseError::Type {
                message: format!(
                    "function '{}' returns {}, found {}",
                    signature.name,
                    returns,
                    value.ty()
                ),
                line,
            });
        }
        Ok(Statement::Return {
            values: vec![value],
            clear,
        })
    }

    fn parse_return(&mut self) -> Result<Statement, ParseError> {
        let line = self.advance().line;
        let (returns, clear) = self.ctx.return_target(line)?;

        let mut values = Vec::new();
        let has_values = !returns.is_void()
            || (self.peek().line == line && self.peek().token_type.starts_expression());
        if has_values {
            loop {
                values.push(self.parse_expression()?);
                if !self.match_token_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        let found = values.iter().fold(Type::void(), |acc, value| acc.concat(&value.ty()));
        if found != returns {
            return Err(ParseError::Type {
                message: format!("expected to return {}, found {}", returns, found),
                line,
            });
        }

        Ok(Statement::Return { values, clear })
    }

    fn parse_loop_jump(&mut self) -> Result<Statement, ParseError> {
        let token = self.advance().clone();
        let is_continue = token.token_type == TokenType::Continue;

        let level = if self.check(TokenType::Number) && self.peek().line == token.line {
            self.parse_constant()? as usize
        } else {
            0
        };

        let (target, clear) = self.ctx.loop_jump(level, is_continue, token.line)?;
        Ok(if is_continue {
            Statement::Continue { target, clear }
        } else {
            Statement::Break { target, clear }
        })
    }

    fn parse_image_buffer(&mut self) -> Result<(), ParseError> {
        self.advance();
        let token = self.peek().clone();
        let count = self.parse_constant()?;
        if count == 0 || count > MAX_IMAGE_BUFFERS {
            return Err(ParseError::InvalidConstant {
                text: token.lexeme,
                line: token.line,
            });
        }
        self.ctx.set_image_buffers(count);
        Ok(())
    }

    fn parse_image_index(&mut self) -> Result<u32, ParseError> {
        let line = self.peek().line;
        let index = self.parse_constant()?;
        self.ctx.reference_image(index, line);
        Ok(index)
    }

    fn parse_command(&mut self, command: Command) -> Result<Statement, ParseError> {
        let line = self.advance().line;

        let call_form = command.params().len() == 2 && self.check(TokenType::LeftParen);
        let args = if call_form {
            self.advance();
            self.parse_arguments()?
        } else {
            let mut args = vec![self.parse_expression()?];
            while self.match_token_types(&[TokenType::Comma]) {
                args.push(self.parse_expression()?);
            }
            args
        };

        check_command(command, &args, line)?;
        Ok(Statement::Command { command, args })
    }

    /// A whole non-negative number literal
    fn parse_constant(&mut self) -> Result<u32, ParseError> {
        let token = self.consume(TokenType::Number, "constant")?;
        match token.lexeme.parse::<f64>() {
            Ok(value) if value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 => {
                Ok(value as u32)
            }
            _ => Err(ParseError::InvalidConstant {
                text: token.lexeme,
                line: token.line,
            }),
        }
    }

    fn parse_type(&mut self) -> Result<ValueType, ParseError> {
        let token = self.peek().clone();
        match ValueType::from_token(token.token_type) {
            Some(value_type) => {
                self.advance();
                Ok(value_type)
            }
            None => Err(self.unexpected(&token, "type name")),
        }
    }

    fn match_token_types(&mut self, types: &[TokenType]) -> bool {
        for token_type in types {
            if self.check(*token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, token_type: TokenType) -> bool {
        if self.is_at_end() {
            token_type == TokenType::Eof
        } else {
            self.peek().token_type == token_type
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.current + 1)
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn consume(&mut self, token_type: TokenType, expected: &str) -> Result<Token, ParseError> {
        if self.check(token_type) {
            Ok(self.advance().clone())
        } else {
            let found = self.peek().clone();
            Err(self.unexpected(&found, expected))
        }
    }

    fn unexpected(&self, found: &Token, expected: &str) -> ParseError {
        if found.token_type == TokenType::Eof {
            ParseError::UnexpectedEof {
                expected: expected.to_string(),
            }
        } else {
            ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: found.to_string(),
                line: found.line,
            }
        }
    }
}

impl TokenType {
    /// Whether an expression can begin with this token
    pub fn starts_expression(self) -> bool {
        matches!(
            self,
            TokenType::Number
                | TokenType::Identifier
                | TokenType::LeftParen
                | TokenType::Minus
                | TokenType::Bang
                | TokenType::PointType
                | TokenType::ColorType
        ) || ast::Intrinsic::from_token(self).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Expected {expected} but found {found} at line {line}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
    },

    #[error("Expected {expected} but reached the end of the file")]
    UnexpectedEof { expected: String },

    #[error("Unknown variable '{name}' at line {line}")]
    UnknownVariable { name: String, line: usize },

    #[error("No function '{name}' taking {args} at line {line}")]
    UnknownFunction { name: String, args: Type, line: usize },

    #[error("{value_type} has no field '{name}' at line {line}")]
    UnknownField {
        name: String,
        value_type: ValueType,
        line: usize,
    },

    #[error("Function '{name}' taking {args} at line {line} is already defined at line {previous}")]
    DuplicateFunction {
        name: String,
        args: Type,
        line: usize,
        previous: usize,
    },

    #[error("Type error at line {line}: {message}")]
    Type { message: String, line: usize },

    #[error("'{keyword} {level}' at line {line} has no enclosing loop at that level")]
    InvalidTerminator {
        keyword: &'static str,
        level: usize,
        line: usize,
    },

    #[error("'return' outside of a function at line {line}")]
    ReturnOutsideFunction { line: usize },

    #[error("Function '{name}' at line {line} must return {returns} on every path")]
    MissingReturn {
        name: String,
        returns: Type,
        line: usize,
    },

    #[error("Expected a whole number constant but found '{text}' at line {line}")]
    InvalidConstant { text: String, line: usize },

    #[error("Image buffer {index} at line {line} is out of range, {count} configured")]
    ImageBufferOutOfRange { index: u32, count: u32, line: usize },
}
