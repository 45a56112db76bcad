mod token;

pub use token::{Token, TokenType, OPERATOR_CHARS};

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace()?;

            if self.is_at_end() {
                break;
            }

            let token = self.next_token()?;
            tokens.push(token);
        }

        tokens.push(Token::new(TokenType::Eof, "", self.line));
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, LexerError> {
        let line = self.line;
        let ch = self.peek();

        if ch.is_ascii_digit() {
            let lexeme = self.number()?;
            return Ok(Token::new(TokenType::Number, lexeme, line));
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let word = self.identifier();
            let token_type = TokenType::keyword(&word).unwrap_or(TokenType::Identifier);
            return Ok(Token::new(token_type, word, line));
        }

        if OPERATOR_CHARS.contains(ch) {
            return self.operator();
        }

        Err(LexerError::UnexpectedCharacter(ch, self.line, self.column))
    }

    /// Longest operator spelling that starts here
    fn operator(&mut self) -> Result<Token, LexerError> {
        let line = self.line;
        let column = self.column;
        let mut text = String::new();
        text.push(self.advance());

        while !self.is_at_end() {
            let next = self.peek();
            if !OPERATOR_CHARS.contains(next) {
                break;
            }
            let mut candidate = text.clone();
            candidate.push(next);
            if TokenType::operator(&candidate).is_none() {
                break;
            }
            self.advance();
            text = candidate;
        }

        match TokenType::operator(&text) {
            Some(token_type) => Ok(Token::new(token_type, text, line)),
            None => Err(LexerError::UnknownOperator(text, line, column)),
        }
    }

    /// Scan a numeric literal and return its decimal spelling.
    ///
    /// Accepts `0x`, `0o` and `0b` prefixes, `'` digit separators and a
    /// trailing `f32`/`f64` suffix on hexadecimal literals.
    fn number(&mut self) -> Result<String, LexerError> {
        let line = self.line;
        let column = self.column;

        let mut radix = 10;
        if self.peek() == '0' {
            radix = match self.peek_next() {
                Some('x') | Some('X') => 16,
                Some('o') | Some('O') => 8,
                Some('b') | Some('B') => 2,
                _ => 10,
            };
            if radix != 10 {
                self.advance();
                self.advance();
            }
        }

        let mut integer = self.digits(radix);
        let mut fraction = None;
        if self.peek() == '.' && self.peek_next().map_or(false, |c| c.is_digit(radix)) {
            self.advance();
            fraction = Some(self.digits(radix));
        }

        if radix == 16 {
            let last = fraction.as_mut().unwrap_or(&mut integer);
            if last.ends_with("f32") || last.ends_with("f64") {
                last.truncate(last.len() - 3);
            }
        }

        let spelled = match &fraction {
            Some(fraction) => format!("{}.{}", integer, fraction),
            None => integer.clone(),
        };

        if integer.is_empty() {
            return Err(LexerError::InvalidNumber(spelled, line, column));
        }

        if radix == 10 {
            return Ok(spelled);
        }

        let mut whole: u64 = 0;
        for digit in integer.chars() {
            let value = digit.to_digit(radix).unwrap_or(0) as u64;
            whole = whole
                .checked_mul(radix as u64)
                .and_then(|w| w.checked_add(value))
                .ok_or_else(|| LexerError::NumberTooLarge(spelled.clone(), line, column))?;
        }

        match fraction {
            Some(fraction) => {
                let mut value = whole as f64;
                let mut scale = 1.0 / radix as f64;
                for digit in fraction.chars() {
                    value += digit.to_digit(radix).unwrap_or(0) as f64 * scale;
                    scale /= radix as f64;
                }
                Ok(value.to_string())
            }
            None => Ok(whole.to_string()),
        }
    }

    fn digits(&mut self, radix: u32) -> String {
        let mut digits = String::new();
        while !self.is_at_end() {
            let ch = self.peek();
            if ch == '\'' {
                self.advance();
            } else if ch.is_digit(radix) {
                digits.push(self.advance());
            } else {
                break;
            }
        }
        digits
    }

    fn identifier(&mut self) -> String {
        let mut identifier = String::new();

        while !self.is_at_end() {
            let ch = self.peek();
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '$' {
                identifier.push(self.advance());
            } else {
                break;
            }
        }

        identifier
    }

    fn skip_whitespace(&mut self) -> Result<(), LexerError> {
        while !self.is_at_end() {
            match self.peek() {
                ' ' | '\r' | '\t' => {
                    self.advance();
                }
                '\n' => {
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                }
                '#' if self.starts_with("###") => {
                    let line = self.line;
                    for _ in 0..3 {
                        self.advance();
                    }
                    loop {
                        if self.is_at_end() {
                            return Err(LexerError::UnterminatedComment(line));
                        }
                        if self.starts_with("###") {
                            for _ in 0..3 {
                                self.advance();
                            }
                            break;
                        }
                        if self.advance() == '\n' {
                            self.line += 1;
                            self.column = 1;
                        }
                    }
                }
                '#' => {
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn starts_with(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, c)| self.input.get(self.position + i) == Some(&c))
    }

    fn advance(&mut self) -> char {
        let ch = self.input[self.position];
        self.position += 1;
        self.column += 1;
        ch
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.input[self.position]
        }
    }

    fn peek_next(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexerError {
    #[error("Unexpected character '{0}' at line {1}, column {2}")]
    UnexpectedCharacter(char, usize, usize),

    #[error("Unknown operator '{0}' at line {1}, column {2}")]
    UnknownOperator(String, usize, usize),

    #[error("Invalid number '{0}' at line {1}, column {2}")]
    InvalidNumber(String, usize, usize),

    #[error("Number '{0}' is too large at line {1}, column {2}")]
    NumberTooLarge(String, usize, usize),

    #[error("Unterminated block comment starting at line {0}")]
    UnterminatedComment(usize),
}

impl LexerError {
    pub fn line(&self) -> usize {
        match self {
            LexerError::UnexpectedCharacter(_, line, _)
            | LexerError::UnknownOperator(_, line, _)
            | LexerError::InvalidNumber(_, line, _)
            | LexerError::NumberTooLarge(_, line, _)
            | LexerError::UnterminatedComment(line) => *line,
        }
    }
}
