//! Formula tokenizer
//!
//! Converts formula strings like `ROUND(won / total * 100, 1)` into a
//! sequence of tokens that can be parsed into an AST.

use crate::error::FormulaError;
use std::iter::Peekable;
use std::str::Chars;

/// A token in a formula expression
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal (e.g., 123, 45.67, 1.5e10)
    Number(f64),
    /// A string literal (e.g., "hello" or 'world')
    Text(String),
    /// An identifier: field, formula id, keyword or builtin name
    Identifier(String),
    /// Arithmetic, comparison and logical operators
    Operator(String),
    OpenParen,
    CloseParen,
    Comma,
    Dot,
    /// `?` of the conditional operator
    Question,
    /// `:` of the conditional operator
    Colon,
}

/// Error during tokenization
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizeError {
    pub message: String,
    pub position: usize,
}

impl TokenizeError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tokenize error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for TokenizeError {}

impl From<TokenizeError> for FormulaError {
    fn from(e: TokenizeError) -> Self {
        FormulaError::syntax(e.message, e.position)
    }
}

/// Tokenizer for formula expressions
pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(formula: &'a str) -> Self {
        Self {
            chars: formula.chars().peekable(),
            position: 0,
        }
    }

    /// Tokenize the entire formula into a vector of tokens
    pub fn tokenize(mut self) -> Result<Vec<Token>, TokenizeError> {
        let mut tokens = Vec::new();

        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }

        Ok(tokens)
    }

    /// Get the next token, or None if at end of input
    fn next_token(&mut self) -> Result<Option<Token>, TokenizeError> {
        self.skip_whitespace();

        let c = match self.peek() {
            None => return Ok(None),
            Some(c) => c,
        };

        let token = match c {
            '"' | '\'' => self.read_string(c)?,

            '(' => self.single(Token::OpenParen),
            ')' => self.single(Token::CloseParen),
            ',' => self.single(Token::Comma),
            ':' => self.single(Token::Colon),

            '.' => {
                self.advance();
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.read_number(String::from("0."))?
                } else {
                    Token::Dot
                }
            }

            '+' | '-' | '/' | '%' => {
                self.advance();
                Token::Operator(c.to_string())
            }

            '*' => {
                self.advance();
                if self.eat('*') {
                    Token::Operator("**".to_string())
                } else {
                    Token::Operator("*".to_string())
                }
            }

            '?' => {
                self.advance();
                if self.eat('?') {
                    Token::Operator("??".to_string())
                } else {
                    Token::Question
                }
            }

            '<' | '>' => {
                self.advance();
                if self.eat('=') {
                    Token::Operator(format!("{}=", c))
                } else {
                    Token::Operator(c.to_string())
                }
            }

            '=' | '!' => self.read_equality_or_not(c)?,

            '&' | '|' => {
                let start = self.position;
                self.advance();
                if self.eat(c) {
                    Token::Operator(format!("{}{}", c, c))
                } else {
                    return Err(TokenizeError::new(
                        format!("Unexpected character: '{}' (did you mean '{}{}'?)", c, c, c),
                        start,
                    ));
                }
            }

            c if c.is_ascii_digit() => self.read_number(String::new())?,

            c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier(),

            c => {
                return Err(TokenizeError::new(
                    format!("Unexpected character: '{}'", c),
                    self.position,
                ));
            }
        };

        Ok(Some(token))
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    /// Consume the next character if it matches
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read a quoted string with backslash escapes
    fn read_string(&mut self, quote: char) -> Result<Token, TokenizeError> {
        let start_pos = self.position;
        self.advance();
        let mut value = String::new();

        loop {
            match self.advance() {
                None => {
                    return Err(TokenizeError::new("Unterminated string literal", start_pos));
                }
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some(other) => value.push(other),
                    None => {
                        return Err(TokenizeError::new("Unterminated string literal", start_pos));
                    }
                },
                Some(c) if c == quote => break,
                Some(c) => value.push(c),
            }
        }

        Ok(Token::Text(value))
    }

    /// Read a number (integer, decimal, or scientific notation)
    fn read_number(&mut self, mut num_str: String) -> Result<Token, TokenizeError> {
        let start_pos = self.position;

        self.read_digits(&mut num_str);

        if num_str.find('.').is_none() && self.peek() == Some('.') {
            num_str.push('.');
            self.advance();
            self.read_digits(&mut num_str);
        }

        if let Some(c @ ('e' | 'E')) = self.peek() {
            num_str.push(c);
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                num_str.push(sign);
                self.advance();
            }
            self.read_digits(&mut num_str);
        }

        if self.peek().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
            return Err(TokenizeError::new(
                format!("Invalid number: identifier cannot start with a digit near '{}'", num_str),
                start_pos,
            ));
        }

        num_str
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| TokenizeError::new(format!("Invalid number: {}", num_str), start_pos))
    }

    fn read_digits(&mut self, out: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }

        Token::Identifier(ident)
    }

    /// `=` must start `==`/`===`; `!` is negation unless followed by `=`
    fn read_equality_or_not(&mut self, first: char) -> Result<Token, TokenizeError> {
        let start = self.position;
        self.advance();

        if !self.eat('=') {
            return if first == '!' {
                Ok(Token::Operator("!".to_string()))
            } else {
                Err(TokenizeError::new(
                    "Assignment is not allowed in formulas (use '==' to compare)",
                    start,
                ))
            };
        }

        let strict = self.eat('=');
        let op = match (first, strict) {
            ('=', false) => "==",
            ('=', true) => "===",
            (_, false) => "!=",
            (_, true) => "!==",
        };
        Ok(Token::Operator(op.to_string()))
    }
}

/// Convenience function to tokenize a formula
pub fn tokenize(formula: &str) -> Result<Vec<Token>, TokenizeError> {
    Tokenizer::new(formula).tokenize()
}
