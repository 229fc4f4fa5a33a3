//! Formula parser
//!
//! Converts a sequence of tokens into an Abstract Syntax Tree (AST).
//! Uses recursive descent parsing with operator precedence. The grammar is
//! closed: literals, identifiers, property access on builtin namespaces,
//! builtin calls, unary/binary operators and the conditional operator.

use super::tokenizer::{tokenize, Token};
use crate::core::references::is_reserved;
use crate::error::FormulaError;

/// Default nesting cap when no config is supplied
pub const DEFAULT_MAX_NESTING: usize = 256;

/// Abstract Syntax Tree node for formula expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// `null` and `undefined`
    Null,
    /// A field, formula id or builtin constant
    Identifier(String),
    /// Property access: object.property
    Member { object: Box<Expr>, property: String },
    /// Call of a builtin: callee(args)
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// Unary operation: -expr, +expr, !expr, typeof expr
    UnaryOp { op: String, operand: Box<Expr> },
    /// Binary operation: left op right (logical operators short-circuit)
    BinaryOp {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// condition ? then_branch : else_branch
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
}

impl Expr {
    /// Dotted path of a callee (`ROUND`, `Math.floor`), if it is one
    pub fn path(&self) -> Option<String> {
        let mut properties = Vec::new();
        let mut current = self;
        loop {
            match current {
                Expr::Identifier(name) => {
                    properties.push(name.as_str());
                    break;
                }
                Expr::Member { object, property } => {
                    properties.push(property.as_str());
                    current = object;
                }
                _ => return None,
            }
        }
        properties.reverse();
        Some(properties.join("."))
    }
}

/// Error during parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for FormulaError {
    fn from(e: ParseError) -> Self {
        FormulaError::syntax(e.message, e.position)
    }
}

/// Parser for formula tokens
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
    max_nesting: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::with_max_nesting(tokens, DEFAULT_MAX_NESTING)
    }

    pub fn with_max_nesting(tokens: Vec<Token>, max_nesting: usize) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
            max_nesting,
        }
    }

    /// Parse the tokens into an AST
    pub fn parse(mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new("Empty expression", 0));
        }
        self.check_balanced()?;

        let expr = self.expression()?;

        if !self.is_at_end() {
            return Err(ParseError::new(
                format!("Unexpected token after expression: {:?}", self.peek()),
                self.position,
            ));
        }

        Ok(expr)
    }

    /// Reject unbalanced parentheses before building anything
    fn check_balanced(&self) -> Result<(), ParseError> {
        let mut open = 0usize;
        for (i, token) in self.tokens.iter().enumerate() {
            match token {
                Token::OpenParen => open += 1,
                Token::CloseParen => {
                    if open == 0 {
                        return Err(ParseError::new("Unbalanced parentheses: unexpected ')'", i));
                    }
                    open -= 1;
                }
                _ => {}
            }
        }
        if open > 0 {
            return Err(ParseError::new(
                format!("Unbalanced parentheses: {} unclosed '('", open),
                self.tokens.len(),
            ));
        }
        Ok(())
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<&Token> {
        if !self.is_at_end() {
            self.position += 1;
        }
        self.tokens.get(self.position - 1)
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_any_operator(&mut self, ops: &[&str]) -> Option<String> {
        if let Some(Token::Operator(s)) = self.peek() {
            if ops.contains(&s.as_str()) {
                let op = s.clone();
                self.advance();
                return Some(op);
            }
        }
        None
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_nesting {
            return Err(ParseError::new(
                format!("Expression nested deeper than {} levels", self.max_nesting),
                self.position,
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Expression: conditional
    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let expr = self.conditional();
        self.leave();
        expr
    }

    /// Conditional: nullish ( "?" expression ":" expression )?   (right-associative)
    fn conditional(&mut self) -> Result<Expr, ParseError> {
        let condition = self.nullish()?;

        if !self.match_token(&Token::Question) {
            return Ok(condition);
        }

        let then_branch = self.expression()?;
        if !self.match_token(&Token::Colon) {
            return Err(ParseError::new(
                "Expected ':' in conditional expression",
                self.position,
            ));
        }
        let else_branch = self.expression()?;

        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    /// Shared loop for left-associative binary levels
    fn binary_level(
        &mut self,
        ops: &[&str],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut left = next(self)?;
        // Each chained operator deepens the left spine of the tree
        let mut chained = 0;

        while let Some(op) = self.match_any_operator(ops) {
            self.enter()?;
            chained += 1;
            let right = next(self)?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        self.depth -= chained;
        Ok(left)
    }

    /// Nullish: or ( "??" or )*
    fn nullish(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["??"], Self::logical_or)
    }

    /// Or: and ( "||" and )*
    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["||"], Self::logical_and)
    }

    /// And: equality ( "&&" equality )*
    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["&&"], Self::equality)
    }

    /// Equality: comparison (( "==" | "!=" | "===" | "!==" ) comparison)*
    fn equality(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["==", "!=", "===", "!=="], Self::comparison)
    }

    /// Comparison: term (( "<" | ">" | "<=" | ">=" ) term)*
    fn comparison(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["<", ">", "<=", ">="], Self::term)
    }

    /// Term: factor (( "+" | "-" ) factor)*
    fn term(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["+", "-"], Self::factor)
    }

    /// Factor: unary (( "*" | "/" | "%" ) unary)*
    fn factor(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["*", "/", "%"], Self::unary)
    }

    /// Unary: ( "-" | "+" | "!" | "typeof" ) unary | power
    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(Token::Operator(s)) if matches!(s.as_str(), "-" | "+" | "!") => Some(s.clone()),
            Some(Token::Identifier(s)) if s == "typeof" => Some(s.clone()),
            _ => None,
        };

        match op {
            Some(op) => {
                self.advance();
                self.enter()?;
                let operand = self.unary();
                self.leave();
                Ok(Expr::UnaryOp {
                    op,
                    operand: Box::new(operand?),
                })
            }
            None => self.power(),
        }
    }

    /// Power: postfix ( "**" unary )?   (right-associative)
    fn power(&mut self) -> Result<Expr, ParseError> {
        let left = self.postfix()?;

        if self.match_any_operator(&["**"]).is_some() {
            self.enter()?;
            let right = self.unary();
            self.leave();
            Ok(Expr::BinaryOp {
                op: "**".to_string(),
                left: Box::new(left),
                right: Box::new(right?),
            })
        } else {
            Ok(left)
        }
    }

    /// Postfix: primary ( "(" arguments? ")" | "." IDENTIFIER )*
    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        // Each call or property link wraps the expression one level deeper
        let mut chained = 0;

        loop {
            if self.match_token(&Token::OpenParen) {
                self.enter()?;
                chained += 1;
                let args = self.arguments()?;
                if !self.match_token(&Token::CloseParen) {
                    return Err(ParseError::new(
                        "Expected ')' after function arguments",
                        self.position,
                    ));
                }
                if expr.path().is_none() {
                    return Err(ParseError::new(
                        "Only named builtin functions can be called",
                        self.position,
                    ));
                }
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.match_token(&Token::Dot) {
                self.enter()?;
                chained += 1;
                match self.advance().cloned() {
                    Some(Token::Identifier(property)) => {
                        expr = Expr::Member {
                            object: Box::new(expr),
                            property,
                        };
                    }
                    _ => {
                        return Err(ParseError::new(
                            "Expected property name after '.'",
                            self.position,
                        ));
                    }
                }
            } else {
                break;
            }
        }

        self.depth -= chained;
        Ok(expr)
    }

    /// Arguments: ( expr ( "," expr )* )?
    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();

        if let Some(Token::CloseParen) = self.peek() {
            return Ok(args);
        }

        args.push(self.expression()?);

        while self.match_token(&Token::Comma) {
            args.push(self.expression()?);
        }

        Ok(args)
    }

    /// Primary: NUMBER | STRING | KEYWORD | IDENTIFIER | "(" expr ")"
    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().cloned();

        match token {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Some(Token::Text(s)) => {
                self.advance();
                Ok(Expr::Text(s))
            }
            Some(Token::Identifier(name)) => {
                self.advance();
                self.parse_identifier(name)
            }
            Some(Token::OpenParen) => {
                self.advance();
                let expr = self.expression()?;
                if !self.match_token(&Token::CloseParen) {
                    return Err(ParseError::new(
                        "Expected ')' after expression",
                        self.position,
                    ));
                }
                Ok(expr)
            }
            Some(token) => Err(ParseError::new(
                format!("Unexpected token: {:?}", token),
                self.position,
            )),
            None => Err(ParseError::new(
                "Unexpected end of expression",
                self.position,
            )),
        }
    }

    /// Keywords become literals; statements are rejected
    fn parse_identifier(&self, name: String) -> Result<Expr, ParseError> {
        match name.as_str() {
            "true" => Ok(Expr::Boolean(true)),
            "false" => Ok(Expr::Boolean(false)),
            "null" | "undefined" => Ok(Expr::Null),
            word if is_reserved(word) => Err(ParseError::new(
                format!(
                    "'{}' is not allowed in formulas: use a single expression (e.g. cond ? a : b)",
                    word
                ),
                self.position - 1,
            )),
            _ => Ok(Expr::Identifier(name)),
        }
    }
}

/// Convenience function to parse tokens into an AST
pub fn parse(tokens: Vec<Token>) -> Result<Expr, ParseError> {
    Parser::new(tokens).parse()
}

/// Tokenize and parse formula text in one step
pub fn parse_formula(formula: &str, max_nesting: usize) -> Result<Expr, FormulaError> {
    let tokens = tokenize(formula)?;
    Ok(Parser::with_max_nesting(tokens, max_nesting).parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(formula: &str) -> Result<Expr, FormulaError> {
        parse_formula(formula, DEFAULT_MAX_NESTING)
    }

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Identifier(name.to_string()))
    }

    fn binary(op: &str, left: Box<Expr>, right: Box<Expr>) -> Expr {
        Expr::BinaryOp {
            op: op.to_string(),
            left,
            right,
        }
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse_str("42").unwrap(), Expr::Number(42.0));
        assert_eq!(parse_str("'hi'").unwrap(), Expr::Text("hi".to_string()));
        assert_eq!(parse_str("true").unwrap(), Expr::Boolean(true));
        assert_eq!(parse_str("undefined").unwrap(), Expr::Null);
    }

    #[test]
    fn test_parse_operator_precedence_mul_over_add() {
        assert_eq!(
            parse_str("a + b * c").unwrap(),
            binary("+", ident("a"), Box::new(binary("*", ident("b"), ident("c"))))
        );
    }

    #[test]
    fn test_parse_power_is_right_associative() {
        assert_eq!(
            parse_str("a ** b ** c").unwrap(),
            binary("**", ident("a"), Box::new(binary("**", ident("b"), ident("c"))))
        );
    }

    #[test]
    fn test_parse_logical_precedence() {
        // a || b && c  =>  a || (b && c)
        assert_eq!(
            parse_str("a || b && c").unwrap(),
            binary("||", ident("a"), Box::new(binary("&&", ident("b"), ident("c"))))
        );
    }

    #[test]
    fn test_parse_conditional_nests_right() {
        let expr = parse_str("a ? 1 : b ? 2 : 3").unwrap();
        match expr {
            Expr::Conditional { else_branch, .. } => {
                assert!(matches!(*else_branch, Expr::Conditional { .. }));
            }
            other => panic!("expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_member_call() {
        let expr = parse_str("Math.floor(x)").unwrap();
        match expr {
            Expr::Call { callee, args } => {
                assert_eq!(callee.path(), Some("Math.floor".to_string()));
                assert_eq!(args, vec![Expr::Identifier("x".to_string())]);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unary_chain() {
        assert_eq!(
            parse_str("!-x").unwrap(),
            Expr::UnaryOp {
                op: "!".to_string(),
                operand: Box::new(Expr::UnaryOp {
                    op: "-".to_string(),
                    operand: ident("x"),
                }),
            }
        );
    }

    #[test]
    fn test_parse_error_unbalanced_parens() {
        let err = parse_str("(a + b").unwrap_err();
        match err {
            FormulaError::Syntax { message, .. } => assert!(message.contains("Unbalanced")),
            other => panic!("expected syntax error, got {:?}", other),
        }
        assert!(parse_str("a + b)").is_err());
    }

    #[test]
    fn test_parse_error_empty() {
        assert!(parse_str("").is_err());
    }

    #[test]
    fn test_parse_rejects_statements() {
        assert!(parse_str("if (a) b").is_err());
        assert!(parse_str("return a").is_err());
        assert!(parse_str("function f() {}").is_err());
    }

    #[test]
    fn test_parse_rejects_call_on_expression() {
        assert!(parse_str("(a + b)(1)").is_err());
    }

    #[test]
    fn test_parse_rejects_trailing_tokens() {
        assert!(parse_str("a b").is_err());
    }

    #[test]
    fn test_parse_long_operator_chain_counts_toward_nesting() {
        let chain = vec!["x"; 40].join(" + ");
        assert!(parse_formula(&chain, 100).is_ok());
        assert!(parse_formula(&chain, 20).is_err());
    }

    #[test]
    fn test_parse_member_chain_counts_toward_nesting() {
        let chain = format!("name{}", ".length".repeat(40));
        assert!(parse_formula(&chain, 100).is_ok());
        assert!(parse_formula(&chain, 20).is_err());
        // Sibling links do not accumulate across separate operands
        let sum = vec!["Math.PI"; 40].join(" + ");
        assert!(parse_formula(&sum, 100).is_ok());
    }

    #[test]
    fn test_path_of_long_member_chain() {
        let expr = parse_formula("Math.floor", 4).unwrap();
        assert_eq!(expr.path(), Some("Math.floor".to_string()));
        let expr = parse_formula(&format!("a{}", ".b".repeat(200)), 256).unwrap();
        assert_eq!(expr.path().map(|p| p.len()), Some(1 + 2 * 200));
        assert_eq!(parse_str("(1).x").unwrap().path(), None);
    }

    #[test]
    fn test_parse_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert!(parse_formula(&deep, 200).is_ok());
        assert!(parse_formula(&deep, 10).is_err());
    }
}
