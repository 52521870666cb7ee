//! Parser for spell scripts.
//!
//! Converts a token stream (from [`crate::tokenizer`]) into an AST
//! ([`crate::ast`]) by recursive descent:
//!
//! ```text
//! program     = statement*
//! statement   = 'let' Ident '=' expr ';'
//!             | 'if' expr block ('else' (block | if))?
//!             | 'while' expr block
//!             | expr ('=' expr)? ';'
//! block       = '{' statement* '}'
//! expr        = or
//! or          = and ('||' and)*
//! and         = equality ('&&' equality)*
//! equality    = comparison (('==' | '!=') comparison)*
//! comparison  = additive (('<' | '<=' | '>' | '>=') additive)*
//! additive    = term (('+' | '-') term)*
//! term        = unary (('*' | '/' | '%') unary)*
//! unary       = ('!' | '-') unary | postfix
//! postfix     = primary ('.' Ident call? | '[' expr ']' | call)*
//! call        = '(' (expr (',' expr)* ','?)? ')'
//! primary     = literal | Ident | '(' expr ')' | list | map
//! list        = '[' (expr (',' expr)* ','?)? ']'
//! map         = '{' ((Ident | Str) ':' expr (',' ...)* ','?)? '}'
//! ```
//!
//! The `;` ending a statement may be left off right before `}` or the end of
//! the script.

use crate::ast::*;
use crate::error::ParseError;
use crate::tokenizer::{Lexeme, Token, tokenize};

/// How deeply expressions and blocks may nest.
pub const MAX_DEPTH: usize = 64;

const PRECEDENCE_LEVELS: usize = 6;

/// The binary operator `token` stands for at `level`, loosest binding first.
fn binary_operator(level: usize, token: &Token) -> Option<BinaryOp> {
    Some(match (level, token) {
        (0, Token::Or) => BinaryOp::Or,
        (1, Token::And) => BinaryOp::And,
        (2, Token::Equal) => BinaryOp::Equal,
        (2, Token::NotEqual) => BinaryOp::NotEqual,
        (3, Token::Less) => BinaryOp::Less,
        (3, Token::LessEqual) => BinaryOp::LessEqual,
        (3, Token::Greater) => BinaryOp::Greater,
        (3, Token::GreaterEqual) => BinaryOp::GreaterEqual,
        (4, Token::Plus) => BinaryOp::Add,
        (4, Token::Minus) => BinaryOp::Subtract,
        (5, Token::Star) => BinaryOp::Multiply,
        (5, Token::Slash) => BinaryOp::Divide,
        (5, Token::Percent) => BinaryOp::Remainder,
        _ => return None,
    })
}

/// A token-stream parser.
struct Parser {
    lexemes: Vec<Lexeme>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(lexemes: Vec<Lexeme>) -> Self {
        Self {
            lexemes,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.lexemes.get(self.pos).map(|lexeme| &lexeme.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.lexemes.get(self.pos).map(|lexeme| lexeme.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn line(&self) -> usize {
        self.lexemes
            .get(self.pos)
            .or_else(|| self.lexemes.last())
            .map(|lexeme| lexeme.line)
            .unwrap_or(1)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expected(&self, expected: &str) -> ParseError {
        ParseError::Expected {
            expected: expected.into(),
            found: self
                .peek()
                .map(|token| token.to_string())
                .unwrap_or("end of input".into()),
            line: self.line(),
        }
    }

    fn expect(&mut self, token: &Token, expected: &str) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.expected(expected))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(_)) => match self.advance() {
                Some(Token::Ident(name)) => Ok(name),
                _ => Err(self.expected(expected)),
            },
            _ => Err(self.expected(expected)),
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::TooDeep {
                limit: MAX_DEPTH,
                line: self.line(),
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // --- Statement parsing ---

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match self.peek() {
            Some(Token::Let) => {
                self.advance();
                let name = self.expect_ident("variable name")?;
                self.expect(&Token::Assign, "'='")?;
                let value = self.parse_expr()?;
                self.expect_terminator()?;
                Ok(Statement::Let { name, value })
            }
            Some(Token::If) => self.parse_if(),
            Some(Token::While) => {
                self.advance();
                let condition = self.parse_expr()?;
                let body = self.parse_block()?;
                Ok(Statement::While { condition, body })
            }
            _ => {
                let line = self.line();
                let expr = self.parse_expr()?;
                if self.eat(&Token::Assign) {
                    let target = expr
                        .into_place()
                        .ok_or(ParseError::InvalidAssignmentTarget { line })?;
                    let value = self.parse_expr()?;
                    self.expect_terminator()?;
                    Ok(Statement::Assign { target, value })
                } else {
                    self.expect_terminator()?;
                    Ok(Statement::Expr(expr))
                }
            }
        }
    }

    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        self.expect(&Token::If, "'if'")?;
        let condition = self.parse_expr()?;
        let then = self.parse_block()?;
        let otherwise = if self.eat(&Token::Else) {
            if self.peek() == Some(&Token::If) {
                self.enter()?;
                let nested = self.parse_if()?;
                self.leave();
                vec![nested]
            } else {
                self.parse_block()?
            }
        } else {
            Vec::new()
        };
        Ok(Statement::If {
            condition,
            then,
            otherwise,
        })
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.enter()?;
        self.expect(&Token::LeftBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.eat(&Token::RightBrace) {
            if self.peek().is_none() {
                return Err(self.expected("'}'"));
            }
            statements.push(self.parse_statement()?);
        }
        self.leave();
        Ok(statements)
    }

    fn expect_terminator(&mut self) -> Result<(), ParseError> {
        if self.eat(&Token::Semicolon) || matches!(self.peek(), None | Some(Token::RightBrace)) {
            Ok(())
        } else {
            Err(self.expected("';'"))
        }
    }

    // --- Expression parsing ---

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, level: usize) -> Result<Expr, ParseError> {
        if level == PRECEDENCE_LEVELS {
            return self.parse_unary();
        }

        let mut left = self.parse_binary(level + 1)?;
        // Each operator wraps the chain so far one level deeper.
        let mut chained = 0;
        while let Some(op) = self.peek().and_then(|token| binary_operator(level, token)) {
            self.advance();
            self.enter()?;
            chained += 1;
            let right = self.parse_binary(level + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth -= chained;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Negate,
            _ => return self.parse_postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.parse_unary()?;
        self.leave();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        let mut chained = 0;
        loop {
            if matches!(
                self.peek(),
                Some(Token::Dot | Token::LeftBracket | Token::LeftParen)
            ) {
                self.enter()?;
                chained += 1;
            }
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let name = self.expect_ident("field name")?;
                    if self.peek() == Some(&Token::LeftParen) {
                        let args = self.parse_arguments()?;
                        expr = Expr::MethodCall {
                            target: Box::new(expr),
                            method: name,
                            args,
                        };
                    } else {
                        expr = Expr::Field {
                            target: Box::new(expr),
                            name,
                        };
                    }
                }
                Some(Token::LeftBracket) => {
                    self.advance();
                    self.enter()?;
                    let index = self.parse_expr()?;
                    self.leave();
                    self.expect(&Token::RightBracket, "']'")?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Token::LeftParen) => {
                    let args = self.parse_arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => {
                    self.depth -= chained;
                    return Ok(expr);
                }
            }
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(&Token::LeftParen, "'('")?;
        self.parse_sequence(&Token::RightParen, "')'")
    }

    /// Parse comma separated expressions up to and including `close`.
    fn parse_sequence(&mut self, close: &Token, expected: &str) -> Result<Vec<Expr>, ParseError> {
        self.enter()?;
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.parse_expr()?);
            if !self.eat(&Token::Comma) {
                self.expect(close, expected)?;
                break;
            }
        }
        self.leave();
        Ok(items)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let literal = match self.peek() {
            Some(Token::Null) => Literal::Null,
            Some(Token::True) => Literal::Bool(true),
            Some(Token::False) => Literal::Bool(false),
            Some(Token::Integer(n)) => Literal::Integer(*n),
            Some(Token::Float(n)) => Literal::Float(*n),
            Some(Token::Str(s)) => Literal::Str(s.clone()),
            Some(Token::Ident(_)) => {
                let name = self.expect_ident("name")?;
                return Ok(Expr::Variable(name));
            }
            Some(Token::LeftParen) => {
                self.advance();
                self.enter()?;
                let expr = self.parse_expr()?;
                self.leave();
                self.expect(&Token::RightParen, "')'")?;
                return Ok(expr);
            }
            Some(Token::LeftBracket) => {
                self.advance();
                return Ok(Expr::List(self.parse_sequence(&Token::RightBracket, "']'")?));
            }
            Some(Token::LeftBrace) => {
                self.advance();
                return self.parse_map();
            }
            _ => return Err(self.expected("expression")),
        };
        self.advance();
        Ok(Expr::Literal(literal))
    }

    fn parse_map(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let mut entries = Vec::new();
        while !self.eat(&Token::RightBrace) {
            let key = match self.peek() {
                Some(Token::Ident(key) | Token::Str(key)) => key.clone(),
                _ => return Err(self.expected("map key")),
            };
            self.advance();
            self.expect(&Token::Colon, "':'")?;
            entries.push((key, self.parse_expr()?));
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RightBrace, "'}'")?;
                break;
            }
        }
        self.leave();
        Ok(Expr::Map(entries))
    }
}

/// Parse a whole script into a [`Program`].
pub fn parse(input: &str) -> Result<Program, ParseError> {
    let mut parser = Parser::new(tokenize(input)?);
    let mut statements = Vec::new();
    while parser.peek().is_some() {
        statements.push(parser.parse_statement()?);
    }
    Ok(Program { statements })
}

/// Parse a single expression, rejecting trailing input.
pub fn parse_expression(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(tokenize(input)?);
    let expr = parser.parse_expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(_) => Err(parser.expected("end of input")),
    }
}
