//! FILENAME: core/parser/src/parser.rs
//! PURPOSE: Recursive descent parser that converts a stream of Tokens into an AST.
//! CONTEXT: Second stage of the parsing pipeline. Used both for the formulas
//! stored in rendered sheets (recalculation) and for the small color
//! expressions evaluated per data record.
//!
//! GRAMMAR:
//!   expression     --> comparison
//!   comparison     --> concatenation ( ("=" | "<>" | "<" | ">" | "<=" | ">=") concatenation )*
//!   concatenation  --> additive ( "&" additive )*
//!   additive       --> multiplicative ( ("+" | "-") multiplicative )*
//!   multiplicative --> unary ( ("*" | "/") unary )*
//!   unary          --> "-" unary | "+" unary | power
//!   power          --> postfix ( "^" unary )?
//!   postfix        --> primary "%"*
//!   primary        --> NUMBER | STRING | BOOLEAN | reference | function_call | "(" expression ")"
//!   reference      --> [sheet_prefix] (cell_or_range | column_ref | row_ref)
//!   sheet_prefix   --> (IDENTIFIER | QUOTED_IDENTIFIER) "!"
//!   function_call  --> IDENTIFIER "(" (expression ("," expression)*)? ")"

use crate::ast::{BinaryOperator, Expression, UnaryOperator, Value};
use crate::lexer::Lexer;
use crate::token::Token;

/// Parser errors with descriptive messages.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/// The pieces of an A1-style reference: column letters, row and `$` flags.
#[derive(Debug, PartialEq, Clone)]
struct RefParts {
    col: String,
    row: u32,
    col_absolute: bool,
    row_absolute: bool,
}

impl RefParts {
    fn into_cell_ref(self, sheet: Option<String>) -> Expression {
        Expression::CellRef {
            sheet,
            col: self.col,
            row: self.row,
            col_absolute: self.col_absolute,
            row_absolute: self.row_absolute,
        }
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token();
        Parser {
            lexer,
            current_token,
        }
    }

    /// Parses the whole input. A leading '=' is optional.
    pub fn parse(&mut self) -> ParseResult<Expression> {
        if self.current_token == Token::Equals {
            self.advance();
        }

        if self.current_token == Token::EOF {
            return Err(ParseError::new("Empty expression"));
        }

        let expr = self.parse_expression()?;

        if self.current_token != Token::EOF {
            return Err(ParseError::new(format!(
                "Unexpected token after expression: {}",
                self.current_token
            )));
        }

        Ok(expr)
    }

    fn advance(&mut self) {
        self.current_token = self.lexer.next_token();
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.current_token == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(format!(
                "Expected {}, found {}",
                expected, self.current_token
            )))
        }
    }

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_concatenation()?;

        loop {
            let op = match &self.current_token {
                Token::Equals => BinaryOperator::Equal,
                Token::NotEqual => BinaryOperator::NotEqual,
                Token::LessThan => BinaryOperator::LessThan,
                Token::GreaterThan => BinaryOperator::GreaterThan,
                Token::LessEqual => BinaryOperator::LessEqual,
                Token::GreaterEqual => BinaryOperator::GreaterEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_concatenation()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_concatenation(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_additive()?;

        while self.current_token == Token::Ampersand {
            self.advance();
            let right = self.parse_additive()?;
            left = binary(left, BinaryOperator::Concat, right);
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match &self.current_token {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match &self.current_token {
                Token::Asterisk => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        match self.current_token {
            Token::Minus => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expression::UnaryOp {
                    op: UnaryOperator::Negate,
                    operand: Box::new(operand),
                })
            }
            // Unary plus is a no-op
            Token::Plus => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> ParseResult<Expression> {
        let left = self.parse_postfix()?;

        if self.current_token == Token::Caret {
            self.advance();
            let right = self.parse_unary()?;
            return Ok(binary(left, BinaryOperator::Power, right));
        }

        Ok(left)
    }

    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary()?;

        while self.current_token == Token::Percent {
            self.advance();
            expr = Expression::UnaryOp {
                op: UnaryOperator::Percent,
                operand: Box::new(expr),
            };
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        match self.current_token.clone() {
            // Could also open a row reference such as 1:5
            Token::Number(n) => {
                self.advance();
                if self.current_token == Token::Colon {
                    return self.parse_row_reference(None, n);
                }
                Ok(Expression::Literal(Value::Number(n)))
            }

            Token::String(s) => {
                self.advance();
                Ok(Expression::Literal(Value::String(s)))
            }

            Token::Boolean(b) => {
                self.advance();
                Ok(Expression::Literal(Value::Boolean(b)))
            }

            Token::QuotedIdentifier(sheet_name) => {
                self.advance();
                self.expect(Token::Exclamation)?;
                self.parse_sheet_reference(sheet_name)
            }

            Token::Identifier(name) => {
                self.advance();

                match self.current_token {
                    Token::Exclamation => {
                        self.advance();
                        self.parse_sheet_reference(name)
                    }
                    Token::LParen => self.parse_function_call(name),
                    Token::Colon => self.parse_range_or_column_ref(None, name),
                    _ => Ok(split_cell_reference(&name)?.into_cell_ref(None)),
                }
            }

            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }

            Token::EOF => Err(ParseError::new("Unexpected end of expression")),
            Token::Illegal(ch) => Err(ParseError::new(format!("Illegal character: {}", ch))),
            token => Err(ParseError::new(format!("Unexpected token: {}", token))),
        }
    }

    /// Parses what follows `SheetName!`.
    fn parse_sheet_reference(&mut self, sheet_name: String) -> ParseResult<Expression> {
        match self.current_token.clone() {
            Token::Number(n) => {
                self.advance();
                if self.current_token == Token::Colon {
                    self.parse_row_reference(Some(sheet_name), n)
                } else {
                    Err(ParseError::new(
                        "Expected ':' after row number in sheet reference",
                    ))
                }
            }

            Token::Identifier(name) => {
                self.advance();
                if self.current_token == Token::Colon {
                    self.parse_range_or_column_ref(Some(sheet_name), name)
                } else {
                    Ok(split_cell_reference(&name)?.into_cell_ref(Some(sheet_name)))
                }
            }

            other => Err(ParseError::new(format!(
                "Expected cell reference after '!', found {}",
                other
            ))),
        }
    }

    /// Parses the tail of `IDENTIFIER :` into a range or a column reference.
    fn parse_range_or_column_ref(
        &mut self,
        sheet: Option<String>,
        start_identifier: String,
    ) -> ParseResult<Expression> {
        self.advance();

        let end_identifier = match self.current_token.clone() {
            Token::Identifier(name) => {
                self.advance();
                name
            }
            _ => {
                return Err(ParseError::new(
                    "Expected identifier after ':' in range/column reference",
                ))
            }
        };

        let start_col = column_only(&start_identifier);
        let end_col = column_only(&end_identifier);

        if let (Some((start_col, start_absolute)), Some((end_col, end_absolute))) =
            (start_col, end_col)
        {
            return Ok(Expression::ColumnRef {
                sheet,
                start_col,
                end_col,
                start_absolute,
                end_absolute,
            });
        }

        let start = split_cell_reference(&start_identifier)?;
        let end = split_cell_reference(&end_identifier)?;

        Ok(Expression::Range {
            sheet,
            start: Box::new(start.into_cell_ref(None)),
            end: Box::new(end.into_cell_ref(None)),
        })
    }

    /// Parses the tail of `NUMBER :` into a row reference.
    fn parse_row_reference(
        &mut self,
        sheet: Option<String>,
        start_num: f64,
    ) -> ParseResult<Expression> {
        self.advance();

        let end_num = match self.current_token.clone() {
            Token::Number(n) => {
                self.advance();
                n
            }
            _ => {
                return Err(ParseError::new(
                    "Expected number after ':' in row reference",
                ))
            }
        };

        if start_num < 1.0 || end_num < 1.0 || start_num.fract() != 0.0 || end_num.fract() != 0.0
        {
            return Err(ParseError::new("Row numbers must be whole numbers >= 1"));
        }

        Ok(Expression::RowRef {
            sheet,
            start_row: start_num as u32,
            end_row: end_num as u32,
        })
    }

    fn parse_function_call(&mut self, name: String) -> ParseResult<Expression> {
        // Consume the '('
        self.advance();

        let mut args = Vec::new();

        if self.current_token == Token::RParen {
            self.advance();
            return Ok(Expression::FunctionCall { name, args });
        }

        args.push(self.parse_expression()?);
        while self.current_token == Token::Comma {
            self.advance();
            args.push(self.parse_expression()?);
        }

        self.expect(Token::RParen)?;

        Ok(Expression::FunctionCall { name, args })
    }
}

fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Expression {
    Expression::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

/// Returns the column letters and the absolute flag when `identifier` names a
/// whole column (`A`, `$AB`).
fn column_only(identifier: &str) -> Option<(String, bool)> {
    let (absolute, letters) = match identifier.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, identifier),
    };
    if !letters.is_empty() && letters.chars().all(|c| c.is_ascii_alphabetic()) {
        Some((letters.to_uppercase(), absolute))
    } else {
        None
    }
}

/// Splits `$A$1`, `A$1`, `$A1` or `A1` into its parts.
fn split_cell_reference(identifier: &str) -> ParseResult<RefParts> {
    let invalid = || ParseError::new(format!("Invalid cell reference: {}", identifier));

    let mut rest = identifier;
    let col_absolute = match rest.strip_prefix('$') {
        Some(tail) => {
            rest = tail;
            true
        }
        None => false,
    };

    let letters_end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    let (col, mut rest) = rest.split_at(letters_end);
    if col.is_empty() {
        return Err(ParseError::new(format!(
            "Cell reference missing column: {}",
            identifier
        )));
    }

    let row_absolute = match rest.strip_prefix('$') {
        Some(tail) => {
            rest = tail;
            true
        }
        None => false,
    };

    if rest.is_empty() {
        return Err(ParseError::new(format!(
            "Cell reference missing row: {}",
            identifier
        )));
    }
    if !rest.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let row: u32 = rest.parse().map_err(|_| invalid())?;
    if row == 0 {
        return Err(ParseError::new(format!(
            "Row number must be >= 1: {}",
            identifier
        )));
    }

    Ok(RefParts {
        col: col.to_uppercase(),
        row,
        col_absolute,
        row_absolute,
    })
}

/// Convenience function to parse a formula string directly.
pub fn parse(input: &str) -> ParseResult<Expression> {
    let mut parser = Parser::new(input);
    parser.parse()
}
