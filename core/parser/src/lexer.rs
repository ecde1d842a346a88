//! FILENAME: core/parser/src/lexer.rs
//! PURPOSE: Scans a raw formula string and produces a stream of Tokens.
//! CONTEXT: First stage of the parsing pipeline. Handles whitespace, numbers
//! (including exponents such as `1.5E3`), string literals with doubled-quote
//! escapes, quoted sheet names and the two-character comparison operators.
//!
//! Identifiers may carry `$` markers anywhere (`$A$1`, `A$1`); splitting them
//! into column and row parts is left to the parser.

use crate::token::Token;
use std::iter::Peekable;
use std::str::Chars;

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
        }
    }

    /// Advances the lexer and returns the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        match self.input.next() {
            Some('+') => Token::Plus,
            Some('-') => Token::Minus,
            Some('*') => Token::Asterisk,
            Some('/') => Token::Slash,
            Some('^') => Token::Caret,
            Some('&') => Token::Ampersand,
            Some('%') => Token::Percent,
            Some('(') => Token::LParen,
            Some(')') => Token::RParen,
            Some(',') => Token::Comma,
            Some(':') => Token::Colon,
            Some('!') => Token::Exclamation,
            Some('=') => Token::Equals,
            Some('<') => self.read_less_than_operator(),
            Some('>') => self.read_greater_than_operator(),
            Some('"') => self.read_string(),
            Some('\'') => self.read_quoted_identifier(),

            Some(ch) if ch.is_ascii_digit() || ch == '.' => self.read_number(ch),

            // `$` only makes sense in front of a column or row part
            Some('$') => match self.input.peek() {
                Some(&next) if is_letter(next) => self.read_identifier('$'),
                _ => Token::Illegal('$'),
            },

            Some(ch) if is_letter(ch) => self.read_identifier(ch),

            None => Token::EOF,
            Some(ch) => Token::Illegal(ch),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&ch) = self.input.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.input.next();
        }
    }

    fn read_less_than_operator(&mut self) -> Token {
        match self.input.peek() {
            Some('=') => {
                self.input.next();
                Token::LessEqual
            }
            Some('>') => {
                self.input.next();
                Token::NotEqual
            }
            _ => Token::LessThan,
        }
    }

    fn read_greater_than_operator(&mut self) -> Token {
        match self.input.peek() {
            Some('=') => {
                self.input.next();
                Token::GreaterEqual
            }
            _ => Token::GreaterThan,
        }
    }

    /// Reads a string literal. `""` inside the literal is an escaped quote.
    fn read_string(&mut self) -> Token {
        let mut result = String::new();
        while let Some(ch) = self.input.next() {
            if ch == '"' {
                if self.input.peek() == Some(&'"') {
                    self.input.next();
                    result.push('"');
                    continue;
                }
                return Token::String(result);
            }
            result.push(ch);
        }
        // Unterminated literal: keep what we have
        Token::String(result)
    }

    /// Reads a quoted sheet name: 'Sheet Name', with `''` as an escaped quote.
    fn read_quoted_identifier(&mut self) -> Token {
        let mut result = String::new();
        while let Some(ch) = self.input.next() {
            if ch == '\'' {
                if self.input.peek() == Some(&'\'') {
                    self.input.next();
                    result.push('\'');
                    continue;
                }
                return Token::QuotedIdentifier(result);
            }
            result.push(ch);
        }
        Token::QuotedIdentifier(result)
    }

    fn read_number(&mut self, first_char: char) -> Token {
        let mut number_str = String::from(first_char);
        let mut has_dot = first_char == '.';
        let mut has_exponent = false;

        while let Some(&ch) = self.input.peek() {
            if ch.is_ascii_digit() {
                number_str.push(ch);
                self.input.next();
            } else if ch == '.' && !has_dot && !has_exponent {
                has_dot = true;
                number_str.push(ch);
                self.input.next();
            } else if (ch == 'E' || ch == 'e') && !has_exponent {
                // Only an exponent when digits (optionally signed) follow
                let mut lookahead = self.input.clone();
                lookahead.next();
                let signed = matches!(lookahead.peek(), Some('+') | Some('-'));
                if signed {
                    lookahead.next();
                }
                if !matches!(lookahead.peek(), Some(d) if d.is_ascii_digit()) {
                    break;
                }
                has_exponent = true;
                number_str.push(ch);
                self.input.next();
                if signed {
                    if let Some(sign) = self.input.next() {
                        number_str.push(sign);
                    }
                }
            } else {
                break;
            }
        }

        match number_str.parse::<f64>() {
            Ok(n) => Token::Number(n),
            Err(_) => Token::Illegal(first_char),
        }
    }

    fn read_identifier(&mut self, first_char: char) -> Token {
        let mut ident = String::from(first_char);

        while let Some(&ch) = self.input.peek() {
            // '.' supports dotted function names like "STDEV.S"
            if is_letter(ch) || ch.is_ascii_digit() || ch == '.' || ch == '$' {
                ident.push(ch);
                self.input.next();
            } else {
                break;
            }
        }

        let upper = ident.to_uppercase();
        match upper.as_str() {
            "TRUE" => Token::Boolean(true),
            "FALSE" => Token::Boolean(false),
            _ => Token::Identifier(upper),
        }
    }
}

/// Returns true if `ch` can start an identifier.
fn is_letter(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}
