//! FILENAME: core/parser/src/token.rs
//! PURPOSE: Token definitions for the formula lexer.
//! CONTEXT: The lexer turns a formula such as `=SUBTOTAL(9,C5:C9)` into these
//! tokens; the parser consumes them. Absolute markers (`$`) never appear as a
//! separate token, they stay inside the identifier they decorate (`$C$5`).

/// Tokens recognized by the formula lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    // Literals
    Number(f64),
    String(String),
    Boolean(bool),
    /// Function names, cell references (`A1`, `$B$2`) and sheet names.
    Identifier(String),
    /// Quoted sheet name: 'Sales 2024'
    QuotedIdentifier(String),

    // Operators
    Plus,
    Minus,
    Asterisk,
    Slash,
    Caret,
    Ampersand,
    Percent,
    Equals,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,

    // Delimiters
    LParen,
    RParen,
    Comma,
    Colon,
    Exclamation,

    EOF,
    Illegal(char),
}

impl Token {
    /// Source text of a fixed punctuation or operator token.
    pub fn symbol(&self) -> Option<&'static str> {
        let symbol = match self {
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Asterisk => "*",
            Token::Slash => "/",
            Token::Caret => "^",
            Token::Ampersand => "&",
            Token::Percent => "%",
            Token::Equals => "=",
            Token::NotEqual => "<>",
            Token::LessThan => "<",
            Token::GreaterThan => ">",
            Token::LessEqual => "<=",
            Token::GreaterEqual => ">=",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Exclamation => "!",
            _ => return None,
        };
        Some(symbol)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(symbol) = self.symbol() {
            return f.write_str(symbol);
        }
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::String(s) => write!(f, "\"{s}\""),
            Token::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            Token::Identifier(s) => f.write_str(s),
            Token::QuotedIdentifier(s) => write!(f, "'{s}'"),
            Token::EOF => f.write_str("end of formula"),
            Token::Illegal(c) => write!(f, "unexpected character '{c}'"),
            _ => Ok(()),
        }
    }
}
