//! FILENAME: core/parser/src/ast.rs
//! PURPOSE: Abstract Syntax Tree for formula expressions.
//! CONTEXT: The parser builds this tree from tokens; the engine's evaluator
//! walks it. Cell references keep their `$` markers so callers can tell an
//! absolute reference from a relative one.
//!
//! SUPPORTED EXPRESSIONS:
//! - Literals: numbers, strings, booleans
//! - Cell references: A1, $A$1, A$1, Sheet1!A1, 'Sheet Name'!A1
//! - Ranges: A1:B10, Sheet1!$A$1:$B$10
//! - Whole columns / rows: A:B, 1:5
//! - Binary operators: + - * / ^ & = <> < > <= >=
//! - Unary operators: prefix `-`, postfix `%`
//! - Function calls: SUBTOTAL(9,C5:C9), IF(A1>0,"FF0000","")

/// Represents a parsed formula expression.
#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Literal(Value),

    /// A single cell. `col` holds the letters ("A", "AA"), `row` is 1-based.
    CellRef {
        sheet: Option<String>,
        col: String,
        row: u32,
        col_absolute: bool,
        row_absolute: bool,
    },

    /// A rectangular range. `start` and `end` are always `CellRef`s; the
    /// sheet lives on the range, not on the corners.
    Range {
        sheet: Option<String>,
        start: Box<Expression>,
        end: Box<Expression>,
    },

    /// Entire columns, e.g. `A:C`.
    ColumnRef {
        sheet: Option<String>,
        start_col: String,
        end_col: String,
        start_absolute: bool,
        end_absolute: bool,
    },

    /// Entire rows, e.g. `1:5`.
    RowRef {
        sheet: Option<String>,
        start_row: u32,
        end_row: u32,
    },

    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },

    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },

    /// Function names are stored upper-cased.
    FunctionCall { name: String, args: Vec<Expression> },
}

/// Literal values that can appear in formulas.
#[derive(Debug, PartialEq, Clone)]
pub enum Value {
    Number(f64),
    String(String),
    Boolean(bool),
}

/// Binary operators, lowest precedence group first.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,

    Concat,

    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum UnaryOperator {
    Negate,
    /// Postfix `%`, divides the operand by 100.
    Percent,
}

impl Expression {
    /// True when the expression, or anything nested in it, calls `name`.
    /// Used by aggregates that must skip cells holding nested subtotals.
    pub fn calls_function(&self, name: &str) -> bool {
        match self {
            Expression::FunctionCall { name: called, args } => {
                called.eq_ignore_ascii_case(name) || args.iter().any(|a| a.calls_function(name))
            }
            Expression::BinaryOp { left, right, .. } => {
                left.calls_function(name) || right.calls_function(name)
            }
            Expression::UnaryOp { operand, .. } => operand.calls_function(name),
            _ => false,
        }
    }
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Power => "^",
            BinaryOperator::Concat => "&",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterEqual => ">=",
        };
        f.write_str(symbol)
    }
}

impl std::fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Negate => f.write_str("-"),
            UnaryOperator::Percent => f.write_str("%"),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        }
    }
}
