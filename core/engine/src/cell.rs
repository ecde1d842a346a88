//! FILENAME: core/engine/src/cell.rs
//! PURPOSE: Defines the data structures for a single worksheet cell.
//! CONTEXT: A cell separates what the template author typed (formula) from
//! the cached result (value). Rendering writes both: literal values for data
//! fields and formulas for replayed sample cells and subtotal rows.

use serde::{Deserialize, Serialize};

/// Errors a cell can hold (e.g., #DIV/0!).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellError {
    Div0,
    Ref,
    Name,
    Value,
    NA,
    Num,
    /// Formula text could not be parsed
    Parse,
}

impl CellError {
    /// The spreadsheet spelling of the error, e.g. `#DIV/0!`.
    pub fn code(&self) -> &'static str {
        match self {
            CellError::Div0 => "#DIV/0!",
            CellError::Ref => "#REF!",
            CellError::Name => "#NAME?",
            CellError::Value => "#VALUE!",
            CellError::NA => "#N/A",
            CellError::Num => "#NUM!",
            CellError::Parse => "#ERROR!",
        }
    }

    /// Inverse of [`CellError::code`]; unknown codes map to `#VALUE!`.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "#DIV/0!" => CellError::Div0,
            "#REF!" => CellError::Ref,
            "#NAME?" => CellError::Name,
            "#N/A" => CellError::NA,
            "#NUM!" => CellError::Num,
            "#ERROR!" => CellError::Parse,
            _ => CellError::Value,
        }
    }
}

/// The calculated result or raw data within a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(CellError),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

/// The atomic unit of the worksheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Formula text including the leading `=`.
    pub formula: Option<String>,
    pub value: CellValue,
    pub style_index: usize,
}

impl Cell {
    pub fn new() -> Self {
        Cell {
            formula: None,
            value: CellValue::Empty,
            style_index: 0,
        }
    }

    pub fn new_number(num: f64) -> Self {
        Cell {
            value: CellValue::Number(num),
            ..Cell::new()
        }
    }

    pub fn new_text(text: impl Into<String>) -> Self {
        Cell {
            value: CellValue::Text(text.into()),
            ..Cell::new()
        }
    }

    pub fn new_boolean(value: bool) -> Self {
        Cell {
            value: CellValue::Boolean(value),
            ..Cell::new()
        }
    }

    /// Creates a formula cell; a missing leading `=` is added.
    pub fn new_formula(formula: impl Into<String>) -> Self {
        Cell {
            formula: Some(normalize_formula(formula.into())),
            ..Cell::new()
        }
    }

    pub fn with_style(mut self, style_index: usize) -> Self {
        self.style_index = style_index;
        self
    }

    pub fn has_formula(&self) -> bool {
        self.formula.is_some()
    }

    /// True when the cell carries nothing worth storing.
    pub fn is_blank(&self) -> bool {
        self.formula.is_none() && self.value.is_empty() && self.style_index == 0
    }

    /// Returns the cell's value as display text, the way a sheet reader
    /// would see it.
    pub fn display_value(&self) -> String {
        match &self.value {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
            CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Error(e) => e.code().to_string(),
        }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a number without unnecessary decimal places.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

fn normalize_formula(formula: String) -> String {
    if formula.starts_with('=') {
        formula
    } else {
        format!("={}", formula)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_cells_get_leading_equals() {
        assert_eq!(Cell::new_formula("A1+1").formula.as_deref(), Some("=A1+1"));
        assert_eq!(Cell::new_formula("=A1").formula.as_deref(), Some("=A1"));
    }

    #[test]
    fn display_value_formats_numbers_and_errors() {
        assert_eq!(Cell::new_number(12.0).display_value(), "12");
        assert_eq!(Cell::new_number(1.25).display_value(), "1.25");
        let err = Cell {
            value: CellValue::Error(CellError::Div0),
            ..Cell::new()
        };
        assert_eq!(err.display_value(), "#DIV/0!");
    }

    #[test]
    fn error_codes_round_trip() {
        for e in [CellError::Div0, CellError::Ref, CellError::Name, CellError::NA] {
            assert_eq!(CellError::from_code(e.code()), e);
        }
    }
}
