//! FILENAME: core/engine/src/coord.rs
//! PURPOSE: Conversions between A1 notation and 0-based (row, col) indices.
//! CONTEXT: Column "A" = 0, "AA" = 26; row 1 in A1 notation = row 0 internally.
//! The checked variants reject anything past the last worksheet column (XFD)
//! so that a malformed template surfaces as an error instead of a bogus cell.

use serde::{Deserialize, Serialize};

/// A cell coordinate as (row, col) with 0-based indices.
pub type CellCoord = (u32, u32);

/// Number of columns in a worksheet (A..=XFD).
pub const MAX_COLUMNS: u32 = 16_384;

/// Number of rows in a worksheet.
pub const MAX_ROWS: u32 = 1_048_576;

/// Converts column letters to a 0-based index. "A" -> 0, "AA" -> 26.
/// The input must be non-empty ASCII letters; use [`parse_col`] for untrusted text.
pub fn col_to_index(col_str: &str) -> u32 {
    let mut result: u32 = 0;
    for c in col_str.chars() {
        let digit = (c.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        result = result * 26 + digit;
    }
    result.saturating_sub(1)
}

/// Checked form of [`col_to_index`]: `None` for empty input, non-letters or
/// columns past XFD.
pub fn parse_col(col_str: &str) -> Option<u32> {
    if col_str.is_empty() || col_str.len() > 3 || !col_str.chars().all(|c| c.is_ascii_alphabetic())
    {
        return None;
    }
    let index = col_to_index(col_str);
    (index < MAX_COLUMNS).then_some(index)
}

/// Converts a 0-based column index to letters. 0 -> "A", 26 -> "AA".
pub fn index_to_col(mut col_index: u32) -> String {
    let mut result = String::new();
    loop {
        let remainder = col_index % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if col_index < 26 {
            break;
        }
        col_index = col_index / 26 - 1;
    }
    result
}

/// Converts column letters and a 1-based row number to a 0-based coordinate.
pub fn a1_to_coord(col_str: &str, row_num: u32) -> CellCoord {
    (row_num.saturating_sub(1), col_to_index(col_str))
}

/// Converts a 0-based coordinate to an A1 reference. (0, 0) -> "A1".
pub fn coord_to_a1(coord: CellCoord) -> String {
    let (row, col) = coord;
    format!("{}{}", index_to_col(col), row + 1)
}

/// Parses "B5" or "$B$5" into a 0-based coordinate.
pub fn parse_a1(reference: &str) -> Option<CellCoord> {
    let cleaned: String = reference.chars().filter(|c| *c != '$').collect();
    let split = cleaned.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cleaned.split_at(split);
    let col = parse_col(letters)?;
    let row: u32 = digits.parse().ok()?;
    if row == 0 || row > MAX_ROWS {
        return None;
    }
    Some((row - 1, col))
}

/// An inclusive rectangle of cells, 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRange {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl CellRange {
    /// Builds a range from two corners in any order.
    pub fn new(start: CellCoord, end: CellCoord) -> Self {
        CellRange {
            start_row: start.0.min(end.0),
            start_col: start.1.min(end.1),
            end_row: start.0.max(end.0),
            end_col: start.1.max(end.1),
        }
    }

    /// Parses "A1:C3". A single cell reference yields a one-cell range.
    pub fn parse(text: &str) -> Option<Self> {
        match text.split_once(':') {
            Some((start, end)) => Some(CellRange::new(parse_a1(start)?, parse_a1(end)?)),
            None => {
                let cell = parse_a1(text)?;
                Some(CellRange::new(cell, cell))
            }
        }
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        row >= self.start_row && row <= self.end_row && col >= self.start_col && col <= self.end_col
    }

    pub fn is_single_cell(&self) -> bool {
        self.start_row == self.end_row && self.start_col == self.end_col
    }
}

impl std::fmt::Display for CellRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}",
            coord_to_a1((self.start_row, self.start_col)),
            coord_to_a1((self.end_row, self.end_col))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_col_to_index() {
        assert_eq!(col_to_index("A"), 0);
        assert_eq!(col_to_index("Z"), 25);
        assert_eq!(col_to_index("AA"), 26);
        assert_eq!(col_to_index("ZZ"), 701);
        assert_eq!(col_to_index("AAA"), 702);
    }

    #[test]
    fn test_index_to_col() {
        assert_eq!(index_to_col(0), "A");
        assert_eq!(index_to_col(25), "Z");
        assert_eq!(index_to_col(26), "AA");
        assert_eq!(index_to_col(702), "AAA");
        assert_eq!(index_to_col(MAX_COLUMNS - 1), "XFD");
    }

    #[test]
    fn test_roundtrip() {
        for i in 0..1000 {
            assert_eq!(col_to_index(&index_to_col(i)), i, "Roundtrip failed for index {}", i);
        }
    }

    #[test]
    fn parse_col_rejects_out_of_range() {
        assert_eq!(parse_col("XFD"), Some(MAX_COLUMNS - 1));
        assert_eq!(parse_col("XFE"), None);
        assert_eq!(parse_col("ABCD"), None);
        assert_eq!(parse_col(""), None);
        assert_eq!(parse_col("A1"), None);
    }

    #[test]
    fn test_parse_a1() {
        assert_eq!(parse_a1("A1"), Some((0, 0)));
        assert_eq!(parse_a1("$B$5"), Some((4, 1)));
        assert_eq!(parse_a1("AA100"), Some((99, 26)));
        assert_eq!(parse_a1("A0"), None);
        assert_eq!(parse_a1("5"), None);
    }

    #[test]
    fn cell_range_parse_and_display() {
        let range = CellRange::parse("C3:A1").unwrap();
        assert_eq!(range, CellRange::new((0, 0), (2, 2)));
        assert_eq!(range.to_string(), "A1:C3");
        assert!(CellRange::parse("B2").unwrap().is_single_cell());
        assert!(range.contains(1, 1));
        assert!(!range.contains(3, 0));
    }
}
