//! FILENAME: core/template-engine/src/rewrite.rs
//! PURPOSE: Retargets a captured sample formula onto a materialized row.
//! CONTEXT: A Data row's formula (say `=C5*D5`) is replayed on every output
//! row. Each reference's row becomes the output row and its column moves by
//! the render column offset, since column A is deleted before materializing.

use crate::error::{TemplateError, TemplateResult};
use engine::{rewrite_references, MAX_COLUMNS};

/// Rewrites every reference in `formula` to `target_row` (1-based) and shifts
/// its column by `column_shift`. `$` markers are kept as written.
pub fn rewrite_formula_row(formula: &str, target_row: u32, column_shift: i32) -> TemplateResult<String> {
    rewrite_references(formula, |reference| {
        let mut reference = reference.clone();
        for part in std::iter::once(&mut reference.start).chain(reference.end.as_mut()) {
            let col = part.col_index().ok_or_else(|| TemplateError::InvalidColumn {
                letters: part.col_letters.clone(),
            })?;
            let shifted = i64::from(col) + i64::from(column_shift);
            if shifted < 0 || shifted >= i64::from(MAX_COLUMNS) {
                return Err(TemplateError::ColumnOutOfRange {
                    column: part.col_letters.clone(),
                    shift: column_shift,
                });
            }
            part.set_col_index(shifted as u32);
            part.row = target_row;
        }
        Ok(Some(reference.to_a1()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_reference_to_target_row_and_shifts_column() {
        assert_eq!(rewrite_formula_row("=B5", 10, -1).unwrap(), "=A10");
    }

    #[test]
    fn keeps_absolute_markers() {
        assert_eq!(rewrite_formula_row("=$B$5", 10, -1).unwrap(), "=$A$10");
    }

    #[test]
    fn shifts_each_reference_independently() {
        assert_eq!(rewrite_formula_row("=C2*D2+AA7", 12, -1).unwrap(), "=B12*C12+Z12");
        assert_eq!(rewrite_formula_row("=SUM(C3:E3)", 4, -1).unwrap(), "=SUM(B4:D4)");
    }

    #[test]
    fn leaves_literals_and_function_names_alone() {
        assert_eq!(
            rewrite_formula_row("=IF(C5>0,\"B5\",LOG10(C5))", 8, -1).unwrap(),
            "=IF(B8>0,\"B5\",LOG10(B8))"
        );
    }

    #[test]
    fn zero_shift_only_retargets_rows() {
        assert_eq!(rewrite_formula_row("=A1+B2", 10, 0).unwrap(), "=A10+B10");
    }

    #[test]
    fn shifting_past_column_a_is_an_error() {
        match rewrite_formula_row("=A1+B2", 10, -1) {
            Err(TemplateError::ColumnOutOfRange { column, shift }) => {
                assert_eq!(column, "A");
                assert_eq!(shift, -1);
            }
            other => panic!("expected ColumnOutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn undecodable_letters_are_an_error() {
        assert!(matches!(
            rewrite_formula_row("=ZZZZ1", 3, -1),
            Err(TemplateError::InvalidColumn { .. })
        ));
    }
}
