//! FILENAME: core/engine/src/references.rs
//! PURPOSE: Finds and rewrites A1 references inside formula text.
//! CONTEXT: Structural edits (insert/remove rows, remove a column) must keep
//! stored formulas pointing at the same cells, and the report renderer
//! retargets captured sample formulas onto new rows. Both walk the formula
//! text with the same scanner: string literals and quoted sheet names are
//! skipped, function names such as `LOG10(` are not references, and a
//! `B2:D9` pair is reported as one range so its corners move together.

use crate::coord::{index_to_col, parse_col};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\$?)([A-Z]+)(\$?)(\d+)(?::(\$?)([A-Z]+)(\$?)(\d+))?")
        .expect("reference pattern must compile")
});

/// Text emitted in place of a reference whose target was deleted.
pub const REF_ERROR: &str = "#REF!";

/// One corner of a reference as written in the formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefPart {
    pub col_absolute: bool,
    pub col_letters: String,
    pub row_absolute: bool,
    /// 1-based, as written.
    pub row: u32,
}

impl RefPart {
    fn from_captures(caps: &Captures<'_>, first: usize) -> Option<Self> {
        Some(RefPart {
            col_absolute: !caps.get(first)?.as_str().is_empty(),
            col_letters: caps.get(first + 1)?.as_str().to_string(),
            row_absolute: !caps.get(first + 2)?.as_str().is_empty(),
            row: caps.get(first + 3)?.as_str().parse().ok()?,
        })
    }

    /// 0-based column index, `None` past the last worksheet column.
    pub fn col_index(&self) -> Option<u32> {
        parse_col(&self.col_letters)
    }

    /// Replaces the column, keeping the `$` marker.
    pub fn set_col_index(&mut self, col: u32) {
        self.col_letters = index_to_col(col);
    }

    pub fn to_a1(&self) -> String {
        format!(
            "{}{}{}{}",
            if self.col_absolute { "$" } else { "" },
            self.col_letters,
            if self.row_absolute { "$" } else { "" },
            self.row
        )
    }
}

/// A single-cell reference or a two-corner range found in a formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub start: RefPart,
    pub end: Option<RefPart>,
    /// Preceded by `Sheet!` or `'Sheet name'!`.
    pub sheet_qualified: bool,
}

impl Reference {
    pub fn to_a1(&self) -> String {
        match &self.end {
            Some(end) => format!("{}:{}", self.start.to_a1(), end.to_a1()),
            None => self.start.to_a1(),
        }
    }
}

/// Byte ranges covered by "string literals" and 'quoted sheet names'.
fn quoted_spans(formula: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Option<(char, usize)> = None;
    for (i, ch) in formula.char_indices() {
        match open {
            Some((quote, start)) if ch == quote => {
                spans.push((start, i + ch.len_utf8()));
                open = None;
            }
            None if ch == '"' || ch == '\'' => open = Some((ch, i)),
            _ => {}
        }
    }
    if let Some((_, start)) = open {
        spans.push((start, formula.len()));
    }
    spans
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '.'
}

/// Rewrites every reference in `formula` through `f`.
///
/// `f` returns `Ok(Some(text))` to replace the reference, `Ok(None)` to keep
/// it as written, or an error that aborts the rewrite.
pub fn rewrite_references<E, F>(formula: &str, mut f: F) -> Result<String, E>
where
    F: FnMut(&Reference) -> Result<Option<String>, E>,
{
    let skipped = quoted_spans(formula);
    let mut output = String::with_capacity(formula.len());
    let mut last = 0;

    for caps in REFERENCE_RE.captures_iter(formula) {
        let Some(whole) = caps.get(0) else { continue };
        let (start, end) = (whole.start(), whole.end());

        if skipped.iter().any(|&(s, e)| start >= s && start < e) {
            continue;
        }
        let before = formula[..start].chars().next_back();
        let after = formula[end..].chars().next();
        if before.is_some_and(|c| is_word_char(c) || c == '$')
            || after.is_some_and(|c| is_word_char(c) || c == '(' || c == '$' || c == '!')
        {
            continue;
        }

        let Some(first) = RefPart::from_captures(&caps, 1) else { continue };
        let reference = Reference {
            start: first,
            end: RefPart::from_captures(&caps, 5),
            sheet_qualified: before == Some('!'),
        };

        if let Some(replacement) = f(&reference)? {
            output.push_str(&formula[last..start]);
            output.push_str(&replacement);
            last = end;
        }
    }

    output.push_str(&formula[last..]);
    Ok(output)
}

fn rewrite_infallible<F>(formula: &str, mut f: F) -> String
where
    F: FnMut(&Reference) -> Option<String>,
{
    match rewrite_references::<std::convert::Infallible, _>(formula, |r| Ok(f(r))) {
        Ok(text) => text,
        Err(never) => match never {},
    }
}

/// Adjusts references after `count` rows were inserted before 0-based `at`.
/// Rows at or below the insertion point move down; a range that straddles
/// the insertion point grows. Absolute markers do not pin a reference to
/// its old row, only to its old cell. Sheet-qualified references are kept.
pub fn shift_rows_for_insert(formula: &str, at: u32, count: u32) -> String {
    let first_moved = at + 1;
    rewrite_infallible(formula, |reference| {
        if reference.sheet_qualified || count == 0 {
            return None;
        }
        let mut moved = reference.clone();
        let mut changed = false;
        for part in std::iter::once(&mut moved.start).chain(moved.end.iter_mut()) {
            if part.row >= first_moved {
                part.row += count;
                changed = true;
            }
        }
        changed.then(|| moved.to_a1())
    })
}

/// Adjusts references after the 0-based row `removed` was deleted.
pub fn shift_rows_for_remove(formula: &str, removed: u32) -> String {
    let removed = removed + 1;
    rewrite_infallible(formula, |reference| {
        if reference.sheet_qualified {
            return None;
        }
        let mut moved = reference.clone();
        match moved.end.as_mut() {
            None => {
                if moved.start.row == removed {
                    return Some(REF_ERROR.to_string());
                }
                if moved.start.row < removed {
                    return None;
                }
                moved.start.row -= 1;
            }
            Some(end) => {
                let (low, high) = (moved.start.row.min(end.row), moved.start.row.max(end.row));
                if removed > high {
                    return None;
                }
                if low == removed && high == removed {
                    return Some(REF_ERROR.to_string());
                }
                if removed < low {
                    moved.start.row -= 1;
                    end.row -= 1;
                } else if moved.start.row > end.row {
                    moved.start.row -= 1;
                } else {
                    end.row -= 1;
                }
            }
        }
        Some(moved.to_a1())
    })
}

/// Adjusts references after the 0-based column `removed` was deleted.
pub fn shift_cols_for_remove(formula: &str, removed: u32) -> String {
    rewrite_infallible(formula, |reference| {
        if reference.sheet_qualified {
            return None;
        }
        let start = reference.start.col_index()?;
        let mut moved = reference.clone();
        match moved.end.as_mut() {
            None => {
                if start == removed {
                    return Some(REF_ERROR.to_string());
                }
                if start < removed {
                    return None;
                }
                moved.start.set_col_index(start - 1);
            }
            Some(end) => {
                let end_col = end.col_index()?;
                let (low, high) = (start.min(end_col), start.max(end_col));
                if removed > high {
                    return None;
                }
                if low == removed && high == removed {
                    return Some(REF_ERROR.to_string());
                }
                if removed < low {
                    moved.start.set_col_index(start - 1);
                    end.set_col_index(end_col - 1);
                } else if start > end_col {
                    moved.start.set_col_index(start - 1);
                } else {
                    end.set_col_index(end_col - 1);
                }
            }
        }
        Some(moved.to_a1())
    })
}
