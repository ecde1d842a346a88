//! FILENAME: core/engine/src/workbook.rs
//! PURPOSE: Worksheet and workbook containers with structural editing.
//! CONTEXT: This is the document model the report renderer writes through.
//! A worksheet owns its grid plus the layout that travels with rows and
//! columns (heights, widths, merged regions, autofilter). Inserting or
//! removing rows and columns moves all of it together and rewrites the
//! sheet's formulas so they keep pointing at the same cells. All indices
//! here are 0-based.

use crate::cell::{Cell, CellError, CellValue};
use crate::coord::CellRange;
use crate::evaluator::{Evaluator, MultiSheetContext};
use crate::grid::Grid;
use crate::references::{shift_cols_for_remove, shift_rows_for_insert, shift_rows_for_remove};
use crate::style::{CellStyle, StyleRegistry};
use std::collections::BTreeMap;

// ============================================================================
// WORKSHEET
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Worksheet {
    pub name: String,
    pub grid: Grid,
    /// Row heights in points, only for rows that differ from the default.
    pub row_heights: BTreeMap<u32, f64>,
    /// Column widths in characters, only for customized columns.
    pub column_widths: BTreeMap<u32, f64>,
    pub merged_regions: Vec<CellRange>,
    pub auto_filter: Option<CellRange>,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Worksheet {
            name: name.into(),
            ..Worksheet::default()
        }
    }

    /// Every row from 0 through the last used row as display text. Trailing
    /// empty cells of each row are dropped, so an empty row is an empty Vec.
    pub fn text_rows(&self) -> Vec<Vec<String>> {
        if self.grid.is_empty() {
            return Vec::new();
        }
        let mut rows = vec![Vec::new(); self.grid.max_row as usize + 1];
        for (row, col) in self.grid.sorted_positions() {
            let Some(cell) = self.grid.get_cell(row, col) else { continue };
            let text = cell.display_value();
            if text.is_empty() {
                continue;
            }
            let line = &mut rows[row as usize];
            if line.len() <= col as usize {
                line.resize(col as usize + 1, String::new());
            }
            line[col as usize] = text;
        }
        rows
    }

    pub fn merged_regions(&self) -> &[CellRange] {
        &self.merged_regions
    }

    pub fn add_merged_region(&mut self, region: CellRange) {
        if !self.merged_regions.contains(&region) {
            self.merged_regions.push(region);
        }
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.grid.get_cell(row, col)
    }

    pub fn value(&self, row: u32, col: u32) -> CellValue {
        self.grid
            .get_cell(row, col)
            .map(|cell| cell.value.clone())
            .unwrap_or(CellValue::Empty)
    }

    /// Writes a literal value; any formula in the cell is dropped, the style
    /// is kept.
    pub fn set_value(&mut self, row: u32, col: u32, value: CellValue) {
        let cell = self.grid.cell_mut(row, col);
        cell.formula = None;
        cell.value = value;
    }

    pub fn formula(&self, row: u32, col: u32) -> Option<&str> {
        self.grid.get_cell(row, col).and_then(|cell| cell.formula.as_deref())
    }

    /// Stores a formula (a missing `=` is added) and invalidates the cached
    /// value. An empty string removes the formula and leaves the value alone.
    pub fn set_formula(&mut self, row: u32, col: u32, formula: &str) {
        if formula.trim().is_empty() {
            if let Some(cell) = self.grid.cells.get_mut(&(row, col)) {
                cell.formula = None;
            }
            return;
        }
        let cell = self.grid.cell_mut(row, col);
        cell.formula = Cell::new_formula(formula).formula;
        cell.value = CellValue::Empty;
    }

    pub fn style_index(&self, row: u32, col: u32) -> usize {
        self.grid.get_cell(row, col).map(|cell| cell.style_index).unwrap_or(0)
    }

    pub fn set_style_index(&mut self, row: u32, col: u32, style_index: usize) {
        self.grid.cell_mut(row, col).style_index = style_index;
    }

    /// Clears value and formula, keeping the cell's style.
    pub fn clear_cell(&mut self, row: u32, col: u32) {
        let Some(cell) = self.grid.cells.get_mut(&(row, col)) else {
            return;
        };
        cell.formula = None;
        cell.value = CellValue::Empty;
        if cell.is_blank() {
            self.grid.clear_cell(row, col);
        }
    }

    /// Clears the contents of every cell in a row.
    pub fn clear_row(&mut self, row: u32) {
        let cols: Vec<u32> = self
            .grid
            .cells
            .keys()
            .filter(|(r, _)| *r == row)
            .map(|&(_, c)| c)
            .collect();
        for col in cols {
            self.clear_cell(row, col);
        }
    }

    pub fn row_height(&self, row: u32) -> Option<f64> {
        self.row_heights.get(&row).copied()
    }

    pub fn set_row_height(&mut self, row: u32, height: f64) {
        self.row_heights.insert(row, height);
    }

    pub fn column_width(&self, col: u32) -> Option<f64> {
        self.column_widths.get(&col).copied()
    }

    pub fn set_column_width(&mut self, col: u32, width: f64) {
        self.column_widths.insert(col, width);
    }

    pub fn set_auto_filter(&mut self, range: CellRange) {
        self.auto_filter = Some(range);
    }

    // ========================================================================
    // STRUCTURAL EDITS
    // ========================================================================

    /// Inserts `count` empty rows before `at`. Rows at or below `at` move
    /// down; merged regions and the autofilter that span `at` grow.
    pub fn insert_rows(&mut self, at: u32, count: u32) {
        if count == 0 {
            return;
        }
        self.grid.remap(|row, col| {
            Some((if row >= at { row + count } else { row }, col))
        });
        self.row_heights = shift_keys(&self.row_heights, |row| {
            Some(if row >= at { row + count } else { row })
        });

        let grow = |region: &mut CellRange| {
            if region.start_row >= at {
                region.start_row += count;
                region.end_row += count;
            } else if region.end_row >= at {
                region.end_row += count;
            }
        };
        for region in self.merged_regions.iter_mut() {
            grow(region);
        }
        if let Some(filter) = self.auto_filter.as_mut() {
            grow(filter);
        }

        self.rewrite_formulas(|formula| shift_rows_for_insert(formula, at, count));
    }

    /// Deletes a row; everything below moves up by one.
    pub fn remove_row(&mut self, removed: u32) {
        self.grid.remap(|row, col| match row.cmp(&removed) {
            std::cmp::Ordering::Less => Some((row, col)),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some((row - 1, col)),
        });
        self.row_heights = shift_keys(&self.row_heights, |row| match row.cmp(&removed) {
            std::cmp::Ordering::Less => Some(row),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(row - 1),
        });

        let shrink = |region: CellRange| -> Option<CellRange> {
            let (start, end) = shrink_span(region.start_row, region.end_row, removed)?;
            Some(CellRange {
                start_row: start,
                end_row: end,
                ..region
            })
        };
        self.merged_regions = self
            .merged_regions
            .iter()
            .filter_map(|region| shrink(*region))
            .filter(|region| !region.is_single_cell())
            .collect();
        self.auto_filter = self.auto_filter.and_then(shrink);

        self.rewrite_formulas(|formula| shift_rows_for_remove(formula, removed));
    }

    /// Deletes a column; everything to its right moves left by one.
    pub fn remove_col(&mut self, removed: u32) {
        self.grid.remap(|row, col| match col.cmp(&removed) {
            std::cmp::Ordering::Less => Some((row, col)),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some((row, col - 1)),
        });
        self.column_widths = shift_keys(&self.column_widths, |col| match col.cmp(&removed) {
            std::cmp::Ordering::Less => Some(col),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(col - 1),
        });

        let shrink = |region: CellRange| -> Option<CellRange> {
            let (start, end) = shrink_span(region.start_col, region.end_col, removed)?;
            Some(CellRange {
                start_col: start,
                end_col: end,
                ..region
            })
        };
        self.merged_regions = self
            .merged_regions
            .iter()
            .filter_map(|region| shrink(*region))
            .filter(|region| !region.is_single_cell())
            .collect();
        self.auto_filter = self.auto_filter.and_then(shrink);

        self.rewrite_formulas(|formula| shift_cols_for_remove(formula, removed));
    }

    fn rewrite_formulas(&mut self, rewrite: impl Fn(&str) -> String) {
        for cell in self.grid.cells.values_mut() {
            if let Some(formula) = cell.formula.as_mut() {
                let updated = rewrite(formula);
                if updated != *formula {
                    *formula = updated;
                }
            }
        }
    }
}

/// Shrinks the inclusive span `[start, end]` after index `removed` was
/// deleted. `None` when the span consisted of only that index.
fn shrink_span(start: u32, end: u32, removed: u32) -> Option<(u32, u32)> {
    if removed > end {
        Some((start, end))
    } else if removed < start {
        Some((start - 1, end - 1))
    } else if start == end {
        None
    } else {
        Some((start, end - 1))
    }
}

fn shift_keys(map: &BTreeMap<u32, f64>, f: impl Fn(u32) -> Option<u32>) -> BTreeMap<u32, f64> {
    map.iter()
        .filter_map(|(&key, &value)| f(key).map(|moved| (moved, value)))
        .collect()
}

// ============================================================================
// WORKBOOK
// ============================================================================

/// Sheets in tab order plus the style table their cells index into.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<Worksheet>,
    pub styles: StyleRegistry,
}

impl Workbook {
    pub fn new() -> Self {
        Workbook::default()
    }

    /// Appends a sheet and returns it for filling in.
    pub fn add_sheet(&mut self, name: impl Into<String>) -> &mut Worksheet {
        self.sheets.push(Worksheet::new(name));
        let last = self.sheets.len() - 1;
        &mut self.sheets[last]
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|sheet| sheet.name.clone()).collect()
    }

    pub fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Worksheet> {
        self.sheets.iter_mut().find(|sheet| sheet.name == name)
    }

    /// A style definition by id; unknown ids resolve to the default style.
    pub fn style(&self, id: usize) -> &CellStyle {
        self.styles.get(id)
    }

    /// Registers a style definition and returns its id. Identical
    /// definitions share one id.
    pub fn register_style(&mut self, style: CellStyle) -> usize {
        self.styles.get_or_create(style)
    }

    /// Recomputes the cached value of every formula cell in every sheet.
    ///
    /// Passes evaluate all formulas against the values of the previous pass
    /// until nothing changes; a chain of n dependent formulas settles within
    /// n + 1 passes, which bounds the loop. Formulas that fail to parse get
    /// a parse error value.
    pub fn recalculate(&mut self) {
        let mut targets = Vec::new();
        for (sheet_index, sheet) in self.sheets.iter().enumerate() {
            for (&(row, col), cell) in &sheet.grid.cells {
                if let Some(formula) = &cell.formula {
                    targets.push((sheet_index, row, col, parser::parse(formula).ok()));
                }
            }
        }
        if targets.is_empty() {
            return;
        }

        for _ in 0..=targets.len() {
            let results: Vec<CellValue> = targets
                .iter()
                .map(|(sheet_index, _, _, expr)| match expr {
                    Some(expr) => {
                        let sheet = &self.sheets[*sheet_index];
                        let mut context = MultiSheetContext::new(sheet.name.as_str());
                        for other in &self.sheets {
                            context.add_grid(&other.name, &other.grid);
                        }
                        Evaluator::with_multi_sheet(&sheet.grid, context)
                            .evaluate(expr)
                            .to_cell_value()
                    }
                    None => CellValue::Error(CellError::Parse),
                })
                .collect();

            let mut changed = false;
            for ((sheet_index, row, col, _), value) in targets.iter().zip(results) {
                let cell = self.sheets[*sheet_index].grid.cell_mut(*row, *col);
                if cell.value != value {
                    cell.value = value;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }
}
