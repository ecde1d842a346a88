//! FILENAME: core/engine/src/grid.rs
//! PURPOSE: Sparse storage for the cells of one worksheet.
//! CONTEXT: Report templates are mostly empty, so cells live in a HashMap
//! keyed by 0-based (row, col). Structural edits (row insertion, column
//! removal) re-key the map in one pass through `remap`.

use crate::cell::Cell;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Grid {
    /// Sparse storage: keys are (row, col), 0-based.
    pub cells: HashMap<(u32, u32), Cell>,

    /// Highest row index currently in use.
    pub max_row: u32,

    /// Highest column index currently in use.
    pub max_col: u32,
}

impl Grid {
    pub fn new() -> Self {
        Grid::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Sets a cell and widens the tracked bounds.
    pub fn set_cell(&mut self, row: u32, col: u32, cell: Cell) {
        self.max_row = self.max_row.max(row);
        self.max_col = self.max_col.max(col);
        self.cells.insert((row, col), cell);
    }

    pub fn get_cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Returns the cell at (row, col), creating an empty one if needed.
    pub fn cell_mut(&mut self, row: u32, col: u32) -> &mut Cell {
        self.max_row = self.max_row.max(row);
        self.max_col = self.max_col.max(col);
        self.cells.entry((row, col)).or_default()
    }

    /// Removes a cell. Bounds are recomputed only when the cell sat on them.
    pub fn clear_cell(&mut self, row: u32, col: u32) {
        let was_at_boundary = row == self.max_row || col == self.max_col;
        self.cells.remove(&(row, col));
        if was_at_boundary {
            self.recalculate_bounds();
        }
    }

    /// Recomputes max_row and max_col by scanning all cells.
    pub fn recalculate_bounds(&mut self) {
        self.max_row = self.cells.keys().map(|&(r, _)| r).max().unwrap_or(0);
        self.max_col = self.cells.keys().map(|&(_, c)| c).max().unwrap_or(0);
    }

    /// Re-keys every cell through `f`; cells mapped to `None` are dropped.
    pub fn remap<F>(&mut self, mut f: F)
    where
        F: FnMut(u32, u32) -> Option<(u32, u32)>,
    {
        let old = std::mem::take(&mut self.cells);
        self.cells = old
            .into_iter()
            .filter_map(|((row, col), cell)| f(row, col).map(|pos| (pos, cell)))
            .collect();
        self.recalculate_bounds();
    }

    /// Cell positions in reading order (row, then column).
    pub fn sorted_positions(&self) -> Vec<(u32, u32)> {
        let mut positions: Vec<(u32, u32)> = self.cells.keys().copied().collect();
        positions.sort_unstable();
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_cell_tracks_bounds() {
        let mut grid = Grid::new();
        grid.set_cell(4, 2, Cell::new_number(1.0));
        grid.set_cell(1, 7, Cell::new_number(2.0));
        assert_eq!((grid.max_row, grid.max_col), (4, 7));

        grid.clear_cell(1, 7);
        assert_eq!((grid.max_row, grid.max_col), (4, 2));
    }

    #[test]
    fn remap_moves_and_drops_cells() {
        let mut grid = Grid::new();
        grid.set_cell(0, 0, Cell::new_text("keep"));
        grid.set_cell(1, 0, Cell::new_text("drop"));
        grid.set_cell(2, 0, Cell::new_text("move"));

        grid.remap(|row, col| match row {
            1 => None,
            2 => Some((1, col)),
            _ => Some((row, col)),
        });

        assert_eq!(grid.cells.len(), 2);
        assert_eq!(grid.get_cell(1, 0), Some(&Cell::new_text("move")));
        assert_eq!(grid.max_row, 1);
    }

    #[test]
    fn sorted_positions_are_in_reading_order() {
        let mut grid = Grid::new();
        grid.set_cell(1, 0, Cell::new_number(1.0));
        grid.set_cell(0, 3, Cell::new_number(1.0));
        grid.set_cell(0, 1, Cell::new_number(1.0));
        assert_eq!(grid.sorted_positions(), vec![(0, 1), (0, 3), (1, 0)]);
    }
}
