//! FILENAME: core/engine/src/lib.rs
//! PURPOSE: Main library entry point for the spreadsheet engine.
//! CONTEXT: Re-exports public types and modules for use by other crates.
//! The engine is the document model reports are rendered into: sparse cell
//! grids, a flyweight style table, worksheets with structural edits, and a
//! formula evaluator for recalculation.

pub mod cell;
pub mod coord;
pub mod evaluator;
pub mod grid;
pub mod references;
pub mod style;
pub mod workbook;

// Re-export commonly used types at the crate root
pub use cell::{Cell, CellError, CellValue, format_number};
pub use coord::{
    a1_to_coord, col_to_index, coord_to_a1, index_to_col, parse_a1, parse_col, CellCoord,
    CellRange, MAX_COLUMNS, MAX_ROWS,
};
pub use evaluator::{EvalResult, Evaluator, MultiSheetContext};
pub use grid::Grid;
pub use references::{rewrite_references, RefPart, Reference};
pub use style::{
    BorderLineStyle, BorderStyle, Borders, CellStyle, Color, Fill, FontStyle, StyleRegistry,
    TextAlign, VerticalAlign,
};
pub use workbook::{Workbook, Worksheet};
