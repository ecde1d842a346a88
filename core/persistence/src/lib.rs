//! FILENAME: core/persistence/src/lib.rs
//! PURPOSE: Loads and saves engine workbooks as XLSX files.
//! CONTEXT: Report templates are authored in a spreadsheet application, so
//! loading has to keep everything the renderer reads back out of a template:
//! values, formulas, style ids and the style table, merged regions, row
//! heights and column widths. Saving writes the rendered workbook with cached
//! formula results so viewers that do not recalculate still show totals.

mod error;
mod ooxml;
mod xlsx_reader;
mod xlsx_writer;

pub use error::PersistenceError;
pub use ooxml::{parse_sheet_layout, parse_styles, SheetLayout};
pub use xlsx_reader::load_xlsx;
pub use xlsx_writer::save_xlsx;

#[cfg(test)]
mod tests {
    use super::*;
    use engine::cell::{CellError, CellValue};
    use engine::coord::CellRange;
    use engine::style::{CellStyle, Color, Fill};
    use engine::workbook::Workbook;

    fn sample_workbook() -> Workbook {
        let mut book = Workbook::new();
        let highlight = book.register_style(
            CellStyle::new()
                .with_bold(true)
                .with_background(Color::new(255, 255, 0))
                .with_number_format("#,##0.00"),
        );

        let sheet = book.add_sheet("Report");
        sheet.set_value(0, 0, CellValue::Text("Title".into()));
        sheet.add_merged_region(CellRange::new((0, 0), (0, 2)));
        sheet.set_value(1, 0, CellValue::Text("a".into()));
        sheet.set_value(1, 1, CellValue::Number(1.5));
        sheet.set_style_index(1, 1, highlight);
        sheet.set_value(2, 1, CellValue::Number(2.5));
        sheet.set_value(2, 2, CellValue::Boolean(true));
        sheet.set_formula(3, 1, "=SUM(B2:B3)");
        sheet.set_style_index(4, 1, highlight);
        sheet.set_row_height(1, 24.0);
        sheet.set_column_width(1, 18.0);
        sheet.set_auto_filter(CellRange::new((0, 0), (2, 2)));

        book.add_sheet("Notes")
            .set_value(0, 0, CellValue::Error(CellError::Div0));
        book.recalculate();
        book
    }

    #[test]
    fn round_trip_keeps_values_layout_and_styles() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("report.xlsx");

        let original = sample_workbook();
        save_xlsx(&original, &path).expect("save");
        let loaded = load_xlsx(&path).expect("load");

        assert_eq!(loaded.sheet_names(), vec!["Report".to_string(), "Notes".to_string()]);
        let sheet = loaded.sheet("Report").expect("report sheet");

        assert_eq!(sheet.value(0, 0), CellValue::Text("Title".into()));
        assert_eq!(sheet.value(1, 1), CellValue::Number(1.5));
        assert_eq!(sheet.value(2, 2), CellValue::Boolean(true));
        assert_eq!(sheet.formula(3, 1), Some("=SUM(B2:B3)"));
        assert_eq!(sheet.value(3, 1), CellValue::Number(4.0));

        assert_eq!(sheet.merged_regions(), &[CellRange::new((0, 0), (0, 2))]);
        assert_eq!(sheet.row_height(1), Some(24.0));
        assert_eq!(sheet.auto_filter, Some(CellRange::new((0, 0), (2, 2))));

        let style = loaded.style(sheet.style_index(1, 1));
        assert!(style.font.bold);
        assert_eq!(style.fill, Fill::Solid(Color::new(255, 255, 0)));
        assert_eq!(style.number_format.as_deref(), Some("#,##0.00"));
        // A styled cell without a value keeps its style
        assert_eq!(sheet.style_index(4, 1), sheet.style_index(1, 1));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(load_xlsx(&dir.path().join("absent.xlsx")).is_err());
    }
}
