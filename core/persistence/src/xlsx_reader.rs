//! FILENAME: core/persistence/src/xlsx_reader.rs
//! PURPOSE: Loads an XLSX file into an engine Workbook.
//! CONTEXT: calamine supplies values and formulas. Ranges it returns start
//! at the first used cell, so every position is offset by `range.start()`.
//! Style ids and layout come from the package XML (see ooxml.rs).

use crate::ooxml::{parse_sheet_layout, parse_styles, read_part, sheet_part_paths};
use crate::PersistenceError;
use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use engine::cell::{CellError, CellValue};
use engine::style::StyleRegistry;
use engine::workbook::{Workbook, Worksheet};
use std::fs::File;
use std::path::Path;
use zip::ZipArchive;

pub fn load_xlsx(path: &Path) -> Result<Workbook, PersistenceError> {
    let mut xlsx: Xlsx<_> = open_workbook(path)?;
    let sheet_names = xlsx.sheet_names().to_vec();

    if sheet_names.is_empty() {
        return Err(PersistenceError::InvalidFormat(
            "Workbook contains no sheets".to_string(),
        ));
    }

    let mut archive = ZipArchive::new(File::open(path)?)?;
    let part_paths = sheet_part_paths(&mut archive)?;

    let mut workbook = Workbook::new();
    workbook.styles = load_styles(&mut archive)?;

    for sheet_name in &sheet_names {
        let mut sheet = Worksheet::new(sheet_name.as_str());

        let values = xlsx.worksheet_range(sheet_name)?;
        for (row, col, data) in offset_cells(&values) {
            if let Some(value) = to_cell_value(data) {
                sheet.set_value(row, col, value);
            }
        }

        // Formulas are read once per sheet and laid over the cached values
        let formulas = xlsx.worksheet_formula(sheet_name)?;
        for (row, col, formula) in offset_cells(&formulas) {
            if formula.is_empty() {
                continue;
            }
            sheet.grid.cell_mut(row, col).formula = Some(format!("={formula}"));
        }

        let part = part_paths
            .get(sheet_name)
            .ok_or_else(|| PersistenceError::SheetNotFound(sheet_name.clone()))?;
        if let Some(xml) = read_part(&mut archive, part)? {
            let layout = parse_sheet_layout(&xml)?;
            for ((row, col), style) in layout.style_ids {
                if workbook.styles.contains(style) {
                    sheet.set_style_index(row, col, style);
                }
            }
            sheet.merged_regions = layout.merged_regions;
            sheet.row_heights = layout.row_heights;
            sheet.column_widths = layout.column_widths;
            sheet.auto_filter = layout.auto_filter;
        }

        workbook.sheets.push(sheet);
    }

    Ok(workbook)
}

/// Builds the registry so that a cell's `s` attribute is its style index.
fn load_styles(archive: &mut ZipArchive<File>) -> Result<StyleRegistry, PersistenceError> {
    let mut registry = StyleRegistry::new();
    let Some(xml) = read_part(archive, "xl/styles.xml")? else {
        return Ok(registry);
    };
    let mut styles = parse_styles(&xml)?.into_iter();
    if let Some(first) = styles.next() {
        registry.set_default(first);
    }
    for style in styles {
        registry.push(style);
    }
    Ok(registry)
}

/// Used cells with absolute 0-based positions.
fn offset_cells<T>(range: &Range<T>) -> impl Iterator<Item = (u32, u32, &T)>
where
    T: calamine::CellType + Default,
{
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    range
        .used_cells()
        .map(move |(row, col, value)| (start_row + row as u32, start_col + col as u32, value))
}

fn to_cell_value(data: &Data) -> Option<CellValue> {
    Some(match data {
        Data::Empty => return None,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::Error(e) => CellValue::Error(CellError::from_code(&e.to_string())),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    })
}
