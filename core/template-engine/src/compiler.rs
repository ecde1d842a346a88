//! FILENAME: core/template-engine/src/compiler.rs
//! PURPOSE: Reads directive rows out of a template sheet.
//! CONTEXT: Column A of a template names a directive per row:
//!
//! ```text
//!   A            B                C
//!   Header       Customer         Amount        <- creates the columns
//!   DataField    name             amount        <- record field per column
//!   Data         (style/formula)  =C3*1.2       <- sample rows, cycled
//!   Data         (stripe style)   =C4*1.2
//!   BackgroundColor               =IF(amount>100,"FFEEEE","")
//!   Subtotal     Group            Sum
//! ```
//!
//! Compilation captures everything materialization needs, then strips the
//! directive scaffolding (extra directive rows and column A) from the sheet.

use crate::error::{TemplateError, TemplateResult};
use crate::locale::{DirectiveKind, DirectiveLabels};
use crate::substitution::contains_template_syntax;
use engine::{index_to_col, CellRange, Worksheet, MAX_COLUMNS, MAX_ROWS};
use std::collections::HashMap;

/// Directive rows kept in the sheet: the header and the two rows that host
/// the first two materialized records.
const KEPT_DIRECTIVE_ROWS: usize = 3;

/// One captured Data row for a column.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleCell {
    /// 1-based template row the sample came from.
    pub row: u32,
    /// Formula text with its leading '='. Cleared from the template.
    pub formula: Option<String>,
    pub style_id: usize,
    pub row_height: Option<f64>,
}

/// One output column of the rendered table.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// 1-based column number in the template.
    pub template_col: u32,
    pub template_label: String,
    /// 1-based column number after column A is removed.
    pub render_col: u32,
    pub render_label: String,
    pub header: String,
    pub data_field: String,
    /// The data field is a `{{ }}` template rather than a field name.
    pub is_template: bool,
    pub background_color: Option<String>,
    pub font_color: Option<String>,
    pub samples: Vec<SampleCell>,
}

impl Column {
    fn new(template_col: u32, header: &str) -> Self {
        let render_col = template_col - 1;
        Column {
            template_col,
            template_label: index_to_col(template_col - 1),
            render_col,
            render_label: index_to_col(render_col.saturating_sub(1)),
            header: header.to_string(),
            data_field: String::new(),
            is_template: false,
            background_color: None,
            font_color: None,
            samples: Vec::new(),
        }
    }

    /// Sample for the record at `index`; samples repeat cyclically.
    pub fn sample(&self, index: usize) -> Option<&SampleCell> {
        if self.samples.is_empty() {
            None
        } else {
            self.samples.get(index % self.samples.len())
        }
    }

    pub fn has_color_rules(&self) -> bool {
        self.background_color.is_some() || self.font_color.is_some()
    }
}

/// A directive row as it appeared in the template text.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveRow {
    pub kind: DirectiveKind,
    /// 1-based row number.
    pub row: u32,
    pub cells: Vec<String>,
}

/// Everything compilation learned about one sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledSheet {
    pub columns: Vec<Column>,
    /// All directive rows, top to bottom.
    pub directives: Vec<DirectiveRow>,
    /// 1-based row of the first materialized record (header row + 1).
    pub first_data_row: Option<u32>,
}

impl CompiledSheet {
    pub fn directives_of(&self, kind: DirectiveKind) -> impl Iterator<Item = &DirectiveRow> {
        self.directives.iter().filter(move |d| d.kind == kind)
    }

    pub fn column(&self, template_col: u32) -> Option<&Column> {
        self.columns.iter().find(|c| c.template_col == template_col)
    }

    /// Deletes directive rows beyond the first three, bottom-up, then column A.
    pub fn strip_directives(&self, sheet: &mut Worksheet) {
        for directive in self.directives.iter().skip(KEPT_DIRECTIVE_ROWS).rev() {
            sheet.remove_row(directive.row - 1);
        }
        sheet.remove_col(0);
    }
}

/// Copies each merged region's anchor text into every cell it covers.
pub fn fill_merged_regions(rows: &mut Vec<Vec<String>>, merges: &[CellRange]) {
    for merge in merges {
        let value = rows
            .get(merge.start_row as usize)
            .and_then(|row| row.get(merge.start_col as usize))
            .cloned()
            .unwrap_or_default();

        let end_row = merge.end_row as usize;
        let end_col = merge.end_col as usize;
        if rows.len() <= end_row {
            rows.resize(end_row + 1, Vec::new());
        }
        for row in &mut rows[merge.start_row as usize..=end_row] {
            if row.len() <= end_col {
                row.resize(end_col + 1, String::new());
            }
            for cell in &mut row[merge.start_col as usize..=end_col] {
                cell.clone_from(&value);
            }
        }
    }
}

pub struct TemplateCompiler<'a> {
    labels: &'a DirectiveLabels,
}

impl<'a> TemplateCompiler<'a> {
    pub fn new(labels: &'a DirectiveLabels) -> Self {
        TemplateCompiler { labels }
    }

    /// Scans `rows` (the sheet's text before substitution, merges filled)
    /// and captures samples from `sheet`. Formulas on Data rows are cleared.
    pub fn compile(&self, sheet: &mut Worksheet, rows: &[Vec<String>]) -> TemplateResult<CompiledSheet> {
        let mut compiled = CompiledSheet::default();
        let mut by_template_col: HashMap<u32, usize> = HashMap::new();

        for (row_index, cells) in rows.iter().enumerate() {
            let Some(kind) = cells.first().and_then(|first| self.labels.directive(first)) else {
                continue;
            };
            let row_num = checked_row(&sheet.name, row_index)?;

            if kind == DirectiveKind::Header && compiled.first_data_row.is_none() {
                compiled.first_data_row = Some(row_num + 1);
            }

            if kind == DirectiveKind::Data {
                // Blank sample cells still carry a style, so every column samples.
                for column in &mut compiled.columns {
                    capture_sample(column, sheet, row_num);
                }
            } else {
                for (col_index, text) in cells.iter().enumerate().skip(1) {
                    let col_num = checked_col(&sheet.name, row_num, col_index)?;
                    match by_template_col.get(&col_num) {
                        Some(&position) => apply_directive(kind, &mut compiled.columns[position], text),
                        None if kind == DirectiveKind::Header && !text.trim().is_empty() => {
                            by_template_col.insert(col_num, compiled.columns.len());
                            compiled.columns.push(Column::new(col_num, text));
                        }
                        None => {}
                    }
                }
            }

            compiled.directives.push(DirectiveRow {
                kind,
                row: row_num,
                cells: cells.clone(),
            });
        }

        log::debug!(
            "compiled sheet '{}': {} columns, {} directive rows, first data row {:?}",
            sheet.name,
            compiled.columns.len(),
            compiled.directives.len(),
            compiled.first_data_row
        );
        Ok(compiled)
    }
}

fn apply_directive(kind: DirectiveKind, column: &mut Column, text: &str) {
    match kind {
        DirectiveKind::DataField => {
            column.data_field = text.to_string();
            column.is_template = contains_template_syntax(text);
        }
        DirectiveKind::BackgroundColor => column.background_color = non_empty(text),
        DirectiveKind::FontColor => column.font_color = non_empty(text),
        DirectiveKind::Header | DirectiveKind::Data | DirectiveKind::Subtotal => {}
    }
}

/// Snapshots a Data row cell and clears its formula from the template.
fn capture_sample(column: &mut Column, sheet: &mut Worksheet, row_num: u32) {
    let (row, col) = (row_num - 1, column.template_col - 1);
    let formula = sheet.formula(row, col).map(str::to_string);
    if formula.is_some() {
        sheet.set_formula(row, col, "");
    }
    column.samples.push(SampleCell {
        row: row_num,
        formula,
        style_id: sheet.style_index(row, col),
        row_height: sheet.row_height(row),
    });
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn checked_row(sheet: &str, row_index: usize) -> TemplateResult<u32> {
    u32::try_from(row_index)
        .ok()
        .filter(|&row| row < MAX_ROWS)
        .map(|row| row + 1)
        .ok_or_else(|| TemplateError::Structural {
            sheet: sheet.to_string(),
            cell: format!("A{}", row_index + 1),
            message: "row is past the last worksheet row".to_string(),
        })
}

fn checked_col(sheet: &str, row_num: u32, col_index: usize) -> TemplateResult<u32> {
    u32::try_from(col_index)
        .ok()
        .filter(|&col| col < MAX_COLUMNS)
        .map(|col| col + 1)
        .ok_or_else(|| TemplateError::Structural {
            sheet: sheet.to_string(),
            cell: format!("column {} of row {}", col_index + 1, row_num),
            message: "column is past the last worksheet column".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{CellStyle, CellValue, Workbook};

    fn text_sheet(rows: &[&[&str]]) -> Worksheet {
        let mut sheet = Worksheet::new("Report");
        for (r, row) in rows.iter().enumerate() {
            for (c, text) in row.iter().enumerate() {
                if !text.is_empty() {
                    sheet.set_value(r as u32, c as u32, CellValue::Text(text.to_string()));
                }
            }
        }
        sheet
    }

    fn compile(sheet: &mut Worksheet) -> CompiledSheet {
        let labels = DirectiveLabels::english();
        let rows = sheet.text_rows();
        TemplateCompiler::new(&labels).compile(sheet, &rows).unwrap()
    }

    #[test]
    fn header_row_defines_columns() {
        let mut sheet = text_sheet(&[
            &["", "Sales report"],
            &["Header", "Name", "", "Amount"],
            &["DataField", "name", "ignored", "{{ .amount }}"],
            &["Data", "", "", ""],
        ]);
        let compiled = compile(&mut sheet);

        assert_eq!(compiled.first_data_row, Some(3));
        assert_eq!(compiled.columns.len(), 2);
        let name = &compiled.columns[0];
        assert_eq!((name.template_col, name.render_col), (2, 1));
        assert_eq!((name.template_label.as_str(), name.render_label.as_str()), ("B", "A"));
        assert_eq!(name.data_field, "name");
        assert!(!name.is_template);
        let amount = &compiled.columns[1];
        assert_eq!(amount.render_label, "C");
        assert!(amount.is_template);
        assert_eq!(amount.samples.len(), 1);
        assert!(compiled.column(3).is_none());
    }

    #[test]
    fn data_rows_capture_samples_and_clear_formulas() {
        let mut workbook = Workbook::new();
        let striped = workbook.register_style(CellStyle::new().with_bold(true));
        let sheet = workbook.add_sheet("Report");
        for (r, label) in ["Header", "DataField", "Data", "Data"].iter().enumerate() {
            sheet.set_value(r as u32, 0, CellValue::Text(label.to_string()));
        }
        sheet.set_value(0, 1, CellValue::Text("Total".into()));
        sheet.set_value(1, 1, CellValue::Text("total".into()));
        sheet.set_formula(2, 1, "=C3*2");
        sheet.set_formula(3, 1, "=C4*2");
        sheet.set_style_index(3, 1, striped);
        sheet.set_row_height(2, 22.0);

        let compiled = compile(sheet);
        let samples = &compiled.columns[0].samples;
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].formula.as_deref(), Some("=C3*2"));
        assert_eq!(samples[0].row_height, Some(22.0));
        assert_eq!(samples[1].style_id, striped);
        assert_eq!(sheet.formula(2, 1), None);
        assert_eq!(compiled.columns[0].sample(3), Some(&samples[1]));
    }

    #[test]
    fn color_rows_and_unknown_rows() {
        let mut sheet = text_sheet(&[
            &["Header", "Name"],
            &["Notes", "anything"],
            &["BackgroundColor", "=IF(a=1,\"FF0000\",\"\")"],
            &["FontColor", " "],
        ]);
        let compiled = compile(&mut sheet);
        assert_eq!(compiled.directives.len(), 3);
        let column = &compiled.columns[0];
        assert_eq!(column.background_color.as_deref(), Some("=IF(a=1,\"FF0000\",\"\")"));
        assert_eq!(column.font_color, None);
        assert!(column.samples.is_empty());
        assert!(column.sample(0).is_none());
    }

    #[test]
    fn compiling_twice_gives_the_same_schema() {
        let rows: &[&[&str]] = &[&["Header", "A", "B"], &["DataField", "a", "b"]];
        let first = compile(&mut text_sheet(rows));
        let second = compile(&mut text_sheet(rows));
        assert_eq!(first.columns, second.columns);
    }

    #[test]
    fn merged_headers_fill_every_cell() {
        let mut rows = vec![vec!["Header".to_string(), "Region".to_string()], vec![]];
        let merge = CellRange::parse("B1:C2").unwrap();
        fill_merged_regions(&mut rows, &[merge]);
        assert_eq!(rows[0], vec!["Header", "Region", "Region"]);
        assert_eq!(rows[1], vec!["", "Region", "Region"]);
    }

    #[test]
    fn strip_keeps_first_three_directive_rows() {
        let mut sheet = text_sheet(&[
            &["", "Title"],
            &["Header", "Name"],
            &["DataField", "name"],
            &["Data", "x"],
            &["Data", "y"],
            &["FontColor", "=\"FF0000\""],
            &["", "footer"],
        ]);
        let compiled = compile(&mut sheet);
        compiled.strip_directives(&mut sheet);

        let rows = sheet.text_rows();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0], vec!["Title"]);
        assert_eq!(rows[1], vec!["Name"]);
        assert_eq!(rows[3], vec!["x"]);
        assert_eq!(rows[4], vec!["footer"]);
    }
}
