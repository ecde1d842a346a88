//! FILENAME: core/template-engine/src/materializer.rs
//! PURPOSE: Writes records into the table area of a compiled sheet.
//! CONTEXT: After compilation the sheet keeps two template rows below the
//! header (at `first_data_row` and the row after). Rows are inserted between
//! them so every record has a row, then each record's cells are written:
//! replayed sample formulas, rendered `{{ }}` fields or raw values, with the
//! sample row's style (or a color-rule variant of it).

use crate::compiler::{Column, CompiledSheet, SampleCell};
use crate::error::{TemplateError, TemplateResult};
use crate::pool::EvaluatorPool;
use crate::record::{FieldValue, Record};
use crate::rewrite::rewrite_formula_row;
use crate::style_resolver::StyleResolver;
use crate::substitution::{render_template, FunctionTable};
use engine::{CellRange, CellValue, StyleRegistry, Worksheet};

/// Render columns move one left once column A is gone.
const RENDER_COLUMN_SHIFT: i32 = -1;

/// Template rows already present to host the first records.
const RESERVED_ROWS: usize = 2;

pub struct Materializer<'a> {
    compiled: &'a CompiledSheet,
    first_data_row: u32,
    functions: &'a FunctionTable,
    resolver: StyleResolver<'a>,
}

impl<'a> Materializer<'a> {
    pub fn new(
        compiled: &'a CompiledSheet,
        first_data_row: u32,
        functions: &'a FunctionTable,
        pool: &'a EvaluatorPool,
    ) -> Self {
        Materializer {
            compiled,
            first_data_row,
            functions,
            resolver: StyleResolver::new(pool),
        }
    }

    /// Fails when a column has no sample row to take a style from.
    pub fn check_samples(&self, sheet_name: &str) -> TemplateResult<()> {
        match self.compiled.columns.iter().find(|c| c.samples.is_empty()) {
            Some(column) => Err(TemplateError::MissingSampleCells {
                sheet: sheet_name.to_string(),
                column: column.template_label.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Makes room for `count` records: inserts rows between the two reserved
    /// template rows, or clears the unused ones.
    pub fn reserve_rows(&self, sheet: &mut Worksheet, count: usize) {
        let first = self.first_data_row - 1;
        match count {
            0 => {
                sheet.clear_row(first);
                sheet.clear_row(first + 1);
            }
            1 => sheet.clear_row(first + 1),
            _ => {
                let extra = (count - RESERVED_ROWS) as u32;
                sheet.insert_rows(first + 1, extra);
            }
        }
    }

    /// Writes every record; rows must already be reserved.
    pub fn write_rows(
        &mut self,
        sheet: &mut Worksheet,
        registry: &mut StyleRegistry,
        records: &[Record],
    ) -> TemplateResult<()> {
        self.check_samples(&sheet.name)?;
        for (position, record) in records.iter().enumerate() {
            self.write_row(sheet, registry, position, record)?;
        }
        self.apply_auto_filter(sheet, records.len());
        log::debug!("sheet '{}': wrote {} rows", sheet.name, records.len());
        Ok(())
    }

    fn write_row(
        &mut self,
        sheet: &mut Worksheet,
        registry: &mut StyleRegistry,
        position: usize,
        record: &Record,
    ) -> TemplateResult<()> {
        let row_num = self.first_data_row + position as u32;
        let row = row_num - 1;
        let sample_index = record.sample_index.unwrap_or(position);
        let compiled = self.compiled;

        if let Some(height) = compiled
            .columns
            .first()
            .and_then(|column| column.sample(sample_index))
            .and_then(|sample| sample.row_height)
        {
            sheet.set_row_height(row, height);
        }

        for column in &compiled.columns {
            let col = column.render_col - 1;
            let sample = column.sample(sample_index).ok_or_else(|| TemplateError::MissingSampleCells {
                sheet: sheet.name.clone(),
                column: column.template_label.clone(),
            })?;

            if record.is_subtotal() {
                write_subtotal_cell(sheet, row, col, column, record);
                sheet.set_style_index(row, col, 0);
                continue;
            }

            self.write_cell(sheet, row, col, column, sample, record)?;
            let style = self.resolver.resolve(column, sample, position, record, registry)?;
            sheet.set_style_index(row, col, style);
        }
        Ok(())
    }

    fn write_cell(
        &self,
        sheet: &mut Worksheet,
        row: u32,
        col: u32,
        column: &Column,
        sample: &SampleCell,
        record: &Record,
    ) -> TemplateResult<()> {
        if let Some(formula) = &sample.formula {
            let formula = rewrite_formula_row(formula, row + 1, RENDER_COLUMN_SHIFT)?;
            sheet.set_formula(row, col, &formula);
            return Ok(());
        }

        if column.is_template {
            let text = render_template(&column.data_field, &record.to_context(), self.functions)?;
            sheet.set_value(row, col, CellValue::Text(text));
            return Ok(());
        }

        match record.get(&column.data_field) {
            Some(FieldValue::Formula(formula)) => sheet.set_formula(row, col, formula),
            Some(value) => sheet.set_value(row, col, value.to_cell_value()),
            None => sheet.clear_cell(row, col),
        }
        Ok(())
    }

    /// Filter from the header row through the last record, over the columns.
    fn apply_auto_filter(&self, sheet: &mut Worksheet, count: usize) {
        let (Some(first), Some(last)) = (self.compiled.columns.first(), self.compiled.columns.last()) else {
            return;
        };
        if count == 0 {
            return;
        }
        let header_row = self.first_data_row - 2;
        sheet.set_auto_filter(CellRange {
            start_row: header_row,
            start_col: first.render_col - 1,
            end_row: header_row + count as u32,
            end_col: last.render_col - 1,
        });
    }
}

/// Subtotal rows only carry what the grouper put there: formulas and labels.
fn write_subtotal_cell(sheet: &mut Worksheet, row: u32, col: u32, column: &Column, record: &Record) {
    sheet.clear_cell(row, col);
    match record.get(&column.data_field) {
        Some(FieldValue::Formula(formula)) => sheet.set_formula(row, col, formula),
        Some(FieldValue::Text(text)) if text.len() > 1 => {
            sheet.set_value(row, col, CellValue::Text(text.clone()));
        }
        _ => {}
    }
}
