//! FILENAME: core/template-engine/src/render.rs
//! PURPOSE: Renders a template workbook against data, sheet by sheet.
//! CONTEXT: Per sheet: substitute `{{ }}` text, compile directive rows,
//! strip the scaffolding, group and subtotal the records, then materialize
//! them. Formula results are recalculated once all sheets are written.

use crate::compiler::{fill_merged_regions, TemplateCompiler};
use crate::error::{TemplateError, TemplateResult};
use crate::locale::{DirectiveLabels, Locale};
use crate::materializer::Materializer;
use crate::pool::{EvaluatorPool, PoolConfig};
use crate::record::{FillData, RenderData};
use crate::subtotal::{group_and_subtotal, resolve_subtotal_directives};
use crate::substitution::{contains_template_syntax, render_template, FunctionTable};
use engine::{CellValue, StyleRegistry, Workbook, Worksheet, MAX_ROWS};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Field of each sheet's data holding the list of records.
    pub list_field: String,
    /// Language the template's directive labels are written in.
    pub locale: Locale,
    pub pool: PoolConfig,
}

impl RenderOptions {
    pub fn from_json(json: &str) -> TemplateResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_list_field(mut self, list_field: impl Into<String>) -> Self {
        self.list_field = list_field.into();
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            list_field: "table".to_string(),
            locale: Locale::default(),
            pool: PoolConfig::default(),
        }
    }
}

// ============================================================================
// RENDERER
// ============================================================================

/// Renders report templates. Holds the evaluator pool, so build one and
/// reuse it across renders.
pub struct TemplateRenderer {
    options: RenderOptions,
    labels: DirectiveLabels,
    functions: FunctionTable,
    pool: EvaluatorPool,
}

impl TemplateRenderer {
    pub fn new(options: RenderOptions) -> Self {
        let pool = EvaluatorPool::with_grid_evaluators(options.pool.clone());
        TemplateRenderer {
            labels: options.locale.labels(),
            functions: FunctionTable::new(),
            pool,
            options,
        }
    }

    /// Replaces the directive labels chosen by the locale.
    pub fn with_labels(mut self, labels: DirectiveLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Adds a function callable from `{{ }}` actions.
    pub fn with_function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.insert(name, function);
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn labels(&self) -> &DirectiveLabels {
        &self.labels
    }

    pub fn pool(&self) -> &EvaluatorPool {
        &self.pool
    }

    /// Renders every sheet of `template`. The template is consumed so a
    /// failed render leaves nothing half-written with the caller.
    pub fn render(&self, mut template: Workbook, data: &RenderData) -> TemplateResult<Workbook> {
        log::info!("rendering template with {} sheets", template.sheets.len());
        let empty = FillData::empty();
        let Workbook { sheets, styles } = &mut template;

        for (index, sheet) in sheets.iter_mut().enumerate() {
            let fill = data.for_sheet(index).unwrap_or(&empty);
            self.render_sheet(sheet, styles, fill)
                .map_err(|e| e.in_sheet(&sheet.name))?;
        }

        template.recalculate();
        log::info!("rendered {} sheets", template.sheets.len());
        Ok(template)
    }

    /// Loads an XLSX template, renders it and saves the result.
    pub fn render_file(
        &self,
        template_path: impl AsRef<Path>,
        data: &RenderData,
        output_path: impl AsRef<Path>,
    ) -> TemplateResult<()> {
        let template = persistence::load_xlsx(template_path.as_ref())?;
        let rendered = self.render(template, data)?;
        persistence::save_xlsx(&rendered, output_path.as_ref())?;
        log::info!("saved report to {}", output_path.as_ref().display());
        Ok(())
    }

    fn render_sheet(&self, sheet: &mut Worksheet, styles: &mut StyleRegistry, fill: &FillData) -> TemplateResult<()> {
        let mut rows = sheet.text_rows();
        self.substitute_sheet(sheet, &rows, fill)?;

        fill_merged_regions(&mut rows, sheet.merged_regions());
        let compiled = TemplateCompiler::new(&self.labels).compile(sheet, &rows)?;
        if compiled.columns.is_empty() {
            log::debug!("sheet '{}' has no table columns", sheet.name);
            return Ok(());
        }
        let first_data_row = compiled.first_data_row.ok_or_else(|| TemplateError::Structural {
            sheet: sheet.name.clone(),
            cell: "A1".to_string(),
            message: "table columns without a header row".to_string(),
        })?;
        compiled.strip_directives(sheet);

        let mut records = fill.records(&self.options.list_field)?;
        for directive in resolve_subtotal_directives(&compiled, &self.labels) {
            records = group_and_subtotal(records, &directive, first_data_row);
        }

        if !table_fits(first_data_row, records.len()) {
            return Err(TemplateError::Document {
                sheet: sheet.name.clone(),
                operation: "insert rows".to_string(),
                message: format!("{} records do not fit below row {}", records.len(), first_data_row),
            });
        }

        let mut materializer = Materializer::new(&compiled, first_data_row, &self.functions, &self.pool);
        if !records.is_empty() {
            materializer.check_samples(&sheet.name)?;
        }
        materializer.reserve_rows(sheet, records.len());
        if !records.is_empty() {
            materializer.write_rows(sheet, styles, &records)?;
        }
        log::debug!(
            "sheet '{}': {} columns, {} rows from row {}",
            sheet.name,
            compiled.columns.len(),
            records.len(),
            first_data_row
        );
        Ok(())
    }

    /// Expands `{{ }}` in every cell against the sheet context, except on
    /// DataField rows, whose templates are per record.
    fn substitute_sheet(&self, sheet: &mut Worksheet, rows: &[Vec<String>], fill: &FillData) -> TemplateResult<()> {
        for (row, cells) in rows.iter().enumerate() {
            if cells.first().map(|first| first.trim()) == Some(self.labels.data_field.as_str()) {
                continue;
            }
            for (col, text) in cells.iter().enumerate() {
                if contains_template_syntax(text) {
                    let value = render_template(text, fill.context(), &self.functions)?;
                    sheet.set_value(row as u32, col as u32, CellValue::Text(value));
                }
            }
        }
        Ok(())
    }
}

/// Whether `count` rows starting at 1-based `first_data_row` stay on the sheet.
fn table_fits(first_data_row: u32, count: usize) -> bool {
    count == 0 || first_data_row as usize + count - 1 <= MAX_ROWS as usize
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        TemplateRenderer::new(RenderOptions::default())
    }
}
