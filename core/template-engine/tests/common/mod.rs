//! FILENAME: tests/common/mod.rs
//! Test harness and fixtures for template rendering integration tests.

#![allow(dead_code)]

use engine::{parse_a1, CellStyle, CellValue, Color, Workbook, Worksheet};
use serde_json::{json, Value};
use template_engine::{RenderData, RenderOptions, TemplateRenderer, TemplateResult};

/// Builds template workbooks row by row, in A1 terms.
pub struct TemplateHarness {
    pub workbook: Workbook,
}

impl TemplateHarness {
    /// A workbook with one empty sheet.
    pub fn new(sheet: &str) -> Self {
        let mut workbook = Workbook::new();
        workbook.add_sheet(sheet);
        TemplateHarness { workbook }
    }

    pub fn add_sheet(&mut self, name: &str) -> &mut Self {
        self.workbook.add_sheet(name);
        self
    }

    /// Writes `cells` into 1-based `row` of the last sheet, from column A.
    /// Text starting with '=' becomes a formula.
    pub fn row(&mut self, row: u32, cells: &[&str]) -> &mut Self {
        let sheet = self.last_sheet();
        for (col, text) in cells.iter().enumerate() {
            let col = col as u32;
            if text.len() > 1 && text.starts_with('=') {
                sheet.set_formula(row - 1, col, text);
            } else if !text.is_empty() {
                sheet.set_value(row - 1, col, CellValue::Text(text.to_string()));
            }
        }
        self
    }

    /// Like [`row`](Self::row) but stores every cell as text, the way
    /// color expressions are typed into a template ('=IF(...)).
    pub fn text_row(&mut self, row: u32, cells: &[&str]) -> &mut Self {
        let sheet = self.last_sheet();
        for (col, text) in cells.iter().enumerate() {
            if !text.is_empty() {
                sheet.set_value(row - 1, col as u32, CellValue::Text(text.to_string()));
            }
        }
        self
    }

    /// Registers `style` and applies it to `cells` ("B3", "C3", ...).
    pub fn style(&mut self, style: CellStyle, cells: &[&str]) -> usize {
        let id = self.workbook.register_style(style);
        let sheet = self.last_sheet();
        for cell in cells {
            let (row, col) = coord(cell);
            sheet.set_style_index(row, col, id);
        }
        id
    }

    pub fn row_height(&mut self, row: u32, height: f64) -> &mut Self {
        self.last_sheet().set_row_height(row - 1, height);
        self
    }

    pub fn render(&self, data: Value) -> Workbook {
        self.render_with(RenderOptions::default(), data)
            .expect("render should succeed")
    }

    pub fn render_with(&self, options: RenderOptions, data: Value) -> TemplateResult<Workbook> {
        TemplateRenderer::new(options).render(self.workbook.clone(), &RenderData::from(data))
    }

    fn last_sheet(&mut self) -> &mut Worksheet {
        self.workbook
            .sheets
            .last_mut()
            .expect("harness always has a sheet")
    }
}

/// 0-based coordinate of an A1 reference.
pub fn coord(a1: &str) -> (u32, u32) {
    parse_a1(a1).unwrap_or_else(|| panic!("bad cell reference {a1}"))
}

pub fn value(sheet: &Worksheet, a1: &str) -> CellValue {
    let (row, col) = coord(a1);
    sheet.value(row, col)
}

pub fn text(sheet: &Worksheet, a1: &str) -> String {
    let (row, col) = coord(a1);
    sheet.cell(row, col).map(|c| c.display_value()).unwrap_or_default()
}

pub fn formula<'a>(sheet: &'a Worksheet, a1: &str) -> Option<&'a str> {
    let (row, col) = coord(a1);
    sheet.formula(row, col)
}

pub fn style_of(sheet: &Worksheet, a1: &str) -> usize {
    let (row, col) = coord(a1);
    sheet.style_index(row, col)
}

pub fn bold() -> CellStyle {
    CellStyle::new().with_bold(true)
}

pub fn striped() -> CellStyle {
    CellStyle::new().with_background(Color::new(0xEE, 0xEE, 0xEE))
}

/// The standard two-column orders template:
///
/// ```text
///   1  Header     Name   Amount
///   2  DataField  name   amount
///   3  Data       (S)    (S)
/// ```
pub fn orders_template() -> (TemplateHarness, usize) {
    let mut harness = TemplateHarness::new("Orders");
    harness
        .row(1, &["Header", "Name", "Amount"])
        .row(2, &["DataField", "name", "amount"])
        .row(3, &["Data"]);
    let style = harness.style(bold(), &["B3", "C3"]);
    (harness, style)
}

pub fn orders(rows: &[(&str, f64)]) -> Value {
    let table: Vec<Value> = rows
        .iter()
        .map(|(name, amount)| json!({"name": name, "amount": amount}))
        .collect();
    json!({ "table": table })
}
