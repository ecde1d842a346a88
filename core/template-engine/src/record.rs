//! FILENAME: core/template-engine/src/record.rs
//! PURPOSE: Typed data records and the per-sheet fill data they come from.
//! CONTEXT: Callers hand over JSON. Each element of the list field becomes a
//! Record; the rest of the object is the context for `{{ }}` substitution.

use crate::error::{TemplateError, TemplateResult};
use engine::{format_number, CellValue};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Reserved key marking a record synthesized by the subtotal grouper.
pub const ROW_TYPE_KEY: &str = "_row_type";
/// Reserved key carrying the sample-row index a record was assigned.
pub const ROW_INDEX_KEY: &str = "_row_index";
pub const SUBTOTAL_ROW_TYPE: &str = "subtotal";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    /// Formula text including its leading '='.
    Formula(String),
}

impl FieldValue {
    /// Maps a JSON value onto a field. `null` is treated as absent.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(FieldValue::Boolean(*b)),
            Value::Number(n) => n.as_f64().map(FieldValue::Number),
            Value::String(s) => Some(FieldValue::from_text(s.clone())),
            other => Some(FieldValue::Text(other.to_string())),
        }
    }

    /// Strings that start with '=' and carry something after it are formulas.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.len() > 1 && text.starts_with('=') {
            FieldValue::Formula(text)
        } else {
            FieldValue::Text(text)
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) | FieldValue::Formula(s) => Value::String(s.clone()),
            FieldValue::Number(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
            FieldValue::Boolean(b) => Value::Bool(*b),
        }
    }

    /// Literal cell value. Formulas are returned as their text.
    pub fn to_cell_value(&self) -> CellValue {
        match self {
            FieldValue::Text(s) | FieldValue::Formula(s) => CellValue::Text(s.clone()),
            FieldValue::Number(n) => CellValue::Number(*n),
            FieldValue::Boolean(b) => CellValue::Boolean(*b),
        }
    }

    /// Display text, used for group keys and evaluator scratch cells.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Text(s) | FieldValue::Formula(s) => s.clone(),
            FieldValue::Number(n) => format_number(*n),
            FieldValue::Boolean(b) => b.to_string(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        FieldValue::from_text(text)
    }
}

impl From<String> for FieldValue {
    fn from(text: String) -> Self {
        FieldValue::from_text(text)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowKind {
    #[default]
    Data,
    Subtotal,
}

/// One row of input data, keyed by field name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub fields: BTreeMap<String, FieldValue>,
    pub kind: RowKind,
    /// Overrides the position used to pick a sample row.
    pub sample_index: Option<usize>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subtotal() -> Self {
        Record {
            kind: RowKind::Subtotal,
            ..Self::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_sample_index(mut self, index: usize) -> Self {
        self.sample_index = Some(index);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn is_subtotal(&self) -> bool {
        self.kind == RowKind::Subtotal
    }

    /// Builds a record from the `index`-th element of a list field.
    pub fn from_json(index: usize, value: &Value) -> TemplateResult<Self> {
        let Value::Object(object) = value else {
            return Err(TemplateError::InvalidRecord {
                index,
                message: format!("expected an object, found {}", json_kind(value)),
            });
        };

        let mut record = Record::new();
        for (key, value) in object {
            match key.as_str() {
                ROW_TYPE_KEY => {
                    if value.as_str() == Some(SUBTOTAL_ROW_TYPE) {
                        record.kind = RowKind::Subtotal;
                    }
                }
                ROW_INDEX_KEY => {
                    record.sample_index = value.as_u64().map(|i| i as usize);
                    if record.sample_index.is_none() && !value.is_null() {
                        return Err(TemplateError::InvalidRecord {
                            index,
                            message: format!("{ROW_INDEX_KEY} must be a non-negative integer"),
                        });
                    }
                }
                _ => {
                    if let Some(field) = FieldValue::from_json(value) {
                        record.fields.insert(key.clone(), field);
                    }
                }
            }
        }
        Ok(record)
    }

    /// The record as a substitution context: user fields only.
    pub fn to_context(&self) -> Value {
        let object: Map<String, Value> = self
            .fields
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect();
        Value::Object(object)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The data context for one sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct FillData {
    context: Value,
}

impl FillData {
    pub fn new(context: Value) -> Self {
        FillData { context }
    }

    pub fn empty() -> Self {
        FillData {
            context: Value::Object(Map::new()),
        }
    }

    pub fn context(&self) -> &Value {
        &self.context
    }

    /// Records of the list field. A missing or non-array field yields none.
    pub fn records(&self, list_field: &str) -> TemplateResult<Vec<Record>> {
        match self.context.get(list_field) {
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(index, item)| Record::from_json(index, item))
                .collect(),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => {
                log::warn!(
                    "list field '{}' holds {}, not an array; no rows rendered",
                    list_field,
                    json_kind(other)
                );
                Ok(Vec::new())
            }
        }
    }
}

impl Default for FillData {
    fn default() -> Self {
        FillData::empty()
    }
}

impl From<Value> for FillData {
    fn from(context: Value) -> Self {
        FillData::new(context)
    }
}

/// Data for a whole workbook: one shared context, or one per sheet position.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderData {
    Shared(FillData),
    PerSheet(Vec<FillData>),
}

impl RenderData {
    /// Context for the sheet at `index`; `None` past the end of a per-sheet list.
    pub fn for_sheet(&self, index: usize) -> Option<&FillData> {
        match self {
            RenderData::Shared(data) => Some(data),
            RenderData::PerSheet(list) => list.get(index),
        }
    }
}

impl From<Value> for RenderData {
    /// A JSON array is per-sheet data, anything else is shared.
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => RenderData::PerSheet(items.into_iter().map(FillData::new).collect()),
            other => RenderData::Shared(FillData::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_values_map_to_fields() {
        assert_eq!(FieldValue::from_json(&json!("abc")), Some(FieldValue::Text("abc".into())));
        assert_eq!(
            FieldValue::from_json(&json!("=SUM(A1:A2)")),
            Some(FieldValue::Formula("=SUM(A1:A2)".into()))
        );
        assert_eq!(FieldValue::from_json(&json!("=")), Some(FieldValue::Text("=".into())));
        assert_eq!(FieldValue::from_json(&json!(2.5)), Some(FieldValue::Number(2.5)));
        assert_eq!(FieldValue::from_json(&json!(true)), Some(FieldValue::Boolean(true)));
        assert_eq!(FieldValue::from_json(&json!(null)), None);
        assert_eq!(FieldValue::from_json(&json!([1, 2])), Some(FieldValue::Text("[1,2]".into())));
    }

    #[test]
    fn reserved_keys_become_row_metadata() {
        let record = Record::from_json(
            0,
            &json!({"name": "A", "_row_type": "subtotal", "_row_index": 3}),
        )
        .unwrap();
        assert!(record.is_subtotal());
        assert_eq!(record.sample_index, Some(3));
        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.to_context(), json!({"name": "A"}));
    }

    #[test]
    fn non_object_records_are_rejected() {
        let data = FillData::new(json!({"table": [{"a": 1}, 7]}));
        match data.records("table") {
            Err(TemplateError::InvalidRecord { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidRecord, got {:?}", other),
        }
    }

    #[test]
    fn missing_list_field_has_no_records() {
        let data = FillData::new(json!({"title": "Report"}));
        assert!(data.records("table").unwrap().is_empty());
        assert!(FillData::new(json!({"table": "x"})).records("table").unwrap().is_empty());
    }

    #[test]
    fn per_sheet_data_runs_out_gracefully() {
        let data = RenderData::from(json!([{"a": 1}]));
        assert!(data.for_sheet(0).is_some());
        assert!(data.for_sheet(1).is_none());
        let shared = RenderData::from(json!({"a": 1}));
        assert!(shared.for_sheet(5).is_some());
    }

    #[test]
    fn numbers_display_without_trailing_zeros() {
        assert_eq!(FieldValue::Number(1.0).display(), "1");
        assert_eq!(FieldValue::Number(2.5).display(), "2.5");
    }
}
