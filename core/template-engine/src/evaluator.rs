//! FILENAME: core/template-engine/src/evaluator.rs
//! PURPOSE: Evaluates small color expressions against one data record.
//! CONTEXT: BackgroundColor / FontColor directives hold expressions such as
//! `=IF(Status="late","FF0000","")`. Field names are bound to scratch cells
//! and the expression is computed by the engine's formula evaluator.

use crate::error::{TemplateError, TemplateResult};
use crate::record::Record;
use engine::{parse_a1, Cell, EvalResult, Evaluator, Grid};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static VARIABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{Han}\w]+").expect("variable pattern must compile"));

/// Result of one evaluation: display text plus the typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub text: String,
    pub raw: EvalResult,
}

/// Computes an expression with a record's fields as named variables.
///
/// Implementations must leave no state behind between calls: the same
/// expression and record always give the same result.
pub trait FormulaEvaluator: Send {
    fn evaluate(&mut self, expression: &str, variables: &Record) -> TemplateResult<Evaluation>;
}

/// Evaluator backed by a scratch grid: variable `n` (in name order) lives in
/// cell `A{n+1}`.
#[derive(Debug, Default)]
pub struct GridFormulaEvaluator {
    scratch: Grid,
}

impl GridFormulaEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self, rows: u32) {
        for row in 0..rows {
            self.scratch.clear_cell(row, 0);
        }
    }
}

impl FormulaEvaluator for GridFormulaEvaluator {
    fn evaluate(&mut self, expression: &str, variables: &Record) -> TemplateResult<Evaluation> {
        let mut cells: HashMap<&str, String> = HashMap::with_capacity(variables.fields.len());
        let mut rows = 0u32;
        for (name, value) in &variables.fields {
            let mut cell = Cell::new();
            cell.value = value.to_cell_value();
            self.scratch.set_cell(rows, 0, cell);
            cells.insert(name.as_str(), format!("A{}", rows + 1));
            rows += 1;
        }
        // Fields the record lacks read as empty cells.
        for name in variable_names(expression) {
            if !cells.contains_key(name) && !is_builtin_name(name) {
                cells.insert(name, format!("A{}", rows + 1));
                rows += 1;
            }
        }

        let bound = bind_variables(expression, &cells);
        let result = parser::parse(&bound)
            .map_err(|e| TemplateError::expression(expression, e.message))
            .map(|ast| Evaluator::new(&self.scratch).evaluate(&ast));
        self.reset(rows);

        match result? {
            EvalResult::Error(e) => Err(TemplateError::expression(expression, e.code())),
            raw => Ok(Evaluation {
                text: raw.as_text(),
                raw,
            }),
        }
    }
}

/// Replaces variable names with their scratch cells.
fn bind_variables(expression: &str, cells: &HashMap<&str, String>) -> String {
    let mut output = String::with_capacity(expression.len());
    let mut last = 0;

    for found in variable_matches(expression) {
        if let Some(cell) = cells.get(found.as_str()) {
            output.push_str(&expression[last..found.start()]);
            output.push_str(cell);
            last = found.end();
        }
    }
    output.push_str(&expression[last..]);
    output
}

fn variable_names(expression: &str) -> impl Iterator<Item = &str> {
    variable_matches(expression).into_iter().map(|found| found.as_str())
}

/// Words that can name a variable: not inside string literals, not numbers,
/// not function names, not part of a `$` reference or a sheet prefix.
fn variable_matches(expression: &str) -> Vec<regex::Match<'_>> {
    let literals = string_literal_spans(expression);
    VARIABLE_RE
        .find_iter(expression)
        .filter(|found| {
            let start = found.start();
            let before = expression[..start].chars().next_back();
            let after = expression[found.end()..].trim_start().chars().next();
            !literals.iter().any(|&(s, e)| start > s && start < e)
                && !found.as_str().starts_with(|c: char| c.is_ascii_digit())
                && before != Some('$')
                && !matches!(after, Some('(') | Some('!') | Some('$'))
        })
        .collect()
}

/// Boolean literals and cell references keep their formula meaning.
fn is_builtin_name(name: &str) -> bool {
    name.eq_ignore_ascii_case("TRUE") || name.eq_ignore_ascii_case("FALSE") || parse_a1(name).is_some()
}

fn string_literal_spans(expression: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    for (i, ch) in expression.char_indices() {
        if ch != '"' {
            continue;
        }
        match open.take() {
            Some(start) => spans.push((start, i)),
            None => open = Some(i),
        }
    }
    if let Some(start) = open {
        spans.push((start, expression.len()));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expression: &str, record: &Record) -> TemplateResult<Evaluation> {
        GridFormulaEvaluator::new().evaluate(expression, record)
    }

    #[test]
    fn evaluates_color_condition_with_chinese_names() {
        let record = Record::new()
            .with_field("公司名称", "鑫航数据服务有限公司")
            .with_field("数量", 7i64)
            .with_field("是否签收", "是")
            .with_field("签收时间", "2025-04-24");
        let result = eval(r#"=IF(是否签收="是","ffff00","")"#, &record).unwrap();
        assert_eq!(result.text, "ffff00");
    }

    #[test]
    fn evaluates_arithmetic_over_variables() {
        let record = Record::new().with_field("A", 2i64).with_field("B", 3i64);
        assert_eq!(eval("A+B", &record).unwrap().text, "5");

        let record = Record::new().with_field("A", 2.5).with_field("B", 4i64);
        assert_eq!(eval("A*B", &record).unwrap().text, "10");

        let record = Record::new().with_field("数量", 3i64).with_field("单价", 7i64);
        let result = eval("数量+单价", &record).unwrap();
        assert_eq!(result.text, "10");
        assert_eq!(result.raw, EvalResult::Number(10.0));
    }

    #[test]
    fn literals_and_function_names_are_not_variables() {
        let record = Record::new().with_field("IF", "x").with_field("status", "late");
        let result = eval(r#"=IF(status="status","no","yes")"#, &record).unwrap();
        assert_eq!(result.text, "yes");
    }

    #[test]
    fn scratch_cells_do_not_leak_between_calls() {
        let mut evaluator = GridFormulaEvaluator::new();
        let first = Record::new().with_field("a", 1i64).with_field("b", 2i64);
        assert_eq!(evaluator.evaluate("=a+b", &first).unwrap().text, "3");

        // A2 held `b` last time; it must read as empty now.
        let second = Record::new().with_field("a", 5i64);
        assert_eq!(evaluator.evaluate("=a+A2", &second).unwrap().text, "5");
    }

    #[test]
    fn missing_fields_read_as_empty() {
        let late = Record::new().with_field("status", "late");
        let blank = Record::new().with_field("amount", 3i64);
        let expression = r#"=IF(status="late","FF0000","")"#;

        let mut evaluator = GridFormulaEvaluator::new();
        assert_eq!(evaluator.evaluate(expression, &late).unwrap().text, "FF0000");
        assert_eq!(evaluator.evaluate(expression, &blank).unwrap().text, "");
        assert_eq!(evaluator.evaluate("=amount+bonus", &blank).unwrap().text, "3");
    }

    #[test]
    fn references_and_booleans_are_not_bound() {
        let mut evaluator = GridFormulaEvaluator::new();
        let record = Record::new().with_field("a", 4i64);
        assert_eq!(evaluator.evaluate("=IF(TRUE,a+$A$1,0)", &record).unwrap().text, "8");
        assert_eq!(evaluator.evaluate("=a*1.5", &record).unwrap().text, "6");
    }

    #[test]
    fn errors_carry_the_expression() {
        let record = Record::new().with_field("n", 0i64);
        match eval("=1/n", &record) {
            Err(TemplateError::Expression { expression, message }) => {
                assert_eq!(expression, "=1/n");
                assert_eq!(message, "#DIV/0!");
            }
            other => panic!("expected expression error, got {:?}", other),
        }
        assert!(eval("=IF(", &record).is_err());
    }
}
