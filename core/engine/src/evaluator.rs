//! FILENAME: core/engine/src/evaluator.rs
//! PURPOSE: Evaluates AST expressions to compute cell values.
//! CONTEXT: After a formula is parsed into an AST, this module traverses
//! the tree and computes the final result. Rendered reports lean on it for
//! two things: recalculating subtotal formulas after rows were inserted, and
//! answering the small conditional expressions template authors put in
//! style cells (`=IF(B1="yes","FFFF00","")`).
//!
//! SUPPORTED FEATURES:
//! - Literals, cell references (optionally sheet-qualified), ranges,
//!   whole columns and whole rows
//! - Binary operations: +, -, *, /, ^, &, =, <>, <, >, <=, >=
//! - Unary operations: prefix `-`, postfix `%`
//! - Aggregates: SUM, AVERAGE, MIN, MAX, COUNT, COUNTA, PRODUCT, SUBTOTAL
//! - Logical: IF, IFERROR, AND, OR, NOT
//! - Math: ABS, ROUND, INT, MOD, SQRT, POWER
//! - Text: LEN, UPPER, LOWER, TRIM, CONCATENATE, LEFT, RIGHT, MID
//! - Information: ISNUMBER, ISTEXT, ISBLANK, ISERROR
//!
//! Empty cells inside a range are skipped by aggregates; a direct reference
//! to an empty cell evaluates to 0.

use crate::cell::{Cell, CellError, CellValue, format_number};
use crate::coord::col_to_index;
use crate::grid::Grid;
use parser::{BinaryOperator, Expression, UnaryOperator, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// The result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalResult {
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(CellError),
    /// Values of a range, used internally for aggregate arguments.
    Array(Vec<EvalResult>),
}

impl EvalResult {
    /// Converts the result to a CellValue for storage. Arrays collapse to
    /// their first element.
    pub fn to_cell_value(&self) -> CellValue {
        match self {
            EvalResult::Number(n) => CellValue::Number(*n),
            EvalResult::Text(s) => CellValue::Text(s.clone()),
            EvalResult::Boolean(b) => CellValue::Boolean(*b),
            EvalResult::Error(e) => CellValue::Error(e.clone()),
            EvalResult::Array(arr) => arr
                .first()
                .map(EvalResult::to_cell_value)
                .unwrap_or(CellValue::Empty),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            EvalResult::Number(n) => Some(*n),
            EvalResult::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            EvalResult::Text(s) => s.trim().parse::<f64>().ok(),
            EvalResult::Array(arr) => arr.first().and_then(EvalResult::as_number),
            EvalResult::Error(_) => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            EvalResult::Boolean(b) => Some(*b),
            EvalResult::Number(n) => Some(*n != 0.0),
            EvalResult::Text(s) if s.eq_ignore_ascii_case("TRUE") => Some(true),
            EvalResult::Text(s) if s.eq_ignore_ascii_case("FALSE") => Some(false),
            EvalResult::Array(arr) => arr.first().and_then(EvalResult::as_boolean),
            _ => None,
        }
    }

    /// Display text of the result: `12` rather than `12.0`, `TRUE`, `#DIV/0!`.
    pub fn as_text(&self) -> String {
        match self {
            EvalResult::Number(n) => format_number(*n),
            EvalResult::Text(s) => s.clone(),
            EvalResult::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            EvalResult::Error(e) => e.code().to_string(),
            EvalResult::Array(arr) => arr.first().map(EvalResult::as_text).unwrap_or_default(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, EvalResult::Error(_))
    }

    /// Flattens nested arrays into individual values.
    pub fn flatten(&self) -> Vec<EvalResult> {
        match self {
            EvalResult::Array(arr) => arr.iter().flat_map(EvalResult::flatten).collect(),
            other => vec![other.clone()],
        }
    }

    fn from_cell_value(value: &CellValue) -> Self {
        match value {
            CellValue::Empty => EvalResult::Number(0.0),
            CellValue::Number(n) => EvalResult::Number(*n),
            CellValue::Text(s) => EvalResult::Text(s.clone()),
            CellValue::Boolean(b) => EvalResult::Boolean(*b),
            CellValue::Error(e) => EvalResult::Error(e.clone()),
        }
    }
}

/// Context for multi-sheet evaluation.
/// Maps sheet names to their corresponding grids.
pub struct MultiSheetContext<'a> {
    /// Keys are upper-cased for case-insensitive lookup.
    pub grids: HashMap<String, &'a Grid>,
    /// The sheet that unqualified references resolve against.
    pub current_sheet: String,
}

impl<'a> MultiSheetContext<'a> {
    pub fn new(current_sheet: impl Into<String>) -> Self {
        MultiSheetContext {
            grids: HashMap::new(),
            current_sheet: current_sheet.into(),
        }
    }

    pub fn add_grid(&mut self, name: &str, grid: &'a Grid) {
        self.grids.insert(name.to_uppercase(), grid);
    }

    pub fn get_grid(&self, name: &str) -> Option<&'a Grid> {
        self.grids.get(&name.to_uppercase()).copied()
    }
}

/// One cell visited while walking a reference, or `None` for a gap.
type Visited<'g> = Option<&'g Cell>;

/// The formula evaluator.
/// Holds a reference to the grid for cell lookups.
pub struct Evaluator<'a> {
    grid: &'a Grid,
    multi_sheet: Option<MultiSheetContext<'a>>,
}

impl<'a> Evaluator<'a> {
    /// Single-sheet evaluator; sheet-qualified references yield `#REF!`.
    pub fn new(grid: &'a Grid) -> Self {
        Evaluator {
            grid,
            multi_sheet: None,
        }
    }

    pub fn with_multi_sheet(grid: &'a Grid, context: MultiSheetContext<'a>) -> Self {
        Evaluator {
            grid,
            multi_sheet: Some(context),
        }
    }

    fn grid_for_sheet(&self, sheet: &Option<String>) -> Option<&'a Grid> {
        match sheet {
            None => Some(self.grid),
            Some(name) => match &self.multi_sheet {
                Some(ctx) => ctx.get_grid(name),
                None => None,
            },
        }
    }

    /// Evaluates an AST expression and returns the result.
    pub fn evaluate(&self, expr: &Expression) -> EvalResult {
        match expr {
            Expression::Literal(value) => match value {
                Value::Number(n) => EvalResult::Number(*n),
                Value::String(s) => EvalResult::Text(s.clone()),
                Value::Boolean(b) => EvalResult::Boolean(*b),
            },
            Expression::CellRef { sheet, col, row, .. } => {
                let Some(grid) = self.grid_for_sheet(sheet) else {
                    return EvalResult::Error(CellError::Ref);
                };
                match grid.get_cell(row.saturating_sub(1), col_to_index(col)) {
                    Some(cell) => EvalResult::from_cell_value(&cell.value),
                    None => EvalResult::Number(0.0),
                }
            }
            Expression::Range { .. } | Expression::ColumnRef { .. } | Expression::RowRef { .. } => {
                match self.reference_cells(expr) {
                    Some(cells) => EvalResult::Array(
                        cells
                            .into_iter()
                            .flatten()
                            .map(|cell| EvalResult::from_cell_value(&cell.value))
                            .collect(),
                    ),
                    None => EvalResult::Error(CellError::Ref),
                }
            }
            Expression::BinaryOp { left, op, right } => self.eval_binary_op(left, *op, right),
            Expression::UnaryOp { op, operand } => {
                let value = self.evaluate(operand);
                if value.is_error() {
                    return value;
                }
                match (op, value.as_number()) {
                    (UnaryOperator::Negate, Some(n)) => EvalResult::Number(-n),
                    (UnaryOperator::Percent, Some(n)) => EvalResult::Number(n / 100.0),
                    (_, None) => EvalResult::Error(CellError::Value),
                }
            }
            Expression::FunctionCall { name, args } => self.eval_function(name, args),
        }
    }

    /// Cells covered by a reference expression in reading order. Gaps inside
    /// a rectangular range are reported as `None`; whole-column and whole-row
    /// references only visit populated cells. `None` overall means the
    /// reference cannot be resolved.
    fn reference_cells(&self, expr: &Expression) -> Option<Vec<Visited<'a>>> {
        match expr {
            Expression::CellRef { sheet, col, row, .. } => {
                let grid = self.grid_for_sheet(sheet)?;
                Some(vec![grid.get_cell(row.saturating_sub(1), col_to_index(col))])
            }
            Expression::Range { sheet, start, end } => {
                let grid = self.grid_for_sheet(sheet)?;
                let (Expression::CellRef { col: c1, row: r1, .. }, Expression::CellRef { col: c2, row: r2, .. }) =
                    (start.as_ref(), end.as_ref())
                else {
                    return None;
                };
                let (r1, r2) = (r1.saturating_sub(1), r2.saturating_sub(1));
                let (c1, c2) = (col_to_index(c1), col_to_index(c2));
                let mut cells = Vec::new();
                for row in r1.min(r2)..=r1.max(r2) {
                    for col in c1.min(c2)..=c1.max(c2) {
                        cells.push(grid.get_cell(row, col));
                    }
                }
                Some(cells)
            }
            Expression::ColumnRef { sheet, start_col, end_col, .. } => {
                let grid = self.grid_for_sheet(sheet)?;
                let (c1, c2) = (col_to_index(start_col), col_to_index(end_col));
                let (low, high) = (c1.min(c2), c1.max(c2));
                let mut hits: Vec<(u32, u32, &Cell)> = grid
                    .cells
                    .iter()
                    .filter(|((_, col), _)| *col >= low && *col <= high)
                    .map(|(&(row, col), cell)| (col, row, cell))
                    .collect();
                hits.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
                Some(hits.into_iter().map(|(_, _, cell)| Some(cell)).collect())
            }
            Expression::RowRef { sheet, start_row, end_row } => {
                let grid = self.grid_for_sheet(sheet)?;
                let (r1, r2) = (start_row.saturating_sub(1), end_row.saturating_sub(1));
                let (low, high) = (r1.min(r2), r1.max(r2));
                let mut hits: Vec<(u32, u32, &Cell)> = grid
                    .cells
                    .iter()
                    .filter(|((row, _), _)| *row >= low && *row <= high)
                    .map(|(&(row, col), cell)| (row, col, cell))
                    .collect();
                hits.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
                Some(hits.into_iter().map(|(_, _, cell)| Some(cell)).collect())
            }
            _ => None,
        }
    }

    // ==================== OPERATORS ====================

    fn eval_binary_op(&self, left: &Expression, op: BinaryOperator, right: &Expression) -> EvalResult {
        let left = self.evaluate(left);
        let right = self.evaluate(right);
        if left.is_error() {
            return left;
        }
        if right.is_error() {
            return right;
        }

        match op {
            BinaryOperator::Add => arithmetic(&left, &right, |l, r| l + r),
            BinaryOperator::Subtract => arithmetic(&left, &right, |l, r| l - r),
            BinaryOperator::Multiply => arithmetic(&left, &right, |l, r| l * r),
            BinaryOperator::Divide => match right.as_number() {
                Some(r) if r == 0.0 => EvalResult::Error(CellError::Div0),
                _ => arithmetic(&left, &right, |l, r| l / r),
            },
            BinaryOperator::Power => match arithmetic(&left, &right, f64::powf) {
                EvalResult::Number(n) if !n.is_finite() => EvalResult::Error(CellError::Num),
                other => other,
            },
            BinaryOperator::Concat => {
                EvalResult::Text(format!("{}{}", left.as_text(), right.as_text()))
            }
            BinaryOperator::Equal => EvalResult::Boolean(values_equal(&left, &right)),
            BinaryOperator::NotEqual => EvalResult::Boolean(!values_equal(&left, &right)),
            BinaryOperator::LessThan => compare(&left, &right, Ordering::is_lt),
            BinaryOperator::GreaterThan => compare(&left, &right, Ordering::is_gt),
            BinaryOperator::LessEqual => compare(&left, &right, Ordering::is_le),
            BinaryOperator::GreaterEqual => compare(&left, &right, Ordering::is_ge),
        }
    }

    // ==================== FUNCTIONS ====================

    fn eval_function(&self, name: &str, args: &[Expression]) -> EvalResult {
        match name.to_uppercase().as_str() {
            "SUM" => self.aggregate(args, Aggregate::Sum),
            "AVERAGE" => self.aggregate(args, Aggregate::Average),
            "MIN" => self.aggregate(args, Aggregate::Min),
            "MAX" => self.aggregate(args, Aggregate::Max),
            "COUNT" => self.aggregate(args, Aggregate::Count),
            "COUNTA" => self.aggregate(args, Aggregate::CountA),
            "PRODUCT" => self.aggregate(args, Aggregate::Product),
            "SUBTOTAL" => self.fn_subtotal(args),

            "IF" => self.fn_if(args),
            "IFERROR" => match args {
                [value, fallback] => match self.evaluate(value) {
                    EvalResult::Error(_) => self.evaluate(fallback),
                    other => other,
                },
                _ => EvalResult::Error(CellError::Value),
            },
            "AND" => self.fn_logical(args, true),
            "OR" => self.fn_logical(args, false),
            "NOT" => match args {
                [arg] => match self.evaluate(arg).as_boolean() {
                    Some(b) => EvalResult::Boolean(!b),
                    None => EvalResult::Error(CellError::Value),
                },
                _ => EvalResult::Error(CellError::Value),
            },
            "TRUE" => EvalResult::Boolean(true),
            "FALSE" => EvalResult::Boolean(false),

            "ABS" => self.unary_math(args, f64::abs),
            "INT" => self.unary_math(args, f64::floor),
            "SQRT" => match self.unary_math(args, f64::sqrt) {
                EvalResult::Number(n) if n.is_nan() => EvalResult::Error(CellError::Num),
                other => other,
            },
            "ROUND" => self.fn_round(args),
            "MOD" => match self.numbers_exact(args, 2).as_deref() {
                Ok([_, d]) if *d == 0.0 => EvalResult::Error(CellError::Div0),
                Ok([n, d]) => EvalResult::Number(n - d * (n / d).floor()),
                Ok(_) => EvalResult::Error(CellError::Value),
                Err(e) => EvalResult::Error(e.clone()),
            },
            "POWER" => match self.numbers_exact(args, 2).as_deref() {
                Ok([base, exp]) => match base.powf(*exp) {
                    n if n.is_finite() => EvalResult::Number(n),
                    _ => EvalResult::Error(CellError::Num),
                },
                Ok(_) => EvalResult::Error(CellError::Value),
                Err(e) => EvalResult::Error(e.clone()),
            },

            "LEN" => self.text_fn(args, |s| EvalResult::Number(s.chars().count() as f64)),
            "UPPER" => self.text_fn(args, |s| EvalResult::Text(s.to_uppercase())),
            "LOWER" => self.text_fn(args, |s| EvalResult::Text(s.to_lowercase())),
            "TRIM" => self.text_fn(args, |s| {
                EvalResult::Text(s.split_whitespace().collect::<Vec<_>>().join(" "))
            }),
            "CONCATENATE" | "CONCAT" => {
                let mut out = String::new();
                for arg in args {
                    for value in self.evaluate(arg).flatten() {
                        if value.is_error() {
                            return value;
                        }
                        out.push_str(&value.as_text());
                    }
                }
                EvalResult::Text(out)
            }
            "LEFT" => self.fn_slice(args, |chars, n| chars.iter().take(n).collect()),
            "RIGHT" => self.fn_slice(args, |chars, n| {
                chars[chars.len().saturating_sub(n)..].iter().collect()
            }),
            "MID" => self.fn_mid(args),

            "ISNUMBER" => self.is_fn(args, |v| matches!(v, EvalResult::Number(_))),
            "ISTEXT" => self.is_fn(args, |v| matches!(v, EvalResult::Text(_))),
            "ISERROR" => self.is_fn(args, EvalResult::is_error),
            "ISBLANK" => match args {
                [arg] => match self.reference_cells(arg) {
                    Some(cells) => EvalResult::Boolean(
                        cells.len() == 1 && cells[0].is_none_or(|c| c.value.is_empty()),
                    ),
                    None => EvalResult::Boolean(false),
                },
                _ => EvalResult::Error(CellError::Value),
            },

            _ => EvalResult::Error(CellError::Name),
        }
    }

    /// Values an aggregate sees for `args`. Reference arguments contribute
    /// their non-empty cells as-is; other arguments are evaluated and
    /// flattened. The bool marks values that came from a reference, which
    /// numeric aggregates use to skip text the way spreadsheets do.
    fn aggregate_inputs(
        &self,
        args: &[Expression],
        skip_nested_subtotals: bool,
    ) -> Result<Vec<(EvalResult, bool)>, CellError> {
        let mut values = Vec::new();
        for arg in args {
            if is_reference(arg) {
                let cells = self.reference_cells(arg).ok_or(CellError::Ref)?;
                for cell in cells.into_iter().flatten() {
                    if cell.value.is_empty() && !cell.has_formula() {
                        continue;
                    }
                    if skip_nested_subtotals && holds_subtotal(cell) {
                        continue;
                    }
                    values.push((EvalResult::from_cell_value(&cell.value), true));
                }
            } else {
                for value in self.evaluate(arg).flatten() {
                    values.push((value, false));
                }
            }
        }
        Ok(values)
    }

    fn aggregate(&self, args: &[Expression], kind: Aggregate) -> EvalResult {
        match self.aggregate_inputs(args, false) {
            Ok(values) => kind.apply(&values),
            Err(e) => EvalResult::Error(e),
        }
    }

    /// SUBTOTAL(code, ref...) applies the aggregate selected by `code` and
    /// ignores cells that themselves hold SUBTOTAL formulas, so group
    /// subtotals are not counted twice by a grand total over the same rows.
    fn fn_subtotal(&self, args: &[Expression]) -> EvalResult {
        let Some((code, refs)) = args.split_first() else {
            return EvalResult::Error(CellError::Value);
        };
        let code = match self.evaluate(code) {
            EvalResult::Error(e) => return EvalResult::Error(e),
            other => match other.as_number() {
                Some(n) => n.trunc() as i64,
                None => return EvalResult::Error(CellError::Value),
            },
        };
        let Some(kind) = Aggregate::from_subtotal_code(code) else {
            return EvalResult::Error(CellError::Value);
        };
        match self.aggregate_inputs(refs, true) {
            Ok(values) => kind.apply(&values),
            Err(e) => EvalResult::Error(e),
        }
    }

    fn fn_if(&self, args: &[Expression]) -> EvalResult {
        if args.len() < 2 || args.len() > 3 {
            return EvalResult::Error(CellError::Value);
        }
        let condition = self.evaluate(&args[0]);
        if condition.is_error() {
            return condition;
        }
        match condition.as_boolean() {
            Some(true) => self.evaluate(&args[1]),
            Some(false) if args.len() == 3 => self.evaluate(&args[2]),
            Some(false) => EvalResult::Boolean(false),
            None => EvalResult::Error(CellError::Value),
        }
    }

    /// AND when `all` is true, OR otherwise.
    fn fn_logical(&self, args: &[Expression], all: bool) -> EvalResult {
        if args.is_empty() {
            return EvalResult::Error(CellError::Value);
        }
        let mut seen = false;
        for arg in args {
            for value in self.evaluate(arg).flatten() {
                if value.is_error() {
                    return value;
                }
                let Some(b) = value.as_boolean() else { continue };
                seen = true;
                if b != all {
                    return EvalResult::Boolean(!all);
                }
            }
        }
        if seen {
            EvalResult::Boolean(all)
        } else {
            EvalResult::Error(CellError::Value)
        }
    }

    /// Evaluates exactly `count` numeric arguments.
    fn numbers_exact(&self, args: &[Expression], count: usize) -> Result<Vec<f64>, CellError> {
        if args.len() != count {
            return Err(CellError::Value);
        }
        args.iter()
            .map(|arg| match self.evaluate(arg) {
                EvalResult::Error(e) => Err(e),
                value => value.as_number().ok_or(CellError::Value),
            })
            .collect()
    }

    fn unary_math(&self, args: &[Expression], f: fn(f64) -> f64) -> EvalResult {
        match self.numbers_exact(args, 1).as_deref() {
            Ok([n]) => EvalResult::Number(f(*n)),
            Ok(_) => EvalResult::Error(CellError::Value),
            Err(e) => EvalResult::Error(e.clone()),
        }
    }

    /// ROUND(n[, digits]); halves round away from zero.
    fn fn_round(&self, args: &[Expression]) -> EvalResult {
        let values = match args.len() {
            1 | 2 => self.numbers_exact(args, args.len()),
            _ => Err(CellError::Value),
        };
        match values.as_deref() {
            Ok([n]) => EvalResult::Number(n.round()),
            Ok([n, digits]) => {
                let factor = 10f64.powi(digits.trunc() as i32);
                EvalResult::Number((n * factor).round() / factor)
            }
            Ok(_) => EvalResult::Error(CellError::Value),
            Err(e) => EvalResult::Error(e.clone()),
        }
    }

    fn text_fn(&self, args: &[Expression], f: impl Fn(&str) -> EvalResult) -> EvalResult {
        match args {
            [arg] => match self.evaluate(arg) {
                EvalResult::Error(e) => EvalResult::Error(e),
                value => f(&value.as_text()),
            },
            _ => EvalResult::Error(CellError::Value),
        }
    }

    fn fn_slice(&self, args: &[Expression], take: fn(&[char], usize) -> String) -> EvalResult {
        if args.is_empty() || args.len() > 2 {
            return EvalResult::Error(CellError::Value);
        }
        let text = self.evaluate(&args[0]);
        if text.is_error() {
            return text;
        }
        let count = match args.get(1).map(|a| self.evaluate(a).as_number()) {
            None => 1.0,
            Some(Some(n)) if n >= 0.0 => n,
            Some(_) => return EvalResult::Error(CellError::Value),
        };
        let chars: Vec<char> = text.as_text().chars().collect();
        EvalResult::Text(take(&chars, count as usize))
    }

    fn fn_mid(&self, args: &[Expression]) -> EvalResult {
        let [text, start, count] = args else {
            return EvalResult::Error(CellError::Value);
        };
        let text = self.evaluate(text);
        if text.is_error() {
            return text;
        }
        let (Some(start), Some(count)) = (
            self.evaluate(start).as_number(),
            self.evaluate(count).as_number(),
        ) else {
            return EvalResult::Error(CellError::Value);
        };
        if start < 1.0 || count < 0.0 {
            return EvalResult::Error(CellError::Value);
        }
        EvalResult::Text(
            text.as_text()
                .chars()
                .skip(start as usize - 1)
                .take(count as usize)
                .collect(),
        )
    }

    fn is_fn(&self, args: &[Expression], test: fn(&EvalResult) -> bool) -> EvalResult {
        match args {
            [arg] => EvalResult::Boolean(test(&self.evaluate(arg))),
            _ => EvalResult::Error(CellError::Value),
        }
    }
}

// ==================== HELPERS ====================

fn is_reference(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::CellRef { .. }
            | Expression::Range { .. }
            | Expression::ColumnRef { .. }
            | Expression::RowRef { .. }
    )
}

fn holds_subtotal(cell: &Cell) -> bool {
    cell.formula.as_deref().is_some_and(|formula| {
        parser::parse(formula)
            .map(|expr| expr.calls_function("SUBTOTAL"))
            .unwrap_or(false)
    })
}

fn arithmetic(left: &EvalResult, right: &EvalResult, f: impl Fn(f64, f64) -> f64) -> EvalResult {
    match (left.as_number(), right.as_number()) {
        (Some(l), Some(r)) => EvalResult::Number(f(l, r)),
        _ => EvalResult::Error(CellError::Value),
    }
}

fn values_equal(left: &EvalResult, right: &EvalResult) -> bool {
    match (left, right) {
        (EvalResult::Number(l), EvalResult::Number(r)) => (l - r).abs() < f64::EPSILON,
        (EvalResult::Text(l), EvalResult::Text(r)) => l.to_lowercase() == r.to_lowercase(),
        (EvalResult::Boolean(l), EvalResult::Boolean(r)) => l == r,
        _ => false,
    }
}

/// Numbers compare numerically, text case-insensitively; mixing the two is
/// `#VALUE!`.
fn compare(left: &EvalResult, right: &EvalResult, test: fn(Ordering) -> bool) -> EvalResult {
    let ordering = match (left, right) {
        (EvalResult::Text(l), EvalResult::Text(r)) => Some(l.to_lowercase().cmp(&r.to_lowercase())),
        _ => match (left.as_number(), right.as_number()) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => None,
        },
    };
    match ordering {
        Some(ordering) => EvalResult::Boolean(test(ordering)),
        None => EvalResult::Error(CellError::Value),
    }
}

/// Aggregates shared by the plain functions and SUBTOTAL.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Aggregate {
    Average,
    Count,
    CountA,
    Max,
    Min,
    Product,
    StdDev,
    StdDevP,
    Sum,
    Var,
    VarP,
}

impl Aggregate {
    /// SUBTOTAL function numbers; 101-111 behave like 1-11 since rows are
    /// never hidden here.
    fn from_subtotal_code(code: i64) -> Option<Self> {
        let code = if code > 100 { code - 100 } else { code };
        Some(match code {
            1 => Aggregate::Average,
            2 => Aggregate::Count,
            3 => Aggregate::CountA,
            4 => Aggregate::Max,
            5 => Aggregate::Min,
            6 => Aggregate::Product,
            7 => Aggregate::StdDev,
            8 => Aggregate::StdDevP,
            9 => Aggregate::Sum,
            10 => Aggregate::Var,
            11 => Aggregate::VarP,
            _ => return None,
        })
    }

    fn apply(self, values: &[(EvalResult, bool)]) -> EvalResult {
        if self == Aggregate::CountA {
            return EvalResult::Number(values.len() as f64);
        }

        let mut numbers = Vec::with_capacity(values.len());
        for (value, from_reference) in values {
            match value {
                EvalResult::Error(e) if self != Aggregate::Count => {
                    return EvalResult::Error(e.clone());
                }
                EvalResult::Number(n) => numbers.push(*n),
                EvalResult::Text(_) | EvalResult::Boolean(_) if *from_reference => {}
                other => {
                    if let Some(n) = other.as_number() {
                        numbers.push(n);
                    } else if self != Aggregate::Count && !other.is_error() {
                        return EvalResult::Error(CellError::Value);
                    }
                }
            }
        }

        let count = numbers.len() as f64;
        let sum: f64 = numbers.iter().sum();
        let variance = |sample: bool| -> Option<f64> {
            let denominator = if sample { count - 1.0 } else { count };
            if denominator <= 0.0 {
                return None;
            }
            let mean = sum / count;
            Some(numbers.iter().map(|n| (n - mean).powi(2)).sum::<f64>() / denominator)
        };

        let result = match self {
            Aggregate::Sum => Some(sum),
            Aggregate::Count => Some(count),
            Aggregate::CountA => Some(count),
            Aggregate::Average => (count > 0.0).then(|| sum / count),
            // MIN, MAX and PRODUCT of nothing are 0
            Aggregate::Max | Aggregate::Min | Aggregate::Product if numbers.is_empty() => {
                Some(0.0)
            }
            Aggregate::Max => numbers.iter().copied().reduce(f64::max),
            Aggregate::Min => numbers.iter().copied().reduce(f64::min),
            Aggregate::Product => Some(numbers.iter().product()),
            Aggregate::Var => variance(true),
            Aggregate::VarP => variance(false),
            Aggregate::StdDev => variance(true).map(f64::sqrt),
            Aggregate::StdDevP => variance(false).map(f64::sqrt),
        };

        match result {
            Some(n) => EvalResult::Number(n),
            None => EvalResult::Error(CellError::Div0),
        }
    }
}
