//! FILENAME: core/template-engine/src/subtotal.rs
//! PURPOSE: Groups records and injects SUBTOTAL rows.
//! CONTEXT: A Subtotal directive row marks a group-by column and an
//! aggregate column. Records are regrouped by the group field and each
//! group gets a synthesized record holding a `=SUBTOTAL(code,range)` formula
//! over the group's rows, followed by one grand total record.
//!
//! Several Subtotal rows apply in order, each regrouping the output of the
//! previous one (including its synthesized rows).

use crate::compiler::CompiledSheet;
use crate::locale::{DirectiveKind, DirectiveLabels, SubtotalSpec};
use crate::record::{FieldValue, Record};
use engine::index_to_col;

/// A resolved Subtotal directive row.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtotalDirective {
    pub group_field: String,
    pub sum_field: String,
    /// Render column letters of the aggregated field.
    pub sum_column: String,
    pub spec: SubtotalSpec,
}

/// Resolves every Subtotal row of a compiled sheet. Rows missing a marker,
/// or any Subtotal row on a sheet without a DataField row, are skipped.
pub fn resolve_subtotal_directives(compiled: &CompiledSheet, labels: &DirectiveLabels) -> Vec<SubtotalDirective> {
    let mut directives = Vec::new();
    let data_fields = compiled.directives_of(DirectiveKind::DataField).next();

    for row in compiled.directives_of(DirectiveKind::Subtotal) {
        let Some(data_fields) = data_fields else {
            log::warn!("subtotal row {} skipped: sheet has no DataField row", row.row);
            continue;
        };
        let group_index = row
            .cells
            .iter()
            .skip(1)
            .position(|cell| cell.trim() == labels.group_marker)
            .map(|i| i + 1);
        let aggregate = row.cells.iter().enumerate().skip(1).find_map(|(i, cell)| {
            labels.subtotal_spec(cell).map(|spec| (i, spec))
        });

        let (Some(group_index), Some((sum_index, spec))) = (group_index, aggregate) else {
            log::warn!(
                "subtotal row {} skipped: needs a '{}' cell and an aggregate cell",
                row.row,
                labels.group_marker
            );
            continue;
        };
        let field_at = |i: usize| data_fields.cells.get(i).map(|f| f.trim().to_string()).unwrap_or_default();

        directives.push(SubtotalDirective {
            group_field: field_at(group_index),
            sum_field: field_at(sum_index),
            sum_column: index_to_col(sum_index as u32 - 1),
            spec: spec.clone(),
        });
    }
    directives
}

/// Stable-groups `records` by the display text of `group_field`, in
/// first-seen order, appending a subtotal record after each group and a
/// grand total at the end. `data_start_row` is the 1-based row the first
/// returned record lands on.
pub fn group_and_subtotal(records: Vec<Record>, directive: &SubtotalDirective, data_start_row: u32) -> Vec<Record> {
    if records.is_empty() {
        return records;
    }

    let mut order: Vec<String> = Vec::new();
    let mut groups: Vec<Vec<Record>> = Vec::new();
    for record in records {
        let key = record
            .get(&directive.group_field)
            .map(FieldValue::display)
            .unwrap_or_default();
        match order.iter().position(|existing| *existing == key) {
            Some(position) => groups[position].push(record),
            None => {
                order.push(key);
                groups.push(vec![record]);
            }
        }
    }

    let spec = &directive.spec;
    let column = &directive.sum_column;
    let subtotal_formula = |start: usize, end: usize| {
        format!(
            "=SUBTOTAL({},{column}{}:{column}{})",
            spec.code,
            data_start_row as usize + start,
            data_start_row as usize + end
        )
    };

    let total = order.len() + groups.iter().map(Vec::len).sum::<usize>() + 1;
    let mut output: Vec<Record> = Vec::with_capacity(total);
    for (key, members) in order.into_iter().zip(groups) {
        let start = output.len();
        for (index, mut record) in members.into_iter().enumerate() {
            record.sample_index = Some(index);
            output.push(record);
        }
        let end = output.len() - 1;
        output.push(
            Record::subtotal()
                .with_field(directive.group_field.clone(), FieldValue::Text(format!("{} {}", key, spec.group_suffix)))
                .with_field(directive.sum_field.clone(), FieldValue::Formula(subtotal_formula(start, end))),
        );
    }

    let last = output.len() - 1;
    output.push(
        Record::subtotal()
            .with_field(directive.group_field.clone(), FieldValue::Text(spec.total_label.clone()))
            .with_field(directive.sum_field.clone(), FieldValue::Formula(subtotal_formula(0, last))),
    );
    output
}
