//! FILENAME: core/template-engine/src/error.rs
//! PURPOSE: Error type for template compilation and rendering.
//! CONTEXT: Internal helpers return these up to the per-sheet orchestrator,
//! which wraps them with the sheet name before they reach the caller.

use persistence::PersistenceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("malformed template at {sheet}!{cell}: {message}")]
    Structural {
        sheet: String,
        cell: String,
        message: String,
    },

    #[error("invalid column letters '{letters}' in formula")]
    InvalidColumn { letters: String },

    #[error("column {column} shifted by {shift} falls outside the sheet")]
    ColumnOutOfRange { column: String, shift: i32 },

    #[error("column {column} on sheet '{sheet}' has no Data sample rows")]
    MissingSampleCells { sheet: String, column: String },

    #[error("failed to evaluate '{expression}': {message}")]
    Expression { expression: String, message: String },

    #[error("failed to render template '{template}': {message}")]
    Template { template: String, message: String },

    #[error("record {index} is invalid: {message}")]
    InvalidRecord { index: usize, message: String },

    #[error("{operation} failed on sheet '{sheet}': {message}")]
    Document {
        sheet: String,
        operation: String,
        message: String,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("invalid render options: {0}")]
    InvalidOptions(#[from] serde_json::Error),

    #[error("sheet '{sheet}': {source}")]
    Sheet {
        sheet: String,
        #[source]
        source: Box<TemplateError>,
    },
}

impl TemplateError {
    pub(crate) fn expression(expression: &str, message: impl Into<String>) -> Self {
        TemplateError::Expression {
            expression: expression.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn template(template: &str, message: impl Into<String>) -> Self {
        TemplateError::Template {
            template: template.to_string(),
            message: message.into(),
        }
    }

    /// Wraps an error with the sheet it came from, once.
    pub(crate) fn in_sheet(self, sheet: &str) -> Self {
        match self {
            wrapped @ TemplateError::Sheet { .. } => wrapped,
            other => TemplateError::Sheet {
                sheet: sheet.to_string(),
                source: Box::new(other),
            },
        }
    }
}

pub type TemplateResult<T> = Result<T, TemplateError>;
