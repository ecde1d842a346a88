//! FILENAME: core/template-engine/src/lib.rs
//! PURPOSE: Library entry point for the report template renderer.
//! CONTEXT: A report template is an ordinary workbook whose column A marks
//! directive rows (Header, DataField, Data, BackgroundColor, FontColor,
//! Subtotal). Rendering compiles those rows into a column schema, expands
//! the caller's records into styled rows with replayed formulas, injects
//! grouped SUBTOTAL rows and applies data-driven colors.
//!
//! PIPELINE: Template --> substitute {{ }} --> compile --> strip directives
//!           --> group/subtotal --> materialize rows --> recalculate

pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod locale;
pub mod materializer;
pub mod pool;
pub mod record;
pub mod render;
pub mod rewrite;
pub mod style_resolver;
pub mod substitution;
pub mod subtotal;

pub use compiler::{fill_merged_regions, Column, CompiledSheet, DirectiveRow, SampleCell, TemplateCompiler};
pub use error::{TemplateError, TemplateResult};
pub use evaluator::{Evaluation, FormulaEvaluator, GridFormulaEvaluator};
pub use locale::{DirectiveKind, DirectiveLabels, Locale, SubtotalSpec};
pub use materializer::Materializer;
pub use pool::{EvaluatorPool, PoolConfig, PooledEvaluator};
pub use record::{FieldValue, FillData, Record, RenderData, RowKind};
pub use render::{RenderOptions, TemplateRenderer};
pub use rewrite::rewrite_formula_row;
pub use style_resolver::StyleResolver;
pub use substitution::{contains_template_syntax, render_template, FunctionTable};
pub use subtotal::{group_and_subtotal, resolve_subtotal_directives, SubtotalDirective};
