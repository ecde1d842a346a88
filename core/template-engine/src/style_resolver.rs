//! FILENAME: core/template-engine/src/style_resolver.rs
//! PURPOSE: Picks the style of a materialized cell, applying color rules.
//! CONTEXT: A column's BackgroundColor / FontColor directive holds either a
//! literal color ("FFEEEE") or an expression (`=IF(qty>10,"FF0000","")`)
//! evaluated against the record. The sample row's style is cloned with the
//! resolved colors and registered once per distinct (style, fill, font)
//! combination for the whole sheet render.

use crate::compiler::{Column, SampleCell};
use crate::error::{TemplateError, TemplateResult};
use crate::pool::EvaluatorPool;
use crate::record::Record;
use engine::{Color, Fill, StyleRegistry};
use std::collections::HashMap;

type StyleKey = (usize, Option<Color>, Option<Color>);

/// Per-render caches for color expressions and synthesized styles.
pub struct StyleResolver<'p> {
    pool: &'p EvaluatorPool,
    /// (row position, expression) -> evaluated text
    results: HashMap<(usize, String), String>,
    styles: HashMap<StyleKey, usize>,
    literals: HashMap<String, Option<Color>>,
}

impl<'p> StyleResolver<'p> {
    pub fn new(pool: &'p EvaluatorPool) -> Self {
        StyleResolver {
            pool,
            results: HashMap::new(),
            styles: HashMap::new(),
            literals: HashMap::new(),
        }
    }

    /// Style id for `column` on the record at list position `position`.
    /// Without color rules, or when both colors resolve empty, this is the
    /// sample's own style.
    pub fn resolve(
        &mut self,
        column: &Column,
        sample: &SampleCell,
        position: usize,
        record: &Record,
        registry: &mut StyleRegistry,
    ) -> TemplateResult<usize> {
        let base = sample.style_id;
        if !column.has_color_rules() {
            return Ok(base);
        }

        let background = self.color(column.background_color.as_deref(), position, record)?;
        let font = self.color(column.font_color.as_deref(), position, record)?;
        if background.is_none() && font.is_none() {
            return Ok(base);
        }

        let key = (base, background, font);
        if let Some(&id) = self.styles.get(&key) {
            return Ok(id);
        }

        let mut style = registry.get(base).clone();
        if let Some(color) = background {
            style.fill = Fill::Solid(color);
        }
        if let Some(color) = font {
            style.font.color = Some(color);
        }
        let id = registry.get_or_create(style);
        self.styles.insert(key, id);
        Ok(id)
    }

    fn color(&mut self, rule: Option<&str>, position: usize, record: &Record) -> TemplateResult<Option<Color>> {
        let Some(rule) = rule else {
            return Ok(None);
        };
        if !rule.starts_with('=') {
            return Ok(self.literal(rule));
        }
        let text = self.evaluate(rule, position, record)?;
        parse_color(rule, &text)
    }

    /// Literal colors are configuration: one that does not parse is
    /// reported once and ignored.
    fn literal(&mut self, rule: &str) -> Option<Color> {
        if let Some(&color) = self.literals.get(rule) {
            return color;
        }
        let text = rule.trim();
        let color = Color::from_hex(text);
        if color.is_none() && !text.is_empty() {
            log::warn!("ignoring color '{text}': not a hex color");
        }
        self.literals.insert(rule.to_string(), color);
        color
    }

    fn evaluate(&mut self, expression: &str, position: usize, record: &Record) -> TemplateResult<String> {
        let key = (position, expression.to_string());
        if let Some(text) = self.results.get(&key) {
            return Ok(text.clone());
        }
        let text = self.pool.evaluate(expression, record)?.text;
        self.results.insert(key, text.clone());
        Ok(text)
    }
}

fn parse_color(rule: &str, text: &str) -> TemplateResult<Option<Color>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    Color::from_hex(text)
        .map(Some)
        .ok_or_else(|| TemplateError::expression(rule, format!("'{text}' is not a hex color")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use engine::CellStyle;
    use std::time::Duration;

    fn pool() -> EvaluatorPool {
        EvaluatorPool::with_grid_evaluators(PoolConfig::default().with_sweep_interval(Duration::ZERO))
    }

    fn column(background: Option<&str>, font: Option<&str>) -> Column {
        Column {
            template_col: 2,
            template_label: "B".into(),
            render_col: 1,
            render_label: "A".into(),
            header: "Qty".into(),
            data_field: "qty".into(),
            is_template: false,
            background_color: background.map(str::to_string),
            font_color: font.map(str::to_string),
            samples: Vec::new(),
        }
    }

    fn sample(style_id: usize) -> SampleCell {
        SampleCell {
            row: 3,
            formula: None,
            style_id,
            row_height: None,
        }
    }

    #[test]
    fn no_rules_keeps_sample_style() {
        let pool = pool();
        let mut registry = StyleRegistry::new();
        let base = registry.get_or_create(CellStyle::new().with_bold(true));
        let mut resolver = StyleResolver::new(&pool);
        let id = resolver
            .resolve(&column(None, None), &sample(base), 0, &Record::new(), &mut registry)
            .unwrap();
        assert_eq!(id, base);
    }

    #[test]
    fn same_colors_reuse_one_style() {
        let pool = pool();
        let mut registry = StyleRegistry::new();
        let base = registry.get_or_create(CellStyle::new().with_bold(true));
        let before = registry.len();
        let column = column(Some(r#"=IF(qty>10,"FF0000","")"#), Some("0000FF"));
        let mut resolver = StyleResolver::new(&pool);

        let big = Record::new().with_field("qty", 20i64);
        let first = resolver.resolve(&column, &sample(base), 0, &big, &mut registry).unwrap();
        let second = resolver.resolve(&column, &sample(base), 1, &big, &mut registry).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len(), before + 1);

        let style = registry.get(first);
        assert!(style.font.bold);
        assert_eq!(style.fill, Fill::Solid(Color::new(255, 0, 0)));
        assert_eq!(style.font.color, Some(Color::new(0, 0, 255)));
        assert_eq!(registry.get(base).fill, Fill::None);
    }

    #[test]
    fn empty_expression_result_keeps_base() {
        let pool = pool();
        let mut registry = StyleRegistry::new();
        let column = column(Some(r#"=IF(qty>10,"FF0000","")"#), None);
        let mut resolver = StyleResolver::new(&pool);
        let small = Record::new().with_field("qty", 2i64);
        assert_eq!(resolver.resolve(&column, &sample(0), 0, &small, &mut registry).unwrap(), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn shared_expression_is_evaluated_once_per_row() {
        let pool = pool();
        let mut registry = StyleRegistry::new();
        let rule = r#"=IF(qty>10,"FFFF00","")"#;
        let column = column(Some(rule), Some(rule));
        let mut resolver = StyleResolver::new(&pool);
        let record = Record::new().with_field("qty", 11i64);
        resolver.resolve(&column, &sample(0), 4, &record, &mut registry).unwrap();
        assert_eq!(resolver.results.len(), 1);
        assert_eq!(resolver.results[&(4, rule.to_string())], "FFFF00");
    }

    #[test]
    fn bad_color_is_an_expression_error() {
        let pool = pool();
        let mut registry = StyleRegistry::new();
        let column = column(Some("=\"purple\""), None);
        let mut resolver = StyleResolver::new(&pool);
        assert!(matches!(
            resolver.resolve(&column, &sample(0), 0, &Record::new(), &mut registry),
            Err(TemplateError::Expression { .. })
        ));
    }

    #[test]
    fn unknown_literal_color_keeps_base() {
        let pool = pool();
        let mut registry = StyleRegistry::new();
        let base = registry.get_or_create(CellStyle::new().with_bold(true));
        let column = column(Some("FFEEEE"), Some("red"));
        let mut resolver = StyleResolver::new(&pool);

        let id = resolver.resolve(&column, &sample(base), 0, &Record::new(), &mut registry).unwrap();
        assert_ne!(id, base);
        assert_eq!(registry.get(id).fill, Fill::Solid(Color::new(0xFF, 0xEE, 0xEE)));
        assert_eq!(registry.get(id).font.color, None);

        let only_font = self::column(None, Some("red"));
        assert_eq!(
            resolver.resolve(&only_font, &sample(base), 1, &Record::new(), &mut registry).unwrap(),
            base
        );
    }
}
