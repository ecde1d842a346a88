//! FILENAME: core/template-engine/src/locale.rs
//! PURPOSE: Directive keywords and subtotal function tables per locale.
//! CONTEXT: Templates are authored in one language; the chosen label set is
//! passed into the compiler instead of living in process-wide state.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    English,
    Chinese,
}

impl Locale {
    pub fn labels(self) -> DirectiveLabels {
        match self {
            Locale::English => DirectiveLabels::english(),
            Locale::Chinese => DirectiveLabels::chinese(),
        }
    }
}

/// The kinds of configuration row a template can carry in column A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Header,
    DataField,
    Data,
    BackgroundColor,
    FontColor,
    Subtotal,
}

/// One aggregation offered by subtotal directive rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtotalSpec {
    /// SUBTOTAL function code (9 = SUM, 1 = AVERAGE, ...).
    pub code: u32,
    /// Cell text in a subtotal row that selects this aggregation.
    pub function_label: String,
    /// Appended to the group key on each group row.
    pub group_suffix: String,
    /// Group column text of the grand total row.
    pub total_label: String,
}

impl SubtotalSpec {
    fn new(code: u32, function_label: &str, group_suffix: &str, total_label: &str) -> Self {
        SubtotalSpec {
            code,
            function_label: function_label.to_string(),
            group_suffix: group_suffix.to_string(),
            total_label: total_label.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveLabels {
    pub header: String,
    pub data_field: String,
    pub data: String,
    pub background_color: String,
    pub font_color: String,
    pub subtotal: String,
    /// Marks the group-by column in a subtotal row.
    pub group_marker: String,
    pub subtotals: Vec<SubtotalSpec>,
}

impl DirectiveLabels {
    pub fn english() -> Self {
        DirectiveLabels {
            header: "Header".to_string(),
            data_field: "DataField".to_string(),
            data: "Data".to_string(),
            background_color: "BackgroundColor".to_string(),
            font_color: "FontColor".to_string(),
            subtotal: "Subtotal".to_string(),
            group_marker: "Group".to_string(),
            subtotals: vec![
                SubtotalSpec::new(9, "Sum", "Total", "Grand Total"),
                SubtotalSpec::new(1, "Average", "Average", "Grand Average"),
                SubtotalSpec::new(2, "Count", "Count", "Grand Count"),
                SubtotalSpec::new(4, "Max", "Max", "Grand Max"),
                SubtotalSpec::new(5, "Min", "Min", "Grand Min"),
            ],
        }
    }

    pub fn chinese() -> Self {
        DirectiveLabels {
            header: "表头".to_string(),
            data_field: "数据字段".to_string(),
            data: "数据".to_string(),
            background_color: "背景色".to_string(),
            font_color: "字体色".to_string(),
            subtotal: "分类汇总".to_string(),
            group_marker: "分类".to_string(),
            subtotals: vec![
                SubtotalSpec::new(9, "求和", "汇总", "总计"),
                SubtotalSpec::new(1, "平均值", "平均值", "总平均值"),
                SubtotalSpec::new(2, "计数", "计数", "总计数"),
                SubtotalSpec::new(4, "最大值", "最大值", "总最大值"),
                SubtotalSpec::new(5, "最小值", "最小值", "总最小值"),
            ],
        }
    }

    /// Classifies the first cell of a row. Surrounding whitespace is ignored.
    pub fn directive(&self, text: &str) -> Option<DirectiveKind> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        [
            (&self.header, DirectiveKind::Header),
            (&self.data_field, DirectiveKind::DataField),
            (&self.data, DirectiveKind::Data),
            (&self.background_color, DirectiveKind::BackgroundColor),
            (&self.font_color, DirectiveKind::FontColor),
            (&self.subtotal, DirectiveKind::Subtotal),
        ]
        .into_iter()
        .find(|(label, _)| label.as_str() == text)
        .map(|(_, kind)| kind)
    }

    pub fn subtotal_spec(&self, function_label: &str) -> Option<&SubtotalSpec> {
        self.subtotals
            .iter()
            .find(|spec| spec.function_label == function_label.trim())
    }
}

impl Default for DirectiveLabels {
    fn default() -> Self {
        DirectiveLabels::english()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_directive_keywords() {
        let labels = DirectiveLabels::english();
        assert_eq!(labels.directive("Header"), Some(DirectiveKind::Header));
        assert_eq!(labels.directive(" DataField "), Some(DirectiveKind::DataField));
        assert_eq!(labels.directive("Subtotal"), Some(DirectiveKind::Subtotal));
        assert_eq!(labels.directive("表头"), None);
        assert_eq!(labels.directive(""), None);
        assert_eq!(labels.directive("Notes"), None);
    }

    #[test]
    fn chinese_sum_labels_resolve() {
        let labels = Locale::Chinese.labels();
        assert_eq!(labels.directive("数据字段"), Some(DirectiveKind::DataField));
        let sum = labels.subtotal_spec("求和").unwrap();
        assert_eq!(sum.code, 9);
        assert_eq!(sum.group_suffix, "汇总");
        assert_eq!(sum.total_label, "总计");
    }

    #[test]
    fn locale_deserializes_lowercase() {
        let locale: Locale = serde_json::from_str("\"chinese\"").unwrap();
        assert_eq!(locale, Locale::Chinese);
        assert_eq!(Locale::default(), Locale::English);
    }
}
