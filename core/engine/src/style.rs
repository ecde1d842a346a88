//! FILENAME: core/engine/src/style.rs
//! PURPOSE: Style data structures and the registry that deduplicates them.
//! CONTEXT: Flyweight pattern. Cells store a `style_index` into the shared
//! StyleRegistry instead of a full style. Rendering clones a sample cell's
//! style, changes its fill or font color, and registers the result; identical
//! definitions collapse onto one index.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TextAlign {
    #[default]
    General,
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VerticalAlign {
    Top,
    Middle,
    #[default]
    Bottom,
}

/// RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b, a: 255 }
    }

    pub const fn black() -> Self {
        Color::new(0, 0, 0)
    }

    pub const fn white() -> Self {
        Color::new(255, 255, 255)
    }

    /// Parses "FF0000", "#FF0000" or the spreadsheet ARGB form "FFFF0000"
    /// (alpha first).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range).and_then(|s| u8::from_str_radix(s, 16).ok())
        };
        match hex.len() {
            6 => Some(Color::new(channel(0..2)?, channel(2..4)?, channel(4..6)?)),
            8 => Some(Color {
                a: channel(0..2)?,
                r: channel(2..4)?,
                g: channel(4..6)?,
                b: channel(6..8)?,
            }),
            _ => None,
        }
    }

    /// "RRGGBB", upper-case.
    pub fn to_hex(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// "AARRGGBB", the form stored in workbook styles.
    pub fn to_argb(&self) -> String {
        format!("{:02X}{}", self.a, self.to_hex())
    }

    /// 0xRRGGBB, ignoring alpha.
    pub fn to_rgb_u32(&self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | (self.b as u32)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::black()
    }
}

/// Cell background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Fill {
    #[default]
    None,
    /// A solid pattern fill in one color.
    Solid(Color),
}

/// Line style for borders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BorderLineStyle {
    #[default]
    None,
    Thin,
    Medium,
    Thick,
    Dashed,
    Dotted,
    Double,
}

impl BorderLineStyle {
    /// Maps a `style` attribute from a workbook's border definition.
    pub fn from_ooxml(name: &str) -> Self {
        match name {
            "thin" | "hair" => BorderLineStyle::Thin,
            "medium" | "mediumDashed" | "mediumDashDot" => BorderLineStyle::Medium,
            "thick" => BorderLineStyle::Thick,
            "dashed" | "dashDot" | "dashDotDot" => BorderLineStyle::Dashed,
            "dotted" => BorderLineStyle::Dotted,
            "double" => BorderLineStyle::Double,
            _ => BorderLineStyle::None,
        }
    }
}

/// Border style for a single edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct BorderStyle {
    pub style: BorderLineStyle,
    pub color: Option<Color>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Borders {
    pub top: BorderStyle,
    pub right: BorderStyle,
    pub bottom: BorderStyle,
    pub left: BorderStyle,
}

/// Font configuration. `size_centipoints` keeps fractional sizes such as
/// 10.5pt hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FontStyle {
    pub family: String,
    pub size_centipoints: u32,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    /// `None` means the automatic/theme color.
    pub color: Option<Color>,
}

impl FontStyle {
    pub fn size_points(&self) -> f64 {
        self.size_centipoints as f64 / 100.0
    }

    pub fn set_size_points(&mut self, points: f64) {
        self.size_centipoints = (points * 100.0).round().max(0.0) as u32;
    }
}

impl Default for FontStyle {
    fn default() -> Self {
        FontStyle {
            family: "Calibri".to_string(),
            size_centipoints: 1100,
            bold: false,
            italic: false,
            underline: false,
            strikethrough: false,
            color: None,
        }
    }
}

/// Complete cell style definition, stored once in the StyleRegistry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct CellStyle {
    pub font: FontStyle,
    pub fill: Fill,
    pub text_align: TextAlign,
    pub vertical_align: VerticalAlign,
    pub wrap_text: bool,
    /// Spreadsheet number format code, e.g. `#,##0.00`. `None` is General.
    pub number_format: Option<String>,
    pub borders: Borders,
}

impl CellStyle {
    pub fn new() -> Self {
        CellStyle::default()
    }

    pub fn with_bold(mut self, bold: bool) -> Self {
        self.font.bold = bold;
        self
    }

    pub fn with_italic(mut self, italic: bool) -> Self {
        self.font.italic = italic;
        self
    }

    pub fn with_font_color(mut self, color: Color) -> Self {
        self.font.color = Some(color);
        self
    }

    /// Replaces the fill with a solid pattern fill.
    pub fn with_background(mut self, color: Color) -> Self {
        self.fill = Fill::Solid(color);
        self
    }

    pub fn with_text_align(mut self, align: TextAlign) -> Self {
        self.text_align = align;
        self
    }

    pub fn with_vertical_align(mut self, align: VerticalAlign) -> Self {
        self.vertical_align = align;
        self
    }

    pub fn with_number_format(mut self, format: impl Into<String>) -> Self {
        self.number_format = Some(format.into());
        self
    }

    pub fn with_wrap_text(mut self, wrap: bool) -> Self {
        self.wrap_text = wrap;
        self
    }

    pub fn with_borders(mut self, borders: Borders) -> Self {
        self.borders = borders;
        self
    }
}

/// Stores unique styles and hands out indices for cells to reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleRegistry {
    /// Index 0 is always the default style.
    styles: Vec<CellStyle>,
    #[serde(skip)]
    style_to_index: HashMap<CellStyle, usize>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        let default_style = CellStyle::new();
        let mut style_to_index = HashMap::new();
        style_to_index.insert(default_style.clone(), 0);

        StyleRegistry {
            styles: vec![default_style],
            style_to_index,
        }
    }

    /// Returns the index of an identical style, registering it if unseen.
    pub fn get_or_create(&mut self, style: CellStyle) -> usize {
        if let Some(&index) = self.style_to_index.get(&style) {
            return index;
        }

        let index = self.styles.len();
        self.style_to_index.insert(style.clone(), index);
        self.styles.push(style);
        index
    }

    /// Appends a style without deduplication so that positional ids read
    /// from a file stay stable. Returns its index.
    pub fn push(&mut self, style: CellStyle) -> usize {
        let index = self.styles.len();
        self.style_to_index.entry(style.clone()).or_insert(index);
        self.styles.push(style);
        index
    }

    /// Replaces the default style at index 0 (a file's first cell format).
    pub fn set_default(&mut self, style: CellStyle) {
        self.styles[0] = style;
        self.rebuild_index();
    }

    /// Falls back to the default style when `index` is out of bounds.
    pub fn get(&self, index: usize) -> &CellStyle {
        self.styles.get(index).unwrap_or(&self.styles[0])
    }

    pub fn contains(&self, index: usize) -> bool {
        index < self.styles.len()
    }

    pub fn default_style(&self) -> &CellStyle {
        &self.styles[0]
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    /// True when only the default style is present.
    pub fn is_empty(&self) -> bool {
        self.styles.len() <= 1
    }

    /// Rebuilds the reverse lookup, e.g. after deserialization.
    pub fn rebuild_index(&mut self) {
        self.style_to_index.clear();
        for (index, style) in self.styles.iter().enumerate() {
            self.style_to_index.entry(style.clone()).or_insert(index);
        }
    }

    pub fn all_styles(&self) -> &[CellStyle] {
        &self.styles
    }
}

impl Default for StyleRegistry {
    fn default() -> Self {
        StyleRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_from_hex() {
        let color = Color::from_hex("#FF0000").unwrap();
        assert_eq!((color.r, color.g, color.b, color.a), (255, 0, 0, 255));

        let argb = Color::from_hex("80FFFF00").unwrap();
        assert_eq!((argb.a, argb.r, argb.g, argb.b), (0x80, 255, 255, 0));

        assert_eq!(Color::from_hex("red"), None);
        assert_eq!(Color::from_hex("FFF"), None);
    }

    #[test]
    fn test_color_hex_output() {
        let color = Color::new(0xFF, 0xFF, 0x00);
        assert_eq!(color.to_hex(), "FFFF00");
        assert_eq!(color.to_argb(), "FFFFFF00");
        assert_eq!(color.to_rgb_u32(), 0xFFFF00);
    }

    #[test]
    fn test_style_registry_deduplication() {
        let mut registry = StyleRegistry::new();

        let index1 = registry.get_or_create(CellStyle::new().with_bold(true));
        let index2 = registry.get_or_create(CellStyle::new().with_bold(true));

        assert_eq!(index1, index2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_push_keeps_positional_ids() {
        let mut registry = StyleRegistry::new();
        let a = registry.push(CellStyle::new().with_bold(true));
        let b = registry.push(CellStyle::new().with_bold(true));
        assert_eq!((a, b), (1, 2));
        // Lookups resolve to the first registered copy
        assert_eq!(registry.get_or_create(CellStyle::new().with_bold(true)), 1);
    }

    #[test]
    fn test_background_is_solid_fill() {
        let style = CellStyle::new().with_background(Color::new(1, 2, 3));
        assert_eq!(style.fill, Fill::Solid(Color::new(1, 2, 3)));
    }

    #[test]
    fn test_out_of_range_index_falls_back_to_default() {
        let registry = StyleRegistry::new();
        assert_eq!(registry.get(42), registry.default_style());
        assert!(!registry.contains(1));
    }

    #[test]
    fn test_fractional_font_size() {
        let mut font = FontStyle::default();
        font.set_size_points(10.5);
        assert_eq!(font.size_centipoints, 1050);
        assert_eq!(font.size_points(), 10.5);
    }
}
