//! FILENAME: core/persistence/src/ooxml.rs
//! PURPOSE: Reads the parts of an XLSX package that calamine does not expose.
//! CONTEXT: calamine gives us cell values and formulas. Report templates also
//! depend on merged regions, row heights, column widths and per-cell style
//! ids, and on the style table those ids point into. These are read straight
//! from the worksheet and styles XML with quick-xml.

use crate::PersistenceError;
use engine::coord::{parse_a1, CellRange};
use engine::style::{
    BorderLineStyle, BorderStyle, Borders, CellStyle, Color, Fill, FontStyle, TextAlign,
    VerticalAlign,
};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Seek};
use zip::ZipArchive;

// ============================================================================
// PACKAGE ACCESS
// ============================================================================

pub(crate) fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<Option<String>, PersistenceError> {
    let mut file = match archive.by_name(path) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(PersistenceError::InvalidFormat(format!("{path}: {e}"))),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)?;
    Ok(Some(xml))
}

/// Maps each sheet name to the path of its worksheet part, e.g.
/// `xl/worksheets/sheet1.xml`.
pub(crate) fn sheet_part_paths<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<HashMap<String, String>, PersistenceError> {
    let workbook = read_part(archive, "xl/workbook.xml")?
        .ok_or_else(|| PersistenceError::InvalidFormat("missing xl/workbook.xml".into()))?;
    let rels = read_part(archive, "xl/_rels/workbook.xml.rels")?.unwrap_or_default();

    let mut targets = HashMap::new();
    for_each_element(&rels, |e| {
        if e.name().as_ref() == b"Relationship" {
            if let (Some(id), Some(target)) = (attr(e, b"Id"), attr(e, b"Target")) {
                targets.insert(id, target);
            }
        }
    })?;

    let mut paths = HashMap::new();
    for_each_element(&workbook, |e| {
        if e.name().as_ref() == b"sheet" {
            if let (Some(name), Some(rid)) = (attr(e, b"name"), attr(e, b"r:id")) {
                if let Some(target) = targets.get(&rid) {
                    paths.insert(name, normalize_target(target));
                }
            }
        }
    })?;
    Ok(paths)
}

fn normalize_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

// ============================================================================
// XML HELPERS
// ============================================================================

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| {
            let raw = std::str::from_utf8(&a.value).ok()?;
            unescape(raw).ok().map(|v| v.into_owned())
        })
}

/// `<b/>` and `<b val="1"/>` are on, `<b val="0"/>` is off.
fn flag(e: &BytesStart<'_>) -> bool {
    !matches!(attr(e, b"val").as_deref(), Some("0") | Some("false"))
}

fn num_attr<T: std::str::FromStr>(e: &BytesStart<'_>, key: &[u8]) -> Option<T> {
    attr(e, key).and_then(|v| v.parse().ok())
}

/// Calls `f` for every start and empty element in document order.
fn for_each_element<F>(xml: &str, mut f: F) -> Result<(), PersistenceError>
where
    F: FnMut(&BytesStart<'_>),
{
    walk(xml, |event| {
        if let XmlEvent::Open(e, _) = event {
            f(e);
        }
    })
}

enum XmlEvent<'a, 'b> {
    /// An opening tag; the flag is true for a self-closing element.
    Open(&'a BytesStart<'b>, bool),
    Close(&'a [u8]),
}

fn walk<F>(xml: &str, mut f: F) -> Result<(), PersistenceError>
where
    F: FnMut(XmlEvent<'_, '_>),
{
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => f(XmlEvent::Open(&e, false)),
            Ok(Event::Empty(e)) => {
                f(XmlEvent::Open(&e, true));
                f(XmlEvent::Close(e.name().as_ref()));
            }
            Ok(Event::End(e)) => f(XmlEvent::Close(e.name().as_ref())),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(PersistenceError::InvalidFormat(format!(
                    "XML error at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

// ============================================================================
// WORKSHEET LAYOUT
// ============================================================================

/// Layout and style ids of one worksheet part. Indices are 0-based.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetLayout {
    pub merged_regions: Vec<CellRange>,
    pub row_heights: BTreeMap<u32, f64>,
    pub column_widths: BTreeMap<u32, f64>,
    /// Non-default `s` attributes of `<c>` elements.
    pub style_ids: HashMap<(u32, u32), usize>,
    pub auto_filter: Option<CellRange>,
}

pub fn parse_sheet_layout(xml: &str) -> Result<SheetLayout, PersistenceError> {
    let mut layout = SheetLayout::default();
    for_each_element(xml, |e| match e.name().as_ref() {
        b"mergeCell" => {
            if let Some(range) = attr(e, b"ref").as_deref().and_then(CellRange::parse) {
                layout.merged_regions.push(range);
            }
        }
        b"row" => {
            let custom = attr(e, b"customHeight").is_some_and(|v| v == "1" || v == "true");
            if let (Some(row), Some(height)) = (num_attr::<u32>(e, b"r"), num_attr::<f64>(e, b"ht")) {
                if custom && row > 0 {
                    layout.row_heights.insert(row - 1, height);
                }
            }
        }
        b"col" => {
            if let (Some(min), Some(max), Some(width)) = (
                num_attr::<u32>(e, b"min"),
                num_attr::<u32>(e, b"max"),
                num_attr::<f64>(e, b"width"),
            ) {
                // A trailing <col> often spans every remaining column
                for col in min.max(1)..=max.min(min.max(1) + 255) {
                    layout.column_widths.insert(col - 1, width);
                }
            }
        }
        b"c" => {
            let style = num_attr::<usize>(e, b"s").unwrap_or(0);
            if style != 0 {
                if let Some(coord) = attr(e, b"r").as_deref().and_then(parse_a1) {
                    layout.style_ids.insert(coord, style);
                }
            }
        }
        b"autoFilter" => {
            layout.auto_filter = attr(e, b"ref").as_deref().and_then(CellRange::parse);
        }
        _ => {}
    })?;
    Ok(layout)
}

// ============================================================================
// STYLES
// ============================================================================

/// Number formats every workbook has without declaring them.
fn builtin_number_format(id: u32) -> Option<&'static str> {
    Some(match id {
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        14 => "mm-dd-yy",
        15 => "d-mmm-yy",
        20 => "h:mm",
        22 => "m/d/yy h:mm",
        49 => "@",
        _ => return None,
    })
}

#[derive(Default)]
struct XfRecord {
    num_fmt_id: u32,
    font_id: usize,
    fill_id: usize,
    border_id: usize,
    text_align: TextAlign,
    vertical_align: VerticalAlign,
    wrap_text: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Other,
    Fonts,
    Fills,
    Borders,
    CellXfs,
}

/// Parses `xl/styles.xml` into one CellStyle per `cellXfs` entry, so that a
/// cell's `s` attribute indexes the returned Vec directly.
pub fn parse_styles(xml: &str) -> Result<Vec<CellStyle>, PersistenceError> {
    let mut number_formats: HashMap<u32, String> = HashMap::new();
    let mut fonts: Vec<FontStyle> = Vec::new();
    let mut fills: Vec<Fill> = Vec::new();
    let mut borders: Vec<Borders> = Vec::new();
    let mut xfs: Vec<XfRecord> = Vec::new();

    let mut section = Section::Other;
    let mut font: Option<FontStyle> = None;
    let mut fill: Option<(bool, Fill)> = None;
    let mut border: Option<Borders> = None;
    let mut side: Option<&'static str> = None;
    let mut xf: Option<XfRecord> = None;

    walk(xml, |event| match event {
        XmlEvent::Open(e, _) => match (section, e.name().as_ref()) {
            (_, b"numFmt") => {
                if let (Some(id), Some(code)) = (num_attr::<u32>(e, b"numFmtId"), attr(e, b"formatCode")) {
                    number_formats.insert(id, code);
                }
            }
            (_, b"fonts") => section = Section::Fonts,
            (_, b"fills") => section = Section::Fills,
            (_, b"borders") => section = Section::Borders,
            (_, b"cellXfs") => section = Section::CellXfs,
            (_, b"cellStyleXfs") | (_, b"dxfs") => section = Section::Other,

            (Section::Fonts, b"font") => font = Some(FontStyle::default()),
            (Section::Fonts, tag) => {
                if let Some(font) = font.as_mut() {
                    match tag {
                        b"b" => font.bold = flag(e),
                        b"i" => font.italic = flag(e),
                        b"strike" => font.strikethrough = flag(e),
                        b"u" => font.underline = attr(e, b"val").as_deref() != Some("none"),
                        b"sz" => {
                            if let Some(size) = num_attr::<f64>(e, b"val") {
                                font.set_size_points(size);
                            }
                        }
                        b"name" => {
                            if let Some(name) = attr(e, b"val") {
                                font.family = name;
                            }
                        }
                        b"color" => font.color = attr(e, b"rgb").as_deref().and_then(Color::from_hex),
                        _ => {}
                    }
                }
            }

            (Section::Fills, b"fill") => fill = Some((false, Fill::None)),
            (Section::Fills, b"patternFill") => {
                if let Some(fill) = fill.as_mut() {
                    fill.0 = attr(e, b"patternType").as_deref() == Some("solid");
                }
            }
            (Section::Fills, b"fgColor") => {
                if let Some((true, current)) = fill.as_mut() {
                    if let Some(color) = attr(e, b"rgb").as_deref().and_then(Color::from_hex) {
                        *current = Fill::Solid(color);
                    }
                }
            }

            (Section::Borders, b"border") => border = Some(Borders::default()),
            (Section::Borders, tag @ (b"left" | b"right" | b"top" | b"bottom")) => {
                let name = match tag {
                    b"left" => "left",
                    b"right" => "right",
                    b"top" => "top",
                    _ => "bottom",
                };
                if let Some(edge) = border.as_mut().map(|b| border_edge(b, name)) {
                    edge.style = attr(e, b"style")
                        .as_deref()
                        .map(BorderLineStyle::from_ooxml)
                        .unwrap_or_default();
                    side = Some(name);
                }
            }
            (Section::Borders, b"color") => {
                if let (Some(b), Some(name)) = (border.as_mut(), side) {
                    border_edge(b, name).color = attr(e, b"rgb").as_deref().and_then(Color::from_hex);
                }
            }

            (Section::CellXfs, b"xf") => {
                xf = Some(XfRecord {
                    num_fmt_id: num_attr(e, b"numFmtId").unwrap_or(0),
                    font_id: num_attr(e, b"fontId").unwrap_or(0),
                    fill_id: num_attr(e, b"fillId").unwrap_or(0),
                    border_id: num_attr(e, b"borderId").unwrap_or(0),
                    ..XfRecord::default()
                })
            }
            (Section::CellXfs, b"alignment") => {
                if let Some(xf) = xf.as_mut() {
                    xf.text_align = match attr(e, b"horizontal").as_deref() {
                        Some("left") => TextAlign::Left,
                        Some("center") | Some("centerContinuous") => TextAlign::Center,
                        Some("right") => TextAlign::Right,
                        _ => TextAlign::General,
                    };
                    xf.vertical_align = match attr(e, b"vertical").as_deref() {
                        Some("top") => VerticalAlign::Top,
                        Some("center") => VerticalAlign::Middle,
                        _ => VerticalAlign::Bottom,
                    };
                    xf.wrap_text = attr(e, b"wrapText").is_some_and(|v| v == "1" || v == "true");
                }
            }
            _ => {}
        },
        XmlEvent::Close(tag) => match tag {
            b"font" => fonts.extend(font.take()),
            b"fill" => fills.extend(fill.take().map(|(_, f)| f)),
            b"left" | b"right" | b"top" | b"bottom" => side = None,
            b"border" => borders.extend(border.take()),
            b"xf" => xfs.extend(xf.take()),
            b"fonts" | b"fills" | b"borders" | b"cellXfs" => section = Section::Other,
            _ => {}
        },
    })?;

    Ok(xfs
        .into_iter()
        .map(|xf| CellStyle {
            font: fonts.get(xf.font_id).cloned().unwrap_or_default(),
            fill: fills.get(xf.fill_id).copied().unwrap_or_default(),
            text_align: xf.text_align,
            vertical_align: xf.vertical_align,
            wrap_text: xf.wrap_text,
            number_format: match xf.num_fmt_id {
                0 => None,
                id => number_formats
                    .get(&id)
                    .cloned()
                    .or_else(|| builtin_number_format(id).map(str::to_string)),
            },
            borders: borders.get(xf.border_id).cloned().unwrap_or_default(),
        })
        .collect())
}

fn border_edge<'b>(borders: &'b mut Borders, name: &str) -> &'b mut BorderStyle {
    match name {
        "left" => &mut borders.left,
        "right" => &mut borders.right,
        "top" => &mut borders.top,
        _ => &mut borders.bottom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_layout_reads_merges_heights_and_style_ids() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <cols><col min="2" max="3" width="14.5" customWidth="1"/></cols>
  <sheetData>
    <row r="1"><c r="A1" t="s"><v>0</v></c></row>
    <row r="4" ht="28.5" customHeight="1"><c r="B4" s="3"><v>1</v></c><c r="C4" s="0"/></row>
  </sheetData>
  <autoFilter ref="B3:C9"/>
  <mergeCells count="1"><mergeCell ref="B1:C1"/></mergeCells>
</worksheet>"#;
        let layout = parse_sheet_layout(xml).expect("layout parses");
        assert_eq!(layout.merged_regions, vec![CellRange::new((0, 1), (0, 2))]);
        assert_eq!(layout.row_heights.get(&3), Some(&28.5));
        assert_eq!(layout.column_widths.get(&1), Some(&14.5));
        assert_eq!(layout.column_widths.get(&2), Some(&14.5));
        assert_eq!(layout.style_ids.get(&(3, 1)), Some(&3));
        assert!(!layout.style_ids.contains_key(&(3, 2)));
        assert_eq!(layout.auto_filter, CellRange::parse("B3:C9"));
    }

    #[test]
    fn styles_resolve_fonts_fills_and_formats() {
        let xml = r##"<styleSheet>
  <numFmts count="1"><numFmt numFmtId="164" formatCode="#,##0.000"/></numFmts>
  <fonts count="2">
    <font><sz val="11"/><name val="Calibri"/></font>
    <font><b/><sz val="10.5"/><color rgb="FFFF0000"/><name val="Arial"/></font>
  </fonts>
  <fills count="3">
    <fill><patternFill patternType="none"/></fill>
    <fill><patternFill patternType="gray125"/></fill>
    <fill><patternFill patternType="solid"><fgColor rgb="FFFFFF00"/><bgColor indexed="64"/></patternFill></fill>
  </fills>
  <borders count="2">
    <border><left/><right/><top/><bottom/></border>
    <border><left style="thin"><color rgb="FF000000"/></left><right/><top/><bottom style="double"/></border>
  </borders>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
  <cellXfs count="3">
    <xf numFmtId="0" fontId="0" fillId="0" borderId="0"/>
    <xf numFmtId="164" fontId="1" fillId="2" borderId="1" applyFont="1"><alignment horizontal="center" wrapText="1"/></xf>
    <xf numFmtId="4" fontId="0" fillId="1" borderId="0"/>
  </cellXfs>
</styleSheet>"##;
        let styles = parse_styles(xml).expect("styles parse");
        assert_eq!(styles.len(), 3);
        assert_eq!(styles[0], CellStyle::new());

        let rich = &styles[1];
        assert!(rich.font.bold);
        assert_eq!(rich.font.family, "Arial");
        assert_eq!(rich.font.size_centipoints, 1050);
        assert_eq!(rich.font.color, Some(Color::new(255, 0, 0)));
        assert_eq!(rich.fill, Fill::Solid(Color::new(255, 255, 0)));
        assert_eq!(rich.text_align, TextAlign::Center);
        assert!(rich.wrap_text);
        assert_eq!(rich.number_format.as_deref(), Some("#,##0.000"));
        assert_eq!(rich.borders.left.style, BorderLineStyle::Thin);
        assert_eq!(rich.borders.left.color, Some(Color::black()));
        assert_eq!(rich.borders.bottom.style, BorderLineStyle::Double);

        assert_eq!(styles[2].number_format.as_deref(), Some("#,##0.00"));
        assert_eq!(styles[2].fill, Fill::None);
    }

    #[test]
    fn escaped_attribute_values_are_unescaped() {
        let xml = r##"<styleSheet>
  <numFmts count="1"><numFmt numFmtId="165" formatCode="0.0&quot; kg&quot;"/></numFmts>
  <fonts count="1"><font><name val="Tom &amp; Jerry"/></font></fonts>
  <cellXfs count="1"><xf numFmtId="165" fontId="0" fillId="0" borderId="0"/></cellXfs>
</styleSheet>"##;
        let styles = parse_styles(xml).expect("styles parse");
        assert_eq!(styles[0].font.family, "Tom & Jerry");
        assert_eq!(styles[0].number_format.as_deref(), Some("0.0\" kg\""));
    }
}
