//! FILENAME: core/persistence/src/xlsx_writer.rs

use crate::PersistenceError;
use engine::cell::{Cell, CellValue};
use engine::style::{BorderLineStyle, BorderStyle, CellStyle, Color, Fill, TextAlign, VerticalAlign};
use engine::workbook::{Workbook, Worksheet};
use rust_xlsxwriter::{
    Format, FormatAlign, FormatBorder, FormatPattern, FormatUnderline, Formula,
    Workbook as XlsxWorkbook, Worksheet as XlsxWorksheet,
};
use std::path::Path;

pub fn save_xlsx(workbook: &Workbook, path: &Path) -> Result<(), PersistenceError> {
    let mut xlsx = XlsxWorkbook::new();

    // One Format per registered style, indexed like the registry
    let formats: Vec<Format> = workbook
        .styles
        .all_styles()
        .iter()
        .map(convert_style_to_format)
        .collect();

    for sheet in &workbook.sheets {
        let worksheet = xlsx.add_worksheet();
        worksheet.set_name(&sheet.name)?;
        write_sheet(worksheet, sheet, &formats)?;
    }

    xlsx.save(path)?;
    Ok(())
}

fn write_sheet(
    worksheet: &mut XlsxWorksheet,
    sheet: &Worksheet,
    formats: &[Format],
) -> Result<(), PersistenceError> {
    let format_for = |index: usize| formats.get(index).unwrap_or(&formats[0]);

    for (col, width) in &sheet.column_widths {
        worksheet.set_column_width(*col as u16, *width)?;
    }
    for (row, height) in &sheet.row_heights {
        worksheet.set_row_height(*row, *height)?;
    }

    // Merges first: the anchor cell is written over afterwards
    for region in sheet.merged_regions() {
        if region.is_single_cell() {
            continue;
        }
        let anchor_style = sheet.style_index(region.start_row, region.start_col);
        worksheet.merge_range(
            region.start_row,
            region.start_col as u16,
            region.end_row,
            region.end_col as u16,
            "",
            format_for(anchor_style),
        )?;
    }

    for (row, col) in sheet.grid.sorted_positions() {
        let Some(cell) = sheet.grid.get_cell(row, col) else { continue };
        write_cell(worksheet, row, col as u16, cell, format_for(cell.style_index))?;
    }

    if let Some(filter) = sheet.auto_filter {
        worksheet.autofilter(
            filter.start_row,
            filter.start_col as u16,
            filter.end_row,
            filter.end_col as u16,
        )?;
    }
    Ok(())
}

fn write_cell(
    worksheet: &mut XlsxWorksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    format: &Format,
) -> Result<(), PersistenceError> {
    if let Some(formula) = &cell.formula {
        let text = formula.strip_prefix('=').unwrap_or(formula);
        let mut formula = Formula::new(text);
        if !cell.value.is_empty() {
            formula = formula.set_result(cell.display_value());
        }
        worksheet.write_formula_with_format(row, col, formula, format)?;
        return Ok(());
    }

    match &cell.value {
        CellValue::Empty => {
            worksheet.write_blank(row, col, format)?;
        }
        CellValue::Number(n) => {
            worksheet.write_number_with_format(row, col, *n, format)?;
        }
        CellValue::Text(s) => {
            worksheet.write_string_with_format(row, col, s, format)?;
        }
        CellValue::Boolean(b) => {
            worksheet.write_boolean_with_format(row, col, *b, format)?;
        }
        CellValue::Error(e) => {
            worksheet.write_string_with_format(row, col, e.code(), format)?;
        }
    }
    Ok(())
}

fn convert_style_to_format(style: &CellStyle) -> Format {
    let mut format = Format::new();

    // Font settings
    if style.font.bold {
        format = format.set_bold();
    }
    if style.font.italic {
        format = format.set_italic();
    }
    if style.font.underline {
        format = format.set_underline(FormatUnderline::Single);
    }
    if style.font.strikethrough {
        format = format.set_font_strikethrough();
    }
    format = format.set_font_size(style.font.size_points());
    format = format.set_font_name(&style.font.family);
    if let Some(color) = style.font.color {
        format = format.set_font_color(color_to_xlsx(&color));
    }

    if let Fill::Solid(color) = style.fill {
        format = format
            .set_pattern(FormatPattern::Solid)
            .set_background_color(color_to_xlsx(&color));
    }

    format = match style.text_align {
        TextAlign::General => format,
        TextAlign::Left => format.set_align(FormatAlign::Left),
        TextAlign::Center => format.set_align(FormatAlign::Center),
        TextAlign::Right => format.set_align(FormatAlign::Right),
    };
    format = match style.vertical_align {
        VerticalAlign::Top => format.set_align(FormatAlign::Top),
        VerticalAlign::Middle => format.set_align(FormatAlign::VerticalCenter),
        VerticalAlign::Bottom => format,
    };

    if style.wrap_text {
        format = format.set_text_wrap();
    }
    if let Some(num_format) = &style.number_format {
        format = format.set_num_format(num_format);
    }

    let borders = &style.borders;
    if let Some((line, color)) = convert_border(&borders.top) {
        format = format.set_border_top(line);
        if let Some(color) = color {
            format = format.set_border_top_color(color);
        }
    }
    if let Some((line, color)) = convert_border(&borders.bottom) {
        format = format.set_border_bottom(line);
        if let Some(color) = color {
            format = format.set_border_bottom_color(color);
        }
    }
    if let Some((line, color)) = convert_border(&borders.left) {
        format = format.set_border_left(line);
        if let Some(color) = color {
            format = format.set_border_left_color(color);
        }
    }
    if let Some((line, color)) = convert_border(&borders.right) {
        format = format.set_border_right(line);
        if let Some(color) = color {
            format = format.set_border_right_color(color);
        }
    }

    format
}

fn convert_border(border: &BorderStyle) -> Option<(FormatBorder, Option<rust_xlsxwriter::Color>)> {
    let line = match border.style {
        BorderLineStyle::None => return None,
        BorderLineStyle::Thin => FormatBorder::Thin,
        BorderLineStyle::Medium => FormatBorder::Medium,
        BorderLineStyle::Thick => FormatBorder::Thick,
        BorderLineStyle::Dashed => FormatBorder::Dashed,
        BorderLineStyle::Dotted => FormatBorder::Dotted,
        BorderLineStyle::Double => FormatBorder::Double,
    };
    Some((line, border.color.as_ref().map(color_to_xlsx)))
}

fn color_to_xlsx(color: &Color) -> rust_xlsxwriter::Color {
    rust_xlsxwriter::Color::RGB(color.to_rgb_u32())
}
