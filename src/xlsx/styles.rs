//! `styles.xml` 解析：把 `cellXfs` 的每一项展开为 `StyleSnapshot`

// 标准库导入
use std::collections::HashMap;

// 第三方crate导入
use anyhow::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

// 本地模块导入
use super::{attr_value, local_name};
use crate::workbook::{Alignment, Border, BorderEdge, Fill, Font, StyleSnapshot};

/// 内置数字格式
pub fn builtin_number_format(id: u32) -> Option<&'static str> {
    let code = match id {
        0 => "General",
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        12 => "# ?/?",
        13 => "# ??/??",
        14 => "mm-dd-yy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yy h:mm",
        37 => "#,##0 ;(#,##0)",
        38 => "#,##0 ;[Red](#,##0)",
        39 => "#,##0.00;(#,##0.00)",
        40 => "#,##0.00;[Red](#,##0.00)",
        45 => "mm:ss",
        46 => "[h]:mm:ss",
        47 => "mmss.0",
        48 => "##0.0E+0",
        49 => "@",
        _ => return None,
    };
    Some(code)
}

/// 解析后的样式表
#[derive(Debug, Clone, Default)]
pub struct StyleTable {
    cell_styles: Vec<StyleSnapshot>,
}

impl StyleTable {
    /// 按 `s` 属性取样式，越界时回退到默认样式
    pub fn cell_style(&self, index: usize) -> StyleSnapshot {
        self.cell_styles
            .get(index)
            .or_else(|| self.cell_styles.first())
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.cell_styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cell_styles.is_empty()
    }
}

#[derive(Debug, Default)]
struct CellXf {
    num_fmt_id: u32,
    font_id: usize,
    fill_id: usize,
    border_id: usize,
    alignment: Alignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    NumFmts,
    Fonts,
    Fills,
    Borders,
    CellXfs,
    Other,
}

/// 解析 styles.xml
pub fn parse_styles(xml: &[u8]) -> Result<StyleTable> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut num_fmts: HashMap<u32, String> = HashMap::new();
    let mut fonts: Vec<Font> = Vec::new();
    let mut fills: Vec<Fill> = Vec::new();
    let mut borders: Vec<Border> = Vec::new();
    let mut xfs: Vec<CellXf> = Vec::new();

    let mut section = Section::Other;
    let mut depth_in_section = 0usize;

    let mut font: Option<Font> = None;
    let mut fill: Option<Fill> = None;
    let mut border: Option<Border> = None;
    let mut edge: Option<&'static str> = None;
    let mut xf: Option<CellXf> = None;

    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf)?;
        let is_empty = matches!(event, Event::Empty(_));
        match event {
            Event::Start(e) | Event::Empty(e) if section == Section::Other => {
                let entered = match local_name(e.name().as_ref()) {
                    b"numFmts" => Section::NumFmts,
                    b"fonts" => Section::Fonts,
                    b"fills" => Section::Fills,
                    b"borders" => Section::Borders,
                    b"cellXfs" => Section::CellXfs,
                    _ => Section::Other,
                };
                if !is_empty && entered != Section::Other {
                    section = entered;
                    depth_in_section = 0;
                }
            }
            Event::Start(e) | Event::Empty(e) => {
                if !is_empty {
                    depth_in_section += 1;
                }
                let name = local_name(e.name().as_ref()).to_vec();
                match (section, name.as_slice()) {
                    (Section::NumFmts, b"numFmt") => {
                        let id = attr_value(&e, b"numFmtId")?.and_then(|v| v.parse().ok());
                        let code = attr_value(&e, b"formatCode")?;
                        if let (Some(id), Some(code)) = (id, code) {
                            num_fmts.insert(id, code);
                        }
                    }
                    (Section::Fonts, b"font") => {
                        if is_empty {
                            fonts.push(Font::default());
                        } else {
                            font = Some(Font::default());
                        }
                    }
                    (Section::Fonts, _) => {
                        if let Some(font) = font.as_mut() {
                            apply_font_property(font, &name, &e)?;
                        }
                    }
                    (Section::Fills, b"fill") => {
                        if is_empty {
                            fills.push(Fill::default());
                        } else {
                            fill = Some(Fill::default());
                        }
                    }
                    (Section::Fills, _) => {
                        if let Some(fill) = fill.as_mut() {
                            apply_fill_property(fill, &name, &e)?;
                        }
                    }
                    (Section::Borders, b"border") => {
                        if is_empty {
                            borders.push(Border::default());
                        } else {
                            border = Some(Border::default());
                        }
                    }
                    (Section::Borders, b"color") => {
                        if let (Some(border), Some(side)) = (border.as_mut(), edge) {
                            if let Some(target) = border_edge_mut(border, side) {
                                target.color = parse_color(&e)?;
                            }
                        }
                    }
                    (Section::Borders, side) => {
                        if let (Some(border), Some(side)) = (border.as_mut(), edge_name(side)) {
                            if let Some(target) = border_edge_mut(border, side) {
                                target.style = attr_value(&e, b"style")?;
                            }
                            if !is_empty {
                                edge = Some(side);
                            }
                        }
                    }
                    (Section::CellXfs, b"xf") => {
                        let parsed = parse_xf(&e)?;
                        if is_empty {
                            xfs.push(parsed);
                        } else {
                            xf = Some(parsed);
                        }
                    }
                    (Section::CellXfs, b"alignment") => {
                        if let Some(xf) = xf.as_mut() {
                            xf.alignment = parse_alignment(&e)?;
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                let qname = e.name();
                let name = local_name(qname.as_ref());
                if section != Section::Other && depth_in_section == 0 {
                    section = Section::Other;
                } else if section != Section::Other {
                    depth_in_section -= 1;
                    match (section, name) {
                        (Section::Fonts, b"font") => fonts.extend(font.take()),
                        (Section::Fills, b"fill") => fills.extend(fill.take()),
                        (Section::Borders, b"border") => {
                            borders.extend(border.take());
                            edge = None;
                        }
                        (Section::Borders, side) if edge_name(side).is_some() => edge = None,
                        (Section::CellXfs, b"xf") => xfs.extend(xf.take()),
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let cell_styles = xfs
        .into_iter()
        .map(|xf| StyleSnapshot {
            font: fonts.get(xf.font_id).cloned().unwrap_or_default(),
            fill: fills.get(xf.fill_id).cloned().unwrap_or_default(),
            border: borders.get(xf.border_id).cloned().unwrap_or_default(),
            alignment: xf.alignment,
            number_format: num_fmts
                .get(&xf.num_fmt_id)
                .cloned()
                .or_else(|| builtin_number_format(xf.num_fmt_id).map(str::to_string))
                .unwrap_or_else(|| format!("builtin:{}", xf.num_fmt_id)),
        })
        .collect();

    Ok(StyleTable { cell_styles })
}

fn apply_font_property(font: &mut Font, name: &[u8], e: &BytesStart<'_>) -> Result<()> {
    match name {
        b"b" => font.bold = flag(e)?,
        b"i" => font.italic = flag(e)?,
        b"strike" => font.strike = flag(e)?,
        b"u" => {
            font.underline = Some(attr_value(e, b"val")?.unwrap_or_else(|| "single".to_string()))
        }
        b"sz" => font.size = attr_value(e, b"val")?,
        b"name" | b"rFont" => font.name = attr_value(e, b"val")?,
        b"color" => font.color = parse_color(e)?,
        _ => {}
    }
    Ok(())
}

fn apply_fill_property(fill: &mut Fill, name: &[u8], e: &BytesStart<'_>) -> Result<()> {
    match name {
        b"patternFill" => fill.pattern = attr_value(e, b"patternType")?,
        b"gradientFill" => fill.pattern = Some("gradient".to_string()),
        b"fgColor" => fill.fg_color = parse_color(e)?,
        b"bgColor" => fill.bg_color = parse_color(e)?,
        _ => {}
    }
    Ok(())
}

fn edge_name(name: &[u8]) -> Option<&'static str> {
    match name {
        b"left" | b"start" => Some("left"),
        b"right" | b"end" => Some("right"),
        b"top" => Some("top"),
        b"bottom" => Some("bottom"),
        b"diagonal" => Some("diagonal"),
        _ => None,
    }
}

fn border_edge_mut<'a>(border: &'a mut Border, side: &str) -> Option<&'a mut BorderEdge> {
    match side {
        "left" => Some(&mut border.left),
        "right" => Some(&mut border.right),
        "top" => Some(&mut border.top),
        "bottom" => Some(&mut border.bottom),
        "diagonal" => Some(&mut border.diagonal),
        _ => None,
    }
}

fn parse_xf(e: &BytesStart<'_>) -> Result<CellXf> {
    let number = |key: &[u8]| -> Result<Option<u32>> {
        Ok(attr_value(e, key)?.and_then(|v| v.trim().parse().ok()))
    };
    Ok(CellXf {
        num_fmt_id: number(b"numFmtId")?.unwrap_or(0),
        font_id: number(b"fontId")?.unwrap_or(0) as usize,
        fill_id: number(b"fillId")?.unwrap_or(0) as usize,
        border_id: number(b"borderId")?.unwrap_or(0) as usize,
        alignment: Alignment::default(),
    })
}

fn parse_alignment(e: &BytesStart<'_>) -> Result<Alignment> {
    Ok(Alignment {
        horizontal: attr_value(e, b"horizontal")?,
        vertical: attr_value(e, b"vertical")?,
        wrap_text: attr_value(e, b"wrapText")?.map(|v| truthy(&v)).unwrap_or(false),
        shrink_to_fit: attr_value(e, b"shrinkToFit")?
            .map(|v| truthy(&v))
            .unwrap_or(false),
        indent: attr_value(e, b"indent")?.and_then(|v| v.parse().ok()),
        text_rotation: attr_value(e, b"textRotation")?.and_then(|v| v.parse().ok()),
    })
}

/// 颜色描述：`FFRRGGBB`、`theme:4;tint=-0.25`、`indexed:64`、`auto`
fn parse_color(e: &BytesStart<'_>) -> Result<Option<String>> {
    if let Some(rgb) = attr_value(e, b"rgb")? {
        return Ok(Some(rgb.to_ascii_uppercase()));
    }
    if let Some(theme) = attr_value(e, b"theme")? {
        let mut color = format!("theme:{}", theme);
        if let Some(tint) = attr_value(e, b"tint")? {
            color.push_str(&format!(";tint={}", tint));
        }
        return Ok(Some(color));
    }
    if let Some(indexed) = attr_value(e, b"indexed")? {
        return Ok(Some(format!("indexed:{}", indexed)));
    }
    if attr_value(e, b"auto")?.map(|v| truthy(&v)).unwrap_or(false) {
        return Ok(Some("auto".to_string()));
    }
    Ok(None)
}

/// `<b/>` 为真，`<b val="0"/>` 为假
fn flag(e: &BytesStart<'_>) -> Result<bool> {
    Ok(attr_value(e, b"val")?.map(|v| truthy(&v)).unwrap_or(true))
}

fn truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
