//! 工作簿部件解析：关系、工作表列表、共享字符串和单元格

// 第三方crate导入
use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

// 本地模块导入
use super::styles::StyleTable;
use super::{attr_value, local_name, read_text};
use crate::workbook::{Cell, CellRef, CellValue, Sheet};

/// 关系类型后缀
pub const REL_OFFICE_DOCUMENT: &str = "/officeDocument";
pub const REL_WORKSHEET: &str = "/worksheet";
pub const REL_SHARED_STRINGS: &str = "/sharedStrings";
pub const REL_STYLES: &str = "/styles";

/// `.rels` 中的一条关系
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

/// 工作簿中声明的工作表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub rel_id: String,
}

/// 行列位置推算
///
/// 没有 `r` 属性的行和单元格按前一个位置顺延。读取与写回必须使用同一套规则。
#[derive(Debug, Default)]
pub struct PositionTracker {
    row: u32,
    col: u32,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_row(&mut self, row: Option<u32>) {
        self.row = match row {
            Some(row) if row > 0 => row,
            _ => self.row + 1,
        };
        self.col = 0;
    }

    pub fn next_cell(&mut self, reference: Option<CellRef>) -> CellRef {
        let at = reference.unwrap_or_else(|| CellRef::new(self.row.max(1), self.col + 1));
        self.row = at.row;
        self.col = at.col;
        at
    }
}

/// `<row r="..">` 的行号
pub fn row_number(e: &BytesStart<'_>) -> Result<Option<u32>> {
    Ok(attr_value(e, b"r")?.and_then(|v| v.trim().parse().ok()))
}

/// `<c r="..">` 的坐标，无效引用按缺省处理
pub fn cell_reference(e: &BytesStart<'_>) -> Result<Option<CellRef>> {
    Ok(attr_value(e, b"r")?.and_then(|v| CellRef::from_a1(&v).ok()))
}

/// 部件对应的关系文件路径：`xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`
pub fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// 把关系目标解析为包内绝对部件名
pub fn resolve_target(base_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = match base_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').filter(|s| !s.is_empty()).collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

pub fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut rels = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e)
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                let Some(id) = attr_value(&e, b"Id")? else {
                    continue;
                };
                rels.push(Relationship {
                    id,
                    rel_type: attr_value(&e, b"Type")?.unwrap_or_default(),
                    target: attr_value(&e, b"Target")?.unwrap_or_default(),
                    external: attr_value(&e, b"TargetMode")?
                        .map(|mode| mode.eq_ignore_ascii_case("External"))
                        .unwrap_or(false),
                });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// 按文档顺序列出 `<sheets>` 下的工作表
pub fn parse_workbook_sheets(xml: &[u8]) -> Result<Vec<SheetEntry>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut sheets = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"sheet" => {
                let name = attr_value(&e, b"name")?.context("工作表缺少 name 属性")?;
                let rel_id = attr_value(&e, b"id")?
                    .with_context(|| format!("工作表 '{}' 缺少 r:id 属性", name))?;
                sheets.push(SheetEntry { name, rel_id });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

/// 解析共享字符串表，富文本各段拼接，注音文本忽略
pub fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut items = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"si" => {
                items.push(read_rich_text(&mut reader, b"si")?);
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"si" => {
                items.push(String::new());
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(items)
}

/// 读取 `<si>` 或 `<is>` 的可见文本
fn read_rich_text(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<String> {
    let mut text = String::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"t" => text.push_str(&read_text(reader, b"t")?),
                b"r" => {}
                _ => {
                    reader.read_to_end_into(e.name(), &mut Vec::new())?;
                }
            },
            Event::End(e) if local_name(e.name().as_ref()) == end => break,
            Event::Eof => bail!("富文本未闭合"),
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

/// `<c>` 的子元素内容
#[derive(Debug, Default)]
struct CellBody {
    formula: Option<FormulaPart>,
    value: Option<String>,
    inline: Option<String>,
}

#[derive(Debug)]
struct FormulaPart {
    text: String,
    kind: Option<String>,
}

fn read_cell_body(reader: &mut Reader<&[u8]>) -> Result<CellBody> {
    let mut body = CellBody::default();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"f" => {
                    let kind = attr_value(&e, b"t")?;
                    let text = read_text(reader, b"f")?;
                    body.formula = Some(FormulaPart { text, kind });
                }
                b"v" => body.value = Some(read_text(reader, b"v")?),
                b"is" => body.inline = Some(read_rich_text(reader, b"is")?),
                _ => {
                    reader.read_to_end_into(e.name(), &mut Vec::new())?;
                }
            },
            Event::Empty(e) if local_name(e.name().as_ref()) == b"f" => {
                body.formula = Some(FormulaPart {
                    text: String::new(),
                    kind: attr_value(&e, b"t")?,
                });
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"c" => break,
            Event::Eof => bail!("单元格未闭合"),
            _ => {}
        }
        buf.clear();
    }
    Ok(body)
}

/// 把单元格原始内容映射为模型值
fn resolve_value(cell_type: Option<&str>, body: CellBody, shared: &[String]) -> Result<CellValue> {
    let mut has_formula = false;
    if let Some(formula) = &body.formula {
        has_formula = true;
        let special = matches!(formula.kind.as_deref(), Some("array") | Some("dataTable"));
        if !special && !formula.text.trim().is_empty() {
            return Ok(CellValue::Formula(format!("={}", formula.text)));
        }
    }

    let text_value = |text: String| {
        if text.is_empty() {
            CellValue::Empty
        } else if has_formula {
            CellValue::Computed(text)
        } else {
            CellValue::PlainText(text)
        }
    };

    let value = match cell_type.unwrap_or("n") {
        "s" => {
            let Some(raw) = body.value else {
                return Ok(CellValue::Empty);
            };
            let index: usize = raw
                .trim()
                .parse()
                .with_context(|| format!("无效的共享字符串索引: {}", raw))?;
            let text = shared
                .get(index)
                .with_context(|| format!("共享字符串索引越界: {}", index))?;
            text_value(text.clone())
        }
        "inlineStr" => text_value(body.inline.unwrap_or_default()),
        "str" => text_value(body.value.unwrap_or_default()),
        "b" => match body.value {
            Some(v) => CellValue::Boolean(v.trim() == "1"),
            None => CellValue::Empty,
        },
        "e" | "d" => match body.value {
            Some(v) => CellValue::Computed(v),
            None => CellValue::Empty,
        },
        _ => match body.value {
            Some(v) => match v.trim().parse::<f64>() {
                Ok(number) => CellValue::Number(number),
                Err(_) => CellValue::Computed(v),
            },
            None => CellValue::Empty,
        },
    };
    Ok(value)
}

/// 解析工作表的单元格网格
pub fn parse_worksheet(
    xml: &[u8],
    name: &str,
    shared: &[String],
    styles: &StyleTable,
) -> Result<Sheet> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut sheet = Sheet::new(name);
    let mut tracker = PositionTracker::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                tracker.enter_row(row_number(&e)?);
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"c" => {
                let at = tracker.next_cell(cell_reference(&e)?);
                let cell_type = attr_value(&e, b"t")?;
                let style = style_index(&e)?;
                let body = read_cell_body(&mut reader)?;
                let value = resolve_value(cell_type.as_deref(), body, shared)
                    .with_context(|| format!("工作表 '{}' 单元格 {}", name, at))?;
                sheet.insert(at, Cell::new(value).with_style(styles.cell_style(style)));
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => {
                let at = tracker.next_cell(cell_reference(&e)?);
                let style = style_index(&e)?;
                sheet.insert(
                    at,
                    Cell::new(CellValue::Empty).with_style(styles.cell_style(style)),
                );
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(sheet)
}

fn style_index(e: &BytesStart<'_>) -> Result<usize> {
    Ok(attr_value(e, b"s")?
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0))
}
