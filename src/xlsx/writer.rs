//! 工作表与工作簿部件的流式修补
//!
//! 未改动的事件原样透传，只有改动过的 `<c>` 被整体重写。

// 标准库导入
use std::collections::BTreeMap;

// 第三方crate导入
use anyhow::{bail, ensure, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

// 本地模块导入
use super::local_name;
use super::reader::{cell_reference, row_number, PositionTracker};
use crate::workbook::{CellRef, CellValue, FORMULA_SENTINEL};

/// 在 `<calcPr>` 之后出现的工作簿子元素
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

/// 转义元素文本
pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// 转义属性值
pub fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

/// 首尾空白或换行需要 `xml:space="preserve"`
pub fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) || text.contains('\n')
}

/// 修补工作表中改动过的单元格
///
/// 返回新的部件内容，以及是否写入了公式。
pub fn patch_worksheet(
    original: &[u8],
    changes: &BTreeMap<CellRef, CellValue>,
) -> Result<(Vec<u8>, bool)> {
    let mut reader = Reader::from_reader(original);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(original.len() + changes.len() * 64));

    let mut tracker = PositionTracker::new();
    let mut applied = 0usize;
    let mut formula_written = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"row" => {
                tracker.enter_row(row_number(&e)?);
                writer.write_event(Event::Start(e.into_owned()))?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                tracker.enter_row(row_number(&e)?);
                writer.write_event(Event::Empty(e.into_owned()))?;
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"c" => {
                let at = tracker.next_cell(cell_reference(&e)?);
                match changes.get(&at) {
                    Some(value) => {
                        let cell_start = e.into_owned();
                        let formula_start = skip_cell_body(&mut reader)?;
                        let xml = render_cell(&cell_start, value, formula_start.as_ref())?;
                        writer.get_mut().extend_from_slice(xml.as_bytes());
                        applied += 1;
                        formula_written |= value.is_formula();
                    }
                    None => writer.write_event(Event::Start(e.into_owned()))?,
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => {
                let at = tracker.next_cell(cell_reference(&e)?);
                match changes.get(&at) {
                    Some(value) => {
                        let xml = render_cell(&e, value, None)?;
                        writer.get_mut().extend_from_slice(xml.as_bytes());
                        applied += 1;
                        formula_written |= value.is_formula();
                    }
                    None => writer.write_event(Event::Empty(e.into_owned()))?,
                }
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    ensure!(
        applied == changes.len(),
        "有 {} 个改动的单元格在工作表中找不到",
        changes.len() - applied
    );
    Ok((writer.into_inner(), formula_written))
}

/// 跳过 `<c>` 的子元素，返回其中 `<f>` 的起始标签
fn skip_cell_body(reader: &mut Reader<&[u8]>) -> Result<Option<BytesStart<'static>>> {
    let mut formula = None;
    let mut depth = 0usize;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if depth == 0 && local_name(e.name().as_ref()) == b"f" {
                    formula = Some(e.into_owned());
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 0 && local_name(e.name().as_ref()) == b"f" {
                    formula = Some(e.into_owned());
                }
            }
            Event::End(_) if depth > 0 => depth -= 1,
            Event::End(_) => break,
            Event::Eof => bail!("单元格未闭合"),
            _ => {}
        }
        buf.clear();
    }
    Ok(formula)
}

/// 拼出带命名空间前缀的子元素名
fn child_name(parent: &[u8], local: &str) -> String {
    match parent.iter().rposition(|&b| b == b':') {
        Some(idx) => format!("{}{}", String::from_utf8_lossy(&parent[..=idx]), local),
        None => local.to_string(),
    }
}

/// 复制起始标签的属性，跳过 `skip` 中列出的键
fn push_attributes(out: &mut String, start: &BytesStart<'_>, skip: &[&[u8]]) -> Result<()> {
    for attr in start.attributes().with_checks(false) {
        let attr = attr?;
        let key = attr.key.as_ref();
        if skip.contains(&key) {
            continue;
        }
        let value = attr.unescape_value()?;
        out.push(' ');
        out.push_str(&String::from_utf8_lossy(key));
        out.push_str("=\"");
        out.push_str(&escape_attr(&value));
        out.push('"');
    }
    Ok(())
}

/// 重写一个单元格
///
/// 除 `t` 外的属性全部保留，样式索引 `s` 因而不变。
/// 文本写成内联字符串；公式沿用原 `<f>` 的属性并丢弃缓存值。
fn render_cell(
    cell_start: &BytesStart<'_>,
    value: &CellValue,
    formula_start: Option<&BytesStart<'static>>,
) -> Result<String> {
    let qname = cell_start.name();
    let tag = String::from_utf8_lossy(qname.as_ref()).into_owned();

    let mut out = String::new();
    out.push('<');
    out.push_str(&tag);
    push_attributes(&mut out, cell_start, &[b"t"])?;

    match value {
        CellValue::PlainText(text) => {
            let is_tag = child_name(qname.as_ref(), "is");
            let t_tag = child_name(qname.as_ref(), "t");
            out.push_str(" t=\"inlineStr\"><");
            out.push_str(&is_tag);
            out.push_str("><");
            out.push_str(&t_tag);
            if needs_space_preserve(text) {
                out.push_str(" xml:space=\"preserve\"");
            }
            out.push('>');
            out.push_str(&escape_text(text));
            out.push_str(&format!("</{}></{}>", t_tag, is_tag));
        }
        CellValue::Formula(formula) => {
            let f_tag = child_name(qname.as_ref(), "f");
            let body = formula.strip_prefix(FORMULA_SENTINEL).unwrap_or(formula);
            out.push_str("><");
            out.push_str(&f_tag);
            if let Some(start) = formula_start {
                push_attributes(&mut out, start, &[])?;
            }
            out.push('>');
            out.push_str(&escape_text(body));
            out.push_str(&format!("</{}>", f_tag));
        }
        other => bail!("不支持写回的单元格值: {:?}", other),
    }

    out.push_str(&format!("</{}>", tag));
    Ok(out)
}

/// 确保工作簿在打开时重新计算全部公式
pub fn ensure_full_calc_on_load(workbook_xml: &[u8]) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(workbook_xml.len() + 32));

    let mut depth = 0usize;
    let mut workbook_tag: Vec<u8> = Vec::new();
    let mut calc_pr_done = false;
    let mut skipping_calc_pr = false;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(e) if local_name(e.name().as_ref()) == b"calcPr" => {
                let xml = render_calc_pr(&e)?;
                writer.get_mut().extend_from_slice(xml.as_bytes());
                calc_pr_done = true;
                skipping_calc_pr = true;
            }
            Event::End(e) if skipping_calc_pr && local_name(e.name().as_ref()) == b"calcPr" => {
                skipping_calc_pr = false;
            }
            _ if skipping_calc_pr => {}
            Event::Empty(e) if local_name(e.name().as_ref()) == b"calcPr" => {
                let xml = render_calc_pr(&e)?;
                writer.get_mut().extend_from_slice(xml.as_bytes());
                calc_pr_done = true;
            }
            Event::Start(e) => {
                if depth == 0 {
                    workbook_tag = e.name().as_ref().to_vec();
                } else if depth == 1
                    && !calc_pr_done
                    && AFTER_CALC_PR.contains(&local_name(e.name().as_ref()))
                {
                    insert_calc_pr(&mut writer, &workbook_tag);
                    calc_pr_done = true;
                }
                depth += 1;
                writer.write_event(Event::Start(e.into_owned()))?;
            }
            Event::Empty(e) => {
                if depth == 1
                    && !calc_pr_done
                    && AFTER_CALC_PR.contains(&local_name(e.name().as_ref()))
                {
                    insert_calc_pr(&mut writer, &workbook_tag);
                    calc_pr_done = true;
                }
                writer.write_event(Event::Empty(e.into_owned()))?;
            }
            Event::End(e) => {
                if depth == 1 && !calc_pr_done {
                    insert_calc_pr(&mut writer, &workbook_tag);
                    calc_pr_done = true;
                }
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    ensure!(calc_pr_done, "工作簿部件中没有 <workbook> 元素");
    Ok(writer.into_inner())
}

fn insert_calc_pr(writer: &mut Writer<Vec<u8>>, workbook_tag: &[u8]) {
    let tag = child_name(workbook_tag, "calcPr");
    writer
        .get_mut()
        .extend_from_slice(format!("<{} fullCalcOnLoad=\"1\"/>", tag).as_bytes());
}

fn render_calc_pr(start: &BytesStart<'_>) -> Result<String> {
    let qname = start.name();
    let mut out = format!("<{}", String::from_utf8_lossy(qname.as_ref()));
    push_attributes(&mut out, start, &[b"fullCalcOnLoad"])?;
    out.push_str(" fullCalcOnLoad=\"1\"/>");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet_xml(cells: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
            cells
        )
    }

    #[test]
    fn test_patch_text_cell_keeps_style_index() {
        let xml = sheet_xml(
            r#"<row r="1"><c r="A1" s="3" t="s"><v>0</v></c><c r="B1" s="1"><v>42</v></c></row>"#,
        );
        let mut changes = BTreeMap::new();
        changes.insert(CellRef::new(1, 1), CellValue::PlainText("Fish & chips".to_string()));

        let (patched, formula) = patch_worksheet(xml.as_bytes(), &changes).unwrap();
        let patched = String::from_utf8(patched).unwrap();

        assert!(!formula);
        assert!(patched.contains(
            r#"<c r="A1" s="3" t="inlineStr"><is><t>Fish &amp; chips</t></is></c>"#
        ));
        assert!(patched.contains(r#"<c r="B1" s="1"><v>42</v></c>"#));
        assert!(patched.starts_with("<?xml"));
    }

    #[test]
    fn test_patch_formula_keeps_f_attributes_and_drops_cache() {
        let xml = sheet_xml(
            r#"<row r="2"><c r="C2" s="2" t="str"><f t="shared" ref="C2:C4" si="0">IF(A2&gt;0,"Oui","Non")</f><v>Oui</v></c></row>"#,
        );
        let mut changes = BTreeMap::new();
        changes.insert(
            CellRef::new(2, 3),
            CellValue::Formula(r#"=IF(A2>0,"Yes","No")"#.to_string()),
        );

        let (patched, formula) = patch_worksheet(xml.as_bytes(), &changes).unwrap();
        let patched = String::from_utf8(patched).unwrap();

        assert!(formula);
        assert!(patched.contains(
            r#"<c r="C2" s="2"><f t="shared" ref="C2:C4" si="0">IF(A2&gt;0,"Yes","No")</f></c>"#
        ));
        assert!(!patched.contains("<v>Oui</v>"));
    }

    #[test]
    fn test_patch_cells_without_reference() {
        let xml = sheet_xml(r#"<row><c t="inlineStr"><is><t>Un</t></is></c><c t="inlineStr"><is><t> Deux</t></is></c></row>"#);
        let mut changes = BTreeMap::new();
        changes.insert(CellRef::new(1, 2), CellValue::PlainText(" Two".to_string()));

        let (patched, _) = patch_worksheet(xml.as_bytes(), &changes).unwrap();
        let patched = String::from_utf8(patched).unwrap();

        assert!(patched.contains("<t>Un</t>"));
        assert!(patched.contains(r#"<c t="inlineStr"><is><t xml:space="preserve"> Two</t></is></c>"#));
    }

    #[test]
    fn test_patch_reports_missing_cell() {
        let xml = sheet_xml(r#"<row r="1"><c r="A1"><v>1</v></c></row>"#);
        let mut changes = BTreeMap::new();
        changes.insert(CellRef::new(9, 9), CellValue::PlainText("x".to_string()));

        assert!(patch_worksheet(xml.as_bytes(), &changes).is_err());
    }

    #[test]
    fn test_full_calc_on_load_updates_existing() {
        let xml = r#"<workbook><sheets><sheet name="S" sheetId="1" r:id="rId1"/></sheets><calcPr calcId="191029" fullCalcOnLoad="0"/></workbook>"#;
        let patched = String::from_utf8(ensure_full_calc_on_load(xml.as_bytes()).unwrap()).unwrap();
        assert!(patched.contains(r#"<calcPr calcId="191029" fullCalcOnLoad="1"/>"#));
        assert_eq!(patched.matches("calcPr").count(), 1);
    }

    #[test]
    fn test_full_calc_on_load_inserts_before_ext_lst() {
        let xml = r#"<workbook><sheets><sheet name="S" sheetId="1" r:id="rId1"/></sheets><extLst><ext uri="x"/></extLst></workbook>"#;
        let patched = String::from_utf8(ensure_full_calc_on_load(xml.as_bytes()).unwrap()).unwrap();
        assert!(patched.contains(r#"</sheets><calcPr fullCalcOnLoad="1"/><extLst>"#));
    }

    #[test]
    fn test_full_calc_on_load_appends_when_missing() {
        let xml = r#"<workbook><sheets/></workbook>"#;
        let patched = String::from_utf8(ensure_full_calc_on_load(xml.as_bytes()).unwrap()).unwrap();
        assert_eq!(patched, r#"<workbook><sheets/><calcPr fullCalcOnLoad="1"/></workbook>"#);
    }
}
