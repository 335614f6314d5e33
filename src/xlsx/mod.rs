//! XLSX 工作簿的读取与保真写回
//!
//! 读取时把工作簿展开为 [`Workbook`] 模型；写回时只修补被翻译改动过的单元格，
//! 其余部件原样复制。

pub mod package;
pub mod reader;
pub mod styles;
pub mod writer;

// 标准库导入
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// 第三方crate导入
use anyhow::{bail, ensure, Context};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info};

// 本地模块导入
use crate::api_constants::{self, document_config};
use crate::error::Result;
use crate::translation_error;
use crate::utils::write_atomically;
use crate::workbook::{CellRef, CellValue, Sheet, Workbook};
use package::XlsxPackage;
use reader::{Relationship, REL_OFFICE_DOCUMENT, REL_SHARED_STRINGS, REL_STYLES, REL_WORKSHEET};
use styles::StyleTable;

/// 去掉命名空间前缀
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// 按本地名读取属性值
pub(crate) fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> anyhow::Result<Option<String>> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// 读取元素内的文本直到对应的结束标签
pub(crate) fn read_text(reader: &mut Reader<&[u8]>, end: &[u8]) -> anyhow::Result<String> {
    let mut text = String::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => text.push_str(std::str::from_utf8(e.as_ref())?),
            Event::End(e) if local_name(e.name().as_ref()) == end => break,
            Event::Eof => bail!("元素 <{}> 未闭合", String::from_utf8_lossy(end)),
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

/// 已打开的工作簿文档
///
/// 保留原始包和加载时的模型快照，保存时据此计算改动。
#[derive(Debug, Clone)]
pub struct XlsxDocument {
    path: PathBuf,
    package: XlsxPackage,
    workbook_part: String,
    /// 与 `baseline` 中的工作表一一对应，图表页没有单元格部件
    sheet_parts: Vec<Option<String>>,
    baseline: Workbook,
}

impl XlsxDocument {
    /// 打开磁盘上的工作簿
    ///
    /// 先检查扩展名再检查文件是否存在。
    pub fn open(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();

        if api_constants::is_legacy_extension(&extension) {
            return Err(translation_error!(
                format,
                path.display().to_string(),
                "旧版 .xls 工作簿不受支持，请先转换为 .xlsx"
            ));
        }
        if !api_constants::is_supported_extension(&extension) {
            return Err(translation_error!(
                format,
                path.display().to_string(),
                "输入必须是 .xlsx 或 .xlsm 文件"
            ));
        }
        if !path.is_file() {
            return Err(translation_error!(not_found, path.display().to_string()));
        }

        let bytes = fs::read(path).map_err(|e| {
            translation_error!(file_op, path.display().to_string(), "读取", e.to_string())
        })?;
        let mut document = Self::from_bytes(&bytes, &path.display().to_string())?;
        document.path = path.to_path_buf();
        Ok(document)
    }

    /// 从内存中的字节加载，`label` 只用于错误信息
    pub fn from_bytes(bytes: &[u8], label: &str) -> Result<Self> {
        if bytes.starts_with(&document_config::OLE_SIGNATURE) {
            return Err(translation_error!(
                format,
                label,
                "检测到旧版二进制工作簿，请先转换为 .xlsx"
            ));
        }

        let package = XlsxPackage::from_bytes(bytes)
            .map_err(|e| translation_error!(format, label, format!("{:#}", e)))?;
        let document = Self::from_package(package, label)
            .map_err(|e| translation_error!(format, label, format!("{:#}", e)))?;

        info!(
            "📖 已加载工作簿 {}: {} 个工作表",
            label,
            document.baseline.sheets().len()
        );
        Ok(document)
    }

    fn from_package(package: XlsxPackage, label: &str) -> anyhow::Result<Self> {
        let workbook_part = match package.part("_rels/.rels") {
            Some(xml) => reader::parse_relationships(xml)?
                .into_iter()
                .find(|rel| rel.rel_type.ends_with(REL_OFFICE_DOCUMENT))
                .map(|rel| reader::resolve_target("", &rel.target))
                .unwrap_or_else(|| document_config::WORKBOOK_PART.to_string()),
            None => document_config::WORKBOOK_PART.to_string(),
        };
        let workbook_xml = package
            .part(&workbook_part)
            .with_context(|| format!("缺少工作簿部件 {}", workbook_part))?;

        let rels = match package.part(&reader::rels_part_for(&workbook_part)) {
            Some(xml) => reader::parse_relationships(xml)?,
            None => Vec::new(),
        };
        let related = |suffix: &str, fallback: &str| -> String {
            rels.iter()
                .find(|rel| !rel.external && rel.rel_type.ends_with(suffix))
                .map(|rel| reader::resolve_target(&workbook_part, &rel.target))
                .unwrap_or_else(|| reader::resolve_target(&workbook_part, fallback))
        };

        let shared_strings = match package.part(&related(REL_SHARED_STRINGS, "sharedStrings.xml")) {
            Some(xml) => reader::parse_shared_strings(xml).context("共享字符串表损坏")?,
            None => Vec::new(),
        };
        let style_table = match package.part(&related(REL_STYLES, "styles.xml")) {
            Some(xml) => styles::parse_styles(xml).context("样式表损坏")?,
            None => StyleTable::default(),
        };

        let mut workbook = Workbook::new();
        let mut sheet_parts = Vec::new();
        for entry in reader::parse_workbook_sheets(workbook_xml)? {
            let rel: &Relationship = rels
                .iter()
                .find(|rel| rel.id == entry.rel_id)
                .with_context(|| format!("工作表 '{}' 的关系 {} 不存在", entry.name, entry.rel_id))?;

            if !rel.rel_type.ends_with(REL_WORKSHEET) {
                debug!("工作表 '{}' 不是单元格工作表，跳过", entry.name);
                workbook.push_sheet(Sheet::new(entry.name));
                sheet_parts.push(None);
                continue;
            }

            let part = reader::resolve_target(&workbook_part, &rel.target);
            let xml = package
                .part(&part)
                .with_context(|| format!("缺少工作表部件 {}", part))?;
            let sheet = reader::parse_worksheet(xml, &entry.name, &shared_strings, &style_table)
                .with_context(|| format!("工作表 '{}' 解析失败", entry.name))?;
            debug!("工作表 '{}': {} 个单元格", entry.name, sheet.len());

            workbook.push_sheet(sheet);
            sheet_parts.push(Some(part));
        }

        if workbook.sheets().is_empty() {
            bail!("工作簿中没有工作表");
        }

        Ok(Self {
            path: PathBuf::from(label),
            package,
            workbook_part,
            sheet_parts,
            baseline: workbook,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 加载时的工作簿模型
    pub fn workbook(&self) -> &Workbook {
        &self.baseline
    }

    /// 把翻译后的模型写到 `output`
    ///
    /// 只允许文本改为文本、公式改为公式；网格形状和样式必须与加载时一致。
    /// 写入是原子的，失败时目标路径上不会出现半成品。
    pub fn save_translated(&self, workbook: &Workbook, output: &Path) -> Result<()> {
        let bytes = self
            .render(workbook)
            .map_err(|e| translation_error!(serialization, output.display().to_string(), format!("{:#}", e)))?;
        write_atomically(output, &bytes).map_err(|e| {
            translation_error!(serialization, output.display().to_string(), format!("{:#}", e))
        })?;

        info!("💾 已保存: {}", output.display());
        Ok(())
    }

    /// 生成写回后的包字节
    pub fn render(&self, workbook: &Workbook) -> anyhow::Result<Vec<u8>> {
        let before = self.baseline.sheets();
        let after = workbook.sheets();
        ensure!(
            before.len() == after.len(),
            "工作表数量不一致: 原有 {} 个，现有 {} 个",
            before.len(),
            after.len()
        );

        let mut package = self.package.clone();
        let mut formula_changed = false;

        for (index, (old, new)) in before.iter().zip(after).enumerate() {
            ensure!(
                old.name() == new.name(),
                "工作表顺序或名称不一致: '{}' / '{}'",
                old.name(),
                new.name()
            );

            let changes = diff_sheet(old, new)?;
            if changes.is_empty() {
                continue;
            }

            let part = self.sheet_parts[index]
                .as_deref()
                .with_context(|| format!("工作表 '{}' 没有单元格部件", new.name()))?;
            let original = package
                .part(part)
                .with_context(|| format!("缺少工作表部件 {}", part))?;
            let (patched, has_formula) = writer::patch_worksheet(original, &changes)
                .with_context(|| format!("工作表 '{}' 写回失败", new.name()))?;

            debug!("工作表 '{}': 写回 {} 个单元格", new.name(), changes.len());
            formula_changed |= has_formula;
            package.set_part(part, patched);
        }

        if formula_changed {
            let workbook_xml = package
                .part(&self.workbook_part)
                .with_context(|| format!("缺少工作簿部件 {}", self.workbook_part))?;
            let patched = writer::ensure_full_calc_on_load(workbook_xml)?;
            package.set_part(&self.workbook_part, patched);
        }

        package.to_bytes()
    }
}

/// 计算一个工作表相对加载时的改动
fn diff_sheet(old: &Sheet, new: &Sheet) -> anyhow::Result<BTreeMap<CellRef, CellValue>> {
    ensure!(
        old.len() == new.len(),
        "工作表 '{}' 的单元格数量发生变化",
        new.name()
    );

    let mut changes = BTreeMap::new();
    for (at, cell) in new.iter() {
        let original = old
            .get(at)
            .with_context(|| format!("工作表 '{}' 出现新单元格 {}", new.name(), at))?;
        ensure!(
            original.style == cell.style,
            "工作表 '{}' 单元格 {} 的样式被修改",
            new.name(),
            at
        );
        if original.value == cell.value {
            continue;
        }
        match (&original.value, &cell.value) {
            (CellValue::PlainText(_), CellValue::PlainText(_))
            | (CellValue::Formula(_), CellValue::Formula(_)) => {
                changes.insert(at, cell.value.clone());
            }
            _ => bail!(
                "工作表 '{}' 单元格 {} 的值类型发生变化",
                new.name(),
                at
            ),
        }
    }
    Ok(changes)
}
