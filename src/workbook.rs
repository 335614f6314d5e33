//! 工作簿内存模型
//!
//! 与容器格式无关的工作簿表示：有序工作表、稀疏单元格网格、单元格值与样式快照。
//! `xlsx` 模块负责把它与磁盘上的文件互相转换。

// 标准库导入
use std::collections::BTreeMap;
use std::fmt;

// 第三方crate导入
use anyhow::{bail, Result};

/// 公式哨兵字符
pub const FORMULA_SENTINEL: char = '=';

/// 单元格值
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// 空单元格（可能仍带有样式）
    Empty,
    /// 数值
    Number(f64),
    /// 布尔值
    Boolean(bool),
    /// 普通文本
    PlainText(String),
    /// 公式，文本以 `=` 开头
    Formula(String),
    /// 不可翻译的计算结果（错误值、日期字面量、共享公式跟随者的缓存值等）
    Computed(String),
}

impl CellValue {
    /// 是否为需要进入翻译流程的值
    pub fn is_translatable_kind(&self) -> bool {
        matches!(self, CellValue::PlainText(_) | CellValue::Formula(_))
    }

    /// 是否为公式
    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Formula(_))
    }

    /// 按公式哨兵区分普通文本与公式
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            CellValue::Empty
        } else if text.starts_with(FORMULA_SENTINEL) {
            CellValue::Formula(text)
        } else {
            CellValue::PlainText(text)
        }
    }
}

/// 字体
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Font {
    pub name: Option<String>,
    pub size: Option<String>,
    pub bold: bool,
    pub italic: bool,
    pub underline: Option<String>,
    pub strike: bool,
    pub color: Option<String>,
}

/// 填充
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fill {
    pub pattern: Option<String>,
    pub fg_color: Option<String>,
    pub bg_color: Option<String>,
}

/// 单条边框线
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BorderEdge {
    pub style: Option<String>,
    pub color: Option<String>,
}

/// 边框
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Border {
    pub left: BorderEdge,
    pub right: BorderEdge,
    pub top: BorderEdge,
    pub bottom: BorderEdge,
    pub diagonal: BorderEdge,
}

/// 对齐方式
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alignment {
    pub horizontal: Option<String>,
    pub vertical: Option<String>,
    pub wrap_text: bool,
    pub shrink_to_fit: bool,
    pub indent: Option<u32>,
    pub text_rotation: Option<u32>,
}

/// 单元格可视样式快照
///
/// 翻译前后必须逐字段相等。
#[derive(Debug, Clone, PartialEq)]
pub struct StyleSnapshot {
    pub font: Font,
    pub fill: Fill,
    pub border: Border,
    pub alignment: Alignment,
    pub number_format: String,
}

impl Default for StyleSnapshot {
    fn default() -> Self {
        Self {
            font: Font::default(),
            fill: Fill::default(),
            border: Border::default(),
            alignment: Alignment::default(),
            number_format: "General".to_string(),
        }
    }
}

/// 单元格
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub style: StyleSnapshot,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            style: StyleSnapshot::default(),
        }
    }

    pub fn with_style(mut self, style: StyleSnapshot) -> Self {
        self.style = style;
        self
    }

    /// 拍摄当前样式快照
    pub fn snapshot_style(&self) -> StyleSnapshot {
        self.style.clone()
    }

    /// 将快照重新应用到单元格
    pub fn apply_style(&mut self, snapshot: StyleSnapshot) {
        self.style = snapshot;
    }
}

/// A1 风格的单元格坐标（1 起始）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// 解析 `B12`、`$AA$3` 这样的引用
    pub fn from_a1(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        let mut col: u32 = 0;
        let mut row: u32 = 0;
        let mut seen_letters = false;
        let mut seen_digits = false;

        for ch in reference.chars() {
            match ch {
                '$' => continue,
                'A'..='Z' | 'a'..='z' if !seen_digits => {
                    seen_letters = true;
                    let digit = ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
                    col = col
                        .checked_mul(26)
                        .and_then(|c| c.checked_add(digit))
                        .ok_or_else(|| anyhow::anyhow!("列号溢出: {}", reference))?;
                }
                '0'..='9' if seen_letters => {
                    seen_digits = true;
                    row = row
                        .checked_mul(10)
                        .and_then(|r| r.checked_add(ch as u32 - '0' as u32))
                        .ok_or_else(|| anyhow::anyhow!("行号溢出: {}", reference))?;
                }
                _ => bail!("无效的单元格引用: {}", reference),
            }
        }

        if !seen_letters || !seen_digits || row == 0 || col == 0 {
            bail!("无效的单元格引用: {}", reference);
        }

        Ok(Self { row, col })
    }

    /// 生成 A1 风格引用
    pub fn to_a1(&self) -> String {
        let mut letters = Vec::new();
        let mut col = self.col;
        while col > 0 {
            let rem = (col - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            col = (col - 1) / 26;
        }
        let column: String = letters.into_iter().rev().collect();
        format!("{}{}", column, self.row)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// 工作表：名称 + 以 (行, 列) 为键的稀疏网格
///
/// `BTreeMap` 的键序即行优先遍历顺序。
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    name: String,
    cells: BTreeMap<CellRef, Cell>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert(&mut self, at: CellRef, cell: Cell) {
        self.cells.insert(at, cell);
    }

    pub fn get(&self, at: CellRef) -> Option<&Cell> {
        self.cells.get(&at)
    }

    pub fn get_mut(&mut self, at: CellRef) -> Option<&mut Cell> {
        self.cells.get_mut(&at)
    }

    /// 行优先遍历所有已存储的单元格
    pub fn iter(&self) -> impl Iterator<Item = (CellRef, &Cell)> {
        self.cells.iter().map(|(at, cell)| (*at, cell))
    }

    /// 行优先列出需要翻译的单元格坐标
    pub fn translatable_positions(&self) -> Vec<CellRef> {
        self.cells
            .iter()
            .filter(|(_, cell)| cell.value.is_translatable_kind())
            .map(|(at, _)| *at)
            .collect()
    }

    /// 已使用的最大行号与列号
    pub fn dimensions(&self) -> (u32, u32) {
        self.cells.keys().fold((0, 0), |(max_row, max_col), at| {
            (max_row.max(at.row), max_col.max(at.col))
        })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// 工作簿：有序工作表集合
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_sheet(&mut self, sheet: Sheet) {
        self.sheets.push(sheet);
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheets_mut(&mut self) -> &mut [Sheet] {
        &mut self.sheets
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    /// 统计可翻译的 (文本单元格, 公式单元格) 数量
    pub fn count_translatable(&self) -> (usize, usize) {
        self.sheets
            .iter()
            .flat_map(|sheet| sheet.iter())
            .fold((0, 0), |(text, formulas), (_, cell)| match cell.value {
                CellValue::PlainText(_) => (text + 1, formulas),
                CellValue::Formula(_) => (text, formulas + 1),
                _ => (text, formulas),
            })
    }
}
