//! 单元格改写
//!
//! 先拍样式快照，再替换值，最后无条件重新应用快照。失败时保留原值并计数，
//! 调用本身不会失败。

// 第三方crate导入
use tracing::{debug, warn};

// 本地模块导入
use crate::formula::rewrite_formula;
use crate::translator::Translate;
use crate::utils::text_preview;
use crate::workbook::{Cell, CellValue};

/// 单元格被如何处理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellOutcome {
    /// 普通文本已翻译
    Text,
    /// 公式已处理（字面量可能部分失败）
    Formula,
    /// 翻译失败，文本保持原样
    Unchanged,
    /// 数值、空值等非文本单元格
    Skipped,
}

/// 单个单元格的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellReport {
    pub outcome: CellOutcome,
    /// 失败的片段数
    pub errors: usize,
}

impl CellReport {
    fn new(outcome: CellOutcome, errors: usize) -> Self {
        Self { outcome, errors }
    }
}

/// 翻译一个单元格
pub async fn translate_cell(cell: &mut Cell, translator: &dyn Translate) -> CellReport {
    let snapshot = cell.snapshot_style();

    let report = match &cell.value {
        CellValue::Formula(formula) => {
            let rewrite = rewrite_formula(formula, translator).await;
            if rewrite.formula != *formula {
                debug!("公式已改写: {}", text_preview(&rewrite.formula));
                cell.value = CellValue::Formula(rewrite.formula);
            }
            CellReport::new(CellOutcome::Formula, rewrite.failed)
        }
        CellValue::PlainText(text) => match translator.translate(text).await {
            Ok(translated) => {
                cell.value = CellValue::PlainText(translated);
                CellReport::new(CellOutcome::Text, 0)
            }
            Err(e) => {
                warn!("⚠️  单元格翻译失败，保留原文 '{}': {}", text_preview(text), e);
                CellReport::new(CellOutcome::Unchanged, 1)
            }
        },
        _ => CellReport::new(CellOutcome::Skipped, 0),
    };

    cell.apply_style(snapshot);
    report
}
