// 标准库导入
use std::time::Duration;

// 第三方crate导入
use chrono::{DateTime, Utc};
use serde::Serialize;

/// 单个工作表的翻译统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SheetSummary {
    pub name: String,
    /// 已翻译的普通文本单元格
    pub translated: usize,
    /// 已处理的公式单元格
    pub formulas: usize,
    /// 失败的片段数
    pub errors: usize,
}

impl SheetSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// 一次运行的摘要
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub source_lang: String,
    pub target_lang: String,
    pub started_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_duration_ms", rename = "duration_ms")]
    pub duration: Duration,
    pub total_text_cells: usize,
    pub total_formula_cells: usize,
    pub sheets: Vec<SheetSummary>,
}

impl RunSummary {
    pub fn total_cells(&self) -> usize {
        self.total_text_cells + self.total_formula_cells
    }

    pub fn total_errors(&self) -> usize {
        self.sheets.iter().map(|sheet| sheet.errors).sum()
    }
}

fn serialize_duration_ms<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// 打印翻译统计
pub fn print_run_summary(summary: &RunSummary) {
    println!("\n📊 翻译统计报告:");
    println!("═══════════════════════════════════════");

    println!("🆔 运行ID: {}", summary.run_id);
    println!("🌐 语言: {} → {}", summary.source_lang, summary.target_lang);
    println!(
        "🕐 开始时间: {}",
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("⏱️  总耗时: {}", format_duration(summary.duration));

    println!("\n🔤 单元格统计:");
    println!("   文本单元格: {} 个", summary.total_text_cells);
    println!("   公式单元格: {} 个", summary.total_formula_cells);
    println!("   失败片段: {} 个", summary.total_errors());

    if !summary.sheets.is_empty() {
        println!("\n📑 工作表:");
        for sheet in &summary.sheets {
            println!(
                "   {}: 文本 {} / 公式 {} / 错误 {}",
                sheet.name, sheet.translated, sheet.formulas, sheet.errors
            );
        }
    }

    if summary.duration.as_secs_f64() > 0.0 && summary.total_cells() > 0 {
        println!("\n🚀 性能指标:");
        println!(
            "   处理速度: {:.1} 单元格/秒",
            summary.total_cells() as f64 / summary.duration.as_secs_f64()
        );
    }
}

/// 格式化持续时间
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}
