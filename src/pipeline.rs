//! 翻译流水线
//!
//! 状态流转：`Counting → Translating(i/N) → Saving → Done`，任何致命错误进入 `Errored`。
//! 单元格级失败只计数，不会中断运行。

// 标准库导入
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

// 第三方crate导入
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info};

// 本地模块导入
use crate::api_constants::service_config;
use crate::config::TranslationConfig;
use crate::error::{Result, TranslationError};
use crate::formula::translatable_literals;
use crate::mutation::{translate_cell, CellOutcome};
use crate::progress::{ProgressEvent, ProgressSink, ProgressThrottle};
use crate::scheduler::translate_all;
use crate::stats::{RunSummary, SheetSummary};
use crate::translation_error;
use crate::translator::{FragmentTranslator, HttpTranslationBackend, Translate, TranslationBackend};
use crate::workbook::{CellRef, CellValue, Sheet, Workbook};
use crate::xlsx::XlsxDocument;

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Counting,
    /// 正在处理第 `sheet` 个工作表（从 1 开始），共 `of` 个
    Translating { sheet: usize, of: usize },
    Saving,
    Done,
    Errored,
}

/// 进程内的运行序号，保证同一毫秒内创建的运行ID也不重复
static RUN_SEQUENCE: AtomicUsize = AtomicUsize::new(1);

/// 单次运行的上下文：运行ID与取消标记
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: String,
    cancel: Arc<AtomicBool>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::with_run_id(format!(
            "run-{}-{}",
            Utc::now().format("%Y%m%d-%H%M%S%.3f"),
            RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ))
    }

    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 新的运行ID，与其他运行共享同一个取消标记
    pub fn with_cancel(cancel: Arc<AtomicBool>) -> Self {
        Self {
            cancel,
            ..Self::new()
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// 可在其他任务中设置的取消标记
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 预先并发翻译好的片段，未命中时回退到实际翻译器
struct PrefetchedTranslator<'a> {
    inner: &'a FragmentTranslator,
    cache: HashMap<String, std::result::Result<String, String>>,
}

#[async_trait]
impl<'a> Translate for PrefetchedTranslator<'a> {
    async fn translate(&self, text: &str) -> Result<String> {
        match self.cache.get(text) {
            Some(Ok(translated)) => Ok(translated.clone()),
            Some(Err(reason)) => Err(translation_error!(fragment, text, reason)),
            None => self.inner.translate(text).await,
        }
    }
}

/// 工作簿翻译流水线
pub struct TranslationPipeline {
    translator: FragmentTranslator,
    config: TranslationConfig,
    state: PipelineState,
}

impl TranslationPipeline {
    pub fn new(backend: Arc<dyn TranslationBackend>, config: TranslationConfig) -> Self {
        let translator = FragmentTranslator::new(backend, config.source_lang(), config.target_lang());
        Self {
            translator,
            config,
            state: PipelineState::Idle,
        }
    }

    /// 校验配置并使用 HTTP 后端
    pub fn from_config(config: TranslationConfig) -> Result<Self> {
        config.validate()?;
        let backend = HttpTranslationBackend::new(&config)?;
        Ok(Self::new(Arc::new(backend), config))
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    /// 翻译磁盘上的工作簿并写到 `output`
    ///
    /// 打开或保存失败时不会留下输出文件。
    pub async fn translate_document<S: ProgressSink>(
        &mut self,
        input: &Path,
        output: &Path,
        ctx: &RunContext,
        sink: S,
    ) -> Result<RunSummary> {
        let mut progress = self.throttle(sink);

        info!("📂 输入文件: {}", input.display());
        let document = match XlsxDocument::open(input) {
            Ok(document) => document,
            Err(e) => return Err(self.fail(&mut progress, 0, 0, e)),
        };

        let mut workbook = document.workbook().clone();
        self.run(&mut workbook, ctx, &mut progress, |translated: &Workbook| {
            document.save_translated(translated, output)
        })
        .await
    }

    /// 翻译内存中的工作簿，完成后交给 `save`
    pub async fn translate_workbook<S, F>(
        &mut self,
        workbook: &mut Workbook,
        ctx: &RunContext,
        sink: S,
        save: F,
    ) -> Result<RunSummary>
    where
        S: ProgressSink,
        F: FnOnce(&Workbook) -> Result<()>,
    {
        let mut progress = self.throttle(sink);
        self.run(workbook, ctx, &mut progress, save).await
    }

    fn throttle<S: ProgressSink>(&self, sink: S) -> ProgressThrottle<S> {
        ProgressThrottle::new(
            sink,
            self.config.progress_batch_size(),
            self.config.progress_interval(),
        )
    }

    async fn run<S, F>(
        &mut self,
        workbook: &mut Workbook,
        ctx: &RunContext,
        progress: &mut ProgressThrottle<S>,
        save: F,
    ) -> Result<RunSummary>
    where
        S: ProgressSink,
        F: FnOnce(&Workbook) -> Result<()>,
    {
        let started_at = Utc::now();
        let timer = Instant::now();

        self.state = PipelineState::Counting;
        progress.report(0, 0, "开始翻译");
        let (text_cells, formula_cells) = workbook.count_translatable();
        let total = text_cells + formula_cells;
        info!(
            "🔢 [{}] 找到 {} 个待翻译单元格 (文本 {}, 公式 {})",
            ctx.run_id(),
            total,
            text_cells,
            formula_cells
        );
        progress.flush(0, total, format!("找到 {} 个待翻译单元格", total));

        let sheet_count = workbook.sheets().len();
        let mut current = 0usize;
        let mut sheets = Vec::with_capacity(sheet_count);

        for (index, sheet) in workbook.sheets_mut().iter_mut().enumerate() {
            self.state = PipelineState::Translating {
                sheet: index + 1,
                of: sheet_count,
            };

            let summary = match self
                .translate_sheet(sheet, ctx, progress, &mut current, total)
                .await
            {
                Ok(summary) => summary,
                Err(e) => return Err(self.fail(progress, current, total, e)),
            };

            info!(
                "✅ 工作表 '{}' 完成: 文本 {} / 公式 {} / 错误 {}",
                summary.name, summary.translated, summary.formulas, summary.errors
            );
            progress.flush(current, total, format!("工作表 '{}' 完成", summary.name));
            sheets.push(summary);
        }

        self.state = PipelineState::Saving;
        progress.flush(current, total, "正在保存翻译结果");
        if let Err(e) = save(&*workbook) {
            return Err(self.fail(progress, current, total, e));
        }

        self.state = PipelineState::Done;
        progress.flush_event(ProgressEvent::complete(total, "翻译完成"));

        let summary = RunSummary {
            run_id: ctx.run_id().to_string(),
            source_lang: self.translator.source_lang().to_string(),
            target_lang: self.translator.target_lang().to_string(),
            started_at,
            duration: timer.elapsed(),
            total_text_cells: text_cells,
            total_formula_cells: formula_cells,
            sheets,
        };
        info!(
            "🎉 [{}] 翻译完成: {} 个单元格, {} 个片段失败",
            summary.run_id,
            summary.total_cells(),
            summary.total_errors()
        );
        Ok(summary)
    }

    async fn translate_sheet<S: ProgressSink>(
        &self,
        sheet: &mut Sheet,
        ctx: &RunContext,
        progress: &mut ProgressThrottle<S>,
        current: &mut usize,
        total: usize,
    ) -> Result<SheetSummary> {
        let name = sheet.name().to_string();
        let positions = sheet.translatable_positions();
        let mut summary = SheetSummary::new(name.as_str());
        debug!("工作表 '{}': {} 个待翻译单元格", name, positions.len());

        let chunk_size = if self.config.is_parallel() {
            service_config::PREFETCH_CHUNK_CELLS
        } else {
            positions.len().max(1)
        };

        let mut done_in_sheet = 0usize;
        for chunk in positions.chunks(chunk_size) {
            if ctx.is_cancelled() {
                return Err(TranslationError::Cancelled {
                    run_id: ctx.run_id().to_string(),
                });
            }

            let prefetched;
            let translator: &dyn Translate = if self.config.is_parallel() {
                prefetched = self.prefetch(sheet, chunk).await;
                &prefetched
            } else {
                &self.translator
            };

            for &at in chunk {
                if ctx.is_cancelled() {
                    return Err(TranslationError::Cancelled {
                        run_id: ctx.run_id().to_string(),
                    });
                }
                let Some(cell) = sheet.get_mut(at) else {
                    continue;
                };

                let report = translate_cell(cell, translator).await;
                match report.outcome {
                    CellOutcome::Text => summary.translated += 1,
                    CellOutcome::Formula => summary.formulas += 1,
                    CellOutcome::Unchanged | CellOutcome::Skipped => {}
                }
                summary.errors += report.errors;

                *current += 1;
                done_in_sheet += 1;
                let percent = if total == 0 {
                    0.0
                } else {
                    *current as f64 / total as f64 * 100.0
                };
                progress.report(
                    *current,
                    total,
                    format!(
                        "正在翻译 '{}': {}/{} 个单元格 ({:.0}%)",
                        name, *current, total, percent
                    ),
                );

                if done_in_sheet % service_config::LOG_EVERY_CELLS == 0 {
                    info!(
                        "📝 工作表 '{}': 已处理 {}/{} 个单元格",
                        name,
                        done_in_sheet,
                        positions.len()
                    );
                }
            }
        }

        Ok(summary)
    }

    /// 把一组单元格中的待翻译片段交给调度器并发翻译
    async fn prefetch(&self, sheet: &Sheet, chunk: &[CellRef]) -> PrefetchedTranslator<'_> {
        let mut units: Vec<String> = Vec::new();
        for &at in chunk {
            let Some(cell) = sheet.get(at) else {
                continue;
            };
            match &cell.value {
                CellValue::PlainText(text) => units.push(text.clone()),
                CellValue::Formula(formula) => units.extend(
                    translatable_literals(formula)
                        .into_iter()
                        .map(|literal| literal.text),
                ),
                _ => {}
            }
        }
        units.sort();
        units.dedup();

        let results = translate_all(&units, &self.translator, self.config.max_workers()).await;
        let cache = units
            .into_iter()
            .zip(results)
            .map(|(text, result)| (text, result.map_err(|e| e.to_string())))
            .collect();

        PrefetchedTranslator {
            inner: &self.translator,
            cache,
        }
    }

    fn fail<S: ProgressSink>(
        &mut self,
        progress: &mut ProgressThrottle<S>,
        current: usize,
        total: usize,
        error: TranslationError,
    ) -> TranslationError {
        self.state = PipelineState::Errored;
        error!("❌ 翻译失败: {}", error);
        progress.flush_event(ProgressEvent::error(current, total, error.to_string()));
        error
    }
}
