// 标准库导入
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// 第三方crate导入
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};

// 本地模块导入
use xlsx_translator::api_constants;
use xlsx_translator::config::Cli;
use xlsx_translator::error::TranslationError;
use xlsx_translator::pipeline::{RunContext, TranslationPipeline};
use xlsx_translator::progress::{ProgressEvent, ProgressStatus};
use xlsx_translator::stats::{format_duration, print_run_summary};
use xlsx_translator::utils::{
    collect_workbooks, generate_output_path, init_logging, mirror_output_path,
    validate_input_source, InputSource,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志系统
    init_logging(cli.verbose, cli.quiet);

    let config = cli.to_config();
    let mut pipeline = match TranslationPipeline::from_config(config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("❌ 配置无效: {}", e);
            std::process::exit(1);
        }
    };

    // 确定待处理的工作簿
    // 目录模式且指定了输出目录时，记录 (输入根目录, 输出根目录)
    let (inputs, mirror) = match validate_input_source(&cli.input)? {
        InputSource::File(path) => (vec![path], None),
        InputSource::Directory(dir) => {
            info!("📁 扫描目录: {}", dir.display());
            let found = collect_workbooks(&dir, &cli.target);
            (found, cli.output.clone().map(|out| (dir, out)))
        }
    };
    if inputs.is_empty() {
        warn!("⚠️  没有找到可处理的 .xlsx/.xlsm 文件");
        return Ok(());
    }

    for lang in [&cli.source, &cli.target] {
        if !api_constants::is_supported_language(lang) {
            warn!("⚠️  语言代码 '{}' 不在常用列表中，将原样传给翻译服务", lang);
        }
    }

    info!("🚀 启动Excel翻译: {} → {}", cli.source, cli.target);
    info!("🌐 翻译API: {}", pipeline.config().api_url());

    let cancel = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⚠️  收到中断信号，将在当前单元格完成后停止");
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    let mut summaries = Vec::new();
    let mut failures = 0usize;

    for input in &inputs {
        let output = match &mirror {
            Some((input_root, output_root)) => {
                mirror_output_path(input, input_root, output_root, &cli.target)
            }
            None => generate_output_path(input, cli.output.as_deref(), &cli.target),
        };
        info!("📄 输出文件: {}", output.display());

        if let Err(e) = ensure_parent_dir(&output) {
            error!("❌ {} 翻译失败: {:#}", input.display(), e);
            failures += 1;
            continue;
        }

        let ctx = RunContext::with_cancel(Arc::clone(&cancel));
        match pipeline
            .translate_document(input, &output, &ctx, log_progress)
            .await
        {
            Ok(summary) => {
                info!(
                    "✅ {} 翻译完成，耗时 {}",
                    input.display(),
                    format_duration(summary.duration)
                );
                if cli.stats || cli.verbose {
                    print_run_summary(&summary);
                }
                summaries.push(summary);
            }
            Err(e) => {
                error!("❌ {} 翻译失败: {}", input.display(), e);
                failures += 1;
                if matches!(e, TranslationError::Cancelled { .. }) {
                    break;
                }
            }
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    }

    if inputs.len() > 1 {
        info!(
            "📊 共 {} 个文件: 成功 {} 个, 失败 {} 个",
            inputs.len(),
            summaries.len(),
            failures
        );
    }

    if failures > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// 创建输出文件所在目录
fn ensure_parent_dir(output: &Path) -> Result<()> {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("无法创建输出目录: {}", parent.display())),
        _ => Ok(()),
    }
}

/// 把进度事件写入日志
fn log_progress(event: &ProgressEvent) {
    match event.status {
        ProgressStatus::Processing => {
            debug!("⏳ [{:.0}%] {}", event.percent(), event.message)
        }
        ProgressStatus::Complete => debug!("🏁 {}", event.message),
        ProgressStatus::Error => debug!("💥 {}", event.message),
    }
}
