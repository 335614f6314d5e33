//! 配置管理模块
//!
//! 提供CLI参数解析和翻译配置管理功能

// 标准库导入
use std::path::PathBuf;
use std::time::Duration;

// 第三方crate导入
use clap::Parser;

// 本地模块导入
use crate::api_constants::{self, api_config, service_config};
use crate::error::Result;
use crate::translation_error;

/// 翻译运行配置
///
/// 支持Builder模式进行链式配置。
///
/// # Examples
///
/// ```rust
/// use xlsx_translator::config::TranslationConfig;
///
/// let config = TranslationConfig::new()
///     .with_languages("fr", "en")
///     .with_api_url("http://localhost:1188/translate")
///     .with_max_workers(8)
///     .with_max_retries(5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    /// 源语言代码
    source_lang: String,
    /// 目标语言代码
    target_lang: String,
    /// 翻译API服务地址
    api_url: String,
    /// 进度事件数量阈值
    progress_batch_size: usize,
    /// 进度事件时间阈值
    progress_interval: Duration,
    /// 最大并发翻译数
    max_workers: usize,
    /// 最大重试次数
    max_retries: usize,
    /// 重试延迟基数
    retry_delay: Duration,
    /// 单次请求超时
    request_timeout: Duration,
    /// 是否通过调度器预取译文
    parallel: bool,
}

impl TranslationConfig {
    /// 创建新的配置实例
    ///
    /// 返回具有默认值的配置实例：
    /// - 语言对: fr -> en
    /// - API地址: 本地开发服务器
    /// - 进度节流: 每10个单元格或每2秒
    /// - 并发数: 5
    /// - 最大重试次数: 3
    /// - 请求超时: 30秒
    pub fn new() -> Self {
        Self {
            source_lang: service_config::DEFAULT_SOURCE_LANG.to_string(),
            target_lang: service_config::DEFAULT_TARGET_LANG.to_string(),
            api_url: api_config::DEFAULT_API_URL.to_string(),
            progress_batch_size: service_config::DEFAULT_PROGRESS_BATCH_SIZE,
            progress_interval: service_config::DEFAULT_PROGRESS_INTERVAL,
            max_workers: service_config::DEFAULT_MAX_WORKERS,
            max_retries: service_config::DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(service_config::RETRY_DELAY_BASE_MS),
            request_timeout: Duration::from_secs(service_config::REQUEST_TIMEOUT_SECONDS),
            parallel: true,
        }
    }

    /// 获取源语言代码
    pub fn source_lang(&self) -> &str {
        &self.source_lang
    }

    /// 获取目标语言代码
    pub fn target_lang(&self) -> &str {
        &self.target_lang
    }

    /// 获取API地址
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn progress_batch_size(&self) -> usize {
        self.progress_batch_size
    }

    pub fn progress_interval(&self) -> Duration {
        self.progress_interval
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// 获取最大重试次数
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// 是否启用并行预取
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// 设置语言对
    pub fn with_languages(mut self, source: &str, target: &str) -> Self {
        self.source_lang = source.to_string();
        self.target_lang = target.to_string();
        self
    }

    /// 设置API地址
    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = url.to_string();
        self
    }

    /// 设置进度节流参数
    pub fn with_progress(mut self, batch_size: usize, interval: Duration) -> Self {
        self.progress_batch_size = batch_size;
        self.progress_interval = interval;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    /// 设置最大重试次数
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 设置是否启用并行预取
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if !api_constants::is_valid_api_url(&self.api_url) {
            return Err(translation_error!(
                config,
                "api_url",
                format!("必须是有效的 http/https 地址: {}", self.api_url)
            ));
        }
        if self.source_lang.trim().is_empty() {
            return Err(translation_error!(config, "source_lang", "不能为空"));
        }
        if self.target_lang.trim().is_empty() {
            return Err(translation_error!(config, "target_lang", "不能为空"));
        }
        if self.progress_batch_size == 0 {
            return Err(translation_error!(config, "progress_batch_size", "必须大于0"));
        }
        if self.max_workers == 0 {
            return Err(translation_error!(config, "max_workers", "必须大于0"));
        }
        if self.request_timeout.is_zero() {
            return Err(translation_error!(config, "request_timeout", "必须大于0"));
        }
        Ok(())
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// CLI参数结构
#[derive(Parser, Debug)]
#[command(author, version, about = "保留格式的Excel翻译CLI工具 - 只翻译文本与公式字符串", long_about = None)]
pub struct Cli {
    /// 输入工作簿路径或包含工作簿的目录
    #[arg(short, long, value_name = "FILE_OR_DIR")]
    pub input: PathBuf,

    /// 输出文件路径 (可选，默认为输入文件名+语言代码；输入为目录时作为输出目录)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// 源语言代码
    #[arg(short, long, default_value = service_config::DEFAULT_SOURCE_LANG)]
    pub source: String,

    /// 目标语言代码
    #[arg(short, long, default_value = service_config::DEFAULT_TARGET_LANG)]
    pub target: String,

    /// 翻译API地址
    #[arg(short, long)]
    pub api: Option<String>,

    /// 使用本地API (localhost:1188)
    #[arg(long)]
    pub local_api: bool,

    /// 进度上报的数量阈值
    #[arg(long, default_value = "10")]
    pub batch_size: usize,

    /// 最大并发翻译数
    #[arg(long, default_value = "5")]
    pub max_workers: usize,

    /// 最大重试次数
    #[arg(long, default_value = "3")]
    pub max_retries: usize,

    /// 请求超时时间（秒）
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// 逐个单元格顺序翻译，不做预取
    #[arg(long)]
    pub sequential: bool,

    /// 详细输出模式
    #[arg(short, long)]
    pub verbose: bool,

    /// 静默模式 (仅输出错误)
    #[arg(short, long)]
    pub quiet: bool,

    /// 显示翻译统计
    #[arg(long)]
    pub stats: bool,

    /// 以JSON输出运行摘要
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// 转换为翻译配置
    pub fn to_config(&self) -> TranslationConfig {
        let api_url = api_constants::get_api_url(self.local_api, self.api.as_deref());
        TranslationConfig::new()
            .with_languages(&self.source, &self.target)
            .with_api_url(api_url)
            .with_progress(self.batch_size, service_config::DEFAULT_PROGRESS_INTERVAL)
            .with_max_workers(self.max_workers)
            .with_max_retries(self.max_retries)
            .with_request_timeout(Duration::from_secs(self.timeout))
            .with_parallel(!self.sequential)
    }
}
