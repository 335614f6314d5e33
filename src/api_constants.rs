/// 翻译服务与文档处理常量
///
/// 该文件定义了翻译服务、进度上报和工作簿处理相关的常量配置，方便统一管理和维护

/// 翻译API配置
pub mod api_config {
    /// 默认翻译API地址
    pub const DEFAULT_API_URL: &str = "http://localhost:1188/translate";

    /// 本地开发API地址
    pub const LOCAL_API_URL: &str = "http://localhost:1188/translate";
}

/// 翻译服务配置
pub mod service_config {
    use std::time::Duration;

    /// 默认源语言
    pub const DEFAULT_SOURCE_LANG: &str = "fr";

    /// 默认目标语言
    pub const DEFAULT_TARGET_LANG: &str = "en";

    /// 支持的语言代码
    pub const SUPPORTED_LANGUAGES: &[&str] = &[
        "zh", "en", "ja", "ko", "fr", "de", "es", "it", "pt", "ru",
        "ar", "hi", "th", "vi", "id", "ms", "tl", "nl", "sv", "da",
        "no", "fi", "pl", "cs", "sk", "hu", "ro", "bg", "hr", "sr",
        "sl", "et", "lv", "lt", "mt", "ga", "cy", "is", "mk", "sq"
    ];

    /// 默认最大重试次数
    pub const DEFAULT_MAX_RETRIES: usize = 3;

    /// 重试延迟基数（毫秒）
    pub const RETRY_DELAY_BASE_MS: u64 = 500;

    /// 默认并发翻译数
    pub const DEFAULT_MAX_WORKERS: usize = 5;

    /// 不超过该数量的批次直接顺序执行
    pub const SEQUENTIAL_BATCH_THRESHOLD: usize = 3;

    /// 并行模式下每次预取的单元格数
    pub const PREFETCH_CHUNK_CELLS: usize = 50;

    /// 请求超时时间（秒）
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// 进度事件的数量阈值
    pub const DEFAULT_PROGRESS_BATCH_SIZE: usize = 10;

    /// 进度事件的时间阈值
    pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

    /// 每处理多少个单元格写一条日志
    pub const LOG_EVERY_CELLS: usize = 10;
}

/// 工作簿文件配置
pub mod document_config {
    /// 可直接处理的扩展名
    pub const SUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xlsm"];

    /// 需要先外部转换的旧格式扩展名
    pub const LEGACY_EXTENSIONS: &[&str] = &["xls"];

    /// OLE复合文档签名（旧版 .xls）
    pub const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

    /// 默认工作簿部件路径
    pub const WORKBOOK_PART: &str = "xl/workbook.xml";
}

/// 实用工具函数
/// 获取API URL，根据本地模式标志选择
pub fn get_api_url(local_api: bool, custom_api: Option<&str>) -> &str {
    if let Some(custom) = custom_api {
        if !custom.is_empty() {
            return custom;
        }
    }

    if local_api {
        api_config::LOCAL_API_URL
    } else {
        api_config::DEFAULT_API_URL
    }
}

/// 验证API URL是否有效
pub fn is_valid_api_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some(),
        Err(_) => false,
    }
}

/// 验证语言代码是否支持
pub fn is_supported_language(lang: &str) -> bool {
    service_config::SUPPORTED_LANGUAGES.contains(&lang)
}

/// 扩展名是否为可处理的工作簿格式（不区分大小写）
pub fn is_supported_extension(ext: &str) -> bool {
    let ext = ext.to_ascii_lowercase();
    document_config::SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// 扩展名是否为旧版工作簿格式
pub fn is_legacy_extension(ext: &str) -> bool {
    let ext = ext.to_ascii_lowercase();
    document_config::LEGACY_EXTENSIONS.contains(&ext.as_str())
}
