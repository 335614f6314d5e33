//! 统一错误处理模块
//!
//! 定义翻译流水线的错误分类。致命错误（格式、文件不存在、序列化、取消）会终止整个运行，
//! 片段级错误只影响单个文本片段，由调用方就地恢复并计数。

// 第三方crate导入
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// 翻译流水线统一错误类型
#[derive(Debug, Error)]
pub enum TranslationError {
    /// 输入不是期望的文档类型（错误的容器，或尚未转换的旧版 .xls）
    #[error("文件格式错误 [{path}]: {reason}")]
    Format {
        /// 文件路径
        path: String,
        /// 错误原因
        reason: String,
    },

    /// 输入路径无法解析为可读内容
    #[error("文件不存在: {path}")]
    NotFound {
        /// 文件路径
        path: String,
    },

    /// 单个文本片段或公式字符串翻译失败（可恢复）
    #[error("片段翻译失败 ['{fragment}']: {reason}")]
    Fragment {
        /// 片段预览
        fragment: String,
        /// 失败原因
        reason: String,
    },

    /// 翻译结果无法写出
    #[error("序列化失败 [{path}]: {reason}")]
    Serialization {
        /// 输出路径
        path: String,
        /// 失败原因
        reason: String,
    },

    /// 网络请求相关错误
    #[error(
        "网络请求失败{}: {message}",
        .status_code.map(|code| format!(" [{}]", code)).unwrap_or_default()
    )]
    Network {
        /// 错误消息
        message: String,
        /// HTTP状态码（如果适用）
        status_code: Option<u16>,
    },

    /// 翻译API相关错误
    #[error("翻译API错误 [{status_code}] {api_url}: {message}")]
    TranslationApi {
        /// API响应状态码
        status_code: u16,
        /// 错误消息
        message: String,
        /// API地址
        api_url: String,
    },

    /// 配置相关错误
    #[error("配置错误 [{field}]: {reason}")]
    Configuration {
        /// 配置项名称
        field: String,
        /// 错误原因
        reason: String,
    },

    /// 文件操作相关错误
    #[error("文件{operation}操作失败 [{path}]: {details}")]
    FileOperation {
        /// 文件路径
        path: String,
        /// 操作类型（读取、写入、创建等）
        operation: String,
        /// 底层错误信息
        details: String,
    },

    /// 运行在单元格边界被调用方取消
    #[error("翻译任务已取消 [{run_id}]")]
    Cancelled {
        /// 运行标识
        run_id: String,
    },

    /// 内部处理错误（包装anyhow::Error）
    #[error("内部处理错误: {cause:#}")]
    Internal {
        /// 包装的错误
        cause: AnyhowError,
    },
}

impl TranslationError {
    /// 为片段错误生成截断后的预览
    pub fn fragment(text: &str, reason: impl ToString) -> Self {
        TranslationError::Fragment {
            fragment: crate::utils::text_preview(text),
            reason: reason.to_string(),
        }
    }

    /// 是否为终止整个运行的致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TranslationError::Format { .. }
                | TranslationError::NotFound { .. }
                | TranslationError::Serialization { .. }
                | TranslationError::Cancelled { .. }
                | TranslationError::Configuration { .. }
        )
    }

    /// 是否值得重试（网络抖动、限流、服务端错误）
    pub fn is_transient(&self) -> bool {
        match self {
            TranslationError::Network { .. } => true,
            TranslationError::TranslationApi { status_code, .. } => {
                *status_code == 429 || *status_code >= 500
            }
            _ => false,
        }
    }
}

/// 翻译流水线结果类型别名
pub type Result<T> = std::result::Result<T, TranslationError>;

/// 便捷的错误创建宏
#[macro_export]
macro_rules! translation_error {
    (format, $path:expr, $reason:expr) => {
        $crate::error::TranslationError::Format {
            path: $path.to_string(),
            reason: $reason.to_string(),
        }
    };
    (not_found, $path:expr) => {
        $crate::error::TranslationError::NotFound {
            path: $path.to_string(),
        }
    };
    (fragment, $text:expr, $reason:expr) => {
        $crate::error::TranslationError::fragment($text, $reason)
    };
    (serialization, $path:expr, $reason:expr) => {
        $crate::error::TranslationError::Serialization {
            path: $path.to_string(),
            reason: $reason.to_string(),
        }
    };
    (network, $msg:expr) => {
        $crate::error::TranslationError::Network {
            message: $msg.to_string(),
            status_code: None,
        }
    };
    (network, $msg:expr, $code:expr) => {
        $crate::error::TranslationError::Network {
            message: $msg.to_string(),
            status_code: Some($code),
        }
    };
    (translation_api, $code:expr, $msg:expr, $url:expr) => {
        $crate::error::TranslationError::TranslationApi {
            status_code: $code,
            message: $msg.to_string(),
            api_url: $url.to_string(),
        }
    };
    (config, $field:expr, $reason:expr) => {
        $crate::error::TranslationError::Configuration {
            field: $field.to_string(),
            reason: $reason.to_string(),
        }
    };
    (file_op, $path:expr, $op:expr, $details:expr) => {
        $crate::error::TranslationError::FileOperation {
            path: $path.to_string(),
            operation: $op.to_string(),
            details: $details.to_string(),
        }
    };
}

/// 从anyhow::Error转换为TranslationError
impl From<AnyhowError> for TranslationError {
    fn from(error: AnyhowError) -> Self {
        TranslationError::Internal { cause: error }
    }
}

/// 从reqwest::Error转换为TranslationError
impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        let status_code = error.status().map(|s| s.as_u16());
        TranslationError::Network {
            message: error.to_string(),
            status_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TranslationError::Network {
            message: "Connection failed".to_string(),
            status_code: Some(500),
        };

        assert_eq!(format!("{}", err), "网络请求失败 [500]: Connection failed");

        let err = translation_error!(network, "Connection reset");
        assert_eq!(format!("{}", err), "网络请求失败: Connection reset");
    }

    #[test]
    fn test_error_macro() {
        let err = translation_error!(network, "Test error", 404);
        match err {
            TranslationError::Network {
                message,
                status_code,
            } => {
                assert_eq!(message, "Test error");
                assert_eq!(status_code, Some(404));
            }
            _ => panic!("Wrong error type"),
        }

        let err = translation_error!(format, "report.txt", "必须是 .xlsx 文件");
        assert!(matches!(err, TranslationError::Format { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_anyhow_conversion() {
        let anyhow_err = anyhow::anyhow!("Test anyhow error");
        let translation_err: TranslationError = anyhow_err.into();

        match translation_err {
            TranslationError::Internal { .. } => {
                // Test passes
            }
            _ => panic!("Wrong error type"),
        }
    }

    #[test]
    fn test_fragment_preview_is_truncated() {
        let long_text = "Économisé ce mois-ci pour les vacances d'été";
        let err = TranslationError::fragment(long_text, "timeout");
        match &err {
            TranslationError::Fragment { fragment, reason } => {
                assert_eq!(fragment.chars().count(), 33);
                assert!(fragment.ends_with("..."));
                assert_eq!(reason, "timeout");
            }
            _ => panic!("Wrong error type"),
        }
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_transient_classification() {
        assert!(translation_error!(translation_api, 429, "slow down", "http://x").is_transient());
        assert!(translation_error!(translation_api, 503, "busy", "http://x").is_transient());
        assert!(!translation_error!(translation_api, 400, "bad pair", "http://x").is_transient());
        assert!(translation_error!(network, "reset").is_transient());
        assert!(!translation_error!(not_found, "a.xlsx").is_transient());
    }
}
