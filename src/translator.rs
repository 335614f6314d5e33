//! 翻译后端适配层
//!
//! `TranslationBackend` 是与翻译服务交互的最小能力：`translate(text, source, target)`。
//! `Translate` 是核心组件实际拿到的能力，已绑定语言对，只接收待翻译片段。

// 标准库导入
use std::sync::Arc;
use std::time::Duration;

// 第三方crate导入
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

// 本地模块导入
use crate::config::TranslationConfig;
use crate::error::Result;
use crate::translation_error;
use crate::utils::text_preview;

/// 翻译服务后端
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// 翻译一段文本，可能暂时性失败
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String>;
}

/// 已绑定语言对的片段翻译能力
#[async_trait]
pub trait Translate: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String>;
}

#[async_trait]
impl<F> Translate for F
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    async fn translate(&self, text: &str) -> Result<String> {
        self(text)
    }
}

/// 把后端绑定到固定语言对
#[derive(Clone)]
pub struct FragmentTranslator {
    backend: Arc<dyn TranslationBackend>,
    source_lang: String,
    target_lang: String,
}

impl FragmentTranslator {
    pub fn new(backend: Arc<dyn TranslationBackend>, source_lang: &str, target_lang: &str) -> Self {
        Self {
            backend,
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
        }
    }

    pub fn source_lang(&self) -> &str {
        &self.source_lang
    }

    pub fn target_lang(&self) -> &str {
        &self.target_lang
    }
}

#[async_trait]
impl Translate for FragmentTranslator {
    async fn translate(&self, text: &str) -> Result<String> {
        self.backend
            .translate(text, &self.source_lang, &self.target_lang)
            .await
    }
}

/// 基于HTTP JSON接口的翻译后端
///
/// 请求体为 `{"text", "source_lang", "target_lang"}`，译文从响应的
/// `data`、`text` 或 `result` 字段读取，都不存在时使用原始响应体。
pub struct HttpTranslationBackend {
    client: Client,
    api_url: String,
    max_retries: usize,
    retry_delay: Duration,
}

impl HttpTranslationBackend {
    /// 根据配置创建HTTP后端
    pub fn new(config: &TranslationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| translation_error!(config, "request_timeout", e))?;

        Ok(Self {
            client,
            api_url: config.api_url().to_string(),
            max_retries: config.max_retries(),
            retry_delay: config.retry_delay(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// 发送单次翻译请求
    async fn request_once(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.api_url)
            .json(&json!({
                "text": text,
                "source_lang": source_lang,
                "target_lang": target_lang
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(translation_error!(
                translation_api,
                status.as_u16(),
                body.trim(),
                self.api_url
            ));
        }

        let body = response.text().await?;
        let translated = extract_translation(&body);
        if translated.trim().is_empty() {
            return Err(translation_error!(fragment, text, "翻译服务返回空结果"));
        }

        Ok(translated)
    }
}

#[async_trait]
impl TranslationBackend for HttpTranslationBackend {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let mut attempt = 0;
        loop {
            match self.request_once(text, source_lang, target_lang).await {
                Ok(translated) => {
                    debug!("翻译成功: '{}' -> '{}'", text_preview(text), text_preview(&translated));
                    return Ok(translated);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self
                        .retry_delay
                        .saturating_mul(2u32.saturating_pow(attempt as u32));
                    warn!(
                        "⚠️  翻译请求失败，{}ms 后重试 ({}/{}): {}",
                        delay.as_millis(),
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// 从响应体中提取译文
pub fn extract_translation(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json_val) => json_val
            .get("data")
            .or_else(|| json_val.get("text"))
            .or_else(|| json_val.get("result"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        Err(_) => body.to_string(),
    }
}
