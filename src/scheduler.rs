//! 并行翻译调度
//!
//! 对一批片段做有界并发翻译，结果按输入下标写回，顺序与长度保持不变。
//! 小批量直接顺序执行。

// 第三方crate导入
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

// 本地模块导入
use crate::api_constants::service_config;
use crate::error::Result;
use crate::translation_error;
use crate::translator::Translate;
use crate::utils::text_preview;

/// 批次执行策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// 逐个顺序翻译
    Sequential,
    /// 最多 `workers` 个请求同时进行
    Pooled { workers: usize },
}

impl ExecutionStrategy {
    /// 按批次大小选择策略
    pub fn select(batch_len: usize, max_workers: usize) -> Self {
        if batch_len <= service_config::SEQUENTIAL_BATCH_THRESHOLD {
            ExecutionStrategy::Sequential
        } else {
            ExecutionStrategy::Pooled {
                workers: max_workers.max(1),
            }
        }
    }
}

/// 翻译整批片段，逐项返回结果
///
/// 返回值与输入等长、同序。
pub async fn translate_all(
    texts: &[String],
    translator: &dyn Translate,
    max_workers: usize,
) -> Vec<Result<String>> {
    match ExecutionStrategy::select(texts.len(), max_workers) {
        ExecutionStrategy::Sequential => {
            let mut results = Vec::with_capacity(texts.len());
            for text in texts {
                results.push(translator.translate(text).await);
            }
            results
        }
        ExecutionStrategy::Pooled { workers } => {
            debug!("🔀 并发翻译 {} 个片段，并发数 {}", texts.len(), workers);

            let mut slots: Vec<Option<Result<String>>> = texts.iter().map(|_| None).collect();
            let mut pending = stream::iter(texts.iter().enumerate())
                .map(|(index, text)| async move { (index, translator.translate(text).await) })
                .buffer_unordered(workers);

            while let Some((index, result)) = pending.next().await {
                slots[index] = Some(result);
            }

            slots
                .into_iter()
                .zip(texts)
                .map(|(slot, text)| {
                    slot.unwrap_or_else(|| Err(translation_error!(fragment, text, "结果缺失")))
                })
                .collect()
        }
    }
}

/// 翻译整批片段，失败的位置保留原文
///
/// 整个调用不会失败。
pub async fn translate_batch(
    texts: &[String],
    translator: &dyn Translate,
    max_workers: usize,
) -> Vec<String> {
    translate_all(texts, translator, max_workers)
        .await
        .into_iter()
        .zip(texts)
        .map(|(result, original)| match result {
            Ok(translated) => translated,
            Err(e) => {
                warn!("⚠️  片段翻译失败，保留原文 '{}': {}", text_preview(original), e);
                original.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TranslationError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// 文本越短越晚完成，使完成顺序与输入顺序相反
    struct SlowTranslator {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SlowTranslator {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Translate for SlowTranslator {
        async fn translate(&self, text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay = 60u64.saturating_sub(text.len() as u64 * 5);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if text.contains("panne") {
                return Err(TranslationError::fragment(text, "service indisponible"));
            }
            Ok(format!("EN({})", text))
        }
    }

    fn batch(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(ExecutionStrategy::select(3, 5), ExecutionStrategy::Sequential);
        assert_eq!(
            ExecutionStrategy::select(4, 5),
            ExecutionStrategy::Pooled { workers: 5 }
        );
        assert_eq!(
            ExecutionStrategy::select(10, 0),
            ExecutionStrategy::Pooled { workers: 1 }
        );
    }

    #[tokio::test]
    async fn test_batch_of_five_with_one_failure() {
        let translator = SlowTranslator::new();
        let texts = batch(&["un", "deux", "trois", "en panne", "cinq"]);

        let out = translate_batch(&texts, &translator, 5).await;
        assert_eq!(
            out,
            vec!["EN(un)", "EN(deux)", "EN(trois)", "en panne", "EN(cinq)"]
        );
        assert_eq!(translator.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let translator = SlowTranslator::new();
        let texts = batch(&["a", "bbbbbb", "cc", "ddddddddd", "eee", "f"]);

        let out = translate_batch(&texts, &translator, 6).await;
        let expected: Vec<String> = texts.iter().map(|t| format!("EN({})", t)).collect();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn test_pool_respects_worker_bound() {
        let translator = SlowTranslator::new();
        let texts: Vec<String> = (0..12).map(|i| format!("ligne {}", i)).collect();

        let out = translate_all(&texts, &translator, 3).await;
        assert_eq!(out.len(), 12);
        assert!(out.iter().all(|r| r.is_ok()));
        assert!(translator.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_small_batch_runs_sequentially() {
        let translator = SlowTranslator::new();
        let texts = batch(&["alpha", "beta", "gamma"]);

        translate_batch(&texts, &translator, 5).await;
        assert_eq!(translator.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let translator = SlowTranslator::new();
        assert!(translate_batch(&[], &translator, 5).await.is_empty());
    }
}
