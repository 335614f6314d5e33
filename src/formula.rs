//! 公式字符串字面量改写
//!
//! 只翻译公式中双引号包围的字面量，引号外的内容逐字节保留。
//! 提取不处理 `""` 转义引号，含转义引号的字面量会被切分成多段；
//! 骨架比较则把 `""` 视为字面量的一部分。

// 标准库导入
use std::ops::Range;

// 第三方crate导入
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

// 本地模块导入
use crate::classifier::should_translate;
use crate::translator::Translate;
use crate::utils::text_preview;
use crate::workbook::FORMULA_SENTINEL;

static LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*)""#).expect("公式字面量正则"));

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(?:[^"]|"")*""#).expect("公式引号段正则"));

/// 公式中的一个字符串字面量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaLiteral {
    /// 引号内文本在公式中的字节区间
    pub span: Range<usize>,
    /// 引号内文本
    pub text: String,
}

/// 改写结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaRewrite {
    pub formula: String,
    /// 成功翻译的字面量数
    pub translated: usize,
    /// 翻译失败、保持原样的字面量数
    pub failed: usize,
}

impl FormulaRewrite {
    fn unchanged(formula: &str) -> Self {
        Self {
            formula: formula.to_string(),
            translated: 0,
            failed: 0,
        }
    }
}

/// 是否为公式文本
pub fn is_formula(text: &str) -> bool {
    text.starts_with(FORMULA_SENTINEL)
}

/// 按出现顺序列出公式中的全部字符串字面量
pub fn extract_literals(formula: &str) -> Vec<FormulaLiteral> {
    LITERAL
        .captures_iter(formula)
        .filter_map(|caps| caps.get(1))
        .map(|inner| FormulaLiteral {
            span: inner.range(),
            text: inner.as_str().to_string(),
        })
        .collect()
}

/// 列出需要翻译的字面量
pub fn translatable_literals(formula: &str) -> Vec<FormulaLiteral> {
    if !is_formula(formula) {
        return Vec::new();
    }
    extract_literals(formula)
        .into_iter()
        .filter(|literal| should_translate(&literal.text, Some(formula)))
        .collect()
}

/// 公式骨架：所有字面量内容清空后的文本，`""` 转义引号计入字面量
pub fn skeleton(formula: &str) -> String {
    QUOTED.replace_all(formula, "\"\"").into_owned()
}

/// 翻译公式中符合条件的字符串字面量
///
/// 非公式输入原样返回。单个字面量翻译失败时记录警告并保留原文。
pub async fn rewrite_formula(formula: &str, translator: &dyn Translate) -> FormulaRewrite {
    let literals = translatable_literals(formula);
    if literals.is_empty() {
        return FormulaRewrite::unchanged(formula);
    }

    let mut rewritten = String::with_capacity(formula.len() + 16);
    let mut cursor = 0;
    let mut translated = 0;
    let mut failed = 0;

    for literal in literals {
        rewritten.push_str(&formula[cursor..literal.span.start]);
        match translator.translate(&literal.text).await {
            Ok(text) => {
                debug!("公式字面量: '{}' -> '{}'", literal.text, text_preview(&text));
                rewritten.push_str(&escape_literal(&text));
                translated += 1;
            }
            Err(e) => {
                warn!("⚠️  公式字面量翻译失败 '{}': {}", text_preview(&literal.text), e);
                rewritten.push_str(&literal.text);
                failed += 1;
            }
        }
        cursor = literal.span.end;
    }
    rewritten.push_str(&formula[cursor..]);

    FormulaRewrite {
        formula: rewritten,
        translated,
        failed,
    }
}

/// 公式字符串中的双引号需要写成两个
fn escape_literal(text: &str) -> String {
    text.replace('"', "\"\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TranslationError};

    fn english(text: &str) -> Result<String> {
        match text {
            "Très élevé" => Ok("Very high".to_string()),
            "Faible" => Ok("Low".to_string()),
            "Total général" => Ok("Grand total".to_string()),
            "Citation" => Ok("Say \"hi\"".to_string()),
            other => Err(TranslationError::fragment(other, "unknown")),
        }
    }

    #[test]
    fn test_extract_literals_positions() {
        let formula = r#"=IF(A1>10,"Très élevé","Faible")"#;
        let literals = extract_literals(formula);
        assert_eq!(literals.len(), 2);
        assert_eq!(literals[0].text, "Très élevé");
        assert_eq!(&formula[literals[1].span.clone()], "Faible");
    }

    #[tokio::test]
    async fn test_if_formula_literals_are_translated() {
        let formula = r#"=IF(A1>10,"Très élevé","Faible")"#;
        let result = rewrite_formula(formula, &english).await;

        assert_eq!(result.formula, r#"=IF(A1>10,"Very high","Low")"#);
        assert_eq!(result.translated, 2);
        assert_eq!(result.failed, 0);
        assert_eq!(skeleton(&result.formula), skeleton(formula));
    }

    #[tokio::test]
    async fn test_sparkline_formula_is_untouched() {
        let formula = r#"=SPARKLINE(A1:A10,{"charttype","bar"})"#;
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let counting = |text: &str| -> Result<String> {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(text.to_string())
        };

        let result = rewrite_formula(formula, &counting).await;
        assert_eq!(result.formula, formula);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_literal_is_kept() {
        let formula = r#"=CONCAT("Total général", ", ", "Inconnu")"#;
        let result = rewrite_formula(formula, &english).await;

        assert_eq!(result.formula, r#"=CONCAT("Grand total", ", ", "Inconnu")"#);
        assert_eq!(result.translated, 1);
        assert_eq!(result.failed, 1);
    }

    #[tokio::test]
    async fn test_non_formula_is_returned_unchanged() {
        let text = r#"IF("Très élevé")"#;
        let result = rewrite_formula(text, &english).await;
        assert_eq!(result.formula, text);
        assert_eq!(result.translated, 0);
    }

    #[tokio::test]
    async fn test_translated_quotes_are_doubled() {
        let formula = r#"=A1&"Citation""#;
        let result = rewrite_formula(formula, &english).await;
        assert_eq!(result.formula, r#"=A1&"Say ""hi""""#);
        assert_eq!(skeleton(&result.formula), skeleton(formula));
        assert_eq!(skeleton(&result.formula), "=A1&\"\"");
    }

    #[test]
    fn test_skeleton_keeps_empty_literals_apart() {
        assert_eq!(
            skeleton(r#"=CONCAT("a","","b")"#),
            r#"=CONCAT("","","")"#
        );
        assert_eq!(skeleton(r#"=IF(A1="x""y",1,2)"#), r#"=IF(A1="",1,2)"#);
    }

    #[tokio::test]
    async fn test_formula_without_literals() {
        let formula = "=SUM(A1:A3)*2";
        let result = rewrite_formula(formula, &english).await;
        assert_eq!(result, FormulaRewrite::unchanged(formula));
    }
}
