//! 文本片段分类器
//!
//! 判断一个片段（整段单元格文本或公式中的字符串字面量）是否是面向用户的可翻译文本。
//! 纯函数，规则按顺序匹配，命中即返回。

// 第三方crate导入
use once_cell::sync::Lazy;
use regex::Regex;

/// 出现在公式中时，其所有字面量都不翻译的技术函数标记（大写比较）
pub const TECHNICAL_FUNCTIONS: &[&str] = &[
    "SPARKLINE",
    "IMPORTDATA",
    "IMPORTRANGE",
    "IMPORTXML",
    "IMPORTHTML",
    "IMPORTFEED",
    "QUERY",
    "__XLUDF.DUMMYFUNCTION",
    "GOOGLETRANSLATE",
];

/// 不翻译的最大字符数
pub const MAX_UNTRANSLATED_CHARS: usize = 2;

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("十六进制颜色正则"));

/// 判断片段是否需要翻译
///
/// `enclosing_formula` 为片段所在的公式（整段文本时为 `None`）。
pub fn should_translate(text: &str, enclosing_formula: Option<&str>) -> bool {
    if text.trim().is_empty() {
        return false;
    }

    if let Some(formula) = enclosing_formula {
        if contains_technical_function(formula) {
            return false;
        }
    }

    if is_lowercase_token(text) {
        return false;
    }

    if HEX_COLOR.is_match(text) {
        return false;
    }

    text.chars().count() > MAX_UNTRANSLATED_CHARS
}

/// 公式是否调用了技术函数
pub fn contains_technical_function(formula: &str) -> bool {
    let upper = formula.to_uppercase();
    TECHNICAL_FUNCTIONS
        .iter()
        .any(|marker| upper.contains(marker))
}

/// 单个全小写字母词（参数值、单位、关键字之类）
fn is_lowercase_token(text: &str) -> bool {
    let mut has_lowercase = false;
    for ch in text.chars() {
        if !ch.is_alphabetic() || ch.is_uppercase() {
            return false;
        }
        has_lowercase |= ch.is_lowercase();
    }
    has_lowercase
}
