// 标准库导入
use std::fs;
use std::path::{Path, PathBuf};

// 第三方crate导入
use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

// 本地模块导入
use crate::api_constants;

/// 日志和错误信息里的片段预览长度
const PREVIEW_CHARS: usize = 30;

/// 输入源类型枚举
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// 单个工作簿
    File(PathBuf),
    /// 包含工作簿的目录
    Directory(PathBuf),
}

/// 初始化日志系统
pub fn init_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// 验证输入源
/// 判断输入是单个文件还是目录，相对路径转换为绝对路径
pub fn validate_input_source(input: &Path) -> Result<InputSource> {
    let absolute_path = if input.is_absolute() {
        input.to_path_buf()
    } else {
        std::env::current_dir()?.join(input)
    };

    if absolute_path.is_dir() {
        Ok(InputSource::Directory(absolute_path))
    } else {
        Ok(InputSource::File(absolute_path))
    }
}

/// 收集目录下可处理的工作簿
///
/// 跳过 Office 锁文件（`~$` 开头）和以 `_<target>` 结尾的已翻译输出。
pub fn collect_workbooks(dir: &Path, target_lang: &str) -> Vec<PathBuf> {
    let translated_suffix = format!("_{}", target_lang);
    let mut found = Vec::new();

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("⚠️  无法访问目录项: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let supported = path
            .extension()
            .map(|ext| api_constants::is_supported_extension(&ext.to_string_lossy()))
            .unwrap_or(false);
        if !supported {
            continue;
        }

        let stem = path.file_stem().unwrap_or_default().to_string_lossy();
        if stem.starts_with("~$") || stem.ends_with(&translated_suffix) {
            debug!("跳过: {}", path.display());
            continue;
        }
        found.push(path.to_path_buf());
    }

    found.sort();
    found
}

/// 生成输出文件路径
pub fn generate_output_path(input: &Path, output: Option<&Path>, lang: &str) -> PathBuf {
    if let Some(output_path) = output {
        return output_path.to_path_buf();
    }

    // 自动生成输出路径: input_en.xlsx
    let stem = input.file_stem().unwrap_or_default();
    let extension = input.extension().unwrap_or_default();

    let output_name = format!(
        "{}_{}.{}",
        stem.to_string_lossy(),
        lang,
        extension.to_string_lossy()
    );

    if let Some(parent) = input.parent() {
        parent.join(output_name)
    } else {
        PathBuf::from(output_name)
    }
}

/// 目录模式的输出路径：保留输入相对于 `input_root` 的子目录结构
///
/// `in/janvier/budget.xlsx` 输出为 `<output_root>/janvier/budget_<lang>.xlsx`。
pub fn mirror_output_path(
    input: &Path,
    input_root: &Path,
    output_root: &Path,
    lang: &str,
) -> PathBuf {
    let relative = match input.strip_prefix(input_root) {
        Ok(relative) => relative,
        Err(_) => Path::new(input.file_name().unwrap_or_default()),
    };
    output_root.join(generate_output_path(relative, None, lang))
}

/// 先写入同目录临时文件，再原子重命名到目标路径
///
/// 失败时不会在目标路径留下任何文件。
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .with_context(|| format!("输出路径缺少文件名: {}", path.display()))?;
    let temp_path = path.with_file_name(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    let result = fs::write(&temp_path, bytes)
        .with_context(|| format!("写入临时文件失败: {}", temp_path.display()))
        .and_then(|_| {
            fs::rename(&temp_path, path)
                .with_context(|| format!("重命名到输出路径失败: {}", path.display()))
        });

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// 截断后的文本预览
pub fn text_preview(text: &str) -> String {
    let mut preview: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_output_path() {
        let input = Path::new("/data/rapport.xlsx");
        assert_eq!(
            generate_output_path(input, None, "en"),
            PathBuf::from("/data/rapport_en.xlsx")
        );
        assert_eq!(
            generate_output_path(input, Some(Path::new("/tmp/out.xlsx")), "en"),
            PathBuf::from("/tmp/out.xlsx")
        );
    }

    #[test]
    fn test_mirror_output_path_keeps_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let input_root = dir.path().join("in");
        let output_root = dir.path().join("out");
        for month in ["janvier", "fevrier"] {
            fs::create_dir_all(input_root.join(month)).unwrap();
            fs::write(input_root.join(month).join("budget.xlsx"), b"x").unwrap();
        }
        fs::write(input_root.join("budget.xlsx"), b"x").unwrap();

        let outputs: Vec<PathBuf> = collect_workbooks(&input_root, "en")
            .iter()
            .map(|input| mirror_output_path(input, &input_root, &output_root, "en"))
            .collect();

        assert_eq!(outputs.len(), 3);
        assert!(outputs.contains(&output_root.join("janvier").join("budget_en.xlsx")));
        assert!(outputs.contains(&output_root.join("fevrier").join("budget_en.xlsx")));
        assert!(outputs.contains(&output_root.join("budget_en.xlsx")));
    }

    #[test]
    fn test_mirror_output_path_outside_root_uses_file_name() {
        let output = mirror_output_path(
            Path::new("/ailleurs/ventes.xlsm"),
            Path::new("/in"),
            Path::new("/out"),
            "de",
        );
        assert_eq!(output, PathBuf::from("/out/ventes_de.xlsm"));
    }

    #[test]
    fn test_collect_workbooks_skips_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("trimestre");
        fs::create_dir(&nested).unwrap();
        for name in ["budget.xlsx", "budget_en.xlsx", "~$budget.xlsx", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::write(nested.join("ventes.XLSM"), b"x").unwrap();

        let found = collect_workbooks(dir.path(), "en");
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["budget.xlsx", "ventes.XLSM"]);
    }

    #[test]
    fn test_write_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.xlsx");

        write_atomically(&target, b"contenu").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"contenu");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        let missing_dir = dir.path().join("absent").join("out.xlsx");
        assert!(write_atomically(&missing_dir, b"x").is_err());
        assert!(!missing_dir.exists());
    }

    #[test]
    fn test_validate_input_source() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            validate_input_source(dir.path()).unwrap(),
            InputSource::Directory(dir.path().to_path_buf())
        );
        let file = dir.path().join("a.xlsx");
        assert_eq!(validate_input_source(&file).unwrap(), InputSource::File(file));
    }

    #[test]
    fn test_text_preview() {
        assert_eq!(text_preview("court"), "court");
        let long = "é".repeat(40);
        assert_eq!(text_preview(&long).chars().count(), 33);
    }
}
