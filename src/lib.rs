//! xlsx-translator - 保留格式的Excel工作簿翻译库
//!
//! 只翻译普通文本单元格和公式中的字符串字面量；数值、公式结构、样式和工作簿结构保持不变。
//!
//! ```no_run
//! use std::path::Path;
//! use xlsx_translator::config::TranslationConfig;
//! use xlsx_translator::pipeline::{RunContext, TranslationPipeline};
//! use xlsx_translator::progress::NullSink;
//!
//! # async fn demo() -> xlsx_translator::error::Result<()> {
//! let config = TranslationConfig::new().with_languages("fr", "en");
//! let mut pipeline = TranslationPipeline::from_config(config)?;
//! let summary = pipeline
//!     .translate_document(
//!         Path::new("rapport.xlsx"),
//!         Path::new("rapport_en.xlsx"),
//!         &RunContext::new(),
//!         NullSink,
//!     )
//!     .await?;
//! println!("{} 个单元格", summary.total_cells());
//! # Ok(())
//! # }
//! ```

pub mod api_constants;
pub mod classifier;
pub mod config;
pub mod error;
pub mod formula;
pub mod mutation;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
pub mod stats;
pub mod translator;
pub mod utils;
pub mod workbook;
pub mod xlsx;

pub use config::TranslationConfig;
pub use error::{Result, TranslationError};
pub use pipeline::{PipelineState, RunContext, TranslationPipeline};
pub use progress::{ProgressEvent, ProgressSink, ProgressStatus, ProgressThrottle};
pub use stats::{RunSummary, SheetSummary};
pub use translator::{FragmentTranslator, HttpTranslationBackend, Translate, TranslationBackend};
pub use workbook::{Cell, CellRef, CellValue, Sheet, Workbook};
pub use xlsx::XlsxDocument;
