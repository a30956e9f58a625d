//! confluence-export: export Confluence page trees to Word or Markdown files, mirroring the
//! page hierarchy as nested directories.

pub mod cli;
pub mod config;
pub mod confluence;
pub mod convert;
pub mod export;
pub mod model;
pub mod paths;

// Re-exports for CLI and consumers.
pub use config::{load_config, ConfigError, RunConfig};
pub use confluence::{ApiError, ConfluenceApi, Credentials, PageSource, RestClient};
pub use convert::{convert, ConversionError, ExportFormat};
pub use export::{export_tree, ExportError, ExportOptions, ExportReport, NodeFailure, Stage};
pub use model::{ExportNode, PageContent, PageRef, VersionInfo};
