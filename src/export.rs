//! Tree export: depth-first, pre-order walk over the page hierarchy.
//!
//! For each page: fetch, convert, write, optionally write its version history, then recurse into
//! its children. Failures are recorded per node and never cross node boundaries; the run always
//! produces an [ExportReport].

use crate::confluence::{ApiError, PageSource};
use crate::convert::{convert, ConversionError, ExportFormat, Snapshot};
use crate::model::{ExportNode, PageContent, PageRef};
use crate::paths::{page_paths, version_path};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default bound on hierarchy depth (root = 0).
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Options for one export run.
pub struct ExportOptions<'a> {
    pub format: ExportFormat,
    /// Write historical versions too. Only honoured for formats that support it.
    pub export_versions: bool,
    pub output_dir: PathBuf,
    pub max_depth: usize,
    /// Walk and compute paths without touching the filesystem.
    pub dry_run: bool,
    /// Called after each page file is written, with the running count.
    pub progress: Option<&'a dyn Fn(usize, &PageRef)>,
}

impl ExportOptions<'_> {
    fn versions_enabled(&self) -> bool {
        self.export_versions && self.format.supports_versions()
    }
}

/// Where in a node's lifecycle a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Converting,
    Writing,
    Recursing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetching => "fetching",
            Stage::Converting => "converting",
            Stage::Writing => "writing",
            Stage::Recursing => "recursing",
        };
        f.write_str(s)
    }
}

/// Why a node (or one of its versions) failed.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hierarchy deeper than {max_depth} levels; not descending further")]
    DepthLimit { max_depth: usize },
}

/// One failed node or version.
#[derive(Debug)]
pub struct NodeFailure {
    pub page_id: String,
    pub title: Option<String>,
    /// Set when the failure concerns a historical version rather than the page itself.
    pub version: Option<u32>,
    pub stage: Stage,
    pub reason: ExportError,
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}", self.page_id)?;
        if let Some(title) = &self.title {
            write!(f, " ({})", title)?;
        }
        if let Some(v) = self.version {
            write!(f, " version {}", v)?;
        }
        write!(f, " failed while {}: {}", self.stage, self.reason)
    }
}

/// Result of a run: what was written, what failed, and the exported tree.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub exported: usize,
    pub versions_exported: usize,
    pub failures: Vec<NodeFailure>,
    pub roots: Vec<ExportNode>,
}

impl ExportReport {
    /// True when nothing was exported and every failure was a network-level error: the API
    /// could not be reached at all.
    pub fn nothing_reachable(&self) -> bool {
        self.exported == 0
            && !self.failures.is_empty()
            && self
                .failures
                .iter()
                .all(|f| matches!(&f.reason, ExportError::Api(e) if e.is_network()))
    }
}

/// Export every tree rooted at `root_ids`, in order. Duplicate ids (among the roots or
/// anywhere in the hierarchy) are exported once.
pub fn export_tree<S: PageSource + ?Sized>(
    source: &mut S,
    root_ids: &[String],
    options: &ExportOptions<'_>,
) -> ExportReport {
    let mut exporter = TreeExporter {
        source,
        options,
        visited: HashSet::new(),
        report: ExportReport::default(),
    };
    for id in root_ids {
        if exporter.visited.contains(id) {
            info!(page_id = %id, "Root page already exported, skipping");
            continue;
        }
        info!(page_id = %id, "Processing root page");
        let mut ancestors = Vec::new();
        if let Some(node) = exporter.visit(id, None, &mut ancestors) {
            exporter.report.roots.push(node);
        }
    }
    exporter.report
}

struct TreeExporter<'s, 'o, S: PageSource + ?Sized> {
    source: &'s mut S,
    options: &'s ExportOptions<'o>,
    visited: HashSet<String>,
    report: ExportReport,
}

impl<S: PageSource + ?Sized> TreeExporter<'_, '_, S> {
    /// Export one page and its subtree. `known` is the listing entry the id came from, if any.
    fn visit(
        &mut self,
        id: &str,
        known: Option<&PageRef>,
        ancestors: &mut Vec<PageRef>,
    ) -> Option<ExportNode> {
        if !self.visited.insert(id.to_string()) {
            debug!(page_id = id, "Page already visited, skipping");
            return None;
        }
        if ancestors.len() > self.options.max_depth {
            self.fail(
                id,
                known.map(|p| p.title.clone()),
                None,
                Stage::Recursing,
                ExportError::DepthLimit {
                    max_depth: self.options.max_depth,
                },
            );
            return None;
        }

        let content = match self.source.page(id) {
            Ok(c) => c,
            Err(e) => {
                self.fail(id, known.map(|p| p.title.clone()), None, Stage::Fetching, e.into());
                return None;
            }
        };
        if content.page.id != id {
            self.visited.insert(content.page.id.clone());
        }
        let page = content.page.clone();
        let paths = page_paths(
            &self.options.output_dir,
            ancestors,
            &page,
            self.options.format.extension(),
        );

        let written = match convert(&content, self.options.format, Snapshot::Current) {
            Ok(converted) => match self.write(&paths.file, &converted.bytes) {
                Ok(()) => true,
                Err(e) => {
                    self.fail(&page.id, Some(page.title.clone()), None, Stage::Writing, e);
                    false
                }
            },
            Err(e) => {
                self.fail(&page.id, Some(page.title.clone()), None, Stage::Converting, e.into());
                false
            }
        };
        if written {
            self.report.exported += 1;
            if let Some(cb) = self.options.progress {
                cb(self.report.exported, &page);
            }
        }

        if self.options.versions_enabled() {
            self.export_versions(&content, &paths.dir);
        }

        let child_refs = match self.source.children(&page.id) {
            Ok(c) => c,
            Err(e) => {
                self.fail(&page.id, Some(page.title.clone()), None, Stage::Recursing, e.into());
                Vec::new()
            }
        };
        ancestors.push(page.clone());
        let mut children = Vec::with_capacity(child_refs.len());
        for child in &child_refs {
            if let Some(node) = self.visit(&child.id, Some(child), ancestors) {
                children.push(node);
            }
        }
        ancestors.pop();

        Some(ExportNode {
            page,
            output_path: paths.file,
            written,
            children,
        })
    }

    /// Write every version except the current one under `{page_dir}/versions/`. Each version
    /// fails on its own.
    fn export_versions(&mut self, current: &PageContent, page_dir: &Path) {
        let page = &current.page;
        let versions = match self.source.versions(&page.id) {
            Ok(v) => v,
            Err(e) => {
                self.fail(&page.id, Some(page.title.clone()), None, Stage::Fetching, e.into());
                return;
            }
        };
        let format = self.options.format;
        for version in versions
            .iter()
            .filter(|v| v.number != current.version.number)
        {
            let fail_version = |this: &mut Self, stage: Stage, reason: ExportError| {
                this.fail(&page.id, Some(page.title.clone()), Some(version.number), stage, reason)
            };
            let historical = match self.source.page_version(&page.id, version.number) {
                Ok(c) => c,
                Err(e) => {
                    fail_version(self, Stage::Fetching, e.into());
                    continue;
                }
            };
            let converted = match convert(&historical, format, Snapshot::Historical) {
                Ok(c) => c,
                Err(e) => {
                    fail_version(self, Stage::Converting, e.into());
                    continue;
                }
            };
            let path = version_path(page_dir, page, version, converted.extension);
            match self.write(&path, &converted.bytes) {
                Ok(()) => self.report.versions_exported += 1,
                Err(e) => fail_version(self, Stage::Writing, e),
            }
        }
    }

    /// Create parent directories and overwrite the file.
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
        if self.options.dry_run {
            info!(path = %path.display(), "Would write");
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ExportError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::write(path, bytes).map_err(|e| ExportError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!(path = %path.display(), "Wrote");
        Ok(())
    }

    fn fail(
        &mut self,
        page_id: &str,
        title: Option<String>,
        version: Option<u32>,
        stage: Stage,
        reason: ExportError,
    ) {
        let failure = NodeFailure {
            page_id: page_id.to_string(),
            title,
            version,
            stage,
            reason,
        };
        warn!("{}", failure);
        self.report.failures.push(failure);
    }
}
