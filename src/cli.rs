//! CLI parsing and orchestration. Loads config, builds the API client, runs the tree export,
//! prints the summary. Maps errors to exit codes.

use crate::config::{self, ConfigError, RunConfig};
use crate::confluence::{ConfluenceApi, RestClient};
use crate::export::{export_tree, ExportOptions, ExportReport};
use crate::model::PageRef;
use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Errors that end the run with a non-zero exit code. Per-page failures are not among them;
/// they are reported in the summary.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Failed to create HTTP client: {0}")]
    Setup(#[source] reqwest::Error),

    #[error("Could not reach Confluence at {url}; nothing was exported")]
    Unreachable { url: String },
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::Config(_) => 1,
            CliRunError::Setup(_) | CliRunError::Unreachable { .. } => 2,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "confluence-export")]
#[command(about = "Export Confluence page trees to Word or Markdown files")]
#[command(
    after_help = "Settings (url, email, token, page_id/page_ids, format, export_versions, output_dir, ...) come from the config file. Without --config, ./confluence-export.toml, ./config.json and ~/.config/confluence-export/config.toml are tried in order."
)]
pub struct Args {
    /// Config file (TOML, or JSON when the name ends in .json).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output directory (overrides output_dir from the config).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Walk the page tree and report what would be written, without writing.
    #[arg(long)]
    pub dry_run: bool,

    /// Only log warnings and errors; no progress spinner.
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and full error chains.
    #[arg(short, long)]
    pub verbose: bool,
}

fn build_api(config: &RunConfig) -> Result<ConfluenceApi, CliRunError> {
    let http = &config.http;
    let mut builder = RestClient::builder(config.credentials.clone())
        .timeout_secs(http.timeout_secs)
        .delay_ms(http.request_delay_ms)
        .retry_count(http.retry_count)
        .retry_backoff_secs(http.retry_backoff_secs.clone());
    if let Some(ua) = &http.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    let client = builder.build().map_err(CliRunError::Setup)?;
    Ok(ConfluenceApi::new(
        client,
        &config.base_url,
        &config.api_path,
        config.page_limit,
    ))
}

/// Summary lines printed at the end of a run.
pub fn summary_lines(report: &ExportReport, dry_run: bool) -> Vec<String> {
    let verb = if dry_run { "Would export" } else { "Exported" };
    let mut lines = vec![format!(
        "{} {} page(s), {} historical version(s); {} failure(s)",
        verb,
        report.exported,
        report.versions_exported,
        report.failures.len()
    )];
    lines.extend(report.failures.iter().map(|f| format!("  - {}", f)));
    lines
}

/// Entry point for the CLI. Returns the report when the run completed, even with per-page
/// failures.
pub fn run(args: &Args) -> Result<ExportReport, CliRunError> {
    let mut config = config::load_config(args.config.as_deref())?;
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    info!(
        url = %config.base_url,
        roots = config.root_page_ids.len(),
        format = ?config.format,
        export_versions = config.export_versions,
        output = %config.output_dir.display(),
        "Starting export"
    );

    let mut api = build_api(&config)?;

    let spinner: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: usize, page: &PageRef| {
        let mut state = spinner.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let pb = indicatif::ProgressBar::new_spinner();
            if let Ok(style) = indicatif::ProgressStyle::default_spinner()
                .template("{spinner} {msg} ({elapsed})")
            {
                pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
            }
            pb.enable_steady_tick(Duration::from_millis(80));
            pb
        });
        pb.set_message(format!("Exported {} page(s), last: {}", n, page.title));
    };
    let progress: Option<&dyn Fn(usize, &PageRef)> =
        if args.quiet { None } else { Some(&progress_cb) };

    let options = ExportOptions {
        format: config.format,
        export_versions: config.export_versions,
        output_dir: config.output_dir.clone(),
        max_depth: config.max_depth,
        dry_run: args.dry_run,
        progress,
    };
    let report = export_tree(&mut api, &config.root_page_ids, &options);

    if let Some(pb) = spinner.borrow_mut().take() {
        pb.finish_and_clear();
    }

    for line in summary_lines(&report, args.dry_run) {
        eprintln!("{}", line);
    }

    if report.nothing_reachable() {
        return Err(CliRunError::Unreachable {
            url: config.base_url,
        });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confluence::ApiError;
    use crate::export::{ExportError, NodeFailure, Stage};

    #[test]
    fn args_parse_without_flags() {
        let args = Args::parse_from(["confluence-export"]);
        assert!(args.config.is_none());
        assert!(args.output.is_none());
        assert!(!args.dry_run);
        assert!(!args.quiet);
        assert!(!args.verbose);
    }

    #[test]
    fn args_parse_flags() {
        let args = Args::parse_from([
            "confluence-export",
            "--config",
            "wiki.toml",
            "-o",
            "out",
            "--dry-run",
            "-v",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("wiki.toml")));
        assert_eq!(args.output, Some(PathBuf::from("out")));
        assert!(args.dry_run);
        assert!(args.verbose);
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(
            CliRunError::Config(ConfigError::MissingField("url")).exit_code(),
            1
        );
        assert_eq!(
            CliRunError::Unreachable {
                url: "https://x".into()
            }
            .exit_code(),
            2
        );
    }

    #[test]
    fn missing_config_file_is_config_error() {
        let args = Args::parse_from([
            "confluence-export",
            "--config",
            "/nonexistent_dir_confluence_export/c.toml",
        ]);
        let err = run(&args).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn summary_lists_each_failure() {
        let report = ExportReport {
            exported: 4,
            versions_exported: 2,
            failures: vec![NodeFailure {
                page_id: "200".to_string(),
                title: None,
                version: None,
                stage: Stage::Fetching,
                reason: ExportError::Api(ApiError::Auth {
                    status: 401,
                    url: "https://wiki/rest/api/content/200".to_string(),
                }),
            }],
            roots: Vec::new(),
        };
        let lines = summary_lines(&report, false);
        assert_eq!(
            lines[0],
            "Exported 4 page(s), 2 historical version(s); 1 failure(s)"
        );
        assert!(lines[1].starts_with("  - page 200 failed while fetching: Credentials rejected"));
        assert!(summary_lines(&ExportReport::default(), true)[0].starts_with("Would export 0"));
    }
}
