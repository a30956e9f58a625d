//! Config file loading and validation.
//!
//! Search order when no path is given: ./confluence-export.toml, ./config.json, then
//! $XDG_CONFIG_HOME/confluence-export/config.toml (or ~/.config/confluence-export/config.toml).
//! `.json` files are read as JSON, anything else as TOML.

use crate::confluence::Credentials;
use crate::convert::ExportFormat;
use crate::export::DEFAULT_MAX_DEPTH;
use reqwest::Url;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_API_PATH: &str = "/wiki/rest/api";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Errors that stop a run before any export starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No config file found (looked for {})", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Missing required config key '{0}'")]
    MissingField(&'static str),

    #[error("No root pages configured: set page_id or page_ids")]
    NoRootPages,

    #[error("Invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Page ids may be written as strings or bare numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Text(String),
    Number(u64),
}

impl IdValue {
    fn into_id(self) -> String {
        match self {
            IdValue::Text(s) => s.trim().to_string(),
            IdValue::Number(n) => n.to_string(),
        }
    }
}

/// Config file contents. All fields optional here; [ConfigFile::validate] enforces the
/// required ones.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ConfigFile {
    /// Site root, e.g. https://acme.atlassian.net.
    pub url: Option<String>,
    /// With a token: basic auth. Without: the token is sent as bearer.
    pub email: Option<String>,
    pub token: Option<String>,
    #[serde(alias = "pageId")]
    pub page_id: Option<IdValue>,
    /// Takes precedence over page_id when both are set.
    #[serde(alias = "pageIds")]
    pub page_ids: Option<Vec<IdValue>>,
    /// doc (default) or markdown.
    pub format: Option<String>,
    /// Also export page history. Markdown only.
    pub export_versions: Option<bool>,
    pub output_dir: Option<PathBuf>,
    /// REST prefix appended to url: /wiki/rest/api (Cloud, default) or /rest/api (Server).
    pub api_path: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Delay in milliseconds between requests.
    pub request_delay_ms: Option<u64>,
    /// Number of HTTP attempts for transient failures (default 1, no retry).
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2, 4]).
    pub retry_backoff_secs: Option<Vec<u64>>,
    /// Results requested per listing page.
    pub page_limit: Option<u32>,
    pub max_depth: Option<usize>,
}

/// HTTP transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub user_agent: Option<String>,
    pub timeout_secs: u64,
    pub request_delay_ms: u64,
    pub retry_count: u32,
    pub retry_backoff_secs: Vec<u64>,
}

/// Validated, read-only settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base_url: String,
    pub api_path: String,
    pub credentials: Credentials,
    /// In configured order, duplicates removed.
    pub root_page_ids: Vec<String>,
    pub format: ExportFormat,
    pub export_versions: bool,
    pub output_dir: PathBuf,
    pub page_limit: u32,
    pub max_depth: usize,
    pub http: HttpSettings,
}

impl ConfigFile {
    pub fn validate(self) -> Result<RunConfig, ConfigError> {
        let url = non_empty(self.url).ok_or(ConfigError::MissingField("url"))?;
        let parsed = Url::parse(&url).map_err(|e| ConfigError::InvalidUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url,
                reason: "expected an http or https URL".to_string(),
            });
        }
        let token = non_empty(self.token).ok_or(ConfigError::MissingField("token"))?;
        let credentials = match non_empty(self.email) {
            Some(email) => Credentials::Basic { email, token },
            None => Credentials::Bearer { token },
        };

        let raw_ids = match (self.page_ids, self.page_id) {
            (Some(ids), _) => ids,
            (None, Some(id)) => vec![id],
            (None, None) => Vec::new(),
        };
        let mut root_page_ids: Vec<String> = Vec::with_capacity(raw_ids.len());
        for id in raw_ids.into_iter().map(IdValue::into_id) {
            if id.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "page_ids",
                    reason: "page ids must not be empty".to_string(),
                });
            }
            if root_page_ids.contains(&id) {
                debug!(page_id = %id, "Ignoring duplicate root page id");
                continue;
            }
            root_page_ids.push(id);
        }
        if root_page_ids.is_empty() {
            return Err(ConfigError::NoRootPages);
        }

        let format = match self.format.as_deref() {
            Some(s) => ExportFormat::parse(s).map_err(|reason| ConfigError::InvalidValue {
                field: "format",
                reason,
            })?,
            None => ExportFormat::Doc,
        };

        let page_limit = self.page_limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if page_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "page_limit",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(RunConfig {
            base_url: url.trim_end_matches('/').to_string(),
            api_path: self
                .api_path
                .unwrap_or_else(|| DEFAULT_API_PATH.to_string()),
            credentials,
            root_page_ids,
            format,
            export_versions: self.export_versions.unwrap_or(false),
            output_dir: self
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            page_limit,
            max_depth: self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
            http: HttpSettings {
                user_agent: non_empty(self.user_agent),
                timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
                request_delay_ms: self.request_delay_ms.unwrap_or(0),
                retry_count: self.retry_count.unwrap_or(1).max(1),
                retry_backoff_secs: self.retry_backoff_secs.unwrap_or_else(|| vec![1, 2, 4]),
            },
        })
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Parse config text; `json` selects JSON over TOML.
pub fn parse_config(s: &str, json: bool) -> Result<ConfigFile, String> {
    if json {
        serde_json::from_str(s).map_err(|e| e.to_string())
    } else {
        toml::from_str(s).map_err(|e| e.to_string())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Candidate config paths in search order.
pub fn search_paths() -> Result<Vec<PathBuf>, ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Read {
        path: PathBuf::from("."),
        source: e,
    })?;
    let mut paths = vec![cwd.join("confluence-export.toml"), cwd.join("config.json")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("confluence-export").join("config.toml"));
    }
    Ok(paths)
}

/// Load and validate the config: `explicit` if given, otherwise the first file found in
/// [search_paths].
pub fn load_config(explicit: Option<&Path>) -> Result<RunConfig, ConfigError> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let searched = search_paths()?;
            match searched.iter().find(|p| p.exists()) {
                Some(p) => p.clone(),
                None => return Err(ConfigError::NotFound { searched }),
            }
        }
    };
    debug!(path = %path.display(), "Loading config");
    let s = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
        path: path.clone(),
        source: e,
    })?;
    let file = parse_config(&s, is_json(&path)).map_err(|reason| ConfigError::Parse {
        path: path.clone(),
        reason,
    })?;
    file.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn toml_config(s: &str) -> Result<RunConfig, ConfigError> {
        parse_config(s, false)
            .map_err(|reason| ConfigError::Parse {
                path: PathBuf::from("test.toml"),
                reason,
            })?
            .validate()
    }

    #[test]
    fn parse_empty_config() {
        let c = parse_config("", false).unwrap();
        assert!(c.url.is_none());
        assert!(c.token.is_none());
        assert!(c.page_id.is_none());
        assert!(c.page_ids.is_none());
        assert!(c.format.is_none());
        assert!(c.export_versions.is_none());
    }

    #[test]
    fn full_toml_config() -> Result<(), ConfigError> {
        let c = toml_config(
            r#"
            url = "https://acme.atlassian.net/"
            email = "me@acme.com"
            token = "abc"
            page_ids = ["100", 200]
            format = "markdown"
            export_versions = true
            output_dir = "export"
            api_path = "/rest/api"
            user_agent = "Custom/1.0"
            timeout_secs = 60
            request_delay_ms = 250
            retry_count = 3
            retry_backoff_secs = [2, 4]
            page_limit = 25
            max_depth = 10
        "#,
        )?;
        assert_eq!(c.base_url, "https://acme.atlassian.net");
        assert_eq!(c.api_path, "/rest/api");
        assert_eq!(
            c.credentials,
            Credentials::Basic {
                email: "me@acme.com".to_string(),
                token: "abc".to_string()
            }
        );
        assert_eq!(c.root_page_ids, vec!["100", "200"]);
        assert_eq!(c.format, ExportFormat::Markdown);
        assert!(c.export_versions);
        assert_eq!(c.output_dir, PathBuf::from("export"));
        assert_eq!(c.page_limit, 25);
        assert_eq!(c.max_depth, 10);
        assert_eq!(
            c.http,
            HttpSettings {
                user_agent: Some("Custom/1.0".to_string()),
                timeout_secs: 60,
                request_delay_ms: 250,
                retry_count: 3,
                retry_backoff_secs: vec![2, 4],
            }
        );
        Ok(())
    }

    #[test]
    fn json_config_with_camel_case_page_id() -> Result<(), ConfigError> {
        let file = parse_config(
            r#"{"url": "https://acme.atlassian.net", "email": "me@acme.com", "token": "t", "pageId": 12345}"#,
            true,
        )
        .map_err(|reason| ConfigError::Parse {
            path: PathBuf::from("config.json"),
            reason,
        })?;
        let c = file.validate()?;
        assert_eq!(c.root_page_ids, vec!["12345"]);
        assert_eq!(c.format, ExportFormat::Doc);
        assert!(!c.export_versions);
        assert_eq!(c.output_dir, PathBuf::from("output"));
        assert_eq!(c.api_path, "/wiki/rest/api");
        assert_eq!(c.http.retry_count, 1);
        Ok(())
    }

    #[test]
    fn page_ids_win_over_page_id_and_duplicates_drop() -> Result<(), ConfigError> {
        let c = toml_config(
            r#"
            url = "https://wiki.example.com"
            token = "t"
            page_id = "1"
            page_ids = ["3", "2", "3"]
        "#,
        )?;
        assert_eq!(c.root_page_ids, vec!["3", "2"]);
        Ok(())
    }

    #[test]
    fn missing_email_means_bearer_token() -> Result<(), ConfigError> {
        let c = toml_config(
            r#"
            url = "https://wiki.example.com"
            token = "pat"
            page_id = "1"
        "#,
        )?;
        assert_eq!(
            c.credentials,
            Credentials::Bearer {
                token: "pat".to_string()
            }
        );
        Ok(())
    }

    #[test]
    fn missing_required_fields() {
        assert!(matches!(
            toml_config(r#"token = "t"
page_id = "1""#),
            Err(ConfigError::MissingField("url"))
        ));
        assert!(matches!(
            toml_config(r#"url = "https://w.example.com"
page_id = "1""#),
            Err(ConfigError::MissingField("token"))
        ));
        assert!(matches!(
            toml_config(r#"url = "https://w.example.com"
token = "t""#),
            Err(ConfigError::NoRootPages)
        ));
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(matches!(
            toml_config(r#"url = "not a url"
token = "t"
page_id = "1""#),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            toml_config(r#"url = "ftp://w.example.com"
token = "t"
page_id = "1""#),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            toml_config(r#"url = "https://w.example.com"
token = "t"
page_id = "1"
format = "pdf""#),
            Err(ConfigError::InvalidValue { field: "format", .. })
        ));
        assert!(matches!(
            toml_config(r#"url = "https://w.example.com"
token = "t"
page_ids = ["1", " "]"#),
            Err(ConfigError::InvalidValue { field: "page_ids", .. })
        ));
    }

    #[test]
    fn invalid_toml_errors() {
        assert!(parse_config("url = [", false).is_err());
        assert!(parse_config("{", true).is_err());
    }

    #[test]
    fn load_config_from_explicit_json_path() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        let mut f = std::fs::File::create(&path)?;
        writeln!(
            f,
            r#"{{"url": "https://acme.atlassian.net", "email": "a@b.c", "token": "t", "pageIds": ["7", "8"], "format": "markdown", "export_versions": true}}"#
        )?;
        let c = load_config(Some(&path))?;
        assert_eq!(c.root_page_ids, vec!["7", "8"]);
        assert_eq!(c.format, ExportFormat::Markdown);
        assert!(c.export_versions);
        Ok(())
    }

    #[test]
    fn load_config_missing_explicit_path_is_read_error() {
        let r = load_config(Some(Path::new("/nonexistent_dir_confluence_export/c.toml")));
        assert!(matches!(r, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn not_found_lists_searched_paths() {
        let e = ConfigError::NotFound {
            searched: vec![PathBuf::from("a.toml"), PathBuf::from("b.json")],
        };
        assert_eq!(
            e.to_string(),
            "No config file found (looked for a.toml, b.json)"
        );
    }
}
