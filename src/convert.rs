//! Content conversion: Confluence storage-format HTML into Markdown or a Word-openable document.

use crate::model::PageContent;
use regex::{Captures, Regex};
use scraper::Html;
use std::panic;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::warn;

/// Output format selected in the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// HTML wrapped as a Word document (`.doc`). Current version only.
    Doc,
    Markdown,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.trim().to_lowercase().as_str() {
            "doc" | "word" => Ok(ExportFormat::Doc),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            _ => Err(format!(
                "Invalid format value: '{}'. Use doc or markdown.",
                s
            )),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Doc => "doc",
            ExportFormat::Markdown => "md",
        }
    }

    /// Whether historical versions can be exported in this format.
    pub fn supports_versions(self) -> bool {
        matches!(self, ExportFormat::Markdown)
    }
}

/// Which state of the page is being converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    Current,
    Historical,
}

/// Bytes ready to be written, plus the file extension they belong under.
#[derive(Debug)]
pub struct Converted {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("{format:?} output covers only the current page version (asked for version {version})")]
    VersionsUnsupported { format: ExportFormat, version: u32 },
}

/// Convert one page state into the target format.
pub fn convert(
    content: &PageContent,
    format: ExportFormat,
    snapshot: Snapshot,
) -> Result<Converted, ConversionError> {
    let text = match (format, snapshot) {
        (ExportFormat::Markdown, _) => markdown_document(content, snapshot),
        (ExportFormat::Doc, Snapshot::Current) => word_document(content),
        (ExportFormat::Doc, Snapshot::Historical) => {
            return Err(ConversionError::VersionsUnsupported {
                format,
                version: content.version.number,
            })
        }
    };
    Ok(Converted {
        bytes: text.into_bytes(),
        extension: format.extension(),
    })
}

/// Markdown file: metadata header, rule, converted body.
fn markdown_document(content: &PageContent, snapshot: Snapshot) -> String {
    let page = &content.page;
    let version = &content.version;
    let mut out = String::new();

    out.push_str(&format!("# {}", page.title));
    if snapshot == Snapshot::Historical {
        out.push_str(&format!(" (version {})", version.number));
    }
    out.push_str("\n\n");
    if let Some(space) = &content.space_key {
        out.push_str(&format!("**Space:** {}\n", space));
    }
    out.push_str(&format!("**Page ID:** {}\n", page.id));
    out.push_str(&format!("**Version:** {}\n", version.number));
    out.push_str(&format!("**Date:** {}\n", version.created.format("%Y-%m-%d")));
    if let Some(url) = &content.web_url {
        out.push_str(&format!("**URL:** {}\n", url));
    }
    out.push_str("\n---\n\n");
    out.push_str(&html_to_markdown(&content.body_html));
    out.push('\n');
    out
}

/// Word opens HTML carrying the Office namespaces and ProgId as a native document.
fn word_document(content: &PageContent) -> String {
    let title = html_escape(&content.page.title);
    let body = rewrite_code_macros(&content.body_html);
    format!(
        r#"<html xmlns:o="urn:schemas-microsoft-com:office:office" xmlns:w="urn:schemas-microsoft-com:office:word" xmlns="http://www.w3.org/TR/REC-html40">
<head>
<meta http-equiv="Content-Type" content="text/html; charset=utf-8">
<meta name="ProgId" content="Word.Document">
<meta name="Generator" content="confluence-export">
<title>{title}</title>
<!--[if gte mso 9]><xml><w:WordDocument><w:View>Print</w:View></w:WordDocument></xml><![endif]-->
</head>
<body>
<h1>{title}</h1>
{body}
</body>
</html>
"#
    )
}

/// HTML to Markdown. Falls back to plain text if the converter panics on odd input.
pub fn html_to_markdown(html: &str) -> String {
    let prepared = rewrite_code_macros(html);
    markdown_or_plain_text(&prepared, html2md::parse_html)
}

fn markdown_or_plain_text<F>(html: &str, to_markdown: F) -> String
where
    F: FnOnce(&str) -> String + panic::UnwindSafe,
{
    match panic::catch_unwind(|| to_markdown(html)) {
        Ok(md) => md.trim().to_string(),
        Err(_) => {
            // The default panic hook has already written the converter's message to stderr.
            warn!("Markdown converter panicked (see message above); falling back to plain text");
            body_to_plain_text(html)
        }
    }
}

/// Strip HTML to plain text using scraper.
pub(crate) fn body_to_plain_text(body: &str) -> String {
    let fragment = Html::parse_fragment(body);
    let text: String = fragment.root_element().text().collect();
    text.trim().to_string()
}

pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

struct MacroPatterns {
    code_macro: Regex,
    language: Regex,
    body: Regex,
}

fn macro_patterns() -> Option<&'static MacroPatterns> {
    static PATTERNS: OnceLock<Option<MacroPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(MacroPatterns {
                code_macro: Regex::new(
                    r#"(?s)<ac:structured-macro\b[^>]*\bac:name="(?:code|noformat)"[^>]*>(.*?)</ac:structured-macro>"#,
                )
                .ok()?,
                language: Regex::new(
                    r#"<ac:parameter\b[^>]*\bac:name="language"[^>]*>([^<]*)</ac:parameter>"#,
                )
                .ok()?,
                body: Regex::new(
                    r#"(?s)<ac:plain-text-body>\s*<!\[CDATA\[(.*?)\]\]>\s*</ac:plain-text-body>"#,
                )
                .ok()?,
            })
        })
        .as_ref()
}

/// Code and noformat macros keep their text in CDATA, which HTML parsers drop. Rewrite them
/// to `<pre><code>` so the code survives conversion.
pub(crate) fn rewrite_code_macros(html: &str) -> String {
    let Some(patterns) = macro_patterns() else {
        return html.to_string();
    };
    patterns
        .code_macro
        .replace_all(html, |caps: &Captures| {
            let inner = &caps[1];
            let code = patterns
                .body
                .captures(inner)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
                .unwrap_or("");
            match patterns
                .language
                .captures(inner)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim())
                .filter(|l| !l.is_empty())
            {
                Some(lang) => format!(
                    "<pre><code class=\"language-{}\">{}</code></pre>",
                    html_escape(lang),
                    html_escape(code)
                ),
                None => format!("<pre><code>{}</code></pre>", html_escape(code)),
            }
        })
        .into_owned()
}
