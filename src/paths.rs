//! On-disk layout of an export.
//!
//! A page lives at `{ancestor dirs}/{Title}_{ID}.{ext}`; its children go into the sibling
//! directory `{Title}_{ID}/`, and its historical versions into
//! `{Title}_{ID}/versions/v{N}_{YYYY-MM-DD}/{Title}_v{N}_{YYYY-MM-DD}.{ext}`. The id in every
//! segment keeps paths unique even when titles collide.

use crate::model::{PageRef, VersionInfo};
use std::path::{Path, PathBuf};

/// Sanitized titles are cut to this many UTF-8 bytes, on a character boundary, so that
/// `{Title}_{ID}.{ext}` and the version file names stay under the 255-byte name limit of
/// common filesystems.
pub const MAX_TITLE_BYTES: usize = 200;

const VERSIONS_DIR: &str = "versions";

/// Replace every character other than alphanumerics, `.`, `-` and `_` with `_`.
///
/// Deterministic and idempotent: the output only contains characters that map to themselves.
pub fn sanitize(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_TITLE_BYTES));
    for c in s.chars() {
        let c = if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
            c
        } else {
            '_'
        };
        if out.len() + c.len_utf8() > MAX_TITLE_BYTES {
            break;
        }
        out.push(c);
    }
    if out.is_empty() {
        "untitled".to_string()
    } else {
        out
    }
}

/// `{Title}_{ID}`: name of a page's file stem and of its children directory.
pub fn page_segment(page: &PageRef) -> String {
    format!("{}_{}", sanitize(&page.title), sanitize(&page.id))
}

/// Where one page is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePaths {
    /// The page's own file.
    pub file: PathBuf,
    /// Directory for its children and version history; created only when needed.
    pub dir: PathBuf,
}

/// Paths for `page` given its ancestors, root first.
pub fn page_paths(root: &Path, ancestors: &[PageRef], page: &PageRef, ext: &str) -> PagePaths {
    let parent_dir = ancestors
        .iter()
        .fold(root.to_path_buf(), |dir, a| dir.join(page_segment(a)));
    let segment = page_segment(page);
    PagePaths {
        file: parent_dir.join(format!("{}.{}", segment, ext)),
        dir: parent_dir.join(segment),
    }
}

/// File for a historical version, under the page's directory.
pub fn version_path(page_dir: &Path, page: &PageRef, version: &VersionInfo, ext: &str) -> PathBuf {
    let date = version.created.format("%Y-%m-%d");
    page_dir
        .join(VERSIONS_DIR)
        .join(format!("v{}_{}", version.number, date))
        .join(format!(
            "{}_v{}_{}.{}",
            sanitize(&page.title),
            version.number,
            date,
            ext
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn page(id: &str, title: &str) -> PageRef {
        PageRef {
            id: id.to_string(),
            title: title.to_string(),
            parent_id: None,
        }
    }

    #[test]
    fn sanitize_replaces_illegal_characters() {
        assert_eq!(sanitize("Team Handbook"), "Team_Handbook");
        assert_eq!(sanitize("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize("Release 1.2-rc_1"), "Release_1.2-rc_1");
    }

    #[test]
    fn sanitize_keeps_unicode_letters() {
        assert_eq!(sanitize("Über Straße"), "Über_Straße");
        assert_eq!(sanitize("Подсистема"), "Подсистема");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let long = "x".repeat(300);
        let cjk = "設計 ".repeat(100);
        for title in [
            "",
            "   ",
            "Team Handbook",
            "../../etc/passwd",
            "Q&A: what? why!",
            "tab\tnew\nline",
            "日本語 タイトル",
            long.as_str(),
            cjk.as_str(),
        ] {
            let once = sanitize(title);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", title);
        }
    }

    #[test]
    fn sanitize_empty_becomes_untitled() {
        assert_eq!(sanitize(""), "untitled");
    }

    #[test]
    fn sanitize_truncates_long_titles() {
        assert_eq!(sanitize(&"a".repeat(500)).len(), MAX_TITLE_BYTES);
    }

    #[test]
    fn sanitize_budgets_bytes_not_characters() {
        // 3 bytes per character: 66 fit, the 67th would cross the budget.
        let out = sanitize(&"設計".repeat(120));
        assert_eq!(out.len(), 198);
        assert_eq!(out.chars().count(), 66);
        assert_eq!(sanitize(&out), out);
    }

    #[test]
    fn long_cjk_titles_give_short_enough_file_names() {
        let p = page("123456789", &"設計".repeat(127));
        let paths = page_paths(Path::new("out"), &[], &p, "md");
        let name = paths.file.file_name().and_then(|n| n.to_str()).unwrap();
        assert!(name.len() <= 255, "{} bytes", name.len());

        let v = VersionInfo {
            number: 12,
            created: NaiveDate::from_ymd_opt(2024, 1, 9).unwrap(),
        };
        let vp = version_path(&paths.dir, &p, &v, "md");
        let name = vp.file_name().and_then(|n| n.to_str()).unwrap();
        assert!(name.len() <= 255, "{} bytes", name.len());
    }

    #[test]
    fn root_page_paths() {
        let p = page_paths(Path::new("output"), &[], &page("100", "Team Handbook"), "md");
        assert_eq!(p.file, PathBuf::from("output/Team_Handbook_100.md"));
        assert_eq!(p.dir, PathBuf::from("output/Team_Handbook_100"));
    }

    #[test]
    fn nested_page_paths_follow_ancestors() {
        let ancestors = [page("100", "Team Handbook"), page("101", "Onboarding")];
        let p = page_paths(Path::new("output"), &ancestors, &page("102", "Day 1"), "doc");
        assert_eq!(
            p.file,
            PathBuf::from("output/Team_Handbook_100/Onboarding_101/Day_1_102.doc")
        );
    }

    #[test]
    fn colliding_titles_get_distinct_paths() {
        let a = page_paths(Path::new("out"), &[], &page("1", "Notes?"), "md");
        let b = page_paths(Path::new("out"), &[], &page("2", "Notes!"), "md");
        assert_ne!(a.file, b.file);
    }

    #[test]
    fn version_path_layout() {
        let v = VersionInfo {
            number: 2,
            created: NaiveDate::from_ymd_opt(2024, 1, 9).unwrap(),
        };
        let path = version_path(
            Path::new("output/Team_Handbook_100"),
            &page("100", "Team Handbook"),
            &v,
            "md",
        );
        assert_eq!(
            path,
            PathBuf::from(
                "output/Team_Handbook_100/versions/v2_2024-01-09/Team_Handbook_v2_2024-01-09.md"
            )
        );
    }
}
