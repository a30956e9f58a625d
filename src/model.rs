//! Strict data model for one export run.
//!
//! Confluence answers with loosely-typed JSON; [crate::confluence::api] maps it into these
//! types at the boundary so the rest of the crate never touches raw response data.

use chrono::NaiveDate;
use std::path::PathBuf;

/// Identifies one page. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRef {
    pub id: String,
    pub title: String,
    pub parent_id: Option<String>,
}

/// One snapshot of a page's history: version number and the day it was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub number: u32,
    pub created: NaiveDate,
}

/// A fetched page state, current or historical.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub page: PageRef,
    /// Confluence storage-format body (XHTML with `ac:` macros).
    pub body_html: String,
    pub version: VersionInfo,
    pub space_key: Option<String>,
    /// Browser link to the page, when the API reported one.
    pub web_url: Option<String>,
}

/// One visited page in the export tree. Lives only for the duration of a run.
#[derive(Debug, Clone)]
pub struct ExportNode {
    pub page: PageRef,
    pub output_path: PathBuf,
    /// False when conversion or writing failed; children are still exported.
    pub written: bool,
    /// Children in the order the API returned them.
    pub children: Vec<ExportNode>,
}

impl ExportNode {
    /// Number of nodes in this subtree, including self.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(ExportNode::count).sum::<usize>()
    }

    /// Depth-first search for a node by page id.
    pub fn find(&self, id: &str) -> Option<&ExportNode> {
        if self.page.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, children: Vec<ExportNode>) -> ExportNode {
        ExportNode {
            page: PageRef {
                id: id.to_string(),
                title: format!("Page {}", id),
                parent_id: None,
            },
            output_path: PathBuf::from(format!("{}.md", id)),
            written: true,
            children,
        }
    }

    #[test]
    fn count_includes_all_descendants() {
        let tree = node("1", vec![node("2", vec![node("4", vec![])]), node("3", vec![])]);
        assert_eq!(tree.count(), 4);
    }

    #[test]
    fn find_locates_nested_node() {
        let tree = node("1", vec![node("2", vec![node("4", vec![])]), node("3", vec![])]);
        assert_eq!(
            tree.find("4").map(|n| n.output_path.clone()),
            Some(PathBuf::from("4.md"))
        );
        assert!(tree.find("9").is_none());
    }
}
