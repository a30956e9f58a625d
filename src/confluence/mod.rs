//! Confluence access: the page-source contract the exporter drives, plus the REST client that
//! implements it.

pub mod api;
mod client;
mod error;

pub use api::ConfluenceApi;
pub use client::{Credentials, RestClient, RestClientBuilder};
pub use error::ApiError;

use crate::model::{PageContent, PageRef, VersionInfo};

/// Where pages come from.
///
/// Listings are complete: implementations follow pagination until the server reports no more
/// results and return entries in server order.
pub trait PageSource {
    /// Current version of a page. `NotFound` if the id does not exist, `Auth` on 401/403.
    fn page(&mut self, id: &str) -> Result<PageContent, ApiError>;

    /// A historical version of a page.
    fn page_version(&mut self, id: &str, version: u32) -> Result<PageContent, ApiError>;

    /// Direct children, empty when the page has none.
    fn children(&mut self, id: &str) -> Result<Vec<PageRef>, ApiError>;

    /// Version history, oldest first.
    fn versions(&mut self, id: &str) -> Result<Vec<VersionInfo>, ApiError>;
}
