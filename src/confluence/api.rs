//! Confluence REST (content API) endpoints. Responses are mapped into the strict
//! [model](crate::model) types here; entries that do not fit are rejected or skipped with a
//! warning.

use crate::confluence::client::RestClient;
use crate::confluence::error::ApiError;
use crate::confluence::PageSource;
use crate::model::{PageContent, PageRef, VersionInfo};
use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use tracing::{debug, warn};

const PAGE_EXPAND: &str = "body.storage,version,space,ancestors";

/// [PageSource] backed by a live Confluence instance.
#[derive(Debug)]
pub struct ConfluenceApi {
    client: RestClient,
    api_base: String,
    page_limit: u32,
}

impl ConfluenceApi {
    /// `base_url` is the site root (e.g. `https://acme.atlassian.net`), `api_path` the REST
    /// prefix (`/wiki/rest/api` on Cloud, `/rest/api` on Server).
    pub fn new(client: RestClient, base_url: &str, api_path: &str, page_limit: u32) -> Self {
        let api_path = api_path.trim_matches('/');
        let api_base = if api_path.is_empty() {
            base_url.trim_end_matches('/').to_string()
        } else {
            format!("{}/{}", base_url.trim_end_matches('/'), api_path)
        };
        Self {
            client,
            api_base,
            page_limit: page_limit.max(1),
        }
    }

    fn content_url(&self, id: &str) -> String {
        format!("{}/content/{}", self.api_base, id)
    }

    /// Fetch every page of a `start`/`limit` listing, mapping each entry with `map`.
    fn paginate<T, F>(&mut self, url: &str, map: F) -> Result<Vec<T>, ApiError>
    where
        F: Fn(&Value) -> Option<T>,
    {
        let client = &mut self.client;
        paginate_with(url, self.page_limit, |query| client.get_json(url, query), map)
    }
}

/// Pagination loop over a listing endpoint. `fetch` performs one request with the given
/// `start`/`limit` query; results are concatenated in server order. Stops when a page carries
/// no `_links.next` or holds no entries.
fn paginate_with<T, G, F>(
    url: &str,
    page_limit: u32,
    mut fetch: G,
    map: F,
) -> Result<Vec<T>, ApiError>
where
    G: FnMut(&[(&str, String)]) -> Result<Value, ApiError>,
    F: Fn(&Value) -> Option<T>,
{
    let mut out = Vec::new();
    let mut start = 0usize;
    loop {
        let query = [
            ("start", start.to_string()),
            ("limit", page_limit.to_string()),
        ];
        let page = fetch(&query)?;
        let fetched = map_results(&page, url, &map, &mut out)?;
        if fetched == 0 || !has_next(&page) {
            break;
        }
        start += fetched;
        debug!(url, start, "fetching next page of results");
    }
    Ok(out)
}

impl PageSource for ConfluenceApi {
    fn page(&mut self, id: &str) -> Result<PageContent, ApiError> {
        let url = self.content_url(id);
        let json = self
            .client
            .get_json(&url, &[("expand", PAGE_EXPAND.to_string())])?;
        content_from_json(&json, &url)
    }

    fn page_version(&mut self, id: &str, version: u32) -> Result<PageContent, ApiError> {
        let url = self.content_url(id);
        let query = [
            ("expand", PAGE_EXPAND.to_string()),
            ("status", "historical".to_string()),
            ("version", version.to_string()),
        ];
        let json = self.client.get_json(&url, &query)?;
        content_from_json(&json, &url)
    }

    fn children(&mut self, id: &str) -> Result<Vec<PageRef>, ApiError> {
        let url = format!("{}/child/page", self.content_url(id));
        self.paginate(&url, |entry| page_ref_from_json(entry, Some(id)))
    }

    fn versions(&mut self, id: &str) -> Result<Vec<VersionInfo>, ApiError> {
        let url = format!("{}/version", self.content_url(id));
        let mut versions = self.paginate(&url, version_from_json)?;
        versions.sort_by_key(|v| v.number);
        versions.dedup_by_key(|v| v.number);
        Ok(versions)
    }
}

/// Map the `results` array of one listing page into `out`. Returns how many raw entries the
/// page held, malformed ones included, so pagination offsets stay aligned with the server.
fn map_results<T, F>(
    page: &Value,
    url: &str,
    map: &F,
    out: &mut Vec<T>,
) -> Result<usize, ApiError>
where
    F: Fn(&Value) -> Option<T>,
{
    let results = page
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::Malformed {
            url: url.to_string(),
            reason: "missing results array".to_string(),
        })?;
    for entry in results {
        match map(entry) {
            Some(item) => out.push(item),
            None => warn!(url, entry = %entry, "skipping malformed listing entry"),
        }
    }
    Ok(results.len())
}

fn has_next(page: &Value) -> bool {
    page.pointer("/_links/next")
        .and_then(Value::as_str)
        .is_some()
}

/// Ids arrive as strings from Confluence, but tolerate numbers too.
fn id_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `when` is ISO 8601 (`2024-03-05T10:12:00.000Z`); only the calendar date is kept.
fn parse_date(when: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(when) {
        return Some(dt.date_naive());
    }
    when.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

pub(crate) fn page_ref_from_json(v: &Value, parent_id: Option<&str>) -> Option<PageRef> {
    let id = v.get("id").and_then(id_of)?;
    let title = v.get("title").and_then(Value::as_str)?;
    Some(PageRef {
        id,
        title: title.trim().to_string(),
        parent_id: parent_id.map(String::from),
    })
}

pub(crate) fn version_from_json(v: &Value) -> Option<VersionInfo> {
    let number = v.get("number").and_then(Value::as_u64)?;
    let created = v.get("when").and_then(Value::as_str).and_then(parse_date)?;
    Some(VersionInfo {
        number: u32::try_from(number).ok()?,
        created,
    })
}

pub(crate) fn content_from_json(v: &Value, url: &str) -> Result<PageContent, ApiError> {
    let malformed = |reason: &str| ApiError::Malformed {
        url: url.to_string(),
        reason: reason.to_string(),
    };
    let id = v
        .get("id")
        .and_then(id_of)
        .ok_or_else(|| malformed("missing page id"))?;
    let title = v
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing title"))?;
    let body_html = v
        .pointer("/body/storage/value")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing body.storage.value"))?;
    let version = v
        .get("version")
        .and_then(version_from_json)
        .ok_or_else(|| malformed("missing or invalid version"))?;
    let parent_id = v
        .get("ancestors")
        .and_then(Value::as_array)
        .and_then(|a| a.last())
        .and_then(|a| a.get("id"))
        .and_then(id_of);
    let space_key = v
        .pointer("/space/key")
        .and_then(Value::as_str)
        .map(String::from);
    let web_url = match (
        v.pointer("/_links/base").and_then(Value::as_str),
        v.pointer("/_links/webui").and_then(Value::as_str),
    ) {
        (Some(base), Some(webui)) => Some(format!("{}{}", base.trim_end_matches('/'), webui)),
        _ => None,
    };

    Ok(PageContent {
        page: PageRef {
            id,
            title: title.trim().to_string(),
            parent_id,
        },
        body_html: body_html.to_string(),
        version,
        space_key,
        web_url,
    })
}
