//! History API over HTTP.
//!
//! Entries live under `/history`; per-entry mutations are keyed by the
//! entry id.

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;

use concordia_core::{
    HistoryApi, HistoryEntry, HistoryFilter, HistoryPage, NewHistoryEntry, Result,
};

use crate::client::{segment, ConcordiaClient};

#[derive(Serialize)]
struct ArchivedBody {
    archived: bool,
}

#[derive(Serialize)]
struct LabelBody<'a> {
    label: Option<&'a str>,
}

fn entry_path(entry_id: &str, suffix: &str) -> String {
    format!("/history/{}{}", segment(entry_id), suffix)
}

/// Query parameters for a history listing.
fn list_params(filter: &HistoryFilter) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("archived_only", filter.archived_only.to_string()),
        ("page", filter.page.to_string()),
        ("page_size", filter.page_size.to_string()),
    ];
    if let Some(supertype) = filter.supertype {
        params.push(("supertype", supertype.as_str().to_string()));
    }
    if let Some(needle) = filter.query_contains.as_deref().filter(|q| !q.is_empty()) {
        params.push(("q", needle.to_string()));
    }
    params
}

#[async_trait]
impl HistoryApi for ConcordiaClient {
    async fn list(&self, filter: &HistoryFilter) -> Result<HistoryPage> {
        filter.validate()?;
        let req = self
            .request(Method::GET, "/history")
            .query(&list_params(filter));
        self.send_json(req, "history list").await
    }

    async fn record(&self, entry: NewHistoryEntry) -> Result<HistoryEntry> {
        let req = self.request(Method::POST, "/history").json(&entry);
        self.send_json(req, "history record").await
    }

    async fn update_tail(&self, entry_id: &str, tail: NewHistoryEntry) -> Result<HistoryEntry> {
        let req = self
            .request(Method::PUT, &entry_path(entry_id, ""))
            .json(&tail);
        self.send_json(req, "history update").await
    }

    async fn set_archived(&self, entry_id: &str, archived: bool) -> Result<()> {
        let req = self
            .request(Method::PUT, &entry_path(entry_id, "/archived"))
            .json(&ArchivedBody { archived });
        self.send_empty(req, "history archive").await
    }

    async fn soft_delete(&self, entry_id: &str) -> Result<()> {
        let req = self.request(Method::DELETE, &entry_path(entry_id, ""));
        self.send_empty(req, "history delete").await
    }

    async fn restore(&self, entry_id: &str) -> Result<()> {
        let req = self.request(Method::POST, &entry_path(entry_id, "/restore"));
        self.send_empty(req, "history restore").await
    }

    async fn rename(&self, entry_id: &str, label: Option<&str>) -> Result<()> {
        let req = self
            .request(Method::PUT, &entry_path(entry_id, "/label"))
            .json(&LabelBody { label });
        self.send_empty(req, "history rename").await
    }
}
