//! Pipeline orchestration.
//!
//! The one entry point the consuming layer calls. Stages run strictly in
//! sequence: short-link resolution, id extraction, page fetch, field
//! extraction, review extraction. Only a missing organization id or a
//! failed page fetch abort the run; every other gap degrades to defaults.

use chrono::{Local, SecondsFormat};
use log::info;

use crate::config::{Config, ACCEPT_LANGUAGE, MAPS_HOME_URL, ORG_BASE_URL};
use crate::error::{OtzyvError, Result};
use crate::fetch::{Fetch, HttpClient};
use crate::fields;
use crate::org_id;
use crate::report::Snapshot;
use crate::resolve;
use crate::reviews;
use crate::store::DebugSink;

/// Browser-mimicking headers for the organization page fetch
const PAGE_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", ACCEPT_LANGUAGE),
    ("Referer", MAPS_HOME_URL),
];

pub struct Pipeline {
    fetch: Box<dyn Fetch>,
    sink: Option<Box<dyn DebugSink>>,
}

impl Pipeline {
    /// Pipeline backed by a real HTTP client built from `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            fetch: Box::new(HttpClient::new(config)),
            sink: None,
        }
    }

    /// Pipeline over a custom transport. Tests drive the whole flow through
    /// a stub this way.
    pub fn with_fetcher(fetch: Box<dyn Fetch>) -> Self {
        Self { fetch, sink: None }
    }

    /// Attach a debug sink that receives every fetched page body.
    pub fn with_sink(mut self, sink: Box<dyn DebugSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run the full extraction for one URL.
    ///
    /// Errors only with `InvalidUrl` (no organization id anywhere) or
    /// `Upstream` (organization page unreachable). The returned snapshot is
    /// always complete; fields nothing could extract hold their defaults.
    pub fn extract(&self, url: &str) -> Result<Snapshot> {
        let url = resolve::resolve(self.fetch.as_ref(), url);
        let org_id = org_id::extract(self.fetch.as_ref(), &url)?;
        info!("extracting organization {}", org_id);

        let html = self.fetch_page(&org_id)?;
        if let Some(sink) = &self.sink {
            sink.persist(&org_id, &html);
        }

        Ok(Snapshot {
            rating: fields::rating(&html),
            review_count: fields::review_count(&html),
            company_name: fields::company_name(&html),
            company_photo: fields::company_photo(&html),
            reviews: reviews::extract(self.fetch.as_ref(), &org_id, &html),
            fetched_at: Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
        })
    }

    /// Fetch the reviews page for an organization. Any failure here is
    /// terminal for the pipeline.
    fn fetch_page(&self, org_id: &str) -> Result<String> {
        let url = format!("{}{}/reviews/", ORG_BASE_URL, org_id);

        let response = self
            .fetch
            .get(&url, PAGE_HEADERS)
            .map_err(|e| OtzyvError::Upstream(e.to_string()))?;

        if !response.is_success() {
            return Err(OtzyvError::Upstream(format!("status {}", response.status)));
        }

        info!("fetched organization page ({} bytes)", response.body.len());
        Ok(response.body)
    }
}
