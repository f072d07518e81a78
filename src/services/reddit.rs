// src/services/reddit.rs

//! Listing and inbox HTTP client.
//!
//! Every response's rate-limit headers feed the shared limiter; a 429
//! waits out the reset and transparently retries the same request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use crate::error::{AppError, Result, dfatal};
use crate::limiter::{RateLimitSnapshot, RateLimiter};
use crate::models::{Config, ListingChild, ListingItem, ListingPage};
use crate::services::{Mailbox, SubmissionSource};

/// Number of inbox items one mark-read call may carry.
pub const MARK_READ_BATCH: usize = 25;

const RATE_LIMIT_HEADERS: [&str; 3] = [
    "X-Ratelimit-Used",
    "X-Ratelimit-Remaining",
    "X-Ratelimit-Reset",
];

/// Query parameters for one listing request.
///
/// At most one of `before`/`after` may be set; a request carrying both is
/// a configuration error.
#[derive(Debug, Clone)]
pub struct ListingQuery {
    pub time: String,
    pub limit: u32,
    pub after: Option<String>,
    pub before: Option<String>,
    pub count: u64,
    pub show: String,
}

impl ListingQuery {
    pub fn new(limit: u32) -> Self {
        Self {
            time: "all".to_string(),
            limit,
            after: None,
            before: None,
            count: 0,
            show: "all".to_string(),
        }
    }

    /// Reject requests with both cursors set.
    pub fn validate(&self) -> Result<()> {
        if self.after.is_some() && self.before.is_some() {
            return Err(AppError::ConflictingCursors);
        }
        Ok(())
    }

    fn descriptor(&self) -> String {
        match (&self.before, &self.after) {
            (Some(before), _) => format!("before {before}"),
            (_, Some(after)) => format!("after {after}"),
            _ => "from start".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ListingEnvelope {
    data: ListingBody,
}

#[derive(Deserialize)]
struct ListingBody {
    #[serde(default)]
    children: Vec<ListingChild>,
    #[serde(default)]
    before: Option<String>,
    #[serde(default)]
    after: Option<String>,
}

/// Parse a rate-limit snapshot from response headers.
///
/// Returns `None` when no rate-limit headers are present. When they are
/// present, all three must parse as integers or the whole snapshot is
/// rejected; no partial snapshot is ever produced.
pub fn snapshot_from_headers(headers: &HeaderMap) -> Result<Option<RateLimitSnapshot>> {
    let mut values = [0u32; 3];
    let mut seen = 0;

    for (i, name) in RATE_LIMIT_HEADERS.iter().enumerate() {
        let Some(value) = headers.get(*name) else {
            continue;
        };
        let text = value.to_str().unwrap_or_default();
        values[i] = text.trim().parse().map_err(|_| AppError::RateLimitHeader {
            header: (*name).to_string(),
            value: text.to_string(),
        })?;
        seen += 1;
    }

    match seen {
        0 => Ok(None),
        3 => Ok(Some(RateLimitSnapshot::new(
            Utc::now(),
            values[0],
            values[1],
            values[2],
        ))),
        _ => Err(AppError::RateLimitHeader {
            header: "X-Ratelimit-*".to_string(),
            value: format!("{seen} of 3 headers present"),
        }),
    }
}

/// HTTP client for the listing and inbox APIs.
pub struct RedditClient {
    http: Client,
    base: Url,
    subreddit: String,
    limiter: Arc<RateLimiter>,
    is_production: bool,
}

impl RedditClient {
    pub fn new(config: &Config, limiter: Arc<RateLimiter>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(&config.reddit.user_agent)
            .timeout(Duration::from_secs(config.reddit.timeout_secs))
            .build()?;
        let base = Url::parse(&config.reddit.url)?;

        Ok(Self {
            http,
            base,
            subreddit: config.subreddit.name.clone(),
            limiter,
            is_production: config.application.is_production,
        })
    }

    /// Fetch one page of the subreddit's submission listing.
    pub async fn submissions(&self, query: &ListingQuery) -> Result<ListingPage> {
        if let Err(err) = query.validate() {
            dfatal(self.is_production, &err);
            return Err(err);
        }

        log::info!("Reading submissions {}.", query.descriptor());

        let mut params: Vec<(&str, String)> = vec![
            ("t", query.time.clone()),
            ("limit", query.limit.to_string()),
            ("count", query.count.to_string()),
            ("show", query.show.clone()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(after) = &query.after {
            params.push(("after", after.clone()));
        }
        if let Some(before) = &query.before {
            params.push(("before", before.clone()));
        }

        let url = self.base.join(&format!("r/{}/new.json", self.subreddit))?;
        let body = self.get_with_backoff(url, &params).await?;

        let envelope: ListingEnvelope = serde_json::from_str(&body)?;
        let mut items = Vec::with_capacity(envelope.data.children.len());
        for child in envelope.data.children {
            items.push(ListingItem::from_child(child)?);
        }

        Ok(ListingPage {
            items,
            before: none_if_empty(envelope.data.before),
            after: none_if_empty(envelope.data.after),
        })
    }

    /// GET with transparent 429 handling.
    async fn get_with_backoff(&self, url: Url, params: &[(&str, String)]) -> Result<String> {
        loop {
            let response = self.http.get(url.clone()).query(params).send().await?;
            self.observe_rate_limit(response.headers());

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                self.wait_out_limit().await;
                continue;
            }
            if !status.is_success() {
                return Err(AppError::status(status.as_u16(), url.to_string()));
            }

            return Ok(response.text().await?);
        }
    }

    /// POST a form with transparent 429 handling.
    async fn post_form(&self, url: Url, form: &[(&str, String)]) -> Result<()> {
        loop {
            let response = self.http.post(url.clone()).form(form).send().await?;
            self.observe_rate_limit(response.headers());

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                self.wait_out_limit().await;
                continue;
            }
            if !status.is_success() {
                return Err(AppError::status(status.as_u16(), url.to_string()));
            }

            return Ok(());
        }
    }

    async fn wait_out_limit(&self) {
        let wait = self
            .limiter
            .blocked_for()
            .unwrap_or(Duration::from_secs(1));
        log::info!("Rate limited; retrying in {}s.", wait.as_secs().max(1));
        tokio::time::sleep(wait).await;
    }

    /// Feed the limiter from response headers. Responses without the
    /// headers are fine; present-but-unparseable headers follow the
    /// malformed-input policy and leave the previous snapshot in place.
    fn observe_rate_limit(&self, headers: &HeaderMap) {
        match snapshot_from_headers(headers) {
            Ok(Some(snapshot)) => self.limiter.observe(snapshot),
            Ok(None) => {}
            Err(err) => dfatal(self.is_production, &err),
        }
    }
}

#[async_trait]
impl SubmissionSource for RedditClient {
    async fn submissions(&self, query: &ListingQuery) -> Result<ListingPage> {
        RedditClient::submissions(self, query).await
    }
}

#[async_trait]
impl Mailbox for RedditClient {
    async fn unread(&self) -> Result<Vec<ListingItem>> {
        let url = self.base.join("message/unread.json")?;
        let params = [
            ("limit", "100".to_string()),
            ("raw_json", "1".to_string()),
        ];
        let body = self.get_with_backoff(url, &params).await?;

        let envelope: ListingEnvelope = serde_json::from_str(&body)?;
        envelope
            .data
            .children
            .into_iter()
            .map(ListingItem::from_child)
            .collect()
    }

    async fn reply(&self, parent_full_id: &str, body: &str) -> Result<()> {
        let url = self.base.join("api/comment")?;
        let form = [
            ("thing_id", parent_full_id.to_string()),
            ("text", body.to_string()),
            ("api_type", "json".to_string()),
        ];
        self.post_form(url, &form).await
    }

    async fn mark_read(&self, ids: &[String]) -> Result<()> {
        for batch in ids.chunks(MARK_READ_BATCH) {
            log::info!("Marking {} message(s) as read.", batch.len());
            let url = self.base.join("api/read_message")?;
            let form = [("id", batch.join(","))];
            self.post_form(url, &form).await?;
        }
        Ok(())
    }
}

fn none_if_empty(cursor: Option<String>) -> Option<String> {
    cursor.filter(|value| !value.is_empty())
}
