// src/services/history.rs

//! Bulk-history backfill reader.
//!
//! Walks the secondary bulk-search API strictly forward through the
//! subreddit's past, independently of the live listing's cursors. The
//! bulk API pages by `<=` semantics on the creation epoch, so each
//! request asks for records before `last seen epoch + 1`; the boundary
//! record comes back again and is dropped by ID. A batch consisting
//! entirely of one epoch advances the stored epoch by one unit so the
//! next request's bound still moves, at the cost of possibly skipping
//! co-timestamped records beyond the batch size.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::value::RawValue;

use crate::error::{AppError, Result, dfatal};
use crate::index::SearchIndex;
use crate::models::{Anchor, Config, Submission};
use crate::storage::AnchorStore;

/// An epoch-paged source of historical submissions.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Up to `limit` records with creation epoch below `before`, newest
    /// history first; the newest available when `before` is `None`.
    async fn batch(&self, limit: u32, before: Option<i64>) -> Result<Vec<Submission>>;
}

#[derive(Deserialize)]
struct HistoryData {
    #[serde(default)]
    data: Vec<Box<RawValue>>,
}

/// HTTP client for the bulk-history API.
pub struct BulkHistoryClient {
    http: Client,
    url: String,
    subreddit: String,
}

impl BulkHistoryClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .user_agent(&config.reddit.user_agent)
            .timeout(Duration::from_secs(config.reddit.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            url: config.history.url.clone(),
            subreddit: config.subreddit.name.clone(),
        })
    }
}

#[async_trait]
impl HistorySource for BulkHistoryClient {
    async fn batch(&self, limit: u32, before: Option<i64>) -> Result<Vec<Submission>> {
        let mut params = vec![
            ("subreddit", self.subreddit.clone()),
            ("limit", limit.to_string()),
        ];
        if let Some(before) = before {
            params.push(("before", before.to_string()));
        }

        let response = self.http.get(&self.url).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::status(status.as_u16(), self.url.clone()));
        }

        let body: HistoryData = response.json().await?;
        body.data.into_iter().map(Submission::from_raw).collect()
    }
}

/// Outcome of one history batch read.
#[derive(Debug)]
pub enum BatchOutcome {
    /// Records were obtained. `may_skip` carries the affected epoch when
    /// the whole batch shared one timestamp and the anchor had to jump.
    Batch {
        submissions: Vec<Submission>,
        may_skip: Option<i64>,
    },
    /// The source has no more records; an expected steady state, not an
    /// error.
    Exhausted,
}

/// Strictly-forward reader over the bulk-history source.
pub struct HistoryReader {
    source: Arc<dyn HistorySource>,
    anchors: AnchorStore,
    limit: u32,
    is_production: bool,
}

impl HistoryReader {
    pub fn new(source: Arc<dyn HistorySource>, anchors: AnchorStore, config: &Config) -> Self {
        Self {
            source,
            anchors,
            limit: config.subreddit.limit,
            is_production: config.application.is_production,
        }
    }

    /// Read one batch, persisting the reader's position.
    ///
    /// Callers must wait the configured delay between batches; the bulk
    /// API's rate limits are informal and handled by pacing, not headers.
    pub async fn read_batch(&self) -> Result<BatchOutcome> {
        // Below 2, the inclusive boundary can never make progress.
        if self.limit < 2 {
            let err = AppError::InvalidLimit(self.limit);
            dfatal(self.is_production, &err);
            return Err(err);
        }

        if self.anchors.history_exhausted().await? {
            return Ok(BatchOutcome::Exhausted);
        }

        let last = self.anchors.history_anchor().await?;

        // `+ 1` keeps the boundary inclusive: the last recorded record
        // may share its epoch with records that fell outside the
        // previous batch's limit.
        let before = last.as_ref().map(|anchor| anchor.created_utc + 1);
        let mut submissions = self.source.batch(self.limit, before).await?;

        if let Some(last) = &last {
            if let Some(pos) = submissions.iter().position(|s| s.id == last.id) {
                submissions.drain(..=pos);
            }
        }

        if submissions.is_empty() {
            // Only the boundary record (or nothing) came back: the
            // history is fully read.
            self.anchors.clear_history_anchor().await?;
            self.anchors.set_history_exhausted(true).await?;
            log::info!("Bulk history fully read.");
            return Ok(BatchOutcome::Exhausted);
        }

        let terminal = &submissions[submissions.len() - 1];
        let mut next = Anchor::new(terminal.id.clone(), terminal.created_utc);

        let mut may_skip = None;
        if let Some(last) = &last {
            if terminal.created_utc == last.created_utc {
                // The whole batch shares the anchor's epoch; move time
                // forward so the next request's bound advances even
                // though the ID did not.
                next.created_utc += 1;
                may_skip = Some(terminal.created_utc);
                log::warn!(
                    "History batch returned all epoch {}; records sharing it beyond the batch \
                     may be skipped.",
                    terminal.created_utc
                );
            }
        }

        self.anchors.set_history_anchor(&next).await?;
        Ok(BatchOutcome::Batch {
            submissions,
            may_skip,
        })
    }

    /// Drain the source into the index, waiting `delay` between batches.
    pub async fn backfill(&self, index: &SearchIndex, delay: Duration) -> Result<usize> {
        let mut total = 0;
        loop {
            match self.read_batch().await? {
                BatchOutcome::Batch { submissions, .. } => {
                    index.add_submissions(&submissions).await?;
                    total += submissions.len();
                    log::info!("Backfilled {} submissions ({total} total).", submissions.len());
                    tokio::time::sleep(delay).await;
                }
                BatchOutcome::Exhausted => return Ok(total),
            }
        }
    }
}
