//! Service layer for the archive bot.
//!
//! This module contains the business logic for:
//! - Walking the live listing API bidirectionally (`listing`)
//! - Backfilling from the bulk-history API (`history`)
//! - The listing/inbox HTTP client (`reddit`)
//! - Answering inbox mention commands (`inbox`)
//!
//! The upstream APIs sit behind the `SubmissionSource`, `HistorySource`,
//! and `Mailbox` traits so the crawl and reply logic can run against
//! simulated sources.

mod history;
mod inbox;
mod listing;
mod reddit;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ListingItem, ListingPage};

// Re-export all public types
pub use history::{BatchOutcome, BulkHistoryClient, HistoryReader, HistorySource};
pub use inbox::InboxProcessor;
pub use listing::{ListingCrawler, PassSummary};
pub use reddit::{ListingQuery, MARK_READ_BATCH, RedditClient, snapshot_from_headers};

/// A cursor-paginated source of listing pages.
#[async_trait]
pub trait SubmissionSource: Send + Sync {
    async fn submissions(&self, query: &ListingQuery) -> Result<ListingPage>;
}

/// The inbound/outbound message surface used by the reply processor.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Unread inbox items, newest first.
    async fn unread(&self) -> Result<Vec<ListingItem>>;

    /// Post a reply under the given fullname.
    async fn reply(&self, parent_full_id: &str, body: &str) -> Result<()>;

    /// Mark inbox items as read.
    async fn mark_read(&self, ids: &[String]) -> Result<()>;
}
