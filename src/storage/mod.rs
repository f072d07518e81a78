//! Storage abstractions for the archive index.
//!
//! The index lives in a key-value store with ranked-set support. The
//! production backend is Redis; an in-memory backend backs local
//! development and tests.
//!
//! ## Key layout
//!
//! ```text
//! currentAnchor / startAnchor / endAnchor   # crawl anchors, "<id>:<epoch>"
//! isForwards / traversedAll                 # crawl flags, "true"/"false"
//! historyAnchor / historyExhausted          # bulk-history reader state
//! submissions:<id>                          # raw submission JSON
//! links                                     # hash: id -> "[title](permalink)"
//! upvotes                                   # zset: id scored by upvote count
//! search:<term> / flair:<name>              # zsets: id scored by created_utc
//! flairs                                    # set of known flair names
//! ```

pub mod anchors;
pub mod memory;
pub mod redis;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

// Re-export for convenience
pub use anchors::AnchorStore;
pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Store key constants.
pub mod keys {
    /// The crawl resume point.
    pub const CURRENT_ANCHOR: &str = "currentAnchor";

    /// The earliest known submission.
    pub const START_ANCHOR: &str = "startAnchor";

    /// The newest locked submission.
    pub const END_ANCHOR: &str = "endAnchor";

    /// Crawl direction flag, boolean-as-string.
    pub const IS_FORWARDS: &str = "isForwards";

    /// Whether the listing history has been fully traversed.
    pub const TRAVERSED_ALL: &str = "traversedAll";

    /// The bulk-history reader's last seen position.
    pub const HISTORY_ANCHOR: &str = "historyAnchor";

    /// Whether the bulk-history source has been read to its end.
    pub const HISTORY_EXHAUSTED: &str = "historyExhausted";

    /// Prefix for full submission records.
    pub const SUBMISSION_PREFIX: &str = "submissions:";

    /// Hash of submission ID to display string.
    pub const LINKS: &str = "links";

    /// Global ranked set of submission IDs scored by upvotes.
    pub const UPVOTES: &str = "upvotes";

    /// Prefix for per-term ranked sets.
    pub const SEARCH_PREFIX: &str = "search:";

    /// Prefix for per-flair ranked sets.
    pub const FLAIR_PREFIX: &str = "flair:";

    /// Set of all known flair names.
    pub const FLAIRS: &str = "flairs";
}

/// A member/score pair in a ranked set.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

impl ScoredMember {
    pub fn new(member: impl Into<String>, score: f64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

/// Trait for archive index store backends.
///
/// Each method is a single store operation, atomic on the backend's own
/// terms; no multi-key transactions are offered or required.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Read a string value, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key.
    async fn del(&self, key: &str) -> Result<()>;

    /// Write several string values in one call.
    async fn set_many(&self, pairs: &[(String, String)]) -> Result<()>;

    /// Add members to a ranked set, updating scores of existing members.
    async fn zadd(&self, key: &str, entries: &[ScoredMember]) -> Result<()>;

    /// All members of a ranked set in score order (ties by member).
    async fn zrange_all(&self, key: &str) -> Result<Vec<ScoredMember>>;

    /// A member's score in a ranked set, `None` when absent.
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>>;

    /// Write several hash fields in one call.
    async fn hset_many(&self, key: &str, fields: &[(String, String)]) -> Result<()>;

    /// Read a whole hash.
    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Add members to a plain set.
    async fn sadd(&self, key: &str, members: &[String]) -> Result<()>;

    /// All members of a plain set, in unspecified order.
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;
}
