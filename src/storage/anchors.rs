//! Typed access to persisted crawl position.
//!
//! Thin wrapper over the store for the anchor keys and boolean flags;
//! parsing failures surface as `AppError::Anchor` so the caller can apply
//! the malformed-input policy.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::models::{Anchor, CrawlState, Direction};
use crate::storage::{ArchiveStore, keys};

/// Persisted crawl-position store.
#[derive(Clone)]
pub struct AnchorStore {
    store: Arc<dyn ArchiveStore>,
}

impl AnchorStore {
    pub fn new(store: Arc<dyn ArchiveStore>) -> Self {
        Self { store }
    }

    /// Read and parse one anchor key.
    pub async fn anchor(&self, key: &str) -> Result<Option<Anchor>> {
        match self.store.get(key).await? {
            Some(value) => Ok(Some(value.parse()?)),
            None => Ok(None),
        }
    }

    /// Write one anchor key.
    pub async fn set_anchor(&self, key: &str, anchor: &Anchor) -> Result<()> {
        self.store.set(key, &anchor.to_string()).await
    }

    /// Write the resume point and direction flag together.
    pub async fn set_current(&self, anchor: &Anchor, direction: Direction) -> Result<()> {
        self.set_anchor(keys::CURRENT_ANCHOR, anchor).await?;
        self.set_direction(direction).await
    }

    /// Read the stored direction flag.
    pub async fn direction(&self) -> Result<Option<Direction>> {
        Ok(self
            .store
            .get(keys::IS_FORWARDS)
            .await?
            .as_deref()
            .and_then(Direction::from_flag))
    }

    /// Write the direction flag.
    pub async fn set_direction(&self, direction: Direction) -> Result<()> {
        self.store.set(keys::IS_FORWARDS, direction.flag()).await
    }

    /// Whether the listing history has been fully traversed.
    pub async fn traversed_all(&self) -> Result<bool> {
        Ok(self.store.get(keys::TRAVERSED_ALL).await?.as_deref() == Some("true"))
    }

    pub async fn set_traversed_all(&self, traversed: bool) -> Result<()> {
        self.store
            .set(keys::TRAVERSED_ALL, if traversed { "true" } else { "false" })
            .await
    }

    /// Load the full crawl state in one pass.
    pub async fn crawl_state(&self, lock_window: Duration) -> Result<CrawlState> {
        let current = self.anchor(keys::CURRENT_ANCHOR).await?;
        let start = self.anchor(keys::START_ANCHOR).await?;
        let end = self.anchor(keys::END_ANCHOR).await?;
        let direction = self.direction().await?.unwrap_or(Direction::Forwards);
        let traversed_all = self.traversed_all().await?;

        Ok(CrawlState {
            current,
            start,
            end,
            direction,
            traversed_all,
            lock_window,
        })
    }

    /// The bulk-history reader's last seen position.
    pub async fn history_anchor(&self) -> Result<Option<Anchor>> {
        self.anchor(keys::HISTORY_ANCHOR).await
    }

    pub async fn set_history_anchor(&self, anchor: &Anchor) -> Result<()> {
        self.set_anchor(keys::HISTORY_ANCHOR, anchor).await
    }

    pub async fn clear_history_anchor(&self) -> Result<()> {
        self.store.del(keys::HISTORY_ANCHOR).await
    }

    /// Whether the bulk-history source has been read to its end.
    pub async fn history_exhausted(&self) -> Result<bool> {
        Ok(self.store.get(keys::HISTORY_EXHAUSTED).await?.as_deref() == Some("true"))
    }

    pub async fn set_history_exhausted(&self, exhausted: bool) -> Result<()> {
        self.store
            .set(
                keys::HISTORY_EXHAUSTED,
                if exhausted { "true" } else { "false" },
            )
            .await
    }
}
