//! Search index over archived submissions.
//!
//! The write path fans one batch of submissions out into the record
//! store, the display-string hash, the global upvote ranking, and the
//! per-term and per-flair ranked sets. Each structure is written with its
//! own bulk operation; there is no cross-structure transaction. A failed
//! auxiliary write is logged and left behind, never rolled back, so the
//! index may run ahead of itself but the canonical submission records are
//! never silently dropped.

pub mod aliases;
pub mod query;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::models::Submission;
use crate::storage::{ArchiveStore, ScoredMember, keys};

pub use aliases::AliasTable;
pub use query::QueryEngine;

/// Write path of the search index.
pub struct SearchIndex {
    store: Arc<dyn ArchiveStore>,
    aliases: Arc<AliasTable>,
}

impl SearchIndex {
    pub fn new(store: Arc<dyn ArchiveStore>, aliases: Arc<AliasTable>) -> Self {
        Self { store, aliases }
    }

    /// Archive a batch of submissions.
    ///
    /// Re-ingesting a submission is idempotent: records and display
    /// strings are overwritten and ranked-set members keep last-written
    /// scores. Only a failure to store the canonical records is an error;
    /// failures in the derived structures are logged and skipped.
    pub async fn add_submissions(&self, submissions: &[Submission]) -> Result<()> {
        if submissions.is_empty() {
            return Ok(());
        }

        let records: Vec<(String, String)> = submissions
            .iter()
            .map(|s| {
                (
                    format!("{}{}", keys::SUBMISSION_PREFIX, s.id),
                    s.raw_json().to_string(),
                )
            })
            .collect();
        self.store.set_many(&records).await?;

        let links: Vec<(String, String)> = submissions
            .iter()
            .map(|s| (s.id.clone(), s.display_string()))
            .collect();
        if let Err(err) = self.store.hset_many(keys::LINKS, &links).await {
            log::error!("could not store display strings: {err}");
        }

        if let Err(err) = self.update_votes(submissions).await {
            log::error!("could not update upvote ranking: {err}");
        }

        for (term, entries) in self.term_entries(submissions) {
            let key = format!("{}{}", keys::SEARCH_PREFIX, term);
            if let Err(err) = self.store.zadd(&key, &entries).await {
                log::error!("could not update ranked set {key}: {err}");
            }
        }

        let mut flair_names = Vec::new();
        for (flair, entries) in Self::flair_entries(submissions) {
            let key = format!("{}{}", keys::FLAIR_PREFIX, flair);
            if let Err(err) = self.store.zadd(&key, &entries).await {
                log::error!("could not update ranked set {key}: {err}");
            }
            flair_names.push(flair);
        }

        if let Err(err) = self.store.sadd(keys::FLAIRS, &flair_names).await {
            log::error!("could not record flair names: {err}");
        }

        Ok(())
    }

    /// Refresh upvote scores for re-visited submissions.
    pub async fn update_votes(&self, submissions: &[Submission]) -> Result<()> {
        let entries: Vec<ScoredMember> = submissions
            .iter()
            .map(|s| ScoredMember::new(s.id.clone(), s.upvotes as f64))
            .collect();
        self.store.zadd(keys::UPVOTES, &entries).await
    }

    /// Group batch members by canonical search term.
    fn term_entries(&self, submissions: &[Submission]) -> HashMap<String, Vec<ScoredMember>> {
        let mut grouped: HashMap<String, Vec<ScoredMember>> = HashMap::new();
        for submission in submissions {
            for term in self.aliases.matches(&submission.title) {
                grouped
                    .entry(term.to_string())
                    .or_default()
                    .push(ScoredMember::new(
                        submission.id.clone(),
                        submission.created_utc as f64,
                    ));
            }
        }
        grouped
    }

    /// Group batch members by flair. The empty flair is a valid set.
    fn flair_entries(submissions: &[Submission]) -> HashMap<String, Vec<ScoredMember>> {
        let mut grouped: HashMap<String, Vec<ScoredMember>> = HashMap::new();
        for submission in submissions {
            grouped
                .entry(submission.flair.clone())
                .or_default()
                .push(ScoredMember::new(
                    submission.id.clone(),
                    submission.created_utc as f64,
                ));
        }
        grouped
    }
}
