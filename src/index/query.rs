//! Read path of the search index.
//!
//! A query's first token is tried against the alias table; on a hit it
//! selects the term set and the remaining tokens filter by flair, else
//! the whole argument string is the flair filter. When both a term set
//! and a flair set resolve, their intersection is taken by member
//! identity, iterating the larger set in its retrieval order against the
//! smaller set's membership. Results therefore follow the larger set's
//! retrieval order rather than strict recency; this weak ordering is
//! deliberate and part of the observable contract.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::index::AliasTable;
use crate::storage::{ArchiveStore, ScoredMember, keys};

/// Maximum results returned for one query.
pub const RESULT_CAP: usize = 25;

/// Read path of the search index.
pub struct QueryEngine {
    store: Arc<dyn ArchiveStore>,
    aliases: Arc<AliasTable>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn ArchiveStore>, aliases: Arc<AliasTable>) -> Self {
        Self { store, aliases }
    }

    /// Run a search and return the matching display strings, capped.
    ///
    /// Members whose display string is missing from the link store are
    /// skipped rather than failing the query.
    pub async fn search(&self, args: &str) -> Result<Vec<String>> {
        let tokens: Vec<&str> = args.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let (term, flair_filter) = match self.aliases.resolve(tokens[0]) {
            Some(canonical) => (Some(canonical.to_string()), tokens[1..].join(" ")),
            None => (None, tokens.join(" ")),
        };

        let term_set = match &term {
            Some(term) => {
                self.store
                    .zrange_all(&format!("{}{}", keys::SEARCH_PREFIX, term))
                    .await?
            }
            None => Vec::new(),
        };

        let flair_set = if flair_filter.is_empty() {
            Vec::new()
        } else {
            self.store
                .zrange_all(&format!("{}{}", keys::FLAIR_PREFIX, flair_filter))
                .await?
        };

        let mut results = if !term_set.is_empty() && !flair_set.is_empty() {
            intersect(term_set, flair_set)
        } else if !term_set.is_empty() {
            term_set
        } else {
            flair_set
        };
        results.truncate(RESULT_CAP);

        let links = self.store.hget_all(keys::LINKS).await?;
        Ok(results
            .into_iter()
            .filter_map(|entry| match links.get(&entry.member) {
                Some(link) => Some(link.clone()),
                None => {
                    log::debug!("no display string for indexed member {}", entry.member);
                    None
                }
            })
            .collect())
    }
}

/// Intersect two ranked sets by member identity.
///
/// Iterates the larger set in its retrieval order, testing membership
/// against the smaller set, and stops once the smaller set's full
/// membership could have been covered.
pub fn intersect(a: Vec<ScoredMember>, b: Vec<ScoredMember>) -> Vec<ScoredMember> {
    let (larger, smaller) = if a.len() >= b.len() { (a, b) } else { (b, a) };

    let base: HashSet<&str> = smaller.iter().map(|entry| entry.member.as_str()).collect();
    let cap = base.len();

    let mut shared = Vec::with_capacity(cap);
    for entry in larger {
        if base.contains(entry.member.as_str()) {
            shared.push(entry);
            if shared.len() >= cap {
                break;
            }
        }
    }
    shared
}
