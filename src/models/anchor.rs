//! Crawl position anchors.
//!
//! An anchor marks a point in the submission history's total order by
//! creation time, with ties broken by submission ID. Anchors are persisted
//! as `"<submissionID>:<epoch>"` strings so a crawl can resume across
//! process restarts.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;

use crate::error::AppError;

/// Delimiter between the ID and epoch halves of a persisted anchor.
pub const ANCHOR_DELIMITER: char = ':';

/// A resume point in the time-ordered crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Submission ID at this position.
    pub id: String,

    /// Creation time of that submission, as a Unix epoch.
    pub created_utc: i64,
}

impl Anchor {
    pub fn new(id: impl Into<String>, created_utc: i64) -> Self {
        Self {
            id: id.into(),
            created_utc,
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.id, ANCHOR_DELIMITER, self.created_utc)
    }
}

impl FromStr for Anchor {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((id, epoch)) = s.split_once(ANCHOR_DELIMITER) else {
            return Err(AppError::anchor(s, "anchor does not have 2 parts"));
        };

        if id.is_empty() {
            return Err(AppError::anchor(s, "empty submission ID"));
        }

        let created_utc: i64 = epoch
            .parse()
            .map_err(|_| AppError::anchor(s, "epoch is not an integer"))?;
        if created_utc < 0 {
            return Err(AppError::anchor(s, "epoch is negative"));
        }

        Ok(Self::new(id, created_utc))
    }
}

/// Direction of a crawl iteration over the paginated listing.
///
/// `Forwards` pages with the `after` cursor, `Backwards` with `before`.
/// Persisted as the boolean-as-string flag `"true"`/`"false"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forwards,
    Backwards,
}

impl Direction {
    /// The persisted flag value.
    pub fn flag(self) -> &'static str {
        match self {
            Direction::Forwards => "true",
            Direction::Backwards => "false",
        }
    }

    /// Parse a persisted flag value.
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "true" => Some(Direction::Forwards),
            "false" => Some(Direction::Backwards),
            _ => None,
        }
    }
}

/// The bidirectional crawl's persisted position and range.
///
/// `current` is the resume point, re-read at the start of every iteration.
/// `start` is the earliest known submission and `end` the newest locked
/// one; statistics for submissions older than a locked `end` are assumed
/// final and need not be re-fetched.
#[derive(Debug, Clone)]
pub struct CrawlState {
    /// The last processed submission.
    pub current: Option<Anchor>,

    /// The earliest known submission.
    pub start: Option<Anchor>,

    /// The newest submission considered locked.
    pub end: Option<Anchor>,

    /// Direction the next iteration resumes in.
    pub direction: Direction,

    /// Whether the entire history has been traversed.
    pub traversed_all: bool,

    /// Age past which a submission's metrics are assumed final.
    pub lock_window: Duration,
}

impl CrawlState {
    /// The epoch before which submissions are locked.
    pub fn lock_epoch(&self) -> i64 {
        Utc::now().timestamp() - self.lock_window.as_secs() as i64
    }

    /// Whether the end anchor is at or past the lock boundary.
    pub fn is_end_locked(&self) -> bool {
        self.end
            .as_ref()
            .is_some_and(|end| end.created_utc <= self.lock_epoch())
    }
}
