// src/models/mod.rs

//! Domain models for the archive bot.

mod anchor;
mod config;
mod submission;

// Re-export all public types
pub use anchor::{ANCHOR_DELIMITER, Anchor, CrawlState, Direction};
pub use config::{
    AliasGroup, ApplicationConfig, Config, HistoryConfig, RedditConfig, RedisConfig, ReplyTemplates,
    SearchConfig, SubredditConfig,
};
pub use submission::{InboxItem, ListingChild, ListingItem, ListingPage, Submission};
