// src/services/inbox.rs

//! Inbox mention processing.
//!
//! Reads unread inbox items, answers `help`/`search`/`find` commands
//! addressed to the bot, and marks handled items as read. Items that are
//! not mentions are left untouched for whatever else watches the inbox.

use std::sync::Arc;

use crate::error::{Result, dfatal};
use crate::index::QueryEngine;
use crate::models::{Config, InboxItem, ListingItem, ReplyTemplates};
use crate::services::Mailbox;

/// Answers search commands from inbox mentions.
pub struct InboxProcessor {
    mailbox: Arc<dyn Mailbox>,
    query: QueryEngine,
    templates: ReplyTemplates,
    username: String,
    is_production: bool,
}

impl InboxProcessor {
    pub fn new(mailbox: Arc<dyn Mailbox>, query: QueryEngine, config: &Config) -> Self {
        Self {
            mailbox,
            query,
            templates: config.replies.clone(),
            username: config.reddit.username.clone(),
            is_production: config.application.is_production,
        }
    }

    /// One inbox pass: answer every unread mention, then mark them read.
    /// Returns the number of items handled.
    pub async fn process(&self) -> Result<usize> {
        log::info!("Reading inbox.");
        let items = self.mailbox.unread().await?;
        if items.is_empty() {
            log::info!("No new messages.");
            return Ok(0);
        }

        let mention = format!("u/{}", self.username);
        let mut read = Vec::new();

        for item in items {
            let item = match item {
                ListingItem::Comment(item) | ListingItem::Message(item) => item,
                _ => continue,
            };

            if !item.body.contains(&mention) {
                log::info!("Not a mention, skipping message {}.", item.full_id);
                continue;
            }

            match self.respond(&item).await {
                Ok(()) => read.push(item.full_id.clone()),
                Err(err) => dfatal(self.is_production, &err),
            }
        }

        let handled = read.len();
        if handled > 0 {
            self.mailbox.mark_read(&read).await?;
        }
        Ok(handled)
    }

    async fn respond(&self, item: &InboxItem) -> Result<()> {
        let templates = &self.templates;
        let prefix = format!("/u/{} ", self.username);

        let Some(rest) = item.body.strip_prefix(&prefix) else {
            log::info!(
                "Could not parse request from {} ({}).",
                item.author,
                item.full_id
            );
            let body = format!("{}{}", templates.could_not_parse, templates.footer);
            return self.mailbox.reply(&item.full_id, &body).await;
        };

        let fields: Vec<&str> = rest.split_whitespace().collect();
        let Some((command, arguments)) = fields.split_first() else {
            let body = format!("{}{}", templates.could_not_parse, templates.help_body);
            return self.mailbox.reply(&item.full_id, &body).await;
        };

        match command.to_lowercase().as_str() {
            "help" => {
                let body = format!("{}{}", templates.help_start, templates.help_body);
                self.mailbox.reply(&item.full_id, &body).await
            }
            "search" | "find" => self.search_command(item, arguments).await,
            unknown => {
                let body = format!(
                    "{}Unknown command `{unknown}`.\n\n{}",
                    templates.could_not_parse, templates.help_body
                );
                self.mailbox.reply(&item.full_id, &body).await
            }
        }
    }

    async fn search_command(&self, item: &InboxItem, arguments: &[&str]) -> Result<()> {
        let templates = &self.templates;

        if arguments.is_empty() {
            let body = format!("{}{}", templates.could_not_parse, templates.help_body);
            return self.mailbox.reply(&item.full_id, &body).await;
        }

        let argument_string = arguments.join(" ");
        let results = self.query.search(&argument_string).await?;

        if results.is_empty() {
            let body = format!(
                "{}{}",
                templates.no_results.replace("{query}", &argument_string),
                templates.footer
            );
            return self.mailbox.reply(&item.full_id, &body).await;
        }

        let list = results
            .iter()
            .map(|link| format!("- {link}"))
            .collect::<Vec<_>>()
            .join("\n\n");
        let body = format!(
            "{}\n\n{}{}",
            templates.found_results.replace("{query}", &argument_string),
            list,
            templates.footer
        );
        self.mailbox.reply(&item.full_id, &body).await
    }
}
