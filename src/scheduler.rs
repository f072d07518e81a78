// src/scheduler.rs

//! Tick-driven scheduling of the crawl and reply loops.
//!
//! One scheduler instance owns a shared tick cadence and the shutdown
//! signal. Work loops call [`Scheduler::next_pass`] which consumes ticks
//! until the configured loop delay has elapsed and the rate limiter is
//! clear, so backoff never busy-spins. Every suspension point checks the
//! closed flag before and after; closing is one-shot and idempotent, and
//! blocked consumers observe closure within one tick interval.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use crate::error::Result;
use crate::index::SearchIndex;
use crate::limiter::RateLimiter;
use crate::models::Config;
use crate::services::{HistoryReader, InboxProcessor, ListingCrawler};

/// Scheduler lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting out the delay between passes.
    Idle,
    /// A work pass has been released.
    Running,
    /// Consuming ticks while rate limited.
    Throttled,
    /// Shut down; no further passes are released.
    Closed,
}

/// Shared tick source and cancellation signal for the work loops.
pub struct Scheduler {
    tick_speed: Duration,
    loop_delay: Duration,
    shutdown: watch::Sender<bool>,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(tick_speed: Duration, loop_delay: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            tick_speed,
            loop_delay,
            shutdown,
            state: Mutex::new(SchedulerState::Idle),
        }
    }

    /// A receiver that resolves when the scheduler closes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Close the scheduler. Idempotent: closing again is a no-op beyond
    /// re-waking any blocked tick consumers.
    pub fn close(&self) {
        let was_closed = self.shutdown.send_replace(true);
        if !was_closed {
            log::info!("Scheduler closing.");
        }
        *self.state.lock().unwrap() = SchedulerState::Closed;
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: SchedulerState) {
        let mut held = self.state.lock().unwrap();
        if *held != SchedulerState::Closed {
            *held = state;
        }
    }

    /// Wait one tick. Returns false when the scheduler has closed, with
    /// the flag checked before and after the suspension.
    pub async fn tick(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut shutdown = self.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(self.tick_speed) => !self.is_closed(),
            _ = shutdown.changed() => false,
        }
    }

    /// Block until the next work pass may run: the loop delay must have
    /// elapsed and the rate limiter must be clear. Returns false when the
    /// scheduler closed while waiting.
    pub async fn next_pass(&self, limiter: &RateLimiter) -> bool {
        self.set_state(SchedulerState::Idle);

        let mut waited = Duration::ZERO;
        while waited < self.loop_delay {
            if !self.tick().await {
                return false;
            }
            waited += self.tick_speed;
        }

        // While rate limited, keep consuming ticks without releasing
        // work.
        while limiter.is_blocked() {
            if self.state() != SchedulerState::Throttled {
                if let Some(wait) = limiter.blocked_for() {
                    log::info!("Rate limited; holding work for {}s.", wait.as_secs());
                }
                self.set_state(SchedulerState::Throttled);
            }
            if !self.tick().await {
                return false;
            }
        }

        self.set_state(SchedulerState::Running);
        true
    }
}

/// Run the bot until interrupted: backfill once, then interleave the
/// crawl and reply loops under one scheduler.
pub async fn run(
    config: &Config,
    crawler: ListingCrawler,
    history: HistoryReader,
    index: Arc<SearchIndex>,
    inbox: InboxProcessor,
    limiter: Arc<RateLimiter>,
) -> Result<()> {
    let scheduler = Arc::new(Scheduler::new(
        config.application.tick_speed(),
        config.application.loop_delay(),
    ));

    {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupt received; shutting down.");
                scheduler.close();
            }
        });
    }

    // Catch up on older history before the loops start.
    let mut shutdown = scheduler.subscribe();
    tokio::select! {
        result = history.backfill(&index, config.history.delay()) => match result {
            Ok(total) => log::info!("Backfill complete: {total} submissions."),
            Err(err) => log::error!("Backfill aborted: {err}"),
        },
        _ = shutdown.changed() => log::info!("Shut down during backfill."),
    }

    let crawl = {
        let scheduler = scheduler.clone();
        let limiter = limiter.clone();
        tokio::spawn(async move { crawl_loop(&scheduler, &crawler, &limiter).await })
    };
    let reply = {
        let scheduler = scheduler.clone();
        let limiter = limiter.clone();
        tokio::spawn(async move { reply_loop(&scheduler, &inbox, &limiter).await })
    };

    let _ = tokio::join!(crawl, reply);
    Ok(())
}

/// Crawl passes until the scheduler closes. Failures leave the anchors at
/// the last confirmed page and the pass is retried on the next release.
pub async fn crawl_loop(scheduler: &Scheduler, crawler: &ListingCrawler, limiter: &RateLimiter) {
    while scheduler.next_pass(limiter).await {
        match crawler.run_pass().await {
            Ok(summary) => {
                if let Some(direction) = summary.direction {
                    log::info!(
                        "Crawl pass ({direction:?}): {} pages, {} submissions.",
                        summary.pages,
                        summary.submissions
                    );
                }
            }
            Err(err) => log::error!("Crawl pass failed; retrying next pass: {err}"),
        }
    }
}

/// Inbox passes until the scheduler closes.
pub async fn reply_loop(scheduler: &Scheduler, inbox: &InboxProcessor, limiter: &RateLimiter) {
    while scheduler.next_pass(limiter).await {
        if let Err(err) = inbox.process().await {
            log::error!("Inbox pass failed; retrying next pass: {err}");
        }
    }
}
