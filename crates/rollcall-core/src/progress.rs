//! Progress reporting for long-running harvest and enrichment jobs.
//!
//! The engine emits [`HarvestEvent`]s through a [`ProgressReporter`]; the
//! front-end decides how to surface them (log lines, an edited status
//! message, nothing at all). Reporters must be cheap and non-blocking — the
//! job registry already rate-limits emission, so implementations should not
//! throttle again.

use crate::models::StrategyKind;

/// A progress notification from a running job.
#[derive(Debug, Clone, PartialEq)]
pub enum HarvestEvent {
    /// Enumeration started for a channel.
    Started { channel_title: String },
    /// Discovery progress within a strategy.
    Discovering {
        strategy: StrategyKind,
        found: usize,
        /// Approximate channel size, when the provider disclosed one.
        participant_hint: Option<u64>,
    },
    /// Discovered members are being written to the store.
    Syncing { new_count: usize, total: usize },
    /// Enrichment progress.
    Enriching { processed: usize, total: usize },
    /// The job reached a terminal state.
    Finished { summary: String },
}

/// Receives progress events from a running job.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: HarvestEvent);
}

/// Discards all events. Default for headless runs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn report(&self, _event: HarvestEvent) {}
}

/// Emits every event as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: HarvestEvent) {
        match event {
            HarvestEvent::Started { channel_title } => {
                tracing::info!(channel = %channel_title, "Harvest started");
            }
            HarvestEvent::Discovering {
                strategy,
                found,
                participant_hint,
            } => match participant_hint {
                Some(hint) if hint > 0 => {
                    let pct = (found as f64 / hint as f64 * 100.0).min(100.0);
                    tracing::info!(
                        strategy = %strategy,
                        found,
                        total = hint,
                        "Discovering members ({:.0}%)",
                        pct
                    );
                }
                _ => {
                    tracing::info!(strategy = %strategy, found, "Discovering members");
                }
            },
            HarvestEvent::Syncing { new_count, total } => {
                tracing::info!(new_count, total, "Writing members to store");
            }
            HarvestEvent::Enriching { processed, total } => {
                tracing::info!(processed, total, "Enriching members");
            }
            HarvestEvent::Finished { summary } => {
                tracing::info!("{}", summary);
            }
        }
    }
}
