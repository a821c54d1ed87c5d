//! Harvest orchestration.
//!
//! [`HarvestService`] sequences one harvest job end to end: credential
//! re-derivation when missing, enumeration through the strategy runner, the
//! existing-ids snapshot, the incremental sync pass, and job finalization.
//! It is generic over the provider and store seams, so tests drive it with
//! in-memory mocks and production wires in the HTTP gateway and Postgres.
//!
//! # Architecture
//!
//! ```text
//! HarvestService
//!   ├── JobRegistry        (cancellation, partial buffers)
//!   ├── StrategyRunner     (full walk → recency walk → probe sweep)
//!   ├── SyncEngine         (snapshot diff, batched upserts)
//!   └── EnrichmentPipeline (bio / join-date backfill)
//! ```
//!
//! Cancellation mid-run is not an error at this level: the job finalizes as
//! `Cancelled` with its partial buffer intact, and the result carries that
//! status to the caller.

use tracing::{info, warn};

use crate::config::HarvestConfig;
use crate::enrich::EnrichmentPipeline;
use crate::error::AppError;
use crate::job::{JobHandle, JobRegistry, JobState};
use crate::models::{Channel, EnrichmentReport, SyncReport};
use crate::progress::{HarvestEvent, ProgressReporter};
use crate::strategy::StrategyRunner;
use crate::sync::SyncEngine;
use crate::throttle::ThrottledCaller;
use crate::traits::{MemberStore, ProviderClient};

/// Outcome of one harvest job.
#[derive(Debug, Clone)]
pub struct HarvestResult {
    pub status: JobState,
    /// Members discovered before the job ended (equals the partial buffer
    /// length for cancelled jobs).
    pub discovered: usize,
    pub sync: SyncReport,
}

/// Orchestrates harvest and enrichment jobs for registered channels.
pub struct HarvestService<P: ProviderClient, S: MemberStore> {
    client: P,
    store: S,
    config: HarvestConfig,
    registry: JobRegistry,
}

impl<P: ProviderClient, S: MemberStore> HarvestService<P, S> {
    pub fn new(client: P, store: S) -> Self {
        Self::with_config(client, store, HarvestConfig::default())
    }

    pub fn with_config(client: P, store: S, config: HarvestConfig) -> Self {
        Self {
            client,
            store,
            config,
            registry: JobRegistry::new(),
        }
    }

    /// The registry external callers use to cancel jobs and claim partial
    /// results.
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Runs a full harvest job for `channel` under the given job id.
    ///
    /// A missing access credential is re-derived from the channel handle
    /// before enumeration. Cancellation finalizes the job as `Cancelled`
    /// and returns a result with that status; provider or store failures
    /// finalize it as `Failed` and propagate the error.
    pub async fn harvest_channel(
        &self,
        channel: &Channel,
        job_id: i64,
        reporter: &dyn ProgressReporter,
    ) -> Result<HarvestResult, AppError> {
        let job = self.registry.start(job_id);
        reporter.report(HarvestEvent::Started {
            channel_title: channel.title.clone(),
        });

        match self.run_harvest(channel, &job, reporter).await {
            Ok(result) => {
                self.registry.finish(job_id, JobState::Completed);
                reporter.report(HarvestEvent::Finished {
                    summary: format!(
                        "Harvest of {} complete: {} discovered, {} new",
                        channel.title, result.discovered, result.sync.new_count
                    ),
                });
                Ok(result)
            }
            Err(AppError::Cancelled) => {
                let discovered = job.partial_len();
                self.registry.finish(job_id, JobState::Cancelled);
                info!(
                    job_id,
                    channel_id = channel.id,
                    discovered,
                    "Harvest cancelled, partial buffer retained"
                );
                reporter.report(HarvestEvent::Finished {
                    summary: format!(
                        "Harvest of {} cancelled with {} members buffered",
                        channel.title, discovered
                    ),
                });
                Ok(HarvestResult {
                    status: JobState::Cancelled,
                    discovered,
                    sync: SyncReport::default(),
                })
            }
            Err(e) => {
                self.registry.finish(job_id, JobState::Failed);
                warn!(job_id, channel_id = channel.id, error = %e, "Harvest failed");
                Err(e)
            }
        }
    }

    async fn run_harvest(
        &self,
        channel: &Channel,
        job: &JobHandle,
        reporter: &dyn ProgressReporter,
    ) -> Result<HarvestResult, AppError> {
        let channel = self.ensure_usable(channel, job).await?;

        let runner = StrategyRunner::new(self.client.clone(), self.config.clone());
        let discovered = runner.run(&channel, job, reporter).await?;

        if job.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let existing = self.store.existing_ids(channel.id).await?;
        let engine = SyncEngine::new(self.store.clone(), self.config.upsert_batch_size);
        let members = discovered.into_members();
        reporter.report(HarvestEvent::Syncing {
            new_count: members.iter().filter(|m| !existing.contains(&m.id)).count(),
            total: members.len(),
        });
        let sync = engine.sync(channel.id, &members, &existing).await?;

        Ok(HarvestResult {
            status: JobState::Completed,
            discovered: members.len(),
            sync,
        })
    }

    /// Runs one enrichment pass as a cancellable job.
    pub async fn enrich_channel(
        &self,
        channel: &Channel,
        job_id: i64,
        reporter: &dyn ProgressReporter,
    ) -> Result<EnrichmentReport, AppError> {
        let job = self.registry.start(job_id);
        let pipeline =
            EnrichmentPipeline::new(self.client.clone(), self.store.clone(), self.config.clone());

        match pipeline.enrich(channel, job.cancel_token(), reporter).await {
            Ok(report) => {
                self.registry.finish(job_id, JobState::Completed);
                Ok(report)
            }
            Err(AppError::Cancelled) => {
                self.registry.finish(job_id, JobState::Cancelled);
                info!(job_id, channel_id = channel.id, "Enrichment cancelled");
                Err(AppError::Cancelled)
            }
            Err(e) => {
                self.registry.finish(job_id, JobState::Failed);
                Err(e)
            }
        }
    }

    /// Returns a usable copy of the channel, re-deriving the access
    /// credential from the handle when it is missing.
    async fn ensure_usable(
        &self,
        channel: &Channel,
        job: &JobHandle,
    ) -> Result<Channel, AppError> {
        if channel.is_usable() {
            return Ok(channel.clone());
        }

        let handle = channel
            .username
            .as_deref()
            .ok_or(AppError::ChannelUnusable(channel.id))?;

        info!(
            channel_id = channel.id,
            handle, "Access credential missing, re-deriving from handle"
        );
        let caller = ThrottledCaller::new(self.config.throttle_margin);
        let resolved = caller
            .call(job.cancel_token(), "resolve_channel", || {
                self.client.resolve_channel(handle)
            })
            .await?;

        if resolved.access_hash.is_none() {
            return Err(AppError::ChannelUnusable(channel.id));
        }
        Ok(Channel {
            access_hash: resolved.access_hash,
            ..channel.clone()
        })
    }
}
