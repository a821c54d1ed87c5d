//! Enrichment of stored members with secondary attributes.
//!
//! Enumeration is cheap per member; profile text and join dates each cost a
//! dedicated detail call, so they are fetched in a separate pass over the
//! store's needing-enrichment view. The pass is deliberately slow: a
//! mandatory pacing sleep follows every candidate, and a throttle signal
//! that survives the wrapper's single retry pauses the whole pipeline for
//! the requested wait before moving on.
//!
//! Bot and deleted accounts have no meaningful bio or join date and are
//! never sent down the detail path.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HarvestConfig;
use crate::error::AppError;
use crate::job::ProgressGate;
use crate::models::{Channel, EnrichmentReport};
use crate::progress::{HarvestEvent, ProgressReporter};
use crate::throttle::ThrottledCaller;
use crate::traits::{MemberStore, ProviderClient};

/// Fills missing bios and join dates for one channel's stored members.
pub struct EnrichmentPipeline<P: ProviderClient, S: MemberStore> {
    client: P,
    store: S,
    config: HarvestConfig,
    caller: ThrottledCaller,
}

impl<P: ProviderClient, S: MemberStore> EnrichmentPipeline<P, S> {
    pub fn new(client: P, store: S, config: HarvestConfig) -> Self {
        let caller = ThrottledCaller::new(config.throttle_margin);
        Self {
            client,
            store,
            config,
            caller,
        }
    }

    /// Runs one enrichment pass.
    ///
    /// Each candidate gets at most one detail call per missing field; only
    /// non-null obtained values are written back, so a member the provider
    /// has nothing for stays in the needing-enrichment view. Skipped
    /// members (bots, deleted accounts, failures, throttle-outs) are
    /// re-queried on the next invocation.
    pub async fn enrich(
        &self,
        channel: &Channel,
        cancel: &CancellationToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<EnrichmentReport, AppError> {
        let candidates = self.store.needing_enrichment(channel.id).await?;
        let total = candidates.len();
        info!(channel_id = channel.id, total, "Enrichment pass started");

        let mut report = EnrichmentReport::default();
        let mut gate = ProgressGate::new(self.config.progress_interval, self.config.progress_every);

        for candidate in candidates {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            report.processed += 1;

            if candidate.is_bot || candidate.is_deleted {
                report.skipped += 1;
                continue;
            }

            let mut bio = None;
            let mut joined_at = None;
            let mut failed = false;

            if candidate.bio.is_none() {
                match self
                    .caller
                    .call(cancel, "member_detail", || {
                        self.client.member_detail(candidate.member_id)
                    })
                    .await
                {
                    Ok(detail) => bio = detail.bio,
                    Err(e) => {
                        self.absorb_failure(channel.id, candidate.member_id, e, cancel)
                            .await?;
                        failed = true;
                    }
                }
            }

            if !failed && candidate.joined_at.is_none() {
                match self
                    .caller
                    .call(cancel, "membership_detail", || {
                        self.client.membership_detail(channel, candidate.member_id)
                    })
                    .await
                {
                    Ok(detail) => joined_at = detail.joined_at,
                    Err(e) => {
                        self.absorb_failure(channel.id, candidate.member_id, e, cancel)
                            .await?;
                        failed = true;
                    }
                }
            }

            if failed {
                report.skipped += 1;
            } else if bio.is_some() || joined_at.is_some() {
                match self
                    .store
                    .update_enrichment(candidate.member_id, channel.id, bio.as_deref(), joined_at)
                    .await
                {
                    Ok(updated) => {
                        if updated {
                            report.enriched += 1;
                        }
                        debug!(
                            channel_id = channel.id,
                            member_id = candidate.member_id,
                            got_bio = bio.is_some(),
                            got_join_date = joined_at.is_some(),
                            "Member enriched"
                        );
                    }
                    Err(e) => {
                        report.skipped += 1;
                        warn!(
                            channel_id = channel.id,
                            member_id = candidate.member_id,
                            error = %e,
                            "Write-back failed, skipping member"
                        );
                    }
                }
            }

            if gate.admit(1) {
                reporter.report(HarvestEvent::Enriching {
                    processed: report.processed,
                    total,
                });
            }

            // Mandatory pacing regardless of outcome.
            self.pace(cancel).await?;
        }

        info!(
            channel_id = channel.id,
            processed = report.processed,
            enriched = report.enriched,
            skipped = report.skipped,
            "Enrichment pass finished"
        );
        Ok(report)
    }

    /// Handles a per-member failure. A throttle that survived the wrapper's
    /// retry pauses the whole pipeline for the requested wait; anything else
    /// is just logged. Cancellation propagates.
    async fn absorb_failure(
        &self,
        channel_id: i64,
        member_id: i64,
        error: AppError,
        cancel: &CancellationToken,
    ) -> Result<(), AppError> {
        match error {
            AppError::Cancelled => Err(AppError::Cancelled),
            AppError::Throttled { wait } => {
                warn!(
                    channel_id,
                    member_id,
                    wait_secs = wait.as_secs(),
                    "Throttled past the retry, pausing the enrichment pipeline"
                );
                self.caller.sleep_out(cancel, wait).await
            }
            e => {
                warn!(channel_id, member_id, error = %e, "Enrichment failed for member, skipping");
                Ok(())
            }
        }
    }

    async fn pace(&self, cancel: &CancellationToken) -> Result<(), AppError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            _ = tokio::time::sleep(self.config.enrich_pacing) => Ok(()),
        }
    }
}
