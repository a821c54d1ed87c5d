//! Enumeration strategy runner.
//!
//! The provider exposes no complete listing for large channels; the runner
//! unions three incomplete views in a fixed priority order:
//!
//! 1. **Full walk** — offset-paginated listing until an empty page.
//! 2. **Recency walk** — same pagination over the recent-activity ordering.
//! 3. **Keyed-probe sweep** — the search endpoint queried once per
//!    configured probe token, paginating each token until a short page.
//!
//! Results accumulate in a [`DedupStore`]; overlap between strategies is
//! expected and harmless. A failing page or probe is logged and the strategy
//! advances; a throttle that survives the wrapper's retry instead holds the
//! current position until the requested wait passes. Only a bounded run of
//! consecutive failures, a permission refusal, or cancellation ends a
//! strategy early.

use futures::future::Either;
use tracing::{debug, info, warn};

use crate::config::HarvestConfig;
use crate::dedup::DedupStore;
use crate::error::AppError;
use crate::job::{JobHandle, ProgressGate};
use crate::models::{Channel, ChannelInfo, Member, RawMember, StrategyKind};
use crate::progress::{HarvestEvent, ProgressReporter};
use crate::throttle::ThrottledCaller;
use crate::traits::ProviderClient;

/// Runs the enumeration strategies for one channel.
pub struct StrategyRunner<P: ProviderClient> {
    client: P,
    config: HarvestConfig,
    caller: ThrottledCaller,
}

#[derive(Clone, Copy)]
enum WalkKind {
    Full,
    Recent,
}

impl<P: ProviderClient> StrategyRunner<P> {
    pub fn new(client: P, config: HarvestConfig) -> Self {
        let caller = ThrottledCaller::new(config.throttle_margin);
        Self {
            client,
            config,
            caller,
        }
    }

    /// Enumerates `channel`, returning the deduplicated union of all
    /// strategies in first-discovery order.
    ///
    /// New members are appended to the job's partial buffer as they are
    /// found, so a cancelled job still has everything discovered so far.
    /// Returns [`AppError::Cancelled`] when the job token fires; any other
    /// error class is contained inside the failing strategy.
    pub async fn run(
        &self,
        channel: &Channel,
        job: &JobHandle,
        reporter: &dyn ProgressReporter,
    ) -> Result<DedupStore, AppError> {
        let hint = self.participant_hint(channel, job).await?;
        let mut store = DedupStore::new();
        let mut gate = ProgressGate::new(self.config.progress_interval, self.config.progress_every);

        self.walk(WalkKind::Full, channel, job, reporter, &mut store, &mut gate, hint)
            .await?;
        self.walk(WalkKind::Recent, channel, job, reporter, &mut store, &mut gate, hint)
            .await?;
        self.probe_sweep(channel, job, reporter, &mut store, &mut gate, hint)
            .await?;

        info!(
            channel_id = channel.id,
            found = store.len(),
            "Enumeration finished"
        );
        Ok(store)
    }

    /// Fetches the participant-count hint. Failure is logged and non-fatal;
    /// only cancellation propagates.
    async fn participant_hint(
        &self,
        channel: &Channel,
        job: &JobHandle,
    ) -> Result<Option<u64>, AppError> {
        let info: Result<ChannelInfo, _> = self
            .caller
            .call(job.cancel_token(), "full_channel", || {
                self.client.full_channel(channel)
            })
            .await;
        match info {
            Ok(info) => Ok(info.participant_hint),
            Err(AppError::Cancelled) => Err(AppError::Cancelled),
            Err(e) => {
                warn!(channel_id = channel.id, error = %e, "No participant hint available");
                Ok(None)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn walk(
        &self,
        kind: WalkKind,
        channel: &Channel,
        job: &JobHandle,
        reporter: &dyn ProgressReporter,
        store: &mut DedupStore,
        gate: &mut ProgressGate,
        hint: Option<u64>,
    ) -> Result<(), AppError> {
        let (strategy, op_name) = match kind {
            WalkKind::Full => (StrategyKind::FullWalk, "list_members_page"),
            WalkKind::Recent => (StrategyKind::RecencyWalk, "recent_members_page"),
        };
        let limit = self.config.page_size;
        let mut offset = 0u64;
        let mut consecutive_failures = 0usize;

        loop {
            if job.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let page = self
                .caller
                .call(job.cancel_token(), op_name, || match kind {
                    WalkKind::Full => {
                        Either::Left(self.client.list_members_page(channel, offset, limit))
                    }
                    WalkKind::Recent => {
                        Either::Right(self.client.recent_members_page(channel, offset, limit))
                    }
                })
                .await;

            match page {
                Ok(page) => {
                    consecutive_failures = 0;
                    if page.members.is_empty() {
                        break;
                    }
                    let new_count =
                        self.absorb(page.members, strategy, job, store, gate, reporter, hint);
                    debug!(
                        channel_id = channel.id,
                        strategy = %strategy,
                        offset,
                        new_count,
                        "Page absorbed"
                    );
                    match page.next_offset {
                        Some(next) => offset = next,
                        None => break,
                    }
                }
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(AppError::Throttled { wait }) => {
                    consecutive_failures += 1;
                    warn!(
                        channel_id = channel.id,
                        strategy = %strategy,
                        offset,
                        wait_secs = wait.as_secs(),
                        failures = consecutive_failures,
                        "Throttled past the retry, holding the page until the wait passes"
                    );
                    if consecutive_failures >= self.config.max_consecutive_failures {
                        warn!(
                            channel_id = channel.id,
                            strategy = %strategy,
                            "Provider keeps throttling, giving up on this strategy"
                        );
                        break;
                    }
                    self.caller.sleep_out(job.cancel_token(), wait).await?;
                    // Same offset is retried after the wait; the page is
                    // never skipped over a throttle.
                }
                Err(e) if e.ends_strategy() => {
                    warn!(
                        channel_id = channel.id,
                        strategy = %strategy,
                        error = %e,
                        "Strategy ended early"
                    );
                    break;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        channel_id = channel.id,
                        strategy = %strategy,
                        offset,
                        failures = consecutive_failures,
                        error = %e,
                        "Page failed, advancing"
                    );
                    if consecutive_failures >= self.config.max_consecutive_failures {
                        warn!(
                            channel_id = channel.id,
                            strategy = %strategy,
                            "Too many consecutive page failures, giving up on this strategy"
                        );
                        break;
                    }
                    offset += limit;
                }
            }
        }

        Ok(())
    }

    async fn probe_sweep(
        &self,
        channel: &Channel,
        job: &JobHandle,
        reporter: &dyn ProgressReporter,
        store: &mut DedupStore,
        gate: &mut ProgressGate,
        hint: Option<u64>,
    ) -> Result<(), AppError> {
        let limit = self.config.search_page_size;
        let mut consecutive_failures = 0usize;

        'probes: for probe in &self.config.probe_tokens {
            if job.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let mut offset = 0u64;
            loop {
                let result = self
                    .caller
                    .call(job.cancel_token(), "search_members_page", || {
                        self.client.search_members_page(channel, probe, offset, limit)
                    })
                    .await;

                match result {
                    Ok(raws) => {
                        consecutive_failures = 0;
                        let fetched = raws.len() as u64;
                        self.absorb(
                            raws,
                            StrategyKind::ProbeSweep,
                            job,
                            store,
                            gate,
                            reporter,
                            hint,
                        );
                        // A short page exhausts the probe.
                        if fetched < limit {
                            break;
                        }
                        offset += fetched;
                    }
                    Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                    Err(AppError::Throttled { wait }) => {
                        consecutive_failures += 1;
                        warn!(
                            channel_id = channel.id,
                            probe = %probe,
                            wait_secs = wait.as_secs(),
                            failures = consecutive_failures,
                            "Throttled past the retry, pausing the sweep"
                        );
                        if consecutive_failures >= self.config.max_consecutive_failures {
                            warn!(
                                channel_id = channel.id,
                                "Provider keeps throttling, ending probe sweep"
                            );
                            break 'probes;
                        }
                        self.caller.sleep_out(job.cancel_token(), wait).await?;
                        // Same probe offset is retried after the wait.
                    }
                    Err(AppError::NotFound(_)) => break,
                    Err(AppError::PermissionDenied(what)) => {
                        warn!(
                            channel_id = channel.id,
                            probe = %probe,
                            "Search refused ({}), ending probe sweep",
                            what
                        );
                        break 'probes;
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        warn!(
                            channel_id = channel.id,
                            probe = %probe,
                            failures = consecutive_failures,
                            error = %e,
                            "Probe failed, moving on"
                        );
                        if consecutive_failures >= self.config.max_consecutive_failures {
                            warn!(
                                channel_id = channel.id,
                                "Too many consecutive probe failures, ending probe sweep"
                            );
                            break 'probes;
                        }
                        break;
                    }
                }
            }

            // Fixed pause between probes, racing cancellation.
            self.caller
                .sleep_out(job.cancel_token(), self.config.probe_pause)
                .await?;
        }

        Ok(())
    }

    /// Normalizes raw records into the store, appends new identities to the
    /// job's partial buffer, and emits gated progress. Returns the number of
    /// new identities.
    #[allow(clippy::too_many_arguments)]
    fn absorb(
        &self,
        raws: Vec<RawMember>,
        strategy: StrategyKind,
        job: &JobHandle,
        store: &mut DedupStore,
        gate: &mut ProgressGate,
        reporter: &dyn ProgressReporter,
        hint: Option<u64>,
    ) -> usize {
        let before = store.len();
        for raw in raws {
            store.insert(Member::from_raw(raw, strategy));
        }
        let new_count = store.len() - before;
        if new_count > 0 {
            job.append_partial(&store.members()[before..]);
        }
        if gate.admit(new_count) {
            reporter.report(HarvestEvent::Discovering {
                strategy,
                found: store.len(),
                participant_hint: hint,
            });
        }
        new_count
    }
}
