//! Incremental sync of discovered members into the store.
//!
//! The engine takes one `existing_ids` snapshot per job and writes only the
//! identities absent from it, in fixed-size batches. The snapshot is never
//! refreshed mid-run; a concurrent job may race us into the store, and the
//! adapter's idempotent upsert on `(channel_id, member_id)` absorbs the
//! duplicate attempt. Delivery is at-least-once: a failed batch is logged
//! and the remaining batches still run.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::error::AppError;
use crate::models::{Member, SyncReport};
use crate::traits::MemberStore;

/// Writes newly discovered members in bounded batches.
#[derive(Debug, Clone)]
pub struct SyncEngine<S: MemberStore> {
    store: S,
    batch_size: usize,
}

impl<S: MemberStore> SyncEngine<S> {
    pub fn new(store: S, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Syncs `discovered` against the snapshot, returning per-pass counts.
    ///
    /// Only identities absent from `existing` are written. Batch failures
    /// are isolated; the report's `batches_failed` is the only trace they
    /// leave. Store-count reads frame the pass for the report; a failed
    /// post-pass count degrades to a value derived from the writes.
    pub async fn sync(
        &self,
        channel_id: i64,
        discovered: &[Member],
        existing: &HashSet<i64>,
    ) -> Result<SyncReport, AppError> {
        let before_count = self.store.count(channel_id).await?;

        let new_members: Vec<&Member> = discovered
            .iter()
            .filter(|m| !existing.contains(&m.id))
            .collect();

        let mut report = SyncReport {
            discovered: discovered.len(),
            already_known: discovered.len() - new_members.len(),
            new_count: new_members.len(),
            before_count,
            ..Default::default()
        };

        let mut written_total = 0usize;
        for batch in new_members.chunks(self.batch_size) {
            let owned: Vec<Member> = batch.iter().map(|m| (*m).clone()).collect();
            match self.store.upsert_batch(&owned, channel_id).await {
                Ok(written) => {
                    report.batches_written += 1;
                    written_total += written;
                    tracing::debug!(
                        channel_id,
                        batch_len = owned.len(),
                        written,
                        "Batch upserted"
                    );
                }
                Err(e) => {
                    report.batches_failed += 1;
                    warn!(
                        channel_id,
                        batch_len = owned.len(),
                        error = %e,
                        "Batch upsert failed, continuing with remaining batches"
                    );
                }
            }
        }

        // A transient count failure must not discard a finished pass; fall
        // back to the counts the pass itself observed.
        report.after_count = match self.store.count(channel_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    channel_id,
                    error = %e,
                    "Post-sync count unavailable, deriving it from the pass"
                );
                before_count + written_total as i64
            }
        };

        info!(
            channel_id,
            discovered = report.discovered,
            new = report.new_count,
            already_known = report.already_known,
            batches_failed = report.batches_failed,
            "Sync pass finished"
        );
        Ok(report)
    }
}
