//! Trait abstractions for the provider gateway and member persistence.
//!
//! These traits decouple the engine from concrete backends, enabling
//! dependency injection and straightforward mocking in tests. The engine is
//! generic over both seams; `rollcall-client` and `rollcall-store` supply
//! the production implementations.

use std::collections::HashSet;
use std::future::Future;

use crate::error::AppError;
use crate::models::{
    Channel, ChannelInfo, EnrichmentCandidate, Member, MemberDetail, MemberPage,
    MembershipDetail, RawMember,
};

/// Client for the access-controlled channel provider.
///
/// Every call may fail with [`AppError::Throttled`]; callers are expected to
/// route calls through the throttle wrapper rather than handle backoff
/// themselves. Implementations must be cheap to clone (share the underlying
/// connection).
pub trait ProviderClient: Send + Sync + Clone {
    /// Fetches channel metadata, including the participant-count hint used
    /// for progress percentages.
    fn full_channel(
        &self,
        channel: &Channel,
    ) -> impl Future<Output = Result<ChannelInfo, AppError>> + Send;

    /// One page of the full participant listing, starting at `offset`.
    fn list_members_page(
        &self,
        channel: &Channel,
        offset: u64,
        limit: u64,
    ) -> impl Future<Output = Result<MemberPage, AppError>> + Send;

    /// One page of the recency-ordered participant listing.
    fn recent_members_page(
        &self,
        channel: &Channel,
        offset: u64,
        limit: u64,
    ) -> impl Future<Output = Result<MemberPage, AppError>> + Send;

    /// One page of members whose name or handle matches a probe token.
    ///
    /// A short page (fewer than `limit` records) means the probe is
    /// exhausted.
    fn search_members_page(
        &self,
        channel: &Channel,
        probe: &str,
        offset: u64,
        limit: u64,
    ) -> impl Future<Output = Result<Vec<RawMember>, AppError>> + Send;

    /// Secondary per-member attributes (profile text, abuse flags).
    fn member_detail(
        &self,
        member_id: i64,
    ) -> impl Future<Output = Result<MemberDetail, AppError>> + Send;

    /// Per-channel membership attributes (join date).
    fn membership_detail(
        &self,
        channel: &Channel,
        member_id: i64,
    ) -> impl Future<Output = Result<MembershipDetail, AppError>> + Send;

    /// Re-derives a full channel record (with credential) from its handle.
    fn resolve_channel(
        &self,
        handle: &str,
    ) -> impl Future<Output = Result<Channel, AppError>> + Send;
}

/// Persistence adapter for harvested members.
///
/// Upserts must be idempotent on `(channel_id, member_id)`; the sync engine
/// relies on this to absorb duplicate attempts from stale snapshots.
pub trait MemberStore: Send + Sync + Clone {
    /// All member ids currently stored for a channel.
    fn existing_ids(
        &self,
        channel_id: i64,
    ) -> impl Future<Output = Result<HashSet<i64>, AppError>> + Send;

    /// Writes a batch of members. Returns the number of rows affected.
    fn upsert_batch(
        &self,
        members: &[Member],
        channel_id: i64,
    ) -> impl Future<Output = Result<usize, AppError>> + Send;

    /// Stored members still missing bio or join date.
    fn needing_enrichment(
        &self,
        channel_id: i64,
    ) -> impl Future<Output = Result<Vec<EnrichmentCandidate>, AppError>> + Send;

    /// Fills secondary attributes for one member. Only non-null arguments
    /// overwrite; returns true when a row was updated.
    fn update_enrichment(
        &self,
        member_id: i64,
        channel_id: i64,
        bio: Option<&str>,
        joined_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Stored member count for a channel.
    fn count(&self, channel_id: i64) -> impl Future<Output = Result<i64, AppError>> + Send;

    /// All stored members for a channel, for export.
    fn all_members(
        &self,
        channel_id: i64,
    ) -> impl Future<Output = Result<Vec<Member>, AppError>> + Send;

    /// Removes every member row for a channel.
    ///
    /// External maintenance operation; the engine itself never calls this.
    fn delete_channel_members(
        &self,
        channel_id: i64,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}
