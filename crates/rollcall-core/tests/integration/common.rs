//! Test utilities and mock implementations for integration tests.
//!
//! Provides in-memory implementations of `ProviderClient` and `MemberStore`
//! for testing the harvest and enrichment services in isolation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rollcall_core::config::HarvestConfig;
use rollcall_core::error::AppError;
use rollcall_core::models::{
    Channel, ChannelInfo, EnrichmentCandidate, Member, MemberDetail, MemberPage,
    MembershipDetail, RawMember,
};
use rollcall_core::traits::{MemberStore, ProviderClient};

/// A channel with a usable credential.
pub fn test_channel() -> Channel {
    Channel {
        id: 100,
        title: "Test Channel".to_string(),
        username: Some("testchan".to_string()),
        access_hash: Some(0xDEADBEEF),
        added_at: Utc::now(),
    }
}

/// A config with millisecond pacing so tests stay fast.
pub fn fast_config() -> HarvestConfig {
    HarvestConfig::default()
        .with_pacing(Duration::from_millis(1), Duration::from_millis(1))
        .with_throttle_margin(Duration::from_millis(5))
        .with_probe_tokens(vec!["a".to_string()])
}

pub fn raw(id: i64) -> RawMember {
    RawMember {
        id,
        username: Some(format!("user{}", id)),
        ..Default::default()
    }
}

// =============================================================================
// MockProviderClient
// =============================================================================

/// Mock provider with per-strategy member lists and failure injection.
#[derive(Clone, Default)]
pub struct MockProviderClient {
    pub full: Arc<Vec<RawMember>>,
    pub recent: Arc<Vec<RawMember>>,
    /// Search results keyed by probe token.
    pub search: Arc<HashMap<String, Vec<RawMember>>>,
    pub hint: Option<u64>,
    pub bios: Arc<HashMap<i64, String>>,
    pub join_dates: Arc<HashMap<i64, DateTime<Utc>>>,
    /// Added to every paginated call, so cancellation tests have a window.
    pub page_delay: Duration,
    /// Refuse the full walk with PermissionDenied.
    pub deny_full: bool,
    /// Remaining throttle responses per member-detail id.
    pub detail_throttles: Arc<Mutex<HashMap<i64, usize>>>,
    /// Remaining throttle responses for the full walk, 30ms wait each.
    pub page_throttles: Arc<Mutex<usize>>,
    /// Names of operations invoked, in order.
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockProviderClient {
    fn record(&self, op: &str) {
        self.calls.lock().unwrap().push(op.to_string());
    }

    fn page_of(&self, source: &[RawMember], offset: u64, limit: u64) -> MemberPage {
        let start = (offset as usize).min(source.len());
        let end = (start + limit as usize).min(source.len());
        let members = source[start..end].to_vec();
        let next_offset = (end < source.len()).then_some(end as u64);
        MemberPage {
            members,
            next_offset,
        }
    }
}

impl ProviderClient for MockProviderClient {
    async fn full_channel(&self, _channel: &Channel) -> Result<ChannelInfo, AppError> {
        self.record("full_channel");
        Ok(ChannelInfo {
            participant_hint: self.hint,
        })
    }

    async fn list_members_page(
        &self,
        _channel: &Channel,
        offset: u64,
        limit: u64,
    ) -> Result<MemberPage, AppError> {
        self.record("list_members_page");
        if self.deny_full {
            return Err(AppError::PermissionDenied("full listing".to_string()));
        }
        {
            let mut remaining = self.page_throttles.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AppError::Throttled {
                    wait: Duration::from_millis(30),
                });
            }
        }
        tokio::time::sleep(self.page_delay).await;
        Ok(self.page_of(&self.full, offset, limit))
    }

    async fn recent_members_page(
        &self,
        _channel: &Channel,
        offset: u64,
        limit: u64,
    ) -> Result<MemberPage, AppError> {
        self.record("recent_members_page");
        tokio::time::sleep(self.page_delay).await;
        Ok(self.page_of(&self.recent, offset, limit))
    }

    async fn search_members_page(
        &self,
        _channel: &Channel,
        probe: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RawMember>, AppError> {
        self.record("search_members_page");
        tokio::time::sleep(self.page_delay).await;
        let source = self.search.get(probe).cloned().unwrap_or_default();
        Ok(self.page_of(&source, offset, limit).members)
    }

    async fn member_detail(&self, member_id: i64) -> Result<MemberDetail, AppError> {
        self.record(&format!("member_detail:{}", member_id));
        let mut throttles = self.detail_throttles.lock().unwrap();
        if let Some(remaining) = throttles.get_mut(&member_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AppError::Throttled {
                    wait: Duration::from_millis(10),
                });
            }
        }
        drop(throttles);
        Ok(MemberDetail {
            bio: self.bios.get(&member_id).cloned(),
            is_scam: false,
            is_fake: false,
        })
    }

    async fn membership_detail(
        &self,
        _channel: &Channel,
        member_id: i64,
    ) -> Result<MembershipDetail, AppError> {
        self.record(&format!("membership_detail:{}", member_id));
        Ok(MembershipDetail {
            joined_at: self.join_dates.get(&member_id).copied(),
        })
    }

    async fn resolve_channel(&self, handle: &str) -> Result<Channel, AppError> {
        self.record("resolve_channel");
        Ok(Channel {
            id: 100,
            title: "Test Channel".to_string(),
            username: Some(handle.to_string()),
            access_hash: Some(0xCAFE),
            added_at: Utc::now(),
        })
    }
}

// =============================================================================
// MockMemberStore
// =============================================================================

/// In-memory member store keyed by member id (single channel per instance).
#[derive(Clone, Default)]
pub struct MockMemberStore {
    rows: Arc<Mutex<HashMap<i64, Member>>>,
    /// Order in which ids were first inserted.
    pub insert_order: Arc<Mutex<Vec<i64>>>,
    /// Member ids whose enrichment write-back fails.
    pub fail_update_for: Arc<Mutex<HashSet<i64>>>,
}

impl MockMemberStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, member: Member) {
        self.insert_order.lock().unwrap().push(member.id);
        self.rows.lock().unwrap().insert(member.id, member);
    }

    pub fn get(&self, id: i64) -> Option<Member> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

impl MemberStore for MockMemberStore {
    async fn existing_ids(&self, _channel_id: i64) -> Result<HashSet<i64>, AppError> {
        Ok(self.rows.lock().unwrap().keys().copied().collect())
    }

    async fn upsert_batch(
        &self,
        members: &[Member],
        _channel_id: i64,
    ) -> Result<usize, AppError> {
        let mut rows = self.rows.lock().unwrap();
        let mut order = self.insert_order.lock().unwrap();
        for member in members {
            if !rows.contains_key(&member.id) {
                order.push(member.id);
            }
            rows.insert(member.id, member.clone());
        }
        Ok(members.len())
    }

    async fn needing_enrichment(
        &self,
        _channel_id: i64,
    ) -> Result<Vec<EnrichmentCandidate>, AppError> {
        let rows = self.rows.lock().unwrap();
        let order = self.insert_order.lock().unwrap();
        Ok(order
            .iter()
            .filter_map(|id| rows.get(id))
            .filter(|m| m.bio.is_none() || m.joined_at.is_none())
            .map(|m| EnrichmentCandidate {
                member_id: m.id,
                is_bot: m.is_bot,
                is_deleted: m.is_deleted,
                bio: m.bio.clone(),
                joined_at: m.joined_at,
            })
            .collect())
    }

    async fn update_enrichment(
        &self,
        member_id: i64,
        _channel_id: i64,
        bio: Option<&str>,
        joined_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError> {
        if self.fail_update_for.lock().unwrap().contains(&member_id) {
            return Err(AppError::Provider("write-back failed".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        let Some(member) = rows.get_mut(&member_id) else {
            return Ok(false);
        };
        let mut changed = false;
        if member.bio.is_none() {
            if let Some(bio) = bio {
                member.bio = Some(bio.to_string());
                changed = true;
            }
        }
        if member.joined_at.is_none() {
            if let Some(joined_at) = joined_at {
                member.joined_at = Some(joined_at);
                changed = true;
            }
        }
        Ok(changed)
    }

    async fn count(&self, _channel_id: i64) -> Result<i64, AppError> {
        Ok(self.rows.lock().unwrap().len() as i64)
    }

    async fn all_members(&self, _channel_id: i64) -> Result<Vec<Member>, AppError> {
        let rows = self.rows.lock().unwrap();
        let order = self.insert_order.lock().unwrap();
        Ok(order.iter().filter_map(|id| rows.get(id)).cloned().collect())
    }

    async fn delete_channel_members(&self, _channel_id: i64) -> Result<u64, AppError> {
        let mut rows = self.rows.lock().unwrap();
        let n = rows.len() as u64;
        rows.clear();
        self.insert_order.lock().unwrap().clear();
        Ok(n)
    }
}
