//! Domain models for the Rollcall harvesting engine.
//!
//! The central type is [`Member`], the normalized record the engine builds
//! from loosely-typed provider responses ([`RawMember`]) and persists through
//! the store adapter. Provider-side status tokens normalize into the closed
//! [`PresenceStatus`] enum; unknown tokens are absorbed, never errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse presence bucket reported by the provider.
///
/// Closed set: any token outside the table maps to [`Unknown`](PresenceStatus::Unknown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
    Recently,
    LastWeek,
    LastMonth,
    /// The provider returned no status object at all.
    Empty,
    /// Unrecognized provider token.
    #[default]
    Unknown,
}

impl PresenceStatus {
    /// Maps a provider status token to the closed enum.
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            None => PresenceStatus::Empty,
            Some("online") => PresenceStatus::Online,
            Some("offline") => PresenceStatus::Offline,
            Some("recently") => PresenceStatus::Recently,
            Some("last_week") => PresenceStatus::LastWeek,
            Some("last_month") => PresenceStatus::LastMonth,
            Some("") => PresenceStatus::Empty,
            Some(_) => PresenceStatus::Unknown,
        }
    }

    /// Stable string form used for storage and CSV output.
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
            PresenceStatus::Recently => "recently",
            PresenceStatus::LastWeek => "last_week",
            PresenceStatus::LastMonth => "last_month",
            PresenceStatus::Empty => "empty",
            PresenceStatus::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for PresenceStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(PresenceStatus::from_token(Some(s)))
    }
}

/// Which enumeration strategy first surfaced a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Offset-paginated walk over the full participant list.
    FullWalk,
    /// Offset-paginated walk ordered by recent activity.
    RecencyWalk,
    /// Search sweep across a list of short probe tokens.
    ProbeSweep,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::FullWalk => "full_walk",
            StrategyKind::RecencyWalk => "recency_walk",
            StrategyKind::ProbeSweep => "probe_sweep",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full_walk" => Ok(StrategyKind::FullWalk),
            "recency_walk" => Ok(StrategyKind::RecencyWalk),
            "probe_sweep" => Ok(StrategyKind::ProbeSweep),
            _ => Err(crate::error::AppError::Generic(format!(
                "Unknown strategy kind: {}",
                s
            ))),
        }
    }
}

/// A normalized channel member.
///
/// Created on first observation by any strategy. Secondary attributes
/// (`bio`, `joined_at`) start out `None` and are filled by the enrichment
/// pipeline; the engine never deletes members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Provider-assigned numeric identity. Stable across sightings.
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub is_bot: bool,
    pub is_deleted: bool,
    pub is_premium: bool,
    pub is_verified: bool,
    pub is_restricted: bool,
    pub is_scam: bool,
    pub is_fake: bool,
    pub lang_code: Option<String>,
    pub status: PresenceStatus,
    /// Profile text, filled by enrichment.
    pub bio: Option<String>,
    /// When the member joined the channel, filled by enrichment.
    pub joined_at: Option<DateTime<Utc>>,
    /// The first strategy that saw this identity.
    pub discovered_via: StrategyKind,
}

impl Member {
    /// A minimal member with only an identity, used mostly in tests.
    pub fn with_id(id: i64) -> Self {
        Member {
            id,
            username: None,
            first_name: None,
            last_name: None,
            phone: None,
            is_bot: false,
            is_deleted: false,
            is_premium: false,
            is_verified: false,
            is_restricted: false,
            is_scam: false,
            is_fake: false,
            lang_code: None,
            status: PresenceStatus::Unknown,
            bio: None,
            joined_at: None,
            discovered_via: StrategyKind::FullWalk,
        }
    }

    /// Builds a normalized member from a raw provider record.
    pub fn from_raw(raw: RawMember, via: StrategyKind) -> Self {
        Member {
            id: raw.id,
            username: raw.username,
            first_name: raw.first_name,
            last_name: raw.last_name,
            phone: raw.phone,
            is_bot: raw.bot,
            is_deleted: raw.deleted,
            is_premium: raw.premium,
            is_verified: raw.verified,
            is_restricted: raw.restricted,
            is_scam: raw.scam,
            is_fake: raw.fake,
            lang_code: raw.lang_code,
            status: PresenceStatus::from_token(raw.status.as_deref()),
            bio: None,
            joined_at: None,
            discovered_via: via,
        }
    }
}

/// Loosely-typed member record as the provider gateway returns it.
///
/// Flags default to `false` and the status token stays a free-form string
/// until normalization; absence of any field is not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMember {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub premium: bool,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub restricted: bool,
    #[serde(default)]
    pub scam: bool,
    #[serde(default)]
    pub fake: bool,
    #[serde(default)]
    pub lang_code: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// A registered access-controlled channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Opaque per-account credential required for enumeration calls.
    #[serde(default)]
    pub access_hash: Option<i64>,
    pub added_at: DateTime<Utc>,
}

impl Channel {
    /// True when the record carries everything enumeration needs.
    pub fn is_usable(&self) -> bool {
        self.access_hash.is_some()
    }
}

/// Channel metadata fetched before enumeration starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Approximate participant count, used only for progress percentages.
    #[serde(default)]
    pub participant_hint: Option<u64>,
}

/// One page of an offset-paginated member listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberPage {
    pub members: Vec<RawMember>,
    /// Offset for the next page; `None` when the listing is exhausted.
    #[serde(default)]
    pub next_offset: Option<u64>,
}

/// Secondary per-member attributes from the detail endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberDetail {
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub is_scam: bool,
    #[serde(default)]
    pub is_fake: bool,
}

/// Per-channel membership attributes (join date).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MembershipDetail {
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

/// A stored member still missing bio or join date.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentCandidate {
    pub member_id: i64,
    pub is_bot: bool,
    pub is_deleted: bool,
    pub bio: Option<String>,
    pub joined_at: Option<DateTime<Utc>>,
}

/// Outcome of one incremental sync pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    /// Members handed to the sync engine by the strategy runner.
    pub discovered: usize,
    /// Identities already present in the store snapshot.
    pub already_known: usize,
    /// Identities written this pass.
    pub new_count: usize,
    pub batches_written: usize,
    pub batches_failed: usize,
    /// Store row count before the pass.
    pub before_count: i64,
    /// Store row count after the pass.
    pub after_count: i64,
}

/// Outcome of one enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichmentReport {
    /// Candidates examined, including skipped ones.
    pub processed: usize,
    /// Candidates for which at least one field was written back.
    pub enriched: usize,
    /// Bot/deleted members and members that failed or got throttled out.
    pub skipped: usize,
}
