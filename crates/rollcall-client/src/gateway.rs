//! Gateway client implementation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode, Url};
use rollcall_core::error::AppError;
use rollcall_core::models::{
    Channel, ChannelInfo, MemberDetail, MemberPage, MembershipDetail, RawMember,
};
use rollcall_core::traits::ProviderClient;
use serde::Deserialize;

/// Channel metadata as the gateway returns it.
#[derive(Deserialize, Debug)]
struct ChannelInfoDto {
    #[serde(default)]
    participant_count: Option<u64>,
}

/// Paginated member listing.
#[derive(Deserialize, Debug)]
struct MemberPageDto {
    #[serde(default)]
    members: Vec<RawMember>,
    #[serde(default)]
    next_offset: Option<u64>,
}

/// Search results (no server-side pagination cursor; a short page ends the
/// probe).
#[derive(Deserialize, Debug)]
struct SearchDto {
    #[serde(default)]
    members: Vec<RawMember>,
}

#[derive(Deserialize, Debug)]
struct MemberDetailDto {
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    scam: bool,
    #[serde(default)]
    fake: bool,
}

#[derive(Deserialize, Debug)]
struct MembershipDto {
    #[serde(default)]
    joined_at: Option<DateTime<Utc>>,
}

/// Resolved channel record, credential included.
#[derive(Deserialize, Debug)]
struct ChannelDto {
    id: i64,
    title: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    access_hash: Option<i64>,
}

/// Fallback backoff when a 429 arrives without a usable `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// HTTP client for the provider gateway.
///
/// The gateway holds the provider session; this client only speaks its REST
/// surface. All methods map gateway status codes onto the engine's error
/// taxonomy: 429 becomes `Throttled` with the advertised wait, 403 becomes
/// `PermissionDenied`, 404 becomes `NotFound`.
///
/// # Examples
///
/// ```no_run
/// use rollcall_client::GatewayClient;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = GatewayClient::new("http://localhost:8787")?;
/// # let _ = client;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: Url,
}

impl GatewayClient {
    /// Creates a client for the gateway at `base_url_str`.
    pub fn new(base_url_str: &str) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url_str)
            .map_err(|e| AppError::Config(format!("Invalid gateway URL '{}': {}", base_url_str, e)))?;

        let client = Client::builder()
            .user_agent("Rollcall/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Provider(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Provider(e.to_string()))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: Url,
        what: &str,
    ) -> Result<T, AppError> {
        tracing::debug!(op = what, url = %url, "Gateway request");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("{}: {}", what, e)))?;
        let resp = check_status(resp, what)?;
        resp.json()
            .await
            .map_err(|e| AppError::Provider(format!("{}: malformed response: {}", what, e)))
    }

    fn channel_query(url: &mut Url, channel: &Channel) {
        if let Some(hash) = channel.access_hash {
            url.query_pairs_mut()
                .append_pair("access_hash", &hash.to_string());
        }
    }
}

/// Maps gateway status codes onto the engine error taxonomy.
fn check_status(resp: Response, what: &str) -> Result<Response, AppError> {
    match resp.status() {
        s if s.is_success() => Ok(resp),
        StatusCode::TOO_MANY_REQUESTS => Err(AppError::Throttled {
            wait: retry_after(&resp).unwrap_or(DEFAULT_RETRY_AFTER),
        }),
        StatusCode::FORBIDDEN => Err(AppError::PermissionDenied(what.to_string())),
        StatusCode::NOT_FOUND => Err(AppError::NotFound(what.to_string())),
        s => Err(AppError::Provider(format!("{} returned HTTP {}", what, s))),
    }
}

/// Parses the `Retry-After` header (delta-seconds form only).
fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

impl ProviderClient for GatewayClient {
    async fn full_channel(&self, channel: &Channel) -> Result<ChannelInfo, AppError> {
        let mut url = self.url(&format!("channels/{}/full", channel.id))?;
        Self::channel_query(&mut url, channel);
        let dto: ChannelInfoDto = self.get_json(url, "full_channel").await?;
        Ok(ChannelInfo {
            participant_hint: dto.participant_count,
        })
    }

    async fn list_members_page(
        &self,
        channel: &Channel,
        offset: u64,
        limit: u64,
    ) -> Result<MemberPage, AppError> {
        let mut url = self.url(&format!("channels/{}/members", channel.id))?;
        Self::channel_query(&mut url, channel);
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string());
        let dto: MemberPageDto = self.get_json(url, "list_members_page").await?;
        Ok(MemberPage {
            members: dto.members,
            next_offset: dto.next_offset,
        })
    }

    async fn recent_members_page(
        &self,
        channel: &Channel,
        offset: u64,
        limit: u64,
    ) -> Result<MemberPage, AppError> {
        let mut url = self.url(&format!("channels/{}/members/recent", channel.id))?;
        Self::channel_query(&mut url, channel);
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string());
        let dto: MemberPageDto = self.get_json(url, "recent_members_page").await?;
        Ok(MemberPage {
            members: dto.members,
            next_offset: dto.next_offset,
        })
    }

    async fn search_members_page(
        &self,
        channel: &Channel,
        probe: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RawMember>, AppError> {
        let mut url = self.url(&format!("channels/{}/members/search", channel.id))?;
        Self::channel_query(&mut url, channel);
        url.query_pairs_mut()
            .append_pair("q", probe)
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string());
        let dto: SearchDto = self.get_json(url, "search_members_page").await?;
        Ok(dto.members)
    }

    async fn member_detail(&self, member_id: i64) -> Result<MemberDetail, AppError> {
        let url = self.url(&format!("members/{}", member_id))?;
        let dto: MemberDetailDto = self.get_json(url, "member_detail").await?;
        Ok(MemberDetail {
            bio: dto.bio,
            is_scam: dto.scam,
            is_fake: dto.fake,
        })
    }

    async fn membership_detail(
        &self,
        channel: &Channel,
        member_id: i64,
    ) -> Result<MembershipDetail, AppError> {
        let mut url = self.url(&format!(
            "channels/{}/members/{}/membership",
            channel.id, member_id
        ))?;
        Self::channel_query(&mut url, channel);
        let dto: MembershipDto = self.get_json(url, "membership_detail").await?;
        Ok(MembershipDetail {
            joined_at: dto.joined_at,
        })
    }

    async fn resolve_channel(&self, handle: &str) -> Result<Channel, AppError> {
        let mut url = self.url("resolve")?;
        url.query_pairs_mut()
            .append_pair("handle", handle.trim_start_matches('@'));
        let dto: ChannelDto = self.get_json(url, "resolve_channel").await?;
        Ok(Channel {
            id: dto.id,
            title: dto.title,
            username: dto.username,
            access_hash: dto.access_hash,
            added_at: Utc::now(),
        })
    }
}
