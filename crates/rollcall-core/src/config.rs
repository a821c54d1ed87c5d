//! Configuration types for Rollcall components.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;
use crate::models::Channel;

// =============================================================================
// Harvest Configuration
// =============================================================================

/// Tuning knobs for enumeration, sync, and enrichment.
///
/// Defaults are conservative enough to stay under typical provider rate
/// limits; everything is overridable through the builder-style setters.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Page size for the full and recency walks.
    pub page_size: u64,
    /// Page size for probe-sweep search calls.
    pub search_page_size: u64,
    /// Members per persistence batch. Kept under the adapter payload limit.
    pub upsert_batch_size: usize,
    /// Pause between consecutive probe tokens.
    pub probe_pause: Duration,
    /// Extra wait added on top of every provider-requested backoff.
    pub throttle_margin: Duration,
    /// Mandatory pause after every enrichment candidate.
    pub enrich_pacing: Duration,
    /// Minimum interval between progress updates.
    pub progress_interval: Duration,
    /// Item-count threshold that also releases a progress update.
    pub progress_every: usize,
    /// Consecutive page/probe failures that end a strategy.
    pub max_consecutive_failures: usize,
    /// Probe tokens for the keyed-probe sweep. Replaceable configuration,
    /// not a coverage contract.
    pub probe_tokens: Vec<String>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            page_size: 200,
            search_page_size: 200,
            upsert_batch_size: 500,
            probe_pause: Duration::from_millis(1000),
            throttle_margin: Duration::from_secs(1),
            enrich_pacing: Duration::from_millis(500),
            progress_interval: Duration::from_secs(3),
            progress_every: 50,
            max_consecutive_failures: 3,
            probe_tokens: default_probe_tokens(),
        }
    }
}

impl HarvestConfig {
    /// Creates a HarvestConfig with a custom upsert batch size.
    pub fn with_upsert_batch_size(mut self, size: usize) -> Self {
        self.upsert_batch_size = size.max(1);
        self
    }

    /// Creates a HarvestConfig with a custom walk page size.
    pub fn with_page_size(mut self, size: u64) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Creates a HarvestConfig with a custom probe-token list.
    pub fn with_probe_tokens(mut self, tokens: Vec<String>) -> Self {
        self.probe_tokens = tokens;
        self
    }

    /// Creates a HarvestConfig with custom pacing intervals.
    ///
    /// Useful in tests to keep sleeps in the low-millisecond range.
    pub fn with_pacing(mut self, probe_pause: Duration, enrich_pacing: Duration) -> Self {
        self.probe_pause = probe_pause;
        self.enrich_pacing = enrich_pacing;
        self
    }

    /// Creates a HarvestConfig with a custom throttle margin.
    pub fn with_throttle_margin(mut self, margin: Duration) -> Self {
        self.throttle_margin = margin;
        self
    }
}

/// Default probe-token list: Latin letters, digits, Cyrillic letters, and a
/// handful of short common name fragments.
fn default_probe_tokens() -> Vec<String> {
    let mut tokens: Vec<String> = ('a'..='z').map(|c| c.to_string()).collect();
    tokens.extend(('0'..='9').map(|c| c.to_string()));
    tokens.extend(('а'..='я').map(|c| c.to_string()));
    tokens.extend(
        ["al", "an", "ma", "mo", "ka", "sa", "ja", "el", "ni", "vi"]
            .iter()
            .map(|s| s.to_string()),
    );
    tokens
}

// =============================================================================
// Channel Registry (channels.toml)
// =============================================================================

/// Root structure of the channels.toml registry file.
///
/// # Example
///
/// ```toml
/// [[channels]]
/// id = 1234567890
/// title = "Announcements"
/// username = "announce"
/// access_hash = 987654321
/// added_at = "2026-01-15T10:00:00Z"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Registered channels, in the order they were added.
    #[serde(default)]
    pub channels: Vec<Channel>,
}

impl ChannelsConfig {
    /// Find a channel by its numeric id.
    pub fn find_by_id(&self, id: i64) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Find a channel by handle (case-insensitive, with or without `@`).
    pub fn find_by_handle(&self, handle: &str) -> Option<&Channel> {
        let handle = handle.trim_start_matches('@');
        self.channels.iter().find(|c| {
            c.username
                .as_deref()
                .is_some_and(|u| u.eq_ignore_ascii_case(handle))
        })
    }

    /// Adds a channel, deduplicating by id.
    ///
    /// When the id is already registered, the existing entry keeps its
    /// position; a missing credential is back-filled from the new record.
    /// Returns true when the registry changed.
    pub fn add(&mut self, channel: Channel) -> bool {
        if let Some(existing) = self.channels.iter_mut().find(|c| c.id == channel.id) {
            if existing.access_hash.is_none() && channel.access_hash.is_some() {
                existing.access_hash = channel.access_hash;
                return true;
            }
            return false;
        }
        self.channels.push(channel);
        true
    }

    /// Removes a channel by id. Returns true when an entry was removed.
    pub fn remove(&mut self, id: i64) -> bool {
        let before = self.channels.len();
        self.channels.retain(|c| c.id != id);
        self.channels.len() != before
    }
}

/// Default registry file name.
pub const CHANNELS_FILE_NAME: &str = "channels.toml";

/// Returns the default configuration directory: `~/.config/rollcall/`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("rollcall"))
}

/// Returns the default registry file path: `~/.config/rollcall/channels.toml`.
pub fn default_channels_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(CHANNELS_FILE_NAME))
}

/// Load the channel registry from a TOML file.
///
/// # Arguments
/// * `path` - Optional custom path. If `None`, uses the default XDG path.
///
/// # Returns
/// * `Ok(config)` - Registry loaded (empty when the default file is absent)
/// * `Err(e)` - File exists but is invalid, or a custom path is missing
pub fn load_channels_config(path: Option<PathBuf>) -> Result<ChannelsConfig, AppError> {
    let using_default_path = path.is_none();
    let config_path = match path {
        Some(p) => p,
        None => match default_channels_path() {
            Some(p) => p,
            None => return Ok(ChannelsConfig::default()),
        },
    };

    if !config_path.exists() {
        if using_default_path {
            // Nothing registered yet; start with an empty registry.
            return Ok(ChannelsConfig::default());
        }
        return Err(AppError::Config(format!(
            "Channels file not found: {}",
            config_path.display()
        )));
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        AppError::Config(format!(
            "Failed to read channels file '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    let config: ChannelsConfig = toml::from_str(&content).map_err(|e| {
        AppError::Config(format!(
            "Invalid TOML in '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    Ok(config)
}

/// Persist the channel registry, creating the parent directory if needed.
pub fn save_channels_config(config: &ChannelsConfig, path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| AppError::Config(format!("Failed to serialize channels file: {}", e)))?;
    std::fs::write(path, content)?;
    tracing::debug!("Saved channel registry to {}", path.display());

    Ok(())
}
