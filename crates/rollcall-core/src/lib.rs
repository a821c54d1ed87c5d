//! Rollcall core: the member-harvesting engine.
//!
//! Builds deduplicated member sets for access-controlled channels by
//! unioning several incomplete enumeration strategies, syncs them
//! incrementally into a persistent store, enriches stored members with
//! secondary attributes under provider throttle signals, and supports
//! cooperative cancellation with one-shot partial-result export.
//!
//! The engine is generic over two seams: [`traits::ProviderClient`] (the
//! remote provider gateway) and [`traits::MemberStore`] (the persistence
//! adapter). Everything else is policy built on top of them.

pub mod config;
pub mod dedup;
pub mod enrich;
pub mod error;
pub mod export;
pub mod harvest;
pub mod job;
pub mod models;
pub mod progress;
pub mod strategy;
pub mod sync;
pub mod throttle;
pub mod traits;

pub use config::{ChannelsConfig, HarvestConfig};
pub use error::AppError;
pub use harvest::{HarvestResult, HarvestService};
pub use job::{JobRegistry, JobState};
pub use models::{Channel, Member, PresenceStatus, StrategyKind};
pub use traits::{MemberStore, ProviderClient};
