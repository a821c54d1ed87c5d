//! HTTP gateway client for the channel provider.
//!
//! Implements [`rollcall_core::traits::ProviderClient`] against an
//! already-authenticated HTTP gateway that fronts the provider's API.
//! Throttle signals arrive as HTTP 429 with a `Retry-After` header and are
//! surfaced as [`rollcall_core::AppError::Throttled`]; the engine's wrapper
//! decides how to honor them.

pub mod gateway;

pub use gateway::GatewayClient;
