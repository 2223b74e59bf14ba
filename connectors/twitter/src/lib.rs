//! Authenticated upstream core for a Mastodon-to-Twitter bridge.
//!
//! Mastodon clients talk to the bridge; the bridge talks to the Twitter v1.1
//! REST API on each user's behalf. This crate is the part that touches the
//! upstream:
//!
//! - OAuth 1.0a HMAC-SHA1 request signing
//! - A per-user signed HTTP client that returns upstream responses intact
//! - Timeline backfill, filling the gap between a client's last-read item
//!   and the newest upstream page
//! - A single-flight, short-TTL profile cache
//! - Per-user sessions and Mastodon paging glue
//!
//! Translating upstream JSON into Mastodon entities is left to the
//! surrounding application.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod backfill;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod oauth;
pub mod paging;
pub mod profile_cache;
pub mod session;
pub mod telemetry;

pub use backfill::{BackfillOutcome, BackfillReconciler, PageWindow, StopReason};
pub use client::{RateLimitInfo, TwitterApiClient, UpstreamResponse};
pub use config::{BackfillConfig, BridgeConfig};
pub use credential::Credential;
pub use error::{TwitterError, TwitterResult};
pub use oauth::{OAuthSigner, SignedRequest, percent_encode};
pub use paging::{PagingQuery, page_links};
pub use profile_cache::ProfileCache;
pub use session::{Session, SessionRegistry};
pub use telemetry::{TelemetryConfig, init_logging};
