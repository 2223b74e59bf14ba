//! Bridge configuration consumed by the authenticated-request core.
//!
//! The surrounding application owns reading this from disk; the core only
//! deserializes an already-loaded document and treats the values as opaque.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TwitterError, TwitterResult};

/// Configuration shared by every session of the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// OAuth 1.0a Consumer Key (API Key)
    pub consumer_key: String,

    /// OAuth 1.0a Consumer Secret (API Secret)
    pub consumer_secret: String,

    /// Base URL for the v1.1 REST API (default: https://api.twitter.com)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Headers added to every upstream request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Parameters merged into every item-returning request.
    #[serde(default = "default_request_params")]
    pub default_params: BTreeMap<String, String>,

    /// Transport timeout. Unset means the HTTP client's own default.
    #[serde(
        default,
        with = "duration_secs_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,

    /// How long a fetched profile stays fresh.
    #[serde(default = "default_profile_ttl", with = "duration_secs")]
    pub profile_ttl: Duration,

    /// Timeline backfill tuning
    #[serde(default)]
    pub backfill: BackfillConfig,
}

fn default_api_url() -> String {
    "https://api.twitter.com".into()
}

const fn default_profile_ttl() -> Duration {
    Duration::from_secs(60)
}

/// The flags the iOS client sends so items come back with full entities,
/// cards and extended text.
fn default_request_params() -> BTreeMap<String, String> {
    [
        ("include_cards", "1"),
        ("cards_platform", "iPhone-13"),
        ("include_entities", "1"),
        ("include_user_entities", "1"),
        ("include_ext_trusted_friends_metadata", "true"),
        ("include_ext_verified_type", "true"),
        ("include_ext_vibe", "true"),
        ("include_ext_alt_text", "true"),
        ("include_composer_source", "true"),
        ("include_quote_count", "1"),
        ("include_reply_count", "1"),
        ("tweet_mode", "extended"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod duration_secs_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

/// Tuning for the timeline backfill loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// Items requested per page (the upstream maximum is 200).
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Absolute item count, not a ratio: a page with fewer items than this
    /// ends the loop. The default of 150 against a `page_size` of 200 is 75%.
    /// Upstream filtering routinely returns less than `page_size` even when
    /// older items exist. Must not exceed `page_size`.
    #[serde(default = "default_short_page_threshold")]
    pub short_page_threshold: usize,

    /// Hard cap on pages fetched by a single backfill.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

const fn default_page_size() -> u32 {
    200
}

const fn default_short_page_threshold() -> usize {
    150
}

const fn default_max_pages() -> usize {
    20
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            short_page_threshold: default_short_page_threshold(),
            max_pages: default_max_pages(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            consumer_key: String::new(),
            consumer_secret: String::new(),
            api_url: default_api_url(),
            headers: BTreeMap::new(),
            default_params: default_request_params(),
            timeout: None,
            profile_ttl: default_profile_ttl(),
            backfill: BackfillConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(raw: &str) -> TwitterResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields and backfill bounds.
    pub fn validate(&self) -> TwitterResult<()> {
        if self.consumer_key.is_empty() {
            return Err(TwitterError::Config("consumer_key is required".into()));
        }
        if self.consumer_secret.is_empty() {
            return Err(TwitterError::Config("consumer_secret is required".into()));
        }
        if self.backfill.page_size == 0 {
            return Err(TwitterError::Config("backfill.page_size must be positive".into()));
        }
        if self.backfill.max_pages == 0 {
            return Err(TwitterError::Config("backfill.max_pages must be positive".into()));
        }
        if self.backfill.short_page_threshold > self.backfill.page_size as usize {
            return Err(TwitterError::Config(format!(
                "backfill.short_page_threshold ({}) exceeds page_size ({})",
                self.backfill.short_page_threshold, self.backfill.page_size
            )));
        }
        Ok(())
    }

    /// Base URL with any trailing slash removed.
    #[must_use]
    pub fn api_base(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }
}
