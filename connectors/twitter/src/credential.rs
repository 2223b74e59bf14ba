//! Per-user OAuth 1.0a credentials.

use std::fmt;

/// Consumer key/secret plus one user's access token pair.
///
/// Immutable once built. The user's numeric ID is the part of the access
/// token before its first `-`; an access token without a `-` yields an empty
/// identity.
#[derive(Clone)]
pub struct Credential {
    consumer_key: String,
    consumer_secret: String,
    access_token: String,
    access_token_secret: String,
    identity: String,
}

impl Credential {
    /// Build a credential and derive its identity.
    #[must_use]
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_token_secret: impl Into<String>,
    ) -> Self {
        let access_token = access_token.into();
        let identity = access_token
            .split_once('-')
            .map(|(id, _)| id.to_string())
            .unwrap_or_default();

        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            access_token,
            access_token_secret: access_token_secret.into(),
            identity,
        }
    }

    #[must_use]
    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    #[must_use]
    pub fn consumer_secret(&self) -> &str {
        &self.consumer_secret
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub fn access_token_secret(&self) -> &str {
        &self.access_token_secret
    }

    /// User ID encoded in the access token.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("consumer_key", &self.consumer_key)
            .field("access_token", &crate::telemetry::redact_token(&self.access_token))
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
