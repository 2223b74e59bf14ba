//! Per-user sessions: one authenticated client and profile cache per access
//! token, created the first time the token is seen.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{info, instrument};

use crate::{
    backfill::BackfillReconciler,
    client::{HOME_TIMELINE_PATH, TwitterApiClient},
    config::BridgeConfig,
    credential::Credential,
    error::TwitterResult,
    paging::PagingQuery,
    profile_cache::ProfileCache,
    telemetry::redact_token,
};

/// Everything held for one user.
#[derive(Debug)]
pub struct Session {
    client: Arc<TwitterApiClient>,
    profiles: ProfileCache,
    config: Arc<BridgeConfig>,
}

impl Session {
    fn new(config: Arc<BridgeConfig>, credential: Credential) -> TwitterResult<Self> {
        let client = Arc::new(TwitterApiClient::new(&config, credential)?);
        let profiles = ProfileCache::new(Arc::clone(&client), config.profile_ttl);

        Ok(Self {
            client,
            profiles,
            config,
        })
    }

    #[must_use]
    pub const fn client(&self) -> &Arc<TwitterApiClient> {
        &self.client
    }

    #[must_use]
    pub const fn profiles(&self) -> &ProfileCache {
        &self.profiles
    }

    /// Cached profile lookup.
    pub async fn fetch_profile(&self, user_id: &str) -> TwitterResult<Arc<Value>> {
        self.profiles.fetch(user_id).await
    }

    /// Home timeline items for a Mastodon paging query, newest first.
    ///
    /// A lone `min_id` fills the whole gap down to that item; any other
    /// query fetches a single page.
    #[instrument(skip(self), fields(identity = %self.client.identity()))]
    pub async fn home_timeline(&self, query: &PagingQuery) -> TwitterResult<Vec<Value>> {
        let mut params = self.client.item_params();
        params.push(("include_my_retweet".to_string(), "1".to_string()));

        if let Some(last_read_id) = query.backfill_from() {
            let reconciler = BackfillReconciler::new(&self.client, self.config.backfill.clone());
            let outcome = reconciler
                .run(HOME_TIMELINE_PATH, &params, last_read_id)
                .await;
            return Ok(outcome.items);
        }

        query.apply(&mut params);
        self.client.home_timeline_page(&params).await
    }
}

/// Sessions keyed by access token.
#[derive(Debug)]
pub struct SessionRegistry {
    config: Arc<BridgeConfig>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The session for an access token, created on first use.
    ///
    /// The secret is only read when the session is created.
    pub fn session(
        &self,
        access_token: &str,
        access_token_secret: &str,
    ) -> TwitterResult<Arc<Session>> {
        if let Some(session) = self.sessions.read().get(access_token) {
            return Ok(Arc::clone(session));
        }

        let mut sessions = self.sessions.write();
        match sessions.entry(access_token.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let credential = Credential::new(
                    &self.config.consumer_key,
                    &self.config.consumer_secret,
                    access_token,
                    access_token_secret,
                );
                let session = Arc::new(Session::new(Arc::clone(&self.config), credential)?);
                info!(token = %redact_token(access_token), "Created session");
                Ok(Arc::clone(entry.insert(session)))
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
