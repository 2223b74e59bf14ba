//! Single-flight TTL cache for user profile lookups.
//!
//! Rendering a timeline resolves the same handful of users over and over,
//! often concurrently. Concurrent lookups for one ID share a single upstream
//! call; a successful result is served from memory until it expires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{
    client::TwitterApiClient,
    error::{TwitterError, TwitterResult},
};

#[derive(Debug, Clone)]
struct FetchedProfile {
    profile: Arc<Value>,
    expires_at: Instant,
}

type SharedFetch = Shared<BoxFuture<'static, Result<FetchedProfile, Arc<TwitterError>>>>;

enum CacheEntry {
    Pending(SharedFetch),
    Ready(FetchedProfile),
    Failed,
}

enum Lookup {
    Hit(Arc<Value>),
    Wait(SharedFetch),
}

/// Profile cache scoped to one credential.
pub struct ProfileCache {
    client: Arc<TwitterApiClient>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl std::fmt::Debug for ProfileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileCache")
            .field("identity", &self.client.identity())
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl ProfileCache {
    #[must_use]
    pub fn new(client: Arc<TwitterApiClient>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of entries in any state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Profile for `id`.
    ///
    /// A fresh cached profile returns without an upstream call, a fetch
    /// already in flight is joined, and anything else starts a new fetch.
    /// Every caller joined on a failed fetch gets the same
    /// [`TwitterError::CacheFailure`]; the failure is not remembered.
    #[instrument(skip(self), fields(identity = %self.client.identity()))]
    pub async fn fetch(&self, id: &str) -> TwitterResult<Arc<Value>> {
        let fetch = match self.lookup(id) {
            Lookup::Hit(profile) => return Ok(profile),
            Lookup::Wait(fetch) => fetch,
        };

        let result = fetch.clone().await;
        self.settle(id, &fetch, &result);

        result
            .map(|fetched| fetched.profile)
            .map_err(|source| TwitterError::CacheFailure {
                id: id.to_string(),
                source,
            })
    }

    fn lookup(&self, id: &str) -> Lookup {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        match entries.get(id) {
            Some(CacheEntry::Ready(fetched)) if fetched.expires_at > now => {
                debug!(user_id = id, "Profile cache hit");
                return Lookup::Hit(Arc::clone(&fetched.profile));
            }
            // Polling here lets a fetch whose callers all went away settle
            // before its result is judged.
            Some(CacheEntry::Pending(fetch)) => match fetch.clone().now_or_never() {
                None => {
                    debug!(user_id = id, "Joining in-flight profile fetch");
                    return Lookup::Wait(fetch.clone());
                }
                Some(Ok(fetched)) if fetched.expires_at > now => {
                    let profile = Arc::clone(&fetched.profile);
                    entries.insert(id.to_string(), CacheEntry::Ready(fetched));
                    return Lookup::Hit(profile);
                }
                Some(Ok(_)) => debug!(user_id = id, "Profile cache entry expired"),
                Some(Err(e)) => warn!(user_id = id, error = %e, "Profile fetch failed"),
            },
            Some(CacheEntry::Ready(_)) => debug!(user_id = id, "Profile cache entry expired"),
            Some(CacheEntry::Failed) | None => {}
        }

        let fetch = self.start_fetch(id);
        entries.insert(id.to_string(), CacheEntry::Pending(fetch.clone()));
        Lookup::Wait(fetch)
    }

    /// Run the upstream call on its own task so it finishes even when every
    /// caller goes away.
    fn start_fetch(&self, id: &str) -> SharedFetch {
        debug!(user_id = id, "Fetching profile");

        let client = Arc::clone(&self.client);
        let ttl = self.ttl;
        let user_id = id.to_string();
        let task = tokio::spawn(async move {
            let profile = client.show_user(&user_id).await?;
            Ok::<_, TwitterError>(FetchedProfile {
                profile: Arc::new(profile),
                expires_at: Instant::now() + ttl,
            })
        });

        async move {
            match task.await {
                Ok(result) => result.map_err(Arc::new),
                Err(e) => Err(Arc::new(TwitterError::Task(e.to_string()))),
            }
        }
        .boxed()
        .shared()
    }

    /// Publish the outcome of `fetch`, unless a newer fetch replaced it.
    fn settle(
        &self,
        id: &str,
        fetch: &SharedFetch,
        result: &Result<FetchedProfile, Arc<TwitterError>>,
    ) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(id) else {
            return;
        };
        if !matches!(entry, CacheEntry::Pending(current) if current.ptr_eq(fetch)) {
            return;
        }

        *entry = match result {
            Ok(fetched) => CacheEntry::Ready(fetched.clone()),
            Err(e) => {
                warn!(user_id = id, error = %e, "Profile fetch failed");
                CacheEntry::Failed
            }
        };
    }
}
