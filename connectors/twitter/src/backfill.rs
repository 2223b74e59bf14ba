//! Timeline backfill.
//!
//! Mastodon clients refresh by asking for everything newer than the last
//! item they read (`min_id`). The upstream only pages windows of the newest
//! N items bounded by `since_id`/`max_id`, so passing the cursor through
//! returns the newest page and silently drops the gap. The reconciler walks
//! the window backwards until it meets the last-read item.

use std::collections::HashSet;
use std::future::Future;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::{
    client::{Params, TwitterApiClient},
    config::BackfillConfig,
    error::TwitterResult,
};

/// The upstream window requested for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Exclusive lower bound.
    pub since_id: Option<u64>,
    /// Inclusive upper bound.
    pub max_id: Option<u64>,
    pub count: u32,
}

impl PageWindow {
    /// Write the window into request parameters, replacing any paging
    /// parameters already present.
    pub fn apply(&self, params: &mut Params) {
        params.retain(|(k, _)| !matches!(k.as_str(), "count" | "since_id" | "max_id"));
        params.push(("count".to_string(), self.count.to_string()));
        if let Some(since_id) = self.since_id {
            params.push(("since_id".to_string(), since_id.to_string()));
        }
        if let Some(max_id) = self.max_id {
            params.push(("max_id".to_string(), max_id.to_string()));
        }
    }
}

/// Why a backfill stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// An item at or below the last-read ID came back: the gap is closed.
    ReachedLastRead,
    /// A page came back shorter than the threshold; nothing older is assumed.
    ShortPage,
    /// The page cap was hit.
    PageLimit,
    /// A full page yielded nothing new.
    NoProgress,
    /// A page request failed; earlier pages are kept.
    FetchFailed,
}

/// Result of one backfill.
#[derive(Debug, Clone)]
pub struct BackfillOutcome {
    /// Items strictly newer than the last-read ID, newest first, no duplicates.
    pub items: Vec<Value>,
    pub pages_fetched: usize,
    pub stop: StopReason,
}

/// Upstream ID of an item: `id_str`, falling back to a numeric `id`.
#[must_use]
pub fn item_id(item: &Value) -> Option<u64> {
    item.get("id_str")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .or_else(|| item.get("id").and_then(Value::as_u64))
}

struct BackfillState {
    last_read_id: u64,
    /// Highest ID not yet fetched. Only moves down.
    frontier: Option<u64>,
    items: Vec<Value>,
    seen: HashSet<u64>,
    pages: usize,
}

impl BackfillState {
    fn new(last_read_id: u64) -> Self {
        Self {
            last_read_id,
            frontier: None,
            items: Vec::new(),
            seen: HashSet::new(),
            pages: 0,
        }
    }

    /// Scan one page newest first. Returns how many new items were taken and
    /// whether the last-read item (or anything older) was reached.
    fn absorb(&mut self, batch: Vec<Value>) -> (usize, bool) {
        let mut keyed: Vec<(u64, Value)> = batch
            .into_iter()
            .filter_map(|item| match item_id(&item) {
                Some(id) => Some((id, item)),
                None => {
                    debug!("Skipping timeline item without an ID");
                    None
                }
            })
            .collect();
        keyed.sort_by(|a, b| b.0.cmp(&a.0));

        let mut consumed = 0;
        for (id, item) in keyed {
            if id <= self.last_read_id {
                return (consumed, true);
            }
            if !self.seen.insert(id) {
                continue;
            }
            // id > last_read_id >= 0, so id - 1 cannot underflow.
            let bound = id - 1;
            self.frontier = Some(self.frontier.map_or(bound, |f| f.min(bound)));
            self.items.push(item);
            consumed += 1;
        }
        (consumed, false)
    }
}

/// Collect every item newer than `last_read_id` using `fetch_page` for the
/// upstream calls.
///
/// Pages are requested one at a time: each window's `max_id` is the frontier
/// left by the previous page. The boundary item itself is requested
/// (`since_id = last_read_id - 1`) so its arrival proves the gap is closed.
pub async fn reconcile<F, Fut>(
    last_read_id: u64,
    config: &BackfillConfig,
    mut fetch_page: F,
) -> BackfillOutcome
where
    F: FnMut(PageWindow) -> Fut,
    Fut: Future<Output = TwitterResult<Vec<Value>>>,
{
    let since_id = last_read_id.checked_sub(1).filter(|&id| id > 0);
    let mut state = BackfillState::new(last_read_id);

    info!(last_read_id, "Backfilling timeline");

    let stop = loop {
        if state.pages >= config.max_pages {
            warn!(pages = state.pages, "Backfill page cap reached");
            break StopReason::PageLimit;
        }

        let window = PageWindow {
            since_id,
            max_id: state.frontier,
            count: config.page_size,
        };

        let batch = match fetch_page(window).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, collected = state.items.len(), "Error while loading timeline page");
                break StopReason::FetchFailed;
            }
        };
        state.pages += 1;

        let batch_len = batch.len();
        let (consumed, reached) = state.absorb(batch);

        debug!(
            batch_len,
            consumed,
            total = state.items.len(),
            frontier = ?state.frontier,
            "Loaded timeline page"
        );

        if reached {
            break StopReason::ReachedLastRead;
        }
        if batch_len < config.short_page_threshold {
            break StopReason::ShortPage;
        }
        if consumed == 0 {
            break StopReason::NoProgress;
        }
    };

    info!(
        items = state.items.len(),
        pages = state.pages,
        stop = ?stop,
        newest = ?state.items.first().and_then(item_id),
        oldest = ?state.items.last().and_then(item_id),
        "Backfill finished"
    );

    BackfillOutcome {
        items: state.items,
        pages_fetched: state.pages,
        stop,
    }
}

/// Backfill driver bound to one authenticated client.
#[derive(Debug)]
pub struct BackfillReconciler<'a> {
    client: &'a TwitterApiClient,
    config: BackfillConfig,
}

impl<'a> BackfillReconciler<'a> {
    #[must_use]
    pub const fn new(client: &'a TwitterApiClient, config: BackfillConfig) -> Self {
        Self { client, config }
    }

    /// Fetch everything newer than `last_read_id` from a timeline endpoint.
    ///
    /// `base_params` are sent with every page; paging parameters in it are
    /// replaced by the window. Failures end the walk early instead of
    /// failing the call.
    #[instrument(skip(self, base_params), fields(identity = %self.client.identity()))]
    pub async fn run(
        &self,
        endpoint: &str,
        base_params: &[(String, String)],
        last_read_id: u64,
    ) -> BackfillOutcome {
        let client = self.client;

        reconcile(last_read_id, &self.config, move |window| {
            let mut params = base_params.to_vec();
            window.apply(&mut params);
            async move {
                client
                    .get(endpoint, &params)
                    .await?
                    .error_for_status()?
                    .json::<Vec<Value>>()
            }
        })
        .await
    }
}
