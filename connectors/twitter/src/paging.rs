//! Mastodon paging parameters and their upstream counterparts.

use serde::Deserialize;
use url::Url;

use crate::client::Params;

const PAGING_KEYS: [&str; 3] = ["min_id", "max_id", "since_id"];

/// Paging parameters of a Mastodon list request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PagingQuery {
    pub limit: Option<u32>,
    pub max_id: Option<String>,
    pub since_id: Option<String>,
    pub min_id: Option<String>,
}

impl PagingQuery {
    /// Translate into upstream parameters, replacing any already present.
    ///
    /// `min_id` has no upstream equivalent and becomes `since_id`, taking
    /// precedence over an explicit `since_id`.
    pub fn apply(&self, params: &mut Params) {
        let mut set = |key: &str, value: String| {
            params.retain(|(k, _)| k != key);
            params.push((key.to_string(), value));
        };

        if let Some(limit) = self.limit {
            set("count", limit.to_string());
        }
        if let Some(max_id) = &self.max_id {
            set("max_id", max_id.clone());
        }
        if let Some(since_id) = &self.since_id {
            set("since_id", since_id.clone());
        }
        if let Some(min_id) = &self.min_id {
            set("since_id", min_id.clone());
        }
    }

    /// The last-read ID when this is an "everything newer than" request:
    /// `min_id` alone, parseable as an upstream ID.
    #[must_use]
    pub fn backfill_from(&self) -> Option<u64> {
        if self.max_id.is_some() || self.since_id.is_some() {
            return None;
        }
        self.min_id.as_deref()?.parse().ok()
    }

    #[must_use]
    pub fn is_backfill(&self) -> bool {
        self.backfill_from().is_some()
    }
}

/// `Link` header for a page of items with the given IDs.
///
/// `prev` asks for items newer than the page, `next` for items older than
/// it. Returns `None` for an empty page.
#[must_use]
pub fn page_links<I>(request_url: &Url, ids: I) -> Option<String>
where
    I: IntoIterator<Item = u64>,
{
    let (lowest, highest) = ids
        .into_iter()
        .fold(None, |acc: Option<(u64, u64)>, id| match acc {
            None => Some((id, id)),
            Some((lo, hi)) => Some((lo.min(id), hi.max(id))),
        })?;

    let base: Vec<(String, String)> = request_url
        .query_pairs()
        .filter(|(k, _)| !PAGING_KEYS.iter().any(|key| k == key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let with_cursor = |key: &str, value: u64| {
        let mut url = request_url.clone();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(&base)
            .append_pair(key, &value.to_string());
        url
    };

    let prev = with_cursor("min_id", highest);
    let next = with_cursor("max_id", lowest.saturating_sub(1));

    Some(format!("<{prev}>; rel=\"prev\", <{next}>; rel=\"next\""))
}
