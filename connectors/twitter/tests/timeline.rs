use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use lazybridge_twitter::client::HOME_TIMELINE_PATH;
use lazybridge_twitter::{
    BackfillConfig, BackfillReconciler, BridgeConfig, PagingQuery, SessionRegistry, StopReason,
    backfill::item_id,
};

/// Serves a descending run of tweet IDs, honouring `since_id`, `max_id` and
/// `count` the way the upstream does.
struct TimelineResponder {
    newest: u64,
    calls: Arc<AtomicUsize>,
    /// Upper bound on items returned per page, emulating upstream filtering.
    served_per_page: usize,
    /// 1-based call number answered with a 503.
    fail_on_call: Option<usize>,
}

impl TimelineResponder {
    fn new(newest: u64, calls: &Arc<AtomicUsize>) -> Self {
        Self {
            newest,
            calls: Arc::clone(calls),
            served_per_page: usize::MAX,
            fail_on_call: None,
        }
    }
}

impl Respond for TimelineResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return ResponseTemplate::new(503)
                .set_body_string(r#"{"errors":[{"code":130,"message":"Over capacity"}]}"#);
        }

        let param = |name: &str| -> Option<u64> {
            request
                .url
                .query_pairs()
                .find(|(k, _)| k == name)
                .and_then(|(_, v)| v.parse().ok())
        };
        let since_id = param("since_id").unwrap_or(0);
        let max_id = param("max_id").unwrap_or(self.newest);
        let count = param("count").unwrap_or(20) as usize;

        let items: Vec<Value> = (since_id + 1..=max_id.min(self.newest))
            .rev()
            .take(count.min(self.served_per_page))
            .map(|id| json!({"id_str": id.to_string(), "full_text": format!("tweet {id}")}))
            .collect();

        ResponseTemplate::new(200).set_body_json(items)
    }
}

async fn mount(server: &MockServer, responder: TimelineResponder) {
    Mock::given(method("GET"))
        .and(path(HOME_TIMELINE_PATH))
        .respond_with(responder)
        .mount(server)
        .await;
}

fn registry(server: &MockServer) -> SessionRegistry {
    SessionRegistry::new(BridgeConfig {
        consumer_key: "ck".into(),
        consumer_secret: "cs".into(),
        api_url: server.uri(),
        ..Default::default()
    })
}

fn query_value(request: &Request, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

#[tokio::test]
async fn min_id_query_backfills_whole_gap() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));
    mount(&server, TimelineResponder::new(650, &calls)).await;

    let session = registry(&server).session("12345-ABCDEF", "secret").unwrap();
    let query = PagingQuery {
        min_id: Some("100".into()),
        ..Default::default()
    };
    let items = session.home_timeline(&query).await.unwrap();

    let ids: Vec<u64> = items.iter().filter_map(item_id).collect();
    assert_eq!(ids, (101..=650).rev().collect::<Vec<_>>());
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(query_value(&requests[0], "max_id"), None);
    assert_eq!(query_value(&requests[1], "max_id").as_deref(), Some("450"));
    assert_eq!(query_value(&requests[2], "max_id").as_deref(), Some("250"));
    for request in &requests {
        assert_eq!(query_value(request, "since_id").as_deref(), Some("99"));
        assert_eq!(query_value(request, "count").as_deref(), Some("200"));
        assert_eq!(query_value(request, "tweet_mode").as_deref(), Some("extended"));
        assert_eq!(query_value(request, "include_my_retweet").as_deref(), Some("1"));
        assert!(request.headers.contains_key("authorization"));
    }
}

#[tokio::test]
async fn plain_query_fetches_one_page() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));
    mount(&server, TimelineResponder::new(650, &calls)).await;

    let session = registry(&server).session("12345-ABCDEF", "secret").unwrap();
    let query = PagingQuery {
        limit: Some(40),
        max_id: Some("500".into()),
        ..Default::default()
    };
    let items = session.home_timeline(&query).await.unwrap();

    assert_eq!(items.len(), 40);
    assert_eq!(item_id(&items[0]), Some(500));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(query_value(&requests[0], "include_my_retweet").as_deref(), Some("1"));
}

#[tokio::test]
async fn upstream_failure_returns_collected_pages() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let mut responder = TimelineResponder::new(650, &calls);
    responder.fail_on_call = Some(2);
    mount(&server, responder).await;

    let session = registry(&server).session("12345-ABCDEF", "secret").unwrap();
    let reconciler = BackfillReconciler::new(session.client(), BackfillConfig::default());
    let outcome = reconciler.run(HOME_TIMELINE_PATH, &[], 100).await;

    assert_eq!(outcome.stop, StopReason::FetchFailed);
    assert_eq!(outcome.pages_fetched, 1);
    assert_eq!(outcome.items.len(), 200);
    assert_eq!(outcome.items.first().and_then(item_id), Some(650));
    assert_eq!(outcome.items.last().and_then(item_id), Some(451));
}

#[tokio::test]
async fn filtered_page_ends_backfill() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let mut responder = TimelineResponder::new(5000, &calls);
    responder.served_per_page = 120;
    mount(&server, responder).await;

    let session = registry(&server).session("12345-ABCDEF", "secret").unwrap();
    let reconciler = BackfillReconciler::new(session.client(), BackfillConfig::default());
    let outcome = reconciler.run(HOME_TIMELINE_PATH, &[], 10).await;

    assert_eq!(outcome.stop, StopReason::ShortPage);
    assert_eq!(outcome.items.len(), 120);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn caught_up_client_gets_nothing() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));
    mount(&server, TimelineResponder::new(650, &calls)).await;

    let session = registry(&server).session("12345-ABCDEF", "secret").unwrap();
    let query = PagingQuery {
        min_id: Some("650".into()),
        ..Default::default()
    };

    assert!(session.home_timeline(&query).await.unwrap().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
