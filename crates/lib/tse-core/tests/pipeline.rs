use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{Value, json};
use tse_core::fetcher::{
    RetryPolicy,
    TransportError,
    TransportFuture,
    TransportResponse,
    UpstreamTransport,
};
use tse_core::{MarketControlPlane, PipelineConfig, QueryError};
use tse_store::models::Instrument;

const BASE_URL: &str = "http://upstream.test";
const LISTING: &str = "/api/ClosingPrice/GetMarketWatch";
const SYM1_ID: &str = "1001";

#[derive(Clone)]
enum Reply {
    Json(Value),
    Status(u16),
    Refused,
}

struct Route {
    replies: VecDeque<Reply>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

/// Upstream fake answering by path. The last scripted reply for a route
/// repeats forever.
#[derive(Default)]
struct ScriptedUpstream {
    routes: Mutex<HashMap<String, Route>>,
}

impl ScriptedUpstream {
    fn route(&self, path: &str, replies: Vec<Reply>, delay: Duration) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        self.routes.lock().expect("routes").insert(
            path.to_string(),
            Route {
                replies: replies.into(),
                delay,
                calls: calls.clone(),
            },
        );
        calls
    }

    fn next_reply(&self, url: &str) -> (Option<Reply>, Duration) {
        let path = url.strip_prefix(BASE_URL).unwrap_or(url);
        let mut routes = self.routes.lock().expect("routes");
        let Some(route) = routes.get_mut(path) else {
            return (None, Duration::ZERO);
        };
        route.calls.fetch_add(1, Ordering::SeqCst);
        let reply = if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        };
        (reply, route.delay)
    }
}

impl UpstreamTransport for ScriptedUpstream {
    fn get<'a>(&'a self, url: &'a str, _timeout: Duration) -> TransportFuture<'a> {
        Box::pin(async move {
            let (reply, delay) = self.next_reply(url);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match reply {
                None => Ok(TransportResponse::status(404, "")),
                Some(Reply::Json(body)) => Ok(TransportResponse::ok(body.to_string())),
                Some(Reply::Status(status)) => Ok(TransportResponse::status(status, "")),
                Some(Reply::Refused) => Err(TransportError::Connect("refused".to_string())),
            }
        })
    }
}

fn config() -> PipelineConfig {
    PipelineConfig::default()
        .with_base_url(BASE_URL)
        .with_retry(
            RetryPolicy::new(3)
                .with_base_delay(Duration::from_millis(20))
                .with_jitter(false),
        )
        .with_remote_search_fallback(false)
}

fn listing() -> Value {
    json!({ "marketwatch": [
        { "insCode": SYM1_ID, "lva": "SYM1", "lvc": "Symbol One", "yVal": 300 },
        { "insCode": "1002", "lva": "SYM10", "lvc": "Symbol Ten", "yVal": 300 },
        { "insCode": "2001", "lva": "وبملت", "lvc": "بانك ملت", "yVal": 300 },
        { "insCode": "3001", "lva": "DUP", "lvc": "Duplicate A" },
        { "insCode": "3002", "lva": "DUP", "lvc": "Duplicate B" },
    ]})
}

fn snapshot_body() -> Value {
    json!({ "closingPriceInfo": {
        "insCode": SYM1_ID,
        "dEven": 20_240_110,
        "hEven": 122_959,
        "priceFirst": 1_000,
        "priceMax": 1_050,
        "priceMin": 990,
        "pClosing": 1_020,
        "pDrCotVal": 1_030,
        "priceYesterday": 1_000,
        "zTotTran": 311,
        "qTotTran5J": 45_000,
        "qTotCap": 45_900_000,
    }})
}

fn snapshot_path(identifier: &str) -> String {
    format!("/api/ClosingPrice/GetClosingPriceInfo/{identifier}")
}

fn history_path(identifier: &str) -> String {
    format!("/api/ClosingPrice/GetClosingPriceDailyList/{identifier}/0")
}

async fn ready(upstream: &Arc<ScriptedUpstream>, config: PipelineConfig) -> MarketControlPlane {
    upstream.route(LISTING, vec![Reply::Json(listing())], Duration::ZERO);
    let control = MarketControlPlane::from_transport(upstream.clone(), config);
    control.catalog().refresh().await.expect("initial refresh");
    control
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

#[tokio::test(start_paused = true)]
async fn concurrent_info_requests_share_one_fetch() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;
    let calls = upstream.route(
        &snapshot_path(SYM1_ID),
        vec![Reply::Json(snapshot_body())],
        Duration::from_millis(50),
    );

    let (a, b, c) = tokio::join!(
        control.get_stock_info("SYM1", None),
        control.get_stock_info("sym1", None),
        control.get_stock_info("SYM1", None),
    );

    for result in [a, b, c] {
        let resolved = result.expect("snapshot");
        assert_eq!(resolved.instrument.identifier, SYM1_ID);
        assert_eq!(resolved.data.close, Some(1020.0));
        assert_eq!(resolved.data.percent_change, Some(2.0));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(control.fetcher().in_flight(), 0);
}

#[tokio::test]
async fn later_requests_fetch_fresh_data() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;
    let calls = upstream.route(
        &snapshot_path(SYM1_ID),
        vec![Reply::Json(snapshot_body())],
        Duration::ZERO,
    );

    control.get_stock_info("SYM1", None).await.expect("first");
    control.get_stock_info("SYM1", None).await.expect("second");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn search_ranks_exact_symbol_first() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;

    let outcome = control.search_stock("sym1", Some(5), None).await.expect("search");
    assert!(outcome.hits.len() <= 5);
    assert_eq!(outcome.hits[0].instrument.symbol, "SYM1");
    assert_eq!(
        serde_json::to_value(outcome.hits[0].tier).expect("tier"),
        json!("exact_symbol")
    );
    assert!(outcome.warning.is_none());
}

#[tokio::test]
async fn arabic_spelled_name_resolves() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;

    let outcome = control.search_stock("بانک ملت", None, None).await.expect("search");
    assert_eq!(outcome.hits[0].instrument.identifier, "2001");
}

#[tokio::test]
async fn history_is_restricted_to_range_and_ascending() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;
    upstream.route(
        &history_path(SYM1_ID),
        vec![Reply::Json(json!({ "closingPriceDaily": [
            { "dEven": 20_240_112, "pClosing": 112, "zTotTran": 9 },
            { "dEven": 20_240_103, "pClosing": 103, "zTotTran": 9 },
            { "dEven": 20_231_230, "pClosing": 99, "zTotTran": 9 },
            { "dEven": 20_240_110, "pClosing": 110, "zTotTran": 9 },
            { "dEven": 20_240_101, "pClosing": 101, "zTotTran": 9 },
            { "dEven": 20_240_105, "pClosing": 0, "zTotTran": 0 },
            { "dEven": 20_240_107, "pClosing": "۱۰۷", "zTotTran": "۵" },
        ]}))],
        Duration::ZERO,
    );

    let resolved = control
        .get_stock_history("SYM1", Some(date(2024, 1, 1)), Some(date(2024, 1, 10)), None)
        .await
        .expect("history");

    let dates: Vec<NaiveDate> = resolved.data.points.iter().map(|point| point.date).collect();
    assert_eq!(
        dates,
        vec![
            date(2024, 1, 1),
            date(2024, 1, 3),
            date(2024, 1, 7),
            date(2024, 1, 10)
        ]
    );
    assert_eq!(resolved.data.points[0].jalali_date, "1402/10/11");
    assert!((resolved.data.points[2].close - 107.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn reversed_range_fails_before_any_fetch() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let listing_calls = upstream.route(LISTING, vec![Reply::Json(listing())], Duration::ZERO);
    let history_calls = upstream.route(&history_path(SYM1_ID), vec![Reply::Status(500)], Duration::ZERO);
    let control = MarketControlPlane::from_transport(upstream.clone(), config());

    let err = control
        .get_stock_history("SYM1", Some(date(2024, 2, 1)), Some(date(2024, 1, 1)), None)
        .await
        .expect_err("reversed range");

    assert!(matches!(err, QueryError::InvalidRange { .. }));
    assert_eq!(listing_calls.load(Ordering::SeqCst), 0);
    assert_eq!(history_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversized_range_is_rejected() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config().with_max_history_span_days(30)).await;

    let err = control
        .get_stock_history("SYM1", Some(date(2024, 1, 1)), Some(date(2024, 3, 1)), None)
        .await
        .expect_err("oversized");
    assert_eq!(err.kind(), "invalid_range");
}

#[tokio::test(start_paused = true)]
async fn transient_failures_exhaust_retries() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;
    let calls = upstream.route(
        &snapshot_path(SYM1_ID),
        vec![Reply::Status(503), Reply::Refused, Reply::Status(502)],
        Duration::ZERO,
    );

    let err = control
        .get_stock_info("SYM1", None)
        .await
        .expect_err("exhausted");
    match err {
        QueryError::UpstreamUnavailable { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_then_success_recovers() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;
    let calls = upstream.route(
        &snapshot_path(SYM1_ID),
        vec![Reply::Status(429), Reply::Json(snapshot_body())],
        Duration::ZERO,
    );

    let resolved = control.get_stock_info("SYM1", None).await.expect("recovered");
    assert_eq!(resolved.data.trade_count, Some(311));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn not_found_is_not_retried() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;
    let calls = upstream.route(&snapshot_path(SYM1_ID), vec![Reply::Status(404)], Duration::ZERO);

    let err = control
        .get_stock_info("SYM1", None)
        .await
        .expect_err("missing");
    assert_eq!(err.kind(), "instrument_not_found");
    assert_eq!(err.context()["identifier"], SYM1_ID);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_snapshot_root_is_instrument_not_found() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;
    upstream.route(
        &snapshot_path(SYM1_ID),
        vec![Reply::Json(json!({ "closingPriceInfo": null }))],
        Duration::ZERO,
    );

    let err = control.get_stock_info("SYM1", None).await.expect_err("empty");
    assert_eq!(err.kind(), "instrument_not_found");
}

#[tokio::test]
async fn malformed_snapshot_names_the_field() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;
    upstream.route(
        &snapshot_path(SYM1_ID),
        vec![Reply::Json(json!({ "closingPriceInfo": {
            "dEven": 20_240_110,
            "pDrCotVal": 1_030,
            "priceYesterday": 1_000,
        }}))],
        Duration::ZERO,
    );

    let err = control.get_stock_info("SYM1", None).await.expect_err("malformed");
    assert_eq!(err.kind(), "malformed_data");
    assert_eq!(err.context()["field"], "pClosing");
    assert_eq!(err.context()["identifier"], SYM1_ID);
}

#[tokio::test(start_paused = true)]
async fn deadline_expiry_is_a_timeout() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;
    upstream.route(
        &snapshot_path(SYM1_ID),
        vec![Reply::Json(snapshot_body())],
        Duration::from_secs(5),
    );

    let err = control
        .get_stock_info("SYM1", Some(Duration::from_millis(100)))
        .await
        .expect_err("deadline");
    match err {
        QueryError::Timeout { deadline_ms, .. } => assert_eq!(deadline_ms, 100),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(control.fetcher().in_flight(), 0);
}

#[tokio::test]
async fn ambiguous_symbol_lists_candidates() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;

    let err = control.get_stock_info("DUP", None).await.expect_err("ambiguous");
    match err {
        QueryError::Ambiguous { candidates, .. } => {
            let ids: Vec<&str> = candidates
                .iter()
                .map(|hit| hit.instrument.identifier.as_str())
                .collect();
            assert_eq!(ids, vec!["3001", "3002"]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn unknown_query_is_not_found() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;

    let err = control
        .get_stock_info("qqqqqqqqqq", None)
        .await
        .expect_err("unknown");
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_keeps_catalog_and_warns_once() {
    let upstream = Arc::new(ScriptedUpstream::default());
    upstream.route(
        LISTING,
        vec![Reply::Json(listing()), Reply::Status(500)],
        Duration::ZERO,
    );
    let control = MarketControlPlane::from_transport(upstream.clone(), config());
    control.catalog().refresh().await.expect("first refresh");

    let err = control.catalog().refresh().await.expect_err("second refresh");
    assert_eq!(err.kind(), "upstream_unavailable");

    let first = control.search_stock("sym1", Some(3), None).await.expect("search");
    assert_eq!(first.hits[0].instrument.identifier, SYM1_ID);
    let warning = first.warning.expect("stale warning");
    assert!(warning.reason.contains("HTTP 500"));
    assert!(warning.last_success.is_some());

    let second = control.search_stock("sym1", Some(3), None).await.expect("search");
    assert!(!second.hits.is_empty());
    assert!(second.warning.is_none());

    let status = control.catalog().status().await;
    assert_eq!(status.instruments, 5);
    assert!(status.stale.is_some());
}

#[tokio::test]
async fn delisted_instruments_stay_inactive() {
    let upstream = Arc::new(ScriptedUpstream::default());
    upstream.route(
        LISTING,
        vec![
            Reply::Json(listing()),
            Reply::Json(json!({ "marketwatch": [
                { "insCode": SYM1_ID, "lva": "SYM1", "lvc": "Symbol One" },
            ]})),
        ],
        Duration::ZERO,
    );
    let control = MarketControlPlane::from_transport(upstream.clone(), config());
    control.catalog().refresh().await.expect("first refresh");
    control.catalog().refresh().await.expect("second refresh");

    let retired = control.catalog().lookup("1002").await.expect("kept");
    assert!(!retired.active);
    assert!(control.catalog().lookup(SYM1_ID).await.expect("listed").active);
    let status = control.catalog().status().await;
    assert_eq!((status.instruments, status.active), (5, 1));
}

#[tokio::test]
async fn remote_search_fills_empty_catalog() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let search_calls = upstream.route(
        "/api/Instrument/GetInstrumentSearch/خساپا",
        vec![Reply::Json(json!({ "instrumentSearch": [
            { "insCode": "4001", "lVal18AFC": "خساپا", "lVal30": "سايپا", "flowTitle": "بورس" },
        ]}))],
        Duration::ZERO,
    );
    let control = MarketControlPlane::from_transport(
        upstream.clone(),
        config().with_remote_search_fallback(true),
    );

    let outcome = control.search_stock("خساپا", None, None).await.expect("search");
    assert_eq!(outcome.hits.len(), 1);
    assert_eq!(outcome.hits[0].instrument.identifier, "4001");
    assert_eq!(search_calls.load(Ordering::SeqCst), 1);

    let again = control.search_stock("خساپا", None, None).await.expect("search");
    assert_eq!(again.hits.len(), 1);
    assert_eq!(search_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn zero_limit_is_invalid_input() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;

    let err = control.search_stock("sym", Some(0), None).await.expect_err("limit");
    assert_eq!(err.kind(), "invalid_input");
}

fn search_path(query: &str) -> String {
    format!("/api/Instrument/GetInstrumentSearch/{query}")
}

#[tokio::test(start_paused = true)]
async fn stalled_remote_search_hits_the_deadline() {
    let upstream = Arc::new(ScriptedUpstream::default());
    upstream.route(
        &search_path("فولاد"),
        vec![Reply::Json(json!({ "instrumentSearch": [] }))],
        Duration::from_secs(60),
    );
    let control = MarketControlPlane::from_transport(
        upstream.clone(),
        config()
            .with_remote_search_fallback(true)
            .with_call_timeout(Duration::from_secs(1)),
    );

    let err = control
        .search_stock("فولاد", None, Some(Duration::from_millis(250)))
        .await
        .expect_err("caller deadline");
    assert!(matches!(err, QueryError::Timeout { deadline_ms: 250, .. }), "{err:?}");

    let err = control
        .search_stock("فولاد", None, None)
        .await
        .expect_err("configured deadline");
    assert!(matches!(err, QueryError::Timeout { deadline_ms: 1_000, .. }), "{err:?}");
    assert_eq!(control.fetcher().in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_remote_search_is_reported() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let search_calls = upstream.route(
        &search_path("فولاد"),
        vec![Reply::Status(503)],
        Duration::ZERO,
    );
    let control = MarketControlPlane::from_transport(
        upstream.clone(),
        config().with_remote_search_fallback(true),
    );

    let err = control
        .search_stock("فولاد", None, None)
        .await
        .expect_err("upstream down");
    assert_eq!(err.kind(), "upstream_unavailable");
    assert_eq!(err.context()["attempts"], 3);
    assert_eq!(search_calls.load(Ordering::SeqCst), 3);

    let err = control
        .get_stock_info("فولاد", None)
        .await
        .expect_err("upstream down");
    assert_eq!(err.kind(), "upstream_unavailable");
}

#[tokio::test]
async fn remote_search_without_results_is_empty() {
    let upstream = Arc::new(ScriptedUpstream::default());
    upstream.route(
        &search_path("فولاد"),
        vec![Reply::Json(json!({ "instrumentSearch": null }))],
        Duration::ZERO,
    );
    let control = MarketControlPlane::from_transport(
        upstream.clone(),
        config().with_remote_search_fallback(true),
    );

    let outcome = control
        .search_stock("فولاد", None, None)
        .await
        .expect("search");
    assert!(outcome.hits.is_empty());

    let err = control
        .get_stock_info("ناموجود", None)
        .await
        .expect_err("unknown");
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test(start_paused = true)]
async fn catalog_stays_usable_during_slow_refresh() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;
    upstream.route(
        LISTING,
        vec![Reply::Json(json!({ "marketwatch": [
            { "insCode": SYM1_ID, "lva": "SYM1", "lvc": "Symbol One" },
        ]}))],
        Duration::from_secs(5),
    );

    let catalog = control.catalog().clone();
    let refresh = tokio::spawn(async move { catalog.refresh().await });
    tokio::time::advance(Duration::from_secs(1)).await;

    assert_eq!(control.catalog().all().await.len(), 5);
    let added = control
        .catalog()
        .merge(vec![Instrument::new("9001", "NEW", "Discovered")])
        .await;
    assert_eq!(added, 1);
    assert!(!refresh.is_finished());

    let total = refresh.await.expect("join").expect("refresh");
    assert_eq!(total, 6);
    let discovered = control.catalog().lookup("9001").await.expect("merged instrument kept");
    assert!(!discovered.active);
    assert!(control.catalog().lookup(SYM1_ID).await.expect("listed").active);
}

#[tokio::test(start_paused = true)]
async fn stale_warning_records_the_last_success() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let control = ready(&upstream, config()).await;
    let refreshed_at = control.catalog().status().await.refreshed_at;
    assert!(refreshed_at.is_some());
    upstream.route(LISTING, vec![Reply::Status(503)], Duration::ZERO);

    control.catalog().refresh().await.expect_err("refresh");

    let stale = control.catalog().status().await.stale.expect("stale");
    assert_eq!(stale.last_success, refreshed_at);
    assert!(stale.reason.contains("HTTP 503"));
}

#[tokio::test(start_paused = true)]
async fn configured_refresher_reloads_the_listing() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let listing_calls = upstream.route(LISTING, vec![Reply::Json(listing())], Duration::ZERO);
    let control = MarketControlPlane::from_transport(
        upstream.clone(),
        config().with_refresh_interval(Some(Duration::from_secs(3_600))),
    );

    let refresher = control.spawn_catalog_refresher().expect("refresher enabled");
    tokio::time::sleep(Duration::from_secs(3_601)).await;
    assert_eq!(listing_calls.load(Ordering::SeqCst), 1);
    assert_eq!(control.catalog().all().await.len(), 5);
    refresher.abort();

    let disabled = MarketControlPlane::from_transport(
        upstream.clone(),
        config().with_refresh_interval(None),
    );
    assert!(disabled.spawn_catalog_refresher().is_none());
}
