// Prometheus metrics definitions for the ladder backend.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Counters ─────────────────────────────────────────────────────

    /// Matches committed to the ledger.
    pub static ref MATCHES_RECORDED_TOTAL: IntCounter = IntCounter::new(
        "ladder_matches_recorded_total",
        "Matches committed to the ledger",
    )
    .unwrap();

    /// Rejected or failed match submissions, by reason.
    pub static ref MATCH_RECORD_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ladder_match_record_failures_total", "Match submissions that were not recorded"),
        &["reason"],
    )
    .unwrap();

    pub static ref PLAYERS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "ladder_players_created_total",
        "Players added to the directory",
    )
    .unwrap();

    /// Period leaderboard computations, by kind (weekly, monthly, range).
    pub static ref LEADERBOARD_QUERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ladder_leaderboard_queries_total", "Leaderboard computations"),
        &["kind"],
    )
    .unwrap();

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ladder_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "ladder_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["endpoint"],
    )
    .unwrap();
}

static REGISTER: Once = Once::new();

/// Register all metrics with the custom registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(MATCHES_RECORDED_TOTAL.clone()),
            Box::new(MATCH_RECORD_FAILURES_TOTAL.clone()),
            Box::new(PLAYERS_CREATED_TOTAL.clone()),
            Box::new(LEADERBOARD_QUERIES_TOTAL.clone()),
            Box::new(API_REQUESTS_TOTAL.clone()),
            Box::new(API_REQUEST_DURATION_SECONDS.clone()),
        ];

        for c in collectors {
            if let Err(e) = REGISTRY.register(c) {
                tracing::warn!("Failed to register metric: {e}");
            }
        }
    });
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Normalize a URL path for metric labels: replace numeric path segments with `:id`
/// to prevent cardinality explosion.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.parse::<i64>().is_ok() {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
