//! Metrics collection.
//!
//! # Metrics
//! - `h2mux_connections_opened_total` (counter): connections started, by route
//! - `h2mux_connections_closed_total` (counter): connections torn down, by route
//! - `h2mux_connect_failures_total` (counter): failed establishments, by route
//! - `h2mux_streams_opened_total` (counter): streams created, by route
//! - `h2mux_streams_closed_total` (counter): streams removed, by route, reason
//! - `h2mux_push_promises_total` (counter): push offers, by route, outcome
//! - `h2mux_idle_timeouts_total` (counter): request idle timeouts, by route
//! - `h2mux_pool_waiters` (gauge): queued waiters, by route
//!
//! # Design Decisions
//! - Only the `metrics` facade; installing a recorder is up to the embedder
//! - Labels for route and outcome

pub fn record_connection_opened(route: &str) {
    metrics::counter!("h2mux_connections_opened_total", "route" => route.to_string()).increment(1);
}

pub fn record_connection_closed(route: &str) {
    metrics::counter!("h2mux_connections_closed_total", "route" => route.to_string()).increment(1);
}

pub fn record_connect_failure(route: &str) {
    metrics::counter!("h2mux_connect_failures_total", "route" => route.to_string()).increment(1);
}

pub fn record_stream_opened(route: &str) {
    metrics::counter!("h2mux_streams_opened_total", "route" => route.to_string()).increment(1);
}

pub fn record_stream_closed(route: &str, reason: &'static str) {
    metrics::counter!(
        "h2mux_streams_closed_total",
        "route" => route.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_push(route: &str, accepted: bool) {
    let outcome = if accepted { "accepted" } else { "rejected" };
    metrics::counter!(
        "h2mux_push_promises_total",
        "route" => route.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_timeout(route: &str) {
    metrics::counter!("h2mux_idle_timeouts_total", "route" => route.to_string()).increment(1);
}

pub fn record_waiters(route: &str, count: usize) {
    metrics::gauge!("h2mux_pool_waiters", "route" => route.to_string()).set(count as f64);
}
