// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter, Unit,
};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[allow(unused_imports)]
use crate::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter,
};

/// Initializes the descriptions for all the metrics in the application.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "pokedex_fetch_attempts_total",
        Unit::Count,
        "Upstream HTTP attempts, labeled by resource kind."
    );
    describe_counter!(
        "pokedex_fetch_retries_total",
        Unit::Count,
        "Retries issued after a retriable upstream failure."
    );
    describe_counter!(
        "pokedex_fetch_failures_total",
        Unit::Count,
        "Upstream fetches that failed after exhausting the retry budget, labeled by error kind."
    );
    describe_histogram!(
        "pokedex_fetch_duration_ms",
        "Wall time of a fetch including retries, in milliseconds."
    );
    describe_counter!(
        "pokedex_cache_hits_total",
        Unit::Count,
        "Cache hits, labeled by cache name."
    );
    describe_counter!(
        "pokedex_cache_misses_total",
        Unit::Count,
        "Cache misses, labeled by cache name."
    );
    describe_gauge!("pokedex_cache_size", "Entries held per cache.");
    describe_histogram!(
        "pokedex_aggregation_duration_ms",
        "Duration of an aggregation run in milliseconds, labeled by pipeline."
    );
    describe_counter!(
        "pokedex_aggregation_items_total",
        Unit::Count,
        "Records upserted by aggregation runs, labeled by pipeline."
    );
    describe_counter!(
        "pokedex_aggregation_failures_total",
        Unit::Count,
        "Sub-fetches skipped inside an aggregation run, labeled by pipeline."
    );
    describe_counter!(
        "pokedex_backfills_spawned_total",
        Unit::Count,
        "Background backfills started by the query layer."
    );
    describe_counter!(
        "pokedex_query_requests_total",
        Unit::Count,
        "List queries served, labeled by the index path used."
    );
}

/// Serves `/metrics` on `addr` and registers every description.
#[cfg(feature = "observability")]
pub fn install_prometheus_exporter(addr: std::net::SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}

/// JSON-formatted `tracing` spans next to the `log` output.
#[cfg(feature = "observability")]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().json().try_init();
}

pub fn record_fetch_attempt(resource: &str) {
    counter!("pokedex_fetch_attempts_total", 1, "resource" => resource.to_string());
}

pub fn increment_fetch_retry(resource: &str) {
    counter!("pokedex_fetch_retries_total", 1, "resource" => resource.to_string());
}

pub fn increment_fetch_failure(kind: &'static str) {
    counter!("pokedex_fetch_failures_total", 1, "kind" => kind);
}

pub fn record_fetch_duration(resource: &str, duration: std::time::Duration) {
    histogram!(
        "pokedex_fetch_duration_ms",
        duration.as_secs_f64() * 1000.0,
        "resource" => resource.to_string()
    );
}

pub fn increment_cache_hit(cache_name: &str) {
    counter!("pokedex_cache_hits_total", 1, "cache" => cache_name.to_string());
}

pub fn increment_cache_miss(cache_name: &str) {
    counter!("pokedex_cache_misses_total", 1, "cache" => cache_name.to_string());
}

pub fn set_cache_size(cache_name: &str, size: f64) {
    gauge!("pokedex_cache_size", size, "cache" => cache_name.to_string());
}

pub fn record_aggregation(pipeline: &'static str, duration: std::time::Duration, items: u64) {
    histogram!(
        "pokedex_aggregation_duration_ms",
        duration.as_secs_f64() * 1000.0,
        "pipeline" => pipeline
    );
    counter!("pokedex_aggregation_items_total", items, "pipeline" => pipeline);
}

pub fn increment_aggregation_failure(pipeline: &'static str) {
    counter!("pokedex_aggregation_failures_total", 1, "pipeline" => pipeline);
}

pub fn increment_backfill_spawned() {
    increment_counter!("pokedex_backfills_spawned_total");
}

pub fn increment_query(index_path: &'static str) {
    counter!("pokedex_query_requests_total", 1, "index" => index_path);
}
