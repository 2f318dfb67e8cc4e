// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_gauge, gauge, increment_counter, Unit};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {
    Count,
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $(let _ = &$label_value;)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$value;
        $(let _ = &$label_value;)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        $(let _ = &$label_value;)*
    }};
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
use crate::{counter, describe_counter, describe_gauge, gauge, increment_counter};

/// Registers descriptions for every metric the pipeline emits.
/// Call once at startup, after installing an exporter.
pub fn describe_metrics() {
    describe_counter!(
        "xchain_fetch_total",
        Unit::Count,
        "Remote fetches resolved, labeled by query (balance, staking) and provenance (confirmed, defaulted)."
    );
    describe_counter!(
        "xchain_fetch_defaulted_total",
        Unit::Count,
        "Remote fetches that fell back to the default value, labeled by query and failure kind."
    );
    describe_counter!(
        "xchain_batches_committed_total",
        Unit::Count,
        "Batches durably appended to the result sink."
    );
    describe_gauge!(
        "xchain_records_processed",
        "Enrichment records written so far in the current run."
    );
}

pub fn record_fetch(query: &'static str, provenance: &'static str) {
    increment_counter!("xchain_fetch_total", "query" => query, "provenance" => provenance);
}

pub fn record_fetch_defaulted(query: &'static str, kind: &'static str) {
    increment_counter!("xchain_fetch_defaulted_total", "query" => query, "kind" => kind);
}

pub fn record_batch_committed(records_processed: usize) {
    counter!("xchain_batches_committed_total", 1);
    gauge!("xchain_records_processed", records_processed as f64);
}
