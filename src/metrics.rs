// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for widget-engine.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `widget_engine_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `status`: success, error
//! - `operation`: create, update

use std::time::Duration;

use metrics::{counter, histogram};

/// Record the outcome of a sync with the backend.
pub fn record_sync(status: &str, duration: Duration) {
    counter!(
        "widget_engine_sync_total",
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "widget_engine_sync_seconds",
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record surveys removed by the eligibility filter during one sync.
pub fn record_surveys_filtered(dropped: usize) {
    counter!("widget_engine_surveys_filtered_total").increment(dropped as u64);
}

/// Record a successfully created display (impression).
pub fn record_display_created() {
    counter!("widget_engine_displays_created_total").increment(1);
}

/// Record one response delivery attempt.
pub fn record_delivery(operation: &str, status: &str) {
    counter!(
        "widget_engine_response_deliveries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a delivery halt after the retry budget was exhausted.
pub fn record_delivery_halted() {
    counter!("widget_engine_deliveries_halted_total").increment(1);
}
