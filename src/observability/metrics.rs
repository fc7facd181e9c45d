//! Metrics collection.
//!
//! # Metrics
//! - `dispatch_requests_written_total` (counter)
//! - `dispatch_requests_dropped_total` (counter, `reason` = aborted | rejected)
//! - `dispatch_requests_failed_total` (counter)
//! - `dispatch_servername_rotations_total` (counter)
//! - `dispatch_drain_total` (counter)
//!
//! No exporter is installed here; without a recorder these calls are no-ops.

use crate::dispatch::DropReason;

pub fn record_written() {
    metrics::counter!("dispatch_requests_written_total").increment(1);
}

pub fn record_dropped(reason: DropReason) {
    metrics::counter!("dispatch_requests_dropped_total", "reason" => reason.as_str()).increment(1);
}

pub fn record_failed() {
    metrics::counter!("dispatch_requests_failed_total").increment(1);
}

pub fn record_servername_rotation() {
    metrics::counter!("dispatch_servername_rotations_total").increment(1);
}

pub fn record_drain() {
    metrics::counter!("dispatch_drain_total").increment(1);
}
