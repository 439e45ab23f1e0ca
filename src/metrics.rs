//! Metric helpers for `wirechain`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking connections held by connection managers.
pub const CONNECTIONS_MANAGED: &str = "wirechain_connections_managed";
/// Name of the counter tracking messages entering or leaving a pipeline.
pub const FRAMES_PROCESSED: &str = "wirechain_frames_processed_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "wirechain_errors_total";
/// Name of the counter tracking idle connections dropped under load.
pub const IDLE_DROPS_TOTAL: &str = "wirechain_idle_drops_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Messages read from the transport.
    Inbound,
    /// Buffers handed to the transport.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the managed connections gauge.
#[cfg(feature = "metrics")]
pub fn inc_connections() { gauge!(CONNECTIONS_MANAGED).increment(1.0); }

/// Decrement the managed connections gauge.
#[cfg(feature = "metrics")]
pub fn dec_connections() { gauge!(CONNECTIONS_MANAGED).decrement(1.0); }

/// Record a processed frame for the given direction.
#[cfg(feature = "metrics")]
pub fn inc_frames(direction: Direction) {
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
}

/// Record an error occurrence.
#[cfg(feature = "metrics")]
pub fn inc_errors() { counter!(ERRORS_TOTAL).increment(1); }

/// Record `count` idle connections dropped early.
#[cfg(feature = "metrics")]
pub fn inc_idle_drops(count: usize) {
    counter!(IDLE_DROPS_TOTAL).increment(u64::try_from(count).unwrap_or(u64::MAX));
}

#[cfg(not(feature = "metrics"))]
pub fn inc_connections() {}

#[cfg(not(feature = "metrics"))]
pub fn dec_connections() {}

#[cfg(not(feature = "metrics"))]
pub fn inc_frames(_direction: Direction) {}

#[cfg(not(feature = "metrics"))]
pub fn inc_errors() {}

#[cfg(not(feature = "metrics"))]
pub fn inc_idle_drops(_count: usize) {}
