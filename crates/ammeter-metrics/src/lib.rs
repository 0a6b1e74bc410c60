//! Metrics infrastructure for the ammeter logger.
//!
//! This crate declares every metric the logger emits as a structured
//! [`Metric`] constant, so names are not retyped at call sites. It re-exports
//! the `metrics` crate; without an installed recorder all emissions are no-ops.
//!
//! # Example
//!
//! ```rust
//! use ammeter_metrics::{metric_defs, Metric, MetricKind};
//! use metrics::Unit;
//!
//! const MY_COUNTER: Metric = Metric::counter("ammeter.my_counter")
//!     .with_description("A counter metric")
//!     .with_unit(Unit::Count);
//!
//! assert_eq!(MY_COUNTER.kind, MetricKind::Counter);
//! metrics::counter!(metric_defs::RECORDS_RECEIVED.name, "kind" => "DATA").increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

/// A metric declaration with its metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "ammeter.records.received").
    pub name: &'static str,
    /// The kind of metric (counter, gauge, histogram).
    pub kind: MetricKind,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
        }
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
        }
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Registers this metric's description with the metrics recorder.
    ///
    /// This should be called once at startup for each metric.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the logger.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Receive Path
    // ========================================================================

    /// Records parsed and applied to the session state.
    ///
    /// Labels: kind
    pub const RECORDS_RECEIVED: Metric = Metric::counter("ammeter.records.received")
        .with_description("Records parsed and applied, by record kind")
        .with_unit(Unit::Count);

    /// Lines discarded by the receive loop.
    ///
    /// Labels: reason (malformed, unrecognized, framing)
    pub const RECORDS_DROPPED: Metric = Metric::counter("ammeter.records.dropped")
        .with_description("Lines discarded by the receive loop, by reason")
        .with_unit(Unit::Count);

    /// Bytes read from the transport.
    pub const BYTES_RECEIVED: Metric = Metric::counter("ammeter.transport.rx_bytes")
        .with_description("Bytes read from the transport")
        .with_unit(Unit::Bytes);

    /// Readings held for the current sampling window.
    pub const WINDOW_READINGS: Metric = Metric::gauge("ammeter.window.readings")
        .with_description("Readings accumulated in the current sampling window")
        .with_unit(Unit::Count);

    // ========================================================================
    // Command Path
    // ========================================================================

    /// Commands written to the device.
    ///
    /// Labels: command
    pub const COMMANDS_SENT: Metric = Metric::counter("ammeter.commands.sent")
        .with_description("Commands written to the device")
        .with_unit(Unit::Count);

    /// Commands whose expected state update never arrived.
    ///
    /// Labels: command
    pub const COMMAND_TIMEOUTS: Metric = Metric::counter("ammeter.commands.timeouts")
        .with_description("Commands that received no response before their deadline")
        .with_unit(Unit::Count);

    /// Time from writing a query to observing its answer.
    ///
    /// Labels: command
    pub const COMMAND_LATENCY: Metric = Metric::histogram("ammeter.commands.latency_ms")
        .with_description("Time from writing a command to observing its answer")
        .with_unit(Unit::Milliseconds);

    /// Every metric, for bulk description.
    pub const ALL: &[&Metric] = &[
        &RECORDS_RECEIVED,
        &RECORDS_DROPPED,
        &BYTES_RECEIVED,
        &WINDOW_READINGS,
        &COMMANDS_SENT,
        &COMMAND_TIMEOUTS,
        &COMMAND_LATENCY,
    ];
}

/// Describes all metrics used by the logger.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::RECORDS_RECEIVED.name, "ammeter.records.received");
        assert_eq!(metric_defs::RECORDS_RECEIVED.kind, MetricKind::Counter);
        assert_eq!(metric_defs::RECORDS_RECEIVED.unit, Some(Unit::Count));

        assert_eq!(metric_defs::WINDOW_READINGS.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::COMMAND_LATENCY.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::COMMAND_LATENCY.unit, Some(Unit::Milliseconds));
    }

    #[test]
    fn test_all_metrics_unique() {
        let mut names: Vec<&str> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_metric_minimal() {
        const MINIMAL: Metric = Metric::counter("minimal");

        assert_eq!(MINIMAL.name, "minimal");
        assert_eq!(MINIMAL.kind, MetricKind::Counter);
        assert_eq!(MINIMAL.description, "");
        assert_eq!(MINIMAL.unit, None);
    }

    #[test]
    fn test_describe_without_recorder() {
        // No recorder installed: must be a silent no-op.
        describe_metrics();
    }
}
