//! Lightweight runtime metrics.
//!
//! Counters and gauges are kept in-process and surfaced through
//! tracing on flush. Heavier exporters can subscribe to the event bus
//! instead; this module only covers what the runtime itself needs to
//! answer "what happened" after a bootstrap.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, info};

use crate::config::TelemetryConfig;
use crate::types::{ComponentId, RuntimeMode};

#[derive(Debug, Default)]
struct MetricsCollector {
    counters: HashMap<String, u64>,
    gauges: HashMap<String, f64>,
}

impl MetricsCollector {
    fn increment(&mut self, name: &str) {
        *self.counters.entry(name.to_string()).or_insert(0) += 1;
    }

    fn gauge(&mut self, name: &str, value: f64) {
        self.gauges.insert(name.to_string(), value);
    }
}

pub struct RuntimeTelemetry {
    config: TelemetryConfig,
    metrics: RwLock<MetricsCollector>,
}

impl RuntimeTelemetry {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            metrics: RwLock::new(MetricsCollector::default()),
        }
    }

    fn enabled(&self) -> bool {
        self.config.enabled && self.config.metrics_enabled
    }

    pub fn event_published(&self, event_type: &str) {
        if !self.enabled() {
            return;
        }
        let mut metrics = self.metrics.write().unwrap();
        metrics.increment("events.published");
        if self.config.detailed_metrics {
            metrics.increment(&format!("events.published.{event_type}"));
        }
    }

    pub fn component_activated(&self, component: &ComponentId) {
        if !self.enabled() {
            return;
        }
        let mut metrics = self.metrics.write().unwrap();
        metrics.increment("components.activated");
        metrics.increment(&format!("components.activated.{component}"));
    }

    pub fn breaker_transition(&self, name: &str, state: &str) {
        if !self.enabled() {
            return;
        }
        let mut metrics = self.metrics.write().unwrap();
        metrics.increment("breaker.transitions");
        metrics.increment(&format!("breaker.{name}.to_{state}"));
    }

    pub fn retry_attempted(&self, name: &str) {
        if !self.enabled() {
            return;
        }
        let mut metrics = self.metrics.write().unwrap();
        metrics.increment("retries.attempted");
        if self.config.detailed_metrics {
            metrics.increment(&format!("retries.attempted.{name}"));
        }
    }

    pub fn bulkhead_rejected(&self, name: &str) {
        if !self.enabled() {
            return;
        }
        let mut metrics = self.metrics.write().unwrap();
        metrics.increment("bulkhead.rejected");
        if self.config.detailed_metrics {
            metrics.increment(&format!("bulkhead.rejected.{name}"));
        }
    }

    pub fn bootstrap_completed(&self, mode: RuntimeMode) {
        if !self.enabled() {
            return;
        }
        let mut metrics = self.metrics.write().unwrap();
        metrics.increment("bootstrap.completed");
        metrics.gauge("bootstrap.mode_full", matches!(mode, RuntimeMode::Full) as u8 as f64);
    }

    /// Current value of a counter, zero if never incremented.
    pub fn counter(&self, name: &str) -> u64 {
        let metrics = self.metrics.read().unwrap();
        metrics.counters.get(name).copied().unwrap_or(0)
    }

    /// Log accumulated counters. Called during shutdown.
    pub async fn flush(&self) {
        if !self.config.enabled {
            return;
        }
        let metrics = self.metrics.read().unwrap();
        info!(counters = metrics.counters.len(), "flushing telemetry");
        for (name, value) in &metrics.counters {
            debug!(counter = %name, value, "telemetry counter");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let telemetry = RuntimeTelemetry::new(TelemetryConfig::default());
        telemetry.event_published("a");
        telemetry.event_published("b");
        telemetry.component_activated(&ComponentId::new("AE1"));

        assert_eq!(telemetry.counter("events.published"), 2);
        assert_eq!(telemetry.counter("components.activated"), 1);
        assert_eq!(telemetry.counter("components.activated.AE1"), 1);
    }

    #[test]
    fn disabled_telemetry_records_nothing() {
        let telemetry = RuntimeTelemetry::new(TelemetryConfig {
            enabled: false,
            ..TelemetryConfig::default()
        });
        telemetry.event_published("a");
        assert_eq!(telemetry.counter("events.published"), 0);
    }

    #[test]
    fn detailed_metrics_gate_per_type_counters() {
        let plain = RuntimeTelemetry::new(TelemetryConfig::default());
        plain.event_published("tick");
        assert_eq!(plain.counter("events.published.tick"), 0);

        let detailed = RuntimeTelemetry::new(TelemetryConfig {
            detailed_metrics: true,
            ..TelemetryConfig::default()
        });
        detailed.event_published("tick");
        assert_eq!(detailed.counter("events.published.tick"), 1);
    }
}
