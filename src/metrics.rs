//! Prometheus metrics collection for echohub.
//!
//! - `echohub_messages_sent_total` - Chat messages persisted and fanned out
//! - `echohub_broadcast_failures_total{adapter}` - Per-adapter delivery failures
//! - `echohub_irc_command_total{command}` - IRC commands processed by type
//! - `echohub_irc_command_errors_total{command,error}` - IRC command errors
//! - `echohub_irc_connections` / `echohub_hub_connections` - Live connections
//! - `echohub_message_fanout` - IRC recipients per channel message

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

pub static MESSAGES_SENT: OnceLock<IntCounter> = OnceLock::new();

pub static BROADCAST_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

pub static COMMAND_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

pub static COMMAND_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges
// ========================================================================

pub static IRC_CONNECTIONS: OnceLock<IntGauge> = OnceLock::new();

pub static HUB_CONNECTIONS: OnceLock<IntGauge> = OnceLock::new();

/// Recipients per channel message on IRC.
pub static MESSAGE_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Recording helpers are no-ops until this has run.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(MESSAGES_SENT, IntCounter::new("echohub_messages_sent_total", "Chat messages sent"));
    register!(BROADCAST_FAILURES, IntCounterVec::new(Opts::new("echohub_broadcast_failures_total", "Broadcaster delivery failures"), &["adapter"]));
    register!(COMMAND_COUNTER, IntCounterVec::new(Opts::new("echohub_irc_command_total", "IRC commands processed by type"), &["command"]));
    register!(COMMAND_ERRORS, IntCounterVec::new(Opts::new("echohub_irc_command_errors_total", "IRC command errors by type"), &["command", "error"]));
    register!(IRC_CONNECTIONS, IntGauge::new("echohub_irc_connections", "Live IRC connections"));
    register!(HUB_CONNECTIONS, IntGauge::new("echohub_hub_connections", "Live hub connections"));
    register!(MESSAGE_FANOUT, Histogram::with_opts(
        HistogramOpts::new("echohub_message_fanout", "IRC recipients per channel message")
            .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
        String::new()
    })
}

// ============================================================================
// Recording helpers
// ============================================================================

#[inline]
pub fn record_message_sent() {
    if let Some(c) = MESSAGES_SENT.get() {
        c.inc();
    }
}

#[inline]
pub fn record_broadcast_failure(adapter: &str) {
    if let Some(c) = BROADCAST_FAILURES.get() {
        c.with_label_values(&[adapter]).inc();
    }
}

#[inline]
pub fn record_command(command: &str) {
    if let Some(c) = COMMAND_COUNTER.get() {
        c.with_label_values(&[command]).inc();
    }
}

#[inline]
pub fn record_command_error(command: &str, error: &str) {
    if let Some(c) = COMMAND_ERRORS.get() {
        c.with_label_values(&[command, error]).inc();
    }
}

#[inline]
pub fn irc_connection_opened() {
    if let Some(g) = IRC_CONNECTIONS.get() {
        g.inc();
    }
}

#[inline]
pub fn irc_connection_closed() {
    if let Some(g) = IRC_CONNECTIONS.get() {
        g.dec();
    }
}

#[inline]
pub fn hub_connection_opened() {
    if let Some(g) = HUB_CONNECTIONS.get() {
        g.inc();
    }
}

#[inline]
pub fn hub_connection_closed() {
    if let Some(g) = HUB_CONNECTIONS.get() {
        g.dec();
    }
}

#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = MESSAGE_FANOUT.get() {
        h.observe(recipients as f64);
    }
}
