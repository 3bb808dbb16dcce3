use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Registry, TextEncoder};
use lazy_static::lazy_static;
use std::sync::OnceLock;
use std::time::Duration;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}
static REQ_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static TARGET_SWITCHES: OnceLock<IntCounterVec> = OnceLock::new();
static RESET_BATCHES: OnceLock<IntCounter> = OnceLock::new();
static STAGE_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Registers every metric. Safe to call more than once; recording before
/// initialization is a no-op.
pub fn init_metrics() {
    if let Ok(counter) = IntCounterVec::new(
        prometheus::opts!("requests_total", "Total requests per route"),
        &["route", "status"],
    ) {
        register(&REQ_COUNTER, counter);
    }

    if let Ok(counter) = IntCounterVec::new(
        prometheus::opts!("target_switches_total", "Completed datastore target switches"),
        &["target"],
    ) {
        register(&TARGET_SWITCHES, counter);
    }

    if let Ok(counter) = IntCounter::new("reset_batches_total", "Delete batches issued by workspace resets") {
        register(&RESET_BATCHES, counter);
    }

    if let Ok(histogram) = HistogramVec::new(
        HistogramOpts::new("pipeline_stage_seconds", "Latency of query pipeline stages"),
        &["stage"],
    ) {
        register(&STAGE_LATENCY, histogram);
    }
}

fn register<M>(slot: &OnceLock<M>, metric: M)
where
    M: prometheus::core::Collector + Clone + 'static,
{
    if slot.set(metric.clone()).is_ok() {
        REGISTRY.register(Box::new(metric)).ok();
    }
}

pub fn inc_request(route: &str, status: &str) {
    if let Some(counter) = REQ_COUNTER.get() {
        counter.with_label_values(&[route, status]).inc();
    }
}

pub fn inc_target_switch(target: &str) {
    if let Some(counter) = TARGET_SWITCHES.get() {
        counter.with_label_values(&[target]).inc();
    }
}

pub fn inc_reset_batch() {
    if let Some(counter) = RESET_BATCHES.get() {
        counter.inc();
    }
}

pub fn observe_stage(stage: &str, elapsed: Duration) {
    if let Some(histogram) = STAGE_LATENCY.get() {
        histogram.with_label_values(&[stage]).observe(elapsed.as_secs_f64());
    }
}

/// Prometheus text exposition of everything registered.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
