//! Prometheus metrics for the pipeline.
//!
//! Each [`Warden`](crate::Warden) owns its registry; no process
//! globals, so construction and teardown stay explicit and tests get
//! isolated counters for free. [`PipelineMetrics::render`] produces the
//! text exposition format for whatever scrape surface the embedding
//! application exposes.

use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;
use warden_contracts::Verdict;

use crate::WardenError;

/// Metric bundle owned by one pipeline instance.
pub struct PipelineMetrics {
    registry: Registry,
    verdicts_total: CounterVec,
    tier_total: CounterVec,
    class_total: CounterVec,
    cache_requests: IntCounter,
    cache_hits: IntCounter,
    stage_duration: HistogramVec,
    total_duration: Histogram,
    timeouts_total: CounterVec,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self, WardenError> {
        let registry = Registry::new();
        let err = |e: prometheus::Error| WardenError::Metrics(e.to_string());

        let verdicts_total = CounterVec::new(
            Opts::new("warden_verdicts_total", "Verdicts by action"),
            &["action"],
        )
        .map_err(err)?;
        registry.register(Box::new(verdicts_total.clone())).map_err(err)?;

        let tier_total = CounterVec::new(
            Opts::new("warden_tier_total", "Verdicts by terminating tier"),
            &["tier"],
        )
        .map_err(err)?;
        registry.register(Box::new(tier_total.clone())).map_err(err)?;

        let class_total = CounterVec::new(
            Opts::new("warden_class_total", "Verdicts by failure class"),
            &["class"],
        )
        .map_err(err)?;
        registry.register(Box::new(class_total.clone())).map_err(err)?;

        let cache_requests =
            IntCounter::new("warden_cache_requests_total", "Decision-cache lookups").map_err(err)?;
        registry.register(Box::new(cache_requests.clone())).map_err(err)?;

        let cache_hits =
            IntCounter::new("warden_cache_hits_total", "Decision-cache hits").map_err(err)?;
        registry.register(Box::new(cache_hits.clone())).map_err(err)?;

        let stage_duration = HistogramVec::new(
            HistogramOpts::new("warden_stage_duration_seconds", "Per-stage latency"),
            &["stage"],
        )
        .map_err(err)?;
        registry.register(Box::new(stage_duration.clone())).map_err(err)?;

        let total_duration = Histogram::with_opts(HistogramOpts::new(
            "warden_pipeline_duration_seconds",
            "End-to-end evaluation latency",
        ))
        .map_err(err)?;
        registry.register(Box::new(total_duration.clone())).map_err(err)?;

        let timeouts_total = CounterVec::new(
            Opts::new("warden_timeouts_total", "Stage timeouts"),
            &["stage"],
        )
        .map_err(err)?;
        registry.register(Box::new(timeouts_total.clone())).map_err(err)?;

        Ok(Self {
            registry,
            verdicts_total,
            tier_total,
            class_total,
            cache_requests,
            cache_hits,
            stage_duration,
            total_duration,
            timeouts_total,
        })
    }

    /// Records one emitted verdict.
    pub fn observe_verdict(&self, verdict: &Verdict) {
        if let Ok(c) = self
            .verdicts_total
            .get_metric_with_label_values(&[verdict.action.as_str()])
        {
            c.inc();
        }
        if let Ok(c) = self
            .tier_total
            .get_metric_with_label_values(&[&verdict.tier_used.to_string()])
        {
            c.inc();
        }
        if let Ok(c) = self
            .class_total
            .get_metric_with_label_values(&[verdict.failure_class.as_str()])
        {
            c.inc();
        }
        self.total_duration
            .observe(verdict.processing_time_ms / 1000.0);
    }

    /// Records one stage's wall-clock cost.
    pub fn observe_stage(&self, stage: &str, elapsed: Duration) {
        if let Ok(h) = self.stage_duration.get_metric_with_label_values(&[stage]) {
            h.observe(elapsed.as_secs_f64());
        }
    }

    /// Records a decision-cache lookup.
    pub fn observe_cache(&self, hit: bool) {
        self.cache_requests.inc();
        if hit {
            self.cache_hits.inc();
        }
    }

    /// Records a stage timeout.
    pub fn observe_timeout(&self, stage: &str) {
        if let Ok(c) = self.timeouts_total.get_metric_with_label_values(&[stage]) {
            c.inc();
        }
    }

    /// Cache hit ratio in `[0, 1]`; 0 before any lookup.
    pub fn cache_hit_ratio(&self) -> f64 {
        let requests = self.cache_requests.get();
        if requests == 0 {
            return 0.0;
        }
        self.cache_hits.get() as f64 / requests as f64
    }

    /// Renders every metric in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        if TextEncoder::new().encode(&families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
