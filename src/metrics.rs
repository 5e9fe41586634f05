//! Prometheus metrics for the webhook

use crate::error::{Error, Result};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Admission counters and latencies, kept in their own registry
pub struct AdmissionMetrics {
    registry: Registry,
    reviews: IntCounterVec,
    duration: HistogramVec,
}

impl AdmissionMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let reviews = IntCounterVec::new(
            Opts::new(
                "sriov_admission_reviews_total",
                "Admission reviews handled, by webhook, kind and verdict",
            ),
            &["webhook", "kind", "allowed"],
        )
        .map_err(metrics_error)?;

        let duration = HistogramVec::new(
            HistogramOpts::new(
                "sriov_admission_review_duration_seconds",
                "Time spent deciding an admission review",
            ),
            &["webhook", "kind"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(reviews.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(duration.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            reviews,
            duration,
        })
    }

    /// Record one review
    pub fn observe(&self, webhook: &str, kind: &str, allowed: bool, seconds: f64) {
        let allowed = if allowed { "true" } else { "false" };
        self.reviews
            .with_label_values(&[webhook, kind, allowed])
            .inc();
        self.duration
            .with_label_values(&[webhook, kind])
            .observe(seconds);
    }

    /// Render all metrics in the text exposition format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics are not UTF-8: {}", e)))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_and_encode() {
        let metrics = AdmissionMetrics::new().unwrap();
        metrics.observe("validating", "SriovNetworkNodePolicy", false, 0.01);
        metrics.observe("validating", "SriovNetworkNodePolicy", true, 0.02);

        let text = metrics.encode().unwrap();
        assert!(text.contains("sriov_admission_reviews_total"));
        assert!(text.contains("allowed=\"false\""));
        assert!(text.contains("sriov_admission_review_duration_seconds_count"));
    }
}
