use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

pub struct Metrics {
    request_counter: IntCounterVec,
    prediction_duration: HistogramVec,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let request_counter = IntCounterVec::new(
            Opts::new("requests_total", "Total number of requests"),
            &["route"],
        )?;

        // CPU inference on a 640 input sits in the hundreds of milliseconds
        let boundaries = latency_buckets(&[(10, 100, 10), (100, 1000, 50), (1000, 5000, 500)]);

        let prediction_duration = HistogramVec::new(
            HistogramOpts::new(
                "prediction_duration_ms",
                "Duration of detect and annotate operations in milliseconds",
            )
            .buckets(boundaries),
            &["route"],
        )?;

        registry.register(Box::new(request_counter.clone()))?;
        registry.register(Box::new(prediction_duration.clone()))?;

        Ok(Metrics {
            request_counter,
            prediction_duration,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        self.request_counter.with_label_values(&[route]).inc();
    }

    pub fn record_prediction_duration(&self, duration_ms: u64, route: &str) {
        self.prediction_duration
            .with_label_values(&[route])
            .observe(duration_ms as f64);
    }
}

/// Concatenates `(start, end, step)` ranges into sorted, de-duplicated
/// histogram boundaries. A range stops at or before `end`.
fn latency_buckets(ranges: &[(u32, u32, usize)]) -> Vec<f64> {
    let mut bounds: Vec<u32> = ranges
        .iter()
        .flat_map(|&(start, end, step)| (start..=end).step_by(step.max(1)))
        .collect();
    bounds.sort_unstable();
    bounds.dedup();
    bounds.into_iter().map(f64::from).collect()
}
