use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

// ============================================================================
// Metrics Module - Prometheus metrics for the event store
// ============================================================================
//
// Provides metrics for:
// - Push outcomes (success, concurrency conflict, unique violation, failure)
// - Events appended
// - Filter and push latency
//
// Recorded by MeteredEventStore; render() produces the text exposition
// format for scraping or logging.
// ============================================================================

/// Push outcome label values
pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_CONFLICT: &str = "conflict";
pub const OUTCOME_ALREADY_EXISTS: &str = "already_exists";
pub const OUTCOME_ERROR: &str = "error";

/// Central metrics registry of the engine
pub struct Metrics {
    registry: Registry,

    // Push Metrics
    pub pushes_total: IntCounterVec,
    pub events_pushed_total: IntCounter,
    pub push_duration: HistogramVec,

    // Filter Metrics
    pub filters_total: IntCounterVec,
    pub events_filtered_total: IntCounter,
    pub filter_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Push Metrics
        let pushes_total = IntCounterVec::new(
            Opts::new("eventstore_pushes_total", "Total pushes by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(pushes_total.clone()))?;

        let events_pushed_total = IntCounter::new(
            "eventstore_events_pushed_total",
            "Total events appended by successful pushes",
        )?;
        registry.register(Box::new(events_pushed_total.clone()))?;

        let push_duration = HistogramVec::new(
            HistogramOpts::new("eventstore_push_duration_seconds", "Push duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(push_duration.clone()))?;

        // Filter Metrics
        let filters_total = IntCounterVec::new(
            Opts::new("eventstore_filters_total", "Total filters by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(filters_total.clone()))?;

        let events_filtered_total = IntCounter::new(
            "eventstore_events_filtered_total",
            "Total events returned by filters",
        )?;
        registry.register(Box::new(events_filtered_total.clone()))?;

        let filter_duration = HistogramVec::new(
            HistogramOpts::new("eventstore_filter_duration_seconds", "Filter duration")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["awaits_open_transactions"],
        )?;
        registry.register(Box::new(filter_duration.clone()))?;

        Ok(Self {
            registry,
            pushes_total,
            events_pushed_total,
            push_duration,
            filters_total,
            events_filtered_total,
            filter_duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record a finished push
    pub fn record_push(&self, outcome: &str, event_count: usize, duration_secs: f64) {
        self.pushes_total.with_label_values(&[outcome]).inc();
        if outcome == OUTCOME_SUCCESS {
            self.events_pushed_total.inc_by(event_count as u64);
        }
        self.push_duration.with_label_values(&[outcome]).observe(duration_secs);
    }

    /// Helper to record a finished filter
    pub fn record_filter(&self, awaited: bool, event_count: Option<usize>, duration_secs: f64) {
        match event_count {
            Some(count) => {
                self.filters_total.with_label_values(&[OUTCOME_SUCCESS]).inc();
                self.events_filtered_total.inc_by(count as u64);
            }
            None => self.filters_total.with_label_values(&[OUTCOME_ERROR]).inc(),
        }
        let awaited = if awaited { "true" } else { "false" };
        self.filter_duration.with_label_values(&[awaited]).observe(duration_secs);
    }

    /// Text exposition of all registered metrics
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_push(OUTCOME_SUCCESS, 1, 0.01);
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_push() {
        let metrics = Metrics::new().unwrap();
        metrics.record_push(OUTCOME_SUCCESS, 5, 0.02);
        metrics.record_push(OUTCOME_CONFLICT, 2, 0.01);

        let gathered = metrics.registry.gather();
        let pushes = gathered.iter().find(|m| m.name() == "eventstore_pushes_total").unwrap();
        assert_eq!(pushes.metric.len(), 2); // One series per outcome

        let events = gathered.iter().find(|m| m.name() == "eventstore_events_pushed_total").unwrap();
        assert_eq!(events.metric[0].counter.value, Some(5.0));
    }

    #[test]
    fn test_record_filter() {
        let metrics = Metrics::new().unwrap();
        metrics.record_filter(false, Some(3), 0.001);
        metrics.record_filter(true, None, 0.002);

        let gathered = metrics.registry.gather();
        let filtered = gathered.iter().find(|m| m.name() == "eventstore_events_filtered_total").unwrap();
        assert_eq!(filtered.metric[0].counter.value, Some(3.0));
        let filters = gathered.iter().find(|m| m.name() == "eventstore_filters_total").unwrap();
        assert_eq!(filters.metric.len(), 2);
    }

    #[test]
    fn test_render_text_format() {
        let metrics = Metrics::new().unwrap();
        metrics.record_push(OUTCOME_ALREADY_EXISTS, 1, 0.01);
        let text = metrics.render().unwrap();
        assert!(text.contains("eventstore_pushes_total{outcome=\"already_exists\"} 1"));
    }
}
