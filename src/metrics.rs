//! Ingestion metrics collection and export
//!
//! One [`MetricsSink`] is created at process start and shared as an
//! `Arc<MetricsSink>` with every fetcher and engine. All updates are
//! increment/set operations applied under a single short lock per family, so
//! concurrent runs never lose updates. [`MetricsSink::render`] produces the
//! Prometheus text exposition format and has no side effects.

use crate::constants::{LATENCY_BUCKETS_SECS, LATENCY_WINDOW, METRICS_NAMESPACE};
use crate::summary::PriceSummary;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Percentile view over the most recent requests of one target
#[derive(Debug, Clone, PartialEq)]
pub struct FetchLatencySnapshot {
    /// Target the samples belong to
    pub target: String,
    /// 50th percentile latency of successful requests in milliseconds
    pub latency_p50_ms: f64,
    /// 99th percentile latency of successful requests in milliseconds
    pub latency_p99_ms: f64,
    /// Success rate (0.0 to 1.0) over the lifetime of the sink
    pub success_rate: f64,
    /// Total number of timed requests
    pub total_requests: u64,
    /// Number of timed requests that failed
    pub failed_requests: u64,
}

impl FetchLatencySnapshot {
    /// Creates a snapshot with no data
    pub fn empty(target: &str) -> Self {
        Self {
            target: target.to_string(),
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
            success_rate: 1.0,
            total_requests: 0,
            failed_requests: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct LatencySample {
    duration_ms: f64,
    success: bool,
}

#[derive(Debug, Default)]
struct LatencyWindow {
    samples: VecDeque<LatencySample>,
    total_requests: u64,
    failed_requests: u64,
}

impl LatencyWindow {
    fn push(&mut self, duration: Duration, success: bool) {
        self.total_requests += 1;
        if !success {
            self.failed_requests += 1;
        }
        if self.samples.len() >= LATENCY_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(LatencySample {
            duration_ms: duration.as_secs_f64() * 1000.0,
            success,
        });
    }

    fn snapshot(&self, target: &str) -> FetchLatencySnapshot {
        if self.samples.is_empty() {
            return FetchLatencySnapshot::empty(target);
        }

        let mut latencies: Vec<f64> = self
            .samples
            .iter()
            .filter(|s| s.success)
            .map(|s| s.duration_ms)
            .collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let success_rate = if self.total_requests > 0 {
            (self.total_requests - self.failed_requests) as f64 / self.total_requests as f64
        } else {
            1.0
        };

        FetchLatencySnapshot {
            target: target.to_string(),
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            success_rate,
            total_requests: self.total_requests,
            failed_requests: self.failed_requests,
        }
    }
}

/// Nearest-rank percentile of sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let rank = (p / 100.0 * sorted_values.len() as f64).ceil() as usize;
    sorted_values[rank.saturating_sub(1).min(sorted_values.len() - 1)]
}

#[derive(Debug, Clone)]
struct HistogramState {
    bucket_counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl HistogramState {
    fn new() -> Self {
        Self {
            bucket_counts: vec![0; LATENCY_BUCKETS_SECS.len()],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        // buckets are rendered cumulatively, so only the first match is counted here
        if let Some(idx) = LATENCY_BUCKETS_SECS.iter().position(|bound| value <= *bound) {
            self.bucket_counts[idx] += 1;
        }
        self.sum += value;
        self.count += 1;
    }
}

type LabelValues = Vec<String>;

/// A named metric family keyed by label values
struct Family<T> {
    name: String,
    help: &'static str,
    label_names: &'static [&'static str],
    series: Mutex<BTreeMap<LabelValues, T>>,
}

impl<T> Family<T> {
    fn new(suffix: &str, help: &'static str, label_names: &'static [&'static str]) -> Self {
        Self {
            name: format!("{}_{}", METRICS_NAMESPACE, suffix),
            help,
            label_names,
            series: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<LabelValues, T>> {
        // a panic while holding the lock cannot leave a half-applied update
        self.series.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key(labels: &[&str]) -> LabelValues {
        labels.iter().map(|l| l.to_string()).collect()
    }
}

impl Family<f64> {
    fn inc_by(&self, labels: &[&str], delta: f64) {
        *self.lock().entry(Self::key(labels)).or_insert(0.0) += delta;
    }

    fn set(&self, labels: &[&str], value: f64) {
        self.lock().insert(Self::key(labels), value);
    }

    fn get(&self, labels: &[&str]) -> Option<f64> {
        self.lock().get(&Self::key(labels)).copied()
    }
}

impl Family<HistogramState> {
    fn observe(&self, labels: &[&str], value: f64) {
        self.lock()
            .entry(Self::key(labels))
            .or_insert_with(HistogramState::new)
            .observe(value);
    }

    fn count(&self, labels: &[&str]) -> u64 {
        self.lock().get(&Self::key(labels)).map_or(0, |h| h.count)
    }
}

/// Process-wide ingestion metrics
pub struct MetricsSink {
    requests_issued: Family<f64>,
    requests: Family<f64>,
    records_ingested: Family<f64>,
    errors: Family<f64>,
    user_actions: Family<f64>,
    request_duration: Family<HistogramState>,
    processing_duration: Family<HistogramState>,
    last_success: Family<f64>,
    data_size: Family<f64>,
    price_mean: Family<f64>,
    price_max: Family<f64>,
    price_min: Family<f64>,
    price_count: Family<f64>,
    active_workers: AtomicI64,
    latency_windows: Mutex<HashMap<String, LatencyWindow>>,
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink {
    /// Creates an empty sink
    pub fn new() -> Self {
        Self {
            requests_issued: Family::new(
                "api_requests_issued_total",
                "Total number of API requests issued",
                &["complex_no"],
            ),
            requests: Family::new(
                "api_requests_total",
                "Total number of API requests made",
                &["complex_no", "status"],
            ),
            records_ingested: Family::new(
                "data_fetched_total",
                "Total number of real estate listings fetched",
                &["complex_no"],
            ),
            errors: Family::new(
                "errors_total",
                "Total number of errors encountered",
                &["error_type", "complex_no"],
            ),
            user_actions: Family::new(
                "user_actions_total",
                "Total number of user actions",
                &["action_type"],
            ),
            request_duration: Family::new(
                "request_duration_seconds",
                "Time spent on API requests",
                &["complex_no"],
            ),
            processing_duration: Family::new(
                "data_processing_duration_seconds",
                "Time spent processing data",
                &["complex_no"],
            ),
            last_success: Family::new(
                "last_successful_fetch_timestamp",
                "Timestamp of last successful data fetch",
                &["complex_no"],
            ),
            data_size: Family::new(
                "current_data_size",
                "Current size of fetched data",
                &["complex_no"],
            ),
            price_mean: Family::new(
                "price_mean_billion",
                "Mean price in billions",
                &["complex_no"],
            ),
            price_max: Family::new(
                "price_max_billion",
                "Max price in billions",
                &["complex_no"],
            ),
            price_min: Family::new(
                "price_min_billion",
                "Min price in billions",
                &["complex_no"],
            ),
            price_count: Family::new(
                "price_count",
                "Number of properties with valid prices",
                &["complex_no"],
            ),
            active_workers: AtomicI64::new(0),
            latency_windows: Mutex::new(HashMap::new()),
        }
    }

    /// Counts a request about to be sent
    pub fn record_request_issued(&self, target: &str) {
        self.requests_issued.inc_by(&[target], 1.0);
    }

    /// Counts a request that produced a decoded page
    pub fn record_request_success(&self, target: &str) {
        self.requests.inc_by(&[target, "success"], 1.0);
    }

    /// Counts a failed request under its error kind
    pub fn record_request_failure(&self, target: &str, error_kind: &str) {
        self.requests.inc_by(&[target, "error"], 1.0);
        self.errors.inc_by(&[error_kind, target], 1.0);
    }

    /// Counts an error that did not come from a request (e.g. input validation)
    pub fn record_error(&self, target: &str, error_kind: &str) {
        self.errors.inc_by(&[error_kind, target], 1.0);
    }

    pub fn record_records_ingested(&self, target: &str, count: usize) {
        self.records_ingested.inc_by(&[target], count as f64);
    }

    pub fn record_user_action(&self, action_type: &str) {
        self.user_actions.inc_by(&[action_type], 1.0);
    }

    /// Observes one request latency into the histogram and the rolling window
    pub fn observe_request_latency(&self, target: &str, duration: Duration, success: bool) {
        self.request_duration
            .observe(&[target], duration.as_secs_f64());
        self.lock_windows()
            .entry(target.to_string())
            .or_default()
            .push(duration, success);
    }

    pub fn observe_processing_duration(&self, target: &str, duration: Duration) {
        self.processing_duration
            .observe(&[target], duration.as_secs_f64());
    }

    /// Marks now as the last successful fetch of a target
    pub fn mark_success(&self, target: &str) {
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        self.last_success.set(&[target], now);
    }

    pub fn set_data_size(&self, target: &str, records: usize) {
        self.data_size.set(&[target], records as f64);
    }

    /// Publishes price statistics; an empty summary leaves the gauges untouched
    pub fn set_price_statistics(&self, target: &str, summary: &PriceSummary) {
        if let (Some(mean), Some(min), Some(max)) = (summary.mean, summary.min, summary.max) {
            self.price_mean.set(&[target], mean);
            self.price_min.set(&[target], min);
            self.price_max.set(&[target], max);
            self.price_count.set(&[target], summary.count as f64);
        }
    }

    /// Registers an active worker until the guard is dropped
    pub fn worker_started(self: &Arc<Self>) -> ActiveWorkerGuard {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
        ActiveWorkerGuard {
            sink: Arc::clone(self),
        }
    }

    fn worker_finished(&self) {
        // clamp at zero
        let _ = self
            .active_workers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some((current - 1).max(0))
            });
    }

    pub fn active_workers(&self) -> i64 {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn requests_issued(&self, target: &str) -> u64 {
        self.requests_issued.get(&[target]).unwrap_or(0.0) as u64
    }

    /// Requests by status (`success` or `error`)
    pub fn requests_total(&self, target: &str, status: &str) -> u64 {
        self.requests.get(&[target, status]).unwrap_or(0.0) as u64
    }

    pub fn errors_total(&self, error_kind: &str, target: &str) -> u64 {
        self.errors.get(&[error_kind, target]).unwrap_or(0.0) as u64
    }

    pub fn records_ingested(&self, target: &str) -> u64 {
        self.records_ingested.get(&[target]).unwrap_or(0.0) as u64
    }

    pub fn user_actions(&self, action_type: &str) -> u64 {
        self.user_actions.get(&[action_type]).unwrap_or(0.0) as u64
    }

    /// Number of latency observations for a target
    pub fn request_latency_count(&self, target: &str) -> u64 {
        self.request_duration.count(&[target])
    }

    pub fn processing_count(&self, target: &str) -> u64 {
        self.processing_duration.count(&[target])
    }

    /// Unix timestamp (seconds) of the last successful fetch
    pub fn last_success_timestamp(&self, target: &str) -> Option<f64> {
        self.last_success.get(&[target])
    }

    pub fn data_size(&self, target: &str) -> Option<u64> {
        self.data_size.get(&[target]).map(|v| v as u64)
    }

    /// Published price gauges as `(mean, min, max, count)`
    pub fn price_statistics(&self, target: &str) -> Option<(f64, f64, f64, u64)> {
        Some((
            self.price_mean.get(&[target])?,
            self.price_min.get(&[target])?,
            self.price_max.get(&[target])?,
            self.price_count.get(&[target])? as u64,
        ))
    }

    /// Computes p50/p99 latency and success rate for a target
    pub fn latency_snapshot(&self, target: &str) -> FetchLatencySnapshot {
        self.lock_windows()
            .get(target)
            .map(|window| window.snapshot(target))
            .unwrap_or_else(|| FetchLatencySnapshot::empty(target))
    }

    fn lock_windows(&self) -> MutexGuard<'_, HashMap<String, LatencyWindow>> {
        self.latency_windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Renders every family in the Prometheus text exposition format
    pub fn render(&self) -> String {
        let mut out = String::new();

        for family in [
            &self.requests_issued,
            &self.requests,
            &self.records_ingested,
            &self.errors,
            &self.user_actions,
        ] {
            render_scalar(&mut out, family, "counter");
        }

        for family in [&self.request_duration, &self.processing_duration] {
            render_histogram(&mut out, family);
        }

        let active = format!("{}_active_users", METRICS_NAMESPACE);
        let _ = writeln!(out, "# HELP {} Current number of active users", active);
        let _ = writeln!(out, "# TYPE {} gauge", active);
        let _ = writeln!(out, "{} {}", active, self.active_workers());

        for family in [
            &self.last_success,
            &self.data_size,
            &self.price_mean,
            &self.price_max,
            &self.price_min,
            &self.price_count,
        ] {
            render_scalar(&mut out, family, "gauge");
        }

        out
    }
}

/// RAII guard for the active worker gauge
pub struct ActiveWorkerGuard {
    sink: Arc<MetricsSink>,
}

impl Drop for ActiveWorkerGuard {
    fn drop(&mut self) {
        self.sink.worker_finished();
    }
}

/// RAII guard for timing requests
///
/// Records the elapsed time when dropped, whatever path the request took.
pub struct RequestTimer {
    start: Instant,
    sink: Arc<MetricsSink>,
    target: String,
    success: bool,
}

impl RequestTimer {
    /// Creates a new request timer
    pub fn new(sink: Arc<MetricsSink>, target: &str) -> Self {
        Self {
            start: Instant::now(),
            sink,
            target: target.to_string(),
            success: false,
        }
    }

    /// Marks the request as successful
    pub fn mark_success(&mut self) {
        self.success = true;
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.sink
            .observe_request_latency(&self.target, self.start.elapsed(), self.success);
    }
}

fn render_header<T>(out: &mut String, family: &Family<T>, kind: &str) {
    let _ = writeln!(out, "# HELP {} {}", family.name, family.help);
    let _ = writeln!(out, "# TYPE {} {}", family.name, kind);
}

fn render_scalar(out: &mut String, family: &Family<f64>, kind: &str) {
    render_header(out, family, kind);
    for (values, value) in family.lock().iter() {
        let _ = writeln!(
            out,
            "{}{} {}",
            family.name,
            format_labels(family.label_names, values, None),
            format_value(*value)
        );
    }
}

fn render_histogram(out: &mut String, family: &Family<HistogramState>) {
    render_header(out, family, "histogram");
    for (values, state) in family.lock().iter() {
        let mut cumulative = 0;
        for (bound, count) in LATENCY_BUCKETS_SECS.iter().zip(&state.bucket_counts) {
            cumulative += count;
            let le = format_value(*bound);
            let _ = writeln!(
                out,
                "{}_bucket{} {}",
                family.name,
                format_labels(family.label_names, values, Some(&le)),
                cumulative
            );
        }
        let _ = writeln!(
            out,
            "{}_bucket{} {}",
            family.name,
            format_labels(family.label_names, values, Some("+Inf")),
            state.count
        );
        let labels = format_labels(family.label_names, values, None);
        let _ = writeln!(out, "{}_sum{} {}", family.name, labels, format_value(state.sum));
        let _ = writeln!(out, "{}_count{} {}", family.name, labels, state.count);
    }
}

fn format_labels(names: &[&str], values: &[String], le: Option<&str>) -> String {
    let mut pairs: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(name, value)| format!("{}=\"{}\"", name, escape_label(value)))
        .collect();
    if let Some(le) = le {
        pairs.push(format!("le=\"{}\"", le));
    }
    if pairs.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", pairs.join(","))
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_counters() {
        let sink = MetricsSink::new();
        sink.record_request_issued("131345");
        sink.record_request_issued("131345");
        sink.record_request_success("131345");
        sink.record_request_failure("131345", "transport");

        assert_eq!(sink.requests_issued("131345"), 2);
        assert_eq!(sink.requests_total("131345", "success"), 1);
        assert_eq!(sink.requests_total("131345", "error"), 1);
        assert_eq!(sink.errors_total("transport", "131345"), 1);
        assert_eq!(sink.errors_total("json_decode", "131345"), 0);
        assert_eq!(sink.requests_total("999", "success"), 0);
    }

    #[test]
    fn test_latency_snapshot() {
        let sink = MetricsSink::new();
        sink.observe_request_latency("t", Duration::from_millis(100), true);
        sink.observe_request_latency("t", Duration::from_millis(200), true);
        sink.observe_request_latency("t", Duration::from_millis(150), false);

        let snapshot = sink.latency_snapshot("t");
        assert_eq!(snapshot.target, "t");
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.failed_requests, 1);
        assert!(snapshot.success_rate > 0.6 && snapshot.success_rate < 0.7);
        assert_eq!(sink.request_latency_count("t"), 3);
        assert_eq!(sink.latency_snapshot("other"), FetchLatencySnapshot::empty("other"));
    }

    #[test]
    fn test_percentile() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        assert_eq!(percentile(&values, 50.0), 5.0);
        assert_eq!(percentile(&values, 99.0), 10.0);
        assert_eq!(percentile(&values, 90.0), 9.0);
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&[42.0], 50.0), 42.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_active_workers_never_negative() {
        let sink = Arc::new(MetricsSink::new());
        let first = sink.worker_started();
        let second = sink.worker_started();
        assert_eq!(sink.active_workers(), 2);
        drop(first);
        drop(second);
        assert_eq!(sink.active_workers(), 0);

        sink.worker_finished();
        assert_eq!(sink.active_workers(), 0);
    }

    #[test]
    fn test_request_timer_records_on_drop() {
        let sink = Arc::new(MetricsSink::new());
        {
            let mut timer = RequestTimer::new(sink.clone(), "t");
            timer.mark_success();
        }
        {
            let _timer = RequestTimer::new(sink.clone(), "t");
        }
        let snapshot = sink.latency_snapshot("t");
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.failed_requests, 1);
    }

    #[test]
    fn test_price_statistics_skip_empty_summary() {
        let sink = MetricsSink::new();
        sink.set_price_statistics("t", &PriceSummary::default());
        assert_eq!(sink.price_statistics("t"), None);

        let summary = PriceSummary {
            count: 2,
            mean: Some(6.0),
            min: Some(5.0),
            max: Some(7.0),
        };
        sink.set_price_statistics("t", &summary);
        assert_eq!(sink.price_statistics("t"), Some((6.0, 5.0, 7.0, 2)));
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let sink = Arc::new(MetricsSink::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        sink.record_records_ingested("t", 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sink.records_ingested("t"), 8000);
    }

    #[test]
    fn test_render_exposition_format() {
        let sink = Arc::new(MetricsSink::new());
        sink.record_request_success("131345");
        sink.record_request_failure("131345", "json_decode");
        sink.observe_request_latency("131345", Duration::from_millis(30), true);
        sink.set_data_size("131345", 40);
        sink.record_user_action("data_fetch");
        let _worker = sink.worker_started();

        let text = sink.render();
        assert!(text.contains("# TYPE naver_scraper_api_requests_total counter"));
        assert!(text.contains(
            "naver_scraper_api_requests_total{complex_no=\"131345\",status=\"success\"} 1"
        ));
        assert!(text.contains(
            "naver_scraper_errors_total{error_type=\"json_decode\",complex_no=\"131345\"} 1"
        ));
        assert!(text.contains("# TYPE naver_scraper_request_duration_seconds histogram"));
        assert!(text.contains(
            "naver_scraper_request_duration_seconds_bucket{complex_no=\"131345\",le=\"0.025\"} 0"
        ));
        assert!(text.contains(
            "naver_scraper_request_duration_seconds_bucket{complex_no=\"131345\",le=\"0.05\"} 1"
        ));
        assert!(text.contains(
            "naver_scraper_request_duration_seconds_bucket{complex_no=\"131345\",le=\"+Inf\"} 1"
        ));
        assert!(text.contains("naver_scraper_request_duration_seconds_count{complex_no=\"131345\"} 1"));
        assert!(text.contains("naver_scraper_current_data_size{complex_no=\"131345\"} 40"));
        assert!(text.contains("naver_scraper_user_actions_total{action_type=\"data_fetch\"} 1"));
        assert!(text.contains("naver_scraper_active_users 1"));

        // reading has no side effects
        assert_eq!(sink.render(), text);
    }

    #[test]
    fn test_label_escaping() {
        assert_eq!(escape_label("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(2.5), "2.5");
    }
}
