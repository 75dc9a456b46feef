//! Result aggregation and latency statistics.
//!
//! Percentiles use the nearest-rank method: the samples are sorted and the
//! value at index `floor(n * p / 100)`, clamped to the last sample, is
//! reported. There is no interpolation, so tools that interpolate may report
//! different values for the same run.

use crate::job::JobResult;
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

type Classifier = Box<dyn Fn(&JobResult) -> bool + Send>;

/// Collects results into a [`Summary`].
pub struct Aggregator {
    classify: Classifier,
    successes: usize,
    failures: usize,
    latencies: Vec<Duration>,
}

impl Aggregator {
    /// Count a result as a success when it carries no error.
    pub fn new() -> Self {
        Self::with_classifier(JobResult::is_ok)
    }

    /// Count a result as a success when `classify` returns true.
    pub fn with_classifier<F>(classify: F) -> Self
    where
        F: Fn(&JobResult) -> bool + Send + 'static,
    {
        Aggregator {
            classify: Box::new(classify),
            successes: 0,
            failures: 0,
            latencies: Vec::new(),
        }
    }

    /// Classify one result. Only successful results contribute latency.
    pub fn record(&mut self, result: &JobResult) -> bool {
        let success = (self.classify)(result);
        if success {
            self.successes += 1;
            self.latencies.push(result.elapsed);
        } else {
            self.failures += 1;
        }
        success
    }

    /// Results recorded so far.
    pub fn total(&self) -> usize {
        self.successes + self.failures
    }

    /// Successful results recorded so far.
    pub fn successes(&self) -> usize {
        self.successes
    }

    /// Failed results recorded so far.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Build the summary for a run that submitted `submitted` jobs in
    /// `duration`.
    pub fn finish(self, submitted: usize, duration: Duration) -> Summary {
        let secs = duration.as_secs_f64();
        let throughput = if secs > 0.0 {
            submitted as f64 / secs
        } else {
            0.0
        };

        Summary {
            submitted,
            total: self.successes + self.failures,
            successes: self.successes,
            failures: self.failures,
            duration,
            throughput,
            latency: LatencyStats::from_samples(self.latencies),
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Extend<JobResult> for Aggregator {
    fn extend<I: IntoIterator<Item = JobResult>>(&mut self, iter: I) {
        for result in iter {
            self.record(&result);
        }
    }
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("successes", &self.successes)
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// Jobs submitted to the pool.
    pub submitted: usize,
    /// Results received.
    pub total: usize,
    /// Results classified as successful.
    pub successes: usize,
    /// Results classified as failed.
    pub failures: usize,
    /// Wall-clock duration of the run.
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    /// Submitted jobs per second.
    pub throughput: f64,
    /// `None` when no result succeeded.
    pub latency: Option<LatencyStats>,
}

impl Summary {
    /// Counts and throughput as label/value rows.
    pub fn rows(&self) -> Vec<(String, String)> {
        vec![
            ("Total Requests".to_owned(), self.submitted.to_string()),
            ("Successful".to_owned(), self.successes.to_string()),
            ("Failed".to_owned(), self.failures.to_string()),
            ("Duration".to_owned(), format_duration(self.duration)),
            ("Requests/sec".to_owned(), format!("{:.2}", self.throughput)),
        ]
    }

    /// Latency percentiles as label/value rows, `None` without samples.
    pub fn latency_rows(&self) -> Option<Vec<(String, String)>> {
        self.latency.map(|l| {
            vec![
                ("Min".to_owned(), format_duration(l.min)),
                ("Average".to_owned(), format_duration(l.mean)),
                ("P50 (Median)".to_owned(), format_duration(l.p50)),
                ("P95".to_owned(), format_duration(l.p95)),
                ("P99".to_owned(), format_duration(l.p99)),
                ("Max".to_owned(), format_duration(l.max)),
            ]
        })
    }
}

/// Latency distribution of the successful results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencyStats {
    /// Number of samples.
    pub samples: usize,
    /// Fastest sample.
    #[serde(rename = "min_ms", serialize_with = "as_millis")]
    pub min: Duration,
    /// Arithmetic mean.
    #[serde(rename = "mean_ms", serialize_with = "as_millis")]
    pub mean: Duration,
    /// Median, nearest rank.
    #[serde(rename = "p50_ms", serialize_with = "as_millis")]
    pub p50: Duration,
    /// 95th percentile, nearest rank.
    #[serde(rename = "p95_ms", serialize_with = "as_millis")]
    pub p95: Duration,
    /// 99th percentile, nearest rank.
    #[serde(rename = "p99_ms", serialize_with = "as_millis")]
    pub p99: Duration,
    /// Slowest sample.
    #[serde(rename = "max_ms", serialize_with = "as_millis")]
    pub max: Duration,
}

impl LatencyStats {
    /// Sort `samples` and compute the statistics; `None` when empty.
    pub fn from_samples(mut samples: Vec<Duration>) -> Option<Self> {
        samples.sort_unstable();
        let (min, max) = match (samples.first(), samples.last()) {
            (Some(min), Some(max)) => (*min, *max),
            _ => return None,
        };

        let total: u128 = samples.iter().map(Duration::as_nanos).sum();
        let mean_nanos = total / samples.len() as u128;
        let mean = Duration::from_nanos(u64::try_from(mean_nanos).unwrap_or(u64::MAX));

        Some(LatencyStats {
            samples: samples.len(),
            min,
            mean,
            p50: percentile(&samples, 50.0)?,
            p95: percentile(&samples, 95.0)?,
            p99: percentile(&samples, 99.0)?,
            max,
        })
    }
}

/// Nearest-rank percentile of ascending `sorted` samples.
///
/// Index `floor(n * p / 100)`, clamped to `n - 1`. `None` when empty.
pub fn percentile(sorted: &[Duration], p: f64) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (sorted.len() as f64 * p / 100.0).floor();
    // negative and NaN ranks saturate to 0
    let index = (rank as usize).min(sorted.len() - 1);
    Some(sorted[index])
}

fn format_duration(d: Duration) -> String {
    format!("{:.2?}", d)
}

fn as_millis<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(d.as_nanos() as f64 / 1_000_000.0)
}
