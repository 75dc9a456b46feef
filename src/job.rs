//! Jobs submitted to the [`Pool`](crate::Pool) and the results it sends back.

use log::debug;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Error type returned by a [`Work`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The operation a job runs on its payload.
///
/// Any `Fn(&[u8]) -> Result<Vec<u8>, BoxError>` closure that is `Send + Sync`
/// is a `Work`. Work from different jobs runs concurrently; the pool does not
/// serialize it.
pub trait Work: Send + Sync {
    /// Run on `content` and return the output bytes.
    fn execute(&self, content: &[u8]) -> Result<Vec<u8>, BoxError>;
}

impl<F> Work for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>, BoxError> + Send + Sync,
{
    fn execute(&self, content: &[u8]) -> Result<Vec<u8>, BoxError> {
        self(content)
    }
}

/// A unit of work.
#[derive(Clone)]
pub struct Job {
    /// Caller assigned; the pool does not check uniqueness.
    pub id: u64,
    /// Payload handed to `work`.
    pub content: Vec<u8>,
    /// Operation run by the worker.
    pub work: Arc<dyn Work>,
}

impl Job {
    /// New a job
    pub fn new(id: u64, content: impl Into<Vec<u8>>, work: Arc<dyn Work>) -> Self {
        Job {
            id,
            content: content.into(),
            work,
        }
    }

    /// New a job from a closure
    pub fn from_fn<F>(id: u64, content: impl Into<Vec<u8>>, f: F) -> Self
    where
        F: Fn(&[u8]) -> Result<Vec<u8>, BoxError> + Send + Sync + 'static,
    {
        Job::new(id, content, Arc::new(f))
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("content_len", &self.content.len())
            .finish_non_exhaustive()
    }
}

/// Why a job failed.
#[derive(Error, Debug)]
pub enum JobError {
    /// The work returned an error
    #[error("{0}")]
    Failed(BoxError),

    /// The work panicked; holds the panic message
    #[error("job panicked: {0}")]
    Panicked(String),
}

/// Outcome of one job.
#[derive(Debug)]
pub struct JobResult {
    /// Id of the job that produced this result.
    pub job_id: u64,
    /// Output on success, empty on failure.
    pub content: Vec<u8>,
    /// Set iff the work failed.
    pub error: Option<JobError>,
    /// Time spent inside the work.
    pub elapsed: Duration,
}

impl JobResult {
    /// Whether the work succeeded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Re-runs a [`Work`] on failure, doubling the pause between attempts.
///
/// The pool never retries by itself; wrap the work instead:
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use volley::job::{BoxError, Retry, Work};
///
/// let flaky = |_: &[u8]| -> Result<Vec<u8>, BoxError> { Err("nope".into()) };
/// let retry = Retry::new(flaky, 3).with_backoff(Duration::from_millis(1));
/// assert!(retry.execute(b"").is_err());
/// ```
pub struct Retry<W> {
    inner: W,
    attempts: u32,
    backoff: Duration,
}

impl<W: Work> Retry<W> {
    /// Try `inner` up to `attempts` times in total. Zero is treated as one.
    pub fn new(inner: W, attempts: u32) -> Self {
        Retry {
            inner,
            attempts: attempts.max(1),
            backoff: Duration::ZERO,
        }
    }

    /// Pause `initial`, `2 * initial`, `4 * initial`, ... between attempts.
    pub fn with_backoff(mut self, initial: Duration) -> Self {
        self.backoff = initial;
        self
    }
}

impl<W: Work> Work for Retry<W> {
    fn execute(&self, content: &[u8]) -> Result<Vec<u8>, BoxError> {
        let mut pause = self.backoff;
        let mut attempt = 1;
        loop {
            match self.inner.execute(content) {
                Ok(out) => return Ok(out),
                Err(e) if attempt >= self.attempts => return Err(e),
                Err(e) => {
                    debug!("attempt {}/{} failed: {}", attempt, self.attempts, e);
                    if !pause.is_zero() {
                        thread::sleep(pause);
                        pause = pause.saturating_mul(2);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn closure_is_work() {
        let job = Job::from_fn(7, "abc", |b| Ok(b.to_ascii_uppercase()));
        assert_eq!(job.id, 7);
        assert_eq!(job.work.execute(&job.content).unwrap(), b"ABC");
    }

    #[test]
    fn empty_content_and_noop_work_are_legal() {
        let job = Job::from_fn(0, Vec::new(), |_| Ok(Vec::new()));
        assert!(job.work.execute(&job.content).unwrap().is_empty());
    }

    #[test]
    fn retry_recovers_from_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let flaky = move |b: &[u8]| -> Result<Vec<u8>, BoxError> {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("transient".into())
            } else {
                Ok(b.to_vec())
            }
        };
        let retry = Retry::new(flaky, 5).with_backoff(Duration::from_millis(1));
        assert_eq!(retry.execute(b"ok").unwrap(), b"ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_gives_up_after_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let broken = move |_: &[u8]| -> Result<Vec<u8>, BoxError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("down".into())
        };
        let err = Retry::new(broken, 3).execute(b"").unwrap_err();
        assert_eq!(err.to_string(), "down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
