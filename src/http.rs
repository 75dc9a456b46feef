//! HTTP GET as a pool [`Work`].

use crate::err::Result;
use crate::job::{BoxError, JobResult, Work};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;

/// What one request observed. Encoded as JSON in the job's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    /// HTTP status code.
    pub status: u16,
    /// Body length in bytes.
    pub bytes: u64,
}

impl Probe {
    /// Decode a probe from a job's output.
    pub fn decode(content: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(content)?)
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a GET to a fixed url for every job it runs.
///
/// Transport failures become job errors. Any response, whatever its status,
/// is a successful job whose output is the encoded [`Probe`]; use
/// [`is_success`] to also reject non-2xx statuses.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    /// New a probe whose requests time out after `timeout`. Requests go
    /// straight to the target; proxy environment variables are ignored.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).no_proxy().build()?;
        Ok(HttpProbe {
            client,
            url: url.into(),
        })
    }

    /// Target url.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Work for HttpProbe {
    fn execute(&self, _content: &[u8]) -> std::result::Result<Vec<u8>, BoxError> {
        let mut response = self.client.get(&self.url).send()?;
        let status = response.status().as_u16();
        // drain the body so the connection can be reused
        let bytes = response.copy_to(&mut io::sink())?;
        Ok(serde_json::to_vec(&Probe { status, bytes })?)
    }
}

/// Classifier for [`Aggregator`](crate::Aggregator): no error and a 2xx probe.
pub fn is_success(result: &JobResult) -> bool {
    result.is_ok()
        && Probe::decode(&result.content)
            .map(|probe| probe.is_success())
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobError;

    fn result_with(content: Vec<u8>, error: Option<JobError>) -> JobResult {
        JobResult {
            job_id: 1,
            content,
            error,
            elapsed: Duration::from_millis(3),
        }
    }

    #[test]
    fn classifies_by_status() {
        let ok = serde_json::to_vec(&Probe {
            status: 204,
            bytes: 0,
        })
        .unwrap();
        let missing = serde_json::to_vec(&Probe {
            status: 404,
            bytes: 9,
        })
        .unwrap();

        assert!(is_success(&result_with(ok, None)));
        assert!(!is_success(&result_with(missing, None)));
    }

    #[test]
    fn errors_and_garbage_are_failures() {
        let err = JobError::Failed("connection refused".into());
        assert!(!is_success(&result_with(Vec::new(), Some(err))));
        assert!(!is_success(&result_with(b"not json".to_vec(), None)));
    }

    #[test]
    fn status_bounds() {
        let probe = |status| Probe { status, bytes: 0 };
        assert!(probe(200).is_success());
        assert!(probe(299).is_success());
        assert!(!probe(199).is_success());
        assert!(!probe(300).is_success());
    }
}
