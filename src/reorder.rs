//! Restores submission order on top of the pool's completion order.
//!
//! The pool hands results back as workers finish. When ids are assigned
//! consecutively, [`Reorder`] parks early arrivals and releases results once
//! the run of ids from the next expected one is complete.

use crate::job::JobResult;
use log::warn;
use std::collections::{BTreeMap, VecDeque};

/// Reordering buffer keyed by job id.
#[derive(Debug)]
pub struct Reorder {
    next: u64,
    parked: BTreeMap<u64, JobResult>,
}

impl Reorder {
    /// Expect ids `first_id, first_id + 1, ...`.
    pub fn new(first_id: u64) -> Self {
        Reorder {
            next: first_id,
            parked: BTreeMap::new(),
        }
    }

    /// Add a result and return every result that is now in order.
    ///
    /// Ids already released and duplicates of parked ids are dropped.
    pub fn push(&mut self, result: JobResult) -> Vec<JobResult> {
        if result.job_id < self.next || self.parked.contains_key(&result.job_id) {
            warn!("dropping duplicate result for job {}", result.job_id);
            return Vec::new();
        }
        self.parked.insert(result.job_id, result);

        let mut ready = Vec::new();
        while let Some(result) = self.parked.remove(&self.next) {
            ready.push(result);
            self.next += 1;
        }
        ready
    }

    /// The id the buffer is waiting for.
    pub fn next_id(&self) -> u64 {
        self.next
    }

    /// Results parked behind a missing id.
    pub fn pending(&self) -> usize {
        self.parked.len()
    }

    /// Give up on the gaps and return the parked results in id order.
    pub fn into_pending(self) -> Vec<JobResult> {
        self.parked.into_values().collect()
    }
}

/// Iterator adapter returned by [`ordered`].
pub struct Ordered<I> {
    source: I,
    buffer: Option<Reorder>,
    ready: VecDeque<JobResult>,
}

/// Yield results from `source` in id order starting at `first_id`.
///
/// When `source` ends with gaps (for example after a cancelled run), the
/// remaining results follow in ascending id order.
pub fn ordered<I>(source: I, first_id: u64) -> Ordered<I::IntoIter>
where
    I: IntoIterator<Item = JobResult>,
{
    Ordered {
        source: source.into_iter(),
        buffer: Some(Reorder::new(first_id)),
        ready: VecDeque::new(),
    }
}

impl<I: Iterator<Item = JobResult>> Iterator for Ordered<I> {
    type Item = JobResult;

    fn next(&mut self) -> Option<JobResult> {
        loop {
            if let Some(result) = self.ready.pop_front() {
                return Some(result);
            }
            let buffer = self.buffer.as_mut()?;
            match self.source.next() {
                Some(result) => self.ready.extend(buffer.push(result)),
                None => {
                    let rest = self.buffer.take()?.into_pending();
                    self.ready.extend(rest);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(job_id: u64) -> JobResult {
        JobResult {
            job_id,
            content: job_id.to_le_bytes().to_vec(),
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    fn ids(results: &[JobResult]) -> Vec<u64> {
        results.iter().map(|r| r.job_id).collect()
    }

    #[test]
    fn releases_contiguous_runs() {
        let mut buf = Reorder::new(1);
        assert!(buf.push(result(3)).is_empty());
        assert!(buf.push(result(2)).is_empty());
        assert_eq!(buf.pending(), 2);

        assert_eq!(ids(&buf.push(result(1))), vec![1, 2, 3]);
        assert_eq!(buf.next_id(), 4);
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn drops_duplicates() {
        let mut buf = Reorder::new(0);
        assert_eq!(ids(&buf.push(result(0))), vec![0]);
        assert!(buf.push(result(0)).is_empty());
        assert!(buf.push(result(2)).is_empty());
        assert!(buf.push(result(2)).is_empty());
        assert_eq!(buf.pending(), 1);
    }

    #[test]
    fn ordered_adapter_flushes_gaps_at_the_end() {
        let arrivals = vec![result(4), result(0), result(2), result(1), result(6)];
        let out: Vec<u64> = ordered(arrivals, 0).map(|r| r.job_id).collect();
        assert_eq!(out, vec![0, 1, 2, 4, 6]);
    }
}
