//! One load-test run: generator → pool → aggregator.

use crate::context::Context;
use crate::err::Result;
use crate::generator::Generator;
use crate::job::{Job, Work};
use crate::pool::Pool;
use crate::stats::{Aggregator, Summary};
use log::{debug, info, warn};
use std::panic;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Shape of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPlan {
    /// Jobs to submit.
    pub requests: u64,
    /// Worker threads.
    pub workers: usize,
    /// Queue capacity of the pool.
    pub queue_capacity: usize,
    /// Maximum submissions per second, zero for unpaced.
    pub rate: u32,
}

impl LoadPlan {
    /// Unpaced plan whose queue holds one job per worker.
    pub fn new(requests: u64, workers: usize) -> Self {
        LoadPlan {
            requests,
            workers,
            queue_capacity: workers,
            rate: 0,
        }
    }

    /// Pace submissions to at most `rate` per second.
    pub fn with_rate(mut self, rate: u32) -> Self {
        self.rate = rate;
        self
    }

    /// Override the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

/// Run `plan`, submitting one job per generator event with `work`, and
/// aggregate every result.
///
/// Submission stops early when `ctx` is done; jobs that never made it into
/// the pool are not counted as submitted.
pub fn run(
    plan: &LoadPlan,
    ctx: &Context,
    work: Arc<dyn Work>,
    mut aggregator: Aggregator,
) -> Result<Summary> {
    let pool = Pool::new(plan.workers, plan.queue_capacity)?;
    let results = pool.start(ctx.clone())?;
    let start = Instant::now();
    let events = Generator::new(plan.requests, plan.rate)
        .with_context(ctx.clone())
        .spawn()?;

    info!(
        "sending {} jobs with {} workers (rate {})",
        plan.requests, plan.workers, plan.rate
    );

    let (submitted, shutdown) = thread::scope(|s| {
        let pool = &pool;
        let work = &work;
        let submitter = s.spawn(move || {
            let mut submitted = 0u64;
            for seq in events.iter() {
                match pool.submit(Job::new(seq, Vec::new(), Arc::clone(work))) {
                    Ok(()) => submitted += 1,
                    Err(e) => {
                        warn!("stopped submitting after {} jobs: {}", submitted, e);
                        break;
                    }
                }
            }
            (submitted, pool.shutdown())
        });

        for (received, result) in results.iter().enumerate() {
            aggregator.record(&result);
            let received = received + 1;
            let secs = start.elapsed().as_secs_f64();
            debug!(
                "running: {}/{} | {:.2} req/s | errors: {}",
                received,
                plan.requests,
                if secs > 0.0 { received as f64 / secs } else { 0.0 },
                aggregator.failures()
            );
        }

        submitter
            .join()
            .unwrap_or_else(|payload| panic::resume_unwind(payload))
    });
    shutdown?;

    let duration = start.elapsed();
    let submitted = usize::try_from(submitted).unwrap_or(usize::MAX);
    Ok(aggregator.finish(submitted, duration))
}
