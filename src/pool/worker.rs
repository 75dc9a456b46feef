use crate::context::Context;
use crate::job::{Job, JobError, JobResult};
use crossbeam_channel::{select, Receiver, Sender};
use log::{debug, error};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

pub(super) struct Worker {
    id: usize,
    thread: JoinHandle<()>,
}

impl Worker {
    pub(super) fn spawn(
        id: usize,
        jobs: Receiver<Job>,
        results: Sender<JobResult>,
        ctx: Context,
        live: LiveGuard,
    ) -> io::Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("volley-worker-{}", id))
            .spawn(move || {
                let _live = live;
                run(id, jobs, results, ctx);
            })?;
        Ok(Worker { id, thread })
    }

    pub(super) fn join(self) {
        debug!("worker-{} joining", self.id);
        if self.thread.join().is_err() {
            error!("worker-{} panic", self.id);
        }
    }
}

/// Counts a worker as live from spawn until its thread exits.
pub(super) struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    pub(super) fn new(live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        LiveGuard(live)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Next {
    Job(Job),
    Closed,
    Cancelled,
}

fn run(id: usize, jobs: Receiver<Job>, results: Sender<JobResult>, ctx: Context) {
    debug!("worker-{} started", id);
    let expiry = ctx.expiry();

    loop {
        // `select!` picks randomly among ready operations, so check first
        // to stop pulling as soon as the context is done.
        if ctx.is_done() {
            debug!("worker-{} context done; shutting down", id);
            break;
        }

        let next = select! {
            recv(jobs) -> msg => match msg {
                Ok(job) => Next::Job(job),
                Err(_) => Next::Closed,
            },
            recv(ctx.done()) -> _ => Next::Cancelled,
            recv(expiry) -> _ => Next::Cancelled,
        };

        let job = match next {
            // cancelled while the select was in flight
            Next::Job(job) if ctx.is_done() => {
                debug!("worker-{} context done; dropping job {}", id, job.id);
                break;
            }
            Next::Job(job) => job,
            Next::Closed => {
                debug!("worker-{} queue closed; shutting down", id);
                break;
            }
            Next::Cancelled => {
                debug!("worker-{} context done; shutting down", id);
                break;
            }
        };

        let result = execute(id, job);
        if results.send(result).is_err() {
            debug!("worker-{} result receiver dropped; shutting down", id);
            break;
        }
    }
}

fn execute(id: usize, job: Job) -> JobResult {
    let Job {
        id: job_id,
        content,
        work,
    } = job;

    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| work.execute(&content)));
    let elapsed = start.elapsed();

    let (content, error) = match outcome {
        Ok(Ok(output)) => (output, None),
        Ok(Err(e)) => (Vec::new(), Some(JobError::Failed(e))),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("worker-{} job {} panic: {}", id, job_id, message);
            (Vec::new(), Some(JobError::Panicked(message)))
        }
    };

    JobResult {
        job_id,
        content,
        error,
        elapsed,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
