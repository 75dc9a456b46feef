//! Bounded worker pool.
//!
//! A [`Pool`] owns a fixed number of worker threads that share one bounded job
//! queue and one result channel. Results come back in completion order, not
//! submission order.
//!
//! ```rust
//! use volley::{Context, Job, Pool};
//!
//! let pool = Pool::new(2, 4)?;
//! let results = pool.start(Context::new())?;
//!
//! std::thread::scope(|s| {
//!     s.spawn(|| {
//!         for id in 0..4 {
//!             pool.submit(Job::from_fn(id, "payload", |b| Ok(b.to_vec()))).unwrap();
//!         }
//!         pool.shutdown().unwrap();
//!     });
//!     assert_eq!(results.iter().count(), 4);
//! });
//! # Ok::<(), volley::err::Error>(())
//! ```

mod worker;

use self::worker::{LiveGuard, Worker};
use crate::context::{Cancelled, Context};
use crate::err::{Error, Result};
use crate::job::{Job, JobResult};
use crossbeam_channel::{bounded, select, Receiver, Select, Sender};
use log::info;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Lifecycle of a [`Pool`]. A pool never goes back to an earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Built, workers not spawned yet
    Created,
    /// Workers are pulling jobs
    Running,
    /// `shutdown` closed the queue and is joining the workers
    Draining,
    /// Workers joined and the result channel closed
    Terminated,
}

enum Lifecycle {
    Created,
    Running {
        ctx: Context,
        workers: Vec<Worker>,
        // Last sender of the result channel. Dropped only after every worker
        // has been joined, so the channel closes exactly once.
        results: Sender<JobResult>,
    },
    Draining,
    Terminated,
}

impl Lifecycle {
    fn state(&self) -> State {
        match self {
            Lifecycle::Created => State::Created,
            Lifecycle::Running { .. } => State::Running,
            Lifecycle::Draining => State::Draining,
            Lifecycle::Terminated => State::Terminated,
        }
    }
}

/// One-shot signal. Firing drops the sender, so every receive on
/// [`Latch::fired`] returns from then on.
struct Latch {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl Latch {
    fn new() -> Self {
        let (tx, rx) = bounded(0);
        Latch {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    fn fire(&self) {
        drop(self.tx.lock().unwrap_or_else(PoisonError::into_inner).take());
    }

    fn fired(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// Pool
pub struct Pool {
    worker_count: usize,
    queue_capacity: usize,
    result_capacity: usize,
    jobs: RwLock<Option<Sender<Job>>>,
    queue: Receiver<Job>,
    lifecycle: Mutex<Lifecycle>,
    started: Latch,
    closed: Latch,
    live: Arc<AtomicUsize>,
}

impl Pool {
    /// New a pool with `worker_count` workers and room for `queue_capacity`
    /// waiting jobs. A capacity of zero makes every `submit` a rendezvous
    /// with a free worker.
    pub fn new(worker_count: usize, queue_capacity: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(Error::InvalidWorkerCount);
        }

        let (tx, rx) = bounded(queue_capacity);
        Ok(Pool {
            worker_count,
            queue_capacity,
            result_capacity: 0,
            jobs: RwLock::new(Some(tx)),
            queue: rx,
            lifecycle: Mutex::new(Lifecycle::Created),
            started: Latch::new(),
            closed: Latch::new(),
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Buffer up to `capacity` results so workers do not wait on a slow
    /// consumer. The default is zero: every result is handed over directly.
    pub fn with_result_capacity(mut self, capacity: usize) -> Self {
        self.result_capacity = capacity;
        self
    }

    /// Spawn the workers and return the result channel.
    ///
    /// Workers stop pulling jobs once `ctx` is done. The channel is closed by
    /// [`Pool::shutdown`], never by cancellation alone.
    pub fn start(&self, ctx: Context) -> Result<Receiver<JobResult>> {
        let mut lifecycle = self.lock_lifecycle();
        match *lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Running { .. } => return Err(Error::AlreadyStarted),
            Lifecycle::Draining | Lifecycle::Terminated => return Err(Error::ShutDown),
        }

        let (tx, rx) = bounded(self.result_capacity);
        let mut workers = Vec::with_capacity(self.worker_count);
        for id in 0..self.worker_count {
            let live = LiveGuard::new(Arc::clone(&self.live));
            match Worker::spawn(id, self.queue.clone(), tx.clone(), ctx.clone(), live) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // The pool is unusable; close the queue so the workers
                    // spawned so far run out of jobs and exit.
                    self.closed.fire();
                    drop(self.close_queue());
                    drop(tx);
                    drop(rx);
                    for worker in workers {
                        worker.join();
                    }
                    *lifecycle = Lifecycle::Terminated;
                    return Err(Error::Spawn(e));
                }
            }
        }

        info!(
            "pool started: {} workers, queue capacity {}",
            self.worker_count, self.queue_capacity
        );
        *lifecycle = Lifecycle::Running {
            ctx,
            workers,
            results: tx,
        };
        self.started.fire();
        Ok(rx)
    }

    /// Queue a job, blocking while the queue is full.
    ///
    /// Safe to call from many threads at once. Jobs submitted before
    /// [`Pool::start`] wait in the queue. Returns [`Error::ShutDown`] once
    /// shutdown has begun and [`Error::Cancelled`] when the pool's context is
    /// done before the job could be queued; in both cases the job is dropped.
    /// A submit already blocked on a full queue also wakes up with these
    /// errors.
    pub fn submit(&self, job: Job) -> Result<()> {
        loop {
            let ctx = match &*self.lock_lifecycle() {
                Lifecycle::Created => None,
                Lifecycle::Running { ctx, .. } => Some(ctx.clone()),
                Lifecycle::Draining | Lifecycle::Terminated => return Err(Error::ShutDown),
            };

            let sender = {
                let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
                match jobs.as_ref() {
                    Some(sender) => sender.clone(),
                    None => return Err(Error::ShutDown),
                }
            };

            let ctx = match ctx {
                Some(ctx) => ctx,
                None => {
                    // Not started yet: block until there is room, the pool
                    // starts (then retry under its context) or shuts down.
                    let mut sel = Select::new();
                    let send = sel.send(&sender);
                    let started = sel.recv(self.started.fired());
                    sel.recv(self.closed.fired());
                    let oper = sel.select();
                    match oper.index() {
                        i if i == send => {
                            return oper.send(&sender, job).map_err(|_| Error::ShutDown)
                        }
                        i if i == started => {
                            let _ = oper.recv(self.started.fired());
                            continue;
                        }
                        _ => {
                            let _ = oper.recv(self.closed.fired());
                            return Err(Error::ShutDown);
                        }
                    }
                }
            };

            if let Some(reason) = ctx.reason() {
                return Err(Error::Cancelled(reason));
            }
            let expiry = ctx.expiry();
            return select! {
                send(sender, job) -> res => res.map_err(|_| Error::ShutDown),
                recv(ctx.done()) -> _ => Err(Error::Cancelled(Cancelled::Explicit)),
                recv(expiry) -> _ => Err(Error::Cancelled(Cancelled::DeadlineExceeded)),
                recv(self.closed.fired()) -> _ => Err(Error::ShutDown),
            };
        }
    }

    /// Close the queue, wait for the workers to drain it, then close the
    /// result channel.
    ///
    /// When this returns every worker thread has exited. Jobs still queued
    /// after the context was cancelled are dropped without a result. A second
    /// call returns [`Error::ShutDown`].
    pub fn shutdown(&self) -> Result<()> {
        let previous = {
            let mut lifecycle = self.lock_lifecycle();
            if let Lifecycle::Draining | Lifecycle::Terminated = *lifecycle {
                return Err(Error::ShutDown);
            }
            mem::replace(&mut *lifecycle, Lifecycle::Draining)
        };

        self.closed.fire();
        drop(self.close_queue());

        if let Lifecycle::Running {
            workers, results, ..
        } = previous
        {
            info!("pool draining {} workers", workers.len());
            for worker in workers {
                worker.join();
            }
            drop(results);
        }

        *self.lock_lifecycle() = Lifecycle::Terminated;
        info!("pool terminated");
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.lock_lifecycle().state()
    }

    /// Number of workers.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Number of jobs the queue holds before `submit` blocks.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Worker threads that have been spawned and not yet exited.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn close_queue(&self) -> Option<Sender<Job>> {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Dropping a running pool closes the queue and joins the workers, so the
/// result receiver must be drained or dropped for the drop to return.
impl Drop for Pool {
    fn drop(&mut self) {
        let lifecycle = mem::replace(
            self.lifecycle
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
            Lifecycle::Terminated,
        );
        self.closed.fire();
        drop(
            self.jobs
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        if let Lifecycle::Running {
            workers, results, ..
        } = lifecycle
        {
            for worker in workers {
                worker.join();
            }
            drop(results);
        }
    }
}
