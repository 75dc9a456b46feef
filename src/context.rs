//! Cooperative cancellation shared between the pool, its workers and the
//! generator.
//!
//! A [`Context`] is cancelled either explicitly through [`Context::cancel`] or
//! implicitly once its deadline passes. Blocking code observes it by selecting
//! on [`Context::done`] and [`Context::expiry`] next to its own channels:
//!
//! ```rust
//! use crossbeam_channel::{bounded, select};
//! use volley::Context;
//!
//! let ctx = Context::new();
//! let (_tx, rx) = bounded::<u32>(0);
//! ctx.cancel();
//!
//! select! {
//!     recv(rx) -> _ => unreachable!(),
//!     recv(ctx.done()) -> _ => {}
//!     recv(ctx.expiry()) -> _ => unreachable!(),
//! }
//! assert!(ctx.is_done());
//! ```

use crossbeam_channel::{at, bounded, never, Receiver, Sender};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Why a [`Context`] is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancelled {
    /// `cancel` was called
    Explicit,
    /// The deadline passed
    DeadlineExceeded,
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cancelled::Explicit => write!(f, "context cancelled"),
            Cancelled::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

/// Cancellation handle. Clones share the same state.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    // Dropping the sender disconnects `done`, which wakes every receiver.
    cancel: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is only done once `cancel` is called.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A context that is done after `timeout` has elapsed, or on `cancel`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Some(Instant::now() + timeout))
    }

    /// A context that is done at `deadline`, or on `cancel`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    fn build(deadline: Option<Instant>) -> Self {
        let (tx, rx) = bounded(0);
        Context {
            inner: Arc::new(Inner {
                cancel: Mutex::new(Some(tx)),
                done: rx,
                deadline,
            }),
        }
    }

    /// Cancel the context. Calling it again has no effect.
    pub fn cancel(&self) {
        let mut cancel = match self.inner.cancel.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        drop(cancel.take());
    }

    /// Whether the context was cancelled or its deadline has passed.
    pub fn is_done(&self) -> bool {
        self.reason().is_some()
    }

    /// The reason the context is done, if it is.
    pub fn reason(&self) -> Option<Cancelled> {
        if self.is_cancelled() {
            return Some(Cancelled::Explicit);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Cancelled::DeadlineExceeded),
            _ => None,
        }
    }

    fn is_cancelled(&self) -> bool {
        match self.inner.cancel.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    /// The deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Ready once `cancel` has been called. Nothing is ever sent on it;
    /// receivers observe the disconnection.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }

    /// Fires once at the deadline. Never fires when there is no deadline.
    pub fn expiry(&self) -> Receiver<Instant> {
        match self.inner.deadline {
            Some(deadline) => at(deadline),
            None => never(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("reason", &self.reason())
            .finish()
    }
}
