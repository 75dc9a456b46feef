//! err

use crate::context::Cancelled;
use std::io;
use thiserror::Error;

/// Error
#[derive(Error, Debug)]
pub enum Error {
    /// A pool needs at least one worker
    #[error("worker count must be at least 1")]
    InvalidWorkerCount,

    /// `start` was called on a pool that is not in the created state
    #[error("pool already started")]
    AlreadyStarted,

    /// The pool is draining or terminated
    #[error("pool is shut down")]
    ShutDown,

    /// The pool's context was cancelled before the job was queued
    #[error("{0}")]
    Cancelled(Cancelled),

    /// Spawning a worker thread failed
    #[error("spawn worker error: {0}")]
    Spawn(#[source] io::Error),

    /// Building the http client failed
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// json serialize error
    #[error("serialize json error: {0:?}")]
    Json(#[from] serde_json::Error),
}

/// Alias for a Result with the error type Error.
pub type Result<T> = std::result::Result<T, Error>;
