#![deny(missing_docs)]
//! A bounded worker pool with cooperative cancellation, plus the rate-paced
//! generator and statistics used to drive an HTTP load test with it.
pub use context::{Cancelled, Context};
pub use err::{Error, Result};
pub use generator::Generator;
pub use job::{BoxError, Job, JobError, JobResult, Work};
pub use pool::{Pool, State};
pub use stats::{Aggregator, LatencyStats, Summary};

mod context;
mod generator;
mod pool;

pub mod err;
pub mod http;
pub mod job;
pub mod load;
pub mod reorder;
pub mod stats;
