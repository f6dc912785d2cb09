//! A fixed-size pool of OS threads that maps one function over a batch of
//! inputs, with at-most-once dispatch per input and worker failures carried
//! back to the caller as ordinary errors.

mod error;
mod failure;
mod handle;
mod pool;
mod task;
mod task_queue;
mod worker;

pub use error::PoolError;
pub use failure::{FailureCause, WorkerFailure};
pub use pool::{CloseMode, FixedPool};
pub use task::{IntoArgs, Outcome, TaskFn};
