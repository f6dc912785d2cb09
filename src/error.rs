use crate::failure::WorkerFailure;

use thiserror::Error;

/// Errors that can occur within a `fixed_pool` pool.
///
/// `E` is the error type returned by the targeted function. Failures raised
/// inside a worker surface as [`PoolError::Worker`] once the whole batch has
/// been drained.
#[derive(Error, Debug)]
pub enum PoolError<E>
where
  E: std::error::Error + 'static,
{
  #[error("Pool `{0}` is not yet targeted: .target(fn) must be called before .apply(items)")]
  NotTargeted(String),

  #[error("Failed to spawn worker thread: {0}")]
  SpawnFailed(String),

  #[error("Pool's internal task queue has no live worker to receive tasks")]
  QueueSendChannelClosed,

  #[error("Result channel closed with {0} result(s) still outstanding (all workers exited)")]
  ResultChannelClosed(usize),

  #[error(transparent)]
  Worker(#[from] WorkerFailure<E>),
}

impl<E> PoolError<E>
where
  E: std::error::Error + 'static,
{
  /// Returns the wrapped worker failure, if this error came from the targeted function.
  pub fn worker_failure(&self) -> Option<&WorkerFailure<E>> {
    match self {
      PoolError::Worker(failure) => Some(failure),
      _ => None,
    }
  }
}
