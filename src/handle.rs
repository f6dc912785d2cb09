use crate::task::BoundFn;
use crate::task_queue::{QueueConsumer, ResultSender};
use crate::worker::run_worker_loop;

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info_span, trace};

/// Owns one worker thread of a pool generation.
#[derive(Debug)]
pub(crate) struct WorkerHandle {
  index: usize,
  thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
  /// Spawns a named OS thread running the worker loop.
  pub(crate) fn spawn<Args, R, E>(
    pool_name: Arc<str>,
    index: usize,
    func: BoundFn<Args, R, E>,
    tasks: QueueConsumer<Args>,
    results: ResultSender<R, E>,
  ) -> io::Result<Self>
  where
    Args: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
  {
    let thread_name = format!("{}-worker-{}", pool_name, index);
    let thread = thread::Builder::new().name(thread_name).spawn(move || {
      let _span = info_span!("fixed_pool_worker", pool_name = %pool_name, worker = index).entered();
      run_worker_loop(pool_name, index, func, tasks, results);
    })?;

    Ok(Self {
      index,
      thread: Some(thread),
    })
  }

  pub(crate) fn index(&self) -> usize {
    self.index
  }

  /// Waits for the thread to exit. The worker must already have a sentinel
  /// queued. Joining twice is a no-op.
  pub(crate) fn join(&mut self, pool_name: &str) {
    if let Some(thread) = self.thread.take() {
      match thread.join() {
        Ok(()) => trace!(pool_name = %pool_name, worker = self.index, "Worker thread joined."),
        Err(_) => error!(
          pool_name = %pool_name,
          worker = self.index,
          "Worker thread panicked outside the task boundary."
        ),
      }
    }
  }

  /// Lets the thread run to completion on its own.
  pub(crate) fn detach(mut self) {
    // Dropping a std JoinHandle detaches the thread.
    drop(self.thread.take());
  }
}
