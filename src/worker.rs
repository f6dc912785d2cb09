use crate::failure::WorkerFailure;
use crate::task::{BoundFn, Outcome};
use crate::task_queue::{Message, QueueConsumer, ResultSender};

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

/// Body of one worker thread.
///
/// Pulls tasks until it dequeues a sentinel. Every consumed task yields
/// exactly one pushed outcome; a failing or panicking function never ends
/// the loop.
pub(crate) fn run_worker_loop<Args, R, E>(
  pool_name: Arc<str>,
  index: usize,
  func: BoundFn<Args, R, E>,
  tasks: QueueConsumer<Args>,
  results: ResultSender<R, E>,
) {
  info!(pool_name = %pool_name, worker = index, "Worker loop started.");
  let mut processed: u64 = 0;

  loop {
    let (batch, args) = match tasks.recv() {
      Ok(Message::Task(batch, args)) => (batch, args),
      Ok(Message::Stop) => {
        debug!(pool_name = %pool_name, worker = index, "Sentinel received. Worker loop terminating.");
        break;
      }
      Err(receive_error) => {
        warn!(
          pool_name = %pool_name,
          worker = index,
          "Task queue closed before a sentinel arrived ({}). Worker loop terminating.",
          receive_error
        );
        break;
      }
    };

    let outcome = execute(&pool_name, index, &func, args);
    processed += 1;

    if results.send(batch, outcome).is_err() {
      warn!(
        pool_name = %pool_name,
        worker = index,
        "Result receiver was dropped. Task outcome lost; worker loop terminating."
      );
      break;
    }
  }

  info!(pool_name = %pool_name, worker = index, processed, "Worker loop stopped.");
}

fn execute<Args, R, E>(pool_name: &Arc<str>, index: usize, func: &BoundFn<Args, R, E>, args: Args) -> Outcome<R, E> {
  match panic::catch_unwind(AssertUnwindSafe(|| func(args))) {
    Ok(Ok(value)) => {
      trace!(pool_name = %pool_name, worker = index, "Task executed successfully.");
      Ok(value)
    }
    Ok(Err(task_error)) => {
      debug!(pool_name = %pool_name, worker = index, "Task returned an error. Wrapping it for the controller.");
      Err(WorkerFailure::from_error(pool_name.clone(), index, task_error))
    }
    Err(panic_payload) => {
      error!(pool_name = %pool_name, worker = index, "Task panicked during execution.");
      Err(WorkerFailure::from_panic(pool_name.clone(), index, panic_payload))
    }
  }
}
