use crate::error::PoolError;
use crate::failure::WorkerFailure;
use crate::handle::WorkerHandle;
use crate::task::{bind, IntoArgs, Outcome, TaskFn};
use crate::task_queue::{result_channel, BatchId, QueueProducer, ResultReceiver, TaskQueue};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

lazy_static::lazy_static! {
  static ref NEXT_POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Defines whether `close` waits for the worker threads to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseMode {
  /// Queue the sentinels, then join every worker thread.
  /// Use when the caller owns the spawned threads.
  #[default]
  Join,
  /// Queue the sentinels and return immediately.
  /// Each worker exits on its own once it dequeues its sentinel.
  Detach,
}

/// The channels and threads created by one `target()` call.
struct Generation<Args, R, E> {
  producer: QueueProducer<Args>,
  results: ResultReceiver<R, E>,
  workers: Vec<WorkerHandle>,
  /// Id handed to the most recent batch.
  last_batch: BatchId,
}

impl<Args, R, E> Generation<Args, R, E> {
  fn next_batch(&mut self) -> BatchId {
    self.last_batch += 1;
    self.last_batch
  }
}

/// A fixed-size pool of OS threads that maps one function over batches of
/// inputs.
///
/// The pool starts untargeted. [`target`](Self::target) binds it to a
/// function and spawns `size` workers; [`apply`](Self::apply) runs a batch
/// and blocks until every item has produced a result;
/// [`close`](Self::close) stops the workers. Retargeting closes the current
/// workers first.
///
/// Results come back in completion order, not submission order. Callers
/// that need to pair results with inputs should carry an id inside the
/// argument tuple.
pub struct FixedPool<Args, R, E>
where
  Args: Send + 'static,
  R: Send + 'static,
  E: std::error::Error + Send + 'static,
{
  pool_name: Arc<str>,
  size: usize,
  task_capacity: usize,
  close_mode: CloseMode,
  generation: Option<Generation<Args, R, E>>,
}

impl<Args, R, E> fmt::Debug for FixedPool<Args, R, E>
where
  Args: Send + 'static,
  R: Send + 'static,
  E: std::error::Error + Send + 'static,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FixedPool")
      .field("pool_name", &self.pool_name)
      .field("size", &self.size)
      .field("task_capacity", &self.task_capacity)
      .field("close_mode", &self.close_mode)
      .field("targeted", &self.targeted())
      .finish_non_exhaustive()
  }
}

impl<Args, R, E> FixedPool<Args, R, E>
where
  Args: Send + 'static,
  R: Send + 'static,
  E: std::error::Error + Send + 'static,
{
  /// Creates an untargeted pool of `size` workers with a generated name.
  pub fn new(size: usize) -> Self {
    let pool_id = NEXT_POOL_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    Self::with_name(size, &format!("fixed-pool-{}", pool_id))
  }

  /// Creates an untargeted pool of `size` workers. The task queue holds
  /// `size` tasks and `close` joins the workers.
  pub fn with_name(size: usize, pool_name: &str) -> Self {
    Self::with_capacity(size, size, CloseMode::Join, pool_name)
  }

  /// Creates an untargeted pool with every setting explicit.
  ///
  /// `size` and `task_capacity` are clamped to at least one. A full task
  /// queue blocks `apply` until a worker takes a task.
  pub fn with_capacity(size: usize, task_capacity: usize, close_mode: CloseMode, pool_name: &str) -> Self {
    let size = size.max(1);
    let task_capacity = task_capacity.max(1);
    debug!(pool_name = %pool_name, size, task_capacity, ?close_mode, "Initializing fixed pool.");
    Self {
      pool_name: Arc::from(pool_name),
      size,
      task_capacity,
      close_mode,
      generation: None,
    }
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  /// Number of workers spawned by each `target()`.
  pub fn size(&self) -> usize {
    self.size
  }

  pub fn close_mode(&self) -> CloseMode {
    self.close_mode
  }

  /// True while the pool is bound to a function and has live workers.
  pub fn targeted(&self) -> bool {
    self
      .generation
      .as_ref()
      .is_some_and(|generation| !generation.workers.is_empty())
  }

  /// Returns the current number of tasks waiting in the task queue.
  pub fn queued_task_count(&self) -> usize {
    self
      .generation
      .as_ref()
      .map_or(0, |generation| generation.producer.len())
  }

  /// Binds the pool to `func` and spawns `size` worker threads.
  ///
  /// A targeted pool is closed first, so workers never accumulate. Each
  /// call opens a fresh task and result channel; workers left over from a
  /// detached close can never see tasks meant for `func`.
  ///
  /// # Errors
  /// Returns `PoolError::SpawnFailed` if a worker thread cannot be created.
  /// The threads already started are stopped and the pool stays untargeted.
  pub fn target<F>(&mut self, func: F) -> Result<(), PoolError<E>>
  where
    F: TaskFn<Args, Output = R, Error = E>,
  {
    info!(pool_name = %self.pool_name, "Pool targeting {}.", std::any::type_name::<F>());
    if self.targeted() {
      info!(pool_name = %self.pool_name, "Pool already targeted. Closing current workers before retargeting.");
      self.close();
    }

    let func = bind(func);
    let (producer, consumer) = TaskQueue::new(self.task_capacity).split();
    let (result_tx, result_rx) = result_channel();

    let mut workers = Vec::with_capacity(self.size);
    for index in 0..self.size {
      match WorkerHandle::spawn(
        self.pool_name.clone(),
        index,
        func.clone(),
        consumer.clone(),
        result_tx.clone(),
      ) {
        Ok(handle) => workers.push(handle),
        Err(spawn_error) => {
          error!(pool_name = %self.pool_name, worker = index, "Failed to spawn worker thread: {}", spawn_error);
          for handle in &workers {
            if producer.send_stop().is_err() {
              debug!(
                pool_name = %self.pool_name,
                worker = handle.index(),
                "Task queue already closed; worker has exited."
              );
            }
          }
          for handle in workers {
            handle.detach();
          }
          return Err(PoolError::SpawnFailed(spawn_error.to_string()));
        }
      }
    }

    self.generation = Some(Generation {
      producer,
      results: result_rx,
      workers,
      last_batch: 0,
    });
    info!(pool_name = %self.pool_name, size = self.size, "Pool targeting done.");
    Ok(())
  }

  /// Runs `items` through the targeted function and returns every result.
  ///
  /// Each item is normalized to an argument tuple and queued exactly once;
  /// the call then blocks until as many results as items have arrived.
  /// Results are **unordered**.
  ///
  /// # Errors
  /// Returns `PoolError::NotTargeted` before any task is queued if the pool
  /// has no function. If any task failed, the whole batch is still drained
  /// and the first `PoolError::Worker` in collection order is returned; the
  /// batch's other results are discarded.
  pub fn apply<I, T>(&mut self, items: I) -> Result<Vec<R>, PoolError<E>>
  where
    I: IntoIterator<Item = T>,
    T: IntoArgs<Args>,
  {
    let outcomes = self.apply_each(items)?;
    settle_batch(&self.pool_name, outcomes)
  }

  /// Like [`apply`](Self::apply), but returns every outcome instead of
  /// failing on the first worker failure.
  ///
  /// # Errors
  /// Only pool-level errors; task failures are returned in the vector.
  pub fn apply_each<I, T>(&mut self, items: I) -> Result<Vec<Outcome<R, E>>, PoolError<E>>
  where
    I: IntoIterator<Item = T>,
    T: IntoArgs<Args>,
  {
    let pool_name = &self.pool_name;
    let generation = match self.generation.as_mut() {
      Some(generation) if !generation.workers.is_empty() => generation,
      _ => {
        warn!(pool_name = %pool_name, "Apply: pool is not yet targeted.");
        return Err(PoolError::NotTargeted(pool_name.to_string()));
      }
    };

    let batch = generation.next_batch();
    let mut submitted = 0usize;
    for item in items {
      if generation.producer.send(batch, item.into_args()).is_err() {
        error!(pool_name = %pool_name, batch, "Apply: task queue has no live worker.");
        return Err(PoolError::QueueSendChannelClosed);
      }
      submitted += 1;
    }
    debug!(pool_name = %pool_name, batch, submitted, "Batch queued. Draining results.");

    let mut outcomes = Vec::with_capacity(submitted);
    let mut stale = 0usize;
    while outcomes.len() < submitted {
      match generation.results.recv() {
        Ok((tag, outcome)) if tag == batch => outcomes.push(outcome),
        Ok((tag, _stale_outcome)) => {
          trace!(pool_name = %pool_name, batch = tag, "Dropping result of an interrupted batch.");
          stale += 1;
        }
        Err(receive_error) => {
          error!(pool_name = %pool_name, batch, "Apply: result channel closed while draining: {}", receive_error);
          return Err(PoolError::ResultChannelClosed(submitted - outcomes.len()));
        }
      }
    }
    log_drained(pool_name, batch, outcomes.len(), stale);
    Ok(outcomes)
  }

  /// Async form of [`apply`](Self::apply). Awaits channel capacity and
  /// results instead of blocking the calling thread.
  ///
  /// Dropping the future mid-batch is safe. Every task carries the id of its
  /// batch and workers echo it back, so later `apply*` calls drop whatever
  /// the abandoned batch still produces, even a task that was handed over
  /// while the future was being dropped.
  pub async fn apply_async<I, T>(&mut self, items: I) -> Result<Vec<R>, PoolError<E>>
  where
    I: IntoIterator<Item = T>,
    T: IntoArgs<Args>,
  {
    let outcomes = self.apply_each_async(items).await?;
    settle_batch(&self.pool_name, outcomes)
  }

  /// Async form of [`apply_each`](Self::apply_each).
  pub async fn apply_each_async<I, T>(&mut self, items: I) -> Result<Vec<Outcome<R, E>>, PoolError<E>>
  where
    I: IntoIterator<Item = T>,
    T: IntoArgs<Args>,
  {
    let pool_name = &self.pool_name;
    let generation = match self.generation.as_mut() {
      Some(generation) if !generation.workers.is_empty() => generation,
      _ => {
        warn!(pool_name = %pool_name, "Apply: pool is not yet targeted.");
        return Err(PoolError::NotTargeted(pool_name.to_string()));
      }
    };

    let batch = generation.next_batch();
    let mut submitted = 0usize;
    for item in items {
      if generation.producer.send_async(batch, item.into_args()).await.is_err() {
        error!(pool_name = %pool_name, batch, "Apply: task queue has no live worker.");
        return Err(PoolError::QueueSendChannelClosed);
      }
      submitted += 1;
    }
    debug!(pool_name = %pool_name, batch, submitted, "Batch queued. Draining results.");

    let mut outcomes = Vec::with_capacity(submitted);
    let mut stale = 0usize;
    while outcomes.len() < submitted {
      match generation.results.recv_async().await {
        Ok((tag, outcome)) if tag == batch => outcomes.push(outcome),
        Ok((tag, _stale_outcome)) => {
          trace!(pool_name = %pool_name, batch = tag, "Dropping result of an interrupted batch.");
          stale += 1;
        }
        Err(receive_error) => {
          error!(pool_name = %pool_name, batch, "Apply: result channel closed while draining: {}", receive_error);
          return Err(PoolError::ResultChannelClosed(submitted - outcomes.len()));
        }
      }
    }
    log_drained(pool_name, batch, outcomes.len(), stale);
    Ok(outcomes)
  }

  /// Stops the workers using the pool's configured [`CloseMode`].
  ///
  /// Closing an untargeted pool is a no-op.
  pub fn close(&mut self) {
    self.close_with(self.close_mode);
  }

  /// Queues one sentinel per worker and marks the pool untargeted.
  ///
  /// With `CloseMode::Join` this waits for every worker thread to exit;
  /// with `CloseMode::Detach` it returns at once.
  pub fn close_with(&mut self, mode: CloseMode) {
    let Some(mut generation) = self.generation.take() else {
      warn!(pool_name = %self.pool_name, "No need to close pool. Not yet targeted.");
      return;
    };

    info!(pool_name = %self.pool_name, "Closing pool (mode: {:?}).", mode);

    for handle in &generation.workers {
      if generation.producer.send_stop().is_err() {
        debug!(
          pool_name = %self.pool_name,
          worker = handle.index(),
          "Task queue already closed; worker has exited."
        );
      }
    }

    match mode {
      CloseMode::Join => {
        debug!(pool_name = %self.pool_name, "Waiting on workers to exit.");
        for handle in &mut generation.workers {
          handle.join(&self.pool_name);
        }
      }
      CloseMode::Detach => {
        debug!(pool_name = %self.pool_name, "Detaching workers. Each exits on its sentinel.");
        for handle in generation.workers {
          handle.detach();
        }
      }
    }
    info!(pool_name = %self.pool_name, "Pool closed.");
  }
}

impl<Args, R, E> Drop for FixedPool<Args, R, E>
where
  Args: Send + 'static,
  R: Send + 'static,
  E: std::error::Error + Send + 'static,
{
  fn drop(&mut self) {
    if self.generation.is_some() {
      info!(
        pool_name = %self.pool_name,
        "FixedPool dropped while targeted. Initiating implicit detached close."
      );
      self.close_with(CloseMode::Detach);
    } else {
      trace!(pool_name = %self.pool_name, "Drop: pool not targeted. Nothing to close.");
    }
  }
}

fn log_drained(pool_name: &str, batch: BatchId, drained: usize, stale: usize) {
  if stale > 0 {
    warn!(
      pool_name = %pool_name,
      batch,
      "Dropped {} result(s) left over from interrupted batches.",
      stale
    );
  }
  trace!(pool_name = %pool_name, batch, drained, "Batch drained.");
}

/// Collects a drained batch into plain results, or the first failure.
fn settle_batch<R, E>(pool_name: &str, outcomes: Vec<Outcome<R, E>>) -> Result<Vec<R>, PoolError<E>>
where
  E: std::error::Error + 'static,
{
  let mut values = Vec::with_capacity(outcomes.len());
  let mut first_failure: Option<WorkerFailure<E>> = None;
  let mut failures = 0usize;

  for outcome in outcomes {
    match outcome {
      Ok(value) => values.push(value),
      Err(failure) => {
        failures += 1;
        if first_failure.is_none() {
          first_failure = Some(failure);
        }
      }
    }
  }

  match first_failure {
    Some(failure) => {
      warn!(
        pool_name = %pool_name,
        failures,
        discarded = values.len(),
        "Batch failed: {}",
        failure
      );
      Err(PoolError::Worker(failure))
    }
    None => Ok(values),
  }
}
