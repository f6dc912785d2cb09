use crate::task::Outcome;

use kanal::{Receiver, ReceiveError, SendError, Sender};

/// Sequence number of the batch a task belongs to. Workers echo it back
/// with the outcome so the controller can tell its own results apart.
pub(crate) type BatchId = u64;

/// What travels down the task channel.
#[derive(Debug, PartialEq)]
pub(crate) enum Message<Args> {
  /// One invocation's argument tuple, tagged with its batch.
  Task(BatchId, Args),
  /// Tells exactly one worker to leave its loop.
  Stop,
}

/// A bounded, multi-consumer FIFO of tasks.
///
/// The controller is the only producer. Every worker holds a clone of the
/// consumer, so each task is taken by exactly one worker.
pub(crate) struct TaskQueue<Args> {
  tx: Sender<Message<Args>>,
  rx: Receiver<Message<Args>>,
}

impl<Args> TaskQueue<Args> {
  /// Creates a new `TaskQueue` with a specified capacity (at least one slot).
  pub(crate) fn new(capacity: usize) -> Self {
    let (tx, rx) = kanal::bounded(capacity.max(1));
    Self { tx, rx }
  }

  /// Splits the queue into its producer and consumer halves.
  pub(crate) fn split(self) -> (QueueProducer<Args>, QueueConsumer<Args>) {
    (QueueProducer { tx: self.tx }, QueueConsumer { rx: self.rx })
  }
}

/// The controller's end of the task channel.
pub(crate) struct QueueProducer<Args> {
  tx: Sender<Message<Args>>,
}

/// A worker's end of the task channel. Clone one per worker.
pub(crate) struct QueueConsumer<Args> {
  rx: Receiver<Message<Args>>,
}

impl<Args> Clone for QueueConsumer<Args> {
  fn clone(&self) -> Self {
    Self { rx: self.rx.clone() }
  }
}

impl<Args> QueueProducer<Args> {
  /// Enqueues one task, blocking while the queue is at capacity.
  pub(crate) fn send(&self, batch: BatchId, args: Args) -> Result<(), SendError> {
    self.tx.send(Message::Task(batch, args))
  }

  pub(crate) async fn send_async(&self, batch: BatchId, args: Args) -> Result<(), SendError> {
    self.tx.as_async().send(Message::Task(batch, args)).await
  }

  /// Enqueues one sentinel.
  pub(crate) fn send_stop(&self) -> Result<(), SendError> {
    self.tx.send(Message::Stop)
  }

  /// Returns the number of messages waiting in the channel.
  pub(crate) fn len(&self) -> usize {
    self.tx.len()
  }
}

impl<Args> QueueConsumer<Args> {
  /// Blocks until a task or a sentinel is available.
  pub(crate) fn recv(&self) -> Result<Message<Args>, ReceiveError> {
    self.rx.recv()
  }
}

/// Creates the result channel of one pool generation.
///
/// It is unbounded: the controller only starts draining once the last task
/// of a batch is queued, so workers must never block on a result push.
pub(crate) fn result_channel<R, E>() -> (ResultSender<R, E>, ResultReceiver<R, E>) {
  let (tx, rx) = kanal::unbounded();
  (ResultSender { tx }, ResultReceiver { rx })
}

/// A worker's end of the result channel.
pub(crate) struct ResultSender<R, E> {
  tx: Sender<(BatchId, Outcome<R, E>)>,
}

impl<R, E> Clone for ResultSender<R, E> {
  fn clone(&self) -> Self {
    Self { tx: self.tx.clone() }
  }
}

/// The controller's end of the result channel.
pub(crate) struct ResultReceiver<R, E> {
  rx: Receiver<(BatchId, Outcome<R, E>)>,
}

impl<R, E> ResultSender<R, E> {
  pub(crate) fn send(&self, batch: BatchId, outcome: Outcome<R, E>) -> Result<(), SendError> {
    self.tx.send((batch, outcome))
  }
}

impl<R, E> ResultReceiver<R, E> {
  pub(crate) fn recv(&self) -> Result<(BatchId, Outcome<R, E>), ReceiveError> {
    self.rx.recv()
  }

  pub(crate) async fn recv_async(&self) -> Result<(BatchId, Outcome<R, E>), ReceiveError> {
    self.rx.as_async().recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;
  use std::thread;

  #[test]
  fn test_queue_send_recv_in_fifo_order() {
    let (producer, consumer) = TaskQueue::<(u32,)>::new(4).split();

    producer.send(0, (1,)).unwrap();
    producer.send(1, (2,)).unwrap();
    producer.send_stop().unwrap();
    assert_eq!(producer.len(), 3);

    assert_eq!(consumer.recv().unwrap(), Message::Task(0, (1,)));
    assert_eq!(consumer.recv().unwrap(), Message::Task(1, (2,)));
    assert_eq!(consumer.recv().unwrap(), Message::Stop);
    assert_eq!(producer.len(), 0);
  }

  #[test]
  fn test_zero_capacity_is_clamped_to_one_slot() {
    let (producer, consumer) = TaskQueue::<(u8,)>::new(0).split();

    // A rendezvous channel would block here with no consumer waiting.
    producer.send(0, (9,)).unwrap();
    assert_eq!(producer.len(), 1);
    assert_eq!(consumer.recv().unwrap(), Message::Task(0, (9,)));
  }

  #[test]
  fn test_competing_consumers_take_each_task_once() {
    let (producer, consumer) = TaskQueue::<(u64,)>::new(1).split();
    let (result_tx, result_rx) = result_channel::<u64, std::io::Error>();
    let workers = 4;
    let tasks: u64 = 200;

    let handles: Vec<_> = (0..workers)
      .map(|_| {
        let consumer = consumer.clone();
        let result_tx = result_tx.clone();
        thread::spawn(move || {
          let mut stops = 0;
          loop {
            match consumer.recv().unwrap() {
              Message::Task(batch, (n,)) => result_tx.send(batch, Ok(n)).unwrap(),
              Message::Stop => {
                stops += 1;
                break;
              }
            }
          }
          stops
        })
      })
      .collect();
    drop(consumer);
    drop(result_tx);

    for n in 0..tasks {
      producer.send(7, (n,)).unwrap();
    }
    let received: HashSet<u64> = (0..tasks)
      .map(|_| {
        let (batch, outcome) = result_rx.recv().unwrap();
        assert_eq!(batch, 7);
        outcome.unwrap()
      })
      .collect();
    assert_eq!(received, (0..tasks).collect::<HashSet<_>>());

    for _ in 0..workers {
      producer.send_stop().unwrap();
    }
    let total_stops: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total_stops, workers);

    // Every worker dropped its sender, so the result channel is now closed.
    assert!(result_rx.recv().is_err());
  }

  #[test]
  fn test_send_fails_once_all_consumers_are_gone() {
    let (producer, consumer) = TaskQueue::<(u8,)>::new(2).split();
    drop(consumer);
    assert!(producer.send(0, (1,)).is_err());
    assert!(producer.send_stop().is_err());
  }

  #[tokio::test]
  async fn test_async_halves_share_the_channel() {
    let (producer, consumer) = TaskQueue::<(String,)>::new(2).split();
    let (result_tx, result_rx) = result_channel::<usize, std::io::Error>();

    producer.send_async(3, ("abc".to_string(),)).await.unwrap();
    let worker = thread::spawn(move || {
      if let Message::Task(batch, (s,)) = consumer.recv().unwrap() {
        result_tx.send(batch, Ok(s.len())).unwrap();
      }
    });

    let (batch, outcome) = result_rx.recv_async().await.unwrap();
    assert_eq!(batch, 3);
    assert_eq!(outcome.unwrap(), 3);
    worker.join().unwrap();
  }
}
