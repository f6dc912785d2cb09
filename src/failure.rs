use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;

/// What went wrong inside the targeted function.
#[derive(Debug)]
pub enum FailureCause<E> {
  /// The function returned `Err`.
  Error(E),
  /// The function panicked; holds the panic message.
  Panic(String),
}

/// A failure that happened on a worker thread, carried back to the
/// controller as an ordinary result.
///
/// The original error value is kept intact, so callers can match on it or
/// take it back out with [`WorkerFailure::into_error`]. The trace text is the
/// backtrace captured by the worker when the failure was marshaled.
#[derive(Debug)]
pub struct WorkerFailure<E> {
  pool_name: Arc<str>,
  worker: usize,
  kind: &'static str,
  cause: FailureCause<E>,
  trace: String,
}

impl<E> WorkerFailure<E> {
  pub(crate) fn from_error(pool_name: Arc<str>, worker: usize, error: E) -> Self {
    Self {
      pool_name,
      worker,
      kind: std::any::type_name::<E>(),
      cause: FailureCause::Error(error),
      trace: Backtrace::force_capture().to_string(),
    }
  }

  pub(crate) fn from_panic(pool_name: Arc<str>, worker: usize, payload: Box<dyn Any + Send>) -> Self {
    Self {
      pool_name,
      worker,
      kind: "panic",
      cause: FailureCause::Panic(panic_message(payload.as_ref())),
      trace: Backtrace::force_capture().to_string(),
    }
  }

  /// Type name of the original error, or `"panic"`.
  pub fn kind(&self) -> &'static str {
    self.kind
  }

  pub fn cause(&self) -> &FailureCause<E> {
    &self.cause
  }

  /// The original error, if the function returned one rather than panicking.
  pub fn error(&self) -> Option<&E> {
    match &self.cause {
      FailureCause::Error(error) => Some(error),
      FailureCause::Panic(_) => None,
    }
  }

  pub fn into_error(self) -> Option<E> {
    match self.cause {
      FailureCause::Error(error) => Some(error),
      FailureCause::Panic(_) => None,
    }
  }

  pub fn is_panic(&self) -> bool {
    matches!(self.cause, FailureCause::Panic(_))
  }

  /// Index of the worker that ran the failing task.
  pub fn worker(&self) -> usize {
    self.worker
  }

  pub fn pool_name(&self) -> &str {
    &self.pool_name
  }

  /// Formatted backtrace captured on the worker thread.
  pub fn trace(&self) -> &str {
    &self.trace
  }
}

impl<E: fmt::Display> fmt::Display for WorkerFailure<E> {
  /// `{}` gives the prefix and the original message; `{:#}` appends the trace.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "task failed in `{}` worker {}: ", self.pool_name, self.worker)?;
    match &self.cause {
      FailureCause::Error(error) => write!(f, "{}", error)?,
      FailureCause::Panic(message) => write!(f, "panicked: {}", message)?,
    }
    if f.alternate() && !self.trace.is_empty() {
      write!(f, "\n\nWorker trace:\n{}", self.trace)?;
    }
    Ok(())
  }
}

impl<E> std::error::Error for WorkerFailure<E>
where
  E: std::error::Error + 'static,
{
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match &self.cause {
      FailureCause::Error(error) => Some(error),
      FailureCause::Panic(_) => None,
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&'static str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "Box<dyn Any>".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::error::Error as _;

  #[derive(Debug, PartialEq)]
  struct ValueError(&'static str);

  impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.0)
    }
  }

  impl std::error::Error for ValueError {}

  #[test]
  fn test_error_failure_keeps_kind_and_message() {
    let failure = WorkerFailure::from_error(Arc::from("rules"), 3, ValueError("oh no!"));

    assert_eq!(failure.kind(), std::any::type_name::<ValueError>());
    assert_eq!(failure.worker(), 3);
    assert_eq!(failure.pool_name(), "rules");
    assert!(!failure.is_panic());
    assert_eq!(failure.error(), Some(&ValueError("oh no!")));

    let rendered = failure.to_string();
    assert!(rendered.starts_with("task failed in `rules` worker 3: "));
    assert!(rendered.contains("oh no!"));
    assert!(!rendered.contains("Worker trace"));

    assert_eq!(failure.into_error(), Some(ValueError("oh no!")));
  }

  #[test]
  fn test_alternate_display_appends_trace() {
    let failure = WorkerFailure::from_error(Arc::from("rules"), 0, ValueError("boom"));
    assert!(!failure.trace().is_empty());

    let rendered = format!("{:#}", failure);
    assert!(rendered.contains("boom"));
    assert!(rendered.contains("Worker trace:"));
  }

  #[test]
  fn test_source_is_original_error() {
    let failure = WorkerFailure::from_error(Arc::from("rules"), 0, ValueError("boom"));
    let source = failure.source().expect("error failures expose a source");
    assert_eq!(source.to_string(), "boom");
  }

  #[test]
  fn test_panic_payloads_become_messages() {
    let from_str = WorkerFailure::<ValueError>::from_panic(Arc::from("p"), 1, Box::new("static message"));
    assert!(from_str.is_panic());
    assert_eq!(from_str.kind(), "panic");
    assert!(from_str.to_string().contains("panicked: static message"));
    assert!(from_str.source().is_none());

    let from_string = WorkerFailure::<ValueError>::from_panic(Arc::from("p"), 1, Box::new(format!("code {}", 7)));
    assert!(from_string.to_string().contains("code 7"));

    let opaque = WorkerFailure::<ValueError>::from_panic(Arc::from("p"), 1, Box::new(42u8));
    assert!(opaque.to_string().contains("Box<dyn Any>"));
    assert!(opaque.into_error().is_none());
  }
}
