use fixed_pool::{FixedPool, PoolError};
use tracing::info;

#[derive(Debug, thiserror::Error)]
enum RuleError {
  #[error("recipient `{0}` has no delivery address")]
  NoAddress(String),
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Task Failure Example ---");

  let mut pool: FixedPool<(String,), String, RuleError> = FixedPool::with_name(2, "failure_pool");

  pool
    .target(|recipient: String| -> Result<String, RuleError> {
      if recipient.is_empty() || recipient == "ghost" {
        return Err(RuleError::NoAddress(recipient));
      }
      if recipient == "chaos" {
        panic!("This rule is designed to panic!");
      }
      Ok(format!("{}@example.org", recipient))
    })
    .expect("Failed to target pool");

  let batch = vec!["alice".to_string(), "ghost".to_string(), "bob".to_string()];
  match pool.apply(batch) {
    Ok(addresses) => info!("Batch completed with UNEXPECTED result: {:?}", addresses),
    Err(PoolError::Worker(failure)) => {
      info!("Batch correctly failed with kind `{}`: {}", failure.kind(), failure);
      info!("Original error recovered: {:?}", failure.into_error());
    }
    Err(e) => info!("Batch resulted in unexpected error: {:?}", e),
  }

  let batch = vec!["chaos".to_string(), "carol".to_string()];
  match pool.apply_each(batch) {
    Ok(outcomes) => {
      for outcome in outcomes {
        match outcome {
          Ok(address) => info!("Delivered to {}", address),
          Err(failure) => info!("Worker {} failed (panic: {}): {:#}", failure.worker(), failure.is_panic(), failure),
        }
      }
    }
    Err(e) => info!("Batch resulted in unexpected error: {:?}", e),
  }

  info!("Closing pool.");
  pool.close();
  info!("--- Task Failure Example End ---");
}
