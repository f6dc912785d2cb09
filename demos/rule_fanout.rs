use fixed_pool::{CloseMode, FixedPool};
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, thiserror::Error)]
#[error("rule evaluation failed: {0}")]
struct RuleError(String);

// Carries the recipient id through the task so results can be paired up again.
fn evaluate(recipient_id: u32, topic: &'static str) -> Result<(u32, bool), RuleError> {
  std::thread::sleep(Duration::from_millis(20));
  Ok((recipient_id, recipient_id % 3 == 0 && topic.starts_with("org.")))
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::INFO)
    .with_target(false)
    .init();
  info!("--- Rule Fan-out Example ---");

  let mut pool: FixedPool<(u32, &'static str), (u32, bool), RuleError> =
    FixedPool::with_capacity(4, 4, CloseMode::Join, "rule_pool");
  pool.target(evaluate).expect("Failed to target pool");

  let recipients: Vec<(u32, &'static str)> = (0..16).map(|id| (id, "org.fedora.build")).collect();
  let start = Instant::now();
  let mut matches: Vec<u32> = pool
    .apply(recipients)
    .expect("Rule evaluation failed")
    .into_iter()
    .filter_map(|(id, matched)| matched.then_some(id))
    .collect();
  matches.sort_unstable();
  info!("Matched recipients {:?} in {:?} with {} workers.", matches, start.elapsed(), pool.size());

  info!("Retargeting pool on a stricter rule.");
  pool
    .target(|recipient_id: u32, _topic: &'static str| -> Result<(u32, bool), RuleError> {
      Ok((recipient_id, recipient_id == 0))
    })
    .expect("Failed to retarget pool");
  let strict = pool.apply(vec![(0, "org.a"), (1, "org.b")]).expect("Rule evaluation failed");
  info!("Strict rule results (unordered): {:?}", strict);

  pool.close();
  info!("--- Rule Fan-out Example End ---");
}
