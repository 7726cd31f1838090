//! Bounded polling for eventually-consistent external state.
//!
//! The only retry loop in the tool. Command failures are never retried here;
//! predicates are state probes that answer "has the external system
//! converged yet".

use std::time::{Duration, Instant};

/// Log a progress line every N attempts rather than on every probe.
const PROGRESS_EVERY: u32 = 6;

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        PollConfig { interval, timeout }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Satisfied { attempts: u32 },
    TimedOut { attempts: u32 },
}

impl PollOutcome {
    pub fn satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied { .. })
    }
}

/// Evaluate `predicate` immediately, then after each `interval` sleep, until
/// it returns true or `timeout` elapses. Returns within `timeout + interval`
/// of invocation regardless of predicate outcome. A process interrupt lands
/// at the next sleep boundary; no partial state is kept.
pub fn poll<F>(label: &str, config: PollConfig, mut predicate: F) -> PollOutcome
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        if predicate() {
            tracing::debug!(label, attempts, "poll satisfied");
            return PollOutcome::Satisfied { attempts };
        }
        if start.elapsed() >= config.timeout {
            tracing::debug!(label, attempts, "poll timed out");
            return PollOutcome::TimedOut { attempts };
        }
        if attempts % PROGRESS_EVERY == 0 {
            crate::ui::info(format!(
                "still waiting for {label} ({}s elapsed)",
                start.elapsed().as_secs()
            ));
        }
        std::thread::sleep(config.interval);
    }
}
