use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::error::ApiError;

/// One probe result inside a polling loop.
#[derive(Debug)]
pub enum Observation<T> {
    /// The probe produced a usable value.
    Found(T),
    /// The resource is not published yet: an empty result or a 404.
    Missing,
    /// The probe failed; counts toward the error budget.
    Faulted(ApiError),
}

#[derive(Debug)]
pub enum Verdict<T> {
    /// Keep polling.
    Pending,
    /// The success streak reached the threshold.
    Settled(T),
    /// The error streak reached the threshold.
    Exhausted { errors: u32, last: ApiError },
}

/// Consecutive-outcome counters for one polled resource. A `Missing`
/// observation clears the success streak but never touches the error streak;
/// a `Faulted` observation clears the success streak; a `Found` observation
/// clears the error streak. Either streak reaching `attempts` is terminal.
#[derive(Debug)]
pub struct Streaks {
    attempts: u32,
    successes: u32,
    errors: u32,
}

impl Streaks {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            successes: 0,
            errors: 0,
        }
    }

    pub fn observe<T>(&mut self, observation: Observation<T>) -> Verdict<T> {
        match observation {
            Observation::Found(value) => {
                self.errors = 0;
                self.successes += 1;
                if self.successes >= self.attempts {
                    Verdict::Settled(value)
                } else {
                    Verdict::Pending
                }
            }
            Observation::Missing => {
                self.successes = 0;
                Verdict::Pending
            }
            Observation::Faulted(err) => {
                self.successes = 0;
                self.errors += 1;
                if self.errors >= self.attempts {
                    Verdict::Exhausted {
                        errors: self.errors,
                        last: err,
                    }
                } else {
                    Verdict::Pending
                }
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("cancelled while waiting for next tick")]
    Cancelled,
    #[error("error budget exhausted after {errors} error(s): {last}")]
    Exhausted { errors: u32, last: ApiError },
}

/// Source of "next tick or cancelled" events driving a polling loop.
pub trait TickSource {
    /// Resolves `true` on the next timer tick, `false` once cancelled.
    fn next_tick(&mut self) -> impl Future<Output = bool> + Send;
}

/// Wall-clock ticks at a fixed period, cut short by a shared cancellation
/// token. The first tick fires one full period after construction.
pub struct IntervalTick {
    interval: Interval,
    cancel: CancellationToken,
}

impl IntervalTick {
    pub fn new(period: Duration, cancel: CancellationToken) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval, cancel }
    }
}

impl TickSource for IntervalTick {
    fn next_tick(&mut self) -> impl Future<Output = bool> + Send {
        async move {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                _ = self.interval.tick() => true,
            }
        }
    }
}

/// Drive `probe` once per tick until the streak thresholds decide the
/// outcome. Cancellation of the tick source surfaces immediately as
/// `PollError::Cancelled`, never a silent hang.
pub async fn run_until_settled<T, S, F, Fut>(
    ticks: &mut S,
    attempts: u32,
    mut probe: F,
) -> Result<T, PollError>
where
    S: TickSource,
    F: FnMut() -> Fut,
    Fut: Future<Output = Observation<T>>,
{
    let mut streaks = Streaks::new(attempts);
    loop {
        if !ticks.next_tick().await {
            return Err(PollError::Cancelled);
        }
        let observation = probe().await;
        if let Observation::Faulted(err) = &observation {
            debug!(error = %err, "probe failed");
        }
        match streaks.observe(observation) {
            Verdict::Pending => {}
            Verdict::Settled(value) => return Ok(value),
            Verdict::Exhausted { errors, last } => {
                return Err(PollError::Exhausted { errors, last })
            }
        }
    }
}
