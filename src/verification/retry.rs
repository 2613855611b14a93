//! Bounded retry with exponential backoff, as an explicit state machine.

use std::time::Duration;

/// Attempt bound and backoff base for one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after the `attempt`-th failure (1-based): `base * 2^(attempt - 1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt number `attempt` (1-based) is in flight.
    Attempting { attempt: u32 },
    /// Waiting `delay` after attempt `attempt` failed.
    Backoff { attempt: u32, delay: Duration },
    /// Backoff elapsed; attempt `attempt` is about to start.
    Retrying { attempt: u32 },
    /// Every attempt failed transiently.
    GivenUp { attempts: u32 },
}

/// Drives `Attempting -> Backoff -> Retrying -> Attempting ... -> GivenUp`.
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Attempting { attempt: 1 },
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Records a transient failure of the current attempt.
    pub fn fail(&mut self) -> RetryState {
        if let RetryState::Attempting { attempt } = self.state {
            self.state = if attempt >= self.policy.max_attempts {
                RetryState::GivenUp { attempts: attempt }
            } else {
                RetryState::Backoff {
                    attempt,
                    delay: self.policy.delay_for(attempt),
                }
            };
        }
        self.state
    }

    /// Backoff has elapsed.
    pub fn resume(&mut self) -> RetryState {
        if let RetryState::Backoff { attempt, .. } = self.state {
            self.state = RetryState::Retrying {
                attempt: attempt + 1,
            };
        }
        self.state
    }

    /// The retry attempt starts.
    pub fn begin(&mut self) -> RetryState {
        if let RetryState::Retrying { attempt } = self.state {
            self.state = RetryState::Attempting { attempt };
        }
        self.state
    }

    pub fn is_given_up(&self) -> bool {
        matches!(self.state, RetryState::GivenUp { .. })
    }
}
