//! Reconnect scheduling
//!
//! Dial failures back off exponentially (`base * 2^n`) within a cycle of
//! `max_attempts`; the last failure of a cycle is followed by a cooldown and a
//! fresh cycle. A session that got past dialing resets the cycle and retries
//! after the flat base delay unless [`PostConnectPolicy::Backoff`] is set.

use crate::connection::SessionOutcome;
use crate::settings::{PostConnectPolicy, ReconnectPolicy};
use std::time::Duration;

/// Wait before the next dial attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDelay {
    pub delay: Duration,
    /// Extra wait after `delay` when a cycle was exhausted
    pub cooldown: Option<Duration>,
}

impl RetryDelay {
    fn flat(delay: Duration) -> Self {
        Self {
            delay,
            cooldown: None,
        }
    }

    /// Total time until the next attempt
    pub fn total(&self) -> Duration {
        self.delay + self.cooldown.unwrap_or_default()
    }
}

/// Per-device retry state
#[derive(Debug, Clone)]
pub struct ReconnectScheduler {
    policy: ReconnectPolicy,
    /// Failed attempts in the current cycle
    attempt: u32,
}

impl ReconnectScheduler {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Failed attempts in the current cycle
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Delay after a failed dial
    ///
    /// The n-th consecutive failure (0-based within the cycle) waits
    /// `base * 2^n`. The failure that exhausts the cycle additionally waits the
    /// cooldown and resets the counter.
    pub fn on_dial_failed(&mut self) -> RetryDelay {
        let exponent = self.attempt.min(31);
        let delay = self.policy.base_delay.saturating_mul(1u32 << exponent);
        self.attempt += 1;

        if self.attempt >= self.policy.max_attempts {
            self.attempt = 0;
            RetryDelay {
                delay,
                cooldown: Some(self.policy.cooldown),
            }
        } else {
            RetryDelay::flat(delay)
        }
    }

    /// Delay after a session that connected and then ended
    pub fn on_session_ended(&mut self) -> RetryDelay {
        match self.policy.post_connect {
            PostConnectPolicy::Reset => {
                self.attempt = 0;
                RetryDelay::flat(self.policy.base_delay)
            }
            PostConnectPolicy::Backoff => self.on_dial_failed(),
        }
    }

    /// Delay for any session outcome; `None` when the session was cancelled
    pub fn next_delay(&mut self, outcome: &SessionOutcome) -> Option<RetryDelay> {
        match outcome {
            SessionOutcome::DialFailed(_) => Some(self.on_dial_failed()),
            SessionOutcome::HandshakeFailed(_) | SessionOutcome::StreamDropped(_) => {
                Some(self.on_session_ended())
            }
            SessionOutcome::Cancelled => None,
        }
    }
}
