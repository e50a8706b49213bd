//! Client timing and retry settings

use serde::{Deserialize, Serialize};
use std::time::Duration;
use torqlink_core::{TorqlinkError, TorqlinkResult};

/// What the scheduler does after a session that got past dialing ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostConnectPolicy {
    /// Reset the attempt counter and retry after the flat base delay.
    ///
    /// A controller that accepts TCP and then drops the link is retried at
    /// the base cadence forever.
    #[default]
    Reset,
    /// Count the ended session as a failed attempt and keep backing off
    Backoff,
}

/// Deadlines used by one connection session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub connect_timeout: Duration,
    /// Bound on the whole login + subscribe exchange
    pub handshake_timeout: Duration,
    /// Per-read deadline while streaming
    pub read_timeout: Duration,
    /// Per-write deadline for acks and keep-alives
    pub write_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(10),
        }
    }
}

/// Reconnect policy parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    /// Dial failures per cycle before the cooldown
    pub max_attempts: u32,
    pub cooldown: Duration,
    pub post_connect: PostConnectPolicy,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_attempts: 5,
            cooldown: Duration::from_secs(30),
            post_connect: PostConnectPolicy::Reset,
        }
    }
}

/// `[client]` section of the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSettings {
    pub connect_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub keepalive_interval_secs: u64,
    pub base_delay_secs: u64,
    pub max_dial_attempts: u32,
    pub cooldown_secs: u64,
    pub post_connect_policy: PostConnectPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            handshake_timeout_secs: 10,
            read_timeout_secs: 30,
            write_timeout_secs: 10,
            keepalive_interval_secs: 10,
            base_delay_secs: 1,
            max_dial_attempts: 5,
            cooldown_secs: 30,
            post_connect_policy: PostConnectPolicy::Reset,
        }
    }
}

impl ClientSettings {
    /// Reject values that would make the client spin or never connect
    pub fn validate(&self) -> TorqlinkResult<()> {
        let durations = [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("handshake_timeout_secs", self.handshake_timeout_secs),
            ("read_timeout_secs", self.read_timeout_secs),
            ("write_timeout_secs", self.write_timeout_secs),
            ("keepalive_interval_secs", self.keepalive_interval_secs),
            ("base_delay_secs", self.base_delay_secs),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(TorqlinkError::Config(format!("{} must be greater than 0", name)));
            }
        }
        if self.max_dial_attempts == 0 {
            return Err(TorqlinkError::Config(
                "max_dial_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timings(&self) -> SessionTimings {
        SessionTimings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            keepalive_interval: Duration::from_secs(self.keepalive_interval_secs),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_secs(self.base_delay_secs),
            max_attempts: self.max_dial_attempts,
            cooldown: Duration::from_secs(self.cooldown_secs),
            post_connect: self.post_connect_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policy_defaults() {
        let settings = ClientSettings::default();
        assert_eq!(settings.timings(), SessionTimings::default());
        assert_eq!(settings.reconnect_policy(), ReconnectPolicy::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let settings = ClientSettings {
            read_timeout_secs: 0,
            ..ClientSettings::default()
        };
        assert!(matches!(settings.validate(), Err(TorqlinkError::Config(_))));

        let settings = ClientSettings {
            max_dial_attempts: 0,
            ..ClientSettings::default()
        };
        assert!(matches!(settings.validate(), Err(TorqlinkError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_base_delay() {
        // A flat zero delay would redial a flapping controller in a tight loop
        let settings = ClientSettings {
            base_delay_secs: 0,
            ..ClientSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("base_delay_secs"), "{err}");
    }
}
