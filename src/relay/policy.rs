use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::config::{ReconnectConfig, ReconnectPolicyKind, RelayConfig};

/// Connection lifecycle as seen by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Starting,
    Connected,
    /// Disconnected, reconnect scheduled.
    Retrying,
    /// Disconnected for good; the operator must reset credentials and pair again.
    LoggedOut,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Connected => "connected",
            Self::Retrying => "retrying",
            Self::LoggedOut => "logged_out",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub kind: ReconnectPolicyKind,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = match self.kind {
            ReconnectPolicyKind::Fixed => self.base_delay_secs,
            ReconnectPolicyKind::Exponential => {
                exponential_backoff_delay(attempt, self.base_delay_secs, self.max_delay_secs)
            }
        };
        Duration::from_secs(secs)
    }

    /// Whether `attempts` consecutive failures exhaust the policy.
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            kind: config.policy,
            base_delay_secs: config.base_delay_secs,
            max_delay_secs: config.max_delay_secs,
            max_attempts: config.max_attempts,
        }
    }
}

/// `base * 2^attempt`, capped at `max`, plus up to 25% jitter.
pub fn exponential_backoff_delay(attempt: u32, base_delay_secs: u64, max_delay_secs: u64) -> u64 {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let capped = base_delay_secs.saturating_mul(factor).min(max_delay_secs);
    let jitter = fastrand::u64(0..=capped / 4);
    capped.saturating_add(jitter)
}

/// Randomized pause before a reply, uniform over `[min, max]` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyDelay {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl ReplyDelay {
    pub fn sample(&self) -> Duration {
        let (lo, hi) = if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        };
        Duration::from_millis(fastrand::u64(lo..=hi))
    }
}

impl From<&RelayConfig> for ReplyDelay {
    fn from(config: &RelayConfig) -> Self {
        Self {
            min_ms: config.reply_delay_min_ms,
            max_ms: config.reply_delay_max_ms,
        }
    }
}
