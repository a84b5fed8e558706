//! Reconnect timing for the control channel
//!
//! Attempts are never capped: the channel keeps retrying for as long as
//! the session lives.

use crate::config::{ChannelConfig, ReconnectBackoff};
use std::time::Duration;

/// Doubling stops growing after this many consecutive failures
const MAX_DOUBLINGS: u32 = 16;

/// Delay schedule between connection attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub backoff: ReconnectBackoff,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Same delay before every attempt
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            backoff: ReconnectBackoff::Fixed,
            max_delay: delay,
        }
    }

    pub fn from_config(config: &ChannelConfig) -> Self {
        Self {
            delay: Duration::from_secs(config.reconnect_delay_secs),
            backoff: config.reconnect_backoff,
            max_delay: Duration::from_secs(config.reconnect_max_delay_secs),
        }
    }

    /// Wait before the next attempt after `consecutive_failures` failed
    /// connects in a row (0 after a connection that was up and dropped)
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        match self.backoff {
            ReconnectBackoff::Fixed => self.delay,
            ReconnectBackoff::Exponential => {
                let factor = 1u32 << consecutive_failures.min(MAX_DOUBLINGS);
                self.delay
                    .saturating_mul(factor)
                    .min(self.max_delay.max(self.delay))
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ChannelConfig::default())
    }
}
