//! Liveness watchdog for a streaming request

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// How long to wait before the first byte
pub const DEFAULT_FIRST_TOKEN_TIMEOUT: Duration = Duration::from_secs(60);

/// How long the stream may go quiet after the first byte
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolution of the periodic check
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Why an in-flight request was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Nothing arrived within the first-token timeout
    NoResponse,
    /// The stream went quiet for longer than the inactivity timeout
    Stalled,
    /// The user cancelled
    User,
}

impl AbortReason {
    /// User-facing message used when nothing could be kept
    pub fn message(&self) -> &'static str {
        match self {
            AbortReason::NoResponse => {
                "Sem resposta do servidor. Verifique sua conexão e tente novamente."
            }
            AbortReason::Stalled => "A resposta parou de chegar. Tente novamente.",
            AbortReason::User => "Resposta cancelada.",
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AbortReason::NoResponse => "no response",
            AbortReason::Stalled => "stalled",
            AbortReason::User => "cancelled by user",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub first_token_timeout: Duration,
    pub inactivity_timeout: Duration,
    pub tick: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            first_token_timeout: DEFAULT_FIRST_TOKEN_TIMEOUT,
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            tick: DEFAULT_TICK,
        }
    }
}

/// Timing state of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogState {
    pub request_start: Instant,
    pub last_chunk: Option<Instant>,
    pub first_token_received: bool,
}

impl WatchdogState {
    pub fn new(now: Instant) -> Self {
        Self {
            request_start: now,
            last_chunk: None,
            first_token_received: false,
        }
    }

    /// Record that data arrived
    pub fn mark_chunk(&mut self, now: Instant) {
        self.first_token_received = true;
        self.last_chunk = Some(now);
    }

    /// The abort reason if a threshold has been exceeded at `now`
    pub fn check(&self, now: Instant, config: &WatchdogConfig) -> Option<AbortReason> {
        match self.last_chunk {
            Some(last) if self.first_token_received => {
                (now.saturating_duration_since(last) >= config.inactivity_timeout)
                    .then_some(AbortReason::Stalled)
            }
            _ => (now.saturating_duration_since(self.request_start) >= config.first_token_timeout)
                .then_some(AbortReason::NoResponse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_token_timeout() {
        let start = Instant::now();
        let state = WatchdogState::new(start);
        let config = WatchdogConfig::default();
        assert_eq!(state.check(start + Duration::from_secs(59), &config), None);
        assert_eq!(
            state.check(start + Duration::from_secs(60), &config),
            Some(AbortReason::NoResponse)
        );
    }

    #[test]
    fn test_inactivity_after_first_chunk() {
        let start = Instant::now();
        let mut state = WatchdogState::new(start);
        let config = WatchdogConfig::default();

        // a late first chunk resets the clock to the inactivity window
        state.mark_chunk(start + Duration::from_secs(50));
        assert_eq!(state.check(start + Duration::from_secs(79), &config), None);
        assert_eq!(
            state.check(start + Duration::from_secs(80), &config),
            Some(AbortReason::Stalled)
        );
    }

    #[test]
    fn test_custom_thresholds() {
        let start = Instant::now();
        let state = WatchdogState::new(start);
        let config = WatchdogConfig {
            first_token_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        assert_eq!(
            state.check(start + Duration::from_secs(5), &config),
            Some(AbortReason::NoResponse)
        );
    }
}
