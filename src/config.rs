//! Tunable parameters for the reliable transport core.
//!
//! Mirrors the original implementation's `consts.py`, including the single
//! environment-variable override for the window size.

use std::time::Duration;

/// Environment variable used to override [`TransportConfig::window_size`].
pub const WINDOW_SIZE_ENV_VAR: &str = "RUDP_WINDOW_SIZE";

/// Default number of outstanding unacknowledged DATA packets per stream.
///
/// `1` degenerates the reliable stream into Stop-and-Wait; any larger value
/// is Selective Repeat.
pub const DEFAULT_WINDOW_SIZE: usize = 30;

/// Default retransmission timeout.
pub const DEFAULT_TIMER: Duration = Duration::from_millis(100);

/// Default number of consecutive unacked retransmissions tolerated, while
/// closing, before a stream gives up on its peer.
pub const DEFAULT_DROP_THRESHOLD: u32 = 50;

/// Default UDP receive buffer size.
pub const DEFAULT_BUFSIZE: usize = 4096;

/// Runtime configuration for a [`crate::transport::Transport`].
#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    pub window_size: usize,
    pub timer: Duration,
    pub drop_threshold: u32,
    pub bufsize: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            timer: DEFAULT_TIMER,
            drop_threshold: DEFAULT_DROP_THRESHOLD,
            bufsize: DEFAULT_BUFSIZE,
        }
    }
}

impl TransportConfig {
    /// Build the default configuration, overlaying `RUDP_WINDOW_SIZE` from
    /// the environment if it is set and parses to a positive integer.
    ///
    /// A present-but-unparseable value is logged and ignored rather than
    /// treated as fatal, matching the original's tolerant env override.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(WINDOW_SIZE_ENV_VAR) {
            match raw.parse::<usize>() {
                Ok(size) if size > 0 => config.window_size = size,
                Ok(_) => {
                    tracing::warn!(
                        value = %raw,
                        "{} must be a positive integer, ignoring",
                        WINDOW_SIZE_ENV_VAR
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        value = %raw,
                        "failed to parse {}, ignoring",
                        WINDOW_SIZE_ENV_VAR
                    );
                }
            }
        }
        config
    }

    /// `true` when this configuration degenerates to Stop-and-Wait.
    pub fn is_stop_and_wait(&self) -> bool {
        self.window_size == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_original_constants() {
        let config = TransportConfig::default();
        assert_eq!(config.window_size, 30);
        assert_eq!(config.timer, Duration::from_millis(100));
        assert_eq!(config.drop_threshold, 50);
        assert_eq!(config.bufsize, 4096);
        assert!(!config.is_stop_and_wait());
    }

    #[test]
    fn window_size_one_is_stop_and_wait() {
        let config = TransportConfig {
            window_size: 1,
            ..TransportConfig::default()
        };
        assert!(config.is_stop_and_wait());
    }

    #[test]
    fn env_override_parses_valid_value() {
        std::env::set_var(WINDOW_SIZE_ENV_VAR, "7");
        let config = TransportConfig::from_env();
        assert_eq!(config.window_size, 7);
        std::env::remove_var(WINDOW_SIZE_ENV_VAR);
    }

    #[test]
    fn env_override_ignores_garbage() {
        std::env::set_var(WINDOW_SIZE_ENV_VAR, "not-a-number");
        let config = TransportConfig::from_env();
        assert_eq!(config.window_size, DEFAULT_WINDOW_SIZE);
        std::env::remove_var(WINDOW_SIZE_ENV_VAR);
    }
}
