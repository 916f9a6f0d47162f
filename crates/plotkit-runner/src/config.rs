//! Session configuration.
//!
//! Defaults match the firmware's timing: replies to a command arrive within
//! seconds, but a drawing can keep the head moving for many minutes. A YAML
//! file can override any field; command-line flags override the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RunnerError, RunnerResult};

/// Default bridge address of the plotter's UART.
pub const DEFAULT_DEVICE: &str = "127.0.0.1:4000";

/// Which directions of traffic the session allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Only print what the device says; user commands are discarded.
    Listen,
    /// Send user commands.
    Write,
    /// Both directions.
    #[default]
    Full,
}

impl SessionMode {
    /// Resolve the mutually exclusive mode flags. No flag means [`SessionMode::Full`].
    pub fn from_flags(listen: bool, write: bool, full: bool) -> RunnerResult<SessionMode> {
        match (listen, write, full) {
            (false, false, false) | (false, false, true) => Ok(SessionMode::Full),
            (true, false, false) => Ok(SessionMode::Listen),
            (false, true, false) => Ok(SessionMode::Write),
            _ => Err(RunnerError::ConflictingModes),
        }
    }

    /// Whether user commands may be sent to the device.
    pub fn can_send(&self) -> bool {
        !matches!(self, SessionMode::Listen)
    }
}

/// What the sender does when the device answers `ERROR` to the in-flight command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReplyPolicy {
    /// Report the error and keep waiting for the command's terminal reply.
    #[default]
    KeepWaiting,
    /// Report the error and treat the in-flight command as resolved.
    ReleaseCommand,
}

/// Configuration for a plotter session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Address of the UART bridge (`host:port`).
    pub device: String,
    /// Session mode.
    pub mode: SessionMode,
    /// How long to wait for the first reply to a command (milliseconds).
    pub reply_timeout_ms: u64,
    /// How long a drawing may run once started (milliseconds).
    pub drawing_timeout_ms: u64,
    /// Timeout of a single read from the device (milliseconds).
    pub read_timeout_ms: u64,
    /// How long shutdown waits for workers to exit (milliseconds).
    pub join_timeout_ms: u64,
    /// Handling of `ERROR` replies.
    pub error_policy: ErrorReplyPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            device: DEFAULT_DEVICE.to_string(),
            mode: SessionMode::Full,
            reply_timeout_ms: 10_000,
            drawing_timeout_ms: 1_000_000,
            read_timeout_ms: 200,
            join_timeout_ms: 5_000,
            error_policy: ErrorReplyPolicy::KeepWaiting,
        }
    }
}

impl SessionConfig {
    /// Load a config from a YAML file. Missing fields keep their defaults.
    pub fn from_yaml_file(path: &Path) -> RunnerResult<SessionConfig> {
        let text = std::fs::read_to_string(path).map_err(|source| RunnerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| RunnerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Set the session mode.
    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the reply timeout.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the drawing timeout.
    pub fn with_drawing_timeout(mut self, timeout: Duration) -> Self {
        self.drawing_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the error reply policy.
    pub fn with_error_policy(mut self, policy: ErrorReplyPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Reply timeout as a [`Duration`].
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Drawing timeout as a [`Duration`].
    pub fn drawing_timeout(&self) -> Duration {
        Duration::from_millis(self.drawing_timeout_ms)
    }

    /// Read timeout as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Join timeout as a [`Duration`].
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_flags() {
        assert_eq!(SessionMode::from_flags(false, false, false).unwrap(), SessionMode::Full);
        assert_eq!(SessionMode::from_flags(true, false, false).unwrap(), SessionMode::Listen);
        assert_eq!(SessionMode::from_flags(false, true, false).unwrap(), SessionMode::Write);
        assert!(matches!(
            SessionMode::from_flags(true, true, false),
            Err(RunnerError::ConflictingModes)
        ));
        assert!(matches!(
            SessionMode::from_flags(false, true, true),
            Err(RunnerError::ConflictingModes)
        ));
    }

    #[test]
    fn test_listen_mode_cannot_send() {
        assert!(!SessionMode::Listen.can_send());
        assert!(SessionMode::Write.can_send());
        assert!(SessionMode::Full.can_send());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: SessionConfig =
            serde_yaml::from_str("mode: listen\nreply_timeout_ms: 2500\nerror_policy: release_command\n")
                .unwrap();
        assert_eq!(config.mode, SessionMode::Listen);
        assert_eq!(config.reply_timeout(), Duration::from_millis(2500));
        assert_eq!(config.error_policy, ErrorReplyPolicy::ReleaseCommand);
        assert_eq!(config.drawing_timeout_ms, SessionConfig::default().drawing_timeout_ms);
        assert_eq!(config.device, DEFAULT_DEVICE);
    }

    #[test]
    fn test_builders() {
        let config = SessionConfig::default()
            .with_mode(SessionMode::Write)
            .with_reply_timeout(Duration::from_millis(50))
            .with_drawing_timeout(Duration::from_secs(2));
        assert_eq!(config.mode, SessionMode::Write);
        assert_eq!(config.reply_timeout_ms, 50);
        assert_eq!(config.drawing_timeout_ms, 2000);
    }
}
