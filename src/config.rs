//! Terminal link configuration.
//!
//! Stored as camelCase JSON, every key optional:
//!
//! ```json
//! { "path": "/dev/ttyACM0", "baudRate": 9600, "answerWaitMs": 120000 }
//! ```

use crate::error::{Result, TeliumError};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TerminalConfig {
    /// Serial device the terminal is attached to.
    pub path: String,
    pub baud_rate: u32,
    /// Read timeout the link falls back to between conversations.
    pub timeout_ms: u64,
    /// Wait for each ACK while sending an ask.
    pub ack_timeout_ms: u64,
    /// Wait for the terminal to call back with its answer.
    pub answer_wait_ms: u64,
    pub lenient_checksum: bool,
    /// Drop one stray byte before ENQ.
    pub flush_stale_byte: bool,
    pub trace_frames: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyACM0".into(),
            baud_rate: 9600,
            timeout_ms: 1_000,
            ack_timeout_ms: 1_000,
            answer_wait_ms: 120_000,
            lenient_checksum: false,
            flush_stale_byte: false,
            trace_frames: false,
        }
    }
}

impl TerminalConfig {
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let config = Self::deserialize(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TeliumError::Config(format!("{}: {e}", path.display())))?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        Self::from_value(&value)
    }

    fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(TeliumError::Config("path must not be empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(TeliumError::Config("baudRate must be positive".into()));
        }
        if self.ack_timeout_ms == 0 || self.answer_wait_ms == 0 {
            return Err(TeliumError::Config(
                "ackTimeoutMs and answerWaitMs must be positive".into(),
            ));
        }
        Ok(())
    }
}
