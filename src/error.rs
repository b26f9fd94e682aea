//! Error taxonomy for the Protocol E driver.
//!
//! Codec and framing failures are reported as they are found; nothing in the
//! engine corrects or retries them. "Terminal has not answered yet" is not an
//! error and never shows up here (see [`crate::ecr::handshake::Handshake::receive`]).

use crate::ecr::packet::Response;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TeliumError>;

#[derive(Debug, thiserror::Error)]
pub enum TeliumError {
    /// LRC computed over payload+ETX does not match the trailing byte.
    #[error("LRC checksum mismatch: computed 0x{expected:02X}, frame carries 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// STX / ETX missing or misplaced.
    #[error(
        "Malformed frame: first byte should be STX (02) and the byte before last ETX (03), \
         got {first:02X} and {before_last:02X}"
    )]
    Framing { first: u8, before_last: u8 },

    /// Payload is not one of the fixed sizes the layout allows.
    #[error("Payload length {actual} does not match expected {expected:?} octet(s)")]
    LengthMismatch {
        expected: &'static [usize],
        actual: usize,
    },

    /// A field that must be decimal digits (or ASCII) is not.
    #[error("Field '{field}' has invalid content {value:?}")]
    FieldFormat { field: &'static str, value: String },

    #[error("Amount {0} is out of bound: min 0.01, max 99999.99, at most 2 decimals")]
    AmountOutOfRange(String),

    #[error("Checkout id {0} is out of bound: min 1, max 99")]
    PosNumberOutOfRange(u32),

    /// No ACK after ENQ. The terminal is busy or misconfigured; not retried.
    #[error(
        "Payment terminal isn't ready to accept data from host (answered {0:?} to ENQ). \
         Check if terminal is properly configured or not busy"
    )]
    InitializationFailed(Option<u8>),

    #[error("Raw read expected {expected} byte(s) but got {actual}")]
    TruncatedAnswer { expected: usize, actual: usize },

    /// Terminal sent a valid answer but did not close with EOT. The decoded
    /// answer is kept so the caller can still act on it.
    #[error("Terminal should have ended the communication with EOT")]
    MissingTerminator(Box<Response>),

    #[error("Cannot determine expected answer size: unknown answer flag {0:?}")]
    UnrecognizedAnswerFlag(char),

    #[error("Currency {0:?} is not a known ISO 4217 code")]
    UnknownCurrency(String),

    #[error("Serial link to {0} is not open")]
    NotConnected(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serialport::Error> for TeliumError {
    fn from(e: serialport::Error) -> Self {
        TeliumError::Io(e.into())
    }
}

impl From<serde_json::Error> for TeliumError {
    fn from(e: serde_json::Error) -> Self {
        TeliumError::Config(e.to_string())
    }
}

impl TeliumError {
    /// Whether the terminal answered but the answer itself was unusable, as
    /// opposed to a refused or unreachable terminal.
    pub fn is_invalid_answer(&self) -> bool {
        matches!(
            self,
            TeliumError::ChecksumMismatch { .. }
                | TeliumError::Framing { .. }
                | TeliumError::LengthMismatch { .. }
                | TeliumError::FieldFormat { .. }
                | TeliumError::TruncatedAnswer { .. }
                | TeliumError::MissingTerminator(_)
        )
    }
}
