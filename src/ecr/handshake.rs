//! ENQ/ACK/EOT handshake engine for Protocol E.
//!
//! A payment is two separate conversations on the same link:
//!
//! 1. **Send**: host ENQ → terminal ACK → host writes the ask frame →
//!    terminal ACK (or NAK) → host EOT.
//! 2. **Receive**, possibly much later: terminal ENQ → host ACK → terminal
//!    writes the answer frame → host ACK → terminal EOT.
//!
//! The engine never retries. Every negative outcome goes back to the caller,
//! and the transport timeout is restored on every exit path.

use crate::config::TerminalConfig;
use crate::ecr::packet::{
    decode_response_with, encode_ask, AnswerFlag, Ask, ChecksumPolicy, Response, ACK, ENQ, EOT,
    ETX, NAK, STX,
};
use crate::ecr::transport::{EcrTransport, TimeoutGuard};
use crate::error::{Result, TeliumError};
use crate::hexdump::hexdump;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_ANSWER_WAIT: Duration = Duration::from_secs(120);
const STALE_BYTE_TIMEOUT: Duration = Duration::from_millis(300);

/// Result of the send phase when the terminal took part in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    /// Terminal acknowledged the ask and will process the payment.
    Accepted,
    /// Terminal answered NAK (or nothing) after the ask. Not retried.
    Rejected,
}

impl SendOutcome {
    pub fn is_accepted(self) -> bool {
        self == SendOutcome::Accepted
    }
}

/// Handshake settings shared by both phases.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// How long to wait for each ACK in the send phase.
    pub ack_timeout: Duration,
    /// How long to wait for the terminal's ENQ in the receive phase.
    pub answer_wait: Duration,
    pub checksum_policy: ChecksumPolicy,
    /// Drain one stray byte before ENQ (some USB-serial hosts leave one behind).
    pub flush_stale_byte: bool,
    /// Hexdump whole frames in debug logs.
    pub trace_frames: bool,
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            answer_wait: DEFAULT_ANSWER_WAIT,
            checksum_policy: ChecksumPolicy::Strict,
            flush_stale_byte: false,
            trace_frames: false,
        }
    }
}

impl From<&TerminalConfig> for Handshake {
    fn from(config: &TerminalConfig) -> Self {
        Self {
            ack_timeout: Duration::from_millis(config.ack_timeout_ms),
            answer_wait: Duration::from_millis(config.answer_wait_ms),
            checksum_policy: if config.lenient_checksum {
                ChecksumPolicy::Lenient
            } else {
                ChecksumPolicy::Strict
            },
            flush_stale_byte: config.flush_stale_byte,
            trace_frames: config.trace_frames,
        }
    }
}

fn signal_name(byte: u8) -> &'static str {
    match byte {
        STX => "STX",
        ETX => "ETX",
        EOT => "EOT",
        ENQ => "ENQ",
        ACK => "ACK",
        NAK => "NAK",
        _ => "??",
    }
}

fn send_signal<T: EcrTransport + ?Sized>(transport: &mut T, signal: u8) -> Result<()> {
    debug!("-> {}", signal_name(signal));
    transport.write(&[signal])?;
    Ok(())
}

/// One byte, or `None` if the read timed out.
fn read_signal<T: EcrTransport + ?Sized>(transport: &mut T) -> Result<Option<u8>> {
    let byte = transport.read(1)?.first().copied();
    match byte {
        Some(b) => debug!("<- {} (0x{b:02X})", signal_name(b)),
        None => debug!("<- nothing within {:?}", transport.timeout()),
    }
    Ok(byte)
}

impl Handshake {
    fn trace(&self, direction: &str, frame: &[u8]) {
        if self.trace_frames {
            debug!("{direction} frame ({} bytes)\n{}", frame.len(), hexdump(frame));
        }
    }

    fn flush_stale<T: EcrTransport + ?Sized>(&self, transport: &mut T) -> Result<()> {
        if !self.flush_stale_byte {
            return Ok(());
        }
        let mut t = TimeoutGuard::set(transport, STALE_BYTE_TIMEOUT)?;
        let stray = t.read(1)?;
        if !stray.is_empty() {
            debug!("Discarded stale byte {:02X?}", stray);
        }
        Ok(())
    }

    /// ENQ → ACK → EOT. `false` when the terminal does not acknowledge.
    pub fn probe<T: EcrTransport + ?Sized>(&self, transport: &mut T) -> Result<bool> {
        self.flush_stale(transport)?;
        let mut t = TimeoutGuard::set(transport, self.ack_timeout)?;

        send_signal(&mut *t, ENQ)?;
        if read_signal(&mut *t)? != Some(ACK) {
            info!("Terminal on {} is not ready", t.description());
            return Ok(false);
        }
        send_signal(&mut *t, EOT)?;
        Ok(true)
    }

    /// Send phase: hand the ask over to the terminal.
    ///
    /// No ACK to the opening ENQ is an error ([`TeliumError::InitializationFailed`]);
    /// a NAK after the ask is a normal [`SendOutcome::Rejected`].
    pub fn send<T: EcrTransport + ?Sized>(
        &self,
        transport: &mut T,
        ask: &Ask,
    ) -> Result<SendOutcome> {
        // Encode up front so an invalid ask never opens a conversation.
        let frame = encode_ask(ask)?;

        self.flush_stale(transport)?;
        let mut t = TimeoutGuard::set(transport, self.ack_timeout)?;
        info!(
            pos = %ask.pos_number,
            amount = %ask.amount,
            currency = %ask.currency_numeric,
            "Sending ask to {}",
            t.description()
        );

        send_signal(&mut *t, ENQ)?;
        match read_signal(&mut *t)? {
            Some(ACK) => {}
            other => {
                warn!("No ACK after ENQ (got {other:02X?})");
                return Err(TeliumError::InitializationFailed(other));
            }
        }

        self.trace("TX", &frame);
        t.write(&frame)?;

        if read_signal(&mut *t)? != Some(ACK) {
            warn!("Terminal refused the ask");
            // Best-effort close; the refusal is what the caller needs to see.
            if let Err(e) = send_signal(&mut *t, EOT) {
                warn!("Could not send EOT after refusal: {e}");
            }
            return Ok(SendOutcome::Rejected);
        }

        send_signal(&mut *t, EOT)?;
        info!("Ask accepted by terminal");
        Ok(SendOutcome::Accepted)
    }

    /// Receive phase: wait up to `answer_wait` for the terminal to call back.
    ///
    /// `Ok(None)` means the terminal has not answered yet and the caller may
    /// poll again. A malformed answer is an error.
    pub fn receive<T: EcrTransport + ?Sized>(
        &self,
        transport: &mut T,
        expected: AnswerFlag,
    ) -> Result<Option<Response>> {
        let mut t = TimeoutGuard::set(transport, self.answer_wait)?;

        match read_signal(&mut *t)? {
            Some(ENQ) => {}
            Some(other) => {
                debug!("Expected ENQ, got 0x{other:02X}; no answer yet");
                return Ok(None);
            }
            None => return Ok(None),
        }

        send_signal(&mut *t, ACK)?;

        let len = expected.frame_len();
        let raw = t.read(len)?;
        self.trace("RX", &raw);
        if raw.len() != len {
            return Err(TeliumError::TruncatedAnswer {
                expected: len,
                actual: raw.len(),
            });
        }
        if raw[0] != STX || raw[len - 2] != ETX {
            return Err(TeliumError::Framing {
                first: raw[0],
                before_last: raw[len - 2],
            });
        }

        send_signal(&mut *t, ACK)?;
        let terminator = read_signal(&mut *t)?;

        let response = decode_response_with(&raw, self.checksum_policy)?;
        if terminator != Some(EOT) {
            warn!("Answer received but terminal did not close with EOT (got {terminator:02X?})");
            return Err(TeliumError::MissingTerminator(Box::new(response)));
        }

        info!(
            pos = %response.pos_number,
            result = response.transaction_result,
            amount = %response.amount,
            "Answer received from terminal"
        );
        Ok(Some(response))
    }
}

/// Send phase with default settings and the given ACK timeout.
pub fn send<T: EcrTransport + ?Sized>(
    transport: &mut T,
    ask: &Ask,
    timeout: Duration,
) -> Result<SendOutcome> {
    Handshake {
        ack_timeout: timeout,
        ..Default::default()
    }
    .send(transport, ask)
}

/// Receive phase with default settings and the given wait window.
pub fn receive<T: EcrTransport + ?Sized>(
    transport: &mut T,
    expected: AnswerFlag,
    timeout: Duration,
) -> Result<Option<Response>> {
    Handshake {
        answer_wait: timeout,
        ..Default::default()
    }
    .receive(transport, expected)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
