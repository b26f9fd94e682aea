//! A payment terminal session: one transport plus handshake settings.
//!
//! The link is released when the `Terminal` goes out of scope. Use
//! [`Terminal::close`] to observe the close error instead of having it logged.

use crate::config::TerminalConfig;
use crate::ecr::handshake::{Handshake, SendOutcome};
use crate::ecr::packet::{Ask, Response};
use crate::ecr::transport::{EcrTransport, SerialTransport};
use crate::error::{Result, TeliumError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// Terminal handle shared between the thread that sends and the worker that
/// waits for the answer. The mutex keeps the two phases from interleaving.
pub type SharedTerminal<T> = Arc<Mutex<Terminal<T>>>;

pub struct Terminal<T: EcrTransport> {
    transport: T,
    handshake: Handshake,
}

impl Terminal<SerialTransport> {
    /// Open the serial line described by `config`.
    pub fn open(config: &TerminalConfig) -> Result<Self> {
        let mut transport = SerialTransport::new(
            &config.path,
            config.baud_rate,
            Duration::from_millis(config.timeout_ms),
        );
        transport.connect()?;
        info!("Terminal session opened on {}", config.path);
        Ok(Self::new(transport, Handshake::from(config)))
    }
}

impl<T: EcrTransport> Terminal<T> {
    /// Wrap an already connected transport.
    pub fn new(transport: T, handshake: Handshake) -> Self {
        Self {
            transport,
            handshake,
        }
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_shared(self) -> SharedTerminal<T> {
        Arc::new(Mutex::new(self))
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.transport.is_connected() {
            Ok(())
        } else {
            Err(TeliumError::NotConnected(self.transport.description()))
        }
    }

    /// Liveness check: ENQ → ACK → EOT.
    pub fn is_ok(&mut self) -> Result<bool> {
        self.ensure_connected()?;
        self.handshake.probe(&mut self.transport)
    }

    /// Send phase.
    pub fn ask(&mut self, ask: &Ask) -> Result<SendOutcome> {
        self.ensure_connected()?;
        self.handshake.send(&mut self.transport, ask)
    }

    /// Receive phase for a previously sent `ask`. `Ok(None)` means the
    /// terminal has not answered within the wait window.
    pub fn verify(&mut self, ask: &Ask) -> Result<Option<Response>> {
        self.ensure_connected()?;
        let expected = ask.expected_answer()?;
        self.handshake.receive(&mut self.transport, expected)
    }

    /// Release the link and report any error doing so.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if !self.transport.is_connected() {
            return Ok(());
        }
        self.transport.disconnect()?;
        info!("Terminal session closed on {}", self.transport.description());
        Ok(())
    }
}

impl<T: EcrTransport> Drop for Terminal<T> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to close terminal link: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecr::packet::{
        encode_response, Amount, AnswerFlag, Authorization, Delay, PaymentMode, TransactionType,
        ACK, ENQ, EOT, NAK,
    };
    use crate::ecr::transport::{MemoryTransport, TransportState};
    use std::sync::atomic::{AtomicBool, Ordering};

    const IDLE: Duration = Duration::from_secs(1);

    /// Memory link that reports its release through a shared flag.
    struct Watched {
        inner: MemoryTransport,
        released: Arc<AtomicBool>,
    }

    impl EcrTransport for Watched {
        fn connect(&mut self) -> Result<()> {
            self.inner.connect()
        }
        fn disconnect(&mut self) -> Result<()> {
            self.released.store(true, Ordering::SeqCst);
            self.inner.disconnect()
        }
        fn write(&mut self, data: &[u8]) -> Result<usize> {
            self.inner.write(data)
        }
        fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
            self.inner.read(max_bytes)
        }
        fn timeout(&self) -> Duration {
            self.inner.timeout()
        }
        fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            self.inner.set_timeout(timeout)
        }
        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }
        fn state(&self) -> TransportState {
            self.inner.state()
        }
        fn description(&self) -> String {
            "Watched".into()
        }
    }

    fn limited_ask() -> Ask {
        Ask::new(
            3,
            Amount::from_cents(990),
            AnswerFlag::Limited,
            PaymentMode::Card,
            TransactionType::Debit,
            "840",
            Delay::WaitForTransaction,
            Authorization::DeviceDecides,
        )
        .unwrap()
    }

    fn terminal(inbound: &[u8]) -> Terminal<MemoryTransport> {
        Terminal::new(
            MemoryTransport::new(IDLE).with_inbound(inbound),
            Handshake::default(),
        )
    }

    #[test]
    fn test_ask_then_verify() {
        let ask = limited_ask();
        let mut term = terminal(&[ACK, ACK]);
        assert_eq!(term.ask(&ask).unwrap(), SendOutcome::Accepted);

        let answer = Response {
            pos_number: "03".into(),
            transaction_result: 0,
            amount: ask.amount,
            payment_mode: '1',
            report: String::new(),
            currency_numeric: "840".into(),
            private: "TX00000001".into(),
        };
        let mut bytes = vec![ENQ];
        bytes.extend(encode_response(&answer).unwrap());
        bytes.push(EOT);
        term.transport_mut().push_inbound(&bytes);

        let got = term.verify(&ask).unwrap().unwrap();
        assert_eq!(got.transaction_id(), "TX00000001");
        assert!(got.has_succeeded());
    }

    #[test]
    fn test_verify_without_answer() {
        let mut term = terminal(&[]);
        assert!(term.verify(&limited_ask()).unwrap().is_none());
        assert_eq!(term.transport().timeout(), IDLE);
    }

    #[test]
    fn test_verify_unknown_answer_flag() {
        let mut ask = limited_ask();
        ask.answer_flag = '9';
        let mut term = terminal(&[ENQ]);
        assert!(matches!(
            term.verify(&ask),
            Err(TeliumError::UnrecognizedAnswerFlag('9'))
        ));
        // Nothing consumed or written before the flag is checked.
        assert_eq!(term.transport().unread(), 1);
        assert!(term.transport().written().is_empty());
    }

    #[test]
    fn test_is_ok() {
        assert!(terminal(&[ACK]).is_ok().unwrap());
        assert!(!terminal(&[NAK]).is_ok().unwrap());
    }

    #[test]
    fn test_operations_on_closed_link() {
        let mut term = terminal(&[ACK, ACK]);
        term.transport_mut().disconnect().unwrap();
        assert!(matches!(
            term.ask(&limited_ask()),
            Err(TeliumError::NotConnected(_))
        ));
        assert!(matches!(
            term.verify(&limited_ask()),
            Err(TeliumError::NotConnected(_))
        ));
        assert!(matches!(term.is_ok(), Err(TeliumError::NotConnected(_))));
    }

    #[test]
    fn test_link_released_on_drop() {
        let released = Arc::new(AtomicBool::new(false));
        {
            let _term = Terminal::new(
                Watched {
                    inner: MemoryTransport::new(IDLE),
                    released: released.clone(),
                },
                Handshake::default(),
            );
        }
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_link_released_on_error_path() {
        let released = Arc::new(AtomicBool::new(false));
        let run = || -> Result<SendOutcome> {
            let mut term = Terminal::new(
                Watched {
                    inner: MemoryTransport::new(IDLE),
                    released: released.clone(),
                },
                Handshake::default(),
            );
            term.ask(&limited_ask())
        };
        assert!(matches!(run(), Err(TeliumError::InitializationFailed(None))));
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_close_is_explicit_and_single() {
        let released = Arc::new(AtomicBool::new(false));
        let term = Terminal::new(
            Watched {
                inner: MemoryTransport::new(IDLE),
                released: released.clone(),
            },
            Handshake::default(),
        );
        term.close().unwrap();
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_open_missing_port_fails() {
        let config = TerminalConfig {
            path: "/dev/telium-does-not-exist".into(),
            ..Default::default()
        };
        assert!(Terminal::open(&config).is_err());
    }
}
