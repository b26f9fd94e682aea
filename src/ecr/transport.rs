//! Transport layer for Protocol E conversations.
//!
//! Defines the `EcrTransport` trait the handshake engine drives, the serial
//! implementation used against real terminals, and an in-memory scripted
//! peer for tests and simulations.

use crate::error::{Result, TeliumError};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Transport state
// ---------------------------------------------------------------------------

/// Connection state for transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Blocking duplex byte stream with a read timeout.
///
/// One conversation at a time: callers serialise access (see
/// [`crate::ecr::terminal::SharedTerminal`]).
pub trait EcrTransport: Send {
    /// Establish the connection.
    fn connect(&mut self) -> Result<()>;

    /// Tear down the connection.
    fn disconnect(&mut self) -> Result<()>;

    /// Send raw bytes. Returns number of bytes written.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read up to `max_bytes`, blocking no longer than [`timeout`](Self::timeout).
    /// Returns fewer bytes (possibly none) when the timeout elapses.
    fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>>;

    /// Timeout applied to subsequent reads.
    fn timeout(&self) -> Duration;

    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Current transport state.
    fn state(&self) -> TransportState;

    /// Human-readable description of the connection target.
    fn description(&self) -> String;
}

impl<T: EcrTransport + ?Sized> EcrTransport for Box<T> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }
    fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect()
    }
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }
    fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        (**self).read(max_bytes)
    }
    fn timeout(&self) -> Duration {
        (**self).timeout()
    }
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        (**self).set_timeout(timeout)
    }
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
    fn state(&self) -> TransportState {
        (**self).state()
    }
    fn description(&self) -> String {
        (**self).description()
    }
}

// ---------------------------------------------------------------------------
// Timeout guard
// ---------------------------------------------------------------------------

/// Applies a read timeout and puts the previous one back when dropped, on
/// every exit path.
pub struct TimeoutGuard<'a, T: EcrTransport + ?Sized> {
    transport: &'a mut T,
    previous: Duration,
}

impl<'a, T: EcrTransport + ?Sized> TimeoutGuard<'a, T> {
    pub fn set(transport: &'a mut T, timeout: Duration) -> Result<Self> {
        let previous = transport.timeout();
        transport.set_timeout(timeout)?;
        Ok(Self {
            transport,
            previous,
        })
    }
}

impl<T: EcrTransport + ?Sized> Deref for TimeoutGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.transport
    }
}

impl<T: EcrTransport + ?Sized> DerefMut for TimeoutGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.transport
    }
}

impl<T: EcrTransport + ?Sized> Drop for TimeoutGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(e) = self.transport.set_timeout(self.previous) {
            warn!(
                "Failed to restore {} timeout to {:?}: {e}",
                self.transport.description(),
                self.previous
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Serial transport
// ---------------------------------------------------------------------------

/// Serial (RS-232 / USB CDC-ACM) transport using the `serialport` crate.
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
    port: Option<Box<dyn serialport::SerialPort>>,
    state: TransportState,
}

impl SerialTransport {
    pub fn new(port_name: &str, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port_name: port_name.to_string(),
            baud_rate,
            timeout,
            port: None,
            state: TransportState::Disconnected,
        }
    }
}

impl EcrTransport for SerialTransport {
    fn connect(&mut self) -> Result<()> {
        self.state = TransportState::Connecting;
        info!(
            "Opening serial port {} @ {} baud",
            self.port_name, self.baud_rate
        );

        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(|e| {
                self.state = TransportState::Error;
                TeliumError::from(e)
            })?;

        self.port = Some(port);
        self.state = TransportState::Connected;
        info!("Serial port {} connected", self.port_name);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            port.flush()?;
        }
        self.state = TransportState::Disconnected;
        info!("Serial port {} disconnected", self.port_name);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| TeliumError::NotConnected(self.port_name.clone()))?;
        debug!("Serial TX ({} bytes): {:02X?}", data.len(), data);
        port.write_all(data)?;
        port.flush()?;
        Ok(data.len())
    }

    fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let timeout = self.timeout;
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| TeliumError::NotConnected(self.port_name.clone()))?;

        // The OS hands back whatever has arrived; keep reading until the
        // requested count or the overall deadline.
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; max_bytes];
        let mut filled = 0;
        while filled < max_bytes {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            port.set_timeout(remaining)?;
            match port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => {
                    self.state = TransportState::Error;
                    return Err(e.into());
                }
            }
        }
        buf.truncate(filled);

        if filled < max_bytes {
            debug!(
                "Serial RX timeout after {timeout:?} ({filled}/{max_bytes} bytes): {:02X?}",
                &buf
            );
        } else {
            debug!("Serial RX ({filled} bytes): {:02X?}", &buf);
        }
        Ok(buf)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if let Some(port) = self.port.as_mut() {
            port.set_timeout(timeout)?;
        }
        self.timeout = timeout;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state == TransportState::Connected && self.port.is_some()
    }

    fn state(&self) -> TransportState {
        self.state
    }

    fn description(&self) -> String {
        format!("Serial({}@{})", self.port_name, self.baud_rate)
    }
}

// ---------------------------------------------------------------------------
// In-memory transport
// ---------------------------------------------------------------------------

/// Scripted peer: reads drain a queue of pre-loaded terminal bytes, writes
/// are recorded. An empty queue behaves like a read timeout.
#[derive(Debug)]
pub struct MemoryTransport {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    timeout: Duration,
    timeout_history: Vec<Duration>,
    state: TransportState,
}

impl MemoryTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inbound: VecDeque::new(),
            written: Vec::new(),
            timeout,
            timeout_history: Vec::new(),
            state: TransportState::Connected,
        }
    }

    /// Queue bytes the "terminal" will send.
    pub fn with_inbound(mut self, bytes: &[u8]) -> Self {
        self.push_inbound(bytes);
        self
    }

    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    /// Everything the host has written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }

    /// Every value passed to `set_timeout`, in order.
    pub fn timeout_history(&self) -> &[Duration] {
        &self.timeout_history
    }

    /// Inbound bytes not consumed yet.
    pub fn unread(&self) -> usize {
        self.inbound.len()
    }
}

impl EcrTransport for MemoryTransport {
    fn connect(&mut self) -> Result<()> {
        self.state = TransportState::Connected;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.state = TransportState::Disconnected;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if !self.is_connected() {
            return Err(TeliumError::NotConnected(self.description()));
        }
        self.written.extend_from_slice(data);
        Ok(data.len())
    }

    fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        if !self.is_connected() {
            return Err(TeliumError::NotConnected(self.description()));
        }
        let n = max_bytes.min(self.inbound.len());
        Ok(self.inbound.drain(..n).collect())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        self.timeout_history.push(timeout);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state == TransportState::Connected
    }

    fn state(&self) -> TransportState {
        self.state
    }

    fn description(&self) -> String {
        "Memory".into()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
