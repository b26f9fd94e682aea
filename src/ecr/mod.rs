//! ECR (Electronic Cash Register) link to Telium payment terminals.
//!
//! Protocol E over a serial line: checksum, packet codec, the two-phase
//! ENQ/ACK/EOT handshake, and the session and answer-polling layers built
//! on top of it.

pub mod handshake;
pub mod lrc;
pub mod packet;
pub mod pending;
pub mod terminal;
pub mod transport;

pub use handshake::{Handshake, SendOutcome};
pub use packet::{Amount, AnswerFlag, Ask, ChecksumPolicy, PaymentOptions, Response};
pub use pending::{AnswerStatus, PendingAnswers};
pub use terminal::{SharedTerminal, Terminal};
pub use transport::{EcrTransport, MemoryTransport, SerialTransport};
