//! Telium Manager
//!
//! Host-side driver for Ingenico Telium payment terminals speaking
//! Protocol E over a serial link. The [`ecr`] module holds the protocol
//! engine; everything else is the ambient glue a host application needs.

pub mod config;
pub mod currency;
pub mod ecr;
pub mod error;
pub mod hexdump;
pub mod logging;

pub use config::TerminalConfig;
pub use currency::{CurrencyResolver, Iso4217};
pub use error::{Result, TeliumError};

/// Git revision the crate was built from, or `unknown`.
pub const BUILD_GIT_SHA: &str = env!("BUILD_GIT_SHA");
