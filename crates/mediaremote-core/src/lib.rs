//! # mediaremote-core
//!
//! Shared foundation for the Media Remote client crates.
//!
//! This crate provides:
//! - The error taxonomy used across pairing, transport, and codecs
//! - Durable pairing credentials and their JSON serialization

pub mod credentials;
pub mod error;
pub mod state;

pub use credentials::Credentials;
pub use error::{ConfigError, CryptoError, Error, PairingError, ProtocolError, Result};
pub use state::ConnectionState;
