//! # mediaremote-pairing
//!
//! The two pairing handshakes of the Media Remote protocols:
//! - Pair-setup (SRP-6a, M1-M6): first contact, creates durable credentials
//! - Pair-verify (X25519 + Ed25519, M1-M4): per-connection session keys
//!
//! Both engines are transport-agnostic: a [`PairingTransport`] carries the
//! TLV records over plaintext HTTP (AirPlay) or framed compact-pack maps
//! (Companion).

mod pair_setup;
mod pair_verify;
mod traits;

pub use pair_setup::{pair_setup, PairSetup};
pub use pair_verify::{pair_verify, PairVerify, VerifyVariant, VerifiedSession};
pub use traits::PairingTransport;
