//! # mediaremote-crypto
//!
//! Cryptographic primitives for Media Remote pairing and transport.
//!
//! This crate provides:
//! - SRP-6a (3072-bit) for pair-setup
//! - X25519 ECDH for pair-verify key agreement
//! - Ed25519 for long-term identity signatures
//! - ChaCha20-Poly1305 sessions with HAP chunk framing
//! - HKDF-SHA512 key derivation with the protocol's fingerprint constants
//! - TLV8 encoding for pairing records
//!
//! All secret material is zeroized on drop.

pub mod chacha;
pub mod curve25519;
pub mod ed25519;
pub mod hkdf;
pub mod keys;
pub mod srp;
pub mod tlv;

pub use chacha::HapSession;
pub use keys::{EncryptionKey, SessionKeys, SharedSecret};
pub use tlv::{Tlv8, TlvTag};
