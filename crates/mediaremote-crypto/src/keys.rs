//! Session key types and per-channel derivation.

use crate::hkdf::{self, constants};
use mediaremote_core::error::CryptoError;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Shared secret from SRP or ECDH.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(Vec<u8>);

/// 32-byte channel encryption key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey(pub [u8; 32]);

/// Directional key pair for one encrypted channel.
///
/// Derived at the end of pair-verify; discarded on connection close and
/// never reused across connections or channels.
#[derive(ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Key for data we send.
    pub write_key: EncryptionKey,
    /// Key for data we receive.
    pub read_key: EncryptionKey,
}

impl SharedSecret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl EncryptionKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl SessionKeys {
    /// Control channel keys (AirPlay, after pair-verify).
    pub fn derive_control(shared: &SharedSecret) -> Result<Self, CryptoError> {
        Self::derive(
            shared,
            constants::CONTROL_SALT,
            constants::CONTROL_WRITE_KEY_INFO,
            constants::CONTROL_READ_KEY_INFO,
        )
    }

    /// Event channel keys (AirPlay, after the event SETUP).
    pub fn derive_events(shared: &SharedSecret) -> Result<Self, CryptoError> {
        Self::derive(
            shared,
            constants::EVENTS_SALT,
            constants::EVENTS_WRITE_KEY_INFO,
            constants::EVENTS_READ_KEY_INFO,
        )
    }

    /// Data channel keys; the salt carries the connection's decimal seed.
    pub fn derive_datastream(shared: &SharedSecret, seed: i32) -> Result<Self, CryptoError> {
        let salt = hkdf::datastream_salt(seed);
        Self::derive(
            shared,
            &salt,
            constants::DATASTREAM_OUTPUT_KEY_INFO,
            constants::DATASTREAM_INPUT_KEY_INFO,
        )
    }

    /// Companion channel keys (empty salt).
    pub fn derive_companion(shared: &SharedSecret) -> Result<Self, CryptoError> {
        Self::derive(
            shared,
            &[],
            constants::COMPANION_CLIENT_KEY_INFO,
            constants::COMPANION_SERVER_KEY_INFO,
        )
    }

    fn derive(
        shared: &SharedSecret,
        salt: &[u8],
        write_info: &[u8],
        read_info: &[u8],
    ) -> Result<Self, CryptoError> {
        let write_key = hkdf::derive_key_32(shared.as_bytes(), salt, write_info)?;
        let read_key = hkdf::derive_key_32(shared.as_bytes(), salt, read_info)?;
        Ok(Self {
            write_key: EncryptionKey(write_key),
            read_key: EncryptionKey(read_key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> SharedSecret {
        SharedSecret::new(vec![0xAB; 32])
    }

    #[test]
    fn write_and_read_keys_differ() {
        let keys = SessionKeys::derive_control(&shared()).unwrap();
        assert_ne!(keys.write_key.as_bytes(), keys.read_key.as_bytes());
    }

    #[test]
    fn each_channel_gets_distinct_keys() {
        let control = SessionKeys::derive_control(&shared()).unwrap();
        let events = SessionKeys::derive_events(&shared()).unwrap();
        let data = SessionKeys::derive_datastream(&shared(), 7).unwrap();
        let companion = SessionKeys::derive_companion(&shared()).unwrap();

        let all = [
            control.write_key.as_bytes(),
            events.write_key.as_bytes(),
            data.write_key.as_bytes(),
            companion.write_key.as_bytes(),
        ];
        for i in 0..all.len() {
            for j in (i + 1)..all.len() {
                assert_ne!(all[i], all[j]);
            }
        }
    }

    #[test]
    fn datastream_keys_depend_on_seed() {
        let a = SessionKeys::derive_datastream(&shared(), 1).unwrap();
        let b = SessionKeys::derive_datastream(&shared(), 2).unwrap();
        assert_ne!(a.write_key.as_bytes(), b.write_key.as_bytes());
        assert_ne!(a.read_key.as_bytes(), b.read_key.as_bytes());
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = SessionKeys::derive_companion(&shared()).unwrap();
        let b = SessionKeys::derive_companion(&shared()).unwrap();
        assert_eq!(a.write_key.as_bytes(), b.write_key.as_bytes());
        assert_eq!(a.read_key.as_bytes(), b.read_key.as_bytes());
    }
}
