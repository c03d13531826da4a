//! Companion channel encryption.
//!
//! Single-message ChaCha20-Poly1305 (no chunking): the AAD is the 4-byte
//! frame header carrying the final (encrypted) length, and the nonce is the
//! directional counter, little-endian in the high 8 bytes.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use mediaremote_core::error::{CryptoError, ProtocolError};
use zeroize::ZeroizeOnDrop;

use crate::frames::{self, FrameType};

/// Encrypted Companion session with directional counters.
#[derive(ZeroizeOnDrop)]
pub struct CompanionSession {
    write_key: [u8; 32],
    read_key: [u8; 32],
    #[zeroize(skip)]
    write_cipher: ChaCha20Poly1305,
    #[zeroize(skip)]
    read_cipher: ChaCha20Poly1305,
    #[zeroize(skip)]
    write_counter: u64,
    #[zeroize(skip)]
    read_counter: u64,
}

impl CompanionSession {
    pub fn new(write_key: [u8; 32], read_key: [u8; 32]) -> Self {
        Self {
            write_key,
            read_key,
            write_cipher: ChaCha20Poly1305::new(&write_key.into()),
            read_cipher: ChaCha20Poly1305::new(&read_key.into()),
            write_counter: 0,
            read_counter: 0,
        }
    }

    pub fn from_keys(keys: &mediaremote_crypto::keys::SessionKeys) -> Self {
        Self::new(*keys.write_key.as_bytes(), *keys.read_key.as_bytes())
    }

    /// Encrypt a payload into a complete frame (header + ciphertext + tag).
    pub fn encrypt_frame(
        &mut self,
        frame_type: FrameType,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, mediaremote_core::error::Error> {
        let header = frames::header(frame_type, plaintext.len() + 16)?;

        let nonce = nonce_from_counter(self.write_counter);
        let sealed = self
            .write_cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &header,
                },
            )
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
        self.write_counter += 1;

        let mut frame = Vec::with_capacity(4 + sealed.len());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&sealed);
        Ok(frame)
    }

    /// Decrypt one frame body, authenticating its header as AAD.
    pub fn decrypt_frame(
        &mut self,
        frame_type: FrameType,
        sealed: &[u8],
    ) -> Result<Vec<u8>, mediaremote_core::error::Error> {
        if sealed.len() < 16 {
            return Err(ProtocolError::InvalidFormat(
                "encrypted frame shorter than its tag".to_string(),
            )
            .into());
        }
        let header = frames::header(frame_type, sealed.len())?;

        let nonce = nonce_from_counter(self.read_counter);
        let plaintext = self
            .read_cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: sealed,
                    aad: &header,
                },
            )
            .map_err(|_| CryptoError::AuthFailure)?;
        self.read_counter += 1;
        Ok(plaintext)
    }

    pub fn write_counter(&self) -> u64 {
        self.write_counter
    }

    pub fn read_counter(&self) -> u64 {
        self.read_counter
    }
}

fn nonce_from_counter(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..12].copy_from_slice(&counter.to_le_bytes());
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::split_frames;

    fn peered() -> (CompanionSession, CompanionSession) {
        let a = [0x11; 32];
        let b = [0x22; 32];
        (CompanionSession::new(a, b), CompanionSession::new(b, a))
    }

    #[test]
    fn frame_roundtrip() {
        let (mut us, mut peer) = peered();
        let frame = us.encrypt_frame(FrameType::EOpack, b"payload").unwrap();

        let (frames, consumed) = split_frames(&frame).unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, FrameType::EOpack);

        let plaintext = peer
            .decrypt_frame(FrameType::EOpack, &frames[0].body)
            .unwrap();
        assert_eq!(plaintext, b"payload");
    }

    #[test]
    fn header_length_covers_the_tag() {
        let (mut us, _) = peered();
        let frame = us.encrypt_frame(FrameType::EOpack, b"abc").unwrap();
        assert_eq!(frame[0], 0x08);
        let body_len = ((frame[1] as usize) << 16) | ((frame[2] as usize) << 8) | frame[3] as usize;
        assert_eq!(body_len, 3 + 16);
    }

    #[test]
    fn counters_advance_per_message() {
        let (mut us, mut peer) = peered();
        assert_eq!(us.write_counter(), 0);
        for expected in 1..=3u64 {
            let frame = us.encrypt_frame(FrameType::EOpack, b"tick").unwrap();
            assert_eq!(us.write_counter(), expected);
            peer.decrypt_frame(FrameType::EOpack, &frame[4..]).unwrap();
            assert_eq!(peer.read_counter(), expected);
        }
    }

    #[test]
    fn no_chunking_for_large_payloads() {
        let (mut us, mut peer) = peered();
        let payload = vec![0x42; 5000];
        let frame = us.encrypt_frame(FrameType::EOpack, &payload).unwrap();
        // One frame, one counter step.
        assert_eq!(us.write_counter(), 1);
        assert_eq!(frame.len(), 4 + 5000 + 16);
        assert_eq!(
            peer.decrypt_frame(FrameType::EOpack, &frame[4..]).unwrap(),
            payload
        );
    }

    #[test]
    fn tampered_header_fails_authentication() {
        let (mut us, mut peer) = peered();
        let frame = us.encrypt_frame(FrameType::EOpack, b"secret").unwrap();
        // Claim a different frame type than was authenticated.
        assert!(peer.decrypt_frame(FrameType::PvNext, &frame[4..]).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let (mut us, mut peer) = peered();
        let mut frame = us.encrypt_frame(FrameType::EOpack, b"secret").unwrap();
        frame[5] ^= 0xFF;
        assert!(peer.decrypt_frame(FrameType::EOpack, &frame[4..]).is_err());
    }

    #[test]
    fn out_of_order_frames_fail() {
        let (mut us, mut peer) = peered();
        let _first = us.encrypt_frame(FrameType::EOpack, b"one").unwrap();
        let second = us.encrypt_frame(FrameType::EOpack, b"two").unwrap();
        assert!(peer.decrypt_frame(FrameType::EOpack, &second[4..]).is_err());
    }

    #[test]
    fn short_body_is_rejected() {
        let (_, mut peer) = peered();
        assert!(peer.decrypt_frame(FrameType::EOpack, &[0u8; 15]).is_err());
    }
}
