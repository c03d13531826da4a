//! ChaCha20-Poly1305 AEAD sessions with HAP chunk framing.
//!
//! A HAP frame is `[u16_le len][ciphertext][16-byte tag]` with AAD = the two
//! length bytes. Nonces are 12 bytes: four zero bytes followed by the
//! directional counter as a little-endian u64.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use mediaremote_core::error::CryptoError;
use zeroize::ZeroizeOnDrop;

/// Maximum plaintext bytes per HAP frame.
const MAX_BLOCK: usize = 0x400;

/// Encrypted channel session with directional keys and counters.
///
/// The ciphers are cached for both directions; counters start at zero when
/// the session is installed and advance by one per AEAD invocation, which
/// structurally prevents nonce reuse within a direction.
#[derive(ZeroizeOnDrop)]
pub struct HapSession {
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

impl HapSession {
    /// Create a session with separate write/read keys.
    pub fn new(write_key: [u8; 32], read_key: [u8; 32]) -> Self {
        let write_cipher = ChaCha20Poly1305::new(&write_key.into());
        let read_cipher = ChaCha20Poly1305::new(&read_key.into());
        Self {
            write_key,
            read_key,
            write_cipher,
            read_cipher,
            write_counter: 0,
            read_counter: 0,
        }
    }

    /// Create a session from a derived key set.
    pub fn from_keys(keys: &crate::keys::SessionKeys) -> Self {
        Self::new(*keys.write_key.as_bytes(), *keys.read_key.as_bytes())
    }

    /// Encrypt a write into one or more HAP frames.
    ///
    /// Writes longer than 1024 bytes are split into ceil(N/1024) frames,
    /// each consuming the next outbound nonce. An empty write produces a
    /// single zero-length frame.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let frames = plaintext.len() / MAX_BLOCK + 1;
        let mut out = Vec::with_capacity(plaintext.len() + frames * 18);

        let mut offset = 0;
        loop {
            let block_len = (plaintext.len() - offset).min(MAX_BLOCK);
            let block = &plaintext[offset..offset + block_len];
            let aad = (block_len as u16).to_le_bytes();

            let nonce = nonce_from_counter(self.write_counter);
            let payload = Payload {
                msg: block,
                aad: &aad,
            };
            let sealed = self
                .write_cipher
                .encrypt(Nonce::from_slice(&nonce), payload)
                .map_err(|e| CryptoError::Encryption(e.to_string()))?;

            out.extend_from_slice(&aad);
            out.extend_from_slice(&sealed);

            self.write_counter += 1;
            offset += block_len;
            if offset >= plaintext.len() {
                break;
            }
        }

        Ok(out)
    }

    /// Decrypt a single frame body (ciphertext plus tag, no length prefix).
    ///
    /// `plaintext_len` is the value carried in the frame's length prefix and
    /// is authenticated as AAD.
    pub fn decrypt_frame(
        &mut self,
        sealed: &[u8],
        plaintext_len: u16,
    ) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() != plaintext_len as usize + 16 {
            return Err(CryptoError::AuthFailure);
        }

        let aad = plaintext_len.to_le_bytes();
        let nonce = nonce_from_counter(self.read_counter);
        let payload = Payload {
            msg: sealed,
            aad: &aad,
        };
        let plaintext = self
            .read_cipher
            .decrypt(Nonce::from_slice(&nonce), payload)
            .map_err(|_| CryptoError::AuthFailure)?;

        self.read_counter += 1;
        Ok(plaintext)
    }

    /// Decrypt one or more complete frames, reassembling plaintext in order.
    pub fn decrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut out = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            if offset + 2 > data.len() {
                return Err(CryptoError::AuthFailure);
            }
            let plaintext_len = u16::from_le_bytes([data[offset], data[offset + 1]]);
            offset += 2;

            let frame_end = offset + plaintext_len as usize + 16;
            if frame_end > data.len() {
                return Err(CryptoError::AuthFailure);
            }

            let plaintext = self.decrypt_frame(&data[offset..frame_end], plaintext_len)?;
            out.extend_from_slice(&plaintext);
            offset = frame_end;
        }

        Ok(out)
    }

    /// Total on-wire size of the frame at the start of `data`, if the
    /// length prefix is complete.
    pub fn parse_frame_length(data: &[u8]) -> Option<usize> {
        if data.len() < 2 {
            return None;
        }
        let len = u16::from_le_bytes([data[0], data[1]]) as usize;
        Some(2 + len + 16)
    }

    /// Current outbound counter.
    pub fn write_counter(&self) -> u64 {
        self.write_counter
    }

    /// Current inbound counter.
    pub fn read_counter(&self) -> u64 {
        self.read_counter
    }
}

/// Build the 12-byte counter nonce: 4 zero bytes + u64 LE counter.
fn nonce_from_counter(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..12].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Encrypt with an explicit 12-byte nonce and empty AAD (pairing messages).
///
/// Returns ciphertext with the 16-byte tag appended.
pub fn encrypt_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; 12],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

/// Decrypt with an explicit 12-byte nonce and empty AAD (pairing messages).
///
/// Expects ciphertext with the 16-byte tag appended.
pub fn decrypt_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < 16 {
        return Err(CryptoError::AuthFailure);
    }
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthFailure)
}

/// Build a 12-byte nonce from a label, right-aligned with zero padding.
///
/// Pairing nonces like "PV-Msg02" become `\x00\x00\x00\x00PV-Msg02`.
pub fn nonce_from_label(label: &[u8]) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    let len = label.len().min(12);
    nonce[12 - len..].copy_from_slice(&label[..len]);
    nonce
}
