//! Ed25519 long-term identity keys.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use mediaremote_core::error::CryptoError;
use rand::rngs::OsRng;
use zeroize::ZeroizeOnDrop;

/// Long-term Ed25519 identity key pair.
///
/// Clone is implemented so the same identity can serve pair-setup and
/// pair-verify; both copies zeroize on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    #[zeroize(skip)]
    public: [u8; 32],
    seed: [u8; 32],
}

impl IdentityKeyPair {
    /// Generate a new random identity key pair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            public: signing_key.verifying_key().to_bytes(),
            seed: signing_key.to_bytes(),
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self {
            public: signing_key.verifying_key().to_bytes(),
            seed: *seed,
        }
    }

    /// The public key (32 bytes).
    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// The seed, for credential storage (32 bytes).
    pub fn seed(&self) -> [u8; 32] {
        self.seed
    }

    /// Sign a message, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        SigningKey::from_bytes(&self.seed).sign(message).to_bytes()
    }
}

/// Verify an Ed25519 signature.
pub fn verify(
    public_key: &[u8; 32],
    message: &[u8],
    signature: &[u8; 64],
) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    verifying_key
        .verify(message, &Signature::from_bytes(signature))
        .map_err(|_| CryptoError::AuthFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let identity = IdentityKeyPair::generate();
        let message = b"ephemeral || identifier || peer-ephemeral";
        let signature = identity.sign(message);
        assert!(verify(&identity.public_key(), message, &signature).is_ok());
    }

    #[test]
    fn from_seed_is_deterministic() {
        let seed = [0x42u8; 32];
        let a = IdentityKeyPair::from_seed(&seed);
        let b = IdentityKeyPair::from_seed(&seed);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.seed(), seed);
    }

    #[test]
    fn generate_creates_unique_identities() {
        let a = IdentityKeyPair::generate();
        let b = IdentityKeyPair::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn verify_fails_on_tampered_message() {
        let identity = IdentityKeyPair::generate();
        let signature = identity.sign(b"original");
        assert!(verify(&identity.public_key(), b"tampered", &signature).is_err());
    }

    #[test]
    fn verify_fails_on_tampered_signature() {
        let identity = IdentityKeyPair::generate();
        let mut signature = identity.sign(b"message");
        signature[0] ^= 0xFF;
        assert!(verify(&identity.public_key(), b"message", &signature).is_err());
    }

    #[test]
    fn verify_fails_with_wrong_key() {
        let signer = IdentityKeyPair::generate();
        let other = IdentityKeyPair::generate();
        let signature = signer.sign(b"message");
        assert!(verify(&other.public_key(), b"message", &signature).is_err());
    }
}
