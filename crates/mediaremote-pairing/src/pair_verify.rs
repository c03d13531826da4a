//! Pair-verify protocol (M1-M4).
//!
//! An ephemeral X25519 exchange plus mutual Ed25519 proofs over the stored
//! long-term keys. Completion yields the connection's shared secret and the
//! first channel's directional keys; further channels derive their own keys
//! from the same secret.

use mediaremote_core::credentials::Credentials;
use mediaremote_core::error::{Error, PairingError, Result};
use mediaremote_crypto::{
    chacha::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_label},
    curve25519::EcdhKeyPair,
    ed25519::{self, IdentityKeyPair},
    hkdf,
    keys::{SessionKeys, SharedSecret},
    tlv::{Tlv8, TlvTag},
};
use tracing::debug;

use crate::traits::PairingTransport;

const PV_MSG02_NONCE: &[u8] = b"PV-Msg02";
const PV_MSG03_NONCE: &[u8] = b"PV-Msg03";

/// Which protocol the verified session will carry.
///
/// The handshake is identical; only the post-success key derivation differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyVariant {
    /// Control-channel keys from `Control-Salt`.
    AirPlay,
    /// Channel keys from `ClientEncrypt-main`/`ServerEncrypt-main`.
    Companion,
}

/// Output of a completed pair-verify.
pub struct VerifiedSession {
    /// The X25519 shared secret; event/data channels derive from this.
    pub shared_secret: SharedSecret,
    /// Directional keys for the variant's primary channel.
    pub channel_keys: SessionKeys,
}

impl std::fmt::Debug for VerifiedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedSession").finish_non_exhaustive()
    }
}

/// Pair-verify state machine.
pub struct PairVerify {
    state: State,
    variant: VerifyVariant,
    client_id: String,
    identity: IdentityKeyPair,
    server_ltpk: [u8; 32],
    ecdh: Option<EcdhKeyPair>,
    client_public: Option<[u8; 32]>,
    server_public: Option<[u8; 32]>,
    shared_secret: Option<[u8; 32]>,
    verify_key: Option<[u8; 32]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    M1Sent,
    M2Received,
    M3Sent,
    Complete,
    Failed,
}

impl PairVerify {
    /// Create a new pair-verify from stored credentials.
    pub fn new(credentials: &Credentials, variant: VerifyVariant) -> Self {
        Self {
            state: State::Initial,
            variant,
            client_id: credentials.client_id.clone(),
            identity: IdentityKeyPair::from_seed(&credentials.client_ltsk),
            server_ltpk: credentials.server_ltpk,
            ecdh: None,
            client_public: None,
            server_public: None,
            shared_secret: None,
            verify_key: None,
        }
    }

    fn fail<T>(&mut self, err: impl Into<Error>) -> Result<T> {
        self.state = State::Failed;
        Err(err.into())
    }

    /// Generate M1: `{Sequence=1, PublicKey=ephemeral}`.
    ///
    /// Sequence must precede PublicKey on the wire.
    pub fn generate_m1(&mut self) -> Result<Vec<u8>> {
        if self.state != State::Initial {
            return self.fail(PairingError::InvalidState(
                "M1 out of order".to_string(),
            ));
        }

        let ecdh = EcdhKeyPair::generate();
        self.client_public = Some(ecdh.public_key());

        let mut tlv = Tlv8::new();
        tlv.set(TlvTag::Sequence, vec![0x01]);
        tlv.set(TlvTag::PublicKey, ecdh.public_key().to_vec());

        self.ecdh = Some(ecdh);
        self.state = State::M1Sent;
        Ok(tlv.encode())
    }

    /// Process M2: `{PublicKey=server-ephemeral, EncryptedData}`.
    ///
    /// Decrypts the server's proof and verifies its Ed25519 signature over
    /// `server-ephemeral || server-identifier || client-ephemeral` with the
    /// stored long-term key.
    pub fn process_m2(&mut self, response: &[u8]) -> Result<()> {
        if self.state != State::M1Sent {
            return self.fail(PairingError::InvalidState(
                "M2 out of order".to_string(),
            ));
        }

        let tlv = match Tlv8::parse(response) {
            Ok(tlv) => tlv,
            Err(e) => return self.fail(e),
        };
        if let Some(code) = tlv.error() {
            if code != 0 {
                return self.fail(PairingError::Peer {
                    message: "M2",
                    code,
                });
            }
        }

        let server_public: [u8; 32] = match tlv.get(TlvTag::PublicKey) {
            Some(pk) if pk.len() == 32 => pk.try_into().expect("length checked"),
            Some(pk) => {
                let detail = format!("ephemeral key has wrong length {}", pk.len());
                return self.fail(PairingError::Protocol {
                    message: "M2",
                    detail,
                });
            }
            None => {
                return self.fail(PairingError::MissingTlv {
                    message: "M2",
                    tag: TlvTag::PublicKey as u8,
                })
            }
        };
        let encrypted = match tlv.get(TlvTag::EncryptedData) {
            Some(data) => data,
            None => {
                return self.fail(PairingError::MissingTlv {
                    message: "M2",
                    tag: TlvTag::EncryptedData as u8,
                })
            }
        };

        let ecdh = self.ecdh.take().expect("set in generate_m1");
        let shared = match ecdh.diffie_hellman(&server_public) {
            Ok(shared) => shared,
            Err(e) => return self.fail(e),
        };
        let verify_key = match hkdf::derive_pair_verify_key(&shared) {
            Ok(key) => key,
            Err(e) => return self.fail(e),
        };

        let nonce = nonce_from_label(PV_MSG02_NONCE);
        let decrypted = match decrypt_with_nonce(&verify_key, &nonce, encrypted) {
            Ok(data) => data,
            Err(e) => return self.fail(e),
        };

        let inner = match Tlv8::parse(&decrypted) {
            Ok(tlv) => tlv,
            Err(e) => return self.fail(e),
        };
        let server_id = match inner.get(TlvTag::Identifier) {
            Some(id) => id.to_vec(),
            None => {
                return self.fail(PairingError::MissingTlv {
                    message: "M2",
                    tag: TlvTag::Identifier as u8,
                })
            }
        };
        let signature: [u8; 64] = match inner.get(TlvTag::Signature) {
            Some(sig) if sig.len() == 64 => sig.try_into().expect("length checked"),
            _ => {
                return self.fail(PairingError::MissingTlv {
                    message: "M2",
                    tag: TlvTag::Signature as u8,
                })
            }
        };

        let client_public = self.client_public.expect("set in generate_m1");
        let mut message = Vec::with_capacity(64 + server_id.len());
        message.extend_from_slice(&server_public);
        message.extend_from_slice(&server_id);
        message.extend_from_slice(&client_public);

        if ed25519::verify(&self.server_ltpk, &message, &signature).is_err() {
            return self.fail(PairingError::SignatureInvalid);
        }

        self.server_public = Some(server_public);
        self.shared_secret = Some(shared);
        self.verify_key = Some(verify_key);
        self.state = State::M2Received;
        Ok(())
    }

    /// Generate M3: `{Sequence=3, EncryptedData}`.
    ///
    /// The encrypted sub-TLV carries our identifier and a signature over
    /// `client-ephemeral || client-identifier || server-ephemeral`.
    pub fn generate_m3(&mut self) -> Result<Vec<u8>> {
        if self.state != State::M2Received {
            return self.fail(PairingError::InvalidState(
                "M3 out of order".to_string(),
            ));
        }

        let client_public = self.client_public.expect("set in generate_m1");
        let server_public = self.server_public.expect("set in process_m2");
        let verify_key = self.verify_key.expect("set in process_m2");

        let mut message = Vec::with_capacity(64 + self.client_id.len());
        message.extend_from_slice(&client_public);
        message.extend_from_slice(self.client_id.as_bytes());
        message.extend_from_slice(&server_public);
        let signature = self.identity.sign(&message);

        let mut inner = Tlv8::new();
        inner.set(TlvTag::Identifier, self.client_id.as_bytes().to_vec());
        inner.set(TlvTag::Signature, signature.to_vec());

        let nonce = nonce_from_label(PV_MSG03_NONCE);
        let encrypted = match encrypt_with_nonce(&verify_key, &nonce, &inner.encode()) {
            Ok(data) => data,
            Err(e) => return self.fail(e),
        };

        let mut tlv = Tlv8::new();
        tlv.set(TlvTag::Sequence, vec![0x03]);
        tlv.set(TlvTag::EncryptedData, encrypted);

        self.state = State::M3Sent;
        Ok(tlv.encode())
    }

    /// Process M4, completing verification and deriving channel keys.
    pub fn process_m4(&mut self, response: &[u8]) -> Result<VerifiedSession> {
        if self.state != State::M3Sent {
            return self.fail(PairingError::InvalidState(
                "M4 out of order".to_string(),
            ));
        }

        let tlv = match Tlv8::parse(response) {
            Ok(tlv) => tlv,
            Err(e) => return self.fail(e),
        };
        if let Some(code) = tlv.error() {
            if code != 0 {
                return self.fail(PairingError::Peer {
                    message: "M4",
                    code,
                });
            }
        }

        let shared = SharedSecret::new(
            self.shared_secret.expect("set in process_m2").to_vec(),
        );
        let channel_keys = match self.variant {
            VerifyVariant::AirPlay => SessionKeys::derive_control(&shared),
            VerifyVariant::Companion => SessionKeys::derive_companion(&shared),
        };
        let channel_keys = match channel_keys {
            Ok(keys) => keys,
            Err(e) => return self.fail(e),
        };

        self.state = State::Complete;
        debug!(variant = ?self.variant, "pair-verify complete");
        Ok(VerifiedSession {
            shared_secret: shared,
            channel_keys,
        })
    }

    /// Whether verification completed successfully.
    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }
}

/// Run the full pair-verify exchange over a transport.
pub async fn pair_verify<T: PairingTransport>(
    transport: &mut T,
    credentials: &Credentials,
    variant: VerifyVariant,
) -> Result<VerifiedSession> {
    let mut engine = PairVerify::new(credentials, variant);

    let m1 = engine.generate_m1()?;
    let m2 = transport.send_verify(true, &m1).await?;
    engine.process_m2(&m2)?;

    let m3 = engine.generate_m3()?;
    let m4 = transport.send_verify(false, &m3).await?;
    engine.process_m4(&m4)
}

/// Server half of pair-verify, for handshake tests.
#[cfg(test)]
pub(crate) struct MockVerifyServer {
    identity: IdentityKeyPair,
    server_id: Vec<u8>,
    known_client_ltpk: Option<[u8; 32]>,
    ecdh_public: Option<[u8; 32]>,
    client_public: Option<[u8; 32]>,
    shared_secret: Option<[u8; 32]>,
    verify_key: Option<[u8; 32]>,
}

#[cfg(test)]
impl MockVerifyServer {
    pub(crate) fn new(identity: IdentityKeyPair) -> Self {
        Self {
            identity,
            server_id: b"AA:BB:CC:DD:EE:FF".to_vec(),
            known_client_ltpk: None,
            ecdh_public: None,
            client_public: None,
            shared_secret: None,
            verify_key: None,
        }
    }

    pub(crate) fn with_known_client(mut self, ltpk: [u8; 32]) -> Self {
        self.known_client_ltpk = Some(ltpk);
        self
    }

    pub(crate) fn process_m1(&mut self, m1: &[u8]) -> Vec<u8> {
        let tlv = Tlv8::parse(m1).unwrap();
        assert_eq!(tlv.sequence(), Some(0x01));
        let client_public: [u8; 32] =
            tlv.get(TlvTag::PublicKey).unwrap().try_into().unwrap();
        self.client_public = Some(client_public);

        let ecdh = EcdhKeyPair::generate();
        let server_public = ecdh.public_key();
        self.ecdh_public = Some(server_public);

        let shared = ecdh.diffie_hellman(&client_public).unwrap();
        let verify_key = hkdf::derive_pair_verify_key(&shared).unwrap();
        self.shared_secret = Some(shared);
        self.verify_key = Some(verify_key);

        let mut message = Vec::new();
        message.extend_from_slice(&server_public);
        message.extend_from_slice(&self.server_id);
        message.extend_from_slice(&client_public);
        let signature = self.identity.sign(&message);

        let mut inner = Tlv8::new();
        inner.set(TlvTag::Identifier, self.server_id.clone());
        inner.set(TlvTag::Signature, signature.to_vec());

        let nonce = nonce_from_label(PV_MSG02_NONCE);
        let encrypted =
            encrypt_with_nonce(&verify_key, &nonce, &inner.encode()).unwrap();

        let mut tlv = Tlv8::new();
        tlv.set(TlvTag::Sequence, vec![0x02]);
        tlv.set(TlvTag::PublicKey, server_public.to_vec());
        tlv.set(TlvTag::EncryptedData, encrypted);
        tlv.encode()
    }

    pub(crate) fn process_m3(&mut self, m3: &[u8]) -> Vec<u8> {
        let tlv = Tlv8::parse(m3).unwrap();
        let encrypted = tlv.get(TlvTag::EncryptedData).unwrap();

        let nonce = nonce_from_label(PV_MSG03_NONCE);
        let decrypted =
            decrypt_with_nonce(self.verify_key.as_ref().unwrap(), &nonce, encrypted).unwrap();
        let inner = Tlv8::parse(&decrypted).unwrap();

        let mut reply = Tlv8::new();
        reply.set(TlvTag::Sequence, vec![0x04]);

        // Verify the client proof when the pairing record is known.
        if let Some(ltpk) = self.known_client_ltpk {
            let id = inner.get(TlvTag::Identifier).unwrap();
            let signature: [u8; 64] =
                inner.get(TlvTag::Signature).unwrap().try_into().unwrap();

            let mut message = Vec::new();
            message.extend_from_slice(&self.client_public.unwrap());
            message.extend_from_slice(id);
            message.extend_from_slice(&self.ecdh_public.unwrap());

            if ed25519::verify(&ltpk, &message, &signature).is_err() {
                reply.set(TlvTag::Error, vec![0x02]);
            }
        }
        reply.encode()
    }

    pub(crate) fn shared_secret(&self) -> &[u8] {
        self.shared_secret.as_ref().unwrap()
    }
}
