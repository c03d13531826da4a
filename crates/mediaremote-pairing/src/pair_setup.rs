//! Pair-setup protocol (M1-M6).
//!
//! SRP-6a with the device PIN establishes a shared secret; M5/M6 then
//! exchange long-term Ed25519 identities under a key derived from it. The
//! result is a durable credential record.

use mediaremote_core::credentials::Credentials;
use mediaremote_core::error::{Error, PairingError, Result};
use mediaremote_crypto::{
    chacha::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_label},
    ed25519::{self, IdentityKeyPair},
    hkdf,
    srp::{SrpChallenge, SrpClient, SrpProof},
    tlv::{Tlv8, TlvTag},
};
use tracing::debug;

use crate::traits::PairingTransport;

const PS_MSG05_NONCE: &[u8] = b"PS-Msg05";
const PS_MSG06_NONCE: &[u8] = b"PS-Msg06";

/// SRP username fixed by the protocol.
const SRP_USERNAME: &[u8] = b"Pair-Setup";

/// Pair-setup state machine.
pub struct PairSetup {
    state: State,
    pin: String,
    client_id: String,
    identity: IdentityKeyPair,
    srp_client: Option<SrpClient>,
    srp_proof: Option<SrpProof>,
    session_key: Option<[u8; 32]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    M1Sent,
    M2Received,
    M3Sent,
    M4Received,
    M5Sent,
    Complete,
    Failed,
}

impl PairSetup {
    /// Create a new pair-setup for the given PIN and client identity.
    ///
    /// The same `client_id` must later be presented in pair-verify M3 for
    /// the device to recognize the pairing.
    pub fn new(pin: &str, client_id: &str, identity: IdentityKeyPair) -> Self {
        Self {
            state: State::Initial,
            pin: pin.to_string(),
            client_id: client_id.to_string(),
            identity,
            srp_client: None,
            srp_proof: None,
            session_key: None,
        }
    }

    fn fail<T>(&mut self, err: impl Into<Error>) -> Result<T> {
        self.state = State::Failed;
        Err(err.into())
    }

    fn expect_state(&mut self, expected: State, message: &'static str) -> Result<()> {
        if self.state != expected {
            let detail = format!("{} out of order (state {:?})", message, self.state);
            self.state = State::Failed;
            return Err(Error::Pairing(PairingError::InvalidState(detail)));
        }
        Ok(())
    }

    /// Check a reply for a peer error and the expected sequence number.
    fn check_reply(&mut self, tlv: &Tlv8, message: &'static str, sequence: u8) -> Result<()> {
        if let Some(code) = tlv.error() {
            if code != 0 {
                self.state = State::Failed;
                return Err(Error::Pairing(PairingError::Peer { message, code }));
            }
        }
        if tlv.sequence() != Some(sequence) {
            self.state = State::Failed;
            return Err(Error::Pairing(PairingError::Protocol {
                message,
                detail: format!(
                    "wrong sequence: expected {}, got {:?}",
                    sequence,
                    tlv.sequence()
                ),
            }));
        }
        Ok(())
    }

    /// Generate M1: `{Method=0, Sequence=1}`, Method first on the wire.
    pub fn generate_m1(&mut self) -> Result<Vec<u8>> {
        self.expect_state(State::Initial, "M1")?;

        self.srp_client = Some(SrpClient::new(SRP_USERNAME, self.pin.as_bytes()));

        let mut tlv = Tlv8::new();
        tlv.set(TlvTag::Method, vec![0x00]);
        tlv.set(TlvTag::Sequence, vec![0x01]);

        self.state = State::M1Sent;
        Ok(tlv.encode())
    }

    /// Process M2: `{Sequence=2, Salt(16), ServerPublicKey}`.
    pub fn process_m2(&mut self, response: &[u8]) -> Result<()> {
        self.expect_state(State::M1Sent, "M2")?;

        let tlv = match Tlv8::parse(response) {
            Ok(tlv) => tlv,
            Err(e) => return self.fail(e),
        };
        self.check_reply(&tlv, "M2", 0x02)?;

        let salt = match tlv.get(TlvTag::Salt) {
            Some(salt) if salt.len() == 16 => {
                let mut arr = [0u8; 16];
                arr.copy_from_slice(salt);
                arr
            }
            Some(salt) => {
                let detail = format!("salt has wrong length {}", salt.len());
                return self.fail(PairingError::Protocol {
                    message: "M2",
                    detail,
                });
            }
            None => {
                return self.fail(PairingError::MissingTlv {
                    message: "M2",
                    tag: TlvTag::Salt as u8,
                })
            }
        };

        let server_pk_raw = match tlv.get(TlvTag::PublicKey) {
            Some(pk) => pk,
            None => {
                return self.fail(PairingError::MissingTlv {
                    message: "M2",
                    tag: TlvTag::PublicKey as u8,
                })
            }
        };

        // Peers may strip leading zero bytes from the 384-byte value.
        let server_pk = if server_pk_raw.len() <= 384 {
            let mut padded = vec![0u8; 384 - server_pk_raw.len()];
            padded.extend_from_slice(server_pk_raw);
            padded
        } else {
            let detail = format!("server public key too long: {}", server_pk_raw.len());
            return self.fail(PairingError::Protocol {
                message: "M2",
                detail,
            });
        };

        let srp_client = self.srp_client.as_ref().expect("set in generate_m1");
        let proof = match srp_client.process_challenge(&SrpChallenge {
            salt,
            server_public_key: server_pk,
        }) {
            Ok(proof) => proof,
            Err(e) => return self.fail(e),
        };

        self.srp_proof = Some(proof);
        self.state = State::M2Received;
        Ok(())
    }

    /// Generate M3: `{Sequence=3, ClientPublicKey, Proof}`.
    pub fn generate_m3(&mut self) -> Result<Vec<u8>> {
        self.expect_state(State::M2Received, "M3")?;

        let srp_client = self.srp_client.as_ref().expect("set in generate_m1");
        let proof = self.srp_proof.as_ref().expect("set in process_m2");

        let mut tlv = Tlv8::new();
        tlv.set(TlvTag::Sequence, vec![0x03]);
        tlv.set(TlvTag::PublicKey, srp_client.public_key());
        tlv.set(TlvTag::Proof, proof.client_proof.clone());

        self.state = State::M3Sent;
        Ok(tlv.encode())
    }

    /// Process M4: `{Sequence=4, Proof}`; verifies the server proof.
    pub fn process_m4(&mut self, response: &[u8]) -> Result<()> {
        self.expect_state(State::M3Sent, "M4")?;

        let tlv = match Tlv8::parse(response) {
            Ok(tlv) => tlv,
            Err(e) => return self.fail(e),
        };
        self.check_reply(&tlv, "M4", 0x04)?;

        let server_proof = match tlv.get(TlvTag::Proof) {
            Some(p) => p,
            None => {
                return self.fail(PairingError::MissingTlv {
                    message: "M4",
                    tag: TlvTag::Proof as u8,
                })
            }
        };

        let srp_client = self.srp_client.as_ref().expect("set in generate_m1");
        let proof = self.srp_proof.as_ref().expect("set in process_m2");
        if !srp_client.verify_server_proof(server_proof, &proof.expected_server_proof) {
            return self.fail(PairingError::SrpProofMismatch);
        }

        let session_key = match hkdf::derive_pair_setup_key(&proof.shared_secret) {
            Ok(key) => key,
            Err(e) => return self.fail(e),
        };

        self.session_key = Some(session_key);
        self.state = State::M4Received;
        Ok(())
    }

    /// Generate M5: `{Sequence=5, EncryptedData}`.
    ///
    /// The encrypted sub-TLV carries our identifier, long-term public key,
    /// and a signature over the HKDF signing material || id || key.
    pub fn generate_m5(&mut self) -> Result<Vec<u8>> {
        self.expect_state(State::M4Received, "M5")?;

        let session_key = self.session_key.as_ref().expect("set in process_m4");
        let proof = self.srp_proof.as_ref().expect("set in process_m2");

        let sign_material = match hkdf::derive_controller_sign_material(&proof.shared_secret) {
            Ok(m) => m,
            Err(e) => {
                self.state = State::Failed;
                return Err(e.into());
            }
        };

        let mut message = Vec::with_capacity(32 + self.client_id.len() + 32);
        message.extend_from_slice(&sign_material);
        message.extend_from_slice(self.client_id.as_bytes());
        message.extend_from_slice(&self.identity.public_key());
        let signature = self.identity.sign(&message);

        let mut inner = Tlv8::new();
        inner.set(TlvTag::Identifier, self.client_id.as_bytes().to_vec());
        inner.set(TlvTag::PublicKey, self.identity.public_key().to_vec());
        inner.set(TlvTag::Signature, signature.to_vec());

        let nonce = nonce_from_label(PS_MSG05_NONCE);
        let encrypted = match encrypt_with_nonce(session_key, &nonce, &inner.encode()) {
            Ok(data) => data,
            Err(e) => {
                self.state = State::Failed;
                return Err(e.into());
            }
        };

        let mut tlv = Tlv8::new();
        tlv.set(TlvTag::Sequence, vec![0x05]);
        tlv.set(TlvTag::EncryptedData, encrypted);

        self.state = State::M5Sent;
        Ok(tlv.encode())
    }

    /// Process M6: `{Sequence=6, EncryptedData}`; completes pairing and
    /// returns the durable credential record.
    pub fn process_m6(&mut self, response: &[u8]) -> Result<Credentials> {
        self.expect_state(State::M5Sent, "M6")?;

        let tlv = match Tlv8::parse(response) {
            Ok(tlv) => tlv,
            Err(e) => return self.fail(e),
        };
        self.check_reply(&tlv, "M6", 0x06)?;

        let encrypted = match tlv.get(TlvTag::EncryptedData) {
            Some(data) => data,
            None => {
                return self.fail(PairingError::MissingTlv {
                    message: "M6",
                    tag: TlvTag::EncryptedData as u8,
                })
            }
        };

        let session_key = self.session_key.as_ref().expect("set in process_m4");
        let nonce = nonce_from_label(PS_MSG06_NONCE);
        let decrypted = match decrypt_with_nonce(session_key, &nonce, encrypted) {
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
                    message: "M6",
                    tag: TlvTag::Identifier as u8,
                })
            }
        };
        let server_pk = match inner.get(TlvTag::PublicKey) {
            Some(pk) if pk.len() == 32 => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(pk);
                arr
            }
            _ => {
                return self.fail(PairingError::MissingTlv {
                    message: "M6",
                    tag: TlvTag::PublicKey as u8,
                })
            }
        };
        let server_sig = match inner.get(TlvTag::Signature) {
            Some(sig) if sig.len() == 64 => {
                let mut arr = [0u8; 64];
                arr.copy_from_slice(sig);
                arr
            }
            _ => {
                return self.fail(PairingError::MissingTlv {
                    message: "M6",
                    tag: TlvTag::Signature as u8,
                })
            }
        };

        let proof = self.srp_proof.as_ref().expect("set in process_m2");
        let sign_material = match hkdf::derive_accessory_sign_material(&proof.shared_secret) {
            Ok(m) => m,
            Err(e) => return self.fail(e),
        };

        let mut message = Vec::with_capacity(32 + server_id.len() + 32);
        message.extend_from_slice(&sign_material);
        message.extend_from_slice(&server_id);
        message.extend_from_slice(&server_pk);

        if ed25519::verify(&server_pk, &message, &server_sig).is_err() {
            return self.fail(PairingError::SignatureInvalid);
        }

        self.state = State::Complete;
        debug!(server_id = %String::from_utf8_lossy(&server_id), "pair-setup complete");

        Ok(Credentials {
            client_id: self.client_id.clone(),
            client_ltsk: self.identity.seed(),
            client_ltpk: self.identity.public_key(),
            server_ltpk: server_pk,
            server_id: String::from_utf8_lossy(&server_id).into_owned(),
            companion: None,
        })
    }

    /// Whether pairing completed successfully.
    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }
}

/// Run the full pair-setup exchange over a transport.
pub async fn pair_setup<T: PairingTransport>(
    transport: &mut T,
    pin: &str,
    client_id: &str,
    identity: IdentityKeyPair,
) -> Result<Credentials> {
    transport.pin_start().await?;

    let mut engine = PairSetup::new(pin, client_id, identity);

    let m1 = engine.generate_m1()?;
    let m2 = transport.send_setup(true, &m1).await?;
    engine.process_m2(&m2)?;

    let m3 = engine.generate_m3()?;
    let m4 = transport.send_setup(false, &m3).await?;
    engine.process_m4(&m4)?;

    let m5 = engine.generate_m5()?;
    let m6 = transport.send_setup(false, &m5).await?;
    engine.process_m6(&m6)
}

/// Server half of pair-setup, for handshake tests.
#[cfg(test)]
pub(crate) struct MockSetupServer {
    identity: IdentityKeyPair,
    server_id: Vec<u8>,
    srp: mediaremote_crypto::srp::test_server::SrpServer,
    session_key: Option<[u8; 32]>,
}

#[cfg(test)]
impl MockSetupServer {
    pub(crate) fn new(pin: &str) -> Self {
        use rand::RngCore;
        let mut salt = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Self {
            identity: IdentityKeyPair::generate(),
            server_id: b"AA:BB:CC:DD:EE:FF".to_vec(),
            srp: mediaremote_crypto::srp::test_server::SrpServer::new(
                SRP_USERNAME,
                pin.as_bytes(),
                salt,
            ),
            session_key: None,
        }
    }

    pub(crate) fn generate_m2(&self) -> Vec<u8> {
        let challenge = self.srp.challenge();
        let mut tlv = Tlv8::new();
        tlv.set(TlvTag::Sequence, vec![0x02]);
        tlv.set(TlvTag::Salt, challenge.salt.to_vec());
        tlv.set(TlvTag::PublicKey, challenge.server_public_key);
        tlv.encode()
    }

    pub(crate) fn process_m3(&mut self, m3: &[u8]) -> Vec<u8> {
        let tlv = Tlv8::parse(m3).unwrap();
        let client_pk = tlv.get(TlvTag::PublicKey).unwrap();

        let m2_proof = self.srp.compute_session(client_pk, SRP_USERNAME);
        let shared = self.srp.shared_secret.clone().unwrap();
        self.session_key = Some(hkdf::derive_pair_setup_key(&shared).unwrap());

        let mut tlv = Tlv8::new();
        tlv.set(TlvTag::Sequence, vec![0x04]);
        tlv.set(TlvTag::Proof, m2_proof);
        tlv.encode()
    }

    pub(crate) fn process_m5(&self, m5: &[u8]) -> Vec<u8> {
        let tlv = Tlv8::parse(m5).unwrap();
        let encrypted = tlv.get(TlvTag::EncryptedData).unwrap();
        let session_key = self.session_key.as_ref().unwrap();

        let nonce = nonce_from_label(PS_MSG05_NONCE);
        decrypt_with_nonce(session_key, &nonce, encrypted).unwrap();

        let shared = self.srp.shared_secret.as_ref().unwrap();
        let sign_material = hkdf::derive_accessory_sign_material(shared).unwrap();

        let mut message = Vec::new();
        message.extend_from_slice(&sign_material);
        message.extend_from_slice(&self.server_id);
        message.extend_from_slice(&self.identity.public_key());
        let signature = self.identity.sign(&message);

        let mut inner = Tlv8::new();
        inner.set(TlvTag::Identifier, self.server_id.clone());
        inner.set(TlvTag::PublicKey, self.identity.public_key().to_vec());
        inner.set(TlvTag::Signature, signature.to_vec());

        let nonce = nonce_from_label(PS_MSG06_NONCE);
        let encrypted = encrypt_with_nonce(session_key, &nonce, &inner.encode()).unwrap();

        let mut tlv = Tlv8::new();
        tlv.set(TlvTag::Sequence, vec![0x06]);
        tlv.set(TlvTag::EncryptedData, encrypted);
        tlv.encode()
    }

    pub(crate) fn public_key(&self) -> [u8; 32] {
        self.identity.public_key()
    }
}
