//! Durable pairing credentials.
//!
//! A credential record is created by pair-setup and never mutated afterwards.
//! It holds the client's long-term Ed25519 identity, the server's long-term
//! public key, and both peers' identifiers. An AirPlay record may carry an
//! independent Companion record of the same shape under `companion`.
//!
//! The serialized form is a single JSON object with lowercase hex key
//! material; session keys are never persisted.

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ConfigError, Error, Result};

/// Long-term pairing credentials for one device.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    /// Client pairing identifier (UUID text), sent in M5/M3.
    #[serde(rename = "clientId")]
    pub client_id: String,

    /// Client long-term secret key (Ed25519 seed).
    #[serde(rename = "clientLTSK", with = "hex_key")]
    pub client_ltsk: [u8; 32],

    /// Client long-term public key.
    #[serde(rename = "clientLTPK", with = "hex_key")]
    pub client_ltpk: [u8; 32],

    /// Server long-term public key, learned in pair-setup M6.
    #[serde(rename = "serverLTPK", with = "hex_key")]
    pub server_ltpk: [u8; 32],

    /// Server pairing identifier.
    #[serde(rename = "serverId")]
    pub server_id: String,

    /// Independent Companion-protocol credentials, when paired over both.
    /// The boxed record zeroizes itself on drop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[zeroize(skip)]
    pub companion: Option<Box<Credentials>>,
}

impl Credentials {
    /// Parse from the JSON credential format.
    ///
    /// Validates that the client public key matches the seed; a record that
    /// fails this check cannot have come from a successful pair-setup.
    pub fn parse(text: &str) -> Result<Self> {
        let creds: Credentials = serde_json::from_str(text)
            .map_err(|e| Error::Config(ConfigError::InvalidCredentials(e.to_string())))?;
        creds.validate()?;
        Ok(creds)
    }

    /// Serialize to the JSON credential format.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("credential serialization is infallible")
    }

    /// Load credentials from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Save credentials to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json())?;
        Ok(())
    }

    /// Check that the signing key pair is self-consistent.
    pub fn validate(&self) -> Result<()> {
        let derived = SigningKey::from_bytes(&self.client_ltsk)
            .verifying_key()
            .to_bytes();
        if derived != self.client_ltpk {
            return Err(Error::Config(ConfigError::InvalidCredentials(
                "client public key does not match seed".to_string(),
            )));
        }
        if let Some(companion) = &self.companion {
            companion.validate()?;
        }
        Ok(())
    }

    /// The Companion record, if this device was paired over both protocols.
    pub fn companion(&self) -> Option<&Credentials> {
        self.companion.as_deref()
    }
}

impl std::fmt::Debug for Credentials {
    /// Key material is redacted; only identifiers are shown.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("server_id", &self.server_id)
            .field("companion", &self.companion.is_some())
            .finish_non_exhaustive()
    }
}

mod hex_key {
    use serde::de::Error as DeError;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.len() != 64 {
            return Err(D::Error::custom(format!(
                "expected 64 hex chars, got {}",
                text.len()
            )));
        }
        let bytes = hex::decode(&text).map_err(D::Error::custom)?;
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn sample() -> Credentials {
        let signing = SigningKey::generate(&mut OsRng);
        Credentials {
            client_id: "4D797FF4-F2D8-47B6-8F99-4B4B75E4AAF3".to_string(),
            client_ltsk: signing.to_bytes(),
            client_ltpk: signing.verifying_key().to_bytes(),
            server_ltpk: [0xAB; 32],
            server_id: "AA:BB:CC:DD:EE:FF".to_string(),
            companion: None,
        }
    }

    #[test]
    fn json_roundtrip() {
        let creds = sample();
        let json = creds.to_json();
        let parsed = Credentials::parse(&json).unwrap();

        assert_eq!(parsed.client_id, creds.client_id);
        assert_eq!(parsed.client_ltsk, creds.client_ltsk);
        assert_eq!(parsed.client_ltpk, creds.client_ltpk);
        assert_eq!(parsed.server_ltpk, creds.server_ltpk);
        assert_eq!(parsed.server_id, creds.server_id);
        assert!(parsed.companion.is_none());
    }

    #[test]
    fn key_material_is_lowercase_hex_of_64_chars() {
        let creds = sample();
        let json = creds.to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        for field in ["clientLTSK", "clientLTPK", "serverLTPK"] {
            let text = value[field].as_str().unwrap();
            assert_eq!(text.len(), 64);
            assert!(text.chars().all(|c| c.is_ascii_hexdigit()));
            assert_eq!(text, text.to_lowercase());
        }
    }

    #[test]
    fn nested_companion_record_roundtrips() {
        let mut creds = sample();
        let mut companion = sample();
        companion.server_id = "companion-server".to_string();
        creds.companion = Some(Box::new(companion));

        let json = creds.to_json();
        let parsed = Credentials::parse(&json).unwrap();
        assert_eq!(parsed.companion().unwrap().server_id, "companion-server");
    }

    #[test]
    fn companion_key_absent_when_none() {
        let json = sample().to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("companion").is_none());
    }

    #[test]
    fn parse_rejects_mismatched_public_key() {
        let mut creds = sample();
        creds.client_ltpk = [0x01; 32];
        let json = creds.to_json();
        assert!(Credentials::parse(&json).is_err());
    }

    #[test]
    fn parse_rejects_short_hex() {
        let json = r#"{
            "clientId": "id",
            "clientLTSK": "abcd",
            "clientLTPK": "abcd",
            "serverLTPK": "abcd",
            "serverId": "srv"
        }"#;
        assert!(Credentials::parse(json).is_err());
    }

    #[test]
    fn debug_redacts_key_material() {
        let creds = sample();
        let text = format!("{:?}", creds);
        assert!(text.contains(&creds.client_id));
        assert!(!text.contains(&hex::encode(creds.client_ltsk)));
    }

    #[test]
    fn file_roundtrip() {
        let creds = sample();
        let dir = std::env::temp_dir().join("mediaremote-credentials-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("device.json");

        creds.save(&path).unwrap();
        let loaded = Credentials::load(&path).unwrap();
        assert_eq!(loaded.client_ltsk, creds.client_ltsk);

        std::fs::remove_file(&path).ok();
    }
}
