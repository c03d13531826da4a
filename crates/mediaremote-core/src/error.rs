//! Error types for the Media Remote client.

use thiserror::Error;

/// Primary error type for all client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection failed during {stage}: {source}")]
    Stage {
        stage: ConnectStage,
        #[source]
        source: Box<Error>,
    },

    #[error("Operation timed out")]
    Timeout,

    #[error("Connection closed")]
    Closed,
}

/// Stage of connection bring-up, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStage {
    Verify,
    SetupEvent,
    Record,
    SetupData,
    MrpInit,
}

impl std::fmt::Display for ConnectStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Verify => "verify",
            Self::SetupEvent => "setup-event",
            Self::Record => "record",
            Self::SetupData => "setup-data",
            Self::MrpInit => "mrp-init",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Wrap an error with the connection stage it occurred in.
    pub fn at_stage(stage: ConnectStage, source: impl Into<Error>) -> Self {
        Self::Stage {
            stage,
            source: Box::new(source.into()),
        }
    }
}

/// Errors during pair-setup or pair-verify.
#[derive(Error, Debug)]
pub enum PairingError {
    #[error("Pairing state mismatch: expected {expected}, got {actual}")]
    StateMismatch { expected: u8, actual: u8 },

    #[error("{message} returned peer error 0x{code:02x} ({})", describe_peer_error(*code))]
    Peer { message: &'static str, code: u8 },

    #[error("{message} missing required TLV 0x{tag:02x}")]
    MissingTlv { message: &'static str, tag: u8 },

    #[error("{message}: {detail}")]
    Protocol {
        message: &'static str,
        detail: String,
    },

    #[error("SRP proof verification failed")]
    SrpProofMismatch,

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Invalid pairing state: {0}")]
    InvalidState(String),
}

fn describe_peer_error(code: u8) -> &'static str {
    match code {
        0x01 => "unknown",
        0x02 => "authentication",
        0x03 => "back-off",
        0x04 => "max peers",
        0x05 => "max tries",
        0x06 => "unavailable",
        0x07 => "busy",
        _ => "unrecognized code",
    }
}

/// Cryptographic operation errors.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption/authentication failed")]
    AuthFailure,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}

/// Wire-format violations: framing, TLV, compact-pack, plist, protobuf.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("Bad sequence number: expected {expected}, got {actual}")]
    BadSequence { expected: u8, actual: u8 },

    #[error("Frame too large: {0} bytes")]
    Oversized(usize),

    #[error("Plist error: {0}")]
    Plist(String),

    #[error("Protobuf decode error: {0}")]
    Protobuf(String),
}

/// Client-side configuration problems, detected before any I/O.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No credentials available (pair first)")]
    MissingCredentials,

    #[error("No Companion credentials in the credential record")]
    MissingCompanionCredentials,

    #[error("No Companion port announced for this device")]
    NoCompanionPort,

    #[error("Invalid credential data: {0}")]
    InvalidCredentials(String),
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        let pairing_err = Error::Pairing(PairingError::SrpProofMismatch);
        assert!(pairing_err.to_string().contains("Pairing error"));
        assert!(pairing_err.to_string().contains("SRP proof"));

        let timeout_err = Error::Timeout;
        assert!(timeout_err.to_string().contains("timed out"));

        let config_err = Error::Config(ConfigError::MissingCredentials);
        assert!(config_err.to_string().contains("pair first"));
    }

    #[test]
    fn peer_error_names_message_and_code() {
        let err = PairingError::Peer {
            message: "M4",
            code: 0x02,
        };
        let text = err.to_string();
        assert!(text.contains("M4"));
        assert!(text.contains("0x02"));
        assert!(text.contains("authentication"));

        let backoff = PairingError::Peer {
            message: "M2",
            code: 0x03,
        };
        assert!(backoff.to_string().contains("back-off"));
    }

    #[test]
    fn stage_wrapping_names_the_stage() {
        let inner = Error::Timeout;
        let err = Error::at_stage(ConnectStage::SetupData, inner);
        let text = err.to_string();
        assert!(text.contains("setup-data"));
        assert!(text.contains("timed out"));
    }

    #[test]
    fn error_source_chain() {
        use std::error::Error as StdError;

        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "test");
        let conn_err = Error::Connection(io_err);
        assert!(conn_err.source().is_some());

        let staged = Error::at_stage(ConnectStage::Verify, Error::Timeout);
        assert!(staged.source().is_some());
    }

    #[test]
    fn error_conversions() {
        let err: Error = PairingError::SignatureInvalid.into();
        assert!(matches!(err, Error::Pairing(_)));

        let err: Error = CryptoError::AuthFailure.into();
        assert!(matches!(err, Error::Crypto(_)));

        let err: Error = ProtocolError::UnknownTag(0x99).into();
        assert!(matches!(err, Error::Protocol(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Connection(_)));
    }
}
