//! HKDF-SHA512 key derivation for pairing and channel keys.

use mediaremote_core::error::CryptoError;

use hkdf::Hkdf;
use sha2::Sha512;

/// Derive key material using HKDF-SHA512.
///
/// # Arguments
/// * `ikm` - Input key material
/// * `salt` - Salt value (can be empty)
/// * `info` - Context/application-specific info
/// * `length` - Desired output length in bytes
pub fn derive_key(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    length: usize,
) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha512>::new(Some(salt), ikm);
    let mut okm = vec![0u8; length];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation("HKDF expand failed".to_string()))?;
    Ok(okm)
}

/// Derive a fixed 32-byte key.
pub fn derive_key_32(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha512>::new(Some(salt), ikm);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation("HKDF expand failed".to_string()))?;
    Ok(okm)
}

/// Fingerprint salt and info strings.
///
/// These must be produced byte-for-byte; the peer derives the same keys from
/// the same literals.
pub mod constants {
    pub const PAIR_SETUP_CONTROLLER_SIGN_SALT: &[u8] = b"Pair-Setup-Controller-Sign-Salt";
    pub const PAIR_SETUP_CONTROLLER_SIGN_INFO: &[u8] = b"Pair-Setup-Controller-Sign-Info";

    pub const PAIR_SETUP_ACCESSORY_SIGN_SALT: &[u8] = b"Pair-Setup-Accessory-Sign-Salt";
    pub const PAIR_SETUP_ACCESSORY_SIGN_INFO: &[u8] = b"Pair-Setup-Accessory-Sign-Info";

    pub const PAIR_SETUP_ENCRYPT_SALT: &[u8] = b"Pair-Setup-Encrypt-Salt";
    pub const PAIR_SETUP_ENCRYPT_INFO: &[u8] = b"Pair-Setup-Encrypt-Info";

    pub const PAIR_VERIFY_ENCRYPT_SALT: &[u8] = b"Pair-Verify-Encrypt-Salt";
    pub const PAIR_VERIFY_ENCRYPT_INFO: &[u8] = b"Pair-Verify-Encrypt-Info";

    pub const CONTROL_SALT: &[u8] = b"Control-Salt";
    pub const CONTROL_WRITE_KEY_INFO: &[u8] = b"Control-Write-Encryption-Key";
    pub const CONTROL_READ_KEY_INFO: &[u8] = b"Control-Read-Encryption-Key";

    pub const EVENTS_SALT: &[u8] = b"Events-Salt";
    pub const EVENTS_WRITE_KEY_INFO: &[u8] = b"Events-Write-Encryption-Key";
    pub const EVENTS_READ_KEY_INFO: &[u8] = b"Events-Read-Encryption-Key";

    /// The DataStream salt is this prefix with the connection's seed
    /// appended as a decimal string.
    pub const DATASTREAM_SALT_PREFIX: &str = "DataStream-Salt";
    pub const DATASTREAM_OUTPUT_KEY_INFO: &[u8] = b"DataStream-Output-Encryption-Key";
    pub const DATASTREAM_INPUT_KEY_INFO: &[u8] = b"DataStream-Input-Encryption-Key";

    /// Companion channel keys use an empty salt.
    pub const COMPANION_CLIENT_KEY_INFO: &[u8] = b"ClientEncrypt-main";
    pub const COMPANION_SERVER_KEY_INFO: &[u8] = b"ServerEncrypt-main";
}

/// Derive the pair-setup M5/M6 encryption key.
pub fn derive_pair_setup_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::PAIR_SETUP_ENCRYPT_SALT,
        constants::PAIR_SETUP_ENCRYPT_INFO,
    )
}

/// Derive the controller signing material for pair-setup M5.
pub fn derive_controller_sign_material(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::PAIR_SETUP_CONTROLLER_SIGN_SALT,
        constants::PAIR_SETUP_CONTROLLER_SIGN_INFO,
    )
}

/// Derive the accessory signing material used to verify pair-setup M6.
pub fn derive_accessory_sign_material(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::PAIR_SETUP_ACCESSORY_SIGN_SALT,
        constants::PAIR_SETUP_ACCESSORY_SIGN_INFO,
    )
}

/// Derive the pair-verify M2/M3 encryption key.
pub fn derive_pair_verify_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::PAIR_VERIFY_ENCRYPT_SALT,
        constants::PAIR_VERIFY_ENCRYPT_INFO,
    )
}

/// Build the DataStream channel salt for a connection seed.
pub fn datastream_salt(seed: i32) -> Vec<u8> {
    format!("{}{}", constants::DATASTREAM_SALT_PREFIX, seed).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    mod derive_key {
        use super::*;

        #[test]
        fn derives_requested_length() {
            let ikm = [0x0bu8; 22];
            let key_16 = derive_key(&ikm, b"salt", b"info", 16).unwrap();
            assert_eq!(key_16.len(), 16);

            let key_64 = derive_key(&ikm, b"salt", b"info", 64).unwrap();
            assert_eq!(key_64.len(), 64);
        }

        #[test]
        fn different_salts_produce_different_keys() {
            let ikm = [0x0bu8; 22];
            let key1 = derive_key(&ikm, b"salt1", b"info", 32).unwrap();
            let key2 = derive_key(&ikm, b"salt2", b"info", 32).unwrap();
            assert_ne!(key1, key2);
        }

        #[test]
        fn different_info_produces_different_keys() {
            let ikm = [0x0bu8; 22];
            let key1 = derive_key(&ikm, &[], b"info1", 32).unwrap();
            let key2 = derive_key(&ikm, &[], b"info2", 32).unwrap();
            assert_ne!(key1, key2);
        }

        #[test]
        fn empty_salt_and_info_are_valid() {
            let ikm = [0x0bu8; 22];
            assert!(derive_key(&ikm, &[], &[], 32).is_ok());
        }

        #[test]
        fn deterministic_output() {
            let ikm = [0x0bu8; 22];
            let key1 = derive_key(&ikm, b"salt", b"info", 32).unwrap();
            let key2 = derive_key(&ikm, b"salt", b"info", 32).unwrap();
            assert_eq!(key1, key2);
        }
    }

    mod protocol_keys {
        use super::*;

        #[test]
        fn setup_and_verify_keys_differ() {
            let shared = [0xABu8; 32];
            let setup = derive_pair_setup_key(&shared).unwrap();
            let verify = derive_pair_verify_key(&shared).unwrap();
            assert_ne!(setup, verify);
        }

        #[test]
        fn controller_and_accessory_sign_material_differ() {
            let shared = [0xABu8; 64];
            let controller = derive_controller_sign_material(&shared).unwrap();
            let accessory = derive_accessory_sign_material(&shared).unwrap();
            assert_ne!(controller, accessory);
        }

        #[test]
        fn datastream_salt_appends_decimal_seed() {
            assert_eq!(datastream_salt(12345), b"DataStream-Salt12345".to_vec());
            assert_eq!(datastream_salt(1), b"DataStream-Salt1".to_vec());
        }

        #[test]
        fn seed_is_part_of_the_datastream_key() {
            let shared = [0x42u8; 32];
            let key1 = derive_key_32(
                &shared,
                &datastream_salt(1),
                constants::DATASTREAM_OUTPUT_KEY_INFO,
            )
            .unwrap();
            let key2 = derive_key_32(
                &shared,
                &datastream_salt(2),
                constants::DATASTREAM_OUTPUT_KEY_INFO,
            )
            .unwrap();
            assert_ne!(key1, key2);
        }
    }
}
