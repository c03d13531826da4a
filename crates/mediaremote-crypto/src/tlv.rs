//! TLV8 encoding/decoding for pairing messages.
//!
//! TLV8 format: [Tag: 1 byte][Length: 1 byte][Value: 0-255 bytes].
//! Values longer than 255 bytes are fragmented across consecutive records
//! with the same tag. Entries are emitted in insertion order because some
//! peers require a specific tag order on the wire (pair-verify M1 must put
//! Sequence before PublicKey).

use mediaremote_core::error::ProtocolError;

/// TLV tags used by the pairing protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvTag {
    Method = 0x00,
    Identifier = 0x01,
    Salt = 0x02,
    PublicKey = 0x03,
    Proof = 0x04,
    EncryptedData = 0x05,
    Sequence = 0x06,
    Error = 0x07,
    BackOff = 0x08,
    Certificate = 0x09,
    Signature = 0x0A,
    Permissions = 0x0B,
    FragmentData = 0x0C,
    FragmentLast = 0x0D,
    Name = 0x11,
    Flags = 0x13,
}

impl TlvTag {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Method),
            0x01 => Some(Self::Identifier),
            0x02 => Some(Self::Salt),
            0x03 => Some(Self::PublicKey),
            0x04 => Some(Self::Proof),
            0x05 => Some(Self::EncryptedData),
            0x06 => Some(Self::Sequence),
            0x07 => Some(Self::Error),
            0x08 => Some(Self::BackOff),
            0x09 => Some(Self::Certificate),
            0x0A => Some(Self::Signature),
            0x0B => Some(Self::Permissions),
            0x0C => Some(Self::FragmentData),
            0x0D => Some(Self::FragmentLast),
            0x11 => Some(Self::Name),
            0x13 => Some(Self::Flags),
            _ => None,
        }
    }
}

/// Ordered TLV8 record set.
#[derive(Debug, Clone, Default)]
pub struct Tlv8 {
    entries: Vec<(u8, Vec<u8>)>,
}

impl Tlv8 {
    /// Create an empty record set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TLV8 from bytes.
    ///
    /// Consecutive records with the same tag are concatenated (fragment
    /// reassembly for values > 255 bytes).
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut entries: Vec<(u8, Vec<u8>)> = Vec::new();
        let mut i = 0;

        while i < data.len() {
            if i + 2 > data.len() {
                return Err(ProtocolError::InvalidFormat(
                    "TLV8: truncated header".to_string(),
                ));
            }
            let tag = data[i];
            let len = data[i + 1] as usize;
            i += 2;

            if i + len > data.len() {
                return Err(ProtocolError::InvalidFormat(format!(
                    "TLV8: truncated value (expected {} bytes, got {})",
                    len,
                    data.len() - i
                )));
            }
            let value = &data[i..i + len];
            i += len;

            match entries.last_mut() {
                Some((last_tag, last_value)) if *last_tag == tag => {
                    last_value.extend_from_slice(value);
                }
                _ => entries.push((tag, value.to_vec())),
            }
        }

        Ok(Self { entries })
    }

    /// Encode to bytes in insertion order, fragmenting values > 255 bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (tag, value) in &self.entries {
            if value.is_empty() {
                out.push(*tag);
                out.push(0);
            } else {
                for chunk in value.chunks(255) {
                    out.push(*tag);
                    out.push(chunk.len() as u8);
                    out.extend_from_slice(chunk);
                }
            }
        }
        out
    }

    /// Set a value, replacing any existing entry for the tag (position is
    /// kept from first insertion).
    pub fn set(&mut self, tag: TlvTag, value: impl Into<Vec<u8>>) -> &mut Self {
        let tag = tag as u8;
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(t, _)| *t == tag) {
            entry.1 = value;
        } else {
            self.entries.push((tag, value));
        }
        self
    }

    /// Get the value for a tag.
    pub fn get(&self, tag: TlvTag) -> Option<&[u8]> {
        let tag = tag as u8;
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_slice())
    }

    pub fn contains(&self, tag: TlvTag) -> bool {
        self.get(tag).is_some()
    }

    /// Sequence value (single byte).
    pub fn sequence(&self) -> Option<u8> {
        self.get(TlvTag::Sequence).and_then(|v| v.first().copied())
    }

    /// Error value (single byte), absent when zero-length.
    pub fn error(&self) -> Option<u8> {
        self.get(TlvTag::Error).and_then(|v| v.first().copied())
    }

    /// Back-off delay in seconds, little-endian 1-2 bytes.
    pub fn back_off(&self) -> Option<u16> {
        self.get(TlvTag::BackOff).map(|v| match v.len() {
            0 => 0,
            1 => v[0] as u16,
            _ => u16::from_le_bytes([v[0], v[1]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parsing {
        use super::*;

        #[test]
        fn parse_empty() {
            let tlv = Tlv8::parse(&[]).unwrap();
            assert!(!tlv.contains(TlvTag::Sequence));
        }

        #[test]
        fn parse_single_record() {
            let data = [0x06, 0x01, 0x01];
            let tlv = Tlv8::parse(&data).unwrap();
            assert_eq!(tlv.sequence(), Some(0x01));
        }

        #[test]
        fn parse_multiple_records() {
            let data = [
                0x00, 0x01, 0x00, // Method=0
                0x06, 0x01, 0x01, // Sequence=1
            ];
            let tlv = Tlv8::parse(&data).unwrap();
            assert_eq!(tlv.get(TlvTag::Method), Some([0x00].as_slice()));
            assert_eq!(tlv.sequence(), Some(0x01));
        }

        #[test]
        fn parse_zero_length_value() {
            let tlv = Tlv8::parse(&[0x06, 0x00]).unwrap();
            assert_eq!(tlv.get(TlvTag::Sequence), Some([].as_slice()));
        }

        #[test]
        fn parse_reassembles_fragments() {
            let mut data = vec![0x03, 0xFF];
            data.extend(vec![0xAA; 255]);
            data.extend([0x03, 0x2D]);
            data.extend(vec![0xBB; 45]);

            let tlv = Tlv8::parse(&data).unwrap();
            let pk = tlv.get(TlvTag::PublicKey).unwrap();
            assert_eq!(pk.len(), 300);
            assert!(pk[..255].iter().all(|&b| b == 0xAA));
            assert!(pk[255..].iter().all(|&b| b == 0xBB));
        }

        #[test]
        fn parse_error_on_truncated_header() {
            assert!(Tlv8::parse(&[0x06]).is_err());
        }

        #[test]
        fn parse_error_on_truncated_value() {
            assert!(Tlv8::parse(&[0x06, 0x05, 0x01, 0x02]).is_err());
        }
    }

    mod encoding {
        use super::*;

        #[test]
        fn encode_empty() {
            assert!(Tlv8::new().encode().is_empty());
        }

        #[test]
        fn encode_preserves_insertion_order() {
            // Pair-verify M1 requires Sequence before PublicKey even though
            // 0x06 > 0x03.
            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::Sequence, vec![0x01]);
            tlv.set(TlvTag::PublicKey, vec![0xAB; 4]);

            let encoded = tlv.encode();
            assert_eq!(encoded[0], 0x06);
            assert_eq!(encoded[3], 0x03);
        }

        #[test]
        fn pair_setup_m1_wire_bytes() {
            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::Method, vec![0x00]);
            tlv.set(TlvTag::Sequence, vec![0x01]);
            assert_eq!(tlv.encode(), vec![0x00, 0x01, 0x00, 0x06, 0x01, 0x01]);
        }

        #[test]
        fn fragmentation_byte_layout_for_300_byte_value() {
            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::PublicKey, vec![0xBB; 300]);
            let encoded = tlv.encode();

            assert_eq!(encoded.len(), 304);
            assert_eq!(encoded[0], 0x03);
            assert_eq!(encoded[1], 0xFF);
            assert_eq!(encoded[257], 0x03);
            assert_eq!(encoded[258], 0x2D);

            let decoded = Tlv8::parse(&encoded).unwrap();
            assert_eq!(decoded.get(TlvTag::PublicKey).unwrap(), &[0xBB; 300][..]);
        }

        #[test]
        fn encode_roundtrip_with_large_values() {
            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::Sequence, vec![0x03]);
            tlv.set(TlvTag::PublicKey, vec![0xAB; 384]);
            tlv.set(TlvTag::Proof, vec![0xCD; 64]);

            let decoded = Tlv8::parse(&tlv.encode()).unwrap();
            assert_eq!(decoded.sequence(), Some(0x03));
            assert_eq!(decoded.get(TlvTag::PublicKey).unwrap().len(), 384);
            assert_eq!(decoded.get(TlvTag::Proof).unwrap().len(), 64);
        }

        #[test]
        fn roundtrip_values_up_to_4k() {
            for size in [0usize, 1, 255, 256, 511, 4096] {
                let mut tlv = Tlv8::new();
                tlv.set(TlvTag::EncryptedData, vec![0x5A; size]);
                let decoded = Tlv8::parse(&tlv.encode()).unwrap();
                assert_eq!(
                    decoded.get(TlvTag::EncryptedData).unwrap().len(),
                    size,
                    "size {}",
                    size
                );
            }
        }

        #[test]
        fn set_replaces_existing_value_in_place() {
            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::Sequence, vec![0x01]);
            tlv.set(TlvTag::PublicKey, vec![0xAA]);
            tlv.set(TlvTag::Sequence, vec![0x02]);

            let encoded = tlv.encode();
            assert_eq!(encoded[0], 0x06); // Sequence kept its position
            assert_eq!(tlv.sequence(), Some(0x02));
        }
    }

    mod accessors {
        use super::*;

        #[test]
        fn error_returns_first_byte() {
            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::Error, vec![0x02]);
            assert_eq!(tlv.error(), Some(0x02));
        }

        #[test]
        fn back_off_handles_one_and_two_byte_forms() {
            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::BackOff, vec![0x1E]);
            assert_eq!(tlv.back_off(), Some(30));

            tlv.set(TlvTag::BackOff, vec![0x2C, 0x01]);
            assert_eq!(tlv.back_off(), Some(300));
        }

        #[test]
        fn missing_tag_returns_none() {
            let tlv = Tlv8::new();
            assert_eq!(tlv.get(TlvTag::Salt), None);
            assert_eq!(tlv.error(), None);
        }
    }

    mod tag_bytes {
        use super::*;

        #[test]
        fn from_byte_known_tags() {
            assert_eq!(TlvTag::from_byte(0x00), Some(TlvTag::Method));
            assert_eq!(TlvTag::from_byte(0x06), Some(TlvTag::Sequence));
            assert_eq!(TlvTag::from_byte(0x08), Some(TlvTag::BackOff));
            assert_eq!(TlvTag::from_byte(0x11), Some(TlvTag::Name));
            assert_eq!(TlvTag::from_byte(0x13), Some(TlvTag::Flags));
        }

        #[test]
        fn from_byte_unknown_returns_none() {
            assert_eq!(TlvTag::from_byte(0x0E), None);
            assert_eq!(TlvTag::from_byte(0xFF), None);
        }
    }
}
