//! Protobuf wire types for the Media Remote Protocol.
//!
//! Hand-written prost messages; the envelope carries a numeric `type` and
//! one optional nested message for the corresponding kind. Fields the
//! client never reads are left out; unknown fields are skipped by prost on
//! decode.

use prost::Message;

/// The MRP wire envelope.
#[derive(Clone, PartialEq, Message)]
pub struct ProtocolMessage {
    /// Numeric message kind; see [`crate::messages::MessageType`].
    #[prost(int32, optional, tag = "1")]
    pub r#type: Option<i32>,

    /// Fresh random identifier per outbound message. CryptoPairing omits it.
    #[prost(string, optional, tag = "2")]
    pub identifier: Option<String>,

    #[prost(int32, optional, tag = "3")]
    pub error_code: Option<i32>,

    #[prost(message, optional, tag = "6")]
    pub send_command: Option<SendCommandMessage>,

    #[prost(message, optional, tag = "8")]
    pub send_hid_event: Option<SendHidEventMessage>,

    #[prost(message, optional, tag = "9")]
    pub set_state: Option<SetStateMessage>,

    #[prost(message, optional, tag = "20")]
    pub device_info: Option<DeviceInfoMessage>,

    #[prost(message, optional, tag = "21")]
    pub client_updates_config: Option<ClientUpdatesConfigMessage>,

    #[prost(message, optional, tag = "25")]
    pub text_input: Option<TextInputMessage>,

    #[prost(message, optional, tag = "32")]
    pub playback_queue_request: Option<PlaybackQueueRequestMessage>,

    #[prost(message, optional, tag = "34")]
    pub crypto_pairing: Option<CryptoPairingMessage>,

    #[prost(message, optional, tag = "38")]
    pub set_connection_state: Option<SetConnectionStateMessage>,

    #[prost(message, optional, tag = "41")]
    pub wake_device: Option<WakeDeviceMessage>,

    #[prost(message, optional, tag = "43")]
    pub send_button_event: Option<SendButtonEventMessage>,

    #[prost(message, optional, tag = "71")]
    pub keyboard: Option<KeyboardMessage>,
}

impl ProtocolMessage {
    /// Encode to wire bytes.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        Message::encode_to_vec(self)
    }

    /// Decode from wire bytes.
    pub fn decode_from(bytes: &[u8]) -> Result<Self, prost::DecodeError> {
        Message::decode(bytes)
    }
}

/// Media command carrier (SendCommand, type 1).
#[derive(Clone, PartialEq, Message)]
pub struct SendCommandMessage {
    #[prost(int32, optional, tag = "1")]
    pub command: Option<i32>,
}

/// Synthesized HID event (SendHIDEvent, type 8).
#[derive(Clone, PartialEq, Message)]
pub struct SendHidEventMessage {
    /// Opaque payload; layout in [`crate::hid`].
    #[prost(bytes = "vec", optional, tag = "1")]
    pub hid_event_data: Option<Vec<u8>>,
}

/// Player/now-playing state pushed by the server (SetState, type 4).
#[derive(Clone, PartialEq, Message)]
pub struct SetStateMessage {
    #[prost(int32, optional, tag = "1")]
    pub playback_state: Option<i32>,

    #[prost(message, optional, tag = "2")]
    pub supported_commands: Option<SupportedCommands>,

    #[prost(message, optional, tag = "3")]
    pub playback_queue: Option<PlaybackQueue>,

    #[prost(string, optional, tag = "4")]
    pub display_name: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SupportedCommands {
    #[prost(message, repeated, tag = "1")]
    pub commands: Vec<SupportedCommand>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SupportedCommand {
    #[prost(int32, optional, tag = "1")]
    pub command: Option<i32>,

    #[prost(bool, optional, tag = "2")]
    pub enabled: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PlaybackQueue {
    #[prost(int32, optional, tag = "1")]
    pub location: Option<i32>,

    #[prost(message, repeated, tag = "2")]
    pub content_items: Vec<ContentItem>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ContentItem {
    #[prost(string, optional, tag = "1")]
    pub identifier: Option<String>,

    #[prost(message, optional, tag = "2")]
    pub metadata: Option<ContentItemMetadata>,

    #[prost(bytes = "vec", optional, tag = "3")]
    pub artwork_data: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ContentItemMetadata {
    #[prost(string, optional, tag = "1")]
    pub title: Option<String>,

    #[prost(string, optional, tag = "2")]
    pub artist: Option<String>,

    #[prost(string, optional, tag = "3")]
    pub album: Option<String>,

    #[prost(double, optional, tag = "4")]
    pub duration: Option<f64>,

    #[prost(double, optional, tag = "5")]
    pub elapsed_time: Option<f64>,

    #[prost(float, optional, tag = "6")]
    pub playback_rate: Option<f32>,

    #[prost(bool, optional, tag = "7")]
    pub artwork_available: Option<bool>,
}

/// Client identification (DeviceInfo, type 15). Sent once at data-channel
/// bring-up; the server replies with its own.
#[derive(Clone, PartialEq, Message)]
pub struct DeviceInfoMessage {
    #[prost(string, optional, tag = "1")]
    pub unique_identifier: Option<String>,

    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,

    #[prost(string, optional, tag = "3")]
    pub system_build_version: Option<String>,

    #[prost(string, optional, tag = "4")]
    pub application_bundle_identifier: Option<String>,

    #[prost(int32, optional, tag = "5")]
    pub protocol_version: Option<i32>,

    #[prost(bool, optional, tag = "6")]
    pub supports_system_pairing: Option<bool>,

    #[prost(bool, optional, tag = "7")]
    pub allows_pairing: Option<bool>,

    #[prost(string, optional, tag = "8")]
    pub model: Option<String>,
}

/// Update subscriptions (ClientUpdatesConfig, type 16).
#[derive(Clone, PartialEq, Message)]
pub struct ClientUpdatesConfigMessage {
    #[prost(bool, optional, tag = "1")]
    pub artwork_updates: Option<bool>,

    #[prost(bool, optional, tag = "2")]
    pub now_playing_updates: Option<bool>,

    #[prost(bool, optional, tag = "3")]
    pub volume_updates: Option<bool>,

    #[prost(bool, optional, tag = "4")]
    pub keyboard_updates: Option<bool>,
}

/// Text entry (TextInput, type 25).
#[derive(Clone, PartialEq, Message)]
pub struct TextInputMessage {
    #[prost(string, optional, tag = "1")]
    pub text: Option<String>,

    #[prost(bool, optional, tag = "2")]
    pub clear_previous: Option<bool>,
}

/// Playback queue fetch (PlaybackQueueRequest, type 32).
#[derive(Clone, PartialEq, Message)]
pub struct PlaybackQueueRequestMessage {
    #[prost(int32, optional, tag = "1")]
    pub location: Option<i32>,

    #[prost(int32, optional, tag = "2")]
    pub length: Option<i32>,

    #[prost(bool, optional, tag = "3")]
    pub include_metadata: Option<bool>,
}

/// Inner pairing carrier (CryptoPairing, type 34).
///
/// Used only over Companion; over AirPlay the HAP layer already encrypts
/// the data channel and this message is never sent.
#[derive(Clone, PartialEq, Message)]
pub struct CryptoPairingMessage {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub pairing_data: Option<Vec<u8>>,

    #[prost(int32, optional, tag = "2")]
    pub status: Option<i32>,
}

/// Connection state announcement (SetConnectionState, type 38).
#[derive(Clone, PartialEq, Message)]
pub struct SetConnectionStateMessage {
    #[prost(int32, optional, tag = "1")]
    pub state: Option<i32>,
}

/// Wake a sleeping device (WakeDevice, type 41).
#[derive(Clone, PartialEq, Message)]
pub struct WakeDeviceMessage {}

/// Physical button press (SendButtonEvent, type 43).
#[derive(Clone, PartialEq, Message)]
pub struct SendButtonEventMessage {
    #[prost(uint32, optional, tag = "1")]
    pub usage_page: Option<u32>,

    #[prost(uint32, optional, tag = "2")]
    pub usage: Option<u32>,

    #[prost(bool, optional, tag = "3")]
    pub button_down: Option<bool>,
}

/// Keyboard session state (GetKeyboardSession request and its replies).
#[derive(Clone, PartialEq, Message)]
pub struct KeyboardMessage {
    #[prost(int32, optional, tag = "1")]
    pub state: Option<i32>,

    #[prost(string, optional, tag = "2")]
    pub text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let msg = ProtocolMessage {
            r#type: Some(1),
            identifier: Some("ABC-123".to_string()),
            send_command: Some(SendCommandMessage { command: Some(3) }),
            ..Default::default()
        };

        let bytes = msg.encode_to_vec();
        let decoded = ProtocolMessage::decode_from(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn empty_envelope_is_valid() {
        let decoded = ProtocolMessage::decode_from(&[]).unwrap();
        assert_eq!(decoded, ProtocolMessage::default());
    }

    #[test]
    fn nested_set_state_roundtrip() {
        let msg = ProtocolMessage {
            r#type: Some(4),
            set_state: Some(SetStateMessage {
                playback_state: Some(2),
                supported_commands: Some(SupportedCommands {
                    commands: vec![SupportedCommand {
                        command: Some(1),
                        enabled: Some(true),
                    }],
                }),
                playback_queue: Some(PlaybackQueue {
                    location: Some(0),
                    content_items: vec![ContentItem {
                        identifier: Some("item".to_string()),
                        metadata: Some(ContentItemMetadata {
                            title: Some("Title".to_string()),
                            duration: Some(120.5),
                            ..Default::default()
                        }),
                        artwork_data: None,
                    }],
                }),
                display_name: Some("Music".to_string()),
            }),
            ..Default::default()
        };

        let decoded = ProtocolMessage::decode_from(&msg.encode_to_vec()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn garbage_fails_to_decode() {
        // Field 1 wire-type 2 with an oversized length.
        assert!(ProtocolMessage::decode_from(&[0x0A, 0xFF, 0x01]).is_err());
    }
}
