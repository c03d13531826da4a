//! Binary plist bodies for channel SETUP.

use mediaremote_core::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

/// Stream client type announced in the data SETUP.
pub const CLIENT_TYPE_UUID: &str = "1910A70F-DBC0-4242-AF95-115DB30604E1";

/// Encode a value to a binary plist.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    plist::to_writer_binary(std::io::Cursor::new(&mut buf), value)
        .map_err(|e| ProtocolError::Plist(e.to_string()))?;
    Ok(buf)
}

/// Decode a binary plist into a value.
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T> {
    plist::from_bytes(data).map_err(|e| ProtocolError::Plist(e.to_string()).into())
}

/// Body of the event-channel SETUP.
#[derive(Debug, Clone, Serialize)]
pub struct EventSetupRequest {
    #[serde(rename = "deviceID")]
    pub device_id: String,
    #[serde(rename = "sessionUUID")]
    pub session_uuid: String,
    #[serde(rename = "timingProtocol")]
    pub timing_protocol: String,
    #[serde(rename = "isRemoteControlOnly")]
    pub is_remote_control_only: bool,
    #[serde(rename = "osName")]
    pub os_name: String,
    pub model: String,
}

impl EventSetupRequest {
    pub fn new(device_id: &str, session_uuid: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            session_uuid: session_uuid.to_string(),
            timing_protocol: "None".to_string(),
            is_remote_control_only: true,
            os_name: "iPhone OS".to_string(),
            model: "iPhone10,6".to_string(),
        }
    }
}

/// Response to the event SETUP: the port of the reverse event socket.
#[derive(Debug, Clone, Deserialize)]
pub struct EventSetupResponse {
    #[serde(rename = "eventPort")]
    pub event_port: u16,
}

/// Body of the data-channel SETUP.
#[derive(Debug, Clone, Serialize)]
pub struct DataSetupRequest {
    pub streams: Vec<DataStreamDef>,
}

/// Stream definition requesting a dedicated MRP data socket.
#[derive(Debug, Clone, Serialize)]
pub struct DataStreamDef {
    #[serde(rename = "type")]
    pub stream_type: u32,
    #[serde(rename = "controlType")]
    pub control_type: u32,
    #[serde(rename = "channelID")]
    pub channel_id: String,
    pub seed: i32,
    #[serde(rename = "clientUUID")]
    pub client_uuid: String,
    #[serde(rename = "wantsDedicatedSocket")]
    pub wants_dedicated_socket: bool,
    #[serde(rename = "clientTypeUUID")]
    pub client_type_uuid: String,
}

impl DataSetupRequest {
    /// Build the single-stream request for the MRP data channel.
    pub fn new(channel_id: &str, client_uuid: &str, seed: i32) -> Self {
        Self {
            streams: vec![DataStreamDef {
                stream_type: 130,
                control_type: 2,
                channel_id: channel_id.to_string(),
                seed,
                client_uuid: client_uuid.to_string(),
                wants_dedicated_socket: true,
                client_type_uuid: CLIENT_TYPE_UUID.to_string(),
            }],
        }
    }
}

/// Response to the data SETUP.
#[derive(Debug, Clone, Deserialize)]
pub struct DataSetupResponse {
    pub streams: Vec<DataStreamResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataStreamResponse {
    #[serde(rename = "dataPort")]
    pub data_port: u16,
    #[serde(rename = "type", default)]
    pub stream_type: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_produces_binary_plist() {
        let body = EventSetupRequest::new("AA:BB:CC:DD:EE:FF", "uuid-1");
        let encoded = encode(&body).unwrap();
        assert!(encoded.starts_with(b"bplist"));
    }

    #[test]
    fn data_setup_carries_the_stream_definition() {
        let body = DataSetupRequest::new("chan-1", "client-1", 424242);
        let encoded = encode(&body).unwrap();
        let dict: plist::Dictionary = decode(&encoded).unwrap();

        let streams = dict.get("streams").and_then(|v| v.as_array()).unwrap();
        assert_eq!(streams.len(), 1);
        let stream = streams[0].as_dictionary().unwrap();
        assert_eq!(
            stream.get("type").and_then(|v| v.as_unsigned_integer()),
            Some(130)
        );
        assert_eq!(
            stream.get("controlType").and_then(|v| v.as_unsigned_integer()),
            Some(2)
        );
        assert_eq!(
            stream.get("seed").and_then(|v| v.as_signed_integer()),
            Some(424242)
        );
        assert_eq!(
            stream.get("wantsDedicatedSocket").and_then(|v| v.as_boolean()),
            Some(true)
        );
        assert_eq!(
            stream.get("clientTypeUUID").and_then(|v| v.as_string()),
            Some(CLIENT_TYPE_UUID)
        );
    }

    #[test]
    fn setup_responses_decode() {
        let mut stream = plist::Dictionary::new();
        stream.insert("dataPort".to_string(), plist::Value::Integer(50101i64.into()));
        stream.insert("type".to_string(), plist::Value::Integer(130i64.into()));
        let mut root = plist::Dictionary::new();
        root.insert(
            "streams".to_string(),
            plist::Value::Array(vec![plist::Value::Dictionary(stream)]),
        );

        let encoded = encode(&root).unwrap();
        let response: DataSetupResponse = decode(&encoded).unwrap();
        assert_eq!(response.streams[0].data_port, 50101);

        let mut root = plist::Dictionary::new();
        root.insert("eventPort".to_string(), plist::Value::Integer(50100i64.into()));
        let encoded = encode(&root).unwrap();
        let response: EventSetupResponse = decode(&encoded).unwrap();
        assert_eq!(response.event_port, 50100);
    }
}
