//! # mediaremote-mrp
//!
//! The Media Remote Protocol message engine:
//! - Protobuf wire envelope and the message kinds the client speaks
//! - HID usage table and byte-exact event payloads
//! - DataStream 32-byte framing with plist-wrapped protobuf payloads
//! - Pending-response registry for request/response pairing

pub mod datastream;
pub mod hid;
pub mod messages;
pub mod protos;

pub use datastream::{DataStreamFrame, FrameKind};
pub use hid::{MediaCommand, RemoteKey};
pub use messages::{MessageType, ResponseWaiters};
pub use protos::ProtocolMessage;
