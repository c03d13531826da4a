//! # mediaremote-companion
//!
//! The Companion Link transport:
//! - Compact-pack (OPACK) typed binary codec
//! - 4-byte type+length framing with buffer reassembly
//! - Counter-nonce AEAD session whose AAD is the frame header
//! - Connection state machine with `_x`-keyed request multiplexing

pub mod connection;
pub mod frames;
pub mod opack;
pub mod session;

pub use connection::CompanionConnection;
pub use frames::{Frame, FrameType};
pub use opack::Value;
pub use session::CompanionSession;
