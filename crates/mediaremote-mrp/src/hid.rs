//! HID usage table and event payload layout.
//!
//! A key press is two SendHIDEvent messages (down, then up) separated by at
//! least 50 ms (1000 ms for long presses), followed by an empty
//! GenericMessage flush.

use std::time::Duration;

/// Minimum delay between the down and up events of a press.
pub const KEY_PRESS_DELAY: Duration = Duration::from_millis(50);

/// Delay used for long-press variants.
pub const LONG_PRESS_DELAY: Duration = Duration::from_millis(1000);

/// Remote keys with their HID usage-page/usage assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteKey {
    Up,
    Down,
    Left,
    Right,
    Select,
    Menu,
    Home,
    TopMenu,
    PlayPause,
    VolumeUp,
    VolumeDown,
    Sleep,
}

impl RemoteKey {
    /// The (usage-page, usage) pair for this key.
    pub fn usage(self) -> (u16, u16) {
        match self {
            Self::Up => (1, 0x8C),
            Self::Down => (1, 0x8D),
            Self::Left => (1, 0x8B),
            Self::Right => (1, 0x8A),
            Self::Select => (1, 0x89),
            Self::Menu => (1, 0x86),
            Self::Home => (12, 0x40),
            Self::TopMenu => (12, 0x60),
            Self::PlayPause => (12, 0xB0),
            Self::VolumeUp => (12, 0xE9),
            Self::VolumeDown => (12, 0xEA),
            Self::Sleep => (1, 0x82),
        }
    }

    /// Parse a key name as used in the public API.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "up" => Self::Up,
            "down" => Self::Down,
            "left" => Self::Left,
            "right" => Self::Right,
            "select" => Self::Select,
            "menu" => Self::Menu,
            "home" => Self::Home,
            "top_menu" => Self::TopMenu,
            "play_pause" => Self::PlayPause,
            "volume_up" => Self::VolumeUp,
            "volume_down" => Self::VolumeDown,
            "sleep" => Self::Sleep,
            _ => return None,
        })
    }
}

/// Media commands for SendCommand messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MediaCommand {
    Play = 1,
    Pause = 2,
    TogglePlayPause = 3,
    Stop = 4,
    NextTrack = 5,
    PreviousTrack = 6,
    SkipForward = 18,
    SkipBackward = 19,
}

/// Opaque timestamp bytes. The server does not appear to validate these,
/// so a fixed constant is used.
const TIMESTAMP: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x4E, 0xBA, 0x40];

/// Fixed 35-byte header preceding the usage fields.
const HEADER: [u8; 35] = [
    0x43, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x02, 0x00, 0x00, 0x00, 0x30, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x20, 0x00,
    0x00, 0x00, 0x03, 0x00, 0x00,
];

/// Fixed 11-byte footer closing the payload.
const FOOTER: [u8; 11] = [
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Total payload size: timestamp + header + three shorts + footer.
pub const PAYLOAD_LEN: usize = 8 + 35 + 6 + 11;

/// Build the HID event payload for one usage transition.
///
/// The three payload shorts (usage page, usage, pressed flag) are
/// big-endian; pressed is 1 for down, 0 for up.
pub fn event_payload(usage_page: u16, usage: u16, down: bool) -> Vec<u8> {
    let mut payload = Vec::with_capacity(PAYLOAD_LEN);
    payload.extend_from_slice(&TIMESTAMP);
    payload.extend_from_slice(&HEADER);
    payload.extend_from_slice(&usage_page.to_be_bytes());
    payload.extend_from_slice(&usage.to_be_bytes());
    payload.extend_from_slice(&(down as u16).to_be_bytes());
    payload.extend_from_slice(&FOOTER);
    payload
}

/// Extract (usage-page, usage, down) from a payload. Used by tests and by
/// diagnostics when echoing events.
pub fn parse_event_payload(payload: &[u8]) -> Option<(u16, u16, bool)> {
    if payload.len() != PAYLOAD_LEN {
        return None;
    }
    let base = 8 + 35;
    let page = u16::from_be_bytes([payload[base], payload[base + 1]]);
    let usage = u16::from_be_bytes([payload[base + 2], payload[base + 3]]);
    let down = u16::from_be_bytes([payload[base + 4], payload[base + 5]]);
    Some((page, usage, down == 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_60_bytes() {
        assert_eq!(PAYLOAD_LEN, 60);
        assert_eq!(event_payload(1, 0x89, true).len(), 60);
    }

    #[test]
    fn select_key_payload_fields() {
        let (page, usage) = RemoteKey::Select.usage();
        let down = event_payload(page, usage, true);
        let up = event_payload(page, usage, false);

        assert_eq!(parse_event_payload(&down), Some((1, 0x89, true)));
        assert_eq!(parse_event_payload(&up), Some((1, 0x89, false)));
        // Only the pressed flag differs between down and up.
        assert_eq!(down[..47], up[..47]);
        assert_ne!(down[47..49], up[47..49]);
    }

    #[test]
    fn usage_shorts_are_big_endian() {
        let payload = event_payload(12, 0xB0, true);
        assert_eq!(payload[43..45], [0x00, 0x0C]);
        assert_eq!(payload[45..47], [0x00, 0xB0]);
        assert_eq!(payload[47..49], [0x00, 0x01]);
    }

    #[test]
    fn usage_table_matches_protocol_assignments() {
        assert_eq!(RemoteKey::Up.usage(), (1, 0x8C));
        assert_eq!(RemoteKey::Down.usage(), (1, 0x8D));
        assert_eq!(RemoteKey::Left.usage(), (1, 0x8B));
        assert_eq!(RemoteKey::Right.usage(), (1, 0x8A));
        assert_eq!(RemoteKey::Select.usage(), (1, 0x89));
        assert_eq!(RemoteKey::Menu.usage(), (1, 0x86));
        assert_eq!(RemoteKey::Home.usage(), (12, 0x40));
        assert_eq!(RemoteKey::TopMenu.usage(), (12, 0x60));
        assert_eq!(RemoteKey::PlayPause.usage(), (12, 0xB0));
        assert_eq!(RemoteKey::VolumeUp.usage(), (12, 0xE9));
        assert_eq!(RemoteKey::VolumeDown.usage(), (12, 0xEA));
        assert_eq!(RemoteKey::Sleep.usage(), (1, 0x82));
    }

    #[test]
    fn key_names_resolve() {
        assert_eq!(RemoteKey::from_name("select"), Some(RemoteKey::Select));
        assert_eq!(RemoteKey::from_name("top_menu"), Some(RemoteKey::TopMenu));
        assert_eq!(RemoteKey::from_name("eject"), None);
    }

    #[test]
    fn media_command_codes() {
        assert_eq!(MediaCommand::Play as i32, 1);
        assert_eq!(MediaCommand::Pause as i32, 2);
        assert_eq!(MediaCommand::TogglePlayPause as i32, 3);
        assert_eq!(MediaCommand::Stop as i32, 4);
        assert_eq!(MediaCommand::NextTrack as i32, 5);
        assert_eq!(MediaCommand::PreviousTrack as i32, 6);
        assert_eq!(MediaCommand::SkipForward as i32, 18);
        assert_eq!(MediaCommand::SkipBackward as i32, 19);
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert_eq!(parse_event_payload(&[0u8; 59]), None);
        assert_eq!(parse_event_payload(&[0u8; 61]), None);
    }
}
