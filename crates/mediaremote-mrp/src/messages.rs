//! Outbound message builders and the pending-response registry.

use std::collections::VecDeque;

use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::hid::{self, MediaCommand};
use crate::protos::*;

/// Numeric MRP message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MessageType {
    SendCommand = 1,
    SetState = 4,
    SendHidEvent = 8,
    DeviceInfo = 15,
    ClientUpdatesConfig = 16,
    TextInput = 25,
    PlaybackQueueRequest = 32,
    CryptoPairing = 34,
    SetConnectionState = 38,
    WakeDevice = 41,
    Generic = 42,
    SendButtonEvent = 43,
    GetKeyboardSession = 71,
}

impl MessageType {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::SendCommand,
            4 => Self::SetState,
            8 => Self::SendHidEvent,
            15 => Self::DeviceInfo,
            16 => Self::ClientUpdatesConfig,
            25 => Self::TextInput,
            32 => Self::PlaybackQueueRequest,
            34 => Self::CryptoPairing,
            38 => Self::SetConnectionState,
            41 => Self::WakeDevice,
            42 => Self::Generic,
            43 => Self::SendButtonEvent,
            71 => Self::GetKeyboardSession,
            _ => return None,
        })
    }
}

impl ProtocolMessage {
    /// The decoded message kind, when recognized.
    pub fn kind(&self) -> Option<MessageType> {
        self.r#type.and_then(MessageType::from_code)
    }
}

fn envelope(kind: MessageType) -> ProtocolMessage {
    ProtocolMessage {
        r#type: Some(kind as i32),
        identifier: Some(Uuid::new_v4().to_string()),
        ..Default::default()
    }
}

/// DeviceInfo identifying this client.
pub fn device_info(identifier: &str, name: &str) -> ProtocolMessage {
    let mut msg = envelope(MessageType::DeviceInfo);
    msg.device_info = Some(DeviceInfoMessage {
        unique_identifier: Some(identifier.to_string()),
        name: Some(name.to_string()),
        system_build_version: Some("17K449".to_string()),
        application_bundle_identifier: Some("com.apple.TVRemote".to_string()),
        protocol_version: Some(1),
        supports_system_pairing: Some(true),
        allows_pairing: Some(true),
        model: None,
    });
    msg
}

/// SetConnectionState with the given state value (2 = connected).
pub fn set_connection_state(state: i32) -> ProtocolMessage {
    let mut msg = envelope(MessageType::SetConnectionState);
    msg.set_connection_state = Some(SetConnectionStateMessage { state: Some(state) });
    msg
}

/// ClientUpdatesConfig subscribing to artwork, now-playing, volume, and
/// keyboard updates.
pub fn client_updates_config() -> ProtocolMessage {
    let mut msg = envelope(MessageType::ClientUpdatesConfig);
    msg.client_updates_config = Some(ClientUpdatesConfigMessage {
        artwork_updates: Some(true),
        now_playing_updates: Some(true),
        volume_updates: Some(true),
        keyboard_updates: Some(true),
    });
    msg
}

/// GetKeyboardSession request.
pub fn get_keyboard_session() -> ProtocolMessage {
    envelope(MessageType::GetKeyboardSession)
}

/// SendCommand with a media command.
pub fn send_command(command: MediaCommand) -> ProtocolMessage {
    let mut msg = envelope(MessageType::SendCommand);
    msg.send_command = Some(SendCommandMessage {
        command: Some(command as i32),
    });
    msg
}

/// SendHIDEvent for one usage transition.
pub fn send_hid_event(usage_page: u16, usage: u16, down: bool) -> ProtocolMessage {
    let mut msg = envelope(MessageType::SendHidEvent);
    msg.send_hid_event = Some(SendHidEventMessage {
        hid_event_data: Some(hid::event_payload(usage_page, usage, down)),
    });
    msg
}

/// SendButtonEvent for one usage transition.
pub fn send_button_event(usage_page: u16, usage: u16, down: bool) -> ProtocolMessage {
    let mut msg = envelope(MessageType::SendButtonEvent);
    msg.send_button_event = Some(SendButtonEventMessage {
        usage_page: Some(usage_page as u32),
        usage: Some(usage as u32),
        button_down: Some(down),
    });
    msg
}

/// WakeDevice request.
pub fn wake_device() -> ProtocolMessage {
    let mut msg = envelope(MessageType::WakeDevice);
    msg.wake_device = Some(WakeDeviceMessage {});
    msg
}

/// TextInput carrying keyboard text.
pub fn text_input(text: &str, clear_previous: bool) -> ProtocolMessage {
    let mut msg = envelope(MessageType::TextInput);
    msg.text_input = Some(TextInputMessage {
        text: Some(text.to_string()),
        clear_previous: Some(clear_previous),
    });
    msg
}

/// PlaybackQueueRequest for a queue window.
pub fn playback_queue_request(location: i32, length: i32) -> ProtocolMessage {
    let mut msg = envelope(MessageType::PlaybackQueueRequest);
    msg.playback_queue_request = Some(PlaybackQueueRequestMessage {
        location: Some(location),
        length: Some(length),
        include_metadata: Some(true),
    });
    msg
}

/// Empty GenericMessage, used to flush after HID presses.
pub fn generic() -> ProtocolMessage {
    envelope(MessageType::Generic)
}

/// CryptoPairing carrier. Only used over Companion; over AirPlay the HAP
/// layer already encrypts the data channel and inner encryption must not
/// be applied. Deliberately has NO identifier.
pub fn crypto_pairing(pairing_data: Vec<u8>) -> ProtocolMessage {
    ProtocolMessage {
        r#type: Some(MessageType::CryptoPairing as i32),
        identifier: None,
        crypto_pairing: Some(CryptoPairingMessage {
            pairing_data: Some(pairing_data),
            status: Some(0),
        }),
        ..Default::default()
    }
}

/// Ordered registry of waiters for inbound messages.
///
/// The first waiter whose filter matches an arriving message is dequeued
/// and fulfilled; a waiter with no filter matches the next message of any
/// kind. Dropping the registry cancels every waiter.
#[derive(Default)]
pub struct ResponseWaiters {
    queue: VecDeque<Waiter>,
}

struct Waiter {
    filter: Option<MessageType>,
    tx: oneshot::Sender<ProtocolMessage>,
}

impl ResponseWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter; resolves with the first matching message.
    pub fn register(&mut self, filter: Option<MessageType>) -> oneshot::Receiver<ProtocolMessage> {
        let (tx, rx) = oneshot::channel();
        self.queue.push_back(Waiter { filter, tx });
        rx
    }

    /// Offer an inbound message to the queue.
    ///
    /// Returns the message back when no waiter matched, so the caller can
    /// hand it to observers instead.
    pub fn dispatch(&mut self, message: ProtocolMessage) -> Option<ProtocolMessage> {
        let kind = message.kind();
        let position = self
            .queue
            .iter()
            .position(|w| w.filter.is_none() || (kind.is_some() && w.filter == kind));

        match position {
            Some(index) => {
                let waiter = self.queue.remove(index).expect("index from position");
                if let Err(unsent) = waiter.tx.send(message) {
                    // The requester gave up (timeout); treat as unmatched.
                    debug!(kind = ?unsent.kind(), "waiter gone, re-dispatching");
                    return self.dispatch(unsent);
                }
                None
            }
            None => Some(message),
        }
    }

    /// Drop all waiters (their receivers observe closure).
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
