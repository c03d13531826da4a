//! Event and data channel handling.
//!
//! Both channels carry HAP frames. The event socket is a reverse channel:
//! the server sends HTTP-shaped requests which we acknowledge with minimal
//! 200 responses. The data socket carries DataStream frames wrapping MRP
//! protobuf messages.

use std::collections::HashMap;
use std::sync::Arc;

use mediaremote_core::error::{ProtocolError, Result};
use mediaremote_crypto::chacha::HapSession;
use mediaremote_mrp::datastream::{self, FrameKind};
use mediaremote_mrp::messages::ResponseWaiters;
use mediaremote_mrp::protos::ProtocolMessage;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// An inbound HTTP-shaped request on the event socket.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl InboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Try to parse one complete request from the front of `buf`.
pub fn parse_inbound_request(buf: &[u8]) -> Result<Option<(InboundRequest, usize)>> {
    let header_end = match buf.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(pos) => pos,
        None => return Ok(None),
    };
    let body_start = header_end + 4;

    let header_text = std::str::from_utf8(&buf[..header_end]).map_err(|_| {
        ProtocolError::InvalidFormat("invalid UTF-8 in request headers".to_string())
    })?;
    let mut lines = header_text.lines();
    let request_line = lines
        .next()
        .ok_or_else(|| ProtocolError::InvalidFormat("missing request line".to_string()))?;

    let mut parts = request_line.split(' ');
    let method = parts
        .next()
        .ok_or_else(|| ProtocolError::InvalidFormat("empty request line".to_string()))?
        .to_string();
    let target = parts.next().unwrap_or("").to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    if buf.len() < body_start + content_length {
        return Ok(None);
    }

    let body = if content_length > 0 {
        Some(buf[body_start..body_start + content_length].to_vec())
    } else {
        None
    };

    Ok(Some((
        InboundRequest {
            method,
            target,
            headers,
            body,
        },
        body_start + content_length,
    )))
}

/// Build the minimal acknowledgement for an event request, echoing CSeq
/// and Server when present.
pub fn event_response(request: &InboundRequest) -> Vec<u8> {
    let mut out = String::from("RTSP/1.0 200 OK\r\n");
    if let Some(cseq) = request.header("CSeq") {
        out.push_str(&format!("CSeq: {}\r\n", cseq));
    }
    if let Some(server) = request.header("Server") {
        out.push_str(&format!("Server: {}\r\n", server));
    }
    out.push_str("Content-Length: 0\r\n\r\n");
    out.into_bytes()
}

/// Drain complete HAP frames from `ciphertext` into `plaintext`.
///
/// Returns an error on authentication failure, which is fatal for the
/// channel.
pub(crate) fn drain_frames(
    session: &mut HapSession,
    ciphertext: &mut Vec<u8>,
    plaintext: &mut Vec<u8>,
) -> Result<()> {
    while let Some(total) = HapSession::parse_frame_length(ciphertext) {
        if ciphertext.len() < total {
            break;
        }
        let declared = u16::from_le_bytes([ciphertext[0], ciphertext[1]]);
        let opened = session.decrypt_frame(&ciphertext[2..total], declared)?;
        plaintext.extend_from_slice(&opened);
        ciphertext.drain(..total);
    }
    Ok(())
}

/// Event socket loop: answer inbound encrypted requests until the socket
/// closes or the session fails.
pub async fn event_loop(
    mut stream: TcpStream,
    mut session: HapSession,
    requests: mpsc::UnboundedSender<InboundRequest>,
) {
    let mut ciphertext = Vec::new();
    let mut plaintext = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "event socket read failed");
                break;
            }
        };
        ciphertext.extend_from_slice(&chunk[..n]);

        if let Err(e) = drain_frames(&mut session, &mut ciphertext, &mut plaintext) {
            warn!(error = %e, "event channel decryption failed, closing");
            break;
        }

        loop {
            let parsed = match parse_inbound_request(&plaintext) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => break,
                Err(e) => {
                    // A malformed request is dropped with the buffer; the
                    // channel itself continues.
                    warn!(error = %e, "dropping malformed event request");
                    plaintext.clear();
                    break;
                }
            };
            let (request, consumed) = parsed;
            plaintext.drain(..consumed);
            debug!(method = %request.method, target = %request.target, "event request");

            let response = event_response(&request);
            let wire = match session.encrypt(&response) {
                Ok(wire) => wire,
                Err(e) => {
                    warn!(error = %e, "event channel encryption failed, closing");
                    return;
                }
            };
            if stream.write_all(&wire).await.is_err() {
                return;
            }
            let _ = requests.send(request);
        }
    }
}

/// The MRP data channel: HAP session plus DataStream framing.
///
/// The outbound sequence is chosen once per connection and reused for
/// every sync frame.
pub struct MrpChannel {
    session: Arc<Mutex<HapSession>>,
    writer: Mutex<tokio::net::tcp::OwnedWriteHalf>,
    sequence: u64,
}

impl MrpChannel {
    pub fn new(
        session: Arc<Mutex<HapSession>>,
        writer: tokio::net::tcp::OwnedWriteHalf,
        sequence: u64,
    ) -> Self {
        Self {
            session,
            writer: Mutex::new(writer),
            sequence,
        }
    }

    /// Encrypt and send one MRP message as a sync frame.
    pub async fn send_message(&self, message: &ProtocolMessage) -> Result<()> {
        let frame = datastream::build_sync(self.sequence, &message.encode_to_vec());
        self.send_raw(&frame).await
    }

    /// Acknowledge an inbound sync frame.
    async fn send_reply(&self, sequence: u64) -> Result<()> {
        self.send_raw(&datastream::build_reply(sequence)).await
    }

    async fn send_raw(&self, frame: &[u8]) -> Result<()> {
        let wire = {
            let mut session = self.session.lock().await;
            session.encrypt(frame)?
        };
        let mut writer = self.writer.lock().await;
        writer.write_all(&wire).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Data socket read loop: decrypt, reassemble DataStream frames, dispatch
/// MRP messages, and acknowledge sync frames.
pub async fn data_loop(
    mut reader: OwnedReadHalf,
    session: Arc<Mutex<HapSession>>,
    channel: Arc<MrpChannel>,
    waiters: Arc<Mutex<ResponseWaiters>>,
    events: mpsc::UnboundedSender<ProtocolMessage>,
) {
    let mut ciphertext = Vec::new();
    let mut plaintext = Vec::new();
    let mut chunk = [0u8; 4096];

    'outer: loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "data socket read failed");
                break;
            }
        };
        ciphertext.extend_from_slice(&chunk[..n]);

        let drained = {
            let mut session = session.lock().await;
            drain_frames(&mut session, &mut ciphertext, &mut plaintext)
        };
        if let Err(e) = drained {
            warn!(error = %e, "data channel decryption failed, closing");
            break;
        }

        loop {
            let frame = match datastream::parse_frame(&plaintext) {
                Ok(Some((frame, consumed))) => {
                    plaintext.drain(..consumed);
                    frame
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "datastream framing violation, closing");
                    break 'outer;
                }
            };

            match frame.kind {
                FrameKind::Reply => {
                    // Acknowledgement of one of our sync frames.
                    debug!(sequence = frame.sequence, "datastream reply absorbed");
                }
                FrameKind::Sync => {
                    if channel.send_reply(frame.sequence).await.is_err() {
                        break 'outer;
                    }
                    let protobuf = match datastream::decode_payload(&frame.payload) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            // One undecodable payload does not kill the
                            // channel.
                            warn!(error = %e, "dropping undecodable datastream payload");
                            continue;
                        }
                    };
                    let message = match ProtocolMessage::decode_from(&protobuf) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!(error = %e, "dropping undecodable protobuf message");
                            continue;
                        }
                    };
                    debug!(kind = ?message.kind(), "inbound MRP message");
                    let unmatched = waiters.lock().await.dispatch(message);
                    if let Some(message) = unmatched {
                        let _ = events.send(message);
                    }
                }
            }
        }
    }

    waiters.lock().await.clear();
}
