//! Companion connection state machine.
//!
//! A single TCP connection to the device's companion port. Pairing runs in
//! plaintext framed mode (`PS_*`/`PV_*` frames carrying compact-pack
//! envelopes); after key derivation every frame is `E_OPACK`. Requests are
//! tagged with `_i`/`_x`; responses echo `_x`; unmatched inbound maps are
//! surfaced as events.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mediaremote_core::credentials::Credentials;
use mediaremote_core::error::{Error, ProtocolError, Result};
use mediaremote_core::state::ConnectionState;
use mediaremote_crypto::ed25519::IdentityKeyPair;
use mediaremote_pairing::{pair_setup, pair_verify, PairingTransport, VerifyVariant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::frames::{self, FrameType};
use crate::opack::{self, Value};
use crate::session::CompanionSession;

/// Default deadline for request/response exchanges.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection to the companion service of one device.
pub struct CompanionConnection {
    state: ConnectionState,
    stream: Option<TcpStream>,
    shared: Option<Arc<Shared>>,
    read_task: Option<JoinHandle<()>>,
    events_rx: Option<mpsc::UnboundedReceiver<Value>>,
}

struct Shared {
    writer: Mutex<OwnedWriteHalf>,
    session: Mutex<CompanionSession>,
    pending: Mutex<Pending>,
}

#[derive(Default)]
struct Pending {
    next_xid: u64,
    transfers: HashMap<u64, oneshot::Sender<Value>>,
    closed: bool,
}

impl CompanionConnection {
    /// Open the TCP connection.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        info!(%addr, "companion TCP open");
        Ok(Self {
            state: ConnectionState::TcpOpen,
            stream: Some(stream),
            shared: None,
            read_task: None,
            events_rx: None,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// First-time pairing over `PS_Start`/`PS_Next` frames.
    ///
    /// Runs in plaintext framed mode; the connection stays usable for a
    /// subsequent [`verify`](Self::verify).
    pub async fn pair(
        &mut self,
        pin: &str,
        client_id: &str,
        identity: IdentityKeyPair,
    ) -> Result<Credentials> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(Error::Closed)?;
        let mut transport = FramedPairingTransport::new(stream);
        pair_setup(&mut transport, pin, client_id, identity).await
    }

    /// Pair-verify over `PV_Start`/`PV_Next` frames, then switch the
    /// connection to encrypted `E_OPACK` traffic.
    pub async fn verify(&mut self, credentials: &Credentials) -> Result<()> {
        let mut stream = self.stream.take().ok_or(Error::Closed)?;
        self.state = ConnectionState::VerifyInProgress;

        let verified = {
            let mut transport = FramedPairingTransport::new(&mut stream);
            match pair_verify(&mut transport, credentials, VerifyVariant::Companion).await {
                Ok(v) => v,
                Err(e) => {
                    // The failed stream is dropped; nothing survives.
                    self.state = ConnectionState::Disconnected;
                    return Err(e);
                }
            }
        };

        let session = CompanionSession::from_keys(&verified.channel_keys);
        let (read_half, write_half) = stream.into_split();
        let shared = Arc::new(Shared {
            writer: Mutex::new(write_half),
            session: Mutex::new(session),
            pending: Mutex::new(Pending::default()),
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(read_loop(read_half, Arc::clone(&shared), events_tx));

        self.shared = Some(shared);
        self.read_task = Some(task);
        self.events_rx = Some(events_rx);
        self.state = ConnectionState::Ready;
        info!("companion channel ready");
        Ok(())
    }

    /// Take the receiver for unsolicited event maps.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<Value>> {
        self.events_rx.take()
    }

    /// Send a request and wait for the response echoing our `_x`.
    pub async fn request(&self, identifier: &str, content: Value) -> Result<Value> {
        self.request_with_timeout(identifier, content, REQUEST_TIMEOUT)
            .await
    }

    pub async fn request_with_timeout(
        &self,
        identifier: &str,
        content: Value,
        deadline: Duration,
    ) -> Result<Value> {
        if !self.state.is_ready() {
            return Err(Error::Closed);
        }
        let shared = self.shared.as_ref().ok_or(Error::Closed)?;

        let (xid, rx) = {
            let mut pending = shared.pending.lock().await;
            if pending.closed {
                return Err(Error::Closed);
            }
            let xid = pending.next_xid;
            pending.next_xid += 1;
            let (tx, rx) = oneshot::channel();
            pending.transfers.insert(xid, tx);
            (xid, rx)
        };

        let mut entries = vec![
            (Value::from("_i"), Value::from(identifier)),
            (Value::from("_x"), Value::Int(xid as i64)),
        ];
        if let Value::Dict(content_entries) = content {
            entries.extend(content_entries);
        }
        let body = opack::encode(&Value::Dict(entries));

        if let Err(e) = self.send_frame(&body).await {
            shared.pending.lock().await.transfers.remove(&xid);
            return Err(e);
        }

        match timeout(deadline, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                shared.pending.lock().await.transfers.remove(&xid);
                Err(Error::Timeout)
            }
        }
    }

    async fn send_frame(&self, body: &[u8]) -> Result<()> {
        let shared = self.shared.as_ref().ok_or(Error::Closed)?;
        let frame = {
            let mut session = shared.session.lock().await;
            session.encrypt_frame(FrameType::EOpack, body)?
        };
        let mut writer = shared.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Tear down the connection, cancelling every pending request.
    pub async fn close(&mut self) {
        self.state = ConnectionState::Closing;
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        if let Some(shared) = self.shared.take() {
            let mut pending = shared.pending.lock().await;
            pending.closed = true;
            pending.transfers.clear();
        }
        self.stream = None;
        self.state = ConnectionState::Disconnected;
    }
}

impl Drop for CompanionConnection {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}

/// Read loop: reassembles frames, decrypts, and routes by `_x`.
async fn read_loop(
    mut reader: OwnedReadHalf,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<Value>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    'outer: loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "companion socket read failed");
                break;
            }
        };
        buf.extend_from_slice(&chunk[..n]);

        let (complete, consumed) = match frames::split_frames(&buf) {
            Ok(split) => split,
            Err(e) => {
                warn!(error = %e, "companion framing violation, closing");
                break;
            }
        };
        buf.drain(..consumed);

        for frame in complete {
            match frame.frame_type {
                FrameType::EOpack => {
                    let plaintext = {
                        let mut session = shared.session.lock().await;
                        match session.decrypt_frame(FrameType::EOpack, &frame.body) {
                            Ok(p) => p,
                            Err(e) => {
                                // Decryption failure is fatal for the channel.
                                warn!(error = %e, "companion decrypt failed, closing");
                                break 'outer;
                            }
                        }
                    };
                    match opack::decode(&plaintext) {
                        Ok(value) => route(&shared, &events, value).await,
                        Err(e) => {
                            // Malformed payloads are dropped; the channel
                            // continues.
                            warn!(error = %e, "dropping undecodable companion payload");
                        }
                    }
                }
                FrameType::NoOp => {}
                other => {
                    debug!(frame_type = ?other, "ignoring non-data frame in steady state");
                }
            }
        }
    }

    let mut pending = shared.pending.lock().await;
    pending.closed = true;
    pending.transfers.clear();
}

async fn route(shared: &Arc<Shared>, events: &mpsc::UnboundedSender<Value>, value: Value) {
    let xid = value.get("_x").and_then(Value::as_i64);
    if let Some(xid) = xid {
        let sender = shared.pending.lock().await.transfers.remove(&(xid as u64));
        if let Some(sender) = sender {
            let _ = sender.send(value);
            return;
        }
    }
    let _ = events.send(value);
}

/// Pairing TLVs wrapped in compact-pack envelopes over plaintext frames.
struct FramedPairingTransport<'a> {
    stream: &'a mut TcpStream,
    buf: Vec<u8>,
    setup_xid: i64,
}

impl<'a> FramedPairingTransport<'a> {
    fn new(stream: &'a mut TcpStream) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            setup_xid: 0,
        }
    }

    async fn exchange(&mut self, frame_type: FrameType, envelope: &Value) -> Result<Vec<u8>> {
        let frame = frames::encode(frame_type, &opack::encode(envelope))?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;

        loop {
            let (mut complete, consumed) = frames::split_frames(&self.buf)?;
            self.buf.drain(..consumed);
            if let Some(frame) = complete.pop() {
                let value = opack::decode(&frame.body)?;
                let tlv = value
                    .get("_pd")
                    .and_then(Value::as_bytes)
                    .ok_or(ProtocolError::MissingField("_pd"))?;
                return Ok(tlv.to_vec());
            }

            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::Closed);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

#[async_trait]
impl PairingTransport for FramedPairingTransport<'_> {
    async fn send_setup(&mut self, first: bool, tlv: &[u8]) -> Result<Vec<u8>> {
        self.setup_xid += 1;
        let envelope = Value::dict([
            ("_pd", Value::Bytes(tlv.to_vec())),
            ("_pwTy", Value::Int(1)),
            ("_x", Value::Int(self.setup_xid)),
        ]);
        let frame_type = if first {
            FrameType::PsStart
        } else {
            FrameType::PsNext
        };
        self.exchange(frame_type, &envelope).await
    }

    async fn send_verify(&mut self, first: bool, tlv: &[u8]) -> Result<Vec<u8>> {
        let envelope = Value::dict([
            ("_pd", Value::Bytes(tlv.to_vec())),
            ("_auTy", Value::Int(4)),
        ]);
        let frame_type = if first {
            FrameType::PvStart
        } else {
            FrameType::PvNext
        };
        self.exchange(frame_type, &envelope).await
    }
}
