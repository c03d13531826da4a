//! AirPlay connection state machine.
//!
//! One persistent TCP connection carries pair-verify (plaintext HTTP), then
//! every RTSP byte through the control HAP session. Channel bring-up:
//!
//! ```text
//! Disconnected -> TcpOpen -> VerifyInProgress -> VerifyComplete
//!   -> SetupInProgress: SETUP (event), RECORD, heartbeat, SETUP (data)
//!   -> MRP init on the data socket -> Ready
//! Ready -> Closing -> Disconnected
//! ```
//!
//! The data channel is already HAP-encrypted, so MRP's inner CryptoPairing
//! exchange is skipped and no inner encryption is applied.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mediaremote_core::credentials::Credentials;
use mediaremote_core::error::{ConnectStage, Error, Result};
use mediaremote_core::state::ConnectionState;
use mediaremote_crypto::chacha::HapSession;
use mediaremote_crypto::ed25519::IdentityKeyPair;
use mediaremote_crypto::keys::{SessionKeys, SharedSecret};
use mediaremote_pairing::{pair_setup, pair_verify, PairingTransport, VerifyVariant};
use mediaremote_mrp::datastream;
use mediaremote_mrp::hid::{self, MediaCommand, RemoteKey};
use mediaremote_mrp::messages::{self, MessageType, ResponseWaiters};
use mediaremote_mrp::protos::ProtocolMessage;
use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channels::{self, InboundRequest, MrpChannel};
use crate::plist_codec::{
    self, DataSetupRequest, DataSetupResponse, EventSetupRequest, EventSetupResponse,
};
use crate::request::RtspRequest;
use crate::response::RtspResponse;

/// Deadline for one control request/response round trip.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for the DeviceInfo exchange during MRP init.
const MRP_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settle time for unsolicited server updates after MRP init.
const MRP_SETTLE: Duration = Duration::from_millis(500);

/// Control connection to an AirPlay device.
pub struct AirPlayConnection {
    state: ConnectionState,
    addr: SocketAddr,
    control: Option<Arc<Mutex<ControlChannel>>>,
    /// rtsp://<local-bound-ip>/<session-id> request target.
    rtsp_target: String,
    client_uuid: String,
    shared_secret: Option<SharedSecret>,
    waiters: Arc<Mutex<ResponseWaiters>>,
    data_channel: Option<Arc<MrpChannel>>,
    event_task: Option<JoinHandle<()>>,
    data_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
    event_requests: Option<mpsc::UnboundedReceiver<InboundRequest>>,
    mrp_events: Option<mpsc::UnboundedReceiver<ProtocolMessage>>,
}

/// The control socket with its optional HAP session and CSeq counter.
struct ControlChannel {
    stream: TcpStream,
    session: Option<HapSession>,
    cseq: u32,
    session_headers: Vec<(String, String)>,
    ciphertext: Vec<u8>,
    plaintext: Vec<u8>,
}

impl ControlChannel {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            session: None,
            cseq: 0,
            session_headers: Vec::new(),
            ciphertext: Vec::new(),
            plaintext: Vec::new(),
        }
    }

    /// Send one request and read its response. Writes on the socket are
    /// serialized by the caller holding the channel lock for the whole
    /// round trip.
    async fn send(&mut self, mut request: RtspRequest) -> Result<RtspResponse> {
        for (key, value) in &self.session_headers {
            request = request.header(key.clone(), value.clone());
        }
        self.cseq += 1;
        let wire_plain = request.serialize(self.cseq);
        debug!(
            method = request.method.as_str(),
            uri = %request.uri,
            cseq = self.cseq,
            encrypted = self.session.is_some(),
            "control request"
        );

        let wire = match &mut self.session {
            Some(session) => session.encrypt(&wire_plain)?,
            None => wire_plain,
        };
        self.stream.write_all(&wire).await?;
        self.stream.flush().await?;

        timeout(CONTROL_TIMEOUT, self.read_response())
            .await
            .map_err(|_| Error::Timeout)?
    }

    async fn read_response(&mut self) -> Result<RtspResponse> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some((response, consumed)) = RtspResponse::try_parse(&self.plaintext)? {
                self.plaintext.drain(..consumed);
                debug!(status = response.status_code, "control response");
                return Ok(response);
            }

            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::Closed);
            }
            match &mut self.session {
                Some(session) => {
                    self.ciphertext.extend_from_slice(&chunk[..n]);
                    channels::drain_frames(session, &mut self.ciphertext, &mut self.plaintext)?;
                }
                None => self.plaintext.extend_from_slice(&chunk[..n]),
            }
        }
    }
}

impl AirPlayConnection {
    /// Open the TCP connection to the device's AirPlay port.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let local_ip = stream.local_addr()?.ip();
        info!(%addr, "airplay TCP open");

        // The session id is a random 32-bit decimal chosen once per
        // connection; DACP-ID/Client-Instance share a random 8-byte hex.
        let mut rng = rand::thread_rng();
        let session_id: u32 = rng.gen();
        let dacp_id = format!("{:016X}", rng.gen::<u64>());
        let active_remote: u32 = rng.gen();

        let mut control = ControlChannel::new(stream);
        control.session_headers = vec![
            ("User-Agent".to_string(), "MediaRemote/1.0".to_string()),
            ("DACP-ID".to_string(), dacp_id.clone()),
            ("Client-Instance".to_string(), dacp_id),
            ("Active-Remote".to_string(), active_remote.to_string()),
        ];

        Ok(Self {
            state: ConnectionState::TcpOpen,
            addr,
            control: Some(Arc::new(Mutex::new(control))),
            rtsp_target: format!("rtsp://{}/{}", local_ip, session_id),
            client_uuid: Uuid::new_v4().to_string(),
            shared_secret: None,
            waiters: Arc::new(Mutex::new(ResponseWaiters::new())),
            data_channel: None,
            event_task: None,
            data_task: None,
            heartbeat_task: None,
            event_requests: None,
            mrp_events: None,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// First-time pairing over plaintext HTTP POSTs.
    pub async fn pair(
        &mut self,
        pin: &str,
        client_id: &str,
        identity: IdentityKeyPair,
    ) -> Result<Credentials> {
        let control = self.control.clone().ok_or(Error::Closed)?;
        let mut guard = control.lock().await;
        let mut transport = HttpPairingTransport {
            control: &mut guard,
        };
        pair_setup(&mut transport, pin, client_id, identity).await
    }

    /// Bring the connection to `Ready`: verify, channel setup, MRP init.
    pub async fn open(&mut self, credentials: &Credentials) -> Result<()> {
        if let Err(e) = self.open_inner(credentials).await {
            self.close().await;
            return Err(e);
        }
        Ok(())
    }

    async fn open_inner(&mut self, credentials: &Credentials) -> Result<()> {
        let control = self.control.clone().ok_or(Error::Closed)?;

        // Pair-verify in plaintext on the connection to be upgraded.
        self.state = ConnectionState::VerifyInProgress;
        let verified = {
            let mut guard = control.lock().await;
            let mut transport = HttpPairingTransport {
                control: &mut guard,
            };
            pair_verify(&mut transport, credentials, VerifyVariant::AirPlay)
                .await
                .map_err(|e| Error::at_stage(ConnectStage::Verify, e))?
        };

        // Every subsequent byte on this socket goes through the control
        // session.
        control.lock().await.session = Some(HapSession::from_keys(&verified.channel_keys));
        self.shared_secret = Some(verified.shared_secret);
        self.state = ConnectionState::VerifyComplete;
        info!("control channel encrypted");

        self.state = ConnectionState::SetupInProgress;
        self.setup_event_channel(&control)
            .await
            .map_err(|e| Error::at_stage(ConnectStage::SetupEvent, e))?;

        self.record(&control)
            .await
            .map_err(|e| Error::at_stage(ConnectStage::Record, e))?;
        self.start_heartbeat(&control);

        self.setup_data_channel(&control)
            .await
            .map_err(|e| Error::at_stage(ConnectStage::SetupData, e))?;

        self.mrp_init(credentials)
            .await
            .map_err(|e| Error::at_stage(ConnectStage::MrpInit, e))?;

        self.state = ConnectionState::Ready;
        info!("airplay connection ready");
        Ok(())
    }

    async fn setup_event_channel(&mut self, control: &Arc<Mutex<ControlChannel>>) -> Result<()> {
        let body = plist_codec::encode(&EventSetupRequest::new(
            &self.client_uuid,
            &self.client_uuid,
        ))?;
        let request = RtspRequest::setup(self.rtsp_target.clone(), body);
        let response = control.lock().await.send(request).await?;
        response.ensure_success()?;
        let setup: EventSetupResponse = response.body_as_plist()?;
        debug!(port = setup.event_port, "event channel negotiated");

        let shared = self.shared_secret.as_ref().expect("set during verify");
        let keys = SessionKeys::derive_events(shared)?;
        let stream = TcpStream::connect((self.addr.ip(), setup.event_port)).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.event_requests = Some(rx);
        self.event_task = Some(tokio::spawn(channels::event_loop(
            stream,
            HapSession::from_keys(&keys),
            tx,
        )));
        Ok(())
    }

    async fn record(&mut self, control: &Arc<Mutex<ControlChannel>>) -> Result<()> {
        let request = RtspRequest::record(self.rtsp_target.clone());
        let response = control.lock().await.send(request).await?;
        response.ensure_success()
    }

    /// POST /feedback every two seconds. Failures are logged and non-fatal
    /// unless the socket has closed.
    fn start_heartbeat(&mut self, control: &Arc<Mutex<ControlChannel>>) {
        let control = Arc::clone(control);
        self.heartbeat_task = Some(tokio::spawn(async move {
            let mut ticker = interval(datastream::FEEDBACK_INTERVAL);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let result = control.lock().await.send(RtspRequest::feedback()).await;
                match result {
                    Ok(response) if !response.is_success() => {
                        warn!(status = response.status_code, "feedback rejected");
                    }
                    Ok(_) => debug!("feedback acknowledged"),
                    Err(Error::Closed) | Err(Error::Connection(_)) => {
                        warn!("control socket closed, stopping heartbeat");
                        break;
                    }
                    Err(e) => warn!(error = %e, "feedback failed"),
                }
            }
        }));
    }

    async fn setup_data_channel(&mut self, control: &Arc<Mutex<ControlChannel>>) -> Result<()> {
        // Positive 32-bit seed, folded into the channel key salt.
        let seed: i32 = rand::thread_rng().gen_range(1..=i32::MAX);
        let channel_id = Uuid::new_v4().to_string();

        let body = plist_codec::encode(&DataSetupRequest::new(
            &channel_id,
            &self.client_uuid,
            seed,
        ))?;
        let request = RtspRequest::setup(self.rtsp_target.clone(), body);
        let response = control.lock().await.send(request).await?;
        response.ensure_success()?;
        let setup: DataSetupResponse = response.body_as_plist()?;
        let data_port = setup
            .streams
            .first()
            .ok_or(mediaremote_core::error::ProtocolError::MissingField(
                "streams[0].dataPort",
            ))?
            .data_port;
        debug!(port = data_port, seed, "data channel negotiated");

        let shared = self.shared_secret.as_ref().expect("set during verify");
        let keys = SessionKeys::derive_datastream(shared, seed)?;
        let stream = TcpStream::connect((self.addr.ip(), data_port)).await?;
        let (read_half, write_half) = stream.into_split();

        let session = Arc::new(Mutex::new(HapSession::from_keys(&keys)));
        let channel = Arc::new(MrpChannel::new(
            Arc::clone(&session),
            write_half,
            datastream::new_sequence_seed(),
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        self.mrp_events = Some(rx);
        self.data_task = Some(tokio::spawn(channels::data_loop(
            read_half,
            session,
            Arc::clone(&channel),
            Arc::clone(&self.waiters),
            tx,
        )));
        self.data_channel = Some(channel);
        Ok(())
    }

    /// The MRP bring-up dialogue on the data socket.
    async fn mrp_init(&mut self, credentials: &Credentials) -> Result<()> {
        let info = messages::device_info(&credentials.client_id, "Media Remote");
        let reply = self
            .request_inner(info, Some(MessageType::DeviceInfo), MRP_INIT_TIMEOUT)
            .await?;
        debug!(
            name = reply
                .device_info
                .as_ref()
                .and_then(|i| i.name.as_deref())
                .unwrap_or("<unnamed>"),
            "server device info"
        );

        self.send_message(messages::set_connection_state(2)).await?;
        self.send_message(messages::client_updates_config()).await?;
        self.send_message(messages::get_keyboard_session()).await?;

        // Let unsolicited server updates land before reporting Ready.
        sleep(MRP_SETTLE).await;
        Ok(())
    }

    /// Send one MRP message on the data channel.
    pub async fn send_message(&self, message: ProtocolMessage) -> Result<()> {
        let channel = self.data_channel.as_ref().ok_or(Error::Closed)?;
        channel.send_message(&message).await
    }

    /// Send a message and wait for a response matching `filter`.
    pub async fn request(
        &self,
        message: ProtocolMessage,
        filter: Option<MessageType>,
        deadline: Duration,
    ) -> Result<ProtocolMessage> {
        if !self.state.is_ready() {
            return Err(Error::Closed);
        }
        self.request_inner(message, filter, deadline).await
    }

    async fn request_inner(
        &self,
        message: ProtocolMessage,
        filter: Option<MessageType>,
        deadline: Duration,
    ) -> Result<ProtocolMessage> {
        let rx = self.waiters.lock().await.register(filter);
        self.send_message(message).await?;
        match timeout(deadline, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Press and release a remote key: HID down, delay, HID up, flush.
    pub async fn press_key(&self, key: RemoteKey) -> Result<()> {
        self.press_key_with_delay(key, hid::KEY_PRESS_DELAY).await
    }

    /// Long-press variant (1 second hold).
    pub async fn press_key_long(&self, key: RemoteKey) -> Result<()> {
        self.press_key_with_delay(key, hid::LONG_PRESS_DELAY).await
    }

    async fn press_key_with_delay(&self, key: RemoteKey, delay: Duration) -> Result<()> {
        let (page, usage) = key.usage();
        self.send_message(messages::send_hid_event(page, usage, true))
            .await?;
        sleep(delay).await;
        self.send_message(messages::send_hid_event(page, usage, false))
            .await?;
        self.send_message(messages::generic()).await
    }

    /// Send a media command.
    pub async fn send_command(&self, command: MediaCommand) -> Result<()> {
        self.send_message(messages::send_command(command)).await
    }

    /// Take the receiver for unsolicited MRP messages.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<ProtocolMessage>> {
        self.mrp_events.take()
    }

    /// Take the receiver observing inbound event-channel requests.
    pub fn event_requests(&mut self) -> Option<mpsc::UnboundedReceiver<InboundRequest>> {
        self.event_requests.take()
    }

    /// Tear everything down: sockets, timers, and pending waiters.
    pub async fn close(&mut self) {
        self.state = ConnectionState::Closing;
        for task in [
            self.heartbeat_task.take(),
            self.event_task.take(),
            self.data_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
        self.waiters.lock().await.clear();
        self.data_channel = None;
        self.control = None;
        self.shared_secret = None;
        self.state = ConnectionState::Disconnected;
        info!("airplay connection closed");
    }
}

impl Drop for AirPlayConnection {
    fn drop(&mut self) {
        for task in [
            self.heartbeat_task.take(),
            self.event_task.take(),
            self.data_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }
}

/// Pairing TLVs over plaintext HTTP POSTs on the control socket.
struct HttpPairingTransport<'a> {
    control: &'a mut ControlChannel,
}

impl HttpPairingTransport<'_> {
    async fn post(&mut self, request: RtspRequest) -> Result<Vec<u8>> {
        let response = self.control.send(request).await?;
        response.ensure_success()?;
        Ok(response.body.unwrap_or_default())
    }
}

#[async_trait]
impl PairingTransport for HttpPairingTransport<'_> {
    async fn pin_start(&mut self) -> Result<()> {
        self.post(RtspRequest::pair_pin_start()).await.map(|_| ())
    }

    async fn send_setup(&mut self, _first: bool, tlv: &[u8]) -> Result<Vec<u8>> {
        self.post(RtspRequest::pair_setup(tlv.to_vec())).await
    }

    async fn send_verify(&mut self, _first: bool, tlv: &[u8]) -> Result<Vec<u8>> {
        self.post(RtspRequest::pair_verify(tlv.to_vec())).await
    }
}
