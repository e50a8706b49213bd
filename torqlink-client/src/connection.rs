//! Per-device connection manager
//!
//! A [`DeviceConnection`] owns one TCP session at a time and walks it through
//!
//! ```text
//! Idle -> Dialing -> Handshaking(Login) -> Handshaking(Subscribe) -> Streaming -> Closed
//! ```
//!
//! Every path out of a session ends in `Closed`, which marks the device
//! disconnected in the [`DeviceStore`]. [`DeviceConnection::run`] repeats
//! sessions forever, asking the [`ReconnectScheduler`] how long to wait
//! between them, until the cancellation token fires.

use crate::keepalive;
use crate::scheduler::ReconnectScheduler;
use crate::settings::{ReconnectPolicy, SessionTimings};
use crate::store::DeviceStore;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use torqlink_codec::{
    communication_stop, decode, login_request, result_ack, result_subscribe, MessageData,
};
use torqlink_core::{DeviceConfig, Mid, TorqlinkError, TorqlinkResult};
use torqlink_transport::{FrameSink, FrameSource, TcpSettings, TcpTransport};

/// Cap on the MID 0003 write and socket shutdown once a session is cancelled
const SHUTDOWN_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Handshake sub-state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    /// MID 0001 sent, waiting for MID 0002
    Login,
    /// MID 0060 sent, waiting for MID 0005
    Subscribe,
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session attempted yet
    #[default]
    Idle,
    /// TCP connect in progress
    Dialing,
    Handshaking(HandshakeStep),
    /// Handshake complete, results are being read
    Streaming,
    /// Session over, socket released
    Closed,
}

impl ConnectionState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, ConnectionState::Streaming)
    }

    /// Validate state transition
    ///
    /// # Valid Transitions
    /// - `Idle`/`Closed` -> `Dialing`
    /// - `Dialing` -> `Handshaking(Login)` or `Closed`
    /// - `Handshaking(Login)` -> `Handshaking(Subscribe)` or `Closed`
    /// - `Handshaking(Subscribe)` -> `Streaming` or `Closed`
    /// - `Streaming` -> `Closed`
    pub fn validate_transition(&self, next: ConnectionState) -> TorqlinkResult<()> {
        use ConnectionState::*;
        use HandshakeStep::*;

        let valid = matches!(
            (*self, next),
            (Idle, Dialing)
                | (Closed, Dialing)
                | (Dialing, Handshaking(Login))
                | (Dialing, Closed)
                | (Handshaking(Login), Handshaking(Subscribe))
                | (Handshaking(Subscribe), Streaming)
                | (Handshaking(_), Closed)
                | (Streaming, Closed)
                | (Closed, Closed)
        );

        if valid {
            Ok(())
        } else {
            Err(TorqlinkError::InvalidData(format!(
                "Invalid state transition: {} -> {}",
                self, next
            )))
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => f.write_str("Idle"),
            ConnectionState::Dialing => f.write_str("Dialing"),
            ConnectionState::Handshaking(HandshakeStep::Login) => f.write_str("Handshaking(Login)"),
            ConnectionState::Handshaking(HandshakeStep::Subscribe) => {
                f.write_str("Handshaking(Subscribe)")
            }
            ConnectionState::Streaming => f.write_str("Streaming"),
            ConnectionState::Closed => f.write_str("Closed"),
        }
    }
}

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// TCP connect failed or timed out
    DialFailed(TorqlinkError),
    /// Connected, but the MID 0002/0005 acknowledgments were not observed in time
    HandshakeFailed(TorqlinkError),
    /// Streaming read failed with anything other than a timeout
    StreamDropped(TorqlinkError),
    /// The cancellation token fired
    Cancelled,
}

impl SessionOutcome {
    pub fn error(&self) -> Option<&TorqlinkError> {
        match self {
            SessionOutcome::DialFailed(e)
            | SessionOutcome::HandshakeFailed(e)
            | SessionOutcome::StreamDropped(e) => Some(e),
            SessionOutcome::Cancelled => None,
        }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::DialFailed(e) => write!(f, "dial failed: {}", e),
            SessionOutcome::HandshakeFailed(e) => write!(f, "handshake failed: {}", e),
            SessionOutcome::StreamDropped(e) => write!(f, "stream dropped: {}", e),
            SessionOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Connection manager for one controller
pub struct DeviceConnection {
    device: DeviceConfig,
    store: Arc<DeviceStore>,
    timings: SessionTimings,
    policy: ReconnectPolicy,
    state: ConnectionState,
}

impl DeviceConnection {
    /// Create a connection manager
    ///
    /// The device must already be registered in `store`.
    pub fn new(
        device: DeviceConfig,
        store: Arc<DeviceStore>,
        timings: SessionTimings,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            device,
            store,
            timings,
            policy,
            state: ConnectionState::Idle,
        }
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Keep the device connected until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut scheduler = ReconnectScheduler::new(self.policy.clone());
        let id = self.device.id.clone();

        loop {
            log::info!(
                "[{}] Trying to connect to {} (attempt {}/{})...",
                id,
                self.device.endpoint(),
                scheduler.attempt() + 1,
                scheduler.policy().max_attempts
            );

            let outcome = self.connect_once(&cancel).await;
            let Some(retry) = scheduler.next_delay(&outcome) else {
                break;
            };

            match &outcome {
                SessionOutcome::DialFailed(e) => log::warn!(
                    "[{}] Connection failed: {}. Trying again in {:?}.",
                    id,
                    e,
                    retry.delay
                ),
                other => log::info!(
                    "[{}] Session ended ({}). Reconnecting in {:?}.",
                    id,
                    other,
                    retry.delay
                ),
            }

            if !Self::wait(retry.delay, &cancel).await {
                break;
            }
            if let Some(cooldown) = retry.cooldown {
                log::warn!(
                    "[{}] Failed to connect after {} attempts. Waiting {:?} before the next cycle...",
                    id,
                    scheduler.policy().max_attempts,
                    cooldown
                );
                if !Self::wait(cooldown, &cancel).await {
                    break;
                }
            }
        }

        log::info!("[{}] Connection loop stopped", id);
    }

    /// Sleep unless cancelled first; `false` means cancelled
    async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Dial once and run the session to completion
    pub async fn connect_once(&mut self, cancel: &CancellationToken) -> SessionOutcome {
        self.transition(ConnectionState::Dialing);
        let settings = TcpSettings::for_device(&self.device, self.timings.connect_timeout);

        let dialed = tokio::select! {
            _ = cancel.cancelled() => None,
            dialed = TcpTransport::open(&settings) => Some(dialed),
        };

        match dialed {
            Some(Ok(transport)) => {
                if let Some(peer) = transport.peer_addr() {
                    log::info!(
                        "[{}] Successfully connected to {}. Starting communication setup...",
                        self.device.id,
                        peer
                    );
                }
                let (reader, writer) = transport.into_framed();
                self.run_session(reader, writer, cancel).await
            }
            Some(Err(e)) => {
                self.close().await;
                SessionOutcome::DialFailed(e)
            }
            None => {
                self.close().await;
                SessionOutcome::Cancelled
            }
        }
    }

    /// Handshake and stream over an already-open connection
    ///
    /// Always leaves the connection `Closed` and the device disconnected.
    pub async fn run_session<R, W>(
        &mut self,
        mut reader: R,
        writer: W,
        cancel: &CancellationToken,
    ) -> SessionOutcome
    where
        R: FrameSource,
        W: FrameSink + 'static,
    {
        let writer = Arc::new(Mutex::new(writer));

        let outcome = match self.handshake(&mut reader, &writer, cancel).await {
            Ok(()) => self.stream(&mut reader, &writer, cancel).await,
            Err(outcome) => outcome,
        };

        let shutdown = async { writer.lock().await.close().await };
        if tokio::time::timeout(self.shutdown_timeout(), shutdown).await.is_err() {
            log::debug!("[{}] Socket shutdown timed out", self.device.id);
        }
        self.close().await;
        log::info!("[{}] Connection closed.", self.device.id);
        outcome
    }

    async fn handshake<R, W>(
        &mut self,
        reader: &mut R,
        writer: &Mutex<W>,
        cancel: &CancellationToken,
    ) -> Result<(), SessionOutcome>
    where
        R: FrameSource,
        W: FrameSink,
    {
        let deadline = self.timings.handshake_timeout;
        let id = self.device.id.clone();

        let exchange = async {
            self.transition(ConnectionState::Handshaking(HandshakeStep::Login));
            Self::exchange(reader, writer, &login_request(), Mid::CommunicationStartAck).await?;
            log::info!("[{}] <- MID 0002 received. Communication established.", id);

            self.transition(ConnectionState::Handshaking(HandshakeStep::Subscribe));
            Self::exchange(reader, writer, &result_subscribe(), Mid::CommandAccepted).await?;
            log::info!("[{}] <- MID 0005 received. Listening for results.", id);
            Ok::<(), TorqlinkError>(())
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(deadline, exchange) => Some(result),
        };

        match result {
            None => Err(SessionOutcome::Cancelled),
            Some(Ok(Ok(()))) => Ok(()),
            Some(Ok(Err(e))) => {
                log::warn!("[{}] Handshake failed: {}", id, e);
                Err(SessionOutcome::HandshakeFailed(e))
            }
            Some(Err(_)) => {
                log::warn!("[{}] Handshake timed out after {:?}", id, deadline);
                Err(SessionOutcome::HandshakeFailed(TorqlinkError::Timeout))
            }
        }
    }

    /// Send `request` and require the next frame to carry `expected`
    async fn exchange<R, W>(
        reader: &mut R,
        writer: &Mutex<W>,
        request: &[u8],
        expected: Mid,
    ) -> TorqlinkResult<()>
    where
        R: FrameSource,
        W: FrameSink,
    {
        writer.lock().await.write_frame(request).await?;
        let raw = reader.read_frame(None).await?;
        let message = decode(&raw).map_err(|e| TorqlinkError::FrameInvalid(e.to_string()))?;
        if *message.mid() != expected {
            return Err(TorqlinkError::Protocol(format!(
                "expected {} but received {}",
                expected,
                message.mid()
            )));
        }
        Ok(())
    }

    async fn stream<R, W>(
        &mut self,
        reader: &mut R,
        writer: &Arc<Mutex<W>>,
        cancel: &CancellationToken,
    ) -> SessionOutcome
    where
        R: FrameSource,
        W: FrameSink + 'static,
    {
        self.transition(ConnectionState::Streaming);
        self.store.set_connected(&self.device.id, true).await;

        let keepalive_token = cancel.child_token();
        let keepalive = keepalive::spawn(
            self.device.id.clone(),
            Arc::clone(writer),
            self.timings.keepalive_interval,
            self.timings.write_timeout,
            keepalive_token.clone(),
        );

        let read_timeout = self.timings.read_timeout;
        // Set when the loop ends inside a write, which may leave half a frame on the wire
        let mut interrupted_write = false;
        let outcome = loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => None,
                read = reader.read_frame(Some(read_timeout)) => Some(read),
            };
            let Some(read) = read else {
                break SessionOutcome::Cancelled;
            };

            match read {
                Ok(raw) => {
                    if let Some(outcome) = self.handle_frame(&raw, writer, cancel).await {
                        interrupted_write = true;
                        break outcome;
                    }
                }
                Err(e) if e.is_timeout() => {
                    log::warn!("[{}] Read timeout, connection may be stalled.", self.device.id);
                }
                Err(e) => {
                    log::error!("[{}] Error reading from controller: {}", self.device.id, e);
                    break SessionOutcome::StreamDropped(e);
                }
            }
        };

        keepalive_token.cancel();
        let _ = keepalive.await;

        if matches!(outcome, SessionOutcome::Cancelled) && !interrupted_write {
            let stop = async { writer.lock().await.write_frame(&communication_stop()).await };
            match tokio::time::timeout(self.shutdown_timeout(), stop).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::debug!("[{}] MID 0003 not delivered: {}", self.device.id, e),
                Err(_) => log::debug!("[{}] MID 0003 timed out", self.device.id),
            }
        }
        outcome
    }

    fn shutdown_timeout(&self) -> Duration {
        self.timings.write_timeout.min(SHUTDOWN_WRITE_TIMEOUT)
    }

    /// Write one frame within the write deadline; `None` means cancelled
    ///
    /// The deadline also covers waiting for the writer, which the keep-alive
    /// task may be holding.
    async fn send<W: FrameSink>(
        &self,
        writer: &Mutex<W>,
        frame: &[u8],
        cancel: &CancellationToken,
    ) -> Option<TorqlinkResult<()>> {
        let write = async { writer.lock().await.write_frame(frame).await };
        tokio::select! {
            _ = cancel.cancelled() => None,
            sent = tokio::time::timeout(self.timings.write_timeout, write) => {
                Some(sent.unwrap_or(Err(TorqlinkError::Timeout)))
            }
        }
    }

    /// Apply one streamed frame; `Some` ends the session
    async fn handle_frame<W: FrameSink>(
        &self,
        raw: &[u8],
        writer: &Mutex<W>,
        cancel: &CancellationToken,
    ) -> Option<SessionOutcome> {
        let id = &self.device.id;
        let message = match decode(raw) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("[{}] Discarding undecodable frame: {}", id, e);
                return None;
            }
        };

        match message.data {
            MessageData::Result(record) => {
                let record = Arc::new(record);
                self.store
                    .replace_result(id, Arc::clone(&record), Utc::now())
                    .await;
                log::info!("[{}] New result: {}", id, record.summary());

                match self.send(writer, &result_ack(), cancel).await {
                    None => return Some(SessionOutcome::Cancelled),
                    Some(Ok(())) => {}
                    Some(Err(e)) if e.is_timeout() => {
                        log::error!(
                            "[{}] Result ack not written within {:?}, controller is not reading.",
                            id,
                            self.timings.write_timeout
                        );
                        return Some(SessionOutcome::StreamDropped(e));
                    }
                    Some(Err(e)) => {
                        log::warn!("[{}] Failed to acknowledge result: {}", id, e);
                    }
                }
            }
            MessageData::Error(e) => {
                log::error!("[{}] Failed parsing MID 0061: {}", id, e);
            }
            MessageData::Opaque => match message.header.mid {
                Mid::KeepAlive => {}
                other => log::info!("[{}] <- Received non-result {}", id, other),
            },
        }
        None
    }

    fn transition(&mut self, next: ConnectionState) {
        if let Err(e) = self.state.validate_transition(next) {
            log::warn!("[{}] {}", self.device.id, e);
        }
        log::debug!("[{}] {} -> {}", self.device.id, self.state, next);
        self.state = next;
    }

    async fn close(&mut self) {
        self.store.set_connected(&self.device.id, false).await;
        if self.state != ConnectionState::Closed {
            self.transition(ConnectionState::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, split, DuplexStream, ReadHalf, WriteHalf};
    use torqlink_codec::layout::AUTOMATIC;
    use torqlink_codec::{keep_alive, HEADER_LENGTH, NUL};
    use torqlink_core::FieldValue;
    use torqlink_transport::{FrameReader, FrameWriter};

    type Reader = FrameReader<ReadHalf<DuplexStream>>;
    type Writer = FrameWriter<WriteHalf<DuplexStream>>;

    const ID: &str = "nexo-pistol";

    fn timings() -> SessionTimings {
        SessionTimings {
            connect_timeout: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_millis(200),
            write_timeout: Duration::from_secs(1),
            keepalive_interval: Duration::from_secs(60),
        }
    }

    async fn connection() -> (DeviceConnection, Arc<DeviceStore>) {
        connection_with(timings()).await
    }

    async fn connection_with(timings: SessionTimings) -> (DeviceConnection, Arc<DeviceStore>) {
        let store = Arc::new(DeviceStore::new());
        store.register_device(ID).await;
        let device = DeviceConfig::new(ID, "Nexo Pistol Grip", "127.0.0.1", 4545);
        let conn = DeviceConnection::new(device, store.clone(), timings, ReconnectPolicy::default());
        (conn, store)
    }

    fn pipe() -> ((Reader, Writer), (Reader, Writer)) {
        pipe_with(4096)
    }

    fn pipe_with(capacity: usize) -> ((Reader, Writer), (Reader, Writer)) {
        let (client, controller) = duplex(capacity);
        let (cr, cw) = split(client);
        let (sr, sw) = split(controller);
        (
            (FrameReader::new(cr), FrameWriter::new(cw)),
            (FrameReader::new(sr), FrameWriter::new(sw)),
        )
    }

    fn frame(mid: &str) -> Vec<u8> {
        torqlink_codec::encode(mid, "001", b"").unwrap()
    }

    fn result_frame(length: usize, status: &str, actual_torque: &str) -> Vec<u8> {
        let mut body = vec![b'0'; length];
        body[..HEADER_LENGTH].copy_from_slice(format!("{:04}0061001000000000", length).as_bytes());
        if length >= 205 {
            let s = AUTOMATIC.tightening_status;
            body[s.start..s.end].copy_from_slice(status.as_bytes());
            let t = AUTOMATIC.actual_torque;
            body[t.start..t.end].copy_from_slice(actual_torque.as_bytes());
        }
        body.push(NUL);
        body
    }

    /// Answer the login and subscribe requests
    async fn accept_handshake(controller: &mut (Reader, Writer)) {
        let login = controller.0.read_frame(None).await.unwrap();
        assert_eq!(login, login_request());
        controller.1.write_frame(&frame("0002")).await.unwrap();

        let subscribe = controller.0.read_frame(None).await.unwrap();
        assert_eq!(subscribe, result_subscribe());
        controller.1.write_frame(&frame("0005")).await.unwrap();
    }

    async fn wait_connected(store: &DeviceStore) {
        for _ in 0..100 {
            if store.is_connected(ID).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("device never marked connected");
    }

    #[test]
    fn test_state_transitions() {
        use ConnectionState::*;
        assert!(Idle.validate_transition(Dialing).is_ok());
        assert!(Dialing.validate_transition(Handshaking(HandshakeStep::Login)).is_ok());
        assert!(Handshaking(HandshakeStep::Subscribe).validate_transition(Streaming).is_ok());
        assert!(Streaming.validate_transition(Closed).is_ok());
        assert!(Closed.validate_transition(Dialing).is_ok());

        assert!(Idle.validate_transition(Streaming).is_err());
        assert!(Handshaking(HandshakeStep::Login).validate_transition(Streaming).is_err());
        assert!(Streaming.validate_transition(Dialing).is_err());
    }

    #[tokio::test]
    async fn test_result_is_stored_and_acknowledged() {
        let (mut conn, store) = connection().await;
        let (client, mut controller) = pipe();
        let cancel = CancellationToken::new();

        let session = tokio::spawn(async move {
            let outcome = conn.run_session(client.0, client.1, &cancel).await;
            (outcome, conn)
        });

        accept_handshake(&mut controller).await;
        wait_connected(&store).await;

        controller.1.write_frame(&frame("9999")).await.unwrap();
        controller.1.write_frame(&result_frame(205, "1", "001234")).await.unwrap();
        let ack = controller.0.read_frame(None).await.unwrap();
        assert_eq!(ack, result_ack());

        let state = store.get_device(ID).await.unwrap();
        let record = state.latest_result.expect("stored result");
        assert_eq!(record.actual_torque, FieldValue::Number(12.34));
        assert!(record.is_ok());
        assert!(state.last_update.is_some());

        // Peer goes away mid-stream
        drop(controller);
        let (outcome, conn) = session.await.unwrap();
        assert!(matches!(outcome, SessionOutcome::StreamDropped(_)));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!store.is_connected(ID).await);
    }

    #[tokio::test]
    async fn test_bad_length_result_does_not_touch_state() {
        let (mut conn, store) = connection().await;
        let (client, mut controller) = pipe();
        let cancel = CancellationToken::new();

        let session = tokio::spawn(async move { conn.run_session(client.0, client.1, &cancel).await });

        accept_handshake(&mut controller).await;
        wait_connected(&store).await;

        controller.1.write_frame(&result_frame(150, "1", "")).await.unwrap();
        // A valid frame afterwards proves the loop survived the bad one
        controller.1.write_frame(&result_frame(205, "0", "000500")).await.unwrap();
        let ack = controller.0.read_frame(None).await.unwrap();
        assert_eq!(ack, result_ack());

        let record = store.get_device(ID).await.unwrap().latest_result.unwrap();
        assert_eq!(record.actual_torque, FieldValue::Number(5.0));
        assert!(!record.is_ok());

        drop(controller);
        assert!(matches!(session.await.unwrap(), SessionOutcome::StreamDropped(_)));
    }

    #[tokio::test]
    async fn test_unexpected_login_reply_fails_handshake() {
        let (mut conn, store) = connection().await;
        let (client, mut controller) = pipe();
        let cancel = CancellationToken::new();

        let session = tokio::spawn(async move { conn.run_session(client.0, client.1, &cancel).await });

        controller.0.read_frame(None).await.unwrap();
        // MID 0004 is a command error, not the expected 0002
        controller.1.write_frame(&frame("0004")).await.unwrap();

        let outcome = session.await.unwrap();
        match outcome {
            SessionOutcome::HandshakeFailed(TorqlinkError::Protocol(msg)) => {
                assert!(msg.contains("MID 0002"), "{msg}");
            }
            other => panic!("unexpected outcome: {other}"),
        }
        assert!(!store.is_connected(ID).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_controller_times_out_handshake() {
        let (mut conn, store) = connection().await;
        let (client, _controller) = pipe();
        let cancel = CancellationToken::new();

        let outcome = conn.run_session(client.0, client.1, &cancel).await;
        assert!(matches!(
            outcome,
            SessionOutcome::HandshakeFailed(TorqlinkError::Timeout)
        ));
        assert!(!store.is_connected(ID).await);
    }

    #[tokio::test]
    async fn test_read_timeout_keeps_connection_open() {
        let (mut conn, store) = connection().await;
        let (client, mut controller) = pipe();
        let cancel = CancellationToken::new();

        let session = tokio::spawn(async move { conn.run_session(client.0, client.1, &cancel).await });

        accept_handshake(&mut controller).await;
        wait_connected(&store).await;

        // Longer than the 200ms read deadline
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(store.is_connected(ID).await);

        controller.1.write_frame(&result_frame(205, "1", "000100")).await.unwrap();
        assert_eq!(controller.0.read_frame(None).await.unwrap(), result_ack());

        drop(controller);
        assert!(matches!(session.await.unwrap(), SessionOutcome::StreamDropped(_)));
    }

    #[tokio::test]
    async fn test_cancel_sends_communication_stop() {
        let (mut conn, store) = connection().await;
        let (client, mut controller) = pipe();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let session = tokio::spawn(async move { conn.run_session(client.0, client.1, &token).await });

        accept_handshake(&mut controller).await;
        wait_connected(&store).await;

        cancel.cancel();
        assert!(matches!(session.await.unwrap(), SessionOutcome::Cancelled));
        assert_eq!(controller.0.read_frame(None).await.unwrap(), communication_stop());
        assert!(!store.is_connected(ID).await);
    }

    #[tokio::test]
    async fn test_keepalive_runs_while_streaming() {
        let store = Arc::new(DeviceStore::new());
        store.register_device(ID).await;
        let device = DeviceConfig::new(ID, "Nexo Pistol Grip", "127.0.0.1", 4545);
        let timings = SessionTimings {
            keepalive_interval: Duration::from_millis(50),
            ..timings()
        };
        let mut conn = DeviceConnection::new(device, store.clone(), timings, ReconnectPolicy::default());
        let (client, mut controller) = pipe();
        let cancel = CancellationToken::new();

        let session = tokio::spawn(async move { conn.run_session(client.0, client.1, &cancel).await });

        accept_handshake(&mut controller).await;
        let first = controller.0.read_frame(Some(Duration::from_secs(2))).await.unwrap();
        let second = controller.0.read_frame(Some(Duration::from_secs(2))).await.unwrap();
        assert_eq!(first, keep_alive());
        assert_eq!(second, keep_alive());

        drop(controller);
        assert!(matches!(session.await.unwrap(), SessionOutcome::StreamDropped(_)));
    }

    /// Handshake, then push results from a background task without ever
    /// reading the acks. Returns the controller's unread half.
    async fn flood_without_reading(
        mut controller: (Reader, Writer),
        store: &DeviceStore,
    ) -> Reader {
        accept_handshake(&mut controller).await;
        wait_connected(store).await;

        let (unread, mut writer) = controller;
        tokio::spawn(async move {
            for _ in 0..6 {
                if writer.write_frame(&result_frame(205, "1", "001000")).await.is_err() {
                    break;
                }
            }
        });
        unread
    }

    #[tokio::test]
    async fn test_stalled_ack_write_drops_stream() {
        let timings = SessionTimings {
            write_timeout: Duration::from_millis(200),
            ..timings()
        };
        let (mut conn, store) = connection_with(timings).await;
        // Room for three acks, so the fourth one blocks
        let (client, controller) = pipe_with(64);
        let cancel = CancellationToken::new();

        let session = tokio::spawn(async move { conn.run_session(client.0, client.1, &cancel).await });
        let _unread = flood_without_reading(controller, &store).await;

        let outcome = tokio::time::timeout(Duration::from_secs(3), session)
            .await
            .expect("session ends once the ack write times out")
            .unwrap();
        assert!(
            matches!(outcome, SessionOutcome::StreamDropped(TorqlinkError::Timeout)),
            "{outcome}"
        );
        let state = store.get_device(ID).await.unwrap();
        assert!(!state.is_connected);
        assert!(state.has_result());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_stalled_ack_write() {
        let timings = SessionTimings {
            write_timeout: Duration::from_secs(3600),
            ..timings()
        };
        let (mut conn, store) = connection_with(timings).await;
        let (client, controller) = pipe_with(64);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let session = tokio::spawn(async move { conn.run_session(client.0, client.1, &token).await });
        let _unread = flood_without_reading(controller, &store).await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(3), session)
            .await
            .expect("session ends promptly after cancellation")
            .unwrap();
        assert!(matches!(outcome, SessionOutcome::Cancelled), "{outcome}");
        assert!(!store.is_connected(ID).await);
    }
}
