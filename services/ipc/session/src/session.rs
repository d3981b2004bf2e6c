//! Session core: supervisor state machine, reader/writer tasks, queues.
//!
//! Each session runs a fixed set of tasks. The supervisor owns the
//! lifecycle: it binds or dials, performs the handshake, and is the only
//! writer of the status cell. Per live stream it spawns one reader and
//! one writer; the three communicate exclusively through the ordered
//! receive and send queues. When a stream dies the reader/writer pair is
//! torn down, anything still queued for sending is discarded, and the
//! supervisor either reconnects within the budget or ends the session
//! with a terminal error pseudo-message.

use crate::error::IpcError;
use crate::handshake::{self, Established};
use crate::message::Message;
use crate::status::{Status, StatusCell};
use crate::transport::{self, Binding, BoundAddr, Endpoint, IoStream};
use bytes::{Bytes, BytesMut};
use ipc_wire::{encode_frame, FrameDecoder, SessionCipher, CONTROL_MSG_TYPE, DEFAULT_MAX_MESSAGE_SIZE};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Which end of the connection this session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Server,
    Client,
}

/// Normalized options shared by both roles
#[derive(Debug, Clone)]
pub(crate) struct Options {
    pub(crate) name: String,
    pub(crate) port: u16,
    pub(crate) timeout: Duration,
    pub(crate) retry_interval: Duration,
    pub(crate) max_message_size: usize,
    pub(crate) encryption: bool,
    pub(crate) unmask_permissions: bool,
}

impl Options {
    fn validate(mut self) -> Result<Self, IpcError> {
        if self.name.is_empty() {
            return Err(IpcError::InvalidName);
        }
        if self.max_message_size < DEFAULT_MAX_MESSAGE_SIZE {
            self.max_message_size = DEFAULT_MAX_MESSAGE_SIZE;
        }
        Ok(self)
    }
}

/// State shared between the facade and the supervisor
struct Shared {
    status: StatusCell,
    /// Effective payload bound; a client adopts the server's value on
    /// every handshake
    max_message_size: AtomicUsize,
    send_tx: mpsc::UnboundedSender<Message>,
}

/// Facade-side handle over one running session
pub(crate) struct Handle {
    shared: Arc<Shared>,
    recv_rx: mpsc::UnboundedReceiver<Message>,
    close_tx: watch::Sender<bool>,
    bound_addr: Option<BoundAddr>,
}

impl Handle {
    /// Validate options, bind (server role), spawn the supervisor, and,
    /// when the budget is non-zero, wait for the first connection.
    pub(crate) async fn spawn(role: Role, opts: Options) -> Result<Self, IpcError> {
        let opts = opts.validate()?;

        let binding = match role {
            Role::Server => {
                let endpoint = Endpoint::resolve(&opts.name, opts.port);
                Some(Binding::bind(&endpoint, opts.unmask_permissions).await?)
            }
            Role::Client => None,
        };
        let bound_addr = match &binding {
            Some(binding) => Some(binding.bound_addr()?),
            None => None,
        };

        let (recv_tx, recv_rx) = mpsc::unbounded_channel();
        let (send_tx, send_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(false);
        let (connected_tx, connected_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            status: StatusCell::new(Status::NotConnected),
            max_message_size: AtomicUsize::new(opts.max_message_size),
            send_tx,
        });

        let supervisor = Supervisor {
            opts: opts.clone(),
            shared: Arc::clone(&shared),
            recv_tx,
            send_rx: Some(send_rx),
            close_rx,
            connected_tx,
            binding,
        };
        match role {
            Role::Server => {
                tokio::spawn(supervisor.run_server());
            }
            Role::Client => {
                tokio::spawn(supervisor.run_client());
            }
        }

        let handle = Handle {
            shared,
            recv_rx,
            close_tx,
            bound_addr,
        };

        if !opts.timeout.is_zero() {
            let mut connected_rx = connected_rx;
            if connected_rx.wait_for(|connected| *connected).await.is_err() {
                // The supervisor ended before a peer attached.
                return Err(match handle.status() {
                    Status::Timeout => IpcError::Timeout,
                    _ => IpcError::Closed,
                });
            }
        }

        Ok(handle)
    }

    /// Next ordered item: user message, status change, or error
    pub(crate) async fn recv(&mut self) -> Result<Message, IpcError> {
        match self.recv_rx.recv().await {
            Some(message) => Ok(message),
            None => Err(IpcError::Closed),
        }
    }

    /// Validate and enqueue one outgoing message
    pub(crate) fn send(&self, msg_type: i32, data: Bytes) -> Result<(), IpcError> {
        if msg_type <= 0 {
            return Err(IpcError::ReservedType);
        }
        let max = self.shared.max_message_size.load(Ordering::Acquire);
        if data.len() > max {
            return Err(IpcError::TooLarge {
                len: data.len(),
                max,
            });
        }
        match self.shared.status.load() {
            Status::Connected => self
                .shared
                .send_tx
                .send(Message::new(msg_type, data))
                .map_err(|_| IpcError::Closed),
            status if status.is_terminal() => Err(IpcError::Closed),
            status => Err(IpcError::NotConnected(status)),
        }
    }

    pub(crate) fn status(&self) -> Status {
        self.shared.status.load()
    }

    pub(crate) fn close(&self) {
        let _ = self.close_tx.send(true);
    }

    pub(crate) fn bound_addr(&self) -> Option<&BoundAddr> {
        self.bound_addr.as_ref()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let _ = self.close_tx.send(true);
    }
}

/// Outcome of waiting for a handshaken peer
enum PeerOutcome {
    Connected(Established),
    CloseRequested,
    Budget,
    Fatal(String),
}

/// Outcome of driving one live stream
enum StreamEnd {
    CloseRequested,
    Failed,
    Fatal(String),
}

struct Supervisor {
    opts: Options,
    shared: Arc<Shared>,
    recv_tx: mpsc::UnboundedSender<Message>,
    send_rx: Option<mpsc::UnboundedReceiver<Message>>,
    close_rx: watch::Receiver<bool>,
    connected_tx: watch::Sender<bool>,
    binding: Option<Binding>,
}

impl Supervisor {
    async fn run_server(mut self) {
        let binding = match self.binding.take() {
            Some(binding) => binding,
            None => return,
        };
        self.transition(Status::Listening);

        loop {
            let deadline = self.deadline();
            let conn = match self.accept_peer(&binding, deadline).await {
                PeerOutcome::Connected(conn) => conn,
                PeerOutcome::CloseRequested => return self.finish_closed(),
                PeerOutcome::Budget => {
                    return self.finish_timeout(IpcError::Timeout.to_string())
                }
                PeerOutcome::Fatal(text) => return self.finish_error(text),
            };

            match self.run_connection(conn).await {
                StreamEnd::CloseRequested => return self.finish_closed(),
                StreamEnd::Fatal(text) => return self.finish_error(text),
                StreamEnd::Failed => self.transition(Status::ReConnecting),
            }
        }
    }

    async fn run_client(mut self) {
        self.transition(Status::Connecting);

        loop {
            let deadline = self.deadline();
            let conn = match self.dial_peer(deadline).await {
                PeerOutcome::Connected(conn) => conn,
                PeerOutcome::CloseRequested => return self.finish_closed(),
                PeerOutcome::Budget => {
                    return self.finish_timeout(IpcError::DialTimeout.to_string())
                }
                PeerOutcome::Fatal(text) => return self.finish_error(text),
            };

            match self.run_connection(conn).await {
                StreamEnd::CloseRequested => return self.finish_closed(),
                StreamEnd::Fatal(text) => return self.finish_error(text),
                StreamEnd::Failed => self.transition(Status::ReConnecting),
            }
        }
    }

    /// Accept peers until one completes the handshake
    async fn accept_peer(&mut self, binding: &Binding, deadline: Option<Instant>) -> PeerOutcome {
        let recv_tx = self.recv_tx.clone();
        let opts = self.opts.clone();

        let attempt = async {
            loop {
                let stream = match binding.accept().await {
                    Ok(stream) => stream,
                    Err(e) => return Err(format!("accept failed: {e}")),
                };
                match handshake::server_handshake(stream, &opts).await {
                    Ok(conn) => return Ok(conn),
                    Err(e) => {
                        // Failed handshake releases the stream; keep accepting.
                        warn!("handshake failed: {e}");
                        let _ = recv_tx.send(Message::error(e.to_string()));
                    }
                }
            }
        };

        self.bounded(attempt, deadline).await
    }

    /// Dial until a listener answers and completes the handshake
    async fn dial_peer(&mut self, deadline: Option<Instant>) -> PeerOutcome {
        let recv_tx = self.recv_tx.clone();
        let opts = self.opts.clone();
        let endpoint = Endpoint::resolve(&opts.name, opts.port);

        let attempt = async move {
            loop {
                match transport::dial(&endpoint).await {
                    Ok(stream) => match handshake::client_handshake(stream, &opts).await {
                        Ok(conn) => return Ok(conn),
                        Err(e) => {
                            warn!("handshake failed: {e}");
                            let _ = recv_tx.send(Message::error(e.to_string()));
                        }
                    },
                    // No listener yet; keep trying quietly.
                    Err(e) if transport::is_transient_dial_error(&e) => {}
                    Err(e) => {
                        let _ = recv_tx.send(Message::error(format!("dial failed: {e}")));
                    }
                }
                tokio::time::sleep(opts.retry_interval).await;
            }
        };

        self.bounded(attempt, deadline).await
    }

    /// Race a connection attempt against the close signal and the budget
    async fn bounded<F>(&mut self, attempt: F, deadline: Option<Instant>) -> PeerOutcome
    where
        F: Future<Output = Result<Established, String>>,
    {
        tokio::pin!(attempt);
        tokio::select! {
            result = &mut attempt => match result {
                Ok(conn) => PeerOutcome::Connected(conn),
                Err(text) => PeerOutcome::Fatal(text),
            },
            _ = self.close_rx.wait_for(|closed| *closed) => PeerOutcome::CloseRequested,
            _ = sleep_until_opt(deadline) => PeerOutcome::Budget,
        }
    }

    /// Run the reader/writer pair over one handshaken stream
    async fn run_connection(&mut self, conn: Established) -> StreamEnd {
        let Established {
            stream,
            cipher,
            max_message_size,
        } = conn;

        self.shared
            .max_message_size
            .store(max_message_size, Ordering::Release);
        self.transition(Status::Connected);
        let _ = self.connected_tx.send(true);

        let (read_half, write_half) = tokio::io::split(stream);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (fail_tx, mut fail_rx) = mpsc::channel::<()>(2);

        let reader = tokio::spawn(read_loop(
            read_half,
            self.recv_tx.clone(),
            cipher.clone(),
            max_message_size,
            stop_rx.clone(),
            fail_tx.clone(),
        ));

        let send_rx = match self.send_rx.take() {
            Some(send_rx) => send_rx,
            None => return StreamEnd::Fatal("send queue unavailable".into()),
        };
        let writer = tokio::spawn(write_loop(
            write_half,
            send_rx,
            cipher,
            max_message_size,
            stop_rx,
            fail_tx,
        ));

        let end = tokio::select! {
            _ = self.close_rx.wait_for(|closed| *closed) => StreamEnd::CloseRequested,
            _ = fail_rx.recv() => StreamEnd::Failed,
        };

        // Tear the pair down and take the send queue back. Both halves are
        // dropped here, which closes the socket.
        let _ = stop_tx.send(true);
        let _ = reader.await;
        match writer.await {
            Ok(send_rx) => {
                self.send_rx = Some(send_rx);
                self.discard_pending();
            }
            Err(e) => return StreamEnd::Fatal(format!("writer task failed: {e}")),
        }

        end
    }

    /// Drop writes queued before the stream died; the sender re-issues.
    fn discard_pending(&mut self) {
        if let Some(send_rx) = self.send_rx.as_mut() {
            let mut dropped = 0usize;
            while send_rx.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!(dropped, "discarded writes queued on the lost connection");
            }
        }
    }

    fn deadline(&self) -> Option<Instant> {
        (!self.opts.timeout.is_zero()).then(|| Instant::now() + self.opts.timeout)
    }

    fn transition(&self, status: Status) {
        self.shared.status.store(status);
        let _ = self.recv_tx.send(Message::status(status));
        debug!(%status, "session status");
    }

    fn finish_closed(&mut self) {
        self.shared.status.store(Status::Closing);
        self.transition(Status::Closed);
        let _ = self.recv_tx.send(Message::error(IpcError::Closed.to_string()));
    }

    fn finish_timeout(&mut self, text: String) {
        self.transition(Status::Timeout);
        let _ = self.recv_tx.send(Message::error(text));
    }

    fn finish_error(&mut self, text: String) {
        self.shared.status.store(Status::Error);
        let _ = self.recv_tx.send(Message::error(text));
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Decode frames off the stream into the receive queue until the stream
/// dies or the session stops
async fn read_loop(
    mut read_half: ReadHalf<IoStream>,
    recv_tx: mpsc::UnboundedSender<Message>,
    cipher: Option<Arc<SessionCipher>>,
    max_message_size: usize,
    mut stop_rx: watch::Receiver<bool>,
    fail_tx: mpsc::Sender<()>,
) {
    let mut decoder = FrameDecoder::new(max_message_size, cipher.is_some());
    let mut buf = BytesMut::with_capacity(8 * 1024);

    loop {
        loop {
            match decoder.decode(&mut buf, cipher.as_deref()) {
                Ok(Some(frame)) => {
                    if frame.msg_type == CONTROL_MSG_TYPE {
                        // Control frames never reach the application.
                        continue;
                    }
                    if frame.msg_type < 0 {
                        // Negative types are local pseudo-messages; a peer
                        // producing them is violating the protocol.
                        warn!(msg_type = frame.msg_type, "peer sent a reserved message type");
                        let _ = fail_tx.send(()).await;
                        return;
                    }
                    if recv_tx
                        .send(Message::new(frame.msg_type, frame.payload))
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("frame decode failed: {e}");
                    let _ = fail_tx.send(()).await;
                    return;
                }
            }
        }

        tokio::select! {
            _ = async { let _ = stop_rx.wait_for(|stopped| *stopped).await; } => return,
            read = read_half.read_buf(&mut buf) => match read {
                Ok(0) => {
                    if !buf.is_empty() {
                        warn!("stream closed mid-frame");
                    }
                    let _ = fail_tx.send(()).await;
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("stream read failed: {e}");
                    let _ = fail_tx.send(()).await;
                    return;
                }
            },
        }
    }
}

/// Flush the send queue to the stream in order until the stream dies or
/// the session stops; returns the queue for the next stream
async fn write_loop(
    mut write_half: WriteHalf<IoStream>,
    mut send_rx: mpsc::UnboundedReceiver<Message>,
    cipher: Option<Arc<SessionCipher>>,
    max_message_size: usize,
    mut stop_rx: watch::Receiver<bool>,
    fail_tx: mpsc::Sender<()>,
) -> mpsc::UnboundedReceiver<Message> {
    loop {
        let message = tokio::select! {
            _ = stop_rx.wait_for(|stopped| *stopped) => break,
            message = send_rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let frame = match encode_frame(
            message.msg_type,
            &message.data,
            cipher.as_deref(),
            max_message_size,
        ) {
            Ok(frame) => frame,
            Err(e) => {
                // send() validates before enqueueing; this only fires if the
                // negotiated limit shrank underneath a queued message.
                warn!("dropping unencodable message: {e}");
                continue;
            }
        };

        if let Err(e) = write_half.write_all(&frame).await {
            debug!("stream write failed: {e}");
            let _ = fail_tx.send(()).await;
            break;
        }
    }
    send_rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Client, ClientConfig};
    use crate::server::{Server, ServerConfig};

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    fn test_name(tag: &str) -> String {
        format!("gameenv-ipc-{}-{}", tag, std::process::id())
    }

    fn server_config(tag: &str) -> ServerConfig {
        ServerConfig {
            name: test_name(tag),
            encryption: false,
            ..ServerConfig::default()
        }
    }

    fn client_config(tag: &str) -> ClientConfig {
        ClientConfig {
            name: test_name(tag),
            retry_interval: Duration::from_millis(10),
            encryption: false,
            ..ClientConfig::default()
        }
    }

    /// Drain items until the given status string shows up, failing on
    /// error pseudo-messages unless allowed.
    macro_rules! wait_for_status {
        ($side:expr, $text:expr) => {
            wait_for_status!($side, $text, true)
        };
        ($side:expr, $text:expr, $allow_errors:expr) => {
            loop {
                let message = tokio::time::timeout(RECV_TIMEOUT, $side.recv())
                    .await
                    .expect("timed out waiting for status")
                    .expect("session ended while waiting for status");
                if message.is_error() && !$allow_errors {
                    panic!("unexpected error pseudo-message: {}", message.text());
                }
                if message.is_status() && message.text() == $text {
                    break;
                }
            }
        };
    }

    async fn recv_user(side: &mut Server) -> Message {
        loop {
            let message = tokio::time::timeout(RECV_TIMEOUT, side.recv())
                .await
                .expect("timed out waiting for a message")
                .expect("session ended while waiting for a message");
            if message.msg_type > 0 {
                return message;
            }
        }
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected() {
        let err = Server::start(ServerConfig::default()).await.unwrap_err();
        assert!(matches!(err, IpcError::InvalidName));

        let err = Client::start(ClientConfig::default()).await.unwrap_err();
        assert!(matches!(err, IpcError::InvalidName));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_max_message_size_is_floored() {
        let mut config = server_config("floor");
        config.max_message_size = 16;
        let server = Server::start(config).await.unwrap();

        // 1024 passes the size check (and then fails on connection state),
        // 1025 fails the size check outright.
        let err = server.send(20, vec![0u8; 1024]).unwrap_err();
        assert!(matches!(err, IpcError::NotConnected(_)));

        let err = server.send(20, vec![0u8; 1025]).unwrap_err();
        assert!(matches!(err, IpcError::TooLarge { max: 1024, .. }));

        server.close();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_connect_and_fifo_order() {
        let mut server = Server::start(server_config("fifo")).await.unwrap();
        let mut client = Client::start(client_config("fifo")).await.unwrap();

        wait_for_status!(server, "Listening", false);
        wait_for_status!(server, "Connected", false);
        wait_for_status!(client, "Connecting", false);
        wait_for_status!(client, "Connected", false);

        for tag in 0..50u8 {
            client.send(20, vec![tag]).unwrap();
        }
        for tag in 0..50u8 {
            let message = recv_user(&mut server).await;
            assert_eq!(message.msg_type, 20);
            assert_eq!(message.data.as_ref(), &[tag]);
        }

        // And the other direction.
        for tag in 0..3u8 {
            server.send(21, vec![tag]).unwrap();
        }
        for tag in 0..3u8 {
            let message = tokio::time::timeout(RECV_TIMEOUT, client.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(message.msg_type, 21);
            assert_eq!(message.data.as_ref(), &[tag]);
        }

        client.close();
        server.close();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_send_validation_does_not_disturb_the_stream() {
        let mut server = Server::start(server_config("validation")).await.unwrap();
        let mut client = Client::start(client_config("validation")).await.unwrap();
        wait_for_status!(server, "Connected", false);
        wait_for_status!(client, "Connected", false);

        assert!(matches!(client.send(0, &b"x"[..]), Err(IpcError::ReservedType)));
        assert!(matches!(client.send(-1, &b"x"[..]), Err(IpcError::ReservedType)));

        let oversized = vec![0u8; 1025];
        assert!(matches!(
            client.send(20, oversized),
            Err(IpcError::TooLarge { len: 1025, max: 1024 })
        ));

        // A valid write still goes through, and it is the only frame the
        // server ever observes.
        client.send(20, &b"ok"[..]).unwrap();
        let message = recv_user(&mut server).await;
        assert_eq!(message.data.as_ref(), b"ok");

        let silence = tokio::time::timeout(Duration::from_millis(200), server.recv()).await;
        assert!(silence.is_err(), "rejected writes must never reach the peer");

        client.close();
        server.close();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_client_retries_silently_until_server_binds() {
        let mut client = Client::start(client_config("early-dial")).await.unwrap();
        wait_for_status!(client, "Connecting", false);

        // Let the dial loop spin against a missing socket for a while.
        tokio::time::sleep(Duration::from_millis(150)).await;

        let mut server = Server::start(server_config("early-dial")).await.unwrap();

        // No -2 may have been surfaced while the listener was absent.
        wait_for_status!(client, "Connected", false);
        wait_for_status!(server, "Connected", false);

        client.close();
        server.close();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reconnect_after_peer_drop() {
        let mut server = Server::start(server_config("reconnect")).await.unwrap();
        let first = Client::start(client_config("reconnect")).await.unwrap();
        wait_for_status!(server, "Connected", false);

        first.close();
        wait_for_status!(server, "Re-connecting", false);

        let client = Client::start(client_config("reconnect")).await.unwrap();
        wait_for_status!(server, "Connected", false);

        // The replacement stream carries traffic.
        loop {
            match client.send(20, &b"second life"[..]) {
                Ok(()) => break,
                Err(IpcError::NotConnected(_)) => tokio::time::sleep(Duration::from_millis(5)).await,
                Err(e) => panic!("unexpected send failure: {e}"),
            }
        }
        let message = recv_user(&mut server).await;
        assert_eq!(message.data.as_ref(), b"second life");

        client.close();
        server.close();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reconnect_budget_expires() {
        let mut config = server_config("budget");
        config.timeout = Duration::from_millis(400);
        // Start the client first so the server's start-wait is satisfied.
        let client_task = tokio::spawn(async move {
            Client::start(client_config("budget")).await.unwrap()
        });
        let mut server = Server::start(config).await.unwrap();
        wait_for_status!(server, "Connected", false);

        let client = client_task.await.unwrap();
        client.close();

        let started = std::time::Instant::now();
        wait_for_status!(server, "Re-connecting", false);
        wait_for_status!(server, "Timeout");

        // Terminal -2, then the queue closes for good.
        let terminal = tokio::time::timeout(RECV_TIMEOUT, server.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(terminal.is_error());
        assert!(started.elapsed() < Duration::from_secs(3));

        let err = tokio::time::timeout(RECV_TIMEOUT, server.recv())
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, IpcError::Closed));
        assert!(matches!(server.recv().await, Err(IpcError::Closed)));
        assert!(matches!(server.send(20, &b"x"[..]), Err(IpcError::Closed)));
        assert_eq!(server.status(), Status::Timeout);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_timeout_without_peer() {
        let mut config = server_config("never");
        config.timeout = Duration::from_millis(300);

        let started = std::time::Instant::now();
        let err = Server::start(config).await.unwrap_err();
        assert!(matches!(err, IpcError::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encrypted_session_roundtrip() {
        let mut server_config = server_config("crypted");
        server_config.encryption = true;
        let mut client_config = client_config("crypted");
        client_config.encryption = true;

        let mut server = Server::start(server_config).await.unwrap();
        let mut client = Client::start(client_config).await.unwrap();
        wait_for_status!(server, "Connected", false);
        wait_for_status!(client, "Connected", false);

        client.send(18, &b"observation request"[..]).unwrap();
        let message = recv_user(&mut server).await;
        assert_eq!(message.msg_type, 18);
        assert_eq!(message.data.as_ref(), b"observation request");

        server.send(19, &b"observation"[..]).unwrap();
        let reply = tokio::time::timeout(RECV_TIMEOUT, client.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.msg_type, 19);

        client.close();
        server.close();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_close_sequence() {
        let mut server = Server::start(server_config("close")).await.unwrap();
        let mut client = Client::start(client_config("close")).await.unwrap();
        wait_for_status!(client, "Connected", false);

        client.close();
        wait_for_status!(client, "Closed");

        let terminal = tokio::time::timeout(RECV_TIMEOUT, client.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(terminal.is_error());
        assert!(matches!(client.recv().await, Err(IpcError::Closed)));
        assert!(matches!(client.send(20, &b"x"[..]), Err(IpcError::Closed)));
        assert_eq!(client.status(), Status::Closed);

        server.close();
        wait_for_status!(server, "Closed");
    }
}

