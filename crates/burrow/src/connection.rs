//! One client of the SOCKS server, from handshake to teardown.
//!
//! A [`Connection`] is a cheap handle to a task that owns the client's
//! socket.  The task reads SOCKS packets until the client has asked us
//! to CONNECT somewhere, dials the destination, then relays raw bytes in
//! both directions.  It watches for idleness the whole time.
//!
//! However a connection ends (protocol error, idle timeout, peer
//! disconnect, or an explicit [`Connection::close`]), teardown happens
//! exactly once, inside the task.  Every observer sees the same outcome.

use crate::auth::Authenticate;
use crate::dialer::{BoxedStream, Dialer};
use crate::relay::{self, Activity};
use crate::{Error, Result};

use burrow_rtcompat::{Runtime, SleepProvider, SleepProviderExt};
use burrow_socksproto::{
    AuthRequest, AuthResponse, AuthStatus, ConnectRequest, ConnectResponse, Decoder,
    HandshakeRequest, HandshakeResponse, Packet, PacketKind, PacketWriter, SocksAddr, SocksCmd,
    SocksMethod, SocksReply,
};
use futures::channel::{mpsc, oneshot};
use futures::future::{FutureExt, Shared};
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use futures::stream::StreamExt;
use futures::task::SpawnExt;
use futures::{select_biased, Future, SinkExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// How long a graceful close waits for queued bytes to reach the client.
const LINGER: Duration = Duration::from_secs(2);

/// Timing parameters for a connection.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Close the connection after this long without a packet or a
    /// relayed chunk.
    pub max_idle_time: Duration,
    /// Give up on reaching the destination after this long.
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            max_idle_time: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(3),
        }
    }
}

/// Everything a connection needs besides its socket: shared by all the
/// connections of a server.
#[derive(Clone)]
pub struct ConnectionSettings {
    /// Timing parameters.
    config: ConnectionConfig,
    /// If present, clients must authenticate with a username and
    /// password that this accepts.
    authenticator: Option<Arc<dyn Authenticate>>,
    /// How we reach destinations.
    dialer: Arc<dyn Dialer>,
}

impl ConnectionSettings {
    /// Construct a new ConnectionSettings that reaches destinations with
    /// `dialer`, and requires no authentication.
    pub fn new(config: ConnectionConfig, dialer: Arc<dyn Dialer>) -> Self {
        ConnectionSettings {
            config,
            authenticator: None,
            dialer,
        }
    }

    /// Require clients to authenticate with `authenticator`.
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticate>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Return the timing parameters.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

/// What a connection reports once the client's CONNECT request has been
/// accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Established {
    /// The client's address.
    pub peer: SocketAddr,
    /// The destination the client asked for.
    pub target: SocksAddr,
    /// The destination port.
    pub port: u16,
}

/// A request to end a connection.
#[derive(Debug, Default)]
struct CloseRequest {
    /// Why the connection is ending, if there's a reason to report.
    reason: Option<Error>,
    /// If true, don't try to shut the client's socket down gracefully.
    force: bool,
}

/// The parts of a connection that handles and its task share.
struct Inner {
    /// The client's address.
    remote: SocketAddr,
    /// Set once teardown has begun.
    closed: AtomicBool,
    /// Set once the CONNECT request has been accepted.
    established: AtomicBool,
    /// Used to ask the task to close.
    close_tx: mpsc::UnboundedSender<CloseRequest>,
    /// Resolves once the connection is established, or fails to be.
    ready: Shared<oneshot::Receiver<Result<Established>>>,
    /// Resolves once teardown is complete.
    done: Shared<oneshot::Receiver<()>>,
}

/// A handle to one client connection.
///
/// Cloning a Connection gives another handle to the same connection.
#[derive(Clone)]
pub struct Connection {
    /// State shared with the connection's task.
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("remote", &self.inner.remote)
            .field("established", &self.is_established())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Launch a task to handle a newly accepted client `stream` from
    /// `remote`, and return a handle to it.
    pub fn spawn<R, S>(
        runtime: &R,
        stream: S,
        remote: SocketAddr,
        settings: Arc<ConnectionSettings>,
    ) -> Result<Connection>
    where
        R: Runtime,
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (close_tx, close_rx) = mpsc::unbounded();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let inner = Arc::new(Inner {
            remote,
            closed: AtomicBool::new(false),
            established: AtomicBool::new(false),
            close_tx,
            ready: ready_rx.shared(),
            done: done_rx.shared(),
        });

        let (reader, writer) = stream.split();
        let phase = Phase::Handshake;
        let reactor = Reactor {
            runtime: runtime.clone(),
            inner: Arc::clone(&inner),
            settings,
            reader,
            writer: PacketWriter::new(writer),
            decoder: Decoder::new(phase.accepted()),
            phase,
            destination: None,
            activity: Arc::new(Activity::new()),
            ready_tx: Some(ready_tx),
        };
        runtime.spawn(reactor.run(close_rx, done_tx))?;
        trace!("{}: new connection", remote);

        Ok(Connection { inner })
    }

    /// Return the client's address.
    pub fn remote_address(&self) -> SocketAddr {
        self.inner.remote
    }

    /// Return true if this connection has started to close.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Return true if the client's CONNECT request was accepted.
    pub fn is_established(&self) -> bool {
        self.inner.established.load(Ordering::SeqCst)
    }

    /// Wait for this connection to be established.
    ///
    /// Resolves to an error if the connection closes first: the error
    /// that closed it, or [`Error::Closed`] if there was none.
    pub fn established(&self) -> impl Future<Output = Result<Established>> + Send + 'static {
        self.inner
            .ready
            .clone()
            .map(|r| r.unwrap_or(Err(Error::Closed)))
    }

    /// Wait for this connection to be completely torn down.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        self.inner.done.clone().map(|_| ())
    }

    /// Close this connection, and wait until that has finished.
    ///
    /// If the connection wasn't established yet, `reason` is what
    /// [`Connection::established`] reports.  Unless `force` is true,
    /// we give bytes already written a moment to reach the client.
    ///
    /// Only the first call does anything; later calls just wait.
    pub async fn close(&self, reason: Option<Error>, force: bool) {
        if !self.is_closed() {
            // Fails only if the task is already gone.
            let _ignore = self
                .inner
                .close_tx
                .unbounded_send(CloseRequest { reason, force });
        }
        self.closed().await
    }
}

/// Where a connection is in the SOCKS conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Waiting for the client's list of methods.
    Handshake,
    /// Waiting for a username and password.
    Auth,
    /// Waiting for a CONNECT request.
    Connect,
    /// Relaying bytes.
    Established,
}

impl Phase {
    /// Return the packet kinds a client may send in this phase.
    fn accepted(self) -> &'static [PacketKind] {
        match self {
            Phase::Handshake => &[PacketKind::HandshakeRequest],
            // A CONNECT here is recognized, so we can reject it by name.
            Phase::Auth => &[PacketKind::AuthRequest, PacketKind::ConnectRequest],
            Phase::Connect => &[PacketKind::ConnectRequest],
            Phase::Established => &[],
        }
    }
}

/// The task behind a [`Connection`].
struct Reactor<R, S> {
    /// Runtime for timers.
    runtime: R,
    /// State shared with our handles.
    inner: Arc<Inner>,
    /// Shared settings from the server.
    settings: Arc<ConnectionSettings>,
    /// Bytes from the client.
    reader: ReadHalf<S>,
    /// Packets and bytes to the client.
    writer: PacketWriter<WriteHalf<S>>,
    /// Parses what the client sends until we're established.
    decoder: Decoder,
    /// Where we are in the conversation.
    phase: Phase,
    /// Stream to the destination, once dialed.
    destination: Option<BoxedStream>,
    /// When we last saw traffic.
    activity: Arc<Activity>,
    /// Reports the outcome of the handshake.  Taken when used.
    ready_tx: Option<oneshot::Sender<Result<Established>>>,
}

impl<R, S> Reactor<R, S>
where
    R: Runtime,
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Run this connection until it closes, then tear it down.
    async fn run(
        mut self,
        mut close_rx: mpsc::UnboundedReceiver<CloseRequest>,
        done_tx: oneshot::Sender<()>,
    ) {
        let request = {
            let runtime = self.runtime.clone();
            let activity = Arc::clone(&self.activity);
            let max_idle = self.settings.config.max_idle_time;
            let work = self.serve().fuse();
            futures::pin_mut!(work);
            supervise(&runtime, &activity, max_idle, &mut close_rx, work).await
        };
        self.teardown(request).await;
        let _ignore = done_tx.send(());
    }

    /// Handle the client from its first byte to the end of relaying.
    async fn serve(&mut self) -> CloseRequest {
        match self.negotiate_and_relay().await {
            Ok(()) => CloseRequest::default(),
            Err(e) => CloseRequest {
                force: e.is_peer_gone(),
                reason: Some(e),
            },
        }
    }

    /// Run the SOCKS conversation, then relay bytes until both sides are
    /// done.
    async fn negotiate_and_relay(&mut self) -> Result<()> {
        let request = self.negotiate().await?;
        let target = request.addr().clone();
        let port = request.port();

        // Acknowledge the request before we've dialed: if the dial fails
        // we close the connection.
        self.send(ConnectResponse::new(SocksReply::SUCCEEDED, target.clone(), port))
            .await?;
        self.set_phase(Phase::Established);
        self.inner.established.store(true, Ordering::SeqCst);
        if let Some(tx) = self.ready_tx.take() {
            let _ignore = tx.send(Ok(Established {
                peer: self.inner.remote,
                target: target.clone(),
                port,
            }));
        }
        info!("{}: CONNECT {}:{}", self.inner.remote, target, port);

        // From here on, no more SOCKS.
        let early = self.decoder.take_remaining();
        self.decoder.destroy();
        self.writer.destroy();

        let dial = self.settings.dialer.dial(&request);
        let destination = match self
            .runtime
            .timeout(self.settings.config.connect_timeout, dial)
            .await
        {
            Ok(r) => r?,
            Err(_) => return Err(Error::ConnectTimeout(format!("{}:{}", target, port))),
        };
        debug!("{}: connected to {}:{}", self.inner.remote, target, port);
        let destination = self.destination.insert(destination);

        relay::splice(
            &mut self.reader,
            self.writer.get_mut(),
            destination,
            &early[..],
            &self.activity,
        )
        .await?;
        debug!("{}: relay finished", self.inner.remote);
        Ok(())
    }

    /// Handle packets until the client sends an acceptable CONNECT
    /// request, and return that request.
    async fn negotiate(&mut self) -> Result<ConnectRequest> {
        loop {
            let packet = self.read_packet().await?;
            self.activity.touch();
            match (self.phase, packet) {
                (Phase::Handshake, Packet::HandshakeRequest(req)) => {
                    self.handle_handshake(req).await?
                }
                (Phase::Auth, Packet::AuthRequest(req)) => self.handle_auth(req).await?,
                (Phase::Connect, Packet::ConnectRequest(req)) => {
                    if req.command() == SocksCmd::CONNECT {
                        return Ok(req);
                    }
                    debug!(
                        "{}: rejecting unsupported command {}",
                        self.inner.remote,
                        req.command()
                    );
                    self.send(ConnectResponse::new(
                        SocksReply::COMMAND_NOT_SUPPORTED,
                        req.addr().clone(),
                        req.port(),
                    ))
                    .await?;
                    return Err(Error::UnknownPacketType(PacketKind::ConnectRequest));
                }
                (_, other) => return Err(Error::UnknownPacketType(other.kind())),
            }
        }
    }

    /// Pick an authentication method from those the client offers.
    async fn handle_handshake(&mut self, req: HandshakeRequest) -> Result<()> {
        let method = match &self.settings.authenticator {
            Some(_) if req.offers(SocksMethod::USER_PASS) => SocksMethod::USER_PASS,
            None if req.offers(SocksMethod::NO_AUTH) => SocksMethod::NO_AUTH,
            _ => SocksMethod::NO_ACCEPTABLE,
        };
        trace!("{}: selected method {}", self.inner.remote, method);
        self.send(HandshakeResponse::new(method)).await?;
        match method {
            SocksMethod::USER_PASS => self.set_phase(Phase::Auth),
            SocksMethod::NO_AUTH => self.set_phase(Phase::Connect),
            _ => return Err(Error::HandshakeRejected),
        }
        Ok(())
    }

    /// Check the client's username and password.
    async fn handle_auth(&mut self, req: AuthRequest) -> Result<()> {
        let authenticator = match &self.settings.authenticator {
            Some(a) => Arc::clone(a),
            None => return Err(Error::UnknownPacketType(PacketKind::AuthRequest)),
        };
        let valid = authenticator
            .authenticate(req.username(), req.password(), self.inner.remote)
            .await;
        let status = if valid {
            AuthStatus::SUCCEEDED
        } else {
            AuthStatus::FAILED
        };
        self.send(AuthResponse::new(status)).await?;
        if valid {
            self.set_phase(Phase::Connect);
            Ok(())
        } else {
            Err(Error::AuthRejected(req.username().to_string()))
        }
    }

    /// Read from the client until a whole packet has arrived.
    async fn read_packet(&mut self) -> Result<Packet> {
        let mut buf = [0_u8; 1024];
        loop {
            if let Some(packet) = self.decoder.next_packet()? {
                return Ok(packet);
            }
            let n = self.reader.read(&mut buf[..]).await?;
            if n == 0 {
                return Err(Error::SocketClosed);
            }
            self.decoder.extend(&buf[..n])?;
        }
    }

    /// Send `packet` to the client, and wait until it's written.
    async fn send<P: Into<Packet>>(&mut self, packet: P) -> Result<()> {
        self.writer.send(packet.into()).await?;
        Ok(())
    }

    /// Move to `phase`.
    fn set_phase(&mut self, phase: Phase) {
        trace!("{}: {:?} -> {:?}", self.inner.remote, self.phase, phase);
        self.phase = phase;
        self.decoder.set_accepted(phase.accepted());
    }

    /// Release everything this connection holds, and report why it
    /// ended.
    async fn teardown(&mut self, request: CloseRequest) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.destination = None;
        self.decoder.destroy();
        self.writer.destroy();

        let remote = self.inner.remote;
        match &request.reason {
            Some(e) if e.is_reset() => debug!("{}: connection reset", remote),
            Some(e @ Error::SocketError(_)) => warn!("{}: {}", remote, e),
            Some(e) => debug!("{}: closing: {}", remote, e),
            None => debug!("{}: closing", remote),
        }
        if let Some(tx) = self.ready_tx.take() {
            let _ignore = tx.send(Err(request.reason.unwrap_or(Error::Closed)));
        }

        if !request.force {
            let shutdown = self.writer.get_mut().close();
            match self.runtime.timeout(LINGER, shutdown).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("{}: error while closing: {}", remote, e),
                Err(_) => debug!("{}: gave up waiting for close", remote),
            }
        }
        trace!("{}: closed", remote);
    }
}

/// Wait for `work` to finish, unless a close request or the idle timer
/// ends the connection first.
async fn supervise<R, F>(
    runtime: &R,
    activity: &Activity,
    max_idle: Duration,
    close_rx: &mut mpsc::UnboundedReceiver<CloseRequest>,
    mut work: std::pin::Pin<&mut futures::future::Fuse<F>>,
) -> CloseRequest
where
    R: SleepProvider,
    F: Future<Output = CloseRequest>,
{
    loop {
        let tick = runtime.sleep(max_idle).fuse();
        futures::pin_mut!(tick);
        select_biased! {
            request = close_rx.next() => return request.unwrap_or_default(),
            request = work => return request,
            () = tick => {
                if activity.idle_for() >= max_idle {
                    return CloseRequest {
                        reason: Some(Error::IdleTimeout(max_idle)),
                        force: false,
                    };
                }
            }
        }
    }
}
