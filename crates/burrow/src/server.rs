//! Listen for SOCKS clients, and keep track of their connections.

use crate::connection::{Connection, ConnectionConfig, ConnectionSettings};
use crate::dialer::DirectDialer;
use crate::{Error, Result};

use burrow_rtcompat::{Runtime, SleepProviderExt, TcpListener};
use futures::channel::oneshot;
use futures::future::{self, FutureExt, RemoteHandle, Shared};
use futures::task::SpawnExt;
use futures::{select_biased, Future};
use std::collections::HashMap;
use std::fmt;
use std::io::{Error as IoError, ErrorKind};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// One address to listen on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenAddr {
    /// Hostname or IP address.
    pub host: String,
    /// Port, or 0 to pick one.
    pub port: u16,
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Configuration for a [`SocksServer`].
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Addresses to accept clients on.  We listen on all of them, or
    /// fail to start.
    pub listen: Vec<ListenAddr>,
    /// How long [`SocksServer::shutdown`] waits for connections to
    /// close.
    pub kill_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: vec![ListenAddr {
                host: "127.0.0.1".to_string(),
                port: 1080,
            }],
            kill_timeout: Duration::from_secs(10),
        }
    }
}

/// A function to call whenever a connection has closed.
type CloseHook = Arc<dyn Fn(&Connection) + Send + Sync>;

/// Open connections, keyed by the client's `ip:port`.
type ConnectionTable = Mutex<HashMap<String, Connection>>;

/// Lock `m`, even if some other thread panicked while holding it.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A SOCKS5 server.
///
/// Cloning a SocksServer gives another handle to the same server.
pub struct SocksServer<R: Runtime> {
    /// State shared by every handle and by our background tasks.
    inner: Arc<ServerInner<R>>,
}

impl<R: Runtime> Clone for SocksServer<R> {
    fn clone(&self) -> Self {
        SocksServer {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Shared state for a [`SocksServer`].
struct ServerInner<R: Runtime> {
    /// Runtime for listening, spawning, and timers.
    runtime: R,
    /// Our configuration.
    config: ServerConfig,
    /// Settings handed to every connection.
    settings: Arc<ConnectionSettings>,
    /// Outcome of the first call to `start()`, once it has finished.
    started: futures::lock::Mutex<Option<Result<Vec<SocketAddr>>>>,
    /// Addresses we're actually listening on.
    listen_addrs: Mutex<Vec<SocketAddr>>,
    /// Connections still negotiating.
    handshaking: ConnectionTable,
    /// Established connections.
    connections: ConnectionTable,
    /// Set once `close()` has begun.
    stopping: AtomicBool,
    /// Tells the accept loops to stop.  Taken when used.
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    /// Resolves once the accept loops should stop.
    stop: Shared<oneshot::Receiver<()>>,
    /// The running accept loops.  Taken by `close()`.
    accept_loops: Mutex<Vec<RemoteHandle<()>>>,
    /// Fires the `closed` signal.  Taken when used.
    closed_tx: Mutex<Option<oneshot::Sender<()>>>,
    /// Resolves once `close()` has finished.
    closed: Shared<oneshot::Receiver<()>>,
    /// Called whenever a connection closes.
    on_close: Mutex<Option<CloseHook>>,
}

impl<R: Runtime> SocksServer<R> {
    /// Construct a server that connects clients directly to their
    /// destinations, with no authentication and default timeouts.
    pub fn new(runtime: R, config: ServerConfig) -> Self {
        let dialer = Arc::new(DirectDialer::new(runtime.clone()));
        let settings = ConnectionSettings::new(ConnectionConfig::default(), dialer);
        Self::with_settings(runtime, config, settings)
    }

    /// Construct a server whose connections use `settings`.
    pub fn with_settings(runtime: R, config: ServerConfig, settings: ConnectionSettings) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = oneshot::channel();
        let inner = ServerInner {
            runtime,
            config,
            settings: Arc::new(settings),
            started: futures::lock::Mutex::new(None),
            listen_addrs: Mutex::new(Vec::new()),
            handshaking: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            stopping: AtomicBool::new(false),
            stop_tx: Mutex::new(Some(stop_tx)),
            stop: stop_rx.shared(),
            accept_loops: Mutex::new(Vec::new()),
            closed_tx: Mutex::new(Some(closed_tx)),
            closed: closed_rx.shared(),
            on_close: Mutex::new(None),
        };
        SocksServer {
            inner: Arc::new(inner),
        }
    }

    /// Start listening on every configured address, and return the
    /// addresses we're bound to.
    ///
    /// Fails if we can't listen on any one of them.  Calling this again
    /// returns the outcome of the first call.
    pub async fn start(&self) -> Result<Vec<SocketAddr>> {
        let mut started = self.inner.started.lock().await;
        if let Some(outcome) = started.as_ref() {
            return outcome.clone();
        }
        let outcome = self.inner.launch().await;
        *started = Some(outcome.clone());
        outcome
    }

    /// Stop accepting clients, close every connection, and wait until
    /// they have all closed.
    ///
    /// Safe to call more than once, or before [`SocksServer::start`].
    pub async fn close(&self) {
        let inner = &self.inner;
        inner.stopping.store(true, Ordering::SeqCst);
        if let Some(tx) = lock(&inner.stop_tx).take() {
            let _ignore = tx.send(());
        }

        // Once the accept loops are gone, no connection can be added to
        // the tables.  One may move from one table to the other while we
        // look, but it's always in at least one.
        let loops: Vec<_> = lock(&inner.accept_loops).drain(..).collect();
        future::join_all(loops).await;
        let mut open: Vec<Connection> = lock(&inner.handshaking).values().cloned().collect();
        open.extend(lock(&inner.connections).values().cloned());
        debug!("Closing {} connections", open.len());
        future::join_all(open.iter().map(|c| c.close(None, false))).await;

        if let Some(tx) = lock(&inner.closed_tx).take() {
            let _ignore = tx.send(());
        }
        info!("Server closed");
    }

    /// Like [`SocksServer::close`], but give up after the configured
    /// kill timeout.
    pub async fn shutdown(&self) -> Result<()> {
        let limit = self.inner.config.kill_timeout;
        self.inner
            .runtime
            .timeout(limit, self.close())
            .await
            .map_err(|_| Error::KillTimeout(limit))
    }

    /// Wait until [`SocksServer::close`] has finished.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        self.inner.closed.clone().map(|_| ())
    }

    /// Return the addresses we're listening on.  Empty until the server
    /// has started.
    pub fn listen_addrs(&self) -> Vec<SocketAddr> {
        lock(&self.inner.listen_addrs).clone()
    }

    /// Return every established connection.
    pub fn connections(&self) -> Vec<Connection> {
        lock(&self.inner.connections).values().cloned().collect()
    }

    /// Call `hook` every time a connection closes.
    ///
    /// Replaces any hook set earlier.
    pub fn on_connection_closed<F>(&self, hook: F)
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        *lock(&self.inner.on_close) = Some(Arc::new(hook));
    }
}

impl<R: Runtime> ServerInner<R> {
    /// Bind every listener, then launch a task to accept on each.
    async fn launch(self: &Arc<Self>) -> Result<Vec<SocketAddr>> {
        install_panic_hook();

        let listeners =
            future::try_join_all(self.config.listen.iter().map(|l| self.bind(l))).await?;
        let mut addrs = Vec::with_capacity(listeners.len());
        for listener in &listeners {
            addrs.push(listener.local_addr()?);
        }
        *lock(&self.listen_addrs) = addrs.clone();

        for (listener, addr) in listeners.into_iter().zip(addrs.iter()) {
            info!("Listening on {}.", addr);
            let handle = self
                .runtime
                .spawn_with_handle(Arc::clone(self).accept_loop(listener))?;
            lock(&self.accept_loops).push(handle);
        }
        Ok(addrs)
    }

    /// Open a listener for `target`.
    async fn bind(&self, target: &ListenAddr) -> Result<R::TcpListener> {
        let bind_err = |cause: IoError| Error::Bind {
            addr: target.to_string(),
            cause: Arc::new(cause),
        };
        let addrs = self
            .runtime
            .resolve(&target.host, target.port)
            .await
            .map_err(bind_err)?;
        let addr = addrs
            .first()
            .ok_or_else(|| bind_err(IoError::new(ErrorKind::NotFound, "no address for host")))?;
        self.runtime.listen(addr).await.map_err(bind_err)
    }

    /// Accept clients on `listener` until the server closes.
    async fn accept_loop(self: Arc<Self>, listener: R::TcpListener) {
        let mut stop = self.stop.clone();
        loop {
            let accept = listener.accept().fuse();
            futures::pin_mut!(accept);
            select_biased! {
                _ = stop => break,
                accepted = accept => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = self.handle_accept(stream, peer) {
                            warn!("Couldn't handle connection from {}: {}", peer, e);
                        }
                    }
                    Err(e) => {
                        warn!("Incoming stream failed: {}", e);
                        self.runtime.sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }
        trace!("Accept loop finished");
    }

    /// Launch a connection for a newly accepted client, and a task to
    /// track it.
    fn handle_accept(self: &Arc<Self>, stream: R::TcpStream, peer: SocketAddr) -> Result<()> {
        let conn = Connection::spawn(&self.runtime, stream, peer, Arc::clone(&self.settings))?;
        let key = peer.to_string();
        debug!("Got a connection from {}", key);
        lock(&self.handshaking).insert(key.clone(), conn.clone());
        self.runtime
            .spawn(Arc::clone(self).observe(key, conn))?;
        Ok(())
    }

    /// Move `conn` into the established table once it's established,
    /// and forget it once it has closed.
    async fn observe(self: Arc<Self>, key: String, conn: Connection) {
        if self.stopping.load(Ordering::SeqCst) {
            // Accepted while we were closing.
            conn.close(None, true).await;
        }
        match conn.established().await {
            Ok(est) => {
                lock(&self.connections).insert(key.clone(), conn.clone());
                lock(&self.handshaking).remove(&key);
                trace!("{} established to {}:{}", key, est.target, est.port);
            }
            Err(e) => debug!("{} failed before it was established: {}", key, e),
        }

        conn.closed().await;
        lock(&self.handshaking).remove(&key);
        lock(&self.connections).remove(&key);
        let hook = lock(&self.on_close).clone();
        if let Some(hook) = hook {
            hook(&conn);
        }
    }
}

/// Make sure that panics get logged before the process dies.
///
/// Only the first call does anything.
fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            error!("Fatal error: {}", info);
            previous(info);
        }));
    });
}

#[cfg(test)]
mod test {
    use super::*;
    use burrow_rtcompat::tokio::test_with_runtime;
    use burrow_rtcompat::{SleepProvider, TcpProvider};

    fn localhost_config() -> ServerConfig {
        ServerConfig {
            listen: vec![ListenAddr {
                host: "127.0.0.1".to_string(),
                port: 0,
            }],
            kill_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn start_is_idempotent() {
        test_with_runtime(|rt| async move {
            let server = SocksServer::new(rt, localhost_config());
            let first = server.start().await.unwrap();
            let second = server.start().await.unwrap();
            assert_eq!(first.len(), 1);
            assert_ne!(first[0].port(), 0);
            assert_eq!(first, second);
            assert_eq!(server.listen_addrs(), first);
            server.close().await;
        });
    }

    #[test]
    fn bind_failure() {
        test_with_runtime(|rt| async move {
            let first = SocksServer::new(rt.clone(), localhost_config());
            let addrs = first.start().await.unwrap();

            let mut config = localhost_config();
            config.listen.push(ListenAddr {
                host: "127.0.0.1".to_string(),
                port: addrs[0].port(),
            });
            let second = SocksServer::new(rt, config);
            let err = second.start().await.unwrap_err();
            assert!(matches!(err, Error::Bind { .. }));
            // The failure is remembered.
            assert!(second.start().await.is_err());

            first.close().await;
            second.close().await;
        });
    }

    #[test]
    fn close_catches_late_arrivals() {
        test_with_runtime(|rt| async move {
            let server = SocksServer::new(rt.clone(), localhost_config());
            let addr = server.start().await.unwrap()[0];

            // Keep connecting until the listener goes away.
            let rt2 = rt.clone();
            let clients = rt
                .spawn_with_handle(async move {
                    let mut streams = Vec::new();
                    while streams.len() < 200 {
                        match rt2.connect(&addr).await {
                            Ok(s) => streams.push(s),
                            Err(_) => break,
                        }
                    }
                    streams
                })
                .unwrap();
            rt.sleep(Duration::from_millis(20)).await;

            server.close().await;
            assert!(lock(&server.inner.accept_loops).is_empty());
            let left: Vec<Connection> = lock(&server.inner.handshaking)
                .values()
                .chain(lock(&server.inner.connections).values())
                .cloned()
                .collect();
            for conn in &left {
                assert!(conn.is_closed());
                assert!(conn.closed().now_or_never().is_some());
            }
            assert!(server.closed().now_or_never().is_some());
            drop(clients.await);
        });
    }

    #[test]
    fn close_without_start() {
        test_with_runtime(|rt| async move {
            let server = SocksServer::new(rt, localhost_config());
            server.close().await;
            server.close().await;
            server.closed().await;
            assert!(server.connections().is_empty());
            assert!(server.shutdown().await.is_ok());
        });
    }
}
