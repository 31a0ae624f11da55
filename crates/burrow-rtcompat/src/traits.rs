//! Declarations for traits that we need our runtimes to implement.

use async_trait::async_trait;
use futures::{AsyncRead, AsyncWrite, Future};
use std::io::Result as IoResult;
use std::net::SocketAddr;
use std::time::Duration;

use futures::task::Spawn;

/// A runtime that we can use to run a SOCKS proxy.
///
/// This trait comprises several other traits that we require all of our
/// runtimes to provide:
///
/// * [`futures::task::Spawn`] to launch new background tasks.
/// * [`SleepProvider`] to pause a task for a given amount of time.
/// * [`TcpProvider`] to launch and accept TCP connections.
pub trait Runtime: Send + Sync + Clone + Spawn + SleepProvider + TcpProvider + 'static {}

impl<T> Runtime for T where T: Send + Sync + Clone + Spawn + SleepProvider + TcpProvider + 'static {}

/// Trait for a runtime that can wait until a timer has expired.
pub trait SleepProvider {
    /// A future returned by [`SleepProvider::sleep()`]
    type SleepFuture: Future<Output = ()> + Send + 'static;
    /// Return a future that will be ready after `duration` has
    /// elapsed.
    fn sleep(&self, duration: Duration) -> Self::SleepFuture;
}

/// Trait for a runtime that can create and accept TCP connections.
///
/// Streams are exposed through the `futures` IO traits, so that nothing
/// above this crate needs to know which runtime it is running on.
#[async_trait]
pub trait TcpProvider {
    /// The type for the TCP connections returned by [`Self::connect()`].
    type TcpStream: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static;
    /// The type for the TCP listeners returned by [`Self::listen()`].
    type TcpListener: TcpListener<TcpStream = Self::TcpStream> + Send + Sync + Unpin + 'static;

    /// Launch a TCP connection to a given socket address.
    async fn connect(&self, addr: &SocketAddr) -> IoResult<Self::TcpStream>;

    /// Open a TCP listener on a given socket address.
    async fn listen(&self, addr: &SocketAddr) -> IoResult<Self::TcpListener>;

    /// Look up the socket addresses for `host` and `port`.
    ///
    /// `host` may be a hostname or a literal IP address.
    async fn resolve(&self, host: &str, port: u16) -> IoResult<Vec<SocketAddr>>;
}

/// Trait for a local socket that accepts incoming TCP streams.
#[async_trait]
pub trait TcpListener {
    /// The type of TCP connections returned by [`Self::accept()`].
    type TcpStream: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static;

    /// Wait for an incoming stream; return it along with its address.
    async fn accept(&self) -> IoResult<(Self::TcpStream, SocketAddr)>;

    /// Return the local address that this listener is bound to.
    fn local_addr(&self) -> IoResult<SocketAddr>;
}
