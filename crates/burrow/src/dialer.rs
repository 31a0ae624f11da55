//! Reach the destination that a client asked for.
//!
//! A [`Dialer`] turns a CONNECT request into a byte stream.  The
//! [`DirectDialer`] opens a TCP connection to the destination itself;
//! the [`TunnelDialer`](crate::TunnelDialer) goes through an encrypted
//! upstream relay instead.

use crate::Result;

use async_trait::async_trait;
use burrow_rtcompat::Runtime;
use burrow_socksproto::{ConnectRequest, SocksAddr};
use futures::io::{AsyncRead, AsyncWrite};
use std::io::{Error as IoError, ErrorKind};
use std::net::SocketAddr;
use tracing::debug;

/// A bidirectional byte stream that a connection can relay over.
pub trait RelayStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> RelayStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A boxed [`RelayStream`], as returned by a [`Dialer`].
pub type BoxedStream = Box<dyn RelayStream>;

/// Something that can open a stream to the destination of a CONNECT
/// request.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a stream to the address and port in `request`.
    ///
    /// The caller applies the connect timeout.
    async fn dial(&self, request: &ConnectRequest) -> Result<BoxedStream>;
}

/// Resolve `addr` to a list of socket addresses.
pub(crate) async fn resolve<R: Runtime>(
    runtime: &R,
    addr: &SocksAddr,
    port: u16,
) -> Result<Vec<SocketAddr>> {
    match addr {
        SocksAddr::Ip(ip) => Ok(vec![SocketAddr::new(*ip, port)]),
        SocksAddr::Hostname(h) => Ok(runtime.resolve(h.as_ref(), port).await?),
    }
}

/// Try each address in `addrs` in turn, and return a stream to the
/// first one that accepts our connection.
pub(crate) async fn connect_any<R: Runtime>(
    runtime: &R,
    addrs: &[SocketAddr],
) -> Result<R::TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match runtime.connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("Connection to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err
        .unwrap_or_else(|| IoError::new(ErrorKind::NotFound, "no addresses to connect to"))
        .into())
}

/// A [`Dialer`] that connects straight to the destination.
#[derive(Clone, Debug)]
pub struct DirectDialer<R> {
    /// Runtime to use for resolving and connecting.
    runtime: R,
}

impl<R: Runtime> DirectDialer<R> {
    /// Construct a new DirectDialer.
    pub fn new(runtime: R) -> Self {
        DirectDialer { runtime }
    }
}

#[async_trait]
impl<R: Runtime> Dialer for DirectDialer<R> {
    async fn dial(&self, request: &ConnectRequest) -> Result<BoxedStream> {
        let addrs = resolve(&self.runtime, request.addr(), request.port()).await?;
        let stream = connect_any(&self.runtime, &addrs).await?;
        Ok(Box::new(stream))
    }
}
