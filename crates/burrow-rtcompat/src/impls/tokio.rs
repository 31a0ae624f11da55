//! Implement the [`Runtime`](crate::Runtime) traits on top of tokio.

use crate::traits::{SleepProvider, TcpListener, TcpProvider};

use async_trait::async_trait;
use futures::task::{FutureObj, Spawn, SpawnError};
use std::io::Result as IoResult;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_crate::runtime::Handle;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

/// Types used for networking (tokio implementation)
pub(crate) mod net {
    use super::*;

    /// A TCP stream, adapted to the `futures` IO traits.
    pub type TcpStream = Compat<tokio_crate::net::TcpStream>;

    /// Wrap a tokio TcpListener so that it yields `futures`-style streams.
    pub struct Listener {
        /// The underlying listener.
        pub(super) lis: tokio_crate::net::TcpListener,
    }

    #[async_trait]
    impl TcpListener for Listener {
        type TcpStream = TcpStream;

        async fn accept(&self) -> IoResult<(Self::TcpStream, SocketAddr)> {
            let (stream, addr) = self.lis.accept().await?;
            // Relayed SOCKS traffic is interactive.
            stream.set_nodelay(true)?;
            Ok((stream.compat(), addr))
        }

        fn local_addr(&self) -> IoResult<SocketAddr> {
            self.lis.local_addr()
        }
    }
}

/// A handle to a running tokio runtime, implementing
/// [`Runtime`](crate::Runtime).
///
/// Cloning this is cheap.  It does not keep the runtime alive: whoever
/// built the runtime owns it, and drops it outside of async context.
#[derive(Clone, Debug)]
pub struct TokioRuntimeHandle {
    /// The handle that we use to reach the runtime.
    handle: Handle,
}

impl TokioRuntimeHandle {
    /// Wrap a tokio [`Handle`].
    pub(crate) fn new(handle: Handle) -> Self {
        TokioRuntimeHandle { handle }
    }
}

impl Spawn for TokioRuntimeHandle {
    fn spawn_obj(&self, future: FutureObj<'static, ()>) -> Result<(), SpawnError> {
        drop(self.handle.spawn(future));
        Ok(())
    }
}

impl SleepProvider for TokioRuntimeHandle {
    type SleepFuture = tokio_crate::time::Sleep;
    fn sleep(&self, duration: Duration) -> Self::SleepFuture {
        let _guard = self.handle.enter();
        tokio_crate::time::sleep(duration)
    }
}

#[async_trait]
impl TcpProvider for TokioRuntimeHandle {
    type TcpStream = net::TcpStream;
    type TcpListener = net::Listener;

    async fn connect(&self, addr: &SocketAddr) -> IoResult<Self::TcpStream> {
        let stream = tokio_crate::net::TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream.compat())
    }

    async fn listen(&self, addr: &SocketAddr) -> IoResult<Self::TcpListener> {
        let lis = tokio_crate::net::TcpListener::bind(addr).await?;
        Ok(net::Listener { lis })
    }

    async fn resolve(&self, host: &str, port: u16) -> IoResult<Vec<SocketAddr>> {
        let addrs = tokio_crate::net::lookup_host((host, port)).await?;
        Ok(addrs.collect())
    }
}
