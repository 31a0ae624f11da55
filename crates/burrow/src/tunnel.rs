//! Relay connections through an encrypted tunnel to an upstream proxy.
//!
//! The upstream is a shadowsocks-style relay: we connect to it, send a
//! [`TunnelRequest`] naming the real destination as the first bytes of
//! ciphertext, and from then on everything in both directions is
//! encrypted with the tunnel's ciphers.  There is no reply.

use crate::cipher::{CipherFactory, CipherStream};
use crate::dialer::{connect_any, BoxedStream, Dialer};
use crate::Result;

use async_trait::async_trait;
use burrow_rtcompat::Runtime;
use burrow_socksproto::{ConnectRequest, SocksPacket, TunnelRequest};
use futures::io::AsyncWriteExt;
use std::sync::Arc;
use tracing::debug;

/// A [`Dialer`] that reaches every destination through one upstream
/// relay.
pub struct TunnelDialer<R> {
    /// Runtime to use for resolving and connecting.
    runtime: R,
    /// Hostname or address of the upstream relay.
    host: String,
    /// Port of the upstream relay.
    port: u16,
    /// Source of per-tunnel cipher state.
    ciphers: Arc<dyn CipherFactory>,
}

impl<R: Runtime> TunnelDialer<R> {
    /// Construct a new TunnelDialer for the relay at `host:port`.
    pub fn new(runtime: R, host: &str, port: u16, ciphers: Arc<dyn CipherFactory>) -> Self {
        TunnelDialer {
            runtime,
            host: host.to_string(),
            port,
            ciphers,
        }
    }
}

#[async_trait]
impl<R: Runtime> Dialer for TunnelDialer<R> {
    async fn dial(&self, request: &ConnectRequest) -> Result<BoxedStream> {
        let addrs = self.runtime.resolve(&self.host, self.port).await?;
        let upstream = connect_any(&self.runtime, &addrs).await?;
        debug!(
            "Tunnel to {}:{} open for {}:{}",
            self.host,
            self.port,
            request.addr(),
            request.port()
        );

        let (encrypt, decrypt) = self.ciphers.ciphers();
        let mut stream = CipherStream::new(upstream, encrypt, decrypt);
        let hello = TunnelRequest::from(request).to_bytes();
        stream.write_all(&hello[..]).await?;
        stream.flush().await?;
        Ok(Box::new(stream))
    }
}
