//! Incremental decoding of inbound packets, and queued encoding of
//! outbound ones.

use crate::packet::{Packet, PacketKind};
use crate::{Error, Result};

use burrow_bytes::Writer;
use bytes::{Buf, Bytes, BytesMut};
use futures::io::AsyncWrite;
use futures::sink::Sink;
use futures::{ready, task::Context, task::Poll};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::trace;

/// Turns a stream of byte chunks into [`Packet`]s.
///
/// Chunks may split or merge packets arbitrarily: bytes that don't yet
/// form a whole packet are kept until more arrive.  The caller decides
/// which packet kinds are acceptable by calling
/// [`Decoder::set_accepted`] as its conversation progresses.
#[derive(Debug)]
pub struct Decoder {
    /// Bytes received but not yet consumed by a packet.
    buf: BytesMut,
    /// Packet kinds we may decode right now.
    accepted: &'static [PacketKind],
    /// True once [`Decoder::destroy`] has been called.
    closed: bool,
}

impl Decoder {
    /// Create a new Decoder that accepts the packet kinds in `accepted`.
    pub fn new(accepted: &'static [PacketKind]) -> Self {
        Decoder {
            buf: BytesMut::new(),
            accepted,
            closed: false,
        }
    }

    /// Replace the set of acceptable packet kinds.
    ///
    /// Bytes already buffered are decoded according to the new set.
    pub fn set_accepted(&mut self, accepted: &'static [PacketKind]) {
        self.accepted = accepted;
    }

    /// Return the packet kinds that are currently acceptable.
    pub fn accepted(&self) -> &'static [PacketKind] {
        self.accepted
    }

    /// Return true if this decoder has been destroyed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Return the number of bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Add `chunk` to the end of our buffer, without decoding anything.
    pub fn extend(&mut self, chunk: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    /// Try to decode a single packet from the head of our buffer.
    ///
    /// Returns `Ok(None)` if there isn't a whole packet yet.  On error,
    /// nothing is consumed.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        if self.closed {
            return Err(Error::Closed);
        }
        if self.buf.is_empty() {
            return Ok(None);
        }
        let kind = self.expected_kind()?;
        let len = kind.packet_len(&self.buf[..])?;
        if len == 0 || self.buf.len() < len {
            return Ok(None);
        }
        let packet = kind.parse(&self.buf[..len])?;
        self.buf.advance(len);
        trace!("Decoded {:?} ({} bytes, {} left over)", kind, len, self.buf.len());
        Ok(Some(packet))
    }

    /// Add `chunk` to our buffer, and decode every whole packet it
    /// completes.
    ///
    /// If any packet fails to decode, no packets are returned, and the
    /// error is.
    pub fn write(&mut self, chunk: &[u8]) -> Result<Vec<Packet>> {
        self.extend(chunk)?;
        let mut packets = Vec::new();
        while let Some(packet) = self.next_packet()? {
            packets.push(packet);
        }
        Ok(packets)
    }

    /// Remove and return every byte that we have buffered but not
    /// decoded.
    pub fn take_remaining(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Drop our buffer and refuse all further input.
    ///
    /// Calling this more than once has no further effect.
    pub fn destroy(&mut self) {
        self.closed = true;
        self.buf = BytesMut::new();
    }

    /// Pick the kind of packet that should be at the head of our buffer.
    ///
    /// When several kinds are acceptable, the leading version byte tells
    /// them apart.
    fn expected_kind(&self) -> Result<PacketKind> {
        match self.accepted {
            [] => Err(Error::Syntax("no packet expected")),
            [only] => Ok(*only),
            several => {
                let version = self.buf[0];
                several
                    .iter()
                    .find(|k| k.version() == version)
                    .copied()
                    .ok_or(Error::BadVersion(version))
            }
        }
    }
}

/// The default number of queued bytes above which a [`PacketWriter`]
/// stops accepting packets until it has written some out.
pub const DEFAULT_HIGH_WATER: usize = 16 * 1024;

/// A [`Sink`] that encodes [`Packet`]s onto an [`AsyncWrite`].
///
/// Encoded packets wait in a FIFO queue until the underlying writer can
/// take them; `poll_ready` holds off new packets while more than the
/// high-water mark of bytes is queued.
#[derive(Debug)]
pub struct PacketWriter<W> {
    /// The stream we write to.
    inner: W,
    /// Encoded packets that haven't been completely written, oldest
    /// first.  The front entry may be partially written.
    queue: VecDeque<Bytes>,
    /// Total number of bytes in `queue`.
    queued: usize,
    /// Limit on `queued` above which we apply backpressure.
    high_water: usize,
    /// True once [`PacketWriter::destroy`] has been called.
    closed: bool,
}

impl<W> PacketWriter<W> {
    /// Create a new PacketWriter with the default high-water mark.
    pub fn new(inner: W) -> Self {
        Self::with_high_water(inner, DEFAULT_HIGH_WATER)
    }

    /// Create a new PacketWriter that applies backpressure once
    /// `high_water` bytes are queued.
    pub fn with_high_water(inner: W, high_water: usize) -> Self {
        PacketWriter {
            inner,
            queue: VecDeque::new(),
            queued: 0,
            high_water,
            closed: false,
        }
    }

    /// Return the number of encoded bytes not yet written.
    pub fn queued(&self) -> usize {
        self.queued
    }

    /// Return true if we're over the high-water mark.
    pub fn is_limited(&self) -> bool {
        self.queued >= self.high_water
    }

    /// Discard anything queued and refuse all further packets.
    ///
    /// Calling this more than once has no further effect.
    pub fn destroy(&mut self) {
        self.closed = true;
        self.queue.clear();
        self.queued = 0;
    }

    /// Return a mutable reference to the underlying writer.
    ///
    /// Bytes written directly go out ahead of anything still queued.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Return the underlying writer.  Anything still queued is lost.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> PacketWriter<W> {
    /// Write queued bytes to the underlying writer until the queue is
    /// empty.
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        while let Some(front) = self.queue.front_mut() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &front[..]))?;
            if n == 0 {
                return Poll::Ready(Err(std::io::Error::from(
                    std::io::ErrorKind::WriteZero,
                )
                .into()));
            }
            front.advance(n);
            self.queued -= n;
            if front.is_empty() {
                self.queue.pop_front();
            }
        }
        Poll::Ready(Ok(()))
    }
}

impl<W: AsyncWrite + Unpin> Sink<Packet> for PacketWriter<W> {
    type Error = Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Err(Error::Closed));
        }
        if this.is_limited() {
            ready!(this.poll_drain(cx))?;
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Packet) -> Result<()> {
        let this = self.get_mut();
        if this.closed {
            return Err(Error::Closed);
        }
        let mut buf = BytesMut::new();
        buf.write(&item);
        trace!("Queueing {:?} ({} bytes)", item.kind(), buf.len());
        this.queued += buf.len();
        this.queue.push_back(buf.freeze());
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Err(Error::Closed));
        }
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx).map_err(Error::from)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        ready!(self.as_mut().poll_flush(cx))?;
        Pin::new(&mut self.get_mut().inner)
            .poll_close(cx)
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::msg::{AuthStatus, SocksAddr, SocksCmd, SocksMethod, SocksReply};
    use crate::packet::*;
    use futures::executor::block_on;
    use futures::SinkExt;
    use hex_literal::hex;

    const HANDSHAKE: &[PacketKind] = &[PacketKind::HandshakeRequest];
    const AUTH: &[PacketKind] = &[PacketKind::AuthRequest, PacketKind::ConnectRequest];
    const CONNECT: &[PacketKind] = &[PacketKind::ConnectRequest];

    fn connect_request() -> ConnectRequest {
        ConnectRequest::new(SocksCmd::CONNECT, SocksAddr::parse("example.com").unwrap(), 443)
    }

    #[test]
    fn fragmented() {
        let encoded = connect_request().to_bytes();
        for split in 1..encoded.len() {
            let mut d = Decoder::new(CONNECT);
            assert!(d.write(&encoded[..split]).unwrap().is_empty());
            assert_eq!(d.buffered(), split);
            let packets = d.write(&encoded[split..]).unwrap();
            assert_eq!(packets, vec![Packet::ConnectRequest(connect_request())]);
            assert_eq!(d.buffered(), 0);
        }

        // One byte at a time.
        let mut d = Decoder::new(CONNECT);
        let mut got = Vec::new();
        for b in &encoded {
            got.extend(d.write(&[*b]).unwrap());
        }
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn concatenated() {
        let mut d = Decoder::new(CONNECT);
        let mut chunk = connect_request().to_bytes();
        chunk.extend(connect_request().to_bytes());
        chunk.extend(&hex!("05 01")[..]);
        let packets = d.write(&chunk).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(d.buffered(), 2);
        assert_eq!(&d.take_remaining()[..], &hex!("05 01")[..]);
        assert_eq!(d.buffered(), 0);
    }

    #[test]
    fn bad_address_type() {
        let mut d = Decoder::new(CONNECT);
        assert!(matches!(
            d.write(&hex!("05 01 00 07 00")),
            Err(Error::BadAddrType(7))
        ));
        // Failures don't consume anything.
        assert_eq!(d.buffered(), 5);
    }

    #[test]
    fn error_drops_earlier_packets() {
        let mut d = Decoder::new(CONNECT);
        let mut chunk = connect_request().to_bytes();
        chunk.extend(&hex!("05 09")[..]);
        assert!(matches!(d.write(&chunk), Err(Error::BadCommand(9))));
    }

    #[test]
    fn choose_kind_by_version() {
        let mut d = Decoder::new(AUTH);
        let auth = AuthRequest::new("bob", "right").unwrap();
        let mut chunk = auth.to_bytes();
        chunk.extend(connect_request().to_bytes());

        // Handle one packet at a time, changing phase in between.
        d.extend(&chunk).unwrap();
        assert_eq!(d.next_packet().unwrap(), Some(Packet::AuthRequest(auth)));
        d.set_accepted(CONNECT);
        assert_eq!(
            d.next_packet().unwrap(),
            Some(Packet::ConnectRequest(connect_request()))
        );
        assert_eq!(d.next_packet().unwrap(), None);

        let mut d = Decoder::new(AUTH);
        assert!(matches!(d.write(&hex!("04 00")), Err(Error::BadVersion(4))));
    }

    #[test]
    fn handshake_then_pipelined_data() {
        let mut d = Decoder::new(HANDSHAKE);
        let packets = d.write(&hex!("05 01 00 05 01")).unwrap();
        assert_eq!(
            packets,
            vec![Packet::HandshakeRequest(
                HandshakeRequest::new(vec![SocksMethod::NO_AUTH]).unwrap()
            )]
        );
        assert_eq!(d.buffered(), 2);
    }

    #[test]
    fn destroyed() {
        let mut d = Decoder::new(HANDSHAKE);
        d.extend(&hex!("05")).unwrap();
        d.destroy();
        d.destroy();
        assert!(d.is_closed());
        assert_eq!(d.buffered(), 0);
        assert!(matches!(d.write(&hex!("01 00")), Err(Error::Closed)));
        assert!(matches!(d.next_packet(), Err(Error::Closed)));

        let mut d = Decoder::new(&[]);
        assert!(d.write(&[]).unwrap().is_empty());
        assert!(matches!(d.write(&hex!("05")), Err(Error::Syntax(_))));
    }

    /// A writer that takes at most `max` bytes per call.
    struct Trickle {
        out: Vec<u8>,
        max: usize,
    }

    impl AsyncWrite for Trickle {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let this = self.get_mut();
            let n = std::cmp::min(this.max, buf.len());
            this.out.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }
        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn write_in_order() {
        let mut w = PacketWriter::new(Trickle {
            out: Vec::new(),
            max: 3,
        });
        let first: Packet = HandshakeResponse::new(SocksMethod::NO_AUTH).into();
        let second: Packet = ConnectResponse::new(
            SocksReply::SUCCEEDED,
            SocksAddr::parse("example.com").unwrap(),
            443,
        )
        .into();
        block_on(async {
            w.feed(first.clone()).await.unwrap();
            w.feed(second.clone()).await.unwrap();
            assert_eq!(w.queued(), first.to_bytes().len() + second.to_bytes().len());
            w.flush().await.unwrap();
        });
        assert_eq!(w.queued(), 0);
        let mut expected = first.to_bytes();
        expected.extend(second.to_bytes());
        assert_eq!(w.into_inner().out, expected);
    }

    #[test]
    fn backpressure() {
        let mut w = PacketWriter::with_high_water(
            Trickle {
                out: Vec::new(),
                max: 1,
            },
            1,
        );
        let first: Packet = HandshakeResponse::new(SocksMethod::USER_PASS).into();
        let second: Packet = AuthResponse::new(AuthStatus::SUCCEEDED).into();
        block_on(async {
            w.feed(first.clone()).await.unwrap();
            assert!(w.is_limited());
            // Not ready until the first packet is out.
            w.feed(second.clone()).await.unwrap();
        });
        assert_eq!(w.queued(), 2);
        assert_eq!(&w.inner.out[..], &hex!("05 02")[..]);

        w.destroy();
        assert_eq!(w.queued(), 0);
        assert!(matches!(block_on(w.send(first)), Err(Error::Closed)));
    }
}
