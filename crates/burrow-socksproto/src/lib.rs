//! Encode and decode the SOCKS5 protocol, incrementally.
//!
//! SOCKS5 is specified in [RFC 1928](https://tools.ietf.org/html/rfc1928),
//! with username/password authentication in
//! [RFC 1929](https://tools.ietf.org/html/rfc1929).
//!
//! This crate knows nothing about sockets.  It provides:
//!
//!   * Typed versions of every packet exchanged during a SOCKS5
//!     session ([`HandshakeRequest`], [`ConnectResponse`], and so on),
//!     plus the [`TunnelRequest`] that Burrow sends to an encrypted
//!     upstream before relaying.
//!   * A [`Decoder`] that turns a stream of byte chunks into packets,
//!     no matter how the chunks were split or merged in transit.  The
//!     caller tells it which packet kinds are acceptable at each phase
//!     of the conversation.
//!   * A [`PacketWriter`] that serializes packets onto an
//!     [`AsyncWrite`](futures::io::AsyncWrite), queueing them in order
//!     when the writer can't keep up.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(clippy::await_holding_lock)]

mod codec;
mod err;
mod msg;
mod packet;

pub use codec::{Decoder, PacketWriter, DEFAULT_HIGH_WATER};
pub use err::Error;
pub use msg::{AddrType, AuthStatus, SocksAddr, SocksCmd, SocksHostname, SocksMethod, SocksReply};
pub use packet::{
    AuthRequest, AuthResponse, ConnectRequest, ConnectResponse, HandshakeRequest,
    HandshakeResponse, Packet, PacketKind, SocksPacket, TunnelRequest,
};

/// A Result type for the burrow_socksproto crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The SOCKS protocol version that we speak.
pub const SOCKS_VERSION: u8 = 5;

/// The version of the username/password authentication subnegotiation.
pub const AUTH_VERSION: u8 = 1;
