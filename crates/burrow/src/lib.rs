//! A SOCKS5 proxy, with an optional encrypted tunnel to an upstream
//! relay.
//!
//! # Overview
//!
//! A [`SocksServer`] listens on one or more addresses.  Each client it
//! accepts gets a [`Connection`]: a task that speaks SOCKS5 with the
//! client (method selection, optional username/password
//! authentication, then a CONNECT request), reaches the destination
//! through a [`Dialer`], and relays bytes both ways until either side
//! is done.
//!
//! Two dialers are provided.  [`DirectDialer`] opens a TCP connection to
//! the destination.  [`TunnelDialer`] instead connects to a fixed
//! shadowsocks-style upstream, encrypts the stream with a
//! [`CipherFactory`]'s ciphers, and names the real destination in a
//! [`TunnelRequest`](burrow_socksproto::TunnelRequest) before relaying.
//!
//! Connections close on protocol errors, failed authentication, idle
//! timeouts, destination failures, or when asked to.  Closing is
//! idempotent, and observers learn the outcome through shared futures
//! ([`Connection::established`] and [`Connection::closed`]).
//!
//! Everything here is written against the
//! [`Runtime`](burrow_rtcompat::Runtime) trait; the `burrow` binary runs
//! it on tokio.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(clippy::await_holding_lock)]

mod auth;
mod cipher;
pub mod config;
mod connection;
mod dialer;
mod err;
mod relay;
mod server;
mod tunnel;

pub use auth::{Authenticate, StaticAuthenticator};
pub use cipher::{
    evp_bytes_to_key, CipherFactory, CipherMethod, CipherStream, PasswordCipher, TunnelCipher,
};
pub use connection::{Connection, ConnectionConfig, ConnectionSettings, Established};
pub use dialer::{BoxedStream, Dialer, DirectDialer, RelayStream};
pub use err::Error;
pub use server::{ListenAddr, ServerConfig, SocksServer};
pub use tunnel::TunnelDialer;

/// A Result type for the burrow crate.
pub type Result<T> = std::result::Result<T, Error>;
