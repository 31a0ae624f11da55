//! Declare an error type for burrow_socksproto
use std::sync::Arc;
use thiserror::Error;

/// An error that occurs while encoding or decoding SOCKS packets.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Tried to handle a message what wasn't complete: try again.
    #[error("Message truncated; need to wait for more")]
    Truncated,

    /// The peer didn't implement SOCKS correctly.
    #[error("SOCKS protocol syntax violation: {0}")]
    Syntax(&'static str),

    /// The peer declared a version number that isn't the one this
    /// packet kind uses.
    ///
    /// In all likelihood, this is somebody trying to use the port for
    /// some protocol other than SOCKS5.
    #[error("Unrecognized SOCKS protocol version {0}")]
    BadVersion(u8),

    /// An address type byte that is none of IPv4, hostname, or IPv6.
    #[error("Unrecognized SOCKS address type {0}")]
    BadAddrType(u8),

    /// A command byte that is none of CONNECT, BIND, or UDP ASSOCIATE.
    #[error("Unrecognized SOCKS command {0}")]
    BadCommand(u8),

    /// A reply byte outside the range RFC 1928 defines.
    #[error("Unrecognized SOCKS reply code {0}")]
    BadReply(u8),

    /// An authentication status that is neither success nor failure.
    #[error("Unrecognized authentication status {0}")]
    BadAuthStatus(u8),

    /// The decoder or writer was already destroyed.
    #[error("SOCKS codec was closed")]
    Closed,

    /// Writing an encoded packet to the underlying stream failed.
    #[error("IO error while writing SOCKS packet")]
    Io(#[source] Arc<std::io::Error>),
}

impl From<burrow_bytes::Error> for Error {
    fn from(e: burrow_bytes::Error) -> Error {
        use burrow_bytes::Error as E;
        match e {
            E::Truncated => Error::Truncated,
            E::BadMessage(m) => Error::Syntax(m),
            _ => Error::Syntax("unexpected trailing bytes"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(Arc::new(e))
    }
}
