//! Declare the error type for the burrow crate.

use burrow_socksproto::PacketKind;
use futures::task::SpawnError;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// An error that closes a connection, or stops the server.
///
/// Errors are `Clone`, so that one outcome can be reported to every
/// observer of a connection.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The client sent bytes that aren't valid SOCKS5.
    #[error("Couldn't decode SOCKS packet: {0}")]
    ProtocolDecode(#[source] burrow_socksproto::Error),

    /// The client offered no authentication method that we accept.
    #[error("No acceptable authentication method offered")]
    HandshakeRejected,

    /// The client's username and password were refused.
    #[error("Invalid username or password for {0:?}")]
    AuthRejected(String),

    /// The client sent a well-formed packet that we can't handle in the
    /// current phase, or a command we don't support.
    #[error("Unexpected {0:?} packet")]
    UnknownPacketType(PacketKind),

    /// We couldn't reach the destination within the connect timeout.
    #[error("Connecting to {0} timed out")]
    ConnectTimeout(String),

    /// Nothing happened on the connection for too long.
    #[error("Connection idle for {0:?}")]
    IdleTimeout(Duration),

    /// A socket (ours to the client, or ours to the destination) failed.
    #[error("Socket error: {0}")]
    SocketError(#[source] Arc<io::Error>),

    /// The client closed its socket.
    #[error("Socket closed by peer")]
    SocketClosed,

    /// The connection was closed before it was established.
    #[error("Connection closed")]
    Closed,

    /// We couldn't listen on one of our configured addresses.
    #[error("Unable to listen on {addr}: {cause}")]
    Bind {
        /// The address we tried to listen on.
        addr: String,
        /// What went wrong.
        #[source]
        cause: Arc<io::Error>,
    },

    /// Connections were still open when the kill timeout ran out.
    #[error("Connections still open after {0:?}")]
    KillTimeout(Duration),

    /// We couldn't launch a task.
    #[error("Unable to spawn task")]
    Spawn(#[source] Arc<SpawnError>),

    /// Our configuration was unusable.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Return true if this error means the client's socket is already
    /// gone, so that there's no point in closing it gracefully.
    pub(crate) fn is_peer_gone(&self) -> bool {
        matches!(self, Error::SocketClosed | Error::SocketError(_))
    }

    /// Return true if this is a connection-reset error, which isn't
    /// worth a warning.
    pub(crate) fn is_reset(&self) -> bool {
        match self {
            Error::SocketError(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl From<burrow_socksproto::Error> for Error {
    fn from(e: burrow_socksproto::Error) -> Error {
        match e {
            burrow_socksproto::Error::Io(e) => Error::SocketError(e),
            e => Error::ProtocolDecode(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::SocketError(Arc::new(e))
    }
}

impl From<SpawnError> for Error {
    fn from(e: SpawnError) -> Error {
        Error::Spawn(Arc::new(e))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classify() {
        let reset: Error = io::Error::from(io::ErrorKind::ConnectionReset).into();
        assert!(reset.is_reset());
        assert!(reset.is_peer_gone());

        let refused: Error = io::Error::from(io::ErrorKind::ConnectionRefused).into();
        assert!(!refused.is_reset());

        assert!(!Error::IdleTimeout(Duration::from_secs(1)).is_peer_gone());

        let e: Error = burrow_socksproto::Error::BadAddrType(9).into();
        assert!(matches!(e, Error::ProtocolDecode(_)));
    }
}
