//! Splice bytes between a client and its destination.

use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use std::io::Result as IoResult;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Tracks when a connection last did anything useful.
#[derive(Debug)]
pub(crate) struct Activity {
    /// When we last saw a packet or relayed a chunk.
    last: Mutex<Instant>,
}

impl Activity {
    /// Construct a new Activity, marked as active now.
    pub(crate) fn new() -> Self {
        Activity {
            last: Mutex::new(Instant::now()),
        }
    }

    /// Note that the connection is active right now.
    pub(crate) fn touch(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Return how long it has been since the connection was last active.
    pub(crate) fn idle_for(&self) -> Duration {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

/// Copy bytes from `reader` to `writer` until EOF or an error.
///
/// Unlike `futures::io::copy()`, this flushes `writer` whenever `reader`
/// has nothing more for the moment, so that interactive traffic isn't
/// held back in a buffer.  Each chunk copied counts as activity.
///
/// After a clean EOF we close `writer`, so that the far side sees this
/// direction end.  After an error we only flush it.
pub(crate) async fn copy_interactive<R, W>(
    mut reader: R,
    mut writer: W,
    activity: &Activity,
) -> IoResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    use futures::{poll, task::Poll};

    let mut buf = [0_u8; 4096];

    let outcome: IoResult<()> = loop {
        let mut read = reader.read(&mut buf[..]);
        let n = match poll!(&mut read) {
            Poll::Ready(r) => r,
            Poll::Pending => {
                // Nothing else is ready: push out what we have, then wait.
                writer.flush().await?;
                read.await
            }
        };
        match n {
            Err(e) => break Err(e),
            Ok(0) => break Ok(()),
            Ok(n) => {
                activity.touch();
                writer.write_all(&buf[..n]).await?;
            }
        }
    };

    let finish = match outcome {
        Ok(()) => writer.close().await,
        Err(_) => writer.flush().await,
    };
    outcome.and(finish)
}

/// Relay bytes between a client and a destination until both directions
/// have finished, or either fails.
///
/// `early` holds bytes the client sent before the relay began; they go to
/// the destination before anything else.
pub(crate) async fn splice<CR, CW, D>(
    client_r: CR,
    client_w: CW,
    destination: D,
    early: &[u8],
    activity: &Activity,
) -> IoResult<()>
where
    CR: AsyncRead + Unpin,
    CW: AsyncWrite + Unpin,
    D: AsyncRead + AsyncWrite + Unpin,
{
    let (dest_r, mut dest_w) = destination.split();
    if !early.is_empty() {
        activity.touch();
        dest_w.write_all(early).await?;
        dest_w.flush().await?;
    }
    let upstream = copy_interactive(client_r, dest_w, activity);
    let downstream = copy_interactive(dest_r, client_w, activity);
    futures::future::try_join(upstream, downstream).await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::executor::block_on;
    use futures::io::Cursor;

    #[test]
    fn copy_and_close() {
        let activity = Activity::new();
        let mut out = Cursor::new(Vec::new());
        let data = vec![7_u8; 10_000];
        block_on(copy_interactive(&data[..], &mut out, &activity)).unwrap();
        assert_eq!(out.into_inner(), data);
        assert!(activity.idle_for() < Duration::from_secs(60));
    }

    #[test]
    fn early_bytes_first() {
        let activity = Activity::new();
        let mut to_client = Cursor::new(Vec::new());
        let mut destination = Cursor::new(Vec::new());
        block_on(splice(
            &b"-late"[..],
            &mut to_client,
            &mut destination,
            b"early",
            &activity,
        ))
        .unwrap();
        assert_eq!(&destination.into_inner()[..], b"early-late");
        assert!(to_client.into_inner().is_empty());
    }
}
