use crate::tokio::test_with_runtime;
use crate::traits::*;
use crate::{SleepProviderExt, TimeoutError};

use futures::io::{AsyncReadExt, AsyncWriteExt};
use futures::task::SpawnExt;
use std::io::Result as IoResult;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};

// Test "sleep" with a tiny delay, and make sure that at least that
// much delay happens.
#[test]
fn small_delay() {
    test_with_runtime(|rt| async move {
        let i1 = Instant::now();
        let one_msec = Duration::from_millis(1);
        rt.sleep(one_msec).await;
        let i2 = Instant::now();
        assert!(i2 >= i1 + one_msec);
    });
}

#[test]
fn small_timeout_ok() {
    test_with_runtime(|rt| async move {
        let one_day = Duration::from_secs(86400);
        let outcome = rt.timeout(one_day, async { 413_u32 }).await;
        assert_eq!(outcome, Ok(413));
    });
}

#[test]
fn small_timeout_expire() {
    use futures::future::pending;

    test_with_runtime(|rt| async move {
        let one_micros = Duration::from_micros(1);
        let outcome = rt.timeout(one_micros, pending::<()>()).await;
        assert_eq!(outcome, Err(TimeoutError));
        assert_eq!(TimeoutError.to_string(), "Timeout expired");
    });
}

// Try connecting to ourself and sending a little data.
//
// NOTE: requires Ipv4 localhost.
#[test]
fn self_connect() -> IoResult<()> {
    test_with_runtime(|rt| async move {
        let localhost: SocketAddr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0).into();
        let listener = rt.listen(&localhost).await?;
        let addr = listener.local_addr()?;
        assert_ne!(addr.port(), 0);

        let task1 = async {
            let mut buf = vec![0_u8; 11];
            let (mut con, _addr) = listener.accept().await?;
            con.read_exact(&mut buf[..]).await?;
            IoResult::Ok(buf)
        };
        let task2 = async {
            let mut con = rt.connect(&addr).await?;
            con.write_all(b"Hello world").await?;
            con.flush().await?;
            IoResult::Ok(())
        };

        let (data, send_r) = futures::join!(task1, task2);
        send_r?;
        assert_eq!(&data?[..], b"Hello world");
        IoResult::Ok(())
    })
}

#[test]
fn spawn_and_resolve() -> IoResult<()> {
    test_with_runtime(|rt| async move {
        let (tx, rx) = futures::channel::oneshot::channel();
        rt.spawn(async move {
            let _ignore = tx.send(7_u8);
        })
        .expect("spawn failed");
        assert_eq!(rx.await, Ok(7));

        let addrs = rt.resolve("127.0.0.1", 1080).await?;
        assert_eq!(addrs, vec!["127.0.0.1:1080".parse::<SocketAddr>().unwrap()]);
        IoResult::Ok(())
    })
}
