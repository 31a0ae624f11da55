//! Deadlines on top of [`SleepProvider`].

use crate::traits::SleepProvider;
use futures::Future;
use pin_project::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// The deadline passed before the wrapped future finished.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(clippy::exhaustive_structs)]
pub struct TimeoutError;

impl std::error::Error for TimeoutError {}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Timeout expired")
    }
}

/// Extension methods for every [`SleepProvider`].
pub trait SleepProviderExt: SleepProvider {
    /// Run `future`, but give up once `duration` has passed.
    ///
    /// Resolves to `Ok` with the future's output, or to
    /// `Err(TimeoutError)` if the deadline came first.  When both are
    /// ready at once, the future's output wins.
    fn timeout<F: Future>(&self, duration: Duration, future: F) -> Timeout<F, Self::SleepFuture> {
        Timeout {
            future,
            deadline: self.sleep(duration),
        }
    }
}

impl<T: SleepProvider + ?Sized> SleepProviderExt for T {}

/// Future returned by [`SleepProviderExt::timeout`].
#[pin_project]
#[derive(Debug)]
pub struct Timeout<F, S> {
    /// What we're waiting for.
    #[pin]
    future: F,
    /// When we stop waiting.
    #[pin]
    deadline: S,
}

impl<F, S> Future for Timeout<F, S>
where
    F: Future,
    S: Future<Output = ()>,
{
    type Output = Result<F::Output, TimeoutError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.future.poll(cx) {
            Poll::Ready(output) => Poll::Ready(Ok(output)),
            Poll::Pending => this.deadline.poll(cx).map(|()| Err(TimeoutError)),
        }
    }
}
