//! Compatibility between Burrow and its async runtime.
//!
//! We isolate the runtime in a single crate so that the rest of Burrow
//! depends only on the small set of capabilities it really needs:
//! spawning tasks, sleeping, timing out, and making or accepting TCP
//! connections.  Everything above this crate is written against
//! the [`Runtime`] trait and the `futures` IO traits.
//!
//! Right now the only implementation is built on tokio; see the
//! [`tokio`] module for entry points.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(clippy::await_holding_lock)]

pub(crate) mod impls;
mod timer;
mod traits;

#[cfg(test)]
mod test;

pub mod tokio;

pub use timer::{SleepProviderExt, Timeout, TimeoutError};
pub use traits::{Runtime, SleepProvider, TcpListener, TcpProvider};

pub use futures::task::Spawn;
