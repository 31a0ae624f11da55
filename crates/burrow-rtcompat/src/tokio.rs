//! Entry points for use with Tokio runtimes.

pub use crate::impls::tokio::TokioRuntimeHandle;

use futures::Future;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};

/// An owned multi-threaded tokio runtime.
///
/// Use [`TokioRuntime::handle()`] to get a [`Runtime`](crate::Runtime)
/// that tasks can clone freely.  The runtime shuts down when this
/// object is dropped; drop it from synchronous code only.
pub struct TokioRuntime {
    /// The runtime we own.
    rt: tokio_crate::runtime::Runtime,
}

impl TokioRuntime {
    /// Return a cloneable [`Runtime`](crate::Runtime) handle for this
    /// runtime.
    pub fn handle(&self) -> TokioRuntimeHandle {
        TokioRuntimeHandle::new(self.rt.handle().clone())
    }

    /// Run `future` to completion on this runtime, blocking the current
    /// thread.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.rt.block_on(future)
    }
}

/// Create a new multi-threaded tokio runtime.
///
/// Generally you should call this function only once, and then use
/// [`TokioRuntime::handle()`] to share it.
pub fn create_runtime() -> IoResult<TokioRuntime> {
    let rt = tokio_crate::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    Ok(TokioRuntime { rt })
}

/// Try to return a handle to the currently running tokio runtime.
///
/// This is for callers that already run inside tokio and want to hand
/// Burrow a [`Runtime`](crate::Runtime).  Library code should not call
/// it; it should take a runtime as a parameter instead.
pub fn current_runtime() -> IoResult<TokioRuntimeHandle> {
    let handle = tokio_crate::runtime::Handle::try_current()
        .map_err(|e| IoError::new(ErrorKind::Other, e))?;
    Ok(TokioRuntimeHandle::new(handle))
}

/// Run a test function using a freshly created tokio runtime.
///
/// # Panics
///
/// Panics if the runtime cannot be created.
pub fn test_with_runtime<P, F, O>(func: P) -> O
where
    P: FnOnce(TokioRuntimeHandle) -> F,
    F: Future<Output = O>,
{
    let runtime = create_runtime().expect("couldn't create a tokio runtime");
    let handle = runtime.handle();
    runtime.block_on(func(handle))
}
