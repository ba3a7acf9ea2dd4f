#![forbid(unsafe_code)]

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle;

use crate::error::{ExecError, Result, Status};

/// Executes units of work submitted by the scheduler.
pub trait TaskRunner: Send + Sync {
    /// Starts `work` and returns a handle resolving to its status.
    ///
    /// The work must be driven to completion even if the returned handle is
    /// dropped; the scheduler never awaits the handles of the operators it
    /// dispatches.
    fn submit(&self, work: BoxFuture<'static, Status>) -> BoxFuture<'static, Status>;
}

/// [`TaskRunner`] backed by a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioRunner {
    handle: Handle,
}

impl TokioRunner {
    /// Runner spawning onto `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Runner for the runtime the caller is executing on.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|err| ExecError::Runner(err.to_string()))
    }
}

impl TaskRunner for TokioRunner {
    fn submit(&self, work: BoxFuture<'static, Status>) -> BoxFuture<'static, Status> {
        let task = self.handle.spawn(work);
        async move {
            task.await
                .unwrap_or_else(|err| Err(ExecError::Runner(err.to_string())))
        }
        .boxed()
    }
}
