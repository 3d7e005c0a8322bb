//! # Main Execution Context
//!
//! Game state is owned by a single logical "main" context. Code that
//! touches it must run while holding the main token; auxiliary work may
//! run concurrently but has to hop back onto the token before touching
//! shared state again.
//!
//! The token is a FIFO-fair async mutex, so hopping onto the main context
//! is a queue-hop: the caller suspends until every earlier arrival has
//! left. A task-local marker records that the current task already runs
//! on the main context, which keeps nested dispatches re-entrant.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

tokio::task_local! {
    static ON_MAIN: bool;
}

/// Handle to the main execution context. Cheap to clone; clones share the
/// same token.
#[derive(Debug, Clone, Default)]
pub struct MainContext {
    token: Arc<Mutex<()>>,
}

/// Proof of holding the main context. Released on drop.
#[derive(Debug)]
pub struct MainGuard {
    _token: OwnedMutexGuard<()>,
}

impl MainContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the calling task is currently running on the main context.
    pub fn is_current() -> bool {
        ON_MAIN.try_with(|on_main| *on_main).unwrap_or(false)
    }

    /// Whether any task holds the main token right now.
    pub fn is_held(&self) -> bool {
        self.token.try_lock().is_err()
    }

    /// Suspends until the main token is available and takes it.
    ///
    /// Callers already running on the main context must not call this
    /// (it would wait on themselves); use [`MainContext::run`] instead.
    pub async fn enter(&self) -> MainGuard {
        MainGuard {
            _token: self.token.clone().lock_owned().await,
        }
    }

    /// Runs `fut` on the main context, hopping onto it first unless the
    /// caller is already there.
    pub async fn run<F: Future>(&self, fut: F) -> F::Output {
        if Self::is_current() {
            return fut.await;
        }
        let _guard = self.enter().await;
        ON_MAIN.scope(true, fut).await
    }

    pub(crate) async fn scope<F: Future>(on_main: bool, fut: F) -> F::Output {
        ON_MAIN.scope(on_main, fut).await
    }

    pub(crate) fn sync_scope<R>(on_main: bool, f: impl FnOnce() -> R) -> R {
        ON_MAIN.sync_scope(on_main, f)
    }
}
