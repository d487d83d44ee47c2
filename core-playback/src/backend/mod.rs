//! # Backends
//!
//! The two [`BackendAdapter`] implementations and the tagged variant the
//! orchestrator keeps for the active one.
//!
//! Both backends follow the same shape: the adapter methods push a job onto
//! an unbounded queue and return; a single worker task owns the native
//! player, creates it, drains the queue in issue order and tears the player
//! down when cancelled. Native callbacks are turned into jobs on the same
//! queue, so the worker is the only code that ever touches the player.

mod fallback;
mod primary;

pub use fallback::FallbackBackend;
pub use primary::PrimaryBackend;

use crate::bridge::BridgeEmitter;
use crate::config::PlaybackConfig;
use crate::error::BackendFailure;
use crate::traits::{BackendAdapter, BackendKind};
use crate::tracks::TrackRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Callback receiving failures raised by a backend. Must not block.
pub type FailureReporter = Arc<dyn Fn(BackendFailure) + Send + Sync>;

/// Everything a backend worker needs from the engine.
#[derive(Clone)]
pub struct BackendContext {
    pub emitter: BridgeEmitter,
    pub tracks: Arc<TrackRegistry>,
    pub config: Arc<PlaybackConfig>,
    pub failures: FailureReporter,
}

impl BackendContext {
    pub fn report(&self, failure: BackendFailure) {
        (self.failures)(failure);
    }
}

/// Worker task handle shared by both backends.
pub(crate) struct WorkerHandle {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    pub(crate) fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels the worker and waits for it to release the native player.
    /// Later calls return immediately.
    pub(crate) async fn shutdown(&self, kind: BackendKind) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                debug!(backend = %kind, error = %e, "Backend worker ended abnormally");
            }
        }
    }
}

/// The backend currently owned by the orchestrator.
#[derive(Clone)]
pub enum ActiveBackend {
    Primary(Arc<PrimaryBackend>),
    Fallback(Arc<FallbackBackend>),
}

impl ActiveBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            ActiveBackend::Primary(_) => BackendKind::Primary,
            ActiveBackend::Fallback(_) => BackendKind::Fallback,
        }
    }

    pub fn adapter(&self) -> &dyn BackendAdapter {
        match self {
            ActiveBackend::Primary(backend) => backend.as_ref(),
            ActiveBackend::Fallback(backend) => backend.as_ref(),
        }
    }
}
