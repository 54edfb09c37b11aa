use crate::engine::{Engine, EngineGateway};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative stop signal for a batch.
///
/// The runner only checks the flag between files, so a file that is already
/// converting runs to completion unless the engine honours its own cancel.
pub struct CancellationController<E> {
    flag: Arc<AtomicBool>,
    gateway: Arc<EngineGateway<E>>,
}

impl<E> Clone for CancellationController<E> {
    fn clone(&self) -> Self {
        Self {
            flag: Arc::clone(&self.flag),
            gateway: Arc::clone(&self.gateway),
        }
    }
}

impl<E: Engine> CancellationController<E> {
    pub fn new(gateway: Arc<EngineGateway<E>>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            gateway,
        }
    }

    /// Raise the flag and ask the engine to abort its current job.
    ///
    /// Engine errors are logged, never returned.
    pub async fn request_cancel(&self) {
        self.raise();
        cancel_engine(&self.gateway).await;
    }

    /// Raise the flag now and ask the engine to abort on its own task, so the
    /// caller never waits on the engine
    pub fn request_cancel_detached(&self) -> tokio::task::JoinHandle<()> {
        self.raise();
        let gateway = Arc::clone(&self.gateway);
        tokio::spawn(async move { cancel_engine(&gateway).await })
    }

    fn raise(&self) {
        log::info!("Cancellation requested");
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Raise the flag without calling the engine
    pub(crate) fn mark_cancelled(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub(crate) fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

async fn cancel_engine<E: Engine>(gateway: &EngineGateway<E>) {
    if let Err(e) = gateway.cancel().await {
        log::error!("Failed to cancel conversion: {}", e);
    }
}
