//! Typed access to the external conversion engine
//!
//! The engine itself (rasterization, image codecs, archive packing) lives
//! behind the [`Engine`] trait. [`EngineGateway`] wraps it with the guards the
//! batch runner relies on:
//! - at most one direct-to-disk conversion in flight
//! - oversize in-memory results are surfaced as [`InMemoryOutput::Oversize`]
//! - progress subscriptions only yield events for the job they were opened for

use crate::types::*;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast};

/// Returned by an in-memory convert when the result is too large for the
/// call channel. The real output must then be fetched with
/// [`Engine::persist_last_result`].
pub const OVERSIZE_SENTINEL: [u8; 4] = [0xFF, 0xFE, 0xFD, 0xFC];

const PROGRESS_CAPACITY: usize = 256;

pub fn is_oversize_sentinel(bytes: &[u8]) -> bool {
    bytes == OVERSIZE_SENTINEL
}

/// Operations the external engine exposes.
///
/// Implementations are expected to run one job at a time and to tag every
/// progress event with the `job_id` of the request that produced it.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    async fn analyze(&self, path: &Path) -> Result<AnalysisResult>;

    async fn convert(&self, path: &Path, request: &ConversionRequest) -> Result<Vec<u8>>;

    /// Write the output to `destination` and return its size in bytes
    async fn convert_direct(
        &self,
        path: &Path,
        destination: &Path,
        request: &ConversionRequest,
    ) -> Result<u64>;

    async fn persist_last_result(&self, destination: &Path) -> Result<()>;

    /// Best effort; the running job may still finish normally
    async fn cancel(&self) -> Result<()>;

    fn progress(&self) -> &ProgressChannel;
}

/// Broadcast channel the engine publishes progress on
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    sender: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new(PROGRESS_CAPACITY)
    }
}

impl ProgressChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Events with no listener are dropped.
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self, job_id: JobId) -> ProgressSubscription {
        ProgressSubscription {
            receiver: self.sender.subscribe(),
            job_id,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Progress listener scoped to one job. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ProgressSubscription {
    receiver: broadcast::Receiver<ProgressEvent>,
    job_id: JobId,
}

impl ProgressSubscription {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Wait for the next event belonging to this job.
    ///
    /// Returns `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.job_id == self.job_id => return Some(event),
                Ok(event) => {
                    log::debug!(
                        "Ignoring progress for job {:?} while listening for {:?}",
                        event.job_id,
                        self.job_id
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Progress listener lagged, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-buffered event for this job, without waiting
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.job_id == self.job_id => return Some(event),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Result of an in-memory conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InMemoryOutput {
    Bytes(Vec<u8>),
    /// The engine kept the output; persist it with
    /// [`EngineGateway::persist_last_result`]
    Oversize,
}

pub struct EngineGateway<E> {
    engine: Arc<E>,
    direct_permit: Arc<Semaphore>,
}

impl<E: Engine> EngineGateway<E> {
    pub fn new(engine: E) -> Self {
        Self::from_arc(Arc::new(engine))
    }

    pub fn from_arc(engine: Arc<E>) -> Self {
        Self {
            engine,
            direct_permit: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub async fn analyze(&self, path: &Path) -> Result<AnalysisResult> {
        self.engine.analyze(path).await
    }

    pub async fn convert(&self, path: &Path, request: &ConversionRequest) -> Result<InMemoryOutput> {
        let bytes = self.engine.convert(path, request).await?;
        if is_oversize_sentinel(&bytes) {
            log::info!("Engine kept oversize output for {}", path.display());
            return Ok(InMemoryOutput::Oversize);
        }
        Ok(InMemoryOutput::Bytes(bytes))
    }

    /// Fails with [`EngineError::AlreadyInProgress`] if another direct
    /// conversion has not settled yet
    pub async fn convert_direct(
        &self,
        path: &Path,
        destination: &Path,
        request: &ConversionRequest,
    ) -> Result<u64> {
        let _permit = self.direct_permit.clone().try_acquire_owned().map_err(|_| {
            log::error!("Direct conversion already in progress, refusing {}", path.display());
            EngineError::AlreadyInProgress
        })?;

        self.engine.convert_direct(path, destination, request).await
    }

    pub async fn persist_last_result(&self, destination: &Path) -> Result<()> {
        self.engine.persist_last_result(destination).await
    }

    pub async fn cancel(&self) -> Result<()> {
        self.engine.cancel().await
    }

    pub fn subscribe_progress(&self, job_id: JobId) -> ProgressSubscription {
        self.engine.progress().subscribe(job_id)
    }

    pub fn direct_in_progress(&self) -> bool {
        self.direct_permit.available_permits() == 0
    }
}
