//! Sequential batch processing
//!
//! One run walks a snapshot of the registry in insertion order:
//! 1. Lock the queue against removal, then resolve the destination directory
//! 2. Reset every entry to pending
//! 3. Per file: check for cancellation, resolve DPI, record the destination,
//!    convert while forwarding progress, then classify the outcome
//!
//! Only one engine call is ever outstanding. A file's failure never stops the
//! batch; a cancellation does.

use crate::cancel::CancellationController;
use crate::engine::{Engine, EngineGateway, InMemoryOutput};
use crate::fs::FileSystem;
use crate::options::{ConversionOptions, DEFAULT_DPI, DpiSetting};
use crate::paths;
use crate::registry::SharedRegistry;
use crate::strategy;
use crate::types::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every queued file reached a terminal status
    Finished,
    /// The run stopped early; remaining files were marked cancelled
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Completed,
    Failed,
    Cancelled,
}

pub struct BatchRunner<E, F> {
    gateway: Arc<EngineGateway<E>>,
    fs: Arc<F>,
    registry: SharedRegistry,
    cancellation: CancellationController<E>,
    processing: Arc<AtomicBool>,
    next_job: Arc<AtomicU64>,
}

impl<E, F> Clone for BatchRunner<E, F> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            fs: Arc::clone(&self.fs),
            registry: self.registry.clone(),
            cancellation: self.cancellation.clone(),
            processing: Arc::clone(&self.processing),
            next_job: Arc::clone(&self.next_job),
        }
    }
}

impl<E: Engine, F: FileSystem> BatchRunner<E, F> {
    pub fn new(engine: E, fs: F, registry: SharedRegistry) -> Self {
        Self::with_gateway(Arc::new(EngineGateway::new(engine)), Arc::new(fs), registry)
    }

    pub fn with_gateway(
        gateway: Arc<EngineGateway<E>>,
        fs: Arc<F>,
        registry: SharedRegistry,
    ) -> Self {
        let cancellation = CancellationController::new(Arc::clone(&gateway));
        Self {
            gateway,
            fs,
            registry,
            cancellation,
            processing: Arc::new(AtomicBool::new(false)),
            next_job: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn gateway(&self) -> &Arc<EngineGateway<E>> {
        &self.gateway
    }

    pub fn file_system(&self) -> &Arc<F> {
        &self.fs
    }

    pub fn cancellation(&self) -> CancellationController<E> {
        self.cancellation.clone()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Convert every queued file.
    ///
    /// Refused without touching any file status if a run is already active,
    /// the queue is empty, the options are invalid or no destination is chosen.
    pub async fn run(
        &self,
        options: &ConversionOptions,
    ) -> std::result::Result<RunSummary, RunError> {
        let prepared = self.prepare(options).await?;
        Ok(prepared.execute().await)
    }

    /// Pass every run guard and resolve the destination, without converting.
    ///
    /// From here until the returned [`PreparedRun`] is dropped the registry
    /// rejects remove and clear, including while the directory prompt is open.
    pub async fn prepare(
        &self,
        options: &ConversionOptions,
    ) -> std::result::Result<PreparedRun<'_, E, F>, RunError> {
        let Some(processing) = ProcessingGuard::acquire(&self.processing) else {
            log::warn!("Batch run requested while another is active");
            return Err(RunError::AlreadyRunning);
        };

        options
            .validate()
            .map_err(|e| RunError::InvalidOptions(e.to_string()))?;

        let active = RunActiveGuard::enter(&self.registry);
        let files = self.registry.lock().paths();
        if files.is_empty() {
            return Err(RunError::NoFiles);
        }

        self.cancellation.reset();

        let default_dir = paths::parent_dir(&files[0]);
        let Some(destination_dir) = self.fs.pick_directory(default_dir.as_deref()).await else {
            log::info!("No destination directory chosen, batch not started");
            return Err(RunError::NoDestination);
        };

        self.registry.lock().reset_all();

        Ok(PreparedRun {
            runner: self,
            options: options.clone(),
            files,
            destination_dir,
            _active: active,
            _processing: processing,
        })
    }

    async fn process_file(
        &self,
        path: &Path,
        destination_dir: &Path,
        options: &ConversionOptions,
    ) -> FileOutcome {
        if !self.fs.exists(path).await {
            log::error!("Input file not found: {}", path.display());
            self.update(path, FileStatus::Error, FileUpdate::error("File not found"));
            return FileOutcome::Failed;
        }

        self.update(path, FileStatus::Analyzing, FileUpdate::progress(0));
        let dpi = self.resolve_dpi(path, options).await;

        let save_path = paths::destination_path(destination_dir, path, options.direction);
        log::debug!("Destination for {}: {}", path.display(), save_path.display());
        self.update(
            path,
            FileStatus::Analyzing,
            FileUpdate {
                save_path: Some(save_path.clone()),
                ..Default::default()
            },
        );

        let transfer = strategy::choose(options.direction, options.direct_to_disk);
        let request = ConversionRequest {
            job_id: self.next_job_id(),
            direction: options.direction,
            dpi,
            quality: options.quality,
            lossless: options.lossless,
            transfer,
            destination: (transfer == TransferMode::DirectToDisk).then(|| save_path.clone()),
        };

        self.update(path, FileStatus::Converting, FileUpdate::progress(0));
        log::debug!(
            "Job {:?}: dpi={}, quality={}, lossless={}, transfer={:?}",
            request.job_id,
            request.dpi,
            request.quality,
            request.lossless,
            request.transfer
        );

        match self.execute(path, &save_path, &request).await {
            Ok(converted_size) => {
                if let Some(size) = converted_size {
                    log::info!(
                        "Converted {} -> {} ({:.1} MB)",
                        paths::display_name(path),
                        save_path.display(),
                        size as f64 / 1024.0 / 1024.0
                    );
                }
                self.update(
                    path,
                    FileStatus::Completed,
                    FileUpdate {
                        progress_percent: Some(100),
                        converted_size_bytes: converted_size,
                        ..Default::default()
                    },
                );
                FileOutcome::Completed
            }
            Err(e) if e.is_cancellation() => {
                self.update(path, FileStatus::Cancelled, FileUpdate::progress(0));
                FileOutcome::Cancelled
            }
            Err(e) => {
                log::error!("Conversion failed for {}: {}", path.display(), e);
                self.update(path, FileStatus::Error, FileUpdate::error(e.to_string()));
                FileOutcome::Failed
            }
        }
    }

    async fn resolve_dpi(&self, path: &Path, options: &ConversionOptions) -> u32 {
        match options.dpi {
            DpiSetting::Fixed(dpi) => dpi,
            // Archives are not rasterized, the engine ignores DPI
            DpiSetting::Auto if options.direction == ConversionDirection::ArchiveToPdf => {
                DEFAULT_DPI
            }
            DpiSetting::Auto => match self.gateway.analyze(path).await {
                Ok(analysis) if analysis.native_dpi > 0 => {
                    log::info!(
                        "Detected native DPI {} for {} ({} pages)",
                        analysis.native_dpi,
                        paths::display_name(path),
                        analysis.page_count
                    );
                    analysis.native_dpi
                }
                Ok(_) => {
                    log::warn!("Analysis reported no native DPI, using {DEFAULT_DPI}");
                    DEFAULT_DPI
                }
                Err(e) => {
                    log::warn!(
                        "Analysis failed for {} ({}), using {DEFAULT_DPI} DPI",
                        path.display(),
                        e
                    );
                    DEFAULT_DPI
                }
            },
        }
    }

    /// Run one engine job with its progress subscription open for exactly
    /// the duration of the call
    async fn execute(
        &self,
        path: &Path,
        save_path: &Path,
        request: &ConversionRequest,
    ) -> Result<Option<u64>> {
        let mut subscription = self.gateway.subscribe_progress(request.job_id);

        let result = {
            let call = self.call_engine(path, save_path, request);
            tokio::pin!(call);

            loop {
                tokio::select! {
                    biased;
                    result = &mut call => break result,
                    Some(event) = subscription.recv() => self.forward_progress(path, &event),
                }
            }
        };

        while let Some(event) = subscription.try_recv() {
            self.forward_progress(path, &event);
        }
        drop(subscription);

        result
    }

    async fn call_engine(
        &self,
        path: &Path,
        save_path: &Path,
        request: &ConversionRequest,
    ) -> Result<Option<u64>> {
        match request.transfer {
            TransferMode::DirectToDisk => {
                let size = self.gateway.convert_direct(path, save_path, request).await?;
                Ok(Some(size))
            }
            TransferMode::InMemory => match self.gateway.convert(path, request).await? {
                InMemoryOutput::Bytes(bytes) => {
                    self.fs.write_bytes(save_path, &bytes).await?;
                    Ok(Some(bytes.len() as u64))
                }
                InMemoryOutput::Oversize => {
                    self.gateway.persist_last_result(save_path).await?;
                    Ok(self.fs.file_size(save_path).await.ok())
                }
            },
        }
    }

    fn forward_progress(&self, path: &Path, event: &ProgressEvent) {
        if let Some(message) = &event.message {
            log::debug!("[job {}] {}", event.job_id.0, message);
        }
        if event.phase == ProgressPhase::Error {
            log::warn!("Engine reported an error phase for {}", path.display());
        }

        self.update(
            path,
            FileStatus::Converting,
            FileUpdate {
                progress_percent: Some(event.percent()),
                current_page: event.current_page,
                total_pages: event.total_pages,
                ..Default::default()
            },
        );
    }

    fn update(&self, path: &Path, status: FileStatus, update: FileUpdate) {
        self.registry.lock().update_status(path, status, update);
    }

    fn next_job_id(&self) -> JobId {
        JobId(self.next_job.fetch_add(1, Ordering::SeqCst))
    }

    fn summarize(&self, files: &[PathBuf], outcome: RunOutcome) -> RunSummary {
        let registry = self.registry.lock();
        let mut summary = RunSummary {
            outcome,
            completed: 0,
            failed: 0,
            cancelled: 0,
        };
        for file in files.iter().filter_map(|path| registry.get(path)) {
            match file.status {
                FileStatus::Completed => summary.completed += 1,
                FileStatus::Error => summary.failed += 1,
                FileStatus::Cancelled => summary.cancelled += 1,
                _ => {}
            }
        }
        summary
    }
}

/// A run whose guards have passed and whose destination is known
pub struct PreparedRun<'a, E, F> {
    runner: &'a BatchRunner<E, F>,
    options: ConversionOptions,
    files: Vec<PathBuf>,
    destination_dir: PathBuf,
    _active: RunActiveGuard<'a>,
    _processing: ProcessingGuard<'a>,
}

impl<E: Engine, F: FileSystem> PreparedRun<'_, E, F> {
    /// Number of files this run will walk
    pub fn total(&self) -> usize {
        self.files.len()
    }

    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    pub async fn execute(self) -> RunSummary {
        let runner = self.runner;
        let files = &self.files;

        log::info!(
            "Starting {} batch of {} files into {}",
            self.options.direction.name(),
            files.len(),
            self.destination_dir.display()
        );

        let mut outcome = RunOutcome::Finished;
        for (index, path) in files.iter().enumerate() {
            if runner.cancellation.is_cancel_requested() {
                let skipped = runner.registry.lock().cancel_pending(&files[index..]);
                log::info!("Batch cancelled, {skipped} files skipped");
                outcome = RunOutcome::Cancelled;
                break;
            }

            log::info!(
                "Processing file {}/{}: {}",
                index + 1,
                files.len(),
                paths::display_name(path)
            );

            let result = runner
                .process_file(path, &self.destination_dir, &self.options)
                .await;
            if result == FileOutcome::Cancelled {
                runner.cancellation.mark_cancelled();
                let skipped = runner.registry.lock().cancel_pending(&files[index + 1..]);
                log::info!("Conversion cancelled, stopping batch ({skipped} files skipped)");
                outcome = RunOutcome::Cancelled;
                break;
            }
        }

        let summary = runner.summarize(files, outcome);
        log::info!(
            "Batch finished: {} completed, {} failed, {} cancelled",
            summary.completed,
            summary.failed,
            summary.cancelled
        );
        summary
    }
}

/// Holds the single-run flag; released on every exit path
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
        log::debug!("Batch processing flag cleared");
    }
}

/// Marks the registry as in use by a run, which rejects remove and clear
struct RunActiveGuard<'a>(&'a SharedRegistry);

impl<'a> RunActiveGuard<'a> {
    fn enter(registry: &'a SharedRegistry) -> Self {
        registry.lock().set_run_active(true);
        Self(registry)
    }
}

impl Drop for RunActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().set_run_active(false);
    }
}
