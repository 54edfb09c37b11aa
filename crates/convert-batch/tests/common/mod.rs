#![allow(dead_code)]

use async_trait::async_trait;
use convert_batch::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Engine call as seen by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Analyze(PathBuf),
    Convert { path: PathBuf, dpi: u32 },
    ConvertDirect { path: PathBuf, destination: PathBuf, dpi: u32 },
    Persist(PathBuf),
    Cancel,
}

#[derive(Debug, Clone)]
pub enum Failure {
    Failed(String),
    Cancelled,
}

/// Lets a test pause a conversion mid-flight
#[derive(Clone, Default)]
pub struct Hold {
    pub started: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    native_dpi: HashMap<PathBuf, u32>,
    failures: HashMap<PathBuf, Failure>,
    oversize: HashSet<PathBuf>,
    holds: HashMap<PathBuf, Hold>,
    honours_cancel: bool,
    cancel_requested: bool,
    emit_stray_events: bool,
    persisted: Vec<PathBuf>,
}

/// Scripted stand-in for the conversion engine
pub struct MockEngine {
    progress: ProgressChannel,
    state: Mutex<MockState>,
    output: Vec<u8>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            progress: ProgressChannel::default(),
            state: Mutex::new(MockState::default()),
            output: b"PK\x03\x04converted".to_vec(),
        }
    }
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn set_native_dpi(&self, path: impl Into<PathBuf>, dpi: u32) {
        self.state.lock().unwrap().native_dpi.insert(path.into(), dpi);
    }

    pub fn fail(&self, path: impl Into<PathBuf>, failure: Failure) {
        self.state.lock().unwrap().failures.insert(path.into(), failure);
    }

    pub fn return_oversize(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().oversize.insert(path.into());
    }

    pub fn hold(&self, path: impl Into<PathBuf>) -> Hold {
        let hold = Hold::default();
        self.state
            .lock()
            .unwrap()
            .holds
            .insert(path.into(), hold.clone());
        hold
    }

    pub fn honour_cancel(&self) {
        self.state.lock().unwrap().honours_cancel = true;
    }

    /// Also emit events tagged with a job nobody is waiting for
    pub fn emit_stray_events(&self) {
        self.state.lock().unwrap().emit_stray_events = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn persisted(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().persisted.clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.calls().iter().filter(|c| **c == Call::Cancel).count()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    async fn run_job(&self, path: &Path, request: &ConversionRequest) -> Result<()> {
        let (stray, hold) = {
            let state = self.state.lock().unwrap();
            (state.emit_stray_events, state.holds.get(path).cloned())
        };

        for (page, percentage) in [(1, 10.0), (5, 50.0)] {
            self.progress
                .emit(ProgressEvent::new(request.job_id, percentage).with_pages(page, 10));
            if stray {
                self.progress.emit(ProgressEvent::new(JobId(u64::MAX), 99.0));
            }
        }

        if let Some(hold) = hold {
            hold.started.notify_one();
            hold.release.notified().await;
        }

        self.progress.emit(
            ProgressEvent::new(request.job_id, 90.0)
                .with_pages(10, 10)
                .with_phase(ProgressPhase::Finalizing)
                .with_message("Packing archive"),
        );

        let state = self.state.lock().unwrap();
        if state.honours_cancel && state.cancel_requested {
            return Err(EngineError::Cancelled);
        }
        match state.failures.get(path) {
            Some(Failure::Failed(message)) => Err(EngineError::Failed(message.clone())),
            Some(Failure::Cancelled) => Err(EngineError::Cancelled),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Engine for MockEngine {
    async fn analyze(&self, path: &Path) -> Result<AnalysisResult> {
        self.record(Call::Analyze(path.to_path_buf()));
        let native = self.state.lock().unwrap().native_dpi.get(path).copied();
        match native {
            Some(native_dpi) => Ok(AnalysisResult {
                page_count: 10,
                recommended_dpi: 200,
                native_dpi,
                size_mb: 1.5,
            }),
            None => Err(EngineError::Failed("PDF file not found".to_string())),
        }
    }

    async fn convert(&self, path: &Path, request: &ConversionRequest) -> Result<Vec<u8>> {
        self.record(Call::Convert {
            path: path.to_path_buf(),
            dpi: request.dpi,
        });
        self.run_job(path, request).await?;
        if self.state.lock().unwrap().oversize.contains(path) {
            return Ok(OVERSIZE_SENTINEL.to_vec());
        }
        Ok(self.output.clone())
    }

    async fn convert_direct(
        &self,
        path: &Path,
        destination: &Path,
        request: &ConversionRequest,
    ) -> Result<u64> {
        self.record(Call::ConvertDirect {
            path: path.to_path_buf(),
            destination: destination.to_path_buf(),
            dpi: request.dpi,
        });
        self.run_job(path, request).await?;
        Ok(self.output.len() as u64)
    }

    async fn persist_last_result(&self, destination: &Path) -> Result<()> {
        self.record(Call::Persist(destination.to_path_buf()));
        self.state
            .lock()
            .unwrap()
            .persisted
            .push(destination.to_path_buf());
        Ok(())
    }

    async fn cancel(&self) -> Result<()> {
        self.record(Call::Cancel);
        self.state.lock().unwrap().cancel_requested = true;
        Ok(())
    }

    fn progress(&self) -> &ProgressChannel {
        &self.progress
    }
}

/// In-memory file system with a fixed destination answer
#[derive(Default)]
pub struct MemoryFs {
    destination: Option<PathBuf>,
    missing: Mutex<HashSet<PathBuf>>,
    written: Mutex<HashMap<PathBuf, Vec<u8>>>,
    sizes: Mutex<HashMap<PathBuf, u64>>,
    on_pick: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl MemoryFs {
    pub fn with_destination(destination: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            destination: Some(destination.into()),
            ..Default::default()
        })
    }

    pub fn without_destination() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run `action` while the destination prompt is open
    pub fn on_pick(&self, action: impl FnOnce() + Send + 'static) {
        *self.on_pick.lock().unwrap() = Some(Box::new(action));
    }

    pub fn mark_missing(&self, path: impl Into<PathBuf>) {
        self.missing.lock().unwrap().insert(path.into());
    }

    pub fn set_size(&self, path: impl Into<PathBuf>, size: u64) {
        self.sizes.lock().unwrap().insert(path.into(), size);
    }

    pub fn written(&self, path: &Path) -> Option<Vec<u8>> {
        self.written.lock().unwrap().get(path).cloned()
    }

    pub fn written_count(&self) -> usize {
        self.written.lock().unwrap().len()
    }
}

#[async_trait]
impl FileSystem for MemoryFs {
    async fn pick_directory(&self, _default: Option<&Path>) -> Option<PathBuf> {
        let action = self.on_pick.lock().unwrap().take();
        if let Some(action) = action {
            action();
        }
        self.destination.clone()
    }

    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        self.written
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    async fn file_size(&self, path: &Path) -> std::io::Result<u64> {
        if let Some(bytes) = self.written.lock().unwrap().get(path) {
            return Ok(bytes.len() as u64);
        }
        self.sizes
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
    }

    async fn exists(&self, path: &Path) -> bool {
        !self.missing.lock().unwrap().contains(path)
    }
}

pub fn runner(
    engine: &Arc<MockEngine>,
    fs: &Arc<MemoryFs>,
) -> BatchRunner<MockEngine, MemoryFs> {
    BatchRunner::with_gateway(
        Arc::new(EngineGateway::from_arc(Arc::clone(engine))),
        Arc::clone(fs),
        SharedRegistry::new(),
    )
}

pub fn queue(runner: &BatchRunner<MockEngine, MemoryFs>, paths: &[&str]) {
    runner
        .registry()
        .lock()
        .add(paths.iter().map(|p| FileDescriptor::new(*p)));
}

pub fn status_of(runner: &BatchRunner<MockEngine, MemoryFs>, path: &str) -> FileStatus {
    runner
        .registry()
        .get(Path::new(path))
        .map(|f| f.status)
        .unwrap_or_else(|| panic!("{path} not queued"))
}

/// Every event currently buffered on the receiver
pub fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<RegistryEvent>) -> Vec<RegistryEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
