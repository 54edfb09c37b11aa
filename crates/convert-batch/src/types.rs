use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures reported by an engine call.
///
/// `Cancelled` is the only variant that stops a batch; everything else is
/// recorded on the file and the batch moves on.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Conversion cancelled")]
    Cancelled,
    #[error("Conversion already in progress")]
    AlreadyInProgress,
    #[error("{0}")]
    Failed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

/// Reasons a run is refused before any file is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("A batch conversion is already running")]
    AlreadyRunning,
    #[error("No files to convert")]
    NoFiles,
    #[error("No destination directory selected")]
    NoDestination,
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse options: {0}")]
    Parse(String),
    #[error("Invalid options: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Which way a batch converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ConversionDirection {
    /// Paginated document to page-image archive (PDF → CBZ)
    #[default]
    PdfToArchive,
    /// Page-image archive to paginated document (CBZ/CBR → PDF)
    ArchiveToPdf,
}

impl ConversionDirection {
    /// Extensions accepted as input, lowercase, without the dot
    pub fn source_extensions(self) -> &'static [&'static str] {
        match self {
            ConversionDirection::PdfToArchive => &["pdf"],
            ConversionDirection::ArchiveToPdf => &["cbz", "cbr"],
        }
    }

    /// Extension of produced files, without the dot
    pub fn target_extension(self) -> &'static str {
        match self {
            ConversionDirection::PdfToArchive => "cbz",
            ConversionDirection::ArchiveToPdf => "pdf",
        }
    }

    /// Whether `path` has an input extension for this direction
    pub fn accepts(self, path: impl AsRef<Path>) -> bool {
        let name = crate::paths::display_name(path.as_ref()).to_ascii_lowercase();
        self.source_extensions()
            .iter()
            .any(|ext| name.ends_with(&format!(".{ext}")))
    }

    pub fn name(self) -> &'static str {
        match self {
            ConversionDirection::PdfToArchive => "PDF → CBZ",
            ConversionDirection::ArchiveToPdf => "CBZ → PDF",
        }
    }
}

/// How the engine hands back its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferMode {
    /// Bytes come back through the call channel and the caller writes them
    InMemory,
    /// The engine writes the output itself and returns only its size
    DirectToDisk,
}

/// Lifecycle of a queued file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FileStatus {
    #[default]
    Pending,
    Analyzing,
    Converting,
    Completed,
    Error,
    Cancelled,
}

impl FileStatus {
    /// Analyzing or converting
    pub fn is_active(self) -> bool {
        matches!(self, FileStatus::Analyzing | FileStatus::Converting)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FileStatus::Completed | FileStatus::Error | FileStatus::Cancelled
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Analyzing => "analyzing",
            FileStatus::Converting => "converting",
            FileStatus::Completed => "completed",
            FileStatus::Error => "error",
            FileStatus::Cancelled => "cancelled",
        }
    }
}

/// One entry in the conversion queue
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchFile {
    pub path: PathBuf,
    pub display_name: String,
    pub status: FileStatus,
    pub progress_percent: u8,
    pub current_page: Option<u32>,
    pub total_pages: Option<u32>,
    pub source_size_bytes: Option<u64>,
    pub converted_size_bytes: Option<u64>,
    pub save_path: Option<PathBuf>,
    pub error_message: Option<String>,
}

impl BatchFile {
    pub fn new(descriptor: FileDescriptor) -> Self {
        let display_name = crate::paths::display_name(&descriptor.path);
        Self {
            path: descriptor.path,
            display_name,
            status: FileStatus::Pending,
            progress_percent: 0,
            current_page: None,
            total_pages: None,
            source_size_bytes: descriptor.size_bytes,
            converted_size_bytes: None,
            save_path: None,
            error_message: None,
        }
    }
}

/// A candidate file coming from a picker or a drop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub size_bytes: Option<u64>,
}

impl FileDescriptor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            size_bytes: None,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }
}

/// Partial update applied by [`crate::FileRegistry::update_status`].
///
/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileUpdate {
    pub progress_percent: Option<u8>,
    pub current_page: Option<u32>,
    pub total_pages: Option<u32>,
    pub converted_size_bytes: Option<u64>,
    pub save_path: Option<PathBuf>,
    pub error_message: Option<String>,
}

impl FileUpdate {
    pub fn progress(percent: u8) -> Self {
        Self {
            progress_percent: Some(percent),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Identifies one engine job so progress events can be routed to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JobId(pub u64);

/// Stage reported alongside a progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ProgressPhase {
    Processing,
    Finalizing,
    Completed,
    Error,
}

/// Progress broadcast by the engine while a job runs
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub current_page: Option<u32>,
    pub total_pages: Option<u32>,
    pub percentage: f32,
    pub phase: ProgressPhase,
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn new(job_id: JobId, percentage: f32) -> Self {
        Self {
            job_id,
            current_page: None,
            total_pages: None,
            percentage,
            phase: ProgressPhase::Processing,
            message: None,
        }
    }

    pub fn with_pages(mut self, current_page: u32, total_pages: u32) -> Self {
        self.current_page = Some(current_page);
        self.total_pages = Some(total_pages);
        self
    }

    pub fn with_phase(mut self, phase: ProgressPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Percentage clamped to 0..=100 and rounded
    pub fn percent(&self) -> u8 {
        if self.percentage.is_nan() {
            return 0;
        }
        self.percentage.clamp(0.0, 100.0).round() as u8
    }
}

/// What the engine reports about a source document
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisResult {
    pub page_count: u32,
    pub recommended_dpi: u32,
    pub native_dpi: u32,
    pub size_mb: f64,
}

/// Parameters passed to the engine for a single job
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub job_id: JobId,
    pub direction: ConversionDirection,
    pub dpi: u32,
    pub quality: u8,
    pub lossless: bool,
    pub transfer: TransferMode,
    pub destination: Option<PathBuf>,
}
