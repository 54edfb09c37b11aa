use std::path::PathBuf;

mod worker;

pub use worker::worker_task;

// Re-export types from the library crate
pub use convert_batch::{
    BatchFile, ConversionDirection, ConversionOptions, RegistryEvent, RegistryStats, RunError,
    RunOutcome, RunSummary,
};

/// Commands sent from UI to worker
#[derive(Debug)]
pub enum BatchCommand {
    /// Queue picked or dropped files. Paths the current direction does not
    /// accept are skipped.
    AddFiles {
        paths: Vec<PathBuf>,
    },
    RemoveFile {
        path: PathBuf,
    },
    ClearFiles,
    /// Put every entry back to pending so the batch can be run again
    ResetAll,
    /// Switch conversion direction; clears the queue
    SetDirection {
        direction: ConversionDirection,
    },
    Start {
        options: ConversionOptions,
    },
    Cancel,
}

/// Updates sent from worker to UI
#[derive(Debug, Clone)]
pub enum BatchUpdate {
    /// A change to the queue, in the order it happened
    Registry(RegistryEvent),
    FilesAdded {
        added: usize,
        skipped: usize,
    },
    DirectionChanged {
        direction: ConversionDirection,
    },
    RunStarted {
        total: usize,
    },
    RunFinished {
        summary: RunSummary,
    },
    /// The run never started
    RunRejected {
        reason: RunError,
    },
    Error {
        message: String,
    },
}
