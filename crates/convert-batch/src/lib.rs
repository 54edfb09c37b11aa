pub mod cancel;
pub mod engine;
pub mod fs;
mod options;
pub mod paths;
mod registry;
mod runner;
pub mod strategy;
mod types;

pub use cancel::CancellationController;
pub use engine::{
    Engine, EngineGateway, InMemoryOutput, OVERSIZE_SENTINEL, ProgressChannel,
    ProgressSubscription, is_oversize_sentinel,
};
pub use fs::{FileSystem, LocalFileSystem};
pub use options::*;
pub use registry::{FileRegistry, RegistryEvent, RegistryStats, SharedRegistry};
pub use runner::{BatchRunner, PreparedRun, RunOutcome, RunSummary};
pub use types::*;
