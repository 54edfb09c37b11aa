use crate::{BatchCommand, BatchUpdate};
use convert_batch::{
    BatchRunner, ConversionDirection, ConversionOptions, Engine, FileDescriptor, FileSystem,
    RunError, RunSummary,
};
use std::path::PathBuf;
use tokio::sync::mpsc;

type RunResult = Result<RunSummary, RunError>;

/// Reported by a spawned run back to the worker loop
#[derive(Debug)]
enum RunEvent {
    /// Guards passed and the destination is known
    Started { total: usize },
    Settled(RunResult),
}

#[derive(Debug, Default)]
struct WorkerState {
    direction: ConversionDirection,
    run_in_flight: bool,
}

/// Async worker task that owns the batch runner and processes UI commands.
///
/// Registry changes are forwarded in the order they happen. A run executes on
/// its own task so `Cancel` is still received while it is active. Returns once
/// the command channel is closed and any in-flight run has settled.
pub async fn worker_task<E: Engine, F: FileSystem>(
    runner: BatchRunner<E, F>,
    mut command_rx: mpsc::UnboundedReceiver<BatchCommand>,
    update_tx: mpsc::UnboundedSender<BatchUpdate>,
) {
    let mut registry_rx = runner.registry().lock().subscribe();
    let (run_tx, mut run_rx) = mpsc::unbounded_channel::<RunEvent>();
    let mut state = WorkerState::default();
    let mut commands_open = true;

    while commands_open || state.run_in_flight {
        tokio::select! {
            biased;
            Some(event) = registry_rx.recv() => {
                let _ = update_tx.send(BatchUpdate::Registry(event));
            }
            Some(event) = run_rx.recv() => match event {
                RunEvent::Started { total } => {
                    let _ = update_tx.send(BatchUpdate::RunStarted { total });
                }
                RunEvent::Settled(result) => {
                    state.run_in_flight = false;
                    report_run(result, &update_tx);
                }
            },
            cmd = command_rx.recv(), if commands_open => match cmd {
                Some(cmd) => process_command(cmd, &runner, &mut state, &run_tx, &update_tx).await,
                None => commands_open = false,
            },
            else => break,
        }
    }

    // Anything the last command or run produced
    while let Ok(event) = registry_rx.try_recv() {
        let _ = update_tx.send(BatchUpdate::Registry(event));
    }
    log::debug!("Batch worker stopped");
}

async fn process_command<E: Engine, F: FileSystem>(
    cmd: BatchCommand,
    runner: &BatchRunner<E, F>,
    state: &mut WorkerState,
    run_tx: &mpsc::UnboundedSender<RunEvent>,
    update_tx: &mpsc::UnboundedSender<BatchUpdate>,
) {
    match cmd {
        BatchCommand::AddFiles { paths } => {
            handle_add_files(paths, runner, state.direction, update_tx).await;
        }
        BatchCommand::RemoveFile { path } => {
            if !runner.registry().lock().remove(&path) {
                send_error(
                    update_tx,
                    format!("Cannot remove {} right now", path.display()),
                );
            }
        }
        BatchCommand::ClearFiles => {
            if !runner.registry().lock().clear() {
                send_error(update_tx, "Cannot clear the queue while a batch is running");
            }
        }
        BatchCommand::ResetAll => {
            if state.run_in_flight {
                send_error(update_tx, "Cannot reset while a batch is running");
            } else {
                runner.registry().lock().reset_all();
            }
        }
        BatchCommand::SetDirection { direction } => {
            handle_set_direction(direction, runner, state, update_tx);
        }
        BatchCommand::Start { options } => {
            handle_start(options, runner, state, run_tx, update_tx);
        }
        BatchCommand::Cancel => {
            if state.run_in_flight {
                // The engine call runs on its own task so forwarding never stalls
                runner.cancellation().request_cancel_detached();
            } else {
                log::debug!("Cancel ignored, no batch is running");
            }
        }
    }
}

async fn handle_add_files<E: Engine, F: FileSystem>(
    paths: Vec<PathBuf>,
    runner: &BatchRunner<E, F>,
    direction: ConversionDirection,
    update_tx: &mpsc::UnboundedSender<BatchUpdate>,
) {
    let offered = paths.len();
    let mut candidates = Vec::with_capacity(offered);

    for path in paths {
        if !direction.accepts(&path) {
            log::debug!("Skipping {}, not a {} input", path.display(), direction.name());
            continue;
        }
        let size = runner.file_system().file_size(&path).await.ok();
        let descriptor = FileDescriptor::new(path);
        candidates.push(match size {
            Some(size) => descriptor.with_size(size),
            None => descriptor,
        });
    }

    let added = runner.registry().lock().add(candidates);
    let skipped = offered - added;
    log::info!("Queued {added} files ({skipped} skipped)");
    let _ = update_tx.send(BatchUpdate::FilesAdded { added, skipped });
}

fn handle_set_direction<E: Engine, F: FileSystem>(
    direction: ConversionDirection,
    runner: &BatchRunner<E, F>,
    state: &mut WorkerState,
    update_tx: &mpsc::UnboundedSender<BatchUpdate>,
) {
    if state.run_in_flight {
        send_error(update_tx, "Cannot change direction while a batch is running");
        return;
    }
    if direction == state.direction {
        return;
    }

    // Queued inputs belong to the old direction
    runner.registry().lock().clear();
    state.direction = direction;
    log::info!("Conversion direction set to {}", direction.name());
    let _ = update_tx.send(BatchUpdate::DirectionChanged { direction });
}

fn handle_start<E: Engine, F: FileSystem>(
    mut options: ConversionOptions,
    runner: &BatchRunner<E, F>,
    state: &mut WorkerState,
    run_tx: &mpsc::UnboundedSender<RunEvent>,
    update_tx: &mpsc::UnboundedSender<BatchUpdate>,
) {
    if state.run_in_flight {
        let _ = update_tx.send(BatchUpdate::RunRejected {
            reason: RunError::AlreadyRunning,
        });
        return;
    }

    if options.direction != state.direction {
        log::warn!(
            "Start requested for {} while the queue holds {} inputs, using {}",
            options.direction.name(),
            state.direction.name(),
            state.direction.name()
        );
        options.direction = state.direction;
    }

    state.run_in_flight = true;

    let runner = runner.clone();
    let run_tx = run_tx.clone();
    tokio::spawn(async move {
        let result = match runner.prepare(&options).await {
            Ok(run) => {
                let _ = run_tx.send(RunEvent::Started { total: run.total() });
                Ok(run.execute().await)
            }
            Err(reason) => Err(reason),
        };
        let _ = run_tx.send(RunEvent::Settled(result));
    });
}

fn report_run(result: RunResult, update_tx: &mpsc::UnboundedSender<BatchUpdate>) {
    match result {
        Ok(summary) => {
            let _ = update_tx.send(BatchUpdate::RunFinished { summary });
        }
        Err(reason) => {
            log::warn!("Batch run rejected: {}", reason);
            let _ = update_tx.send(BatchUpdate::RunRejected { reason });
        }
    }
}

fn send_error(update_tx: &mpsc::UnboundedSender<BatchUpdate>, message: impl Into<String>) {
    let message = message.into();
    log::warn!("{}", message);
    let _ = update_tx.send(BatchUpdate::Error { message });
}
