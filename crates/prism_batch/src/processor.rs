use std::{
    any::Any,
    path::{Path, PathBuf},
    sync::Arc,
};

use prism_assets::SceneIo;
use prism_core::{Error, OptimizationProfile, Result, Statistics};
use prism_optimize::SceneOptimizer;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::{BatchControl, BatchEvent, BatchState, output_path};

/// An item that was attempted and skipped.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BatchSummary {
    pub state: BatchState,
    /// Output files written, in input order.
    pub exported: Vec<PathBuf>,
    pub failures: Vec<BatchFailure>,
}

/// Runs import, optimize and export over a list of scene files, one file at
/// a time.
pub struct BatchProcessor {
    io: Arc<dyn SceneIo>,
    events: UnboundedSender<BatchEvent>,
    control: BatchControl,
}

impl BatchProcessor {
    pub fn new(io: Arc<dyn SceneIo>) -> (Self, UnboundedReceiver<BatchEvent>) {
        let (events, receiver) = unbounded_channel();
        let processor = Self {
            io,
            events,
            control: BatchControl::default(),
        };
        (processor, receiver)
    }

    pub fn control(&self) -> BatchControl {
        self.control.clone()
    }

    /// Processes `paths` in order. A failing item is logged and skipped;
    /// an invalid profile, a panic while handling an item, or an item error
    /// that is not [`Error::is_recoverable`] fails the whole batch.
    ///
    /// Errors only when called while another run is in progress. Dropping
    /// the returned future mid-run leaves the control in `Cancelled`.
    pub async fn run(&self, paths: &[PathBuf], profile: &OptimizationProfile) -> Result<BatchSummary> {
        let Some(_guard) = self.control.begin() else {
            return Err(Error::invalid_argument("a batch is already running"));
        };

        let mut summary = BatchSummary {
            state: BatchState::Running,
            exported: Vec::new(),
            failures: Vec::new(),
        };

        let optimizer = match SceneOptimizer::new(profile.clone()) {
            Ok(optimizer) => Arc::new(optimizer),
            Err(e) => {
                log::error!("Batch rejected: {e}");
                self.emit(BatchEvent::Error(e.to_string()));
                return Ok(self.finish(summary, BatchState::Failed));
            }
        };

        let total = paths.len();
        log::info!("Starting batch of {total} scenes");

        for (index, path) in paths.iter().enumerate() {
            if self.control.is_cancel_requested() {
                log::info!("Batch cancelled after {index} of {total} scenes");
                return Ok(self.finish(summary, BatchState::Cancelled));
            }

            let output = output_path(path);
            let task = tokio::spawn(process_item(
                self.io.clone(),
                optimizer.clone(),
                path.clone(),
                output.clone(),
            ));

            match task.await {
                Ok(Ok(name)) => {
                    summary.exported.push(output);
                    self.emit(BatchEvent::SceneProcessed { name });
                }
                Ok(Err(e)) if !e.is_recoverable() => {
                    let message = format!("batch aborted at {}: {}", path.display(), e);
                    log::error!("{message}");
                    summary.failures.push(BatchFailure {
                        path: path.clone(),
                        message: e.to_string(),
                    });
                    self.emit(BatchEvent::Error(message));
                    return Ok(self.finish(summary, BatchState::Failed));
                }
                Ok(Err(e)) => {
                    log::error!("Failed to optimize {}: {}", path.display(), e);
                    summary.failures.push(BatchFailure {
                        path: path.clone(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    let cause = if e.is_panic() {
                        panic_message(e.into_panic())
                    } else {
                        e.to_string()
                    };
                    let message = format!("batch aborted at {}: {}", path.display(), cause);
                    log::error!("{message}");
                    self.emit(BatchEvent::Error(message));
                    return Ok(self.finish(summary, BatchState::Failed));
                }
            }

            self.emit(BatchEvent::Progress((index + 1) as f32 / total as f32));
        }

        self.emit(BatchEvent::Progress(1.0));
        self.emit(BatchEvent::Completed);
        log::info!(
            "Batch finished: {} exported, {} failed",
            summary.exported.len(),
            summary.failures.len()
        );
        Ok(self.finish(summary, BatchState::Completed))
    }

    fn emit(&self, event: BatchEvent) {
        if self.events.send(event).is_err() {
            log::trace!("Batch event dropped, nobody is listening");
        }
    }

    fn finish(&self, mut summary: BatchSummary, state: BatchState) -> BatchSummary {
        self.control.finish(state);
        summary.state = state;
        summary
    }
}

/// Import, optimize, export. Returns the scene name on success.
async fn process_item(
    io: Arc<dyn SceneIo>,
    optimizer: Arc<SceneOptimizer>,
    input: PathBuf,
    output: PathBuf,
) -> Result<String> {
    let scene = io.import(&input).await?;
    let before = Statistics::compute(&scene);

    let optimized = match tokio::task::spawn_blocking(move || optimizer.optimize(scene)).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => return Err(Error::Io(std::io::Error::other(e))),
    };
    let optimized = optimized.map_err(|failure| {
        if failure.source.is_recoverable() {
            Error::optimization_failure(failure.to_string())
        } else {
            failure.source
        }
    })?;

    log::info!(
        "{}: {} changes, {} -> {} nodes, {} -> {} estimated bytes",
        display_name(&input),
        optimized.actions.len(),
        before.total_nodes,
        optimized.statistics.total_nodes,
        before.estimated_memory_bytes,
        optimized.statistics.estimated_memory_bytes
    );

    io.export(&output, &optimized.scene).await?;
    Ok(optimized.scene.name)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic while processing scene".to_owned()
    }
}
