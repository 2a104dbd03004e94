use crate::error::Result;

/// Thread budgets for the two pools.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeConfig {
    /// Rayon workers for CPU-bound passes. 0 lets rayon pick.
    pub compute_threads: usize,
    /// Tokio workers for scene import/export.
    pub io_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            compute_threads: 0,
            io_threads: 2,
        }
    }
}

/// Configures the global rayon pool and builds the dedicated I/O runtime.
pub fn build_runtimes(config: RuntimeConfig) -> Result<tokio::runtime::Runtime> {
    // The global pool can only be set once per process.
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(config.compute_threads)
        .build_global()
    {
        log::debug!("Keeping existing rayon pool: {e}");
    }

    let io_runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.io_threads.max(1))
        .enable_all()
        .thread_name("prism-io")
        .build()?;

    Ok(io_runtime)
}
