//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization and construction of
//! the fetcher, worker pool and source so command handlers stay small.

use crate::error::CliError;
use std::sync::Arc;
use tilesource::config::ConfigFile;
use tilesource::dispatch::{PassthroughDecoder, WorkerPool};
use tilesource::fetch::ResourceFetcher;
use tilesource::logging::{init_logging, LoggingGuard};
use tilesource::source::{SourceContext, TracingObserver, VectorTileSource};
use tilesource::tilejson::{SourceDescriptor, SourceOptions};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    _logging_guard: LoggingGuard,
    config: ConfigFile,
    interrupt: CancellationToken,
}

impl CliRunner {
    /// Loads config, initializes logging and installs the Ctrl-C handler.
    ///
    /// With `verbose`, log output is mirrored to stderr at debug level.
    pub fn new(verbose: bool) -> Result<Self, CliError> {
        let config = ConfigFile::load()?;

        let level = if verbose { "debug" } else { "info" };
        let logging_guard = init_logging(
            &config.logging.directory,
            &config.logging.file,
            level,
            verbose,
        )
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        let interrupt = CancellationToken::new();
        let token = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted");
                token.cancel();
            }
        });

        Ok(Self {
            _logging_guard: logging_guard,
            config,
            interrupt,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Cancelled when the user presses Ctrl-C.
    pub fn interrupt(&self) -> &CancellationToken {
        &self.interrupt
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("tilesource v{}", tilesource::VERSION);
        info!("tilesource CLI: {} command", command);
    }

    /// Builds a source backed by a fresh worker pool.
    pub fn create_source(&self, options: SourceOptions) -> Result<VectorTileSource, CliError> {
        let fetcher: Arc<dyn ResourceFetcher> =
            Arc::new(self.config.fetcher().map_err(CliError::Metadata)?);
        let pool = Arc::new(WorkerPool::spawn(
            self.config.pool_config(),
            Arc::clone(&fetcher),
            Arc::new(PassthroughDecoder),
        ));

        let context = SourceContext::new(fetcher, pool).with_config(self.config.source_config());
        let source = VectorTileSource::new("cli", options, context);
        source.add_observer(Arc::new(TracingObserver));
        Ok(source)
    }

    /// Starts loading metadata and waits for it, unless interrupted.
    pub async fn load_source(
        &self,
        source: &VectorTileSource,
    ) -> Result<Arc<SourceDescriptor>, CliError> {
        source.load();
        tokio::select! {
            _ = self.interrupt.cancelled() => Err(CliError::Interrupted),
            loaded = source.wait_loaded() => loaded.map_err(CliError::Metadata),
        }
    }
}
