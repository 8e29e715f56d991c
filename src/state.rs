use std::sync::Arc;

use crate::analyzer::Analyzer;
use crate::config::Config;
use crate::error::Error;
use crate::http::build_client;

/// Concurrent analyses allowed at once.
pub const MAX_CONCURRENT_ANALYSES: usize = 3;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// `None` when a credential is missing; `setup_error` says which.
    pub analyzer: Option<Arc<Analyzer>>,
    pub setup_error: Option<String>,
    pub analyze_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let client = build_client()?;

        // A missing key should not stop the UI or /api/config from serving;
        // analysis requests report it instead.
        let (analyzer, setup_error) = match Analyzer::from_config(&config, client) {
            Ok(analyzer) => (Some(Arc::new(analyzer)), None),
            Err(e @ Error::MissingCredential { .. }) => {
                tracing::warn!("Analysis disabled: {e}");
                (None, Some(e.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            config,
            analyzer,
            setup_error,
            analyze_semaphore: Arc::new(tokio::sync::Semaphore::new(MAX_CONCURRENT_ANALYSES)),
        })
    }

    /// State around an already-built analyzer.
    pub fn with_analyzer(config: Config, analyzer: Arc<Analyzer>) -> Self {
        Self {
            config,
            analyzer: Some(analyzer),
            setup_error: None,
            analyze_semaphore: Arc::new(tokio::sync::Semaphore::new(MAX_CONCURRENT_ANALYSES)),
        }
    }
}
