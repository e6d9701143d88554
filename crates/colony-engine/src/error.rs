//! Error types for the engine binary.

/// Top-level error for engine start-up.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: colony_core::config::ConfigError,
    },

    /// The spawner section of the config could not be parsed.
    #[error("spawner config error: {source}")]
    SpawnerConfig {
        /// The underlying YAML error.
        #[from]
        source: serde_yml::Error,
    },

    /// The demo world layout is unusable.
    #[error("layout error: {message}")]
    Layout {
        /// Description of the problem.
        message: String,
    },
}
