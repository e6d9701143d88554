//! Error types for the `colony-cache` crate.

/// Errors that can occur while flushing or persisting durable state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the snapshot file failed.
    #[error("snapshot I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The snapshot could not be encoded or decoded.
    #[error("snapshot JSON error: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// `flush` was called a second time in the same cycle.
    #[error("durable state already flushed for tick {tick}")]
    AlreadyFlushed {
        /// The cycle that was already flushed.
        tick: u64,
    },
}
