//! Error types for the `colony-market` crate.

use colony_types::{AgentId, RequestId};

/// Errors that can occur when binding fulfillers to requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    /// The request is not open.
    #[error("request {request} is not open")]
    RequestNotFound {
        /// The missing request.
        request: RequestId,
    },

    /// Another fulfiller already holds the request.
    #[error("request {request} is already assigned to {fulfiller}")]
    AlreadyAssigned {
        /// The contested request.
        request: RequestId,
        /// The fulfiller that holds it.
        fulfiller: AgentId,
    },

    /// The fulfiller already holds a different request.
    #[error("fulfiller {fulfiller} already holds request {request}")]
    FulfillerBusy {
        /// The busy fulfiller.
        fulfiller: AgentId,
        /// The request it holds.
        request: RequestId,
    },
}
