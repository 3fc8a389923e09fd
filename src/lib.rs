//! CyborgDB client
//!
//! Typed request/response binding for the CyborgDB encrypted vector database
//! service. Encryption, indexing and search all run inside the service; this
//! crate validates inputs locally and normalizes what comes back.

pub mod client;
pub mod context;
pub mod index;
pub mod index_config;
pub mod key;
pub mod metadata_filter;
pub mod metrics;
pub mod model;
pub mod query;
pub mod transport;

pub use client::Client;
pub use context::{CallContext, CancelHandle};
pub use errors::{CyborgError, Result};
pub use index::EncryptedIndex;
pub use index_config::{DistanceMetric, IndexConfig};
pub use key::EncryptionKey;
pub use metadata_filter::{BooleanOperator, MetadataFilter, Predicate};
pub use model::*;
pub use query::{
    IncludeField, QueryInput, QueryMode, QueryRequest, QueryRequestBuilder, QueryResponse,
    QueryResultItem,
};
pub use transport::{ClientConfig, HttpTransport};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
    pub const DEFAULT_TOP_K: u32 = 100;
    pub const DEFAULT_N_LISTS: u32 = 1024;
    pub const KEY_LENGTH: usize = 32;
}

/// Error types for the client
pub mod errors {
    pub type Result<T> = std::result::Result<T, CyborgError>;

    #[derive(Debug, thiserror::Error)]
    pub enum CyborgError {
        #[error("Invalid key length: expected {expected} bytes, got {actual}")]
        InvalidKeyLength { expected: usize, actual: usize },

        #[error("Invalid key encoding: {0}")]
        InvalidKeyEncoding(String),

        #[error("Missing required field: {0}")]
        MissingRequiredField(String),

        #[error("Unknown field: {0}")]
        UnknownField(String),

        #[error("Invalid index type: {0}")]
        InvalidDiscriminant(String),

        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Filter composite has no children")]
        EmptyComposite,

        #[error("Unknown filter operator: {0}")]
        UnknownOperator(String),

        #[error("Invalid filter: {0}")]
        InvalidFilter(String),

        #[error("Query needs exactly one of vector, batch vectors or text; none given")]
        AmbiguousQueryInput,

        #[error("Query needs exactly one of vector, batch vectors or text; several given")]
        ConflictingQueryInput,

        #[error("Invalid query: {0}")]
        InvalidQuery(String),

        #[error("Invalid item: {0}")]
        InvalidItem(String),

        #[error("Unsupported contents type: {0}")]
        UnsupportedContents(String),

        #[error("Invalid dimension: expected {expected}, got {actual}")]
        DimensionMismatch { expected: usize, actual: usize },

        #[error("Result count mismatch: expected {expected} result sets, got {actual}")]
        ResultCountMismatch { expected: usize, actual: usize },

        #[error("Service returned {status}: {body}")]
        Service { status: u16, body: String },

        #[error("Malformed response: {0}")]
        MalformedResponse(String),

        #[error("Transport error: {0}")]
        Transport(String),

        #[error("Operation cancelled")]
        Cancelled,

        #[error("Deadline exceeded")]
        DeadlineExceeded,
    }

    impl CyborgError {
        /// True for client-side validation failures, as opposed to errors
        /// reported by the service, the transport or a cancelled context.
        pub fn is_validation(&self) -> bool {
            !matches!(
                self,
                CyborgError::Service { .. }
                    | CyborgError::MalformedResponse(_)
                    | CyborgError::Transport(_)
                    | CyborgError::Cancelled
                    | CyborgError::DeadlineExceeded
            )
        }

        pub fn is_cancellation(&self) -> bool {
            matches!(self, CyborgError::Cancelled | CyborgError::DeadlineExceeded)
        }
    }
}
