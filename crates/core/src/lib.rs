//! mergeflow core library.
//!
//! Client-side building blocks for AI-assisted merge-conflict resolution:
//! the incremental stream consumer, typed wrappers for the service API,
//! conflict-marker parsing, and the per-file resolution lifecycle.

pub mod api;
pub mod config;
pub mod conflict;
pub mod errors;
pub mod models;
pub mod resolution;
pub mod stream;
pub mod tree;

// Re-exports for convenience.
pub use api::ApiClient;
pub use config::AppConfig;
pub use errors::{CoreError, StreamError};
pub use resolution::{Phase, ResolutionSession};
pub use stream::{StreamConsumer, StreamEndpoint, StreamHandler, StreamRequest, StreamState};
pub use tree::TreeNode;
