//! Incremental consumption of the AI resolution stream.
//!
//! The endpoint answers with a plain-text body delivered in arbitrary byte
//! segments. [`StreamConsumer`] decodes those segments with a stateful
//! [`Utf8Decoder`], forwards each newly decoded chunk to a
//! [`StreamHandler`], and hands back the full text once the server closes
//! the body.

pub mod consumer;
pub mod decoder;

pub use consumer::{StreamConsumer, StreamEndpoint, StreamHandler, StreamRequest, StreamState};
pub use decoder::Utf8Decoder;
