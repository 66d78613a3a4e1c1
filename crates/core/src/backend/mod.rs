//! # Generation Backends
//!
//! The seam between the pipeline and the upstream generation service.
//! A backend opens a stream and hands back the raw body once the response
//! is known to be successful.

pub mod http;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{OutlineRequest, SectionRequest};
use crate::stream::ByteStream;

pub use http::HttpBackend;

/// Opens upstream generation streams
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Open the primary outline stream
    async fn open_outline(&self, request: &OutlineRequest) -> Result<ByteStream>;

    /// Open one section stream
    async fn open_section(&self, request: &SectionRequest) -> Result<ByteStream>;
}
