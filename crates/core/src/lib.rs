//! # Deckforge Core
//!
//! Streaming generation pipeline for sectioned documents: one outline
//! stream is split into sections as it arrives, and every closed section is
//! generated by its own concurrent stream.
//!
//! ## Architecture
//!
//! - `pipeline/` - Coordinator, segmentation, dispatch, progress and results
//! - `stream/` - `data:` line protocol and the incremental stream reader
//! - `backend/` - Upstream generation service (`HttpBackend`)
//! - `prompts/` - Instruction templates merged into upstream requests
//! - `auth` - Authorization and credential collaborators
//! - `models` - Request and configuration types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use deckforge_core::backend::HttpBackend;
//! use deckforge_core::models::{GenerationRequest, UpstreamConfig};
//! use deckforge_core::pipeline::{Coordinator, PipelineConfig};
//!
//! let backend = Arc::new(HttpBackend::new(UpstreamConfig::default())?);
//! let coordinator = Coordinator::new(PipelineConfig::default(), backend);
//! let snapshot = coordinator.generate(GenerationRequest::new("Quarterly Review")).await?;
//! ```

pub mod auth;
pub mod backend;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod stream;

pub use error::{PipelineError, Result};
