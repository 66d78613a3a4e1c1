//! # Generation Pipeline
//!
//! Turns one streamed outline into concurrently generated sections.
//!
//! ## Flow
//!
//! ```text
//! Idle → Connecting → Generating (outline streaming, sections dispatched) → Completing → Idle
//!                 └──────────────┴──────────────→ Error
//! ```

pub mod coordinator;
pub mod dispatcher;
pub mod events;
pub mod generator;
pub mod progress;
pub mod segmenter;
pub mod session;
pub mod stage;
pub mod store;

pub use coordinator::{Coordinator, PipelineConfig, SessionTicket};
pub use dispatcher::TaskDispatcher;
pub use events::{PipelineEvent, PipelineEventKind};
pub use generator::SectionGenerator;
pub use progress::{ProgressConfig, ProgressEstimator};
pub use segmenter::{segment, Segmenter, DEFAULT_DELIMITER};
pub use session::PipelineSnapshot;
pub use stage::Stage;
pub use store::{Section, SectionStatus};
