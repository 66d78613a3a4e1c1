//! # Upstream Streams
//!
//! Wire protocol and incremental reader shared by the outline stream and
//! every section stream.
//!
//! ```text
//! bytes ──▶ lines ──▶ StreamEvent ──▶ text deltas
//!                        │
//!                        └── malformed: logged, skipped
//! ```

pub mod protocol;
pub mod reader;

pub use protocol::{parse_line, StreamEvent, DONE_SENTINEL};
pub use reader::{ByteStream, StreamReader};
