//! Pipeline orchestration.
//!
//! # Data Flow
//! ```text
//! request body → payload.rs (canonical Payload)
//!     → directory.rs (stage snapshot for this run)
//!     → orchestrator.rs (stage loop over the retry executor)
//!     → RunReport (buffered) or stream.rs events (streaming)
//! ```

pub mod directory;
pub mod error;
pub mod orchestrator;
pub mod payload;
pub mod stream;

pub use directory::{ServiceDirectory, ServiceStage, SharedDirectory};
pub use error::{StageError, StageErrorKind};
pub use orchestrator::{Orchestrator, RunObserver, RunOutcome, RunReport};
pub use payload::Payload;
pub use stream::{StreamEmitter, StreamEvent};
