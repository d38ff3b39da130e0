//! # runview-core
//!
//! Shared primitives for the runview execution-timeline core.
//!
//! This crate provides the foundational types used by the derivation crates:
//!
//! - **Identifiers**: Strongly-typed, ULID-backed IDs for runs and events
//! - **Log Levels**: The ordered severity scale attached to every run event
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Structured-logging initialization helpers
//!
//! ## Example
//!
//! ```rust
//! use runview_core::prelude::*;
//!
//! let run = RunId::generate();
//! let event = EventId::generate();
//! assert_ne!(run.to_string(), event.to_string());
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod level;
pub mod observability;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use runview_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::{EventId, RunId};
    pub use crate::level::LogLevel;
}

pub use error::{Error, Result};
pub use id::{EventId, RunId};
pub use level::LogLevel;
