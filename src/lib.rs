//! Overlay editor for large binary files.
//!
//! Edits are kept apart from the source until they are submitted. See
//! [`hex_state::document::Document`] for the entry point.

pub use hex_core;
pub use hex_io;
pub use hex_state;

pub use hex_core::enums::{CommitStatus, EditOutcome, IgnoreReason};
pub use hex_state::config::OpenOptions;
pub use hex_state::document::Document;
