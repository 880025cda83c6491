/// # Document state on top of the overlay engine.
///
/// [`document::Document`] owns one open source with its overlay, history,
/// selection and bookmarks, and is the only place edits are made. Changes
/// are announced on [`events::EventBus`]; bulk work can be moved to a worker
/// thread with [`document::Document::spawn`].
pub mod config;
pub mod document;
pub mod epoch;
pub mod events;
pub mod long_process;
