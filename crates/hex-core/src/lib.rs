/// # Overlay editing engine.
///
/// - [`overlay`] holds pending edits keyed by physical position.
/// - [`buffer`] applies them over a [`hex_io::source::ByteSource`] and
///   serves the edited view in chunks.
/// - [`translator`] maps between physical and deletions-hidden positions.
/// - [`history`] keeps the undo/redo stacks.
/// - [`search`], [`compare`] and [`commit`] are the long-running passes over
///   the whole view; they take a [`progress::Progress`] and can be cancelled
///   between chunks.
pub mod buffer;
pub mod commit;
pub mod compare;
pub mod enums;
pub mod errors;
pub mod hexfmt;
pub mod history;
pub mod interchange;
pub mod overlay;
pub mod progress;
pub mod search;
pub mod translator;
