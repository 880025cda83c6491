/// # Physical storage.
///
/// Everything the overlay engine reads from or writes to goes through a
/// [`source::ByteSource`]. Files are memory-mapped; anything else that can
/// seek is wrapped in a stream source.
pub mod mmap;
pub mod source;
pub mod stream;
