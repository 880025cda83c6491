/// Random-access byte storage underneath a document.
///
/// Positions are physical offsets and never move for the lifetime of the
/// source. Reads past the end are short, not errors.
pub trait ByteSource: std::fmt::Debug + Send {
    /// Physical length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies bytes starting at `pos` into `buf`, returning how many were copied.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` if the underlying storage fails.
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Whether [`ByteSource::write_at`] may be called.
    fn can_write(&self) -> bool;

    /// Overwrites bytes in place. Never changes [`ByteSource::len`].
    ///
    /// # Errors
    ///
    /// - `std::io::ErrorKind::PermissionDenied` on a read-only source.
    /// - `std::io::ErrorKind::InvalidInput` if the write would extend the source.
    fn write_at(&mut self, pos: u64, data: &[u8]) -> std::io::Result<()>;

    /// Pushes pending writes down to storage.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` if the flush fails.
    fn flush(&mut self) -> std::io::Result<()>;

    /// Backing file path, if there is one.
    fn path(&self) -> Option<&std::path::Path> {
        None
    }
}

/// Shared bounds check for in-place writes.
pub(crate) fn check_write(
    writable: bool,
    len: u64,
    pos: u64,
    data_len: usize,
) -> std::io::Result<()> {
    if !writable {
        return Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "source is read-only",
        ));
    }

    let end = u64::try_from(data_len)
        .ok()
        .and_then(|n| pos.checked_add(n))
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "write overflows"))?;

    if end > len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("in-place write to {pos}..{end} exceeds source length {len}"),
        ));
    }

    Ok(())
}
