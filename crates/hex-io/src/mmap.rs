use std::io::{Seek, Write};

/// A file viewed through a read-only memory map.
///
/// In-place writes go through the file handle; [`crate::source::ByteSource::flush`]
/// re-maps the file so later reads see them.
#[derive(Debug)]
pub struct MmapFile {
    file: std::fs::File,
    mmap: memmap2::Mmap,
    path: std::path::PathBuf,
    writable: bool,
    locked: bool,
}

impl MmapFile {
    /// Opens and maps a file read-only.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` if the file cannot be opened or mapped.
    pub fn open(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = std::fs::File::open(&path_buf)?;
        let mmap = Self::map(&file)?;

        Ok(Self {
            file,
            mmap,
            path: path_buf,
            writable: false,
            locked: false,
        })
    }

    /// Opens a file for editing.
    ///
    /// When `read_only` is false the file is opened read-write. If the OS
    /// refuses write access the file is opened read-only instead and
    /// [`MmapFile::is_locked`] reports `true`.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` if the file cannot be opened at all or cannot be mapped.
    pub fn open_for_edit(
        path: impl AsRef<std::path::Path>,
        read_only: bool,
    ) -> std::io::Result<Self> {
        if read_only {
            return Self::open(path);
        }

        let path_buf = path.as_ref().to_path_buf();
        match std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path_buf)
        {
            Ok(file) => {
                let mmap = Self::map(&file)?;

                Ok(Self {
                    file,
                    mmap,
                    path: path_buf,
                    writable: true,
                    locked: false,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                tracing::info!(path = %path_buf.display(), "write access denied, opening locked");
                let mut locked = Self::open(&path_buf)?;
                locked.locked = true;

                Ok(locked)
            }
            Err(e) => Err(e),
        }
    }

    fn map(file: &std::fs::File) -> std::io::Result<memmap2::Mmap> {
        // SAFETY:
        // - The map is only ever handed out as an immutable &[u8]
        // - We keep the file handle alive in the struct
        // - Our own writes are followed by a re-map before the next read
        unsafe { memmap2::Mmap::map(file) }
    }

    /// STRICT: Gets an exact slice of bytes.
    /// Returns `None` if the requested range goes out of bounds or overflows.
    #[inline]
    #[must_use]
    pub fn get_bytes_exact(&self, start: usize, length: usize) -> Option<&[u8]> {
        let end = start.checked_add(length)?;

        self.mmap.get(start..end)
    }

    /// FORGIVING: Gets bytes starting at `start`, up to `length`.
    /// Past the end of the file this yields a shorter (possibly empty) slice.
    #[inline]
    #[must_use]
    pub fn get_bytes_clamped(&self, start: usize, length: usize) -> &[u8] {
        if start >= self.mmap.len() {
            return &[];
        }

        let end = std::cmp::min(start.saturating_add(length), self.mmap.len());

        &self.mmap[start..end]
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    /// True when write access was requested but refused by the OS.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl crate::source::ByteSource for MmapFile {
    #[inline]
    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_at(&self, pos: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        let Ok(start) = usize::try_from(pos) else {
            return Ok(0);
        };
        let bytes = self.get_bytes_clamped(start, buf.len());

        buf[..bytes.len()].copy_from_slice(bytes);

        Ok(bytes.len())
    }

    #[inline]
    fn can_write(&self) -> bool {
        self.writable
    }

    fn write_at(&mut self, pos: u64, data: &[u8]) -> std::io::Result<()> {
        crate::source::check_write(self.writable, self.mmap.len() as u64, pos, data.len())?;

        self.file.seek(std::io::SeekFrom::Start(pos))?;
        self.file.write_all(data)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.writable {
            return Ok(());
        }

        self.file.flush()?;
        self.file.sync_data()?;
        self.mmap = Self::map(&self.file)?;

        Ok(())
    }

    #[inline]
    fn path(&self) -> Option<&std::path::Path> {
        Some(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::MmapFile;
    use crate::source::ByteSource;
    use std::io::Write;

    fn create_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(content).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn test_read_at_clamps_past_end() {
        let tmp = create_file(b"\x00\x01\x02\x03");
        let file = MmapFile::open(tmp.path()).unwrap();

        let mut buf = [0xEE; 8];
        assert_eq!(file.read_at(2, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[0x02, 0x03]);
        assert_eq!(file.read_at(10, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_only_open_refuses_writes() {
        let tmp = create_file(b"abcd");
        let mut file = MmapFile::open(tmp.path()).unwrap();

        assert!(!file.can_write());
        assert!(!file.is_locked());
        assert!(file.write_at(0, b"z").is_err());
    }

    #[test]
    fn test_write_then_flush_is_visible() {
        let tmp = create_file(b"abcd");
        let mut file = MmapFile::open_for_edit(tmp.path(), false).unwrap();

        assert!(file.can_write());
        file.write_at(1, b"XY").unwrap();
        file.flush().unwrap();

        assert_eq!(file.as_slice(), b"aXYd");
        assert_eq!(std::fs::read(tmp.path()).unwrap(), b"aXYd");
    }

    #[test]
    fn test_write_cannot_extend() {
        let tmp = create_file(b"abcd");
        let mut file = MmapFile::open_for_edit(tmp.path(), false).unwrap();

        let err = file.write_at(3, b"XY").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_empty_file_maps() {
        let tmp = create_file(b"");
        let file = MmapFile::open(tmp.path()).unwrap();

        assert!(file.is_empty());
        assert_eq!(file.get_bytes_exact(0, 1), None);
        assert_eq!(file.path(), Some(tmp.path()));
    }
}
