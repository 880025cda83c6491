use std::io::{Read, Seek, Write};

/// A seekable read-write stream used as a document source.
///
/// The stream sits behind a mutex so positioned reads can take `&self`.
/// Its length is sampled once at construction.
#[derive(Debug)]
pub struct StreamSource<S> {
    inner: std::sync::Mutex<S>,
    len: u64,
    writable: bool,
}

/// A seekable stream that can only be read.
#[derive(Debug)]
pub struct ReaderSource<R> {
    inner: std::sync::Mutex<R>,
    len: u64,
}

/*

====================================
========= CREATION METHODS =========
====================================

*/

impl<S: Read + Write + Seek> StreamSource<S> {
    /// # Errors
    ///
    /// - `std::io::Error` if the stream length cannot be determined.
    pub fn new(mut stream: S, writable: bool) -> std::io::Result<Self> {
        let len = stream_len(&mut stream)?;

        Ok(Self {
            inner: std::sync::Mutex::new(stream),
            len,
            writable,
        })
    }

    /// Gives the stream back, e.g. to inspect what a commit wrote.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` if the lock was poisoned by a panicking reader.
    pub fn into_inner(self) -> std::io::Result<S> {
        self.inner.into_inner().map_err(|_| poisoned())
    }
}

impl<R: Read + Seek> ReaderSource<R> {
    /// # Errors
    ///
    /// - `std::io::Error` if the stream length cannot be determined.
    pub fn new(mut reader: R) -> std::io::Result<Self> {
        let len = stream_len(&mut reader)?;

        Ok(Self {
            inner: std::sync::Mutex::new(reader),
            len,
        })
    }
}

/*

====================================
============= HELPERS ==============
====================================

*/

fn stream_len<S: Seek>(stream: &mut S) -> std::io::Result<u64> {
    let len = stream.seek(std::io::SeekFrom::End(0))?;
    stream.seek(std::io::SeekFrom::Start(0))?;

    Ok(len)
}

fn poisoned() -> std::io::Error {
    std::io::Error::other("stream lock poisoned")
}

fn read_locked<R: Read + Seek>(
    inner: &std::sync::Mutex<R>,
    len: u64,
    pos: u64,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    if pos >= len || buf.is_empty() {
        return Ok(0);
    }

    let available = usize::try_from(len - pos).unwrap_or(usize::MAX);
    let want = buf.len().min(available);
    let mut guard = inner.lock().map_err(|_| poisoned())?;

    guard.seek(std::io::SeekFrom::Start(pos))?;

    let mut filled = 0;
    while filled < want {
        match guard.read(&mut buf[filled..want]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}

/*

====================================
=========== BYTE SOURCE ============
====================================

*/

impl<S: Read + Write + Seek + Send + std::fmt::Debug> crate::source::ByteSource
    for StreamSource<S>
{
    #[inline]
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, pos: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        read_locked(&self.inner, self.len, pos, buf)
    }

    #[inline]
    fn can_write(&self) -> bool {
        self.writable
    }

    fn write_at(&mut self, pos: u64, data: &[u8]) -> std::io::Result<()> {
        crate::source::check_write(self.writable, self.len, pos, data.len())?;

        let stream = self.inner.get_mut().map_err(|_| poisoned())?;
        stream.seek(std::io::SeekFrom::Start(pos))?;
        stream.write_all(data)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.get_mut().map_err(|_| poisoned())?.flush()
    }
}

impl<R: Read + Seek + Send + std::fmt::Debug> crate::source::ByteSource for ReaderSource<R> {
    #[inline]
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, pos: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        read_locked(&self.inner, self.len, pos, buf)
    }

    #[inline]
    fn can_write(&self) -> bool {
        false
    }

    fn write_at(&mut self, pos: u64, data: &[u8]) -> std::io::Result<()> {
        crate::source::check_write(false, self.len, pos, data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
