use std::io::{Read, Seek, Write};

use hex_core::buffer::{LogicalByte, OverlayBuffer};
use hex_core::enums::{
    ActionFilter, ByteAction, ByteDifference, CommitStatus, EditOutcome, EditRecord, IgnoreReason,
};
use hex_core::errors::OverlayResult;
use hex_core::interchange::{BookmarkEntry, SessionState};
use hex_core::progress::{NoProgress, Progress};

use crate::config::OpenOptions;
use crate::events::{DocumentEvent, EventBus};
use crate::long_process::LongProcessKind;

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("cannot open {path:?}: {source}")]
    File {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("cannot open stream: {0}")]
    Stream(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("cannot start worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("long process {0:?} panicked")]
    WorkerPanicked(LongProcessKind),
}

/// Externally visible lifecycle of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Closed,
    Clean,
    Dirty,
    LongProcessRunning,
}

/// Inclusive range of physical positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: u64,
    pub stop: u64,
}

impl Selection {
    #[must_use]
    pub fn new(a: u64, b: u64) -> Self {
        Self {
            start: a.min(b),
            stop: a.max(b),
        }
    }
}

/// One open source, its pending edits and everything a session remembers.
///
/// All mutations go through this type. On a closed or read-only document
/// they return [`EditOutcome::Ignored`] instead of failing.
#[derive(Debug)]
pub struct Document {
    buffer: Option<OverlayBuffer>,
    history: hex_core::history::History,
    options: OpenOptions,
    read_only: bool,
    /// The OS refused write access; read-only cannot be lifted.
    locked: bool,
    position: u64,
    selection: Option<Selection>,
    first_visible_position: u64,
    bookmarks: Vec<BookmarkEntry>,
    events: EventBus,
    long_process: Option<LongProcessKind>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Yields the positions a paste writes to: non-deleted positions from the
/// start, then new appended slots when `expand` is set.
struct PasteWalk {
    next: Option<u64>,
    end: u64,
    append_at: u64,
    expand: bool,
}

impl PasteWalk {
    fn new(overlay: &hex_core::overlay::OverlayStore, start: u64, end: u64, expand: bool) -> Self {
        let next = if start >= end {
            None
        } else if overlay.get(start, ActionFilter::Deleted).is_some() {
            hex_core::translator::next_valid_position(overlay, start, 1, end)
        } else {
            Some(start)
        };

        Self {
            next,
            end,
            append_at: end,
            expand,
        }
    }

    fn advance(&mut self, overlay: &hex_core::overlay::OverlayStore) -> Option<u64> {
        if let Some(position) = self.next {
            self.next = hex_core::translator::next_valid_position(overlay, position, 1, self.end);
            return Some(position);
        }

        if self.expand {
            let position = self.append_at;
            self.append_at += 1;
            return Some(position);
        }

        None
    }
}

/// Overwrites keep appended slots as `Added`.
fn overwrite_record(buffer: &OverlayBuffer, position: u64, value: u8) -> EditRecord {
    if position >= buffer.length() {
        EditRecord::added(position, value)
    } else {
        EditRecord::modified(position, value)
    }
}

fn replacement<'a>(find: &[u8], replace: &'a [u8], truncate: bool) -> &'a [u8] {
    if truncate && replace.len() > find.len() {
        &replace[..find.len()]
    } else {
        replace
    }
}

/*

====================================
========= OPEN / CLOSE =============
====================================

*/

impl Document {
    /// A closed document.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: None,
            history: hex_core::history::History::new(),
            options: OpenOptions::default(),
            read_only: false,
            locked: false,
            position: 0,
            selection: None,
            first_visible_position: 0,
            bookmarks: Vec::new(),
            events: EventBus::new(),
            long_process: None,
        }
    }

    /// Opens a file through a memory map, closing whatever was open.
    ///
    /// A file the OS will not let us write opens locked and read-only.
    ///
    /// # Errors
    ///
    /// - [`OpenError::File`] if the file cannot be opened or mapped.
    pub fn open_file(
        &mut self,
        path: impl AsRef<std::path::Path>,
        options: OpenOptions,
    ) -> Result<(), OpenError> {
        let path = path.as_ref();
        let file = hex_io::mmap::MmapFile::open_for_edit(path, options.read_only).map_err(
            |source| OpenError::File {
                path: path.to_path_buf(),
                source,
            },
        )?;
        let locked = file.is_locked();

        self.install(Box::new(file), options, options.read_only || locked, locked);

        Ok(())
    }

    /// Opens any seekable read-write stream.
    ///
    /// # Errors
    ///
    /// - [`OpenError::Stream`] if the stream length cannot be determined.
    pub fn open_stream<S>(&mut self, stream: S, options: OpenOptions) -> Result<(), OpenError>
    where
        S: Read + Write + Seek + Send + std::fmt::Debug + 'static,
    {
        let source = hex_io::stream::StreamSource::new(stream, !options.read_only)?;

        self.install(Box::new(source), options, options.read_only, false);

        Ok(())
    }

    /// Opens a stream that cannot be written. The document is locked.
    ///
    /// # Errors
    ///
    /// - [`OpenError::Stream`] if the stream length cannot be determined.
    pub fn open_reader<R>(&mut self, reader: R, options: OpenOptions) -> Result<(), OpenError>
    where
        R: Read + Seek + Send + std::fmt::Debug + 'static,
    {
        let source = hex_io::stream::ReaderSource::new(reader)?;

        self.install(Box::new(source), options, true, true);

        Ok(())
    }

    fn install(
        &mut self,
        source: Box<dyn hex_io::source::ByteSource>,
        options: OpenOptions,
        read_only: bool,
        locked: bool,
    ) {
        if self.is_open() {
            self.close();
        }

        let buffer = OverlayBuffer::new(source).with_chunk_size(options.chunk_size);
        let length = buffer.length();

        tracing::info!(
            length,
            read_only,
            locked,
            path = ?buffer.source().path(),
            "document opened"
        );

        self.buffer = Some(buffer);
        self.options = options;
        self.read_only = read_only;
        self.locked = locked;
        self.events.emit(DocumentEvent::Opened { length, read_only });
    }

    /// Drops the source and every pending edit. Subscribers stay subscribed.
    pub fn close(&mut self) {
        if self.buffer.take().is_none() {
            return;
        }

        self.history.clear();
        self.read_only = false;
        self.locked = false;
        self.position = 0;
        self.selection = None;
        self.first_visible_position = 0;
        self.bookmarks.clear();

        tracing::info!("document closed");
        self.events.emit(DocumentEvent::Closed);
    }

    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.buffer.is_some()
    }

    #[must_use]
    pub fn state(&self) -> DocumentState {
        if self.buffer.is_none() {
            DocumentState::Closed
        } else if self.long_process.is_some() {
            DocumentState::LongProcessRunning
        } else if self.history.is_modified() {
            DocumentState::Dirty
        } else {
            DocumentState::Clean
        }
    }

    pub fn subscribe(&mut self) -> crossbeam_channel::Receiver<DocumentEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_senders(&self) -> Vec<crossbeam_channel::Sender<DocumentEvent>> {
        self.events.senders()
    }

    pub(crate) fn set_long_process(&mut self, kind: Option<LongProcessKind>) {
        self.long_process = kind;
    }
}

/*

====================================
============== FLAGS ===============
====================================

*/

impl Document {
    #[inline]
    #[must_use]
    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    #[inline]
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only || self.locked
    }

    /// Clearing read-only on a locked document is refused.
    pub fn set_read_only(&mut self, read_only: bool) -> EditOutcome {
        if self.buffer.is_none() {
            return EditOutcome::Ignored(IgnoreReason::Closed);
        }

        if self.locked && !read_only {
            return EditOutcome::Ignored(IgnoreReason::ReadOnly);
        }

        if self.read_only != read_only {
            self.read_only = read_only;
            self.events
                .emit(DocumentEvent::ReadOnlyChanged { read_only });
        }

        EditOutcome::Applied
    }

    #[inline]
    #[must_use]
    pub fn is_locked_file(&self) -> bool {
        self.locked
    }

    #[inline]
    #[must_use]
    pub fn allow_insert_anywhere(&self) -> bool {
        self.options.allow_insert_anywhere
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Moves the read cursor, clamped to the edited length.
    pub fn set_position(&mut self, position: u64) {
        self.position = position.min(self.edited_length());
    }

    #[inline]
    #[must_use]
    pub fn is_on_long_process(&self) -> bool {
        self.long_process.is_some()
    }

    #[inline]
    #[must_use]
    pub fn long_process(&self) -> Option<LongProcessKind> {
        self.long_process
    }

    #[inline]
    #[must_use]
    pub fn history(&self) -> &hex_core::history::History {
        &self.history
    }

    fn editable(&self) -> Result<&OverlayBuffer, IgnoreReason> {
        let buffer = self.buffer.as_ref().ok_or(IgnoreReason::Closed)?;

        if self.is_read_only() {
            return Err(IgnoreReason::ReadOnly);
        }

        Ok(buffer)
    }
}

/*

====================================
============== READS ===============
====================================

*/

impl Document {
    /// Physical length; 0 when closed.
    #[must_use]
    pub fn length(&self) -> u64 {
        self.buffer.as_ref().map_or(0, OverlayBuffer::length)
    }

    /// Physical length plus appended bytes.
    #[must_use]
    pub fn edited_length(&self) -> u64 {
        self.buffer.as_ref().map_or(0, OverlayBuffer::edited_len)
    }

    #[must_use]
    pub fn logical_length(&self, hide_deleted: bool) -> u64 {
        self.buffer
            .as_ref()
            .map_or(0, |buffer| buffer.logical_len(hide_deleted))
    }

    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn get_byte(&self, position: u64, copy_changes: bool) -> OverlayResult<Option<u8>> {
        match &self.buffer {
            Some(buffer) => buffer.byte_at(position, copy_changes),
            None => Ok(None),
        }
    }

    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn read_logical_range(
        &self,
        start: u64,
        count: usize,
        hide_deleted: bool,
    ) -> OverlayResult<Vec<u8>> {
        match &self.buffer {
            Some(buffer) => buffer.read_logical_range(start, count, hide_deleted),
            None => Ok(Vec::new()),
        }
    }

    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn read_cells(
        &self,
        start: u64,
        count: usize,
        hide_deleted: bool,
    ) -> OverlayResult<Vec<LogicalByte>> {
        match &self.buffer {
            Some(buffer) => buffer.read_cells(start, count, hide_deleted),
            None => Ok(Vec::new()),
        }
    }

    /// The whole document, with or without pending edits.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn get_all_bytes(&self, copy_changes: bool) -> OverlayResult<Vec<u8>> {
        let Some(buffer) = &self.buffer else {
            return Ok(Vec::new());
        };

        let stop = if copy_changes {
            buffer.edited_len()
        } else {
            buffer.length()
        };
        let mut out = Vec::new();
        hex_core::commit::write_range(buffer, 0, stop, copy_changes, &mut out, &mut NoProgress)?;

        Ok(out)
    }

    /// Bytes of the inclusive range `start..=stop`. Deleted bytes are left
    /// out when `copy_changes` is set.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn get_copy_data(&self, start: u64, stop: u64, copy_changes: bool) -> OverlayResult<Vec<u8>> {
        let mut out = Vec::new();
        self.copy_to_writer(&mut out, start, stop, copy_changes, &mut NoProgress)?;

        Ok(out)
    }

    /// Streams the inclusive range `start..=stop` into `writer`.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if reading or writing fails.
    pub fn copy_to_writer<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        start: u64,
        stop: u64,
        copy_changes: bool,
        progress: &mut dyn Progress,
    ) -> OverlayResult<CommitStatus> {
        let Some(buffer) = &self.buffer else {
            return Ok(CommitStatus::Ignored(IgnoreReason::Closed));
        };

        let range = Selection::new(start, stop);

        hex_core::commit::write_range(
            buffer,
            range.start,
            range.stop.saturating_add(1),
            copy_changes,
            writer,
            progress,
        )
    }

    /// The edited bytes of `start..=stop` as text.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn copy_as(
        &self,
        mode: hex_core::hexfmt::CopyMode,
        start: u64,
        stop: u64,
    ) -> OverlayResult<String> {
        let bytes = self.get_copy_data(start, stop, true)?;

        Ok(hex_core::hexfmt::format_bytes(&bytes, mode))
    }

    /// Answers a view refresh, tagged with the request's epoch.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn read_for_epoch(
        &self,
        request: crate::epoch::ReadRequest,
    ) -> OverlayResult<crate::epoch::ReadResponse> {
        Ok(crate::epoch::ReadResponse {
            epoch: request.epoch,
            start: request.start,
            cells: self.read_cells(request.start, request.count, request.hide_deleted)?,
        })
    }
}

/*

====================================
============ POSITIONS =============
====================================

*/

impl Document {
    /// Physical position to the offset shown with or without deleted bytes.
    /// `None` when closed.
    #[must_use]
    pub fn to_logical(&self, physical_position: u64, hide_deleted: bool) -> Option<u64> {
        let buffer = self.buffer.as_ref()?;

        Some(hex_core::translator::to_logical(
            buffer.overlay(),
            physical_position,
            hide_deleted,
        ))
    }

    /// Deletions-hidden offset back to its physical position. `None` when
    /// closed or past the end.
    #[must_use]
    pub fn to_physical(&self, logical_position: u64) -> Option<u64> {
        let buffer = self.buffer.as_ref()?;

        hex_core::translator::to_physical(buffer.overlay(), logical_position, buffer.edited_len())
    }

    #[must_use]
    pub fn count_deleted_before(&self, position: u64) -> Option<u64> {
        let buffer = self.buffer.as_ref()?;

        Some(hex_core::translator::count_deleted_before(buffer.overlay(), position))
    }

    /// Moves `|delta|` visible bytes away from `from`, stepping over deleted
    /// ones. `None` when closed or when the walk leaves the edited view.
    #[must_use]
    pub fn next_valid_position(&self, from: u64, delta: i64) -> Option<u64> {
        let buffer = self.buffer.as_ref()?;

        hex_core::translator::next_valid_position(buffer.overlay(), from, delta, buffer.edited_len())
    }
}

/*

====================================
========= SINGLE EDITS =============
====================================

*/

impl Document {
    fn apply_one(&mut self, record: EditRecord) -> EditOutcome {
        let Some(buffer) = self.buffer.as_mut() else {
            return EditOutcome::Ignored(IgnoreReason::Closed);
        };

        let length = buffer.length();
        self.history.apply(buffer.overlay_mut(), record);

        let positions = vec![record.position];
        self.events.emit(match record.action {
            ByteAction::Deleted => DocumentEvent::BytesDeleted { positions },
            ByteAction::Added if record.position >= length => {
                DocumentEvent::BytesAppended { positions }
            }
            _ => DocumentEvent::BytesModified { positions },
        });

        EditOutcome::Applied
    }

    /// Overwrites one byte. `undo_length > 1` links this record to the
    /// `undo_length - 1` records before it for undo.
    pub fn modify_byte(&mut self, position: u64, value: u8, undo_length: u64) -> EditOutcome {
        let buffer = match self.editable() {
            Ok(buffer) => buffer,
            Err(reason) => return EditOutcome::Ignored(reason),
        };

        if position >= buffer.edited_len() {
            return EditOutcome::Ignored(IgnoreReason::InvalidRange);
        }

        let record = overwrite_record(buffer, position, value).with_undo_length(undo_length);

        self.apply_one(record)
    }

    pub fn delete_byte(&mut self, position: u64) -> EditOutcome {
        let buffer = match self.editable() {
            Ok(buffer) => buffer,
            Err(reason) => return EditOutcome::Ignored(reason),
        };

        if position >= buffer.edited_len()
            || buffer
                .overlay()
                .get(position, ActionFilter::Deleted)
                .is_some()
        {
            return EditOutcome::Ignored(IgnoreReason::InvalidRange);
        }

        self.apply_one(EditRecord::deleted(position))
    }

    /// Appends one byte after the last edited position.
    pub fn insert_at_end(&mut self, value: u8) -> EditOutcome {
        let buffer = match self.editable() {
            Ok(buffer) => buffer,
            Err(reason) => return EditOutcome::Ignored(reason),
        };

        let position = buffer.edited_len();

        self.apply_one(EditRecord::added(position, value))
    }

    /// Inserts at `position`, which must be the end of the document.
    pub fn insert(&mut self, position: u64, value: u8) -> EditOutcome {
        if let Err(reason) = self.editable() {
            return EditOutcome::Ignored(reason);
        }

        if position != self.edited_length() {
            return EditOutcome::Ignored(IgnoreReason::MidStreamInsert);
        }

        self.insert_at_end(value)
    }
}

/*

====================================
========= GROUPED EDITS ============
====================================

*/

impl Document {
    /// Applies `records` as one undo unit and notifies subscribers.
    fn apply_group(
        &mut self,
        records: Vec<EditRecord>,
        cancelled: bool,
        empty: IgnoreReason,
    ) -> EditOutcome {
        if records.is_empty() {
            return if cancelled {
                EditOutcome::Cancelled
            } else {
                EditOutcome::Ignored(empty)
            };
        }

        let Some(buffer) = self.buffer.as_mut() else {
            return EditOutcome::Ignored(IgnoreReason::Closed);
        };

        let length = buffer.length();
        self.history.apply_group(buffer.overlay_mut(), &records);

        let mut modified = Vec::new();
        let mut deleted = Vec::new();
        let mut appended = Vec::new();

        for record in &records {
            match record.action {
                ByteAction::Deleted => deleted.push(record.position),
                ByteAction::Added if record.position >= length => appended.push(record.position),
                _ => modified.push(record.position),
            }
        }

        if !modified.is_empty() {
            self.events
                .emit(DocumentEvent::BytesModified { positions: modified });
        }
        if !deleted.is_empty() {
            self.events
                .emit(DocumentEvent::BytesDeleted { positions: deleted });
        }
        if !appended.is_empty() {
            self.events
                .emit(DocumentEvent::BytesAppended { positions: appended });
        }

        if cancelled {
            tracing::info!(applied = records.len(), "grouped edit cancelled");
            EditOutcome::Cancelled
        } else {
            EditOutcome::Applied
        }
    }

    /// Visits `start..stop` a chunk at a time, collecting what `record_for`
    /// returns. Returns the records and whether the walk was cancelled.
    fn collect_range(
        buffer: &OverlayBuffer,
        start: u64,
        stop: u64,
        progress: &mut dyn Progress,
        mut record_for: impl FnMut(u64) -> Option<EditRecord>,
    ) -> (Vec<EditRecord>, bool) {
        let step = buffer.chunk_size() as u64;
        let total = stop - start;
        let mut records = Vec::new();
        let mut pos = start;

        while pos < stop {
            if progress.is_cancelled() {
                return (records, true);
            }

            let chunk_end = pos.saturating_add(step).min(stop);
            records.extend((pos..chunk_end).filter_map(&mut record_for));
            pos = chunk_end;
            progress.report(pos - start, total);
        }

        (records, false)
    }

    /// Deletes `len` bytes from `start`; already-deleted bytes are skipped.
    pub fn delete_range(&mut self, start: u64, len: u64, progress: &mut dyn Progress) -> EditOutcome {
        let buffer = match self.editable() {
            Ok(buffer) => buffer,
            Err(reason) => return EditOutcome::Ignored(reason),
        };

        if len == 0 {
            return EditOutcome::Ignored(IgnoreReason::EmptyInput);
        }

        let end = buffer.edited_len();
        if start >= end {
            return EditOutcome::Ignored(IgnoreReason::InvalidRange);
        }

        let overlay = buffer.overlay();
        let (records, cancelled) = Self::collect_range(
            buffer,
            start,
            start.saturating_add(len).min(end),
            progress,
            |p| {
                overlay
                    .get(p, ActionFilter::Deleted)
                    .is_none()
                    .then(|| EditRecord::deleted(p))
            },
        );

        self.apply_group(records, cancelled, IgnoreReason::InvalidRange)
    }

    /// Overwrites from `position`, stepping over deleted bytes.
    ///
    /// Bytes that run past the end are appended when `expand` is set and
    /// dropped otherwise.
    pub fn paste(
        &mut self,
        position: u64,
        bytes: &[u8],
        expand: bool,
        progress: &mut dyn Progress,
    ) -> EditOutcome {
        let buffer = match self.editable() {
            Ok(buffer) => buffer,
            Err(reason) => return EditOutcome::Ignored(reason),
        };

        if bytes.is_empty() {
            return EditOutcome::Ignored(IgnoreReason::EmptyInput);
        }

        let end = buffer.edited_len();
        if position > end {
            return EditOutcome::Ignored(IgnoreReason::InvalidRange);
        }

        let mut walk = PasteWalk::new(buffer.overlay(), position, end, expand);
        let mut records = Vec::with_capacity(bytes.len());
        let mut cancelled = false;
        let total = bytes.len() as u64;

        'chunks: for chunk in bytes.chunks(buffer.chunk_size()) {
            if progress.is_cancelled() {
                cancelled = true;
                break;
            }

            for &value in chunk {
                let Some(p) = walk.advance(buffer.overlay()) else {
                    break 'chunks;
                };
                records.push(overwrite_record(buffer, p, value));
            }

            progress.report(records.len() as u64, total);
        }

        self.apply_group(records, cancelled, IgnoreReason::InvalidRange)
    }

    /// Pastes `text` as hex when it parses as hex, as raw bytes otherwise.
    pub fn paste_text(
        &mut self,
        position: u64,
        text: &str,
        expand: bool,
        progress: &mut dyn Progress,
    ) -> EditOutcome {
        let bytes = hex_core::hexfmt::parse_hex_string(text)
            .unwrap_or_else(|| text.as_bytes().to_vec());

        self.paste(position, &bytes, expand, progress)
    }

    /// Sets `len` bytes from `start` to `value`. Deleted bytes stay deleted.
    pub fn fill_with_byte(
        &mut self,
        start: u64,
        len: u64,
        value: u8,
        progress: &mut dyn Progress,
    ) -> EditOutcome {
        let buffer = match self.editable() {
            Ok(buffer) => buffer,
            Err(reason) => return EditOutcome::Ignored(reason),
        };

        if len == 0 {
            return EditOutcome::Ignored(IgnoreReason::EmptyInput);
        }

        let end = buffer.edited_len();
        if start >= end {
            return EditOutcome::Ignored(IgnoreReason::InvalidRange);
        }

        let overlay = buffer.overlay();
        let (records, cancelled) = Self::collect_range(
            buffer,
            start,
            start.saturating_add(len).min(end),
            progress,
            |p| {
                overlay
                    .get(p, ActionFilter::Deleted)
                    .is_none()
                    .then(|| overwrite_record(buffer, p, value))
            },
        );

        self.apply_group(records, cancelled, IgnoreReason::InvalidRange)
    }

    /// Within `start..start + len`, turns every `from` byte into `to`.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn replace_byte(
        &mut self,
        start: u64,
        len: u64,
        from: u8,
        to: u8,
        progress: &mut dyn Progress,
    ) -> OverlayResult<EditOutcome> {
        let buffer = match self.editable() {
            Ok(buffer) => buffer,
            Err(reason) => return Ok(EditOutcome::Ignored(reason)),
        };

        if len == 0 {
            return Ok(EditOutcome::Ignored(IgnoreReason::EmptyInput));
        }

        let end = buffer.edited_len();
        if start >= end {
            return Ok(EditOutcome::Ignored(IgnoreReason::InvalidRange));
        }

        let stop = start.saturating_add(len).min(end);
        let step = buffer.chunk_size() as u64;
        let mut records = Vec::new();
        let mut cancelled = false;
        let mut pos = start;

        while pos < stop {
            if progress.is_cancelled() {
                cancelled = true;
                break;
            }

            let values = buffer.read_values(pos, step.min(stop - pos), true)?;
            if values.is_empty() {
                break;
            }

            for (offset, value) in values.iter().enumerate() {
                if *value == Some(from) {
                    records.push(overwrite_record(buffer, pos + offset as u64, to));
                }
            }

            pos += values.len() as u64;
            progress.report(pos - start, stop - start);
        }

        Ok(self.apply_group(records, cancelled, IgnoreReason::NotFound))
    }

    /// Replaces the first match of `find` at or after `start` by pasting
    /// `replace` over it. With `truncate`, `replace` is cut to `find`'s length.
    ///
    /// Returns the match position, or `None` when nothing was replaced.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn replace_first(
        &mut self,
        find: &[u8],
        replace: &[u8],
        truncate: bool,
        start: u64,
        progress: &mut dyn Progress,
    ) -> OverlayResult<Option<u64>> {
        if self.editable().is_err() || find.is_empty() || replace.is_empty() {
            return Ok(None);
        }

        let Some(position) = self.find_first(find, start, progress)? else {
            return Ok(None);
        };

        let data = replacement(find, replace, truncate);

        Ok(self
            .paste(position, data, false, &mut NoProgress)
            .is_applied()
            .then_some(position))
    }

    /// [`Document::replace_first`] starting just after the current selection.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn replace_next(
        &mut self,
        find: &[u8],
        replace: &[u8],
        truncate: bool,
        progress: &mut dyn Progress,
    ) -> OverlayResult<Option<u64>> {
        let start = self.next_search_start();

        self.replace_first(find, replace, truncate, start, progress)
    }

    /// Replaces every match as one undo unit. Returns the match positions.
    ///
    /// A cancelled search replaces the matches found before it stopped.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn replace_all(
        &mut self,
        find: &[u8],
        replace: &[u8],
        truncate: bool,
        progress: &mut dyn Progress,
    ) -> OverlayResult<Vec<u64>> {
        let Ok(buffer) = self.editable() else {
            return Ok(Vec::new());
        };

        if find.is_empty() || replace.is_empty() {
            return Ok(Vec::new());
        }

        let positions = hex_core::search::find_all(buffer, find, progress)?;
        let data = replacement(find, replace, truncate);
        let end = buffer.edited_len();
        let overlay = buffer.overlay();
        let mut records = Vec::with_capacity(positions.len() * data.len());

        for &position in &positions {
            let mut walk = PasteWalk::new(overlay, position, end, false);
            for &value in data {
                let Some(p) = walk.advance(overlay) else {
                    break;
                };
                records.push(overwrite_record(buffer, p, value));
            }
        }

        let cancelled = progress.is_cancelled();
        self.apply_group(records, cancelled, IgnoreReason::NotFound);

        Ok(positions)
    }

    /// Reverses the visible bytes of `start..=stop`: `AA FF EE DC` becomes
    /// `DC EE FF AA`. A cancelled read changes nothing.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn reverse_range(
        &mut self,
        start: u64,
        stop: u64,
        progress: &mut dyn Progress,
    ) -> OverlayResult<EditOutcome> {
        let buffer = match self.editable() {
            Ok(buffer) => buffer,
            Err(reason) => return Ok(EditOutcome::Ignored(reason)),
        };

        let range = Selection::new(start, stop);
        let end = buffer.edited_len();
        if range.start >= end {
            return Ok(EditOutcome::Ignored(IgnoreReason::InvalidRange));
        }

        let last = range.stop.min(end - 1);
        let total = last - range.start + 1;
        let mut cells = Vec::new();
        let mut pos = range.start;

        while pos <= last {
            if progress.is_cancelled() {
                return Ok(EditOutcome::Cancelled);
            }

            let want = usize::try_from((last - pos + 1).min(buffer.chunk_size() as u64))?;
            let fresh = buffer.read_cells(pos, want, true)?;
            let Some(tail) = fresh.last() else {
                break;
            };

            pos = tail.position + 1;
            cells.extend(fresh.into_iter().filter(|cell| cell.position <= last));
            progress.report((pos - range.start).min(total), total);
        }

        let records = cells
            .iter()
            .zip(cells.iter().rev())
            .map(|(slot, source)| overwrite_record(buffer, slot.position, source.value))
            .collect();

        Ok(self.apply_group(records, false, IgnoreReason::InvalidRange))
    }

    /// Appends `bytes` after the end as one undo unit.
    pub fn append_bytes(&mut self, bytes: &[u8], progress: &mut dyn Progress) -> EditOutcome {
        let buffer = match self.editable() {
            Ok(buffer) => buffer,
            Err(reason) => return EditOutcome::Ignored(reason),
        };

        if bytes.is_empty() {
            return EditOutcome::Ignored(IgnoreReason::EmptyInput);
        }

        let end = buffer.edited_len();
        let mut records = Vec::with_capacity(bytes.len());
        let mut cancelled = false;

        for chunk in bytes.chunks(buffer.chunk_size()) {
            if progress.is_cancelled() {
                cancelled = true;
                break;
            }

            let base = end + records.len() as u64;
            records.extend(
                chunk
                    .iter()
                    .enumerate()
                    .map(|(i, &value)| EditRecord::added(base + i as u64, value)),
            );
            progress.report(records.len() as u64, bytes.len() as u64);
        }

        self.apply_group(records, cancelled, IgnoreReason::EmptyInput)
    }
}

/*

====================================
============= HISTORY ==============
====================================

*/

impl Document {
    /// Reverts up to `repeat` undo units and returns the positions touched.
    pub fn undo(&mut self, repeat: usize) -> Vec<u64> {
        if self.editable().is_err() {
            return Vec::new();
        }
        let Some(buffer) = self.buffer.as_mut() else {
            return Vec::new();
        };

        let positions = self.history.undo(buffer.overlay_mut(), repeat);

        if !positions.is_empty() {
            self.events.emit(DocumentEvent::Undone {
                positions: positions.clone(),
            });
        }

        positions
    }

    pub fn redo(&mut self, repeat: usize) -> Vec<u64> {
        if self.editable().is_err() {
            return Vec::new();
        }
        let Some(buffer) = self.buffer.as_mut() else {
            return Vec::new();
        };

        let positions = self.history.redo(buffer.overlay_mut(), repeat);

        if !positions.is_empty() {
            self.events.emit(DocumentEvent::Redone {
                positions: positions.clone(),
            });
        }

        positions
    }

    #[inline]
    #[must_use]
    pub fn undo_count(&self) -> usize {
        self.history.undo_count()
    }

    #[inline]
    #[must_use]
    pub fn redo_count(&self) -> usize {
        self.history.redo_count()
    }

    #[inline]
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.history.is_modified()
    }

    /// Drops every pending edit and the whole history.
    pub fn clear_all_changes(&mut self) {
        let Some(buffer) = self.buffer.as_mut() else {
            return;
        };

        let positions: Vec<u64> = buffer
            .overlay()
            .all_by_action(ActionFilter::All)
            .iter()
            .map(|record| record.position)
            .collect();

        buffer.overlay_mut().clear();
        self.history.clear();

        if !positions.is_empty() {
            self.events.emit(DocumentEvent::Undone { positions });
        }
    }
}

/*

====================================
========= SEARCH / COMPARE =========
====================================

*/

impl Document {
    fn next_search_start(&self) -> u64 {
        self.selection.map_or(0, |selection| selection.start + 1)
    }

    fn select_match(&mut self, position: u64, len: usize) {
        let stop = position + (len as u64).saturating_sub(1);
        self.selection = Some(Selection::new(position, stop));
        self.position = position;
    }

    /// First match at or after `start`. A hit becomes the selection.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn find_first(
        &mut self,
        pattern: &[u8],
        start: u64,
        progress: &mut dyn Progress,
    ) -> OverlayResult<Option<u64>> {
        let Some(buffer) = &self.buffer else {
            return Ok(None);
        };

        let found = hex_core::search::find_first(buffer, pattern, start, progress)?;

        if let Some(position) = found {
            self.select_match(position, pattern.len());
        }

        Ok(found)
    }

    /// Next match after the current selection.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn find_next(
        &mut self,
        pattern: &[u8],
        progress: &mut dyn Progress,
    ) -> OverlayResult<Option<u64>> {
        let start = self.next_search_start();

        self.find_first(pattern, start, progress)
    }

    /// Last match at or after `start`. A hit becomes the selection.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn find_last(
        &mut self,
        pattern: &[u8],
        start: u64,
        progress: &mut dyn Progress,
    ) -> OverlayResult<Option<u64>> {
        let Some(buffer) = &self.buffer else {
            return Ok(None);
        };

        let found = hex_core::search::find_last(buffer, pattern, start, progress)?;

        if let Some(position) = found {
            self.select_match(position, pattern.len());
        }

        Ok(found)
    }

    /// Every match, ascending. Empty when closed.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn find_all(
        &self,
        pattern: &[u8],
        progress: &mut dyn Progress,
    ) -> OverlayResult<Vec<u64>> {
        match &self.buffer {
            Some(buffer) => hex_core::search::find_all(buffer, pattern, progress),
            None => Ok(Vec::new()),
        }
    }

    /// Lazy diff against `other`, up to the shorter length. Empty if either
    /// side is closed.
    pub fn compare<'a>(
        &'a self,
        other: &'a Document,
        include_overlay: bool,
    ) -> impl Iterator<Item = OverlayResult<ByteDifference>> + 'a {
        self.buffer
            .as_ref()
            .zip(other.buffer.as_ref())
            .into_iter()
            .flat_map(move |(origin, destination)| {
                hex_core::compare::compare(origin, destination, include_overlay)
            })
    }

    /// Occurrences of each byte value in the edited view, deleted bytes excluded.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the source fails.
    pub fn byte_frequencies(&self, progress: &mut dyn Progress) -> OverlayResult<[u64; 256]> {
        let mut counts = [0u64; 256];
        let Some(buffer) = &self.buffer else {
            return Ok(counts);
        };

        let total = buffer.edited_len();
        let mut pos = 0;

        while !progress.is_cancelled() {
            let cells = buffer.read_cells(pos, buffer.chunk_size(), true)?;
            let Some(last) = cells.last() else {
                break;
            };

            pos = last.position + 1;
            for cell in &cells {
                counts[usize::from(cell.value)] += 1;
            }
            progress.report(pos.min(total), total);
        }

        Ok(counts)
    }
}

/*

====================================
============= COMMIT ===============
====================================

*/

impl Document {
    /// Writes pending modifications over the source itself.
    ///
    /// Only pure modifications can be submitted in place; deletions and
    /// appended bytes need [`Document::submit_changes_to`]. An I/O failure
    /// leaves every pending edit and the history as they were.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if a write fails.
    pub fn submit_changes(&mut self, progress: &mut dyn Progress) -> OverlayResult<CommitStatus> {
        if self.buffer.is_some() && self.is_read_only() {
            return Ok(CommitStatus::Ignored(IgnoreReason::ReadOnly));
        }
        let Some(buffer) = self.buffer.as_mut() else {
            return Ok(CommitStatus::Ignored(IgnoreReason::Closed));
        };

        let status = hex_core::commit::submit_in_place(buffer, &mut self.history, progress)?;

        if status == CommitStatus::Completed {
            self.events.emit(DocumentEvent::ChangesSubmitted);
        }

        Ok(status)
    }

    /// Writes the edited document to `destination`, which then becomes the
    /// open source. Handles deletions and appended bytes.
    ///
    /// The destination may be left partially written if an I/O error
    /// occurs or the call is cancelled.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the destination cannot be
    ///   written or reopened.
    pub fn submit_changes_to(
        &mut self,
        destination: impl AsRef<std::path::Path>,
        overwrite: bool,
        progress: &mut dyn Progress,
    ) -> OverlayResult<CommitStatus> {
        let Some(buffer) = self.buffer.as_mut() else {
            return Ok(CommitStatus::Ignored(IgnoreReason::Closed));
        };

        let status = hex_core::commit::submit_to_destination(
            buffer,
            &mut self.history,
            destination.as_ref(),
            overwrite,
            progress,
        )?;

        if status == CommitStatus::Completed {
            self.bookmarks.retain(|bookmark| bookmark.position < buffer.length());
            self.position = self.position.min(buffer.edited_len());
            self.events.emit(DocumentEvent::ChangesSubmitted);
        }

        Ok(status)
    }
}

/*

====================================
============= SESSION ==============
====================================

*/

impl Document {
    #[must_use]
    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn set_selection(&mut self, start: u64, stop: u64) {
        self.selection = Some(Selection::new(start, stop));
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    #[inline]
    #[must_use]
    pub fn first_visible_position(&self) -> u64 {
        self.first_visible_position
    }

    pub fn set_first_visible_position(&mut self, position: u64) {
        self.first_visible_position = position;
    }

    #[must_use]
    pub fn bookmarks(&self) -> &[BookmarkEntry] {
        &self.bookmarks
    }

    /// Bookmarks `position`, replacing the description of an existing one.
    pub fn add_bookmark(&mut self, position: u64, description: impl Into<String>) -> EditOutcome {
        if self.buffer.is_none() {
            return EditOutcome::Ignored(IgnoreReason::Closed);
        }

        if position >= self.edited_length() {
            return EditOutcome::Ignored(IgnoreReason::InvalidRange);
        }

        let description = description.into();
        match self
            .bookmarks
            .binary_search_by_key(&position, |bookmark| bookmark.position)
        {
            Ok(index) => self.bookmarks[index].description = description,
            Err(index) => self.bookmarks.insert(
                index,
                BookmarkEntry {
                    position,
                    description,
                },
            ),
        }

        EditOutcome::Applied
    }

    pub fn remove_bookmark(&mut self, position: u64) -> bool {
        let before = self.bookmarks.len();
        self.bookmarks.retain(|bookmark| bookmark.position != position);
        self.bookmarks.len() != before
    }

    pub fn clear_bookmarks(&mut self) {
        self.bookmarks.clear();
    }

    /// Snapshot of the session, or `None` when closed.
    #[must_use]
    pub fn serialize(&self) -> Option<SessionState> {
        let buffer = self.buffer.as_ref()?;
        let selection = self.selection.unwrap_or(Selection { start: 0, stop: 0 });

        let mut state = SessionState {
            selection_start: selection.start,
            selection_stop: selection.stop,
            first_visible_position: self.first_visible_position,
            read_only: self.read_only,
            bookmarks: self.bookmarks.clone(),
            ..SessionState::default()
        };
        state.capture_edits(buffer.overlay());

        Some(state)
    }

    /// Replaces all pending edits, the selection and the bookmarks with
    /// `state`.
    ///
    /// Each edit goes into the history on its own. Edits that do not fit
    /// the open source are skipped with a warning: modifications must lie
    /// inside it, and the appended slots (added bytes plus deleted slots past
    /// the end) must continue it without gaps. The read-only flag of a locked
    /// document is kept.
    pub fn deserialize(&mut self, state: &SessionState) -> EditOutcome {
        let Some(buffer) = self.buffer.as_mut() else {
            return EditOutcome::Ignored(IgnoreReason::Closed);
        };

        buffer.overlay_mut().clear();
        self.history.clear();

        let length = buffer.length();
        let mut skipped = 0usize;

        let mut records = state.records();
        records.sort_by_key(|record| (record.action == ByteAction::Added, record.position));

        let mut tail: Vec<u64> = records
            .iter()
            .filter(|record| record.position >= length && record.action != ByteAction::Modified)
            .map(|record| record.position)
            .collect();
        tail.sort_unstable();
        tail.dedup();
        let appended_end = length
            + tail
                .iter()
                .zip(length..)
                .take_while(|(position, expected)| **position == *expected)
                .count() as u64;

        for record in records {
            let fits = match record.action {
                ByteAction::Modified => record.position < length,
                ByteAction::Deleted => record.position < appended_end,
                ByteAction::Added => (length..appended_end).contains(&record.position),
                ByteAction::Nothing => false,
            };

            if !fits {
                skipped += 1;
                continue;
            }

            self.history.apply(buffer.overlay_mut(), record);
        }

        if skipped > 0 {
            tracing::warn!(skipped, length, "session edits outside the source were skipped");
        }

        self.selection = (state.selection_start != 0 || state.selection_stop != 0)
            .then(|| Selection::new(state.selection_start, state.selection_stop));
        self.first_visible_position = state.first_visible_position;
        self.bookmarks = state.bookmarks.clone();
        self.bookmarks.sort_by_key(|bookmark| bookmark.position);
        if !self.locked {
            self.read_only = state.read_only;
        }

        self.events.emit(DocumentEvent::StateLoaded);

        EditOutcome::Applied
    }

    /// Writes [`Document::serialize`] to `path`. Returns `false` when closed.
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the file cannot be written.
    pub fn save_state(&self, path: impl AsRef<std::path::Path>) -> OverlayResult<bool> {
        let Some(state) = self.serialize() else {
            return Ok(false);
        };

        state.write_to(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "session saved");

        Ok(true)
    }

    /// Reads a session from `path` and applies it with [`Document::deserialize`].
    ///
    /// # Errors
    ///
    /// - [`hex_core::errors::OverlayError::Io`] if the file cannot be read.
    /// - [`hex_core::errors::OverlayError::Json`] if it is not JSON.
    pub fn load_state(&mut self, path: impl AsRef<std::path::Path>) -> OverlayResult<EditOutcome> {
        if self.buffer.is_none() {
            return Ok(EditOutcome::Ignored(IgnoreReason::Closed));
        }

        let state = SessionState::read_from(path.as_ref())?;

        Ok(self.deserialize(&state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::long_process::{LongProcessKind, ProcessStatus};
    use std::io::Cursor;

    fn setup(bytes: &[u8]) -> Document {
        let mut doc = Document::new();
        doc.open_stream(Cursor::new(bytes.to_vec()), OpenOptions::default())
            .unwrap();
        doc
    }

    /// Stream that reads fine but refuses every write.
    #[derive(Debug)]
    struct WriteFails(Cursor<Vec<u8>>);

    impl Read for WriteFails {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Seek for WriteFails {
        fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
            self.0.seek(pos)
        }
    }

    impl Write for WriteFails {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("device unplugged"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_modify_then_undo() {
        let mut doc = setup(&[0xAA, 0xBB, 0xCC, 0xDD]);

        assert_eq!(doc.modify_byte(1, 0xFF, 1), EditOutcome::Applied);
        assert_eq!(
            doc.read_logical_range(0, 4, false).unwrap(),
            vec![0xAA, 0xFF, 0xCC, 0xDD]
        );
        assert_eq!(doc.state(), DocumentState::Dirty);

        assert_eq!(doc.undo(1), vec![1]);
        assert_eq!(
            doc.read_logical_range(0, 4, false).unwrap(),
            vec![0xAA, 0xBB, 0xCC, 0xDD]
        );
        assert_eq!(doc.undo_count(), 0);
        assert_eq!(doc.state(), DocumentState::Clean);
    }

    #[test]
    fn test_linked_modifications_redo_together() {
        let mut doc = setup(&[0; 8]);
        doc.modify_byte(0, 1, 1);
        doc.modify_byte(1, 2, 1);
        doc.modify_byte(2, 3, 3);

        assert_eq!(doc.undo(1), vec![2, 1, 0]);
        assert_eq!(doc.redo(1), vec![0, 1, 2]);
        assert_eq!((doc.undo_count(), doc.redo_count()), (3, 0));
        assert_eq!(doc.read_logical_range(0, 3, false).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_delete_and_hide() {
        let mut doc = setup(&[0x00, 0x01, 0x02, 0x03, 0x04]);

        assert!(doc.delete_byte(2).is_applied());
        assert_eq!(
            doc.read_logical_range(0, 4, true).unwrap(),
            vec![0x00, 0x01, 0x03, 0x04]
        );
        assert_eq!(doc.logical_length(true), 4);
        assert_eq!(
            doc.delete_byte(2),
            EditOutcome::Ignored(IgnoreReason::InvalidRange),
            "Already deleted"
        );
    }

    #[test]
    fn test_position_translation() {
        let mut doc = setup(&[0; 6]);
        doc.delete_byte(1);
        doc.delete_byte(2);

        assert_eq!(doc.count_deleted_before(4), Some(2));
        assert_eq!(doc.to_logical(4, true), Some(2));
        assert_eq!(doc.to_logical(4, false), Some(4));
        assert_eq!(doc.to_physical(1), Some(3));
        assert_eq!(doc.to_physical(4), None, "Only four bytes are visible");

        assert_eq!(doc.next_valid_position(0, 1), Some(3));
        assert_eq!(doc.next_valid_position(3, -1), Some(0));
        assert_eq!(doc.next_valid_position(0, -1), None);
        assert_eq!(doc.next_valid_position(5, 1), None);
        assert_eq!(doc.next_valid_position(2, 0), Some(2));

        assert_eq!(Document::new().next_valid_position(0, 1), None);
        assert_eq!(Document::new().to_logical(0, true), None);
    }

    #[test]
    fn test_find_all_scenario() {
        let doc = setup(&[0xAA, 0xBB, 0xAA, 0xCC, 0xAA]);

        assert_eq!(doc.find_all(&[0xAA], &mut NoProgress).unwrap(), vec![0, 2, 4]);
    }

    #[test]
    fn test_grouped_paste_undoes_as_one() {
        let mut doc = setup(&[0u8; 10]);

        assert!(doc.paste(5, &[1, 2, 3], false, &mut NoProgress).is_applied());
        assert_eq!(doc.history().undo_head().map(|e| e.record.undo_length), Some(3));

        let mut undone = doc.undo(1);
        undone.sort_unstable();

        assert_eq!(undone, vec![5, 6, 7]);
        assert_eq!(doc.get_all_bytes(true).unwrap(), vec![0u8; 10]);
        assert_eq!(doc.undo_count(), 0);
    }

    #[test]
    fn test_paste_expand_and_skip_deleted() {
        let mut doc = setup(&[0, 0, 0, 0]);
        doc.delete_byte(2);

        assert!(doc.paste(1, &[7, 8, 9, 10], true, &mut NoProgress).is_applied());
        assert_eq!(doc.get_all_bytes(true).unwrap(), vec![0, 7, 8, 9, 10]);

        let mut doc = setup(&[0, 0, 0]);
        assert!(doc.paste(1, &[7, 8, 9, 10], false, &mut NoProgress).is_applied());
        assert_eq!(doc.get_all_bytes(true).unwrap(), vec![0, 7, 8], "Truncated without expand");
    }

    #[test]
    fn test_paste_text_hex_or_raw() {
        let mut doc = setup(&[0u8; 4]);

        doc.paste_text(0, "DE AD", false, &mut NoProgress);
        assert_eq!(doc.read_logical_range(0, 2, false).unwrap(), vec![0xDE, 0xAD]);

        doc.paste_text(2, "hi", false, &mut NoProgress);
        assert_eq!(doc.read_logical_range(2, 2, false).unwrap(), b"hi".to_vec());
    }

    #[test]
    fn test_in_place_failure_keeps_edits() {
        let mut doc = Document::new();
        doc.open_stream(WriteFails(Cursor::new(vec![1, 2, 3, 4])), OpenOptions::default())
            .unwrap();
        doc.modify_byte(0, 9, 1);
        doc.modify_byte(3, 8, 1);
        let before = doc.serialize();
        let undo_before = doc.undo_count();

        assert!(doc.submit_changes(&mut NoProgress).is_err());

        assert_eq!(doc.serialize(), before);
        assert_eq!(doc.undo_count(), undo_before);
        assert!(doc.is_modified());
    }

    #[test]
    fn test_submit_in_place_on_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [0xAA, 0xBB, 0xCC]).unwrap();
        let mut doc = Document::new();
        doc.open_file(&path, OpenOptions::default()).unwrap();
        let events = doc.subscribe();

        doc.modify_byte(2, 0x11, 1);
        let status = doc.submit_changes(&mut NoProgress).unwrap();

        assert_eq!(status, CommitStatus::Completed);
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xAA, 0xBB, 0x11]);
        assert!(!doc.is_modified());
        assert!(events.try_iter().any(|e| e == DocumentEvent::ChangesSubmitted));
    }

    #[test]
    fn test_length_changes_need_destination() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let mut doc = setup(&[1, 2, 3]);
        doc.delete_byte(0);
        doc.insert_at_end(4);

        assert_eq!(
            doc.submit_changes(&mut NoProgress).unwrap(),
            CommitStatus::Ignored(IgnoreReason::LengthChanging)
        );
        assert_eq!(
            doc.submit_changes_to(&target, false, &mut NoProgress).unwrap(),
            CommitStatus::Completed
        );
        assert_eq!(std::fs::read(&target).unwrap(), vec![2, 3, 4]);
        assert_eq!(doc.length(), 3);
        assert_eq!(doc.state(), DocumentState::Clean);
    }

    #[test]
    fn test_read_only_ignores_edits() {
        let mut doc = Document::new();
        doc.open_stream(Cursor::new(vec![1u8, 2]), OpenOptions::default().read_only(true))
            .unwrap();

        assert_eq!(doc.modify_byte(0, 9, 1), EditOutcome::Ignored(IgnoreReason::ReadOnly));
        assert_eq!(doc.insert_at_end(1), EditOutcome::Ignored(IgnoreReason::ReadOnly));
        assert!(doc.set_read_only(false).is_applied());
        assert!(doc.modify_byte(0, 9, 1).is_applied());
    }

    #[test]
    fn test_reader_is_locked() {
        let mut doc = Document::new();
        doc.open_reader(Cursor::new(vec![1u8, 2]), OpenOptions::default())
            .unwrap();

        assert!(doc.is_locked_file());
        assert_eq!(doc.set_read_only(false), EditOutcome::Ignored(IgnoreReason::ReadOnly));
        assert_eq!(doc.delete_byte(0), EditOutcome::Ignored(IgnoreReason::ReadOnly));
    }

    #[test]
    fn test_closed_document_is_inert() {
        let mut doc = Document::new();

        assert_eq!(doc.state(), DocumentState::Closed);
        assert_eq!(doc.modify_byte(0, 1, 1), EditOutcome::Ignored(IgnoreReason::Closed));
        assert!(doc.find_all(&[1], &mut NoProgress).unwrap().is_empty());
        assert!(doc.undo(1).is_empty());
        assert_eq!(doc.get_byte(0, true).unwrap(), None);
        assert!(doc.serialize().is_none());
        assert_eq!(doc.compare(&setup(&[1]), true).count(), 0);
    }

    #[test]
    fn test_insert_is_append_only() {
        let mut doc = setup(&[1, 2, 3]);

        assert_eq!(doc.insert(1, 9), EditOutcome::Ignored(IgnoreReason::MidStreamInsert));
        assert!(doc.insert(3, 9).is_applied());
        assert_eq!(doc.edited_length(), 4);
        assert_eq!(doc.length(), 3);
        assert_eq!(doc.get_all_bytes(true).unwrap(), vec![1, 2, 3, 9]);
        assert_eq!(doc.get_all_bytes(false).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_events_carry_positions() {
        let mut doc = setup(&[0; 4]);
        let events = doc.subscribe();

        doc.modify_byte(1, 5, 1);
        doc.undo(1);
        doc.redo(1);

        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![
                DocumentEvent::BytesModified { positions: vec![1] },
                DocumentEvent::Undone { positions: vec![1] },
                DocumentEvent::Redone { positions: vec![1] },
            ]
        );
    }

    #[test]
    fn test_fill_skips_deleted() {
        let mut doc = setup(&[0; 6]);
        doc.delete_byte(2);

        assert!(doc.fill_with_byte(1, 3, 0xEE, &mut NoProgress).is_applied());
        assert_eq!(doc.get_all_bytes(true).unwrap(), vec![0, 0xEE, 0xEE, 0, 0]);
        assert_eq!(doc.undo(1).len(), 2);
    }

    #[test]
    fn test_replace_byte_in_range() {
        let mut doc = setup(&[1, 2, 1, 2, 1]);

        let outcome = doc.replace_byte(1, 4, 1, 9, &mut NoProgress).unwrap();

        assert!(outcome.is_applied());
        assert_eq!(doc.get_all_bytes(true).unwrap(), vec![1, 2, 9, 2, 9]);
        assert_eq!(
            doc.replace_byte(0, 5, 0x55, 9, &mut NoProgress).unwrap(),
            EditOutcome::Ignored(IgnoreReason::NotFound)
        );
    }

    #[test]
    fn test_replace_all_is_one_undo() {
        let mut doc = setup(b"ab ab ab");

        let positions = doc.replace_all(b"ab", b"xyz", true, &mut NoProgress).unwrap();

        assert_eq!(positions, vec![0, 3, 6]);
        assert_eq!(doc.get_all_bytes(true).unwrap(), b"xy xy xy".to_vec());

        doc.undo(1);
        assert_eq!(doc.get_all_bytes(true).unwrap(), b"ab ab ab".to_vec());
    }

    #[test]
    fn test_find_and_replace_next_follow_selection() {
        let mut doc = setup(b"abXabXab");

        assert_eq!(doc.find_next(b"ab", &mut NoProgress).unwrap(), Some(0));
        assert_eq!(doc.selection(), Some(Selection::new(0, 1)));
        assert_eq!(doc.find_next(b"ab", &mut NoProgress).unwrap(), Some(3));

        assert_eq!(
            doc.replace_next(b"ab", b"zz", true, &mut NoProgress).unwrap(),
            Some(6)
        );
        assert_eq!(doc.get_all_bytes(true).unwrap(), b"abXabXzz".to_vec());
        assert_eq!(doc.find_last(b"ab", 0, &mut NoProgress).unwrap(), Some(3));
    }

    #[test]
    fn test_reverse_range() {
        let mut doc = setup(&[0xAA, 0xFF, 0xEE, 0xDC, 0x00]);

        assert!(doc.reverse_range(3, 0, &mut NoProgress).unwrap().is_applied());
        assert_eq!(
            doc.get_all_bytes(true).unwrap(),
            vec![0xDC, 0xEE, 0xFF, 0xAA, 0x00]
        );
    }

    #[test]
    fn test_append_and_delete_range() {
        let mut doc = setup(&[1, 2]);

        assert!(doc.append_bytes(&[3, 4, 5], &mut NoProgress).is_applied());
        assert_eq!(doc.edited_length(), 5);

        assert!(doc.delete_range(1, 3, &mut NoProgress).is_applied());
        assert_eq!(doc.get_all_bytes(true).unwrap(), vec![1, 5]);

        doc.undo(1);
        assert_eq!(doc.get_all_bytes(true).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_copy_helpers() {
        let mut doc = setup(&[0x41, 0x42, 0x00, 0x43]);
        doc.modify_byte(0, 0x61, 1);

        assert_eq!(doc.get_copy_data(3, 1, false).unwrap(), vec![0x42, 0x00, 0x43]);
        assert_eq!(
            doc.copy_as(hex_core::hexfmt::CopyMode::HexString, 0, 1).unwrap(),
            "61 42"
        );
        assert_eq!(
            doc.copy_as(hex_core::hexfmt::CopyMode::AsciiString, 0, 3).unwrap(),
            "aB.C"
        );
    }

    #[test]
    fn test_compare_documents() {
        let mut a = setup(&[1, 2, 3, 4]);
        let b = setup(&[1, 2, 3]);
        a.modify_byte(1, 7, 1);

        let diffs: Vec<_> = a.compare(&b, true).map(Result::unwrap).collect();

        assert_eq!(
            diffs,
            vec![ByteDifference {
                position: 1,
                origin: Some(7),
                destination: Some(2)
            }]
        );
        assert_eq!(a.compare(&b, false).count(), 0);
    }

    #[test]
    fn test_byte_frequencies() {
        let mut doc = setup(&[1, 1, 2, 3]);
        doc.delete_byte(3);

        let counts = doc.byte_frequencies(&mut NoProgress).unwrap();

        assert_eq!(counts[1], 2);
        assert_eq!(counts[2], 1);
        assert_eq!(counts[3], 0, "Deleted bytes are not counted");
    }

    #[test]
    fn test_session_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut doc = setup(&[0, 1, 2, 3]);
        doc.modify_byte(0, 0xF0, 1);
        doc.delete_byte(2);
        doc.insert_at_end(0x44);
        doc.add_bookmark(1, "one");
        doc.set_selection(1, 3);

        assert!(doc.save_state(&path).unwrap());

        let mut fresh = setup(&[0, 1, 2, 3]);
        let events = fresh.subscribe();
        assert!(fresh.load_state(&path).unwrap().is_applied());

        assert_eq!(
            fresh.get_all_bytes(true).unwrap(),
            doc.get_all_bytes(true).unwrap()
        );
        assert_eq!(fresh.bookmarks(), doc.bookmarks());
        assert_eq!(fresh.selection(), Some(Selection::new(1, 3)));
        assert_eq!(fresh.undo_count(), 3, "Loaded edits are undone one at a time");
        assert!(events.try_iter().any(|e| e == DocumentEvent::StateLoaded));
    }

    #[test]
    fn test_session_keeps_deleted_appended_slot() {
        let mut doc = setup(&[1, 2, 3, 4, 5]);
        doc.append_bytes(&[0x0A, 0x0B, 0x0C], &mut NoProgress);
        assert!(doc.delete_byte(6).is_applied());
        let state = doc.serialize().unwrap();

        let mut fresh = setup(&[1, 2, 3, 4, 5]);
        assert!(fresh.deserialize(&state).is_applied());

        assert_eq!(
            fresh.get_all_bytes(true).unwrap(),
            vec![1, 2, 3, 4, 5, 0x0A, 0x0C]
        );
        assert_eq!(fresh.edited_length(), 8);
        assert_eq!(fresh.serialize(), Some(state));
    }

    #[test]
    fn test_deserialize_skips_foreign_edits() {
        let mut doc = setup(&[0, 1]);
        doc.modify_byte(0, 9, 1);
        let state = SessionState {
            modified: vec![hex_core::interchange::ByteEntry {
                position: 40,
                value: 1,
            }],
            deleted: vec![1],
            added: vec![hex_core::interchange::ByteEntry {
                position: 7,
                value: 1,
            }],
            ..SessionState::default()
        };

        assert!(doc.deserialize(&state).is_applied());
        assert_eq!(doc.get_all_bytes(true).unwrap(), vec![0], "Replaced, not merged");
        assert_eq!(doc.undo_count(), 1);
    }

    #[test]
    fn test_bookmarks() {
        let mut doc = setup(&[0; 8]);

        doc.add_bookmark(5, "b");
        doc.add_bookmark(2, "a");
        doc.add_bookmark(5, "b2");

        let positions: Vec<u64> = doc.bookmarks().iter().map(|b| b.position).collect();
        assert_eq!(positions, vec![2, 5]);
        assert_eq!(doc.bookmarks()[1].description, "b2");
        assert_eq!(
            doc.add_bookmark(8, "x"),
            EditOutcome::Ignored(IgnoreReason::InvalidRange)
        );
        assert!(doc.remove_bookmark(2));
        assert!(!doc.remove_bookmark(2));
    }

    #[test]
    fn test_read_for_epoch() {
        let doc = setup(&[5, 6, 7]);
        let epochs = crate::epoch::RefreshEpoch::new();
        let stale = epochs.advance();
        let request = crate::epoch::ReadRequest {
            epoch: epochs.advance(),
            start: 1,
            count: 2,
            hide_deleted: false,
        };

        let response = doc.read_for_epoch(request).unwrap();
        let values: Vec<u8> = response.cells.iter().map(|c| c.value).collect();

        assert_eq!(values, vec![6, 7]);
        assert!(epochs.accept(response.clone()).is_some());
        assert!(
            epochs
                .accept(crate::epoch::ReadResponse {
                    epoch: stale,
                    ..response
                })
                .is_none()
        );
    }

    #[test]
    fn test_long_process_completes() {
        let mut doc = setup(&[0u8; 1000]);
        let watcher = doc.subscribe();

        let process = doc
            .spawn(LongProcessKind::FillWithByte, |doc, progress| {
                Ok(doc.fill_with_byte(0, 1000, 0xEE, progress))
            })
            .unwrap();
        let (doc, outcome) = process.join().unwrap();

        assert_eq!(outcome.unwrap(), EditOutcome::Applied);
        assert_eq!(doc.get_all_bytes(true).unwrap(), vec![0xEE; 1000]);
        assert!(!doc.is_on_long_process());

        let events: Vec<_> = watcher.try_iter().collect();
        assert_eq!(
            events.first(),
            Some(&DocumentEvent::ProcessStarted {
                kind: LongProcessKind::FillWithByte
            })
        );
        assert!(events.contains(&DocumentEvent::ProcessFinished {
            kind: LongProcessKind::FillWithByte,
            status: ProcessStatus::Completed,
        }));
    }

    #[test]
    fn test_long_process_cancel() {
        let mut doc = Document::new();
        doc.open_stream(
            Cursor::new(vec![0u8; 64]),
            OpenOptions::default().chunk_size(8),
        )
        .unwrap();
        let (go, wait) = crossbeam_channel::bounded::<()>(0);

        let process = doc
            .spawn(LongProcessKind::FillWithByte, move |doc, progress| {
                let _ = wait.recv();
                Ok(doc.fill_with_byte(0, 64, 1, progress))
            })
            .unwrap();
        process.cancel();
        go.send(()).unwrap();

        let events = process.events().clone();
        let (doc, outcome) = process.join().unwrap();

        assert_eq!(outcome.unwrap(), EditOutcome::Cancelled);
        assert!(!doc.is_modified());
        assert!(events.try_iter().any(|e| e
            == DocumentEvent::ProcessFinished {
                kind: LongProcessKind::FillWithByte,
                status: ProcessStatus::Cancelled,
            }));
    }
}
