/// Default number of bytes pulled from the source per read.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// One byte of the edited view together with where it lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogicalByte {
    pub position: u64,
    pub value: u8,
    pub action: crate::enums::ByteAction,
}

/// # The overlay-applied view of a physical source.
///
/// - The source is never rewritten while edits are pending; every edit lives
///   in the [`crate::overlay::OverlayStore`] and masks the byte beneath it.
/// - Appended bytes occupy positions `length()..edited_len()`.
/// - Nothing here loads the whole source: reads go through fixed-size chunks.
#[derive(Debug)]
pub struct OverlayBuffer {
    source: Box<dyn hex_io::source::ByteSource>,
    overlay: crate::overlay::OverlayStore,
    chunk_size: usize,
}

/*

====================================
========= CREATION METHOD ==========
====================================

*/

impl OverlayBuffer {
    #[must_use]
    pub fn new(source: Box<dyn hex_io::source::ByteSource>) -> Self {
        Self {
            source,
            overlay: crate::overlay::OverlayStore::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Swaps in a new physical source and drops every pending edit.
    pub fn replace_source(&mut self, source: Box<dyn hex_io::source::ByteSource>) {
        self.source = source;
        self.overlay.clear();
    }
}

/*

====================================
========= INLINE METHODS  ==========
====================================

*/

impl OverlayBuffer {
    /// Physical length, independent of pending edits.
    #[inline]
    #[must_use]
    pub fn length(&self) -> u64 {
        self.source.len()
    }

    /// Number of byte slots appended past the physical end.
    #[inline]
    #[must_use]
    pub fn appended_len(&self) -> u64 {
        self.overlay.count_from(self.length())
    }

    /// Physical length plus appended slots.
    #[inline]
    #[must_use]
    pub fn edited_len(&self) -> u64 {
        self.length() + self.appended_len()
    }

    #[inline]
    #[must_use]
    pub fn deleted_count(&self) -> u64 {
        self.overlay.count(crate::enums::ActionFilter::Deleted) as u64
    }

    /// Length of the view a caller sees, with or without deleted bytes.
    #[inline]
    #[must_use]
    pub fn logical_len(&self, hide_deleted: bool) -> u64 {
        if hide_deleted {
            self.edited_len().saturating_sub(self.deleted_count())
        } else {
            self.edited_len()
        }
    }

    #[inline]
    #[must_use]
    pub fn overlay(&self) -> &crate::overlay::OverlayStore {
        &self.overlay
    }

    #[inline]
    pub fn overlay_mut(&mut self) -> &mut crate::overlay::OverlayStore {
        &mut self.overlay
    }

    #[inline]
    #[must_use]
    pub fn source(&self) -> &dyn hex_io::source::ByteSource {
        self.source.as_ref()
    }

    #[inline]
    pub fn source_mut(&mut self) -> &mut dyn hex_io::source::ByteSource {
        self.source.as_mut()
    }

    #[inline]
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// What the overlay says about `position`, given the physical byte under it.
    #[inline]
    fn overlay_value(&self, position: u64, physical: Option<u8>) -> Option<u8> {
        match self.overlay.get(position, crate::enums::ActionFilter::All) {
            Some(record) => match record.action {
                crate::enums::ByteAction::Modified | crate::enums::ByteAction::Added => {
                    record.value
                }
                crate::enums::ByteAction::Deleted => None,
                crate::enums::ByteAction::Nothing => physical,
            },
            None => physical,
        }
    }
}

/*

====================================
============== READS ===============
====================================

*/

impl OverlayBuffer {
    /// Reads raw physical bytes. Short at the end of the source.
    ///
    /// # Errors
    ///
    /// - [`crate::errors::OverlayError::Io`] if the source fails.
    pub fn read_physical(&self, pos: u64, buf: &mut [u8]) -> crate::errors::OverlayResult<usize> {
        Ok(self.source.read_at(pos, buf)?)
    }

    /// The byte at `position`.
    ///
    /// With `copy_changes` the overlay is applied: modified and appended bytes
    /// come from the overlay and deleted bytes read as `None`. Without it only
    /// physical bytes exist.
    ///
    /// # Errors
    ///
    /// - [`crate::errors::OverlayError::Io`] if the source fails.
    pub fn byte_at(&self, position: u64, copy_changes: bool) -> crate::errors::OverlayResult<Option<u8>> {
        let physical = if position < self.length() {
            let mut one = [0u8; 1];
            (self.source.read_at(position, &mut one)? == 1).then_some(one[0])
        } else {
            None
        };

        if copy_changes {
            Ok(self.overlay_value(position, physical))
        } else {
            Ok(physical)
        }
    }

    /// Positional values for `start..start + count`, one entry per position.
    ///
    /// With `copy_changes` the range may extend into appended slots and
    /// deleted bytes are `None`; without it the range stops at the physical end.
    ///
    /// # Errors
    ///
    /// - [`crate::errors::OverlayError::Io`] if the source fails.
    pub fn read_values(
        &self,
        start: u64,
        count: u64,
        copy_changes: bool,
    ) -> crate::errors::OverlayResult<Vec<Option<u8>>> {
        let length = self.length();
        let end = if copy_changes { self.edited_len() } else { length };
        let stop = start.saturating_add(count).min(end);

        let mut out = Vec::with_capacity(usize::try_from(stop.saturating_sub(start))?);
        let mut chunk = vec![0u8; self.chunk_size];
        let mut pos = start;

        while pos < stop {
            if pos < length {
                let want = usize::try_from((stop.min(length) - pos).min(self.chunk_size as u64))?;
                let read = self.source.read_at(pos, &mut chunk[..want])?;

                if read == 0 {
                    break;
                }

                for (offset, &byte) in chunk[..read].iter().enumerate() {
                    let p = pos + offset as u64;
                    out.push(if copy_changes {
                        self.overlay_value(p, Some(byte))
                    } else {
                        Some(byte)
                    });
                }

                pos += read as u64;
            } else {
                out.push(self.overlay_value(pos, None));
                pos += 1;
            }
        }

        Ok(out)
    }

    /// Up to `count` bytes of the edited view starting at physical `start`.
    ///
    /// When `hide_deleted` is set, deleted bytes are skipped and the walk keeps
    /// going until `count` bytes are collected or the edited end is reached.
    /// Otherwise deleted bytes show their physical value with
    /// [`crate::enums::ByteAction::Deleted`]. Deleted appended slots have no
    /// physical byte and are always skipped.
    ///
    /// # Errors
    ///
    /// - [`crate::errors::OverlayError::Io`] if the source fails.
    pub fn read_cells(
        &self,
        start: u64,
        count: usize,
        hide_deleted: bool,
    ) -> crate::errors::OverlayResult<Vec<LogicalByte>> {
        let length = self.length();
        let end = self.edited_len();

        let mut out = Vec::with_capacity(count.min(self.chunk_size));
        let mut chunk = vec![0u8; self.chunk_size];
        let mut pos = start;

        while out.len() < count && pos < end {
            if pos < length {
                let want = usize::try_from((length - pos).min(self.chunk_size as u64))?;
                let read = self.source.read_at(pos, &mut chunk[..want])?;

                if read == 0 {
                    break;
                }

                for (offset, &byte) in chunk[..read].iter().enumerate() {
                    let p = pos + offset as u64;
                    let cell = match self.overlay.get(p, crate::enums::ActionFilter::All) {
                        Some(record) if record.action == crate::enums::ByteAction::Deleted => {
                            if hide_deleted {
                                continue;
                            }
                            LogicalByte {
                                position: p,
                                value: byte,
                                action: record.action,
                            }
                        }
                        Some(record) => LogicalByte {
                            position: p,
                            value: record.value.unwrap_or(byte),
                            action: record.action,
                        },
                        None => LogicalByte {
                            position: p,
                            value: byte,
                            action: crate::enums::ByteAction::Nothing,
                        },
                    };

                    out.push(cell);

                    if out.len() == count {
                        break;
                    }
                }

                pos += read as u64;
            } else {
                if let Some(record) = self.overlay.get(pos, crate::enums::ActionFilter::All)
                    && let Some(value) = record.value
                    && record.action != crate::enums::ByteAction::Deleted
                {
                    out.push(LogicalByte {
                        position: pos,
                        value,
                        action: record.action,
                    });
                }

                pos += 1;
            }
        }

        Ok(out)
    }

    /// Bytes of [`OverlayBuffer::read_cells`] without their positions.
    ///
    /// # Errors
    ///
    /// - [`crate::errors::OverlayError::Io`] if the source fails.
    pub fn read_logical_range(
        &self,
        start: u64,
        count: usize,
        hide_deleted: bool,
    ) -> crate::errors::OverlayResult<Vec<u8>> {
        Ok(self
            .read_cells(start, count, hide_deleted)?
            .into_iter()
            .map(|cell| cell.value)
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::OverlayBuffer;
    use crate::enums::{ByteAction, EditRecord};

    pub(crate) fn buffer_of(bytes: &[u8]) -> OverlayBuffer {
        let source = hex_io::stream::StreamSource::new(std::io::Cursor::new(bytes.to_vec()), true)
            .unwrap();
        OverlayBuffer::new(Box::new(source))
    }

    #[test]
    fn test_modified_masks_physical() {
        let mut buf = buffer_of(&[0xAA, 0xBB, 0xCC, 0xDD]);
        buf.overlay_mut().put(1, EditRecord::modified(1, 0xFF));

        assert_eq!(
            buf.read_logical_range(0, 4, false).unwrap(),
            vec![0xAA, 0xFF, 0xCC, 0xDD]
        );
        assert_eq!(buf.byte_at(1, true).unwrap(), Some(0xFF));
        assert_eq!(buf.byte_at(1, false).unwrap(), Some(0xBB));
    }

    #[test]
    fn test_hidden_deletions_are_skipped() {
        let mut buf = buffer_of(&[0x00, 0x01, 0x02, 0x03, 0x04]);
        buf.overlay_mut().put(2, EditRecord::deleted(2));

        assert_eq!(
            buf.read_logical_range(0, 4, true).unwrap(),
            vec![0x00, 0x01, 0x03, 0x04]
        );

        let shown = buf.read_cells(0, 5, false).unwrap();
        assert_eq!(shown[2].action, ByteAction::Deleted);
        assert_eq!(shown[2].value, 0x02, "Visible deletions keep their physical byte");
        assert_eq!(buf.logical_len(true), 4);
        assert_eq!(buf.byte_at(2, true).unwrap(), None);
    }

    #[test]
    fn test_small_chunks_cross_boundaries() {
        let data: Vec<u8> = (0..=40).collect();
        let mut buf = buffer_of(&data).with_chunk_size(3);
        for pos in [4, 5, 6, 7] {
            buf.overlay_mut().put(pos, EditRecord::deleted(pos));
        }

        let cells = buf.read_cells(2, 6, true).unwrap();
        let positions: Vec<u64> = cells.iter().map(|c| c.position).collect();

        assert_eq!(positions, vec![2, 3, 8, 9, 10, 11]);
    }

    #[test]
    fn test_appended_region() {
        let mut buf = buffer_of(&[0x10, 0x20]);
        buf.overlay_mut().put(2, EditRecord::added(2, 0x30));
        buf.overlay_mut().put(3, EditRecord::added(3, 0x40));
        buf.overlay_mut().put(4, EditRecord::deleted(4));

        assert_eq!(buf.length(), 2);
        assert_eq!(buf.edited_len(), 5);
        assert_eq!(
            buf.read_logical_range(0, 10, false).unwrap(),
            vec![0x10, 0x20, 0x30, 0x40]
        );
        assert_eq!(
            buf.read_values(1, 10, true).unwrap(),
            vec![Some(0x20), Some(0x30), Some(0x40), None]
        );
        assert_eq!(buf.read_values(1, 10, false).unwrap(), vec![Some(0x20)]);
    }

    #[test]
    fn test_reads_past_end_are_empty() {
        let buf = buffer_of(&[1, 2, 3]);

        assert!(buf.read_logical_range(3, 4, false).unwrap().is_empty());
        assert_eq!(buf.byte_at(9, true).unwrap(), None);
    }

    #[test]
    fn test_replace_source_drops_overlay() {
        let mut buf = buffer_of(&[1, 2, 3]);
        buf.overlay_mut().put(0, EditRecord::modified(0, 9));

        let fresh = hex_io::stream::StreamSource::new(std::io::Cursor::new(vec![7, 7]), true)
            .unwrap();
        buf.replace_source(Box::new(fresh));

        assert!(buf.overlay().is_empty());
        assert_eq!(buf.read_logical_range(0, 4, false).unwrap(), vec![7, 7]);
    }
}
