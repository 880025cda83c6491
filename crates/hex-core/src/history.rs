/// One applied edit and what it displaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryEntry {
    pub record: crate::enums::EditRecord,
    /// The record active at the same position before this one, if any.
    pub previous: Option<crate::enums::EditRecord>,
    pub sequence: u64,
}

/// Undo/redo stacks over the overlay.
///
/// Both stacks keep their most recent entry at the end. The newest record
/// of an undo unit carries the unit size in `undo_length`; units move
/// between stacks together.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct History {
    pub undo_stack: Vec<HistoryEntry>,
    pub redo_stack: Vec<HistoryEntry>,
    /// Size of each undone unit, innermost last, parallel to `redo_stack`.
    redo_units: Vec<usize>,
    next_sequence: u64,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `record` into the overlay and makes it the new undo head.
    /// Any new edit invalidates the redo stack.
    pub fn apply(
        &mut self,
        overlay: &mut crate::overlay::OverlayStore,
        record: crate::enums::EditRecord,
    ) -> u64 {
        self.clear_redo();
        self.push(overlay, record)
    }

    /// Applies `records` as one undo unit.
    ///
    /// Returns the sequence number of the last record, or `None` for an empty group.
    pub fn apply_group(
        &mut self,
        overlay: &mut crate::overlay::OverlayStore,
        records: &[crate::enums::EditRecord],
    ) -> Option<u64> {
        if records.is_empty() {
            return None;
        }

        self.clear_redo();

        let group = records.len() as u64;
        let mut last = None;

        for record in records {
            last = Some(self.push(overlay, record.with_undo_length(group)));
        }

        last
    }

    fn push(
        &mut self,
        overlay: &mut crate::overlay::OverlayStore,
        record: crate::enums::EditRecord,
    ) -> u64 {
        let previous = overlay.put(record.position, record);
        let sequence = self.next_sequence;

        self.next_sequence += 1;
        self.undo_stack.push(HistoryEntry {
            record,
            previous,
            sequence,
        });

        sequence
    }

    /// Reverts up to `repeat` undo units. Returns the positions touched.
    ///
    /// Does nothing on an empty stack.
    pub fn undo(&mut self, overlay: &mut crate::overlay::OverlayStore, repeat: usize) -> Vec<u64> {
        let mut affected = Vec::new();

        for _ in 0..repeat {
            let Some(head) = self.undo_stack.pop() else {
                break;
            };

            let group = head.record.undo_length.max(1);
            let mut entry = head;
            let mut moved = 0;

            for step in 0..group {
                if step > 0 {
                    let Some(next) = self.undo_stack.pop() else {
                        break;
                    };
                    entry = next;
                }

                match entry.previous {
                    Some(previous) => {
                        overlay.put(entry.record.position, previous);
                    }
                    None => {
                        overlay.remove(entry.record.position);
                    }
                }

                affected.push(entry.record.position);
                self.redo_stack.push(entry);
                moved += 1;
            }

            self.redo_units.push(moved);
        }

        affected
    }

    /// Re-applies up to `repeat` undone units. Returns the positions touched.
    pub fn redo(&mut self, overlay: &mut crate::overlay::OverlayStore, repeat: usize) -> Vec<u64> {
        let mut affected = Vec::new();

        for _ in 0..repeat {
            if self.redo_stack.is_empty() {
                break;
            }

            let group = self.redo_units.pop().unwrap_or(1);

            for _ in 0..group {
                let Some(entry) = self.redo_stack.pop() else {
                    break;
                };

                overlay.put(entry.record.position, entry.record);
                affected.push(entry.record.position);
                self.undo_stack.push(entry);
            }
        }

        affected
    }

    pub fn clear_undo(&mut self) {
        self.undo_stack.clear();
    }

    pub fn clear_redo(&mut self) {
        self.redo_stack.clear();
        self.redo_units.clear();
    }

    pub fn clear(&mut self) {
        self.clear_undo();
        self.clear_redo();
    }

    #[inline]
    #[must_use]
    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    #[inline]
    #[must_use]
    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Whether the document has pending edits in this session.
    #[inline]
    #[must_use]
    pub fn is_modified(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[must_use]
    pub fn undo_head(&self) -> Option<&HistoryEntry> {
        self.undo_stack.last()
    }

    #[must_use]
    pub fn redo_head(&self) -> Option<&HistoryEntry> {
        self.redo_stack.last()
    }
}
