/// Sparse map of pending edits keyed by physical position.
///
/// At most one record is active per position. Positions are not validated
/// here; keeping them in range is the caller's job.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OverlayStore {
    records: std::collections::HashMap<u64, crate::enums::EditRecord>,
}

impl OverlayStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the record at `position`, returning the one it displaced.
    pub fn put(
        &mut self,
        position: u64,
        record: crate::enums::EditRecord,
    ) -> Option<crate::enums::EditRecord> {
        self.records.insert(position, record)
    }

    /// Returns the record at `position` if it matches `filter`.
    #[inline]
    #[must_use]
    pub fn get(
        &self,
        position: u64,
        filter: crate::enums::ActionFilter,
    ) -> Option<&crate::enums::EditRecord> {
        self.records
            .get(&position)
            .filter(|record| filter.matches(record.action))
    }

    pub fn remove(&mut self, position: u64) -> Option<crate::enums::EditRecord> {
        self.records.remove(&position)
    }

    /// Records matching `filter`, ordered by position.
    #[must_use]
    pub fn all_by_action(
        &self,
        filter: crate::enums::ActionFilter,
    ) -> Vec<crate::enums::EditRecord> {
        let mut matching: Vec<_> = self
            .records
            .values()
            .filter(|record| filter.matches(record.action))
            .copied()
            .collect();

        matching.sort_unstable_by_key(|record| record.position);

        matching
    }

    /// Unordered iteration over every active record.
    pub fn iter(&self) -> impl Iterator<Item = &crate::enums::EditRecord> + '_ {
        self.records.values()
    }

    #[must_use]
    pub fn count(&self, filter: crate::enums::ActionFilter) -> usize {
        match filter {
            crate::enums::ActionFilter::All => self.records.len(),
            _ => self
                .records
                .values()
                .filter(|record| filter.matches(record.action))
                .count(),
        }
    }

    /// Number of records at or beyond `physical_len`, i.e. appended slots.
    #[must_use]
    pub fn count_from(&self, physical_len: u64) -> u64 {
        self.records.keys().filter(|&&pos| pos >= physical_len).count() as u64
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
