/// What a pending edit does to the byte at its position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ByteAction {
    Nothing,
    Modified,
    Deleted,
    Added,
}

impl ByteAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ByteAction::Nothing => "Nothing",
            ByteAction::Modified => "Modified",
            ByteAction::Deleted => "Deleted",
            ByteAction::Added => "Added",
        }
    }
}

impl std::fmt::Display for ByteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ByteAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Nothing" => Ok(ByteAction::Nothing),
            "Modified" => Ok(ByteAction::Modified),
            "Deleted" => Ok(ByteAction::Deleted),
            "Added" => Ok(ByteAction::Added),
            _ => Err(()),
        }
    }
}

/// Selects records by action when querying the overlay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionFilter {
    Modified,
    Deleted,
    Added,
    Nothing,
    All,
}

impl ActionFilter {
    #[inline]
    #[must_use]
    pub fn matches(self, action: ByteAction) -> bool {
        match self {
            ActionFilter::All => true,
            ActionFilter::Modified => action == ByteAction::Modified,
            ActionFilter::Deleted => action == ByteAction::Deleted,
            ActionFilter::Added => action == ByteAction::Added,
            ActionFilter::Nothing => action == ByteAction::Nothing,
        }
    }
}

/// One pending change at a physical position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EditRecord {
    /// Physical offset. Appended bytes use `physical length + n`.
    pub position: u64,
    pub action: ByteAction,
    /// Absent for deletions.
    pub value: Option<u8>,
    /// How many records one undo of this record rolls back together.
    /// Every record of a group carries the group size.
    pub undo_length: u64,
}

impl EditRecord {
    #[must_use]
    pub fn modified(position: u64, value: u8) -> Self {
        Self {
            position,
            action: ByteAction::Modified,
            value: Some(value),
            undo_length: 1,
        }
    }

    #[must_use]
    pub fn deleted(position: u64) -> Self {
        Self {
            position,
            action: ByteAction::Deleted,
            value: None,
            undo_length: 1,
        }
    }

    #[must_use]
    pub fn added(position: u64, value: u8) -> Self {
        Self {
            position,
            action: ByteAction::Added,
            value: Some(value),
            undo_length: 1,
        }
    }

    #[must_use]
    pub fn with_undo_length(mut self, undo_length: u64) -> Self {
        self.undo_length = undo_length.max(1);
        self
    }
}

/// Why a request had no effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    Closed,
    ReadOnly,
    InvalidRange,
    EmptyInput,
    /// Insertion anywhere but the end of the stream.
    MidStreamInsert,
    /// In-place submit with deletions or appended bytes pending.
    LengthChanging,
    NothingToSubmit,
    DestinationExists,
    DestinationIsSource,
    NotFound,
}

/// Result of a user-facing edit request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    /// The operation was cancelled after some sub-steps had been applied.
    Cancelled,
    Ignored(IgnoreReason),
}

impl EditOutcome {
    #[inline]
    #[must_use]
    pub fn is_applied(self) -> bool {
        self == EditOutcome::Applied
    }
}

/// Result of a commit that did not fail with I/O.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitStatus {
    Completed,
    Cancelled,
    Ignored(IgnoreReason),
}

/// One position where two documents disagree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteDifference {
    pub position: u64,
    /// `None` when the byte is deleted in the overlay view.
    pub origin: Option<u8>,
    pub destination: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches() {
        assert!(ActionFilter::All.matches(ByteAction::Deleted));
        assert!(ActionFilter::Deleted.matches(ByteAction::Deleted));
        assert!(!ActionFilter::Modified.matches(ByteAction::Added));
        assert!(ActionFilter::Nothing.matches(ByteAction::Nothing));
    }

    #[test]
    fn test_action_string_round() {
        for action in [
            ByteAction::Nothing,
            ByteAction::Modified,
            ByteAction::Deleted,
            ByteAction::Added,
        ] {
            assert_eq!(action.as_str().parse::<ByteAction>(), Ok(action));
        }
        assert!("Renamed".parse::<ByteAction>().is_err());
    }

    #[test]
    fn test_undo_length_never_zero() {
        assert_eq!(EditRecord::deleted(3).with_undo_length(0).undo_length, 1);
        assert_eq!(EditRecord::modified(3, 1).with_undo_length(4).undo_length, 4);
    }
}
