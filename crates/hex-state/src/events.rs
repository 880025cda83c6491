use crossbeam_channel::{Receiver, Sender};

/// Change notifications a renderer subscribes to.
///
/// Position lists are physical positions, so a renderer can drop any marker
/// keyed on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    Opened { length: u64, read_only: bool },
    Closed,
    BytesModified { positions: Vec<u64> },
    BytesDeleted { positions: Vec<u64> },
    BytesAppended { positions: Vec<u64> },
    Undone { positions: Vec<u64> },
    Redone { positions: Vec<u64> },
    ChangesSubmitted,
    ReadOnlyChanged { read_only: bool },
    StateLoaded,
    ProcessStarted {
        kind: crate::long_process::LongProcessKind,
    },
    ProcessProgress {
        kind: crate::long_process::LongProcessKind,
        percent: u8,
    },
    ProcessFinished {
        kind: crate::long_process::LongProcessKind,
        status: crate::long_process::ProcessStatus,
    },
}

/// Fan-out of [`DocumentEvent`]s to every live subscriber.
///
/// Subscribers whose receiver was dropped are forgotten on the next emit.
#[derive(Debug, Default, Clone)]
pub struct EventBus {
    subscribers: Vec<Sender<DocumentEvent>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<DocumentEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event: DocumentEvent) {
        self.subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Senders for code that runs away from the document, e.g. a progress reporter.
    #[must_use]
    pub fn senders(&self) -> Vec<Sender<DocumentEvent>> {
        self.subscribers.clone()
    }

    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
