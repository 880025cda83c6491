//! Cancellable bulk work on a background thread.
//!
//! [`crate::document::Document::spawn`] moves the document onto a named
//! worker thread for the duration of one job, which makes the worker the
//! only writer while it runs. The caller keeps a [`LongProcess`] handle to
//! cancel, watch progress and get the document back.

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender};

use crate::events::DocumentEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LongProcessKind {
    FindAll,
    ReplaceAll,
    FillWithByte,
    ReplaceByte,
    Paste,
    Append,
    DeleteRange,
    Reverse,
    Compare,
    ByteFrequencies,
    SubmitInPlace,
    SubmitToDestination,
    LoadState,
}

/// How a long process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Completed,
    /// Stopped on request; sub-steps applied before that stay applied.
    Cancelled,
    Failed,
}

/// Shared flag a caller sets to stop a running job.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// [`hex_core::progress::Progress`] that turns chunk reports into
/// [`DocumentEvent::ProcessProgress`] events.
///
/// An event is only sent when the percentage moved by at least `step`, or
/// reached 100.
#[derive(Debug)]
pub struct ProgressReporter {
    kind: LongProcessKind,
    token: CancellationToken,
    senders: Vec<Sender<DocumentEvent>>,
    step: u8,
    last_percent: Option<u8>,
    saw_cancel: Cell<bool>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(
        kind: LongProcessKind,
        token: CancellationToken,
        senders: Vec<Sender<DocumentEvent>>,
        step: u8,
    ) -> Self {
        Self {
            kind,
            token,
            senders,
            step: step.max(1),
            last_percent: None,
            saw_cancel: Cell::new(false),
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> LongProcessKind {
        self.kind
    }

    /// Whether the job observed the cancellation, as opposed to it arriving
    /// after the work was done.
    #[inline]
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.saw_cancel.get()
    }

    pub(crate) fn emit(&mut self, event: DocumentEvent) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl hex_core::progress::Progress for ProgressReporter {
    fn report(&mut self, done: u64, total: u64) {
        let percent = hex_core::progress::percent(done, total);
        let due = match self.last_percent {
            None => true,
            Some(last) => {
                percent >= last.saturating_add(self.step) || (percent == 100 && last != 100)
            }
        };

        if due {
            self.last_percent = Some(percent);
            self.emit(DocumentEvent::ProcessProgress {
                kind: self.kind,
                percent,
            });
        }
    }

    fn is_cancelled(&self) -> bool {
        let cancelled = self.token.is_cancelled();
        if cancelled {
            self.saw_cancel.set(true);
        }
        cancelled
    }
}

/// Handle to a job running on a worker thread.
#[derive(Debug)]
pub struct LongProcess<T> {
    kind: LongProcessKind,
    token: CancellationToken,
    events: Receiver<DocumentEvent>,
    handle: std::thread::JoinHandle<(
        crate::document::Document,
        hex_core::errors::OverlayResult<T>,
    )>,
}

impl<T> LongProcess<T> {
    #[inline]
    #[must_use]
    pub fn kind(&self) -> LongProcessKind {
        self.kind
    }

    /// Asks the job to stop at its next chunk boundary.
    pub fn cancel(&self) {
        tracing::debug!(kind = ?self.kind, "long process cancel requested");
        self.token.cancel();
    }

    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Start, progress and finish events of this job.
    #[must_use]
    pub fn events(&self) -> &Receiver<DocumentEvent> {
        &self.events
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the job and hands the document back with the job's result.
    ///
    /// # Errors
    ///
    /// - [`crate::document::ProcessError::WorkerPanicked`] if the job panicked;
    ///   the document is lost with the thread.
    pub fn join(
        self,
    ) -> Result<
        (crate::document::Document, hex_core::errors::OverlayResult<T>),
        crate::document::ProcessError,
    > {
        let kind = self.kind;

        self.handle
            .join()
            .map_err(|_| crate::document::ProcessError::WorkerPanicked(kind))
    }
}

impl crate::document::Document {
    /// Runs `job` on a worker thread that owns the document until it ends.
    ///
    /// The job receives a [`ProgressReporter`] to pass to bulk operations.
    /// Subscribers and the returned handle both see `ProcessStarted`,
    /// progress and `ProcessFinished` events.
    ///
    /// # Errors
    ///
    /// - [`crate::document::ProcessError::Spawn`] if the OS refuses a thread;
    ///   the document is dropped with the closure in that case.
    pub fn spawn<T, F>(
        mut self,
        kind: LongProcessKind,
        job: F,
    ) -> Result<LongProcess<T>, crate::document::ProcessError>
    where
        T: Send + 'static,
        F: FnOnce(
                &mut crate::document::Document,
                &mut ProgressReporter,
            ) -> hex_core::errors::OverlayResult<T>
            + Send
            + 'static,
    {
        let token = CancellationToken::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut senders = self.event_senders();
        senders.push(tx);
        let mut reporter =
            ProgressReporter::new(kind, token.clone(), senders, self.options().progress_step);

        let handle = std::thread::Builder::new()
            .name(format!("hexoverlay-{kind:?}").to_lowercase())
            .spawn(move || {
                tracing::info!(?kind, "long process started");
                self.set_long_process(Some(kind));
                reporter.emit(DocumentEvent::ProcessStarted { kind });

                let result = job(&mut self, &mut reporter);

                let status = match &result {
                    Err(_) => ProcessStatus::Failed,
                    Ok(_) if reporter.was_cancelled() => ProcessStatus::Cancelled,
                    Ok(_) => ProcessStatus::Completed,
                };

                match &result {
                    Err(e) => tracing::warn!(?kind, error = %e, "long process failed"),
                    Ok(_) => tracing::info!(?kind, ?status, "long process finished"),
                }

                self.set_long_process(None);
                reporter.emit(DocumentEvent::ProcessFinished { kind, status });

                (self, result)
            })
            .map_err(crate::document::ProcessError::Spawn)?;

        Ok(LongProcess {
            kind,
            token,
            events: rx,
            handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_core::progress::Progress;

    fn reporter(step: u8) -> (ProgressReporter, Receiver<DocumentEvent>, CancellationToken) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let token = CancellationToken::new();
        (
            ProgressReporter::new(LongProcessKind::FillWithByte, token.clone(), vec![tx], step),
            rx,
            token,
        )
    }

    fn percents(rx: &Receiver<DocumentEvent>) -> Vec<u8> {
        rx.try_iter()
            .filter_map(|event| match event {
                DocumentEvent::ProcessProgress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_progress_only_on_change() {
        let (mut reporter, rx, _) = reporter(10);

        for done in [0, 1, 2, 10, 11, 25, 99, 100] {
            reporter.report(done, 100);
        }

        assert_eq!(percents(&rx), vec![0, 10, 25, 99, 100]);
    }

    #[test]
    fn test_cancellation_is_observed() {
        let (reporter, _rx, token) = reporter(1);

        assert!(!reporter.is_cancelled());
        assert!(!reporter.was_cancelled());

        token.cancel();

        assert!(reporter.is_cancelled());
        assert!(reporter.was_cancelled());
    }
}
