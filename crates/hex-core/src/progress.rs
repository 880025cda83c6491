/// Progress and cancellation seam for work that scales with stream length.
///
/// Chunked algorithms call [`Progress::report`] after each chunk and stop as
/// soon as [`Progress::is_cancelled`] turns true. Work done before that point
/// stays done.
pub trait Progress {
    fn report(&mut self, done: u64, total: u64);

    fn is_cancelled(&self) -> bool;
}

/// Never cancels, reports nowhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    #[inline]
    fn report(&mut self, _done: u64, _total: u64) {}

    #[inline]
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Whole-number percentage, clamped to 100. An empty job counts as done.
#[inline]
#[must_use]
pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }

    let pct = (u128::from(done) * 100 / u128::from(total)).min(100);

    u8::try_from(pct).unwrap_or(100)
}

#[cfg(test)]
pub(crate) mod testing {
    /// Records every report and cancels after `cancel_after` reports.
    #[derive(Debug, Default)]
    pub struct Recorder {
        pub reports: Vec<(u64, u64)>,
        pub cancel_after: Option<usize>,
    }

    impl super::Progress for Recorder {
        fn report(&mut self, done: u64, total: u64) {
            self.reports.push((done, total));
        }

        fn is_cancelled(&self) -> bool {
            self.cancel_after
                .is_some_and(|limit| self.reports.len() >= limit)
        }
    }
}
