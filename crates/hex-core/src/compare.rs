/// Lazy byte-by-byte diff of two buffers.
///
/// Positions are compared one to one up to the shorter length; the tail of
/// the longer buffer is never reported. Bytes are read a chunk at a time, so
/// the diff of two multi-gigabyte sources stays bounded in memory. A read
/// failure is yielded once as `Err` and ends the iteration.
#[derive(Debug)]
pub struct Differences<'a> {
    origin: &'a crate::buffer::OverlayBuffer,
    destination: &'a crate::buffer::OverlayBuffer,
    include_overlay: bool,
    position: u64,
    end: u64,
    pending: std::collections::VecDeque<crate::enums::ByteDifference>,
    failed: bool,
}

/// Starts a diff between `origin` and `destination`.
///
/// With `include_overlay` both sides are read with pending edits applied
/// (deleted bytes compare as `None`); otherwise only physical bytes count.
#[must_use]
pub fn compare<'a>(
    origin: &'a crate::buffer::OverlayBuffer,
    destination: &'a crate::buffer::OverlayBuffer,
    include_overlay: bool,
) -> Differences<'a> {
    let len_of = |buffer: &crate::buffer::OverlayBuffer| {
        if include_overlay {
            buffer.edited_len()
        } else {
            buffer.length()
        }
    };

    Differences {
        origin,
        destination,
        include_overlay,
        position: 0,
        end: len_of(origin).min(len_of(destination)),
        pending: std::collections::VecDeque::new(),
        failed: false,
    }
}

impl Differences<'_> {
    fn fill(&mut self) -> crate::errors::OverlayResult<()> {
        let count = (self.end - self.position).min(self.origin.chunk_size() as u64);
        let left = self
            .origin
            .read_values(self.position, count, self.include_overlay)?;
        let right = self
            .destination
            .read_values(self.position, count, self.include_overlay)?;

        for (offset, (a, b)) in left.iter().zip(right.iter()).enumerate() {
            if a != b {
                self.pending.push_back(crate::enums::ByteDifference {
                    position: self.position + offset as u64,
                    origin: *a,
                    destination: *b,
                });
            }
        }

        let advanced = left.len().min(right.len()) as u64;
        // A short read means a source shrank under us; stop rather than spin.
        self.position = if advanced == 0 {
            self.end
        } else {
            self.position + advanced
        };

        Ok(())
    }
}

impl Iterator for Differences<'_> {
    type Item = crate::errors::OverlayResult<crate::enums::ByteDifference>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(difference) = self.pending.pop_front() {
                return Some(Ok(difference));
            }

            if self.failed || self.position >= self.end {
                return None;
            }

            if let Err(e) = self.fill() {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }
}
