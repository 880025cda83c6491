//! Exact byte-pattern search over the edited view.
//!
//! The scan runs over the deletions-hidden view, so a pattern can match
//! across a deleted byte. Matches are reported as the physical position of
//! their first byte, in ascending order. Overlapping matches are all
//! reported: in `AA AA AA`, the pattern `AA AA` matches at 0 and at 1.

/// Scans from `start`, calling `on_match` per hit until it returns `false`.
///
/// Returns `Ok(false)` if `progress` cancelled the scan.
fn scan(
    buffer: &crate::buffer::OverlayBuffer,
    pattern: &[u8],
    start: u64,
    progress: &mut dyn crate::progress::Progress,
    mut on_match: impl FnMut(u64) -> bool,
) -> crate::errors::OverlayResult<bool> {
    if pattern.is_empty() {
        return Ok(true);
    }

    let finder = memchr::memmem::Finder::new(pattern);
    let carry = pattern.len() - 1;
    let total = buffer.edited_len();

    let mut window: Vec<crate::buffer::LogicalByte> = Vec::new();
    let mut bytes: Vec<u8> = Vec::new();
    let mut pos = start;

    loop {
        if progress.is_cancelled() {
            return Ok(false);
        }

        let fresh = buffer.read_cells(pos, buffer.chunk_size(), true)?;
        let Some(last) = fresh.last() else {
            break;
        };

        pos = last.position + 1;
        window.extend(fresh);
        bytes.clear();
        bytes.extend(window.iter().map(|cell| cell.value));

        let mut offset = 0;
        while let Some(idx) = finder.find(&bytes[offset..]) {
            let at = offset + idx;

            if !on_match(window[at].position) {
                return Ok(true);
            }

            offset = at + 1;
        }

        // A match starting in the last `carry` cells cannot have fit yet.
        let keep = carry.min(window.len());
        window.drain(..window.len() - keep);

        progress.report(pos.min(total), total);
    }

    Ok(true)
}

/// First match at or after `start`.
///
/// # Errors
///
/// - [`crate::errors::OverlayError::Io`] if the source fails.
pub fn find_first(
    buffer: &crate::buffer::OverlayBuffer,
    pattern: &[u8],
    start: u64,
    progress: &mut dyn crate::progress::Progress,
) -> crate::errors::OverlayResult<Option<u64>> {
    let mut found = None;

    scan(buffer, pattern, start, progress, |position| {
        found = Some(position);
        false
    })?;

    Ok(found)
}

/// Every match at or after `start`, ascending.
///
/// A cancelled scan returns the matches found so far.
///
/// # Errors
///
/// - [`crate::errors::OverlayError::Io`] if the source fails.
pub fn find_all_from(
    buffer: &crate::buffer::OverlayBuffer,
    pattern: &[u8],
    start: u64,
    progress: &mut dyn crate::progress::Progress,
) -> crate::errors::OverlayResult<Vec<u64>> {
    let mut found = Vec::new();

    let completed = scan(buffer, pattern, start, progress, |position| {
        found.push(position);
        true
    })?;

    if !completed {
        tracing::debug!(matches = found.len(), "search cancelled");
    }

    Ok(found)
}

/// Every match in the document. A fresh call always rescans from 0.
///
/// # Errors
///
/// - [`crate::errors::OverlayError::Io`] if the source fails.
pub fn find_all(
    buffer: &crate::buffer::OverlayBuffer,
    pattern: &[u8],
    progress: &mut dyn crate::progress::Progress,
) -> crate::errors::OverlayResult<Vec<u64>> {
    find_all_from(buffer, pattern, 0, progress)
}

/// Last match at or after `start`.
///
/// # Errors
///
/// - [`crate::errors::OverlayError::Io`] if the source fails.
pub fn find_last(
    buffer: &crate::buffer::OverlayBuffer,
    pattern: &[u8],
    start: u64,
    progress: &mut dyn crate::progress::Progress,
) -> crate::errors::OverlayResult<Option<u64>> {
    Ok(find_all_from(buffer, pattern, start, progress)?.last().copied())
}
