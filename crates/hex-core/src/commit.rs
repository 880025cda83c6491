//! Merging the overlay into storage.
//!
//! Two paths exist. [`submit_in_place`] rewrites modified bytes over the
//! source and only works when the length does not change. [`submit_to_destination`]
//! streams the whole edited view into a new file and handles every action.

use std::io::Write;

/// Contiguous modified bytes, written with a single `write_at`.
#[derive(Debug, PartialEq, Eq)]
struct Run {
    start: u64,
    bytes: Vec<u8>,
}

fn modified_runs(overlay: &crate::overlay::OverlayStore) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();

    for record in overlay.all_by_action(crate::enums::ActionFilter::Modified) {
        let Some(value) = record.value else {
            continue;
        };

        match runs.last_mut() {
            Some(run) if run.start + run.bytes.len() as u64 == record.position => {
                run.bytes.push(value);
            }
            _ => runs.push(Run {
                start: record.position,
                bytes: vec![value],
            }),
        }
    }

    runs
}

/// Writes every modified byte at its physical offset, then clears the
/// overlay and `history`.
///
/// Refused with [`crate::enums::IgnoreReason::LengthChanging`] while any
/// deletion or appended byte is pending. On cancellation or I/O failure the
/// overlay and history are left untouched; bytes already written match the
/// overlay values, so the edited view is unchanged either way.
///
/// # Errors
///
/// - [`crate::errors::OverlayError::Io`] if a write or the final flush fails.
pub fn submit_in_place(
    buffer: &mut crate::buffer::OverlayBuffer,
    history: &mut crate::history::History,
    progress: &mut dyn crate::progress::Progress,
) -> crate::errors::OverlayResult<crate::enums::CommitStatus> {
    use crate::enums::{ActionFilter, CommitStatus, IgnoreReason};

    if !buffer.source().can_write() {
        return Ok(CommitStatus::Ignored(IgnoreReason::ReadOnly));
    }

    if buffer.overlay().is_empty() {
        return Ok(CommitStatus::Ignored(IgnoreReason::NothingToSubmit));
    }

    if buffer.overlay().count(ActionFilter::Deleted) > 0
        || buffer.overlay().count(ActionFilter::Added) > 0
        || buffer.appended_len() > 0
    {
        return Ok(CommitStatus::Ignored(IgnoreReason::LengthChanging));
    }

    let runs = modified_runs(buffer.overlay());
    let total: u64 = runs.iter().map(|run| run.bytes.len() as u64).sum();
    let mut done = 0;

    for run in &runs {
        if progress.is_cancelled() {
            buffer.source_mut().flush()?;
            tracing::info!(written = done, total, "in-place submit cancelled");

            return Ok(CommitStatus::Cancelled);
        }

        buffer.source_mut().write_at(run.start, &run.bytes)?;
        done += run.bytes.len() as u64;
        progress.report(done, total);
    }

    buffer.source_mut().flush()?;
    buffer.overlay_mut().clear();
    history.clear();

    tracing::info!(bytes = total, runs = runs.len(), "changes submitted in place");

    Ok(crate::enums::CommitStatus::Completed)
}

/// Streams `start..stop` of the edited view into `writer`, chunk by chunk.
///
/// With `copy_changes` the overlay is applied (deleted bytes are skipped and
/// appended bytes follow the physical end); without it the raw physical
/// bytes are written.
///
/// # Errors
///
/// - [`crate::errors::OverlayError::Io`] if reading the source or writing fails.
pub fn write_range<W: Write + ?Sized>(
    buffer: &crate::buffer::OverlayBuffer,
    start: u64,
    stop: u64,
    copy_changes: bool,
    writer: &mut W,
    progress: &mut dyn crate::progress::Progress,
) -> crate::errors::OverlayResult<crate::enums::CommitStatus> {
    let total = stop.saturating_sub(start);
    let step = buffer.chunk_size() as u64;
    let mut out = Vec::with_capacity(buffer.chunk_size());
    let mut pos = start;

    while pos < stop {
        if progress.is_cancelled() {
            return Ok(crate::enums::CommitStatus::Cancelled);
        }

        let count = (stop - pos).min(step);
        let values = buffer.read_values(pos, count, copy_changes)?;

        if values.is_empty() {
            break;
        }

        out.clear();
        out.extend(values.iter().flatten());
        writer.write_all(&out)?;

        pos += values.len() as u64;
        progress.report(pos - start, total);
    }

    Ok(crate::enums::CommitStatus::Completed)
}

/// The whole edited document, as it would look once committed.
///
/// # Errors
///
/// - [`crate::errors::OverlayError::Io`] if reading the source or writing fails.
pub fn write_merged<W: Write + ?Sized>(
    buffer: &crate::buffer::OverlayBuffer,
    writer: &mut W,
    progress: &mut dyn crate::progress::Progress,
) -> crate::errors::OverlayResult<crate::enums::CommitStatus> {
    write_range(buffer, 0, buffer.edited_len(), true, writer, progress)
}

fn same_file(a: &std::path::Path, b: &std::path::Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Writes the merged document to `destination` and makes it the new source.
///
/// Every action is honoured, so this is the path for length-changing edits.
/// On success the destination is reopened as the buffer's source and the
/// overlay and `history` are cleared.
///
/// The write goes straight to `destination` with no temporary file. An I/O
/// failure or a cancellation may leave it partially written; the buffer,
/// overlay and history are untouched in both cases.
///
/// # Errors
///
/// - [`crate::errors::OverlayError::Io`] if the destination cannot be
///   created, written, synced or reopened, or the source cannot be read.
pub fn submit_to_destination(
    buffer: &mut crate::buffer::OverlayBuffer,
    history: &mut crate::history::History,
    destination: &std::path::Path,
    overwrite: bool,
    progress: &mut dyn crate::progress::Progress,
) -> crate::errors::OverlayResult<crate::enums::CommitStatus> {
    use crate::enums::{CommitStatus, IgnoreReason};

    if let Some(source_path) = buffer.source().path()
        && same_file(source_path, destination)
    {
        return Ok(CommitStatus::Ignored(IgnoreReason::DestinationIsSource));
    }

    if destination.exists() && !overwrite {
        return Ok(CommitStatus::Ignored(IgnoreReason::DestinationExists));
    }

    let file = std::fs::File::create(destination)?;
    let mut writer = std::io::BufWriter::new(file);

    if write_merged(buffer, &mut writer, progress)? == CommitStatus::Cancelled {
        tracing::warn!(
            destination = %destination.display(),
            "submit cancelled, destination left partially written"
        );

        return Ok(CommitStatus::Cancelled);
    }

    let file = writer.into_inner().map_err(std::io::IntoInnerError::into_error)?;
    file.sync_all()?;
    drop(file);

    let writable = buffer.source().can_write();
    let reopened = hex_io::mmap::MmapFile::open_for_edit(destination, !writable)?;
    let length = hex_io::source::ByteSource::len(&reopened);

    buffer.replace_source(Box::new(reopened));
    history.clear();

    tracing::info!(
        destination = %destination.display(),
        length,
        "changes submitted to destination"
    );

    Ok(CommitStatus::Completed)
}
