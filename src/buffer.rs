//! Line-indexed text buffer and patch application
//!
//! The buffer is the seam to the host editor: the loop only ever touches it
//! through `LineBuffer`, and only from one task, so writes are serialized
//! without locks. Ranged replacement is a single logical transaction:
//! snapshot first, restore on failure, never a partial insert.

use crate::error::ApplyError;
use std::ops::Range;

/// Line-indexed read/replace operations exposed by the host text buffer.
pub trait LineBuffer {
    fn line_count(&self) -> usize;
    fn line(&self, index: usize) -> Option<&str>;
    /// Replace the entire contents with the given lines.
    fn replace_all(&mut self, lines: Vec<String>);
    /// Remove the lines in `range` and insert `lines` at that position.
    /// Callers must pass an in-bounds range.
    fn splice(&mut self, range: Range<usize>, lines: Vec<String>);
    /// Error from persisting the last mutation, if the buffer is backed by
    /// storage. Taking it clears it. In-memory buffers never report one.
    fn take_write_error(&mut self) -> Option<std::io::Error> {
        None
    }
}

/// In-memory implementation backing tests and the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    lines: Vec<String>,
}

impl TextBuffer {
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.split('\n').map(|l| l.to_string()).collect(),
        }
    }

    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl LineBuffer for TextBuffer {
    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(|s| s.as_str())
    }

    fn replace_all(&mut self, lines: Vec<String>) {
        self.lines = lines;
    }

    fn splice(&mut self, range: Range<usize>, lines: Vec<String>) {
        self.lines.splice(range, lines);
    }
}

/// File-backed buffer with write-through: every mutation is flushed to
/// disk so rebuilds during a loop run see the applied fix. A failed flush
/// is held until the applicator takes it, never silently dropped.
#[derive(Debug)]
pub struct FileBuffer {
    path: std::path::PathBuf,
    inner: TextBuffer,
    write_error: Option<std::io::Error>,
}

impl FileBuffer {
    pub fn open(path: impl Into<std::path::PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)?;
        Ok(Self {
            path,
            inner: TextBuffer::from_text(&text),
            write_error: None,
        })
    }

    pub fn to_text(&self) -> String {
        self.inner.to_text()
    }

    fn flush(&mut self) {
        if let Err(e) = std::fs::write(&self.path, self.inner.to_text()) {
            self.write_error = Some(e);
        }
    }
}

impl LineBuffer for FileBuffer {
    fn line_count(&self) -> usize {
        self.inner.line_count()
    }

    fn line(&self, index: usize) -> Option<&str> {
        self.inner.line(index)
    }

    fn replace_all(&mut self, lines: Vec<String>) {
        self.inner.replace_all(lines);
        self.flush();
    }

    fn splice(&mut self, range: Range<usize>, lines: Vec<String>) {
        self.inner.splice(range, lines);
        self.flush();
    }

    fn take_write_error(&mut self) -> Option<std::io::Error> {
        self.write_error.take()
    }
}

fn text_to_lines(text: &str) -> Vec<String> {
    text.split('\n').map(|l| l.to_string()).collect()
}

/// Replace the whole buffer content in one step. If the buffer is backed
/// by storage and the write fails, the previous content is restored in
/// memory and the failure is surfaced.
pub fn apply_whole_replacement(
    buffer: &mut dyn LineBuffer,
    new_text: &str,
) -> Result<(), ApplyError> {
    let snapshot: Vec<String> = (0..buffer.line_count())
        .map(|i| buffer.line(i).unwrap_or_default().to_string())
        .collect();

    buffer.replace_all(text_to_lines(new_text));
    if let Some(e) = buffer.take_write_error() {
        buffer.replace_all(snapshot);
        let _ = buffer.take_write_error();
        return Err(ApplyError::Write(e.to_string()));
    }
    Ok(())
}

/// Replace exactly the lines spanned by `range` with the lines of
/// `new_text`, leaving everything outside the range untouched.
///
/// If the buffer was mutated underneath us and the range no longer fits,
/// nothing is changed and `OutOfRange` is returned.
pub fn apply_ranged_replacement(
    buffer: &mut dyn LineBuffer,
    range: Range<usize>,
    new_text: &str,
) -> Result<(), ApplyError> {
    let len = buffer.line_count();
    if range.start > range.end || range.end > len {
        return Err(ApplyError::OutOfRange {
            start: range.start,
            end: range.end,
            len,
        });
    }

    // Snapshot so a panicking or misbehaving host buffer can be restored
    // wholesale rather than left half-edited.
    let snapshot: Vec<String> = (0..len)
        .map(|i| buffer.line(i).unwrap_or_default().to_string())
        .collect();

    let replacement = text_to_lines(new_text);
    buffer.splice(range.clone(), replacement);

    let expected = snapshot.len() - (range.end - range.start) + new_text.split('\n').count();
    if buffer.line_count() != expected {
        buffer.replace_all(snapshot);
        let _ = buffer.take_write_error();
        return Err(ApplyError::OutOfRange {
            start: range.start,
            end: range.end,
            len,
        });
    }

    // A write-through buffer that failed to persist has not applied the
    // fix as far as the next build is concerned. Roll back and report.
    if let Some(e) = buffer.take_write_error() {
        buffer.replace_all(snapshot);
        let _ = buffer.take_write_error();
        return Err(ApplyError::Write(e.to_string()));
    }

    Ok(())
}

/// The implicit edit range when the host reports no selection: the whole
/// buffer.
pub fn whole_buffer_range(buffer: &dyn LineBuffer) -> Range<usize> {
    0..buffer.line_count()
}
