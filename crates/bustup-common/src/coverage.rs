//! Byte coverage tracking for reverse-engineering unknown file regions.
//!
//! Every decode step marks the bytes it consumed or skipped; whatever stays
//! unmarked afterwards is data the decoder does not understand yet.

use log::trace;

/// A contiguous byte range, reported as `(offset, length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ByteRange {
    /// First byte of the range.
    pub offset: usize,
    /// Number of bytes in the range.
    pub length: usize,
}

impl ByteRange {
    /// Range covering `[start, end)`; empty if `end <= start`.
    pub const fn span(start: usize, end: usize) -> Self {
        Self {
            offset: start,
            length: end.saturating_sub(start),
        }
    }

    /// One past the last byte of the range.
    pub const fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// One flag per input byte, set once a decode step has touched it.
#[derive(Debug, Clone)]
pub struct CoverageMap {
    used: Vec<bool>,
}

impl CoverageMap {
    /// Create a map for an input of `len` bytes with nothing marked.
    pub fn new(len: usize) -> Self {
        Self {
            used: vec![false; len],
        }
    }

    /// Length of the tracked input.
    pub fn len(&self) -> usize {
        self.used.len()
    }

    /// Whether the tracked input is empty.
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Mark the inclusive range `[first, last]`, clamped to the input.
    pub fn mark(&mut self, first: usize, last: usize) {
        if first > last || first >= self.used.len() {
            return;
        }
        let last = last.min(self.used.len() - 1);
        self.used[first..=last].fill(true);
        trace!("marked region [{}, {}]", first, last);
    }

    /// Mark the half-open range `[start, end)`.
    pub fn mark_span(&mut self, start: usize, end: usize) {
        if end > start {
            self.mark(start, end - 1);
        }
    }

    /// Whether a single byte has been marked.
    pub fn is_marked(&self, offset: usize) -> bool {
        self.used.get(offset).copied().unwrap_or(false)
    }

    /// Number of marked bytes.
    pub fn marked_bytes(&self) -> usize {
        self.used.iter().filter(|&&b| b).count()
    }

    /// Maximal runs of unmarked bytes.
    pub fn gaps(&self) -> Vec<ByteRange> {
        self.runs(false)
    }

    /// Maximal runs of marked bytes.
    pub fn covered(&self) -> Vec<ByteRange> {
        self.runs(true)
    }

    fn runs(&self, state: bool) -> Vec<ByteRange> {
        let mut out = Vec::new();
        let mut start = None;
        for (i, &value) in self.used.iter().enumerate() {
            match (value == state, start) {
                (true, None) => start = Some(i),
                (false, Some(s)) => {
                    out.push(ByteRange {
                        offset: s,
                        length: i - s,
                    });
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            out.push(ByteRange {
                offset: s,
                length: self.used.len() - s,
            });
        }
        out
    }
}
