//! Chunks: the atomic unit of text inside a block
//!
//! A chunk is a contiguous run of tokens from one source article, anchored at
//! an offset in that article and at an offset in some block's local
//! coordinate space. Inside a chunk the displacement between the two offsets
//! is fixed, so either one can be derived from the other.

use std::fmt;

use crate::error::{Result, SynthError};

/// Identifier of one input article
pub type SourceId = usize;

/// A token run from one source, placed in block coordinates.
///
/// `size == text.len()` holds after every operation, which is why the fields
/// are private.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    source: SourceId,
    block_idx: isize,
    source_idx: usize,
    size: usize,
    text: Vec<String>,
}

impl Chunk {
    /// Build a chunk, rejecting a `size` that disagrees with `text`.
    ///
    /// `block_idx` may be negative; blocks renormalize after every structural
    /// change.
    pub fn new(
        source: SourceId,
        block_idx: isize,
        source_idx: usize,
        size: usize,
        text: Vec<String>,
    ) -> Result<Self> {
        if size != text.len() {
            return Err(SynthError::invalid(format!(
                "chunk size {size} does not match text length {}",
                text.len()
            )));
        }
        Ok(Self {
            source,
            block_idx,
            source_idx,
            size,
            text,
        })
    }

    /// Build a chunk whose size is taken from `text`.
    pub fn from_text(source: SourceId, block_idx: isize, source_idx: usize, text: Vec<String>) -> Self {
        Self {
            source,
            block_idx,
            source_idx,
            size: text.len(),
            text,
        }
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn block_idx(&self) -> isize {
        self.block_idx
    }

    pub fn source_idx(&self) -> usize {
        self.source_idx
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn text(&self) -> &[String] {
        &self.text
    }

    /// One past the last block position this chunk covers
    pub fn block_end(&self) -> isize {
        self.block_idx + self.size as isize
    }

    /// One past the last source position this chunk covers
    pub fn source_end(&self) -> usize {
        self.source_idx + self.size
    }

    pub fn shift_block_index(&mut self, delta: isize) {
        self.block_idx += delta;
    }

    /// Cut the tail so the chunk ends at or before block position `limit`.
    ///
    /// A chunk that starts at or after `limit` collapses to size zero.
    pub fn trim_to_block_limit(&mut self, limit: isize) {
        let overshoot = self.block_end() - limit;
        if overshoot <= 0 {
            return;
        }
        let keep = (self.size as isize - overshoot).max(0) as usize;
        self.text.truncate(keep);
        self.size = keep;
    }

    /// Intersection of this chunk with block span `[start, stop)`, rebased so
    /// that `start` becomes block position 0. `None` when they are disjoint.
    pub fn trim_to_slice(&self, start: isize, stop: isize) -> Option<Chunk> {
        let end = self.block_end();
        if stop <= self.block_idx || start >= end {
            return None;
        }

        let (block_idx, skip, size) = if start <= self.block_idx && end <= stop {
            // Chunk inside the slice
            (self.block_idx - start, 0, self.size)
        } else if self.block_idx <= start && stop <= end {
            // Slice inside the chunk
            (0, (start - self.block_idx) as usize, (stop - start) as usize)
        } else if start < self.block_idx {
            // Slice covers the chunk's head
            (self.block_idx - start, 0, (stop - self.block_idx) as usize)
        } else {
            // Slice covers the chunk's tail
            (0, (start - self.block_idx) as usize, (end - start) as usize)
        };

        Some(Chunk {
            source: self.source,
            block_idx,
            source_idx: self.source_idx + skip,
            size,
            text: self.text[skip..skip + size].to_vec(),
        })
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Source: {}, Block_idx: {}, Source_idx: {}, Size: {}, Text: {}",
            self.source,
            self.block_idx,
            self.source_idx,
            self.size,
            self.text.join(" ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_text() -> Vec<String> {
        (0..120).map(|i| format!("w{i}")).collect()
    }

    fn chunk(source: SourceId, block_idx: isize, source_idx: usize, text: &[String]) -> Chunk {
        Chunk::new(source, block_idx, source_idx, text.len(), text.to_vec()).unwrap()
    }

    #[test]
    fn test_new_rejects_size_mismatch() {
        let text = sample_text();
        let err = Chunk::new(0, 0, 0, 5, text[..4].to_vec()).unwrap_err();
        assert!(matches!(err, SynthError::InvalidArgument { .. }));
    }

    #[test]
    fn test_chunk_eq() {
        let text = sample_text();
        let c1 = chunk(0, 5, 0, &text[..20]);
        let c2 = chunk(1, 10, 5, &text[5..25]);
        let mut c4 = chunk(0, 5, 0, &text[..20]);
        assert_eq!(c1, c4);
        assert_ne!(c1, c2);

        c4.shift_block_index(5);
        assert_ne!(c1, c4);
    }

    #[test]
    fn test_shift_block_index() {
        let text = sample_text();
        let mut c1 = chunk(0, 5, 0, &text[..20]);
        let mut c2 = chunk(1, 10, 5, &text[5..25]);
        c1.shift_block_index(5);
        c2.shift_block_index(-3);
        assert_eq!(c1.block_idx(), 10);
        assert_eq!(c2.block_idx(), 7);
    }

    #[test]
    fn test_trim_to_block_limit() {
        let text = sample_text();
        let mut c1 = chunk(0, 5, 0, &text[..20]);
        let mut c2 = chunk(1, 10, 5, &text[5..25]);
        let mut c3 = chunk(3, 50, 50, &text[50..100]);

        c1.trim_to_block_limit(30);
        c2.trim_to_block_limit(20);
        c3.trim_to_block_limit(20);

        assert_eq!(c1.size(), 20, "limit past the end must not trim");
        assert_eq!(c1.text(), &text[..20]);
        assert_eq!(c2.size(), 10);
        assert_eq!(c2.text(), &text[5..15]);
        assert_eq!(c3.size(), 0);
        assert!(c3.text().is_empty());
    }

    #[test]
    fn test_trim_to_block_limit_at_start_collapses() {
        let text = sample_text();
        let mut c = chunk(0, 7, 3, &text[3..9]);
        c.trim_to_block_limit(7);
        assert_eq!(c.size(), 0);
        assert!(c.text().is_empty());
    }

    #[test]
    fn test_trim_to_slice_cases() {
        let text = sample_text();
        let c1 = chunk(0, 5, 0, &text[..20]);

        assert_eq!(c1.trim_to_slice(0, 4), None);
        assert_eq!(c1.trim_to_slice(30, 40), None);
        assert_eq!(c1.trim_to_slice(25, 40), None, "touching the end is disjoint");

        assert_eq!(c1.trim_to_slice(4, 30), Some(chunk(0, 1, 0, &text[..20])));
        assert_eq!(c1.trim_to_slice(10, 15), Some(chunk(0, 0, 5, &text[5..10])));
        assert_eq!(c1.trim_to_slice(0, 8), Some(chunk(0, 5, 0, &text[..3])));
        assert_eq!(c1.trim_to_slice(15, 30), Some(chunk(0, 0, 10, &text[10..20])));
    }

    #[test]
    fn test_trim_to_slice_exact_bounds() {
        let text = sample_text();
        let c = chunk(2, 5, 40, &text[40..60]);
        assert_eq!(c.trim_to_slice(5, 25), Some(chunk(2, 0, 40, &text[40..60])));
        assert_eq!(c.trim_to_slice(5, 10), Some(chunk(2, 0, 40, &text[40..45])));
        assert_eq!(c.trim_to_slice(20, 25), Some(chunk(2, 0, 55, &text[55..60])));
    }

    proptest! {
        #[test]
        fn prop_size_matches_text_after_mutation(
            len in 1usize..40,
            block_idx in -20isize..20,
            delta in -30isize..30,
            limit in -30isize..60,
            start in -10isize..50,
            width in 1isize..40,
        ) {
            let text = sample_text();
            let mut c = chunk(1, block_idx, 3, &text[3..3 + len]);
            c.shift_block_index(delta);
            prop_assert_eq!(c.size(), c.text().len());

            if let Some(sliced) = c.trim_to_slice(start, start + width) {
                prop_assert_eq!(sliced.size(), sliced.text().len());
                prop_assert!(sliced.size() > 0);
                prop_assert_eq!(&sliced.text()[..], &text[sliced.source_idx()..sliced.source_end()]);
            }

            c.trim_to_block_limit(limit);
            prop_assert_eq!(c.size(), c.text().len());
            prop_assert!(c.block_end() <= limit.max(c.block_idx()));
            prop_assert_eq!(&c.text()[..], &text[3..3 + c.size()]);
        }
    }
}
