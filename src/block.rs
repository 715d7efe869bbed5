//! Blocks: sets of mutually verified chunks defining one consensus text
//!
//! A block's `merged_text` is the overlay of its chunks in ascending
//! `block_idx` order. The first chunk to reach a position owns it; later
//! chunks only contribute the suffix beyond what is already covered. After
//! every structural change the chunks are re-sorted, the smallest `block_idx`
//! is moved to 0, the merged text is recompiled and the per-source span cache
//! is refreshed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunk::{Chunk, SourceId};
use crate::error::{Result, SynthError};
use crate::matcher::{longest_match, matching_blocks, TokenMatch};

/// Shortest run accepted as an overlap; interior verification needs more than this
pub const MIN_GRAM_LEN: usize = 6;

/// An edge reconciliation must match more than this many tokens
pub const EDGE_MATCH_MIN: usize = 3;

/// Two blocks must share more than this many tokens to be merged
pub const MIN_OVERLAP_GRAM_LEN: usize = 3;

/// Unmatched flanks longer than this cannot be trusted without separate verification
pub const OVERLY_LONG_OVERLAP: usize = 10;

/// Contiguous source-article span explained by a block, `[min_idx, max_idx)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    #[serde(rename = "min")]
    pub min_idx: usize,
    #[serde(rename = "max")]
    pub max_idx: usize,
}

impl SourceSpan {
    pub fn len(&self) -> usize {
        self.max_idx - self.min_idx
    }

    pub fn is_empty(&self) -> bool {
        self.max_idx == self.min_idx
    }

    fn cover(&mut self, start: usize, end: usize) {
        self.min_idx = self.min_idx.min(start);
        self.max_idx = self.max_idx.max(end);
    }
}

/// How a proposal must be cut down before insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapTrim {
    /// First proposal token to keep
    pub offset: usize,
    /// Number of proposal tokens to keep
    pub len: usize,
    /// Block position of the first kept token
    pub block_idx: isize,
}

/// Result of checking a proposed overlap against a block's merged text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapVerdict {
    /// Token-for-token agreement
    Exact,
    /// Agreement once letter case is ignored
    CaseInsensitive,
    /// A fuzzy reconciliation succeeded; only part of the proposal is kept
    Trimmed(OverlapTrim),
    Rejected,
}


/// Outcome of `Block::add_overlap`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapOutcome {
    Accepted,
    /// The pair is now banned for this block; nothing else changed
    Rejected,
}

/// Where two blocks line up, as found by `Block::plan_merge`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeAnchor {
    pub self_start: usize,
    pub other_start: usize,
    pub size: usize,
}

fn ordered_pair(a: SourceId, b: SourceId) -> (SourceId, SourceId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn eq_ignore_case(a: &[String], b: &[String]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.to_lowercase() == y.to_lowercase())
}

/// One consensus region built from chunks of several sources
#[derive(Debug, Clone, Default)]
pub struct Block {
    chunks: Vec<Chunk>,
    merged_text: Vec<String>,
    sources: BTreeSet<SourceId>,
    source_spans: BTreeMap<SourceId, SourceSpan>,
    banned_pairs: BTreeSet<(SourceId, SourceId)>,
}

impl Block {
    /// Seed a block from an overlap: both chunks start at block position 0.
    pub fn from_overlap(
        x: SourceId,
        x0: usize,
        y: SourceId,
        y0: usize,
        size: usize,
        text: Vec<String>,
    ) -> Result<Self> {
        let first = Chunk::new(x, 0, x0, size, text.clone())?;
        let second = Chunk::new(y, 0, y0, size, text)?;
        Ok(Self::from_chunks(vec![first, second]))
    }

    /// Build a block that exclusively owns `chunks`.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        let mut block = Self {
            chunks,
            ..Self::default()
        };
        block.rebuild();
        block
    }

    pub fn len(&self) -> usize {
        self.merged_text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged_text.is_empty()
    }

    pub fn merged_text(&self) -> &[String] {
        &self.merged_text
    }

    pub fn get(&self, idx: usize) -> Option<&String> {
        self.merged_text.get(idx)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn sources(&self) -> &BTreeSet<SourceId> {
        &self.sources
    }

    pub fn banned_pairs(&self) -> &BTreeSet<(SourceId, SourceId)> {
        &self.banned_pairs
    }

    /// Whether an overlap between `a` and `b` already failed verification here
    pub fn is_banned(&self, a: SourceId, b: SourceId) -> bool {
        self.banned_pairs.contains(&ordered_pair(a, b))
    }

    /// Per source, the covered span of its article
    pub fn source_min_max(&self) -> &BTreeMap<SourceId, SourceSpan> {
        &self.source_spans
    }

    pub fn source_span(&self, source: SourceId) -> Option<SourceSpan> {
        self.source_spans.get(&source).copied()
    }

    /// Chunks contributed by `source`, in block order
    pub fn source_chunks(&self, source: SourceId) -> Result<Vec<&Chunk>> {
        if !self.sources.contains(&source) {
            return Err(SynthError::NotFound { source_id: source });
        }
        Ok(self.chunks.iter().filter(|c| c.source() == source).collect())
    }

    /// New block holding `[start, stop)` of this block's merged text.
    pub fn slice(&self, start: usize, stop: usize) -> Result<Block> {
        let len = self.len();
        if start > len || stop > len {
            return Err(SynthError::invalid(format!(
                "cannot slice [{start}, {stop}) from a block of length {len}"
            )));
        }
        if start >= stop {
            return Err(SynthError::invalid(format!(
                "slice start {start} must be below stop {stop}"
            )));
        }

        let chunks = self
            .chunks
            .iter()
            .filter_map(|c| c.trim_to_slice(start as isize, stop as isize))
            .collect();
        Ok(Block::from_chunks(chunks))
    }

    /// Project `source_idx` of `source` into block coordinates.
    ///
    /// Takes the chunk edge nearest to `source_idx` and extrapolates linearly
    /// from it. This is a heuristic used to decide where a proposed overlap
    /// attaches, not an exact inverse of the chunk mapping.
    pub fn locate_block_offset(&self, source: SourceId, source_idx: usize) -> Result<isize> {
        let target = source_idx as isize;
        let mut nearest: Option<(isize, isize)> = None;

        for chunk in self.source_chunks(source)? {
            let edges = [
                (chunk.block_idx(), target - chunk.source_idx() as isize),
                (chunk.block_end(), target - chunk.source_end() as isize),
            ];
            for (edge, dist) in edges {
                if nearest.map_or(true, |(_, best)| dist.abs() < best.abs()) {
                    nearest = Some((edge, dist));
                }
            }
        }

        nearest
            .map(|(edge, dist)| edge + dist)
            .ok_or(SynthError::NotFound { source_id: source })
    }

    /// Compare a proposal placed at `block_idx` with the current merged text.
    ///
    /// Only the part of the proposal that lands inside the block is compared.
    /// A proposal that lands entirely outside has nothing to verify against
    /// and is rejected.
    pub fn verify_overlap(&self, block_idx: isize, text: &[String]) -> OverlapVerdict {
        let len = self.len() as isize;
        let size = text.len() as isize;
        let lo = block_idx.max(0);
        let hi = (block_idx + size).min(len);
        if lo >= hi {
            return OverlapVerdict::Rejected;
        }

        let seg_offset = (lo - block_idx) as usize;
        let seg = &text[seg_offset..seg_offset + (hi - lo) as usize];
        let window = &self.merged_text[lo as usize..hi as usize];

        if seg == window {
            return OverlapVerdict::Exact;
        }
        if eq_ignore_case(seg, window) {
            return OverlapVerdict::CaseInsensitive;
        }

        let left_edge = block_idx < 0;
        let right_edge = block_idx + size > len;

        if left_edge || right_edge {
            let Some(anchor) = edge_anchor(seg, window, left_edge, right_edge) else {
                return OverlapVerdict::Rejected;
            };
            // An overhang is kept only when the anchor runs unbroken from the
            // block edge on that side; otherwise just the anchored run is kept.
            let keep_left = left_edge && anchor.a_start == 0 && anchor.b_start == 0;
            let keep_right =
                right_edge && anchor.a_end() == seg.len() && anchor.b_end() == window.len();
            let keep_start = if keep_left { 0 } else { seg_offset + anchor.a_start };
            let keep_end = if keep_right {
                text.len()
            } else {
                seg_offset + anchor.a_end()
            };
            let anchor_pos = lo + anchor.b_start as isize;
            let lead = (seg_offset + anchor.a_start - keep_start) as isize;
            OverlapVerdict::Trimmed(OverlapTrim {
                offset: keep_start,
                len: keep_end - keep_start,
                block_idx: anchor_pos - lead,
            })
        } else {
            let m = longest_match(seg, window);
            if m.size > MIN_GRAM_LEN {
                OverlapVerdict::Trimmed(OverlapTrim {
                    offset: seg_offset + m.a_start,
                    len: m.size,
                    block_idx: lo + m.b_start as isize,
                })
            } else {
                OverlapVerdict::Rejected
            }
        }
    }

    /// Incorporate an overlap between `x` (already a member) and `y`.
    ///
    /// On rejection the pair is banned for this block and nothing else
    /// changes. That is an expected outcome, not an error.
    pub fn add_overlap(
        &mut self,
        x: SourceId,
        x0: usize,
        size: usize,
        y: SourceId,
        y0: usize,
        text: Vec<String>,
    ) -> Result<OverlapOutcome> {
        if !self.sources.contains(&x) {
            return Err(SynthError::invalid(format!(
                "cannot extend block from source {x}: it is not a member"
            )));
        }
        if size != text.len() {
            return Err(SynthError::invalid(format!(
                "overlap size {size} does not match text length {}",
                text.len()
            )));
        }

        let block_idx = self.locate_block_offset(x, x0)?;
        let (block_idx, x0, y0, text) = match self.verify_overlap(block_idx, &text) {
            OverlapVerdict::Rejected => {
                debug!(x, x0, y, y0, size, "Overlap failed verification, banning pair");
                self.banned_pairs.insert(ordered_pair(x, y));
                return Ok(OverlapOutcome::Rejected);
            }
            OverlapVerdict::Exact | OverlapVerdict::CaseInsensitive => (block_idx, x0, y0, text),
            OverlapVerdict::Trimmed(trim) => {
                debug!(x, y, ?trim, "Overlap accepted after fuzzy reconciliation");
                let kept = text[trim.offset..trim.offset + trim.len].to_vec();
                (trim.block_idx, x0 + trim.offset, y0 + trim.offset, kept)
            }
        };

        self.chunks.push(Chunk::from_text(x, block_idx, x0, text.clone()));
        self.chunks.push(Chunk::from_text(y, block_idx, y0, text));
        self.rebuild();
        Ok(OverlapOutcome::Accepted)
    }

    /// Decide whether `other` can be stitched onto this block.
    ///
    /// Needs a shared run longer than `MIN_OVERLAP_GRAM_LEN`. Refuses when
    /// both blocks continue for more than `OVERLY_LONG_OVERLAP` tokens past
    /// the run on the same side, since they would disagree over text neither
    /// has verified against the other.
    pub fn plan_merge(&self, other: &Block) -> Option<MergeAnchor> {
        let m = longest_match(&self.merged_text, &other.merged_text);
        if m.size <= MIN_OVERLAP_GRAM_LEN {
            return None;
        }

        let self_tail = self.len() - m.a_end();
        let other_tail = other.len() - m.b_end();
        if self_tail > OVERLY_LONG_OVERLAP && other_tail > OVERLY_LONG_OVERLAP {
            debug!(self_tail, other_tail, "Refusing merge: both right flanks too long");
            return None;
        }
        if m.a_start > OVERLY_LONG_OVERLAP && m.b_start > OVERLY_LONG_OVERLAP {
            debug!(
                self_head = m.a_start,
                other_head = m.b_start,
                "Refusing merge: both left flanks too long"
            );
            return None;
        }

        Some(MergeAnchor {
            self_start: m.a_start,
            other_start: m.b_start,
            size: m.size,
        })
    }

    /// Consume both blocks and stitch them at `anchor`.
    ///
    /// This block's chunks come first, so it wins any position both cover.
    pub fn merge(self, other: Block, anchor: MergeAnchor) -> Block {
        let mut chunks = self.chunks;
        for chunk in &mut chunks {
            chunk.shift_block_index(-(anchor.self_start as isize));
        }
        chunks.extend(other.chunks.into_iter().map(|mut chunk| {
            chunk.shift_block_index(-(anchor.other_start as isize));
            chunk
        }));
        Block::from_chunks(chunks)
    }

    /// `plan_merge` followed by `merge`; hands both blocks back when refused.
    pub fn try_merge(self, other: Block) -> std::result::Result<Block, (Block, Block)> {
        match self.plan_merge(&other) {
            Some(anchor) => Ok(self.merge(other, anchor)),
            None => Err((self, other)),
        }
    }

    /// Bridge two blocks that are adjacent in `source` but share no text.
    ///
    /// `dist` is the signed source distance from the end of this block's span
    /// to the start of `other`'s. A negative distance trims the overshoot off
    /// this block's tail. `gap_text` is raw source text starting at
    /// `source_idx`; it is spliced in unverified.
    pub fn fuzzy_merge(
        self,
        other: Block,
        dist: isize,
        source: SourceId,
        source_idx: usize,
        gap_text: Option<Vec<String>>,
    ) -> Block {
        let mut first = self;

        if dist < 0 {
            let limit = first.len() as isize + dist;
            for chunk in &mut first.chunks {
                chunk.trim_to_block_limit(limit);
            }
            first.chunks.retain(|c| c.size() > 0);
            first.rebuild();
        }

        if let Some(gap) = gap_text.filter(|g| !g.is_empty()) {
            let at = first.len() as isize;
            first.chunks.push(Chunk::from_text(source, at, source_idx, gap));
            first.rebuild();
        }

        let offset = first.len() as isize;
        let mut chunks = first.chunks;
        chunks.extend(other.chunks.into_iter().map(|mut chunk| {
            chunk.shift_block_index(offset);
            chunk
        }));
        Block::from_chunks(chunks)
    }

    fn rebuild(&mut self) {
        // Stable: equal offsets keep insertion order, which decides the overlay.
        self.chunks.sort_by_key(|c| c.block_idx());
        if let Some(min) = self.chunks.first().map(|c| c.block_idx()) {
            if min != 0 {
                for chunk in &mut self.chunks {
                    chunk.shift_block_index(-min);
                }
            }
        }
        self.recompile_text();
        self.refresh_sources();
    }

    fn recompile_text(&mut self) {
        let mut text = Vec::new();
        let mut covered: isize = 0;
        for chunk in &self.chunks {
            if chunk.block_idx() <= covered && chunk.block_end() >= covered {
                let skip = (covered - chunk.block_idx()) as usize;
                text.extend_from_slice(&chunk.text()[skip..]);
                covered = chunk.block_end();
            }
        }
        self.merged_text = text;
    }

    fn refresh_sources(&mut self) {
        let mut spans: BTreeMap<SourceId, SourceSpan> = BTreeMap::new();
        for chunk in &self.chunks {
            spans
                .entry(chunk.source())
                .and_modify(|span| span.cover(chunk.source_idx(), chunk.source_end()))
                .or_insert(SourceSpan {
                    min_idx: chunk.source_idx(),
                    max_idx: chunk.source_end(),
                });
        }
        self.sources = spans.keys().copied().collect();
        self.source_spans = spans;
    }
}

/// Choose the run that anchors an edge proposal.
///
/// Only runs longer than `EDGE_MATCH_MIN` qualify. Among those, the one nearest
/// the edge the proposal hangs over wins, or the longest when it hangs over
/// both.
fn edge_anchor(
    seg: &[String],
    window: &[String],
    left_edge: bool,
    right_edge: bool,
) -> Option<TokenMatch> {
    let mut best: Option<TokenMatch> = None;
    for m in matching_blocks(seg, window) {
        if m.size <= EDGE_MATCH_MIN {
            continue;
        }
        let better = match best {
            None => true,
            Some(b) if left_edge && right_edge => m.size > b.size,
            Some(b) if left_edge => {
                m.b_start < b.b_start || (m.b_start == b.b_start && m.size > b.size)
            }
            Some(b) => m.b_end() > b.b_end() || (m.b_end() == b.b_end() && m.size > b.size),
        };
        if better {
            best = Some(m);
        }
    }
    best
}

impl Index<usize> for Block {
    type Output = String;

    fn index(&self, idx: usize) -> &String {
        &self.merged_text[idx]
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.merged_text.join(" "))
    }
}
