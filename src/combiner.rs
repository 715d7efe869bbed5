//! Combiner: reconstructs one article from a cluster of copies
//!
//! 1. Discover every shared run of at least `min_gram_len` tokens between each
//!    pair of articles (largest article first).
//! 2. Seed a block from the globally longest run.
//! 3. Grow the block with every pending overlap straddling one of its covered
//!    source spans, until a full scan finds nothing.
//! 4. Seed further blocks from the longest overlap lying in a gap no block
//!    explains, grow them, merge blocks pairwise, repeat.
//! 5. Optionally bridge source-adjacent blocks, then score coverage.
//!
//! Everything is greedy. Ties go to whichever candidate is met first and
//! nothing is backtracked, so the result may keep several blocks.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::block::{Block, MergeAnchor, OverlapOutcome, SourceSpan, MIN_GRAM_LEN};
use crate::chunk::{Chunk, SourceId};
use crate::error::Result;
use crate::matcher::matching_blocks;

/// Source distance within which two blocks are considered adjacent
pub const MIN_TOKEN_DIST_MERGE_ATTEMPT: usize = 10;

/// Tunable thresholds for one combiner run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinerConfig {
    /// Shortest shared run recorded as an overlap
    pub min_gram_len: usize,
    /// Bridge source-adjacent blocks once the expansion cycle stalls
    pub fuzzy_merge: bool,
    /// Largest source distance a bridge may span
    pub fuzzy_merge_max_dist: usize,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            min_gram_len: MIN_GRAM_LEN,
            fuzzy_merge: false,
            fuzzy_merge_max_dist: MIN_TOKEN_DIST_MERGE_ATTEMPT,
        }
    }
}

/// A verified-equal run shared by the owning source and `partner`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapRecord {
    pub offset: usize,
    pub len: usize,
    pub partner: SourceId,
    pub partner_offset: usize,
}

impl OverlapRecord {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Partially overlaps `span`: crosses its start or its end
    fn straddles(&self, span: SourceSpan) -> bool {
        (self.offset < span.min_idx && self.end() > span.min_idx)
            || (self.offset < span.max_idx && self.end() > span.max_idx)
    }
}

/// Serializable view of one final block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockReport {
    pub merged_text: Vec<String>,
    pub sources: BTreeSet<SourceId>,
    pub source_spans: BTreeMap<SourceId, SourceSpan>,
    pub coverage: f64,
}

/// Run-level diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub block_count: usize,
    pub source_count: usize,
    pub elapsed_ms: u64,
}

/// Serializable result of one combiner run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinerReport {
    pub blocks: Vec<BlockReport>,
    pub diagnostics: RunDiagnostics,
}

impl CombinerReport {
    /// Merged text of the first block, space-joined
    pub fn best_text(&self) -> Option<String> {
        self.blocks.first().map(|b| b.merged_text.join(" "))
    }
}

/// Final blocks of a run, their coverages and diagnostics
#[derive(Debug, Clone)]
pub struct CombinerRun {
    pub blocks: Vec<Block>,
    pub coverages: Vec<f64>,
    pub diagnostics: RunDiagnostics,
}

impl CombinerRun {
    pub fn report(&self) -> CombinerReport {
        let blocks = self
            .blocks
            .iter()
            .zip(&self.coverages)
            .map(|(block, &coverage)| BlockReport {
                merged_text: block.merged_text().to_vec(),
                sources: block.sources().clone(),
                source_spans: block.source_min_max().clone(),
                coverage,
            })
            .collect();
        CombinerReport {
            blocks,
            diagnostics: self.diagnostics.clone(),
        }
    }
}

/// Candidate bridge between two source-adjacent blocks
#[derive(Debug, Clone, Copy)]
struct Bridge {
    earlier: usize,
    later: usize,
    source: SourceId,
    dist: isize,
    /// End of the earlier block's span in `source`
    gap_start: usize,
    /// Start of the later block's span in `source`
    gap_end: usize,
}

/// Orchestrates overlap discovery, block growth and merging for one cluster.
///
/// Holds all mutable state of a run; drive one instance from one thread.
/// Independent instances share nothing.
pub struct Combiner {
    articles: Vec<Vec<String>>,
    /// Source ids, largest article first
    order: Vec<SourceId>,
    total_len: usize,
    /// Pending overlaps per source; only ever shrinks
    overlaps: Vec<Vec<OverlapRecord>>,
    blocks: Vec<Block>,
    config: CombinerConfig,
}

impl Combiner {
    /// `articles[i]` holds the tokens of source `i`
    pub fn new(articles: Vec<Vec<String>>) -> Self {
        Self::with_config(articles, CombinerConfig::default())
    }

    pub fn with_config(articles: Vec<Vec<String>>, config: CombinerConfig) -> Self {
        let mut order: Vec<SourceId> = (0..articles.len()).collect();
        order.sort_by(|&a, &b| articles[b].len().cmp(&articles[a].len()));
        let total_len = articles.iter().map(Vec::len).sum();
        let overlaps = vec![Vec::new(); articles.len()];
        Self {
            articles,
            order,
            total_len,
            overlaps,
            blocks: Vec::new(),
            config,
        }
    }

    pub fn source_count(&self) -> usize {
        self.articles.len()
    }

    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Pending overlaps of `source`
    pub fn pending_overlaps(&self, source: SourceId) -> &[OverlapRecord] {
        self.overlaps.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reconstruct the article. Consumes the combiner.
    pub fn run(mut self) -> Result<CombinerRun> {
        let start_time = Instant::now();

        match self.find_overlaps() {
            Some((x, record)) => {
                self.take_overlap(x, record);
                let seed = self.seed_block(x, record)?;
                let seed = self.grow(seed)?;
                self.blocks.push(seed);
                self.expand()?;
                if self.config.fuzzy_merge {
                    self.bridge_blocks();
                }
            }
            None => {
                debug!("No shared runs found, emitting one block per article");
                self.blocks = self.single_source_blocks();
            }
        }

        let coverages = self
            .blocks
            .iter()
            .map(|b| self.estimate_block_coverage(b))
            .collect();
        let diagnostics = RunDiagnostics {
            block_count: self.blocks.len(),
            source_count: self.articles.len(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            blocks = diagnostics.block_count,
            sources = diagnostics.source_count,
            elapsed_ms = diagnostics.elapsed_ms,
            "Combiner finished"
        );

        Ok(CombinerRun {
            blocks: self.blocks,
            coverages,
            diagnostics,
        })
    }

    /// Share of all article tokens this block explains, in `[0, 1]`.
    pub fn estimate_block_coverage(&self, block: &Block) -> f64 {
        if self.total_len == 0 {
            return 0.0;
        }
        let covered: usize = block.source_min_max().values().map(SourceSpan::len).sum();
        covered as f64 / self.total_len as f64
    }

    /// Record every qualifying shared run between each pair of articles.
    ///
    /// Returns the globally longest one (first found on ties) with its owner.
    fn find_overlaps(&mut self) -> Option<(SourceId, OverlapRecord)> {
        let mut longest: Option<(SourceId, OverlapRecord)> = None;

        for (pos, &i) in self.order.iter().enumerate() {
            for &j in &self.order[pos + 1..] {
                let mut runs = matching_blocks(&self.articles[i], &self.articles[j]);
                runs.sort_by(|a, b| b.size.cmp(&a.size));

                for run in runs.iter().take_while(|r| r.size >= self.config.min_gram_len) {
                    let record = OverlapRecord {
                        offset: run.a_start,
                        len: run.size,
                        partner: j,
                        partner_offset: run.b_start,
                    };
                    if longest.map_or(true, |(_, best)| record.len > best.len) {
                        longest = Some((i, record));
                    }
                    self.overlaps[i].push(record);
                    self.overlaps[j].push(OverlapRecord {
                        offset: run.b_start,
                        len: run.size,
                        partner: i,
                        partner_offset: run.a_start,
                    });
                }
            }
        }

        let recorded: usize = self.overlaps.iter().map(Vec::len).sum();
        debug!(records = recorded / 2, "Overlap discovery complete");
        longest
    }

    fn take_overlap(&mut self, source: SourceId, record: OverlapRecord) {
        let pool = &mut self.overlaps[source];
        if let Some(pos) = pool.iter().position(|r| *r == record) {
            pool.remove(pos);
        }
    }

    fn article_text(&self, source: SourceId, start: usize, len: usize) -> Vec<String> {
        self.articles[source][start..start + len].to_vec()
    }

    fn seed_block(&self, source: SourceId, record: OverlapRecord) -> Result<Block> {
        debug!(source, ?record, "Seeding block");
        Block::from_overlap(
            source,
            record.offset,
            record.partner,
            record.partner_offset,
            record.len,
            self.article_text(source, record.offset, record.len),
        )
    }

    /// Absorb pending overlaps that straddle the block's covered spans until
    /// a full scan finds none. Every scan that continues consumes at least
    /// one record, so this terminates.
    fn grow(&mut self, mut block: Block) -> Result<Block> {
        loop {
            let mut proposals = Vec::new();
            for &source in block.sources() {
                let Some(span) = block.source_span(source) else {
                    continue;
                };
                let pool = &mut self.overlaps[source];
                let mut idx = 0;
                while idx < pool.len() {
                    let record = pool[idx];
                    if !block.is_banned(source, record.partner) && record.straddles(span) {
                        proposals.push((source, pool.remove(idx)));
                    } else {
                        idx += 1;
                    }
                }
            }

            if proposals.is_empty() {
                return Ok(block);
            }

            for (source, record) in proposals {
                let text = self.article_text(source, record.offset, record.len);
                let outcome = block.add_overlap(
                    source,
                    record.offset,
                    record.len,
                    record.partner,
                    record.partner_offset,
                    text,
                )?;
                if outcome == OverlapOutcome::Rejected {
                    debug!(source, partner = record.partner, "Growth proposal rejected");
                }
            }
        }
    }

    /// Seed, grow and merge blocks until no pending overlap lies in an
    /// unexplained gap. Each round consumes the record it seeds from.
    fn expand(&mut self) -> Result<()> {
        while let Some((source, record)) = self.longest_gap_overlap() {
            self.take_overlap(source, record);
            let block = self.seed_block(source, record)?;
            let block = self.grow(block)?;
            self.blocks.push(block);
            self.merge_blocks();
        }
        Ok(())
    }

    /// Uncovered `[start, end)` ranges of `source` across all blocks
    fn uncovered_gaps(&self, source: SourceId) -> Vec<(usize, usize)> {
        let mut spans: Vec<SourceSpan> = self
            .blocks
            .iter()
            .filter_map(|b| b.source_span(source))
            .collect();
        spans.sort_by_key(|s| s.min_idx);

        let mut gaps = Vec::new();
        let mut cursor = 0;
        for span in spans {
            if span.min_idx > cursor {
                gaps.push((cursor, span.min_idx));
            }
            cursor = cursor.max(span.max_idx);
        }
        let len = self.articles[source].len();
        if cursor < len {
            gaps.push((cursor, len));
        }
        gaps
    }

    fn longest_gap_overlap(&self) -> Option<(SourceId, OverlapRecord)> {
        let mut best: Option<(SourceId, OverlapRecord)> = None;
        for &source in &self.order {
            for (start, end) in self.uncovered_gaps(source) {
                for record in &self.overlaps[source] {
                    let inside = start <= record.offset && record.end() <= end;
                    if inside && best.map_or(true, |(_, b)| record.len > b.len) {
                        best = Some((source, *record));
                    }
                }
            }
        }
        best
    }

    /// Greedy pairwise merging. The scan restarts from the first pair after
    /// every merge; each merge removes a block, so there are at most
    /// `blocks.len() - 1` restarts.
    fn merge_blocks(&mut self) {
        while let Some((i, j, anchor)) = self.find_merge() {
            let other = self.blocks.remove(j);
            let block = std::mem::take(&mut self.blocks[i]);
            let merged = block.merge(other, anchor);
            debug!(left = i, right = j, len = merged.len(), "Merged blocks");
            self.blocks[i] = merged;
        }
    }

    fn find_merge(&self) -> Option<(usize, usize, MergeAnchor)> {
        for i in 0..self.blocks.len() {
            for j in i + 1..self.blocks.len() {
                if let Some(anchor) = self.blocks[i].plan_merge(&self.blocks[j]) {
                    return Some((i, j, anchor));
                }
            }
        }
        None
    }

    /// Join blocks that sit next to each other in some shared source without
    /// sharing text. Each bridge removes a block, which bounds the loop.
    fn bridge_blocks(&mut self) {
        self.blocks.sort_by(|a, b| b.len().cmp(&a.len()));

        while let Some(bridge) = self.find_bridge() {
            let (lo, hi) = if bridge.earlier < bridge.later {
                (bridge.earlier, bridge.later)
            } else {
                (bridge.later, bridge.earlier)
            };
            let high_block = self.blocks.remove(hi);
            let low_block = self.blocks.remove(lo);
            let (first, second) = if bridge.earlier == lo {
                (low_block, high_block)
            } else {
                (high_block, low_block)
            };

            let gap_text = (bridge.dist > 0).then(|| {
                self.articles[bridge.source][bridge.gap_start..bridge.gap_end].to_vec()
            });
            debug!(source = bridge.source, dist = bridge.dist, "Bridging adjacent blocks");
            let merged = first.fuzzy_merge(
                second,
                bridge.dist,
                bridge.source,
                bridge.gap_start,
                gap_text,
            );
            self.blocks.insert(lo, merged);
        }
    }

    fn find_bridge(&self) -> Option<Bridge> {
        let max_dist = self.config.fuzzy_merge_max_dist as isize;
        for i in 0..self.blocks.len() {
            for j in i + 1..self.blocks.len() {
                let mut candidates = Vec::new();
                for &source in self.blocks[i].sources().intersection(self.blocks[j].sources()) {
                    let (Some(a), Some(b)) = (
                        self.blocks[i].source_span(source),
                        self.blocks[j].source_span(source),
                    ) else {
                        continue;
                    };
                    let (earlier, later, first, second) = if a.min_idx < b.min_idx {
                        (i, j, a, b)
                    } else {
                        (j, i, b, a)
                    };
                    let dist = second.min_idx as isize - first.max_idx as isize;
                    if dist.abs() < max_dist {
                        candidates.push(Bridge {
                            earlier,
                            later,
                            source,
                            dist,
                            gap_start: first.max_idx,
                            gap_end: second.min_idx,
                        });
                    }
                }
                if let Some(nearest) = candidates.into_iter().min_by_key(|c| c.dist.abs()) {
                    return Some(nearest);
                }
            }
        }
        None
    }

    fn single_source_blocks(&self) -> Vec<Block> {
        self.order
            .iter()
            .filter(|&&source| !self.articles[source].is_empty())
            .map(|&source| {
                Block::from_chunks(vec![Chunk::from_text(
                    source,
                    0,
                    0,
                    self.articles[source].clone(),
                )])
            })
            .collect()
    }
}
