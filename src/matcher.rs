// Token run matching shared by overlap discovery, overlap verification and block merging.
// Ties are broken by position so every caller sees the same run for the same input.

use std::collections::HashMap;
use std::hash::Hash;

/// A common run: `a[a_start..a_start + size] == b[b_start..b_start + size]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenMatch {
    pub a_start: usize,
    pub b_start: usize,
    pub size: usize,
}

impl TokenMatch {
    pub fn a_end(&self) -> usize {
        self.a_start + self.size
    }

    pub fn b_end(&self) -> usize {
        self.b_start + self.size
    }
}

/// Index of every position each token occupies in `b`, ascending
fn index_positions<T: Eq + Hash>(b: &[T]) -> HashMap<&T, Vec<usize>> {
    let mut positions: HashMap<&T, Vec<usize>> = HashMap::new();
    for (j, token) in b.iter().enumerate() {
        positions.entry(token).or_default().push(j);
    }
    positions
}

fn longest_in_range<T: Eq + Hash>(
    a: &[T],
    positions: &HashMap<&T, Vec<usize>>,
    (alo, ahi): (usize, usize),
    (blo, bhi): (usize, usize),
) -> TokenMatch {
    let mut best = TokenMatch {
        a_start: alo,
        b_start: blo,
        size: 0,
    };

    // run_len[j] = length of the run ending at (i - 1, j)
    let mut run_len: HashMap<usize, usize> = HashMap::new();
    for (i, token) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next_run_len = HashMap::new();
        if let Some(js) = positions.get(token) {
            for &j in js {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = j
                    .checked_sub(1)
                    .and_then(|prev| run_len.get(&prev))
                    .copied()
                    .unwrap_or(0)
                    + 1;
                next_run_len.insert(j, k);
                // Strict comparison keeps the earliest run on ties.
                if k > best.size {
                    best = TokenMatch {
                        a_start: i + 1 - k,
                        b_start: j + 1 - k,
                        size: k,
                    };
                }
            }
        }
        run_len = next_run_len;
    }

    best
}

/// Longest common run of `a` and `b`.
///
/// Ties go to the run starting earliest in `a`, then earliest in `b`. A
/// `size` of zero means the sequences share no token.
pub fn longest_match<T: Eq + Hash>(a: &[T], b: &[T]) -> TokenMatch {
    let positions = index_positions(b);
    longest_in_range(a, &positions, (0, a.len()), (0, b.len()))
}

/// All maximal non-overlapping common runs of `a` and `b`, ordered by position.
///
/// Takes the longest run, then recurses into the unmatched prefixes and
/// suffixes on either side. Runs adjacent in both sequences are collapsed.
pub fn matching_blocks<T: Eq + Hash>(a: &[T], b: &[T]) -> Vec<TokenMatch> {
    let positions = index_positions(b);
    let mut pending = vec![((0, a.len()), (0, b.len()))];
    let mut found = Vec::new();

    while let Some(((alo, ahi), (blo, bhi))) = pending.pop() {
        let m = longest_in_range(a, &positions, (alo, ahi), (blo, bhi));
        if m.size == 0 {
            continue;
        }
        if alo < m.a_start && blo < m.b_start {
            pending.push(((alo, m.a_start), (blo, m.b_start)));
        }
        if m.a_end() < ahi && m.b_end() < bhi {
            pending.push(((m.a_end(), ahi), (m.b_end(), bhi)));
        }
        found.push(m);
    }

    found.sort_by_key(|m| (m.a_start, m.b_start));

    let mut collapsed: Vec<TokenMatch> = Vec::with_capacity(found.len());
    for m in found {
        match collapsed.last_mut() {
            Some(last) if last.a_end() == m.a_start && last.b_end() == m.b_start => {
                last.size += m.size;
            }
            _ => collapsed.push(m),
        }
    }
    collapsed
}
