/// Junction evidence metrics: offset entropy, coverage contrast and the
/// read-depth track they are computed from.
use std::collections::{BTreeMap, HashMap};

/// Shannon entropy (base 2) of the distribution of read boundary offsets.
///
/// All reads at one offset give 0; spreading the same number of reads over
/// distinct offsets gives a strictly larger value. Empty input is 0.
pub fn entropy(offsets: &[u32]) -> f64 {
    if offsets.is_empty() {
        return 0.0;
    }

    // BTreeMap so the summation order, and therefore the exact result, never
    // depends on hashing.
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for &offset in offsets {
        *counts.entry(offset).or_insert(0) += 1;
    }

    let total = offsets.len() as f64;
    let e: f64 = counts
        .values()
        .map(|&n| {
            let p = n as f64 / total;
            -p * p.log2()
        })
        .sum();

    // -0.0 for a single group
    e.abs()
}

/// Signed contrast between flank depth and intron-body depth.
///
/// `profile` spans flank, intron, flank. The first and last `flank_width`
/// positions are the flanks and the remainder is the centre. The result is
/// `(mean_flank - mean_centre) / (mean_flank + mean_centre)`, in `[-1, 1]`,
/// positive for the expected exon/intron/exon shape and negative when the
/// intron body is covered more deeply than its flanks. A profile with no
/// depth at all, or no centre, scores 0.
pub fn coverage(flank_width: usize, profile: &[u32]) -> f64 {
    if flank_width == 0 || profile.len() <= flank_width * 2 {
        return 0.0;
    }

    let (leading, rest) = profile.split_at(flank_width);
    let (centre, trailing) = rest.split_at(rest.len() - flank_width);

    let flank_sum: u64 = leading.iter().chain(trailing).map(|&d| d as u64).sum();
    let centre_sum: u64 = centre.iter().map(|&d| d as u64).sum();

    let mean_flank = flank_sum as f64 / (flank_width * 2) as f64;
    let mean_centre = centre_sum as f64 / centre.len() as f64;

    let denom = mean_flank + mean_centre;
    if denom == 0.0 {
        0.0
    } else {
        (mean_flank - mean_centre) / denom
    }
}

/// Additive read-depth accumulator, one difference map per reference.
///
/// Each aligned block adds +1 at its start and -1 one past its end. Merging
/// two tracks is key-wise addition, so it is associative and commutative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepthTrack {
    deltas: HashMap<usize, BTreeMap<u64, i64>>,
}

impl DepthTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one aligned block covering `[start, end)`.
    pub fn add_block(&mut self, seq_id: usize, start: u64, end: u64) {
        if end <= start {
            return;
        }
        let map = self.deltas.entry(seq_id).or_default();
        *map.entry(start).or_insert(0) += 1;
        *map.entry(end).or_insert(0) -= 1;
    }

    /// Fold another track into this one.
    pub fn merge(&mut self, other: DepthTrack) {
        for (seq_id, other_map) in other.deltas {
            let map = self.deltas.entry(seq_id).or_default();
            for (pos, delta) in other_map {
                *map.entry(pos).or_insert(0) += delta;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Convert to a queryable step function.
    pub fn freeze(&self) -> DepthProfile {
        let steps = self
            .deltas
            .iter()
            .map(|(&seq_id, map)| {
                let mut depth: i64 = 0;
                let mut steps = Vec::with_capacity(map.len());
                for (&pos, &delta) in map {
                    if delta == 0 {
                        continue;
                    }
                    depth += delta;
                    steps.push((pos, depth.max(0) as u32));
                }
                (seq_id, steps)
            })
            .collect();
        DepthProfile { steps }
    }
}

/// Read depth as a step function: `(position, depth from here on)`.
#[derive(Debug, Clone, Default)]
pub struct DepthProfile {
    steps: HashMap<usize, Vec<(u64, u32)>>,
}

impl DepthProfile {
    /// Per-base depth over the inclusive window `[start - flank, end + flank]`.
    ///
    /// Positions before the start of the reference are reported as depth 0
    /// so the window stays symmetric.
    pub fn window(&self, seq_id: usize, start: u64, end: u64, flank: u64) -> Vec<u32> {
        let lo = start as i128 - flank as i128;
        let hi = end as i128 + flank as i128;
        let mut out = Vec::with_capacity((hi - lo + 1).max(0) as usize);

        let steps = self.steps.get(&seq_id).map(Vec::as_slice).unwrap_or(&[]);
        let first = lo.max(0) as u64;
        let mut idx = steps.partition_point(|&(p, _)| p <= first);
        let mut depth = if idx == 0 { 0 } else { steps[idx - 1].1 };

        for pos in lo..=hi {
            if pos < 0 {
                out.push(0);
                continue;
            }
            let pos = pos as u64;
            while idx < steps.len() && steps[idx].0 <= pos {
                depth = steps[idx].1;
                idx += 1;
            }
            out.push(depth);
        }
        out
    }
}
