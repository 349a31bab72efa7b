/// Junction: one intron plus the evidence gathered for it
use super::intron::{CanonicalSs, Intron, MotifTable};
use super::metrics::{DepthProfile, coverage, entropy};
use crate::error::Error;
use crate::genome::GenomeSequenceProvider;
use crate::io::alignment::SpliceEvent;

/// Metrics derived once evidence aggregation is complete.
#[derive(Debug, Clone, PartialEq)]
pub struct JunctionMetrics {
    pub donor_motif: String,
    pub acceptor_motif: String,
    pub canonical: CanonicalSs,
    pub entropy: f64,
    pub coverage: f64,
}

/// Outcome of rule-based classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterResult {
    Pass,
    /// Id of the first rule the junction failed
    Fail(String),
}

impl FilterResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, FilterResult::Pass)
    }
}

/// A splice junction and its accumulated evidence.
///
/// Evidence (`support_count`, anchors, offsets) only grows during
/// aggregation. `metrics` is filled by finalization and `filter_result` by
/// the filter engine, each once.
#[derive(Debug, Clone)]
pub struct Junction {
    intron: Intron,
    left_anchor: u64,
    right_anchor: u64,
    support_count: u32,
    anchor_offsets: Vec<u32>,
    metrics: Option<JunctionMetrics>,
    filter_result: Option<FilterResult>,
}

impl Junction {
    /// Start a junction from its first supporting alignment.
    pub fn from_event(event: &SpliceEvent) -> Self {
        Self {
            intron: event.intron,
            left_anchor: event.left_anchor,
            right_anchor: event.right_anchor,
            support_count: 1,
            anchor_offsets: vec![event.offset],
            metrics: None,
            filter_result: None,
        }
    }

    /// Rebuild a finalized junction, e.g. from a junction table row.
    pub fn from_parts(
        intron: Intron,
        left_anchor: u64,
        right_anchor: u64,
        support_count: u32,
        metrics: JunctionMetrics,
    ) -> Self {
        Self {
            intron,
            left_anchor,
            right_anchor,
            support_count,
            anchor_offsets: Vec::new(),
            metrics: Some(metrics),
            filter_result: None,
        }
    }

    pub fn intron(&self) -> &Intron {
        &self.intron
    }

    pub fn left_anchor(&self) -> u64 {
        self.left_anchor
    }

    pub fn right_anchor(&self) -> u64 {
        self.right_anchor
    }

    pub fn support_count(&self) -> u32 {
        self.support_count
    }

    pub fn anchor_offsets(&self) -> &[u32] {
        &self.anchor_offsets
    }

    pub fn metrics(&self) -> Option<&JunctionMetrics> {
        self.metrics.as_ref()
    }

    pub fn filter_result(&self) -> Option<&FilterResult> {
        self.filter_result.as_ref()
    }

    /// Longest exonic overhang left of the intron.
    pub fn max_left_overhang(&self) -> u64 {
        self.intron.start() - self.left_anchor
    }

    /// Longest exonic overhang right of the intron.
    pub fn max_right_overhang(&self) -> u64 {
        self.right_anchor - self.intron.end()
    }

    /// Span from the widest left anchor to the widest right anchor.
    pub fn anchor_span(&self) -> u64 {
        self.right_anchor - self.left_anchor + 1
    }

    /// Add one more supporting alignment.
    pub fn add_evidence(&mut self, event: &SpliceEvent) {
        debug_assert_eq!(event.intron, self.intron);
        self.support_count += 1;
        self.left_anchor = self.left_anchor.min(event.left_anchor);
        self.right_anchor = self.right_anchor.max(event.right_anchor);
        self.anchor_offsets.push(event.offset);
    }

    /// Fold in the same junction as built from another partition.
    pub fn merge(&mut self, other: Junction) {
        debug_assert_eq!(other.intron, self.intron);
        self.support_count += other.support_count;
        self.left_anchor = self.left_anchor.min(other.left_anchor);
        self.right_anchor = self.right_anchor.max(other.right_anchor);
        self.anchor_offsets.extend(other.anchor_offsets);
    }

    /// Compute motifs, canonicality and scores from the merged evidence.
    pub fn finalize<G>(
        &mut self,
        genome: &G,
        depth: &DepthProfile,
        motifs: &MotifTable,
        coverage_flank: u64,
    ) -> Result<(), Error>
    where
        G: GenomeSequenceProvider + ?Sized,
    {
        debug_assert!(self.metrics.is_none(), "junction finalized twice");

        let seq_id = self.intron.seq_id();
        let donor = genome.subsequence(seq_id, self.intron.start(), self.intron.start() + 1)?;
        let acceptor = genome.subsequence(seq_id, self.intron.end() - 1, self.intron.end())?;
        let canonical = motifs.classify(self.intron.strand(), &donor, &acceptor)?;

        let profile = depth.window(
            seq_id,
            self.intron.start(),
            self.intron.end(),
            coverage_flank,
        );

        self.metrics = Some(JunctionMetrics {
            donor_motif: donor,
            acceptor_motif: acceptor,
            canonical,
            entropy: entropy(&self.anchor_offsets),
            coverage: coverage(coverage_flank as usize, &profile),
        });
        Ok(())
    }

    pub(crate) fn set_filter_result(&mut self, result: FilterResult) {
        debug_assert!(self.filter_result.is_none(), "junction classified twice");
        self.filter_result = Some(result);
    }
}
