/// Intron-keyed junction index with partition merge
use super::intron::{Intron, MotifTable, Strand};
use super::metrics::DepthTrack;
use super::model::Junction;
use crate::error::Error;
use crate::genome::GenomeSequenceProvider;
use crate::io::alignment::AlignmentRecord;
use crate::params::Strandedness;
use rayon::prelude::*;
use std::collections::HashMap;

/// All junctions seen in (part of) an alignment stream, plus the read depth
/// the coverage metric is computed from.
///
/// Aggregation workers each own one index; `merge` combines them. Merging is
/// associative and commutative, so the result does not depend on how the
/// stream was partitioned.
#[derive(Debug, Clone, Default)]
pub struct JunctionIndex {
    junctions: HashMap<Intron, Junction>,
    depth: DepthTrack,
}

impl JunctionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of already-finalized junctions, as loaded from a junction table.
    pub fn from_junctions(junctions: impl IntoIterator<Item = Junction>) -> Self {
        Self {
            junctions: junctions
                .into_iter()
                .map(|j| (*j.intron(), j))
                .collect(),
            depth: DepthTrack::new(),
        }
    }

    /// Add one alignment's evidence.
    ///
    /// The record is fully decomposed before anything is written, so a
    /// malformed record leaves the index untouched. Returns the number of
    /// splice events the record contributed.
    pub fn record_alignment(
        &mut self,
        record: &AlignmentRecord,
        library: Strandedness,
    ) -> Result<usize, Error> {
        let Some(seq_id) = record.reference_sequence_id else {
            return Ok(0);
        };
        let blocks = record.exon_blocks()?;
        let events = record.splice_events(library)?;

        for block in &blocks {
            self.depth.add_block(seq_id, block.start, block.end);
        }
        for event in &events {
            self.junctions
                .entry(event.intron)
                .and_modify(|j| j.add_evidence(event))
                .or_insert_with(|| Junction::from_event(event));
        }
        Ok(events.len())
    }

    /// Combine two partition-local indexes.
    pub fn merge(mut self, mut other: JunctionIndex) -> JunctionIndex {
        // Fold the smaller map into the larger one
        if other.junctions.len() > self.junctions.len() {
            std::mem::swap(&mut self, &mut other);
        }
        for (intron, junction) in other.junctions {
            match self.junctions.get_mut(&intron) {
                Some(existing) => existing.merge(junction),
                None => {
                    self.junctions.insert(intron, junction);
                }
            }
        }
        self.depth.merge(other.depth);
        self
    }

    /// Fail if any coordinates were observed on more than one strand.
    ///
    /// Intron identity must be unambiguous before finalization. The
    /// reported conflict is the lowest locus, so the error is stable across
    /// runs.
    pub fn check_consistency(&self) -> Result<(), Error> {
        let mut seen: HashMap<(usize, u64, u64), Strand> = HashMap::new();
        let mut conflicts: Vec<((usize, u64, u64), Strand, Strand)> = Vec::new();

        for intron in self.junctions.keys() {
            match seen.get(&intron.locus()) {
                Some(&other) if other != intron.strand() => {
                    let (a, b) = if other < intron.strand() {
                        (other, intron.strand())
                    } else {
                        (intron.strand(), other)
                    };
                    conflicts.push((intron.locus(), a, b));
                }
                Some(_) => {}
                None => {
                    seen.insert(intron.locus(), intron.strand());
                }
            }
        }

        match conflicts.into_iter().min() {
            Some(((seq_id, start, end), first, second)) => Err(Error::MergeConsistency {
                seq_id,
                start,
                end,
                first: first.as_char(),
                second: second.as_char(),
            }),
            None => Ok(()),
        }
    }

    /// Finalize every junction in parallel on the current rayon pool.
    ///
    /// Each junction writes only its own metrics; the depth track is frozen
    /// once and shared read-only.
    pub fn finalize<G>(
        &mut self,
        genome: &G,
        motifs: &MotifTable,
        coverage_flank: u64,
    ) -> Result<(), Error>
    where
        G: GenomeSequenceProvider + Sync + ?Sized,
    {
        let depth = self.depth.freeze();
        self.junctions
            .par_iter_mut()
            .try_for_each(|(_, junction)| junction.finalize(genome, &depth, motifs, coverage_flank))
    }

    pub fn len(&self) -> usize {
        self.junctions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.junctions.is_empty()
    }

    pub fn get(&self, intron: &Intron) -> Option<&Junction> {
        self.junctions.get(intron)
    }

    /// Junctions ordered by reference, start, end and strand.
    pub fn sorted(&self) -> Vec<&Junction> {
        let mut out: Vec<&Junction> = self.junctions.values().collect();
        out.sort_by_key(|j| *j.intron());
        out
    }

    pub(crate) fn junctions_mut(&mut self) -> impl ParallelIterator<Item = &mut Junction> {
        self.junctions.par_iter_mut().map(|(_, j)| j)
    }
}
