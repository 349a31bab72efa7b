pub mod fasta;

use std::collections::HashMap;
use std::path::Path;

use log::{info, warn};

use crate::error::Error;

use fasta::{Chromosome, parse_fasta_files};

/// Source of reference bases for motif lookup.
///
/// `start` and `end` are 0-based and inclusive. Implementations fail with
/// `UnknownReference` for a sequence id they do not hold and with `Genome`
/// for a window outside the sequence.
pub trait GenomeSequenceProvider {
    fn subsequence(&self, seq_id: usize, start: u64, end: u64) -> Result<String, Error>;
}

/// Reference sequences loaded from FASTA, addressed in file order.
pub struct Genome {
    chromosomes: Vec<Chromosome>,
    by_name: HashMap<String, usize>,
}

impl Genome {
    /// Load every sequence from the given FASTA files.
    pub fn from_fasta<P: AsRef<Path>>(paths: &[P]) -> Result<Self, Error> {
        let chromosomes = parse_fasta_files(paths)?;
        Ok(Self::from_chromosomes(chromosomes))
    }

    pub fn from_chromosomes(chromosomes: Vec<Chromosome>) -> Self {
        let by_name = chromosomes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self {
            chromosomes,
            by_name,
        }
    }

    pub fn n_sequences(&self) -> usize {
        self.chromosomes.len()
    }

    pub fn total_length(&self) -> u64 {
        self.chromosomes.iter().map(|c| c.sequence.len() as u64).sum()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// View that addresses sequences by the alignment file's reference ids.
    ///
    /// References missing from the FASTA stay unresolved: a junction on one
    /// of them fails finalization with `UnknownReference`.
    pub fn for_references<S: AsRef<str>>(&self, reference_names: &[S]) -> ReferenceGenome<'_> {
        let ids: Vec<Option<usize>> = reference_names
            .iter()
            .map(|name| self.index_of(name.as_ref()))
            .collect();

        let missing = ids.iter().filter(|id| id.is_none()).count();
        if missing > 0 {
            warn!(
                "{} of {} alignment reference sequences are absent from the genome",
                missing,
                ids.len()
            );
        }

        ReferenceGenome { genome: self, ids }
    }

    fn window(&self, idx: usize, start: u64, end: u64) -> Result<String, Error> {
        let chrom = &self.chromosomes[idx];
        let len = chrom.sequence.len() as u64;
        if end < start || end >= len {
            return Err(Error::Genome(format!(
                "window {}..={} outside '{}' (length {})",
                start, end, chrom.name, len
            )));
        }
        Ok(String::from_utf8_lossy(&chrom.sequence[start as usize..=end as usize]).into_owned())
    }

    pub fn log_summary(&self) {
        info!(
            "Loaded {} reference sequences ({} bases)",
            self.n_sequences(),
            self.total_length()
        );
    }
}

impl GenomeSequenceProvider for Genome {
    fn subsequence(&self, seq_id: usize, start: u64, end: u64) -> Result<String, Error> {
        if seq_id >= self.chromosomes.len() {
            return Err(Error::UnknownReference(seq_id));
        }
        self.window(seq_id, start, end)
    }
}

/// A `Genome` re-indexed to an alignment header's reference order.
pub struct ReferenceGenome<'a> {
    genome: &'a Genome,
    ids: Vec<Option<usize>>,
}

impl GenomeSequenceProvider for ReferenceGenome<'_> {
    fn subsequence(&self, seq_id: usize, start: u64, end: u64) -> Result<String, Error> {
        match self.ids.get(seq_id).copied().flatten() {
            Some(idx) => self.genome.window(idx, start, end),
            None => Err(Error::UnknownReference(seq_id)),
        }
    }
}
