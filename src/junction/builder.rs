/// Parallel junction aggregation over an alignment stream
use super::index::JunctionIndex;
use super::intron::MotifTable;
use crate::error::Error;
use crate::genome::GenomeSequenceProvider;
use crate::io::alignment::{AlignmentRecord, AlignmentSource};
use crate::params::{MAX_BATCH_RECORDS, MAX_COVERAGE_FLANK, Parameters, Strandedness};
use crate::stats::AggregationStats;
use log::{debug, info};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

/// Turns an alignment stream into a finalized `JunctionIndex`.
///
/// The stream is cut into contiguous chunks of `chunk_size` records. Each
/// worker builds a private index for its chunk, the private indexes are
/// merged, and only then is the merged index finalized. Results do not
/// depend on `threads` or `chunk_size`.
#[derive(Debug, Clone)]
pub struct JunctionBuilder {
    threads: usize,
    chunk_size: usize,
    library: Strandedness,
    coverage_flank: u64,
    motifs: MotifTable,
}

impl JunctionBuilder {
    pub fn new(threads: usize, chunk_size: usize) -> Self {
        Self {
            threads: threads.max(1),
            chunk_size: chunk_size.max(1),
            library: Strandedness::Unknown,
            coverage_flank: 10,
            motifs: MotifTable::default(),
        }
    }

    pub fn from_params(params: &Parameters) -> Result<Self, Error> {
        Ok(Self::new(params.run_thread_n, params.chunk_size)
            .with_library(params.strand_specific)
            .with_coverage_flank(params.coverage_flank)
            .with_motifs(params.motif_table()?))
    }

    pub fn with_library(mut self, library: Strandedness) -> Self {
        self.library = library;
        self
    }

    pub fn with_coverage_flank(mut self, flank: u64) -> Self {
        self.coverage_flank = flank;
        self
    }

    pub fn with_motifs(mut self, motifs: MotifTable) -> Self {
        self.motifs = motifs;
        self
    }

    /// Aggregate, merge and finalize.
    ///
    /// Malformed records are skipped and counted. Any other source error, an
    /// intron seen on conflicting strands, or a reference the genome does not
    /// hold aborts with no index returned.
    pub fn build<S, G>(
        &self,
        source: S,
        genome: &G,
    ) -> Result<(JunctionIndex, AggregationStats), Error>
    where
        S: AlignmentSource,
        G: GenomeSequenceProvider + Sync + ?Sized,
    {
        let batch_len = self
            .threads
            .checked_mul(self.chunk_size)
            .filter(|&n| n <= MAX_BATCH_RECORDS)
            .ok_or_else(|| {
                Error::Parameter(format!(
                    "{} threads x {} records per chunk exceeds {} buffered records",
                    self.threads, self.chunk_size, MAX_BATCH_RECORDS
                ))
            })?;
        if self.coverage_flank > MAX_COVERAGE_FLANK {
            return Err(Error::Parameter(format!(
                "coverage flank {} exceeds {}",
                self.coverage_flank, MAX_COVERAGE_FLANK
            )));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| {
                Error::Parameter(format!("cannot start {} worker threads: {e}", self.threads))
            })?;

        let mut batch: Vec<AlignmentRecord> = Vec::new();
        let mut index = JunctionIndex::new();
        let mut stats = AggregationStats::new();
        let mut n_batches = 0usize;

        for item in source {
            match item {
                Ok(record) => batch.push(record),
                Err(e) if e.is_recoverable() => {
                    debug!("Skipping record: {e}");
                    stats.record_malformed(e.to_string());
                }
                Err(e) => return Err(e),
            }

            if batch.len() == batch_len {
                let (part, part_stats) = pool.install(|| self.aggregate(&batch))?;
                index = index.merge(part);
                stats = stats.merge(part_stats);
                batch.clear();
                n_batches += 1;
            }
        }
        if !batch.is_empty() {
            let (part, part_stats) = pool.install(|| self.aggregate(&batch))?;
            index = index.merge(part);
            stats = stats.merge(part_stats);
            n_batches += 1;
        }
        debug!("Aggregated {} batches", n_batches);

        index.check_consistency()?;

        info!("Finalizing {} junctions...", index.len());
        pool.install(|| index.finalize(genome, &self.motifs, self.coverage_flank))?;

        Ok((index, stats))
    }

    /// Local builds over one batch, one chunk per task, reduced pairwise.
    fn aggregate(&self, batch: &[AlignmentRecord]) -> Result<(JunctionIndex, AggregationStats), Error> {
        batch
            .par_chunks(self.chunk_size)
            .map(|chunk| self.local_build(chunk))
            .try_reduce(
                || (JunctionIndex::new(), AggregationStats::new()),
                |(a, a_stats), (b, b_stats)| Ok((a.merge(b), a_stats.merge(b_stats))),
            )
    }

    fn local_build(&self, chunk: &[AlignmentRecord]) -> Result<(JunctionIndex, AggregationStats), Error> {
        let mut index = JunctionIndex::new();
        let mut stats = AggregationStats::new();

        for record in chunk {
            if !record.is_primary_evidence() {
                stats.record_ignored();
                continue;
            }
            match index.record_alignment(record, self.library) {
                Ok(n_events) => stats.record_evidence(n_events),
                Err(e) if e.is_recoverable() => {
                    debug!("Skipping record: {e}");
                    stats.record_malformed(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        Ok((index, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::alignment::CigarOp;
    use crate::junction::{CanonicalSs, Intron, Junction, Strand};
    use noodles::sam::alignment::record::Flags;

    /// chr0: GT at 20..=21 and AG at 29..=30, 100 bases.
    /// chr1: CT at 120..=121 and AC at 318..=319 (negative-strand canonical).
    struct TwoRefs {
        seqs: Vec<Vec<u8>>,
    }

    impl TwoRefs {
        fn new() -> Self {
            let mut chr0 = vec![b'A'; 100];
            chr0[20..22].copy_from_slice(b"GT");
            chr0[29..31].copy_from_slice(b"AG");
            let mut chr1 = vec![b'C'; 500];
            chr1[120..122].copy_from_slice(b"CT");
            chr1[318..320].copy_from_slice(b"AC");
            Self {
                seqs: vec![chr0, chr1],
            }
        }
    }

    impl GenomeSequenceProvider for TwoRefs {
        fn subsequence(&self, seq_id: usize, start: u64, end: u64) -> Result<String, Error> {
            let seq = self.seqs.get(seq_id).ok_or(Error::UnknownReference(seq_id))?;
            Ok(String::from_utf8_lossy(&seq[start as usize..=end as usize]).into_owned())
        }
    }

    fn rec(seq: usize, start: u64, cigar: &str, strand: Strand) -> AlignmentRecord {
        let mut r = AlignmentRecord::new(seq, start, CigarOp::parse_cigar(cigar).unwrap());
        r.xs_strand = Some(strand);
        r
    }

    fn records() -> Vec<AlignmentRecord> {
        let mut out = vec![
            rec(0, 10, "10M11N10M", Strand::Positive),
            rec(0, 12, "8M11N15M", Strand::Positive),
            rec(0, 0, "40M", Strand::Positive),
            rec(0, 5, "15M11N5M", Strand::Positive),
            rec(1, 100, "20M200N20M", Strand::Negative),
            rec(1, 90, "30M200N5M", Strand::Negative),
            rec(1, 95, "25M200N25M", Strand::Negative),
        ];
        let mut secondary = rec(0, 10, "10M11N10M", Strand::Positive);
        secondary.flags = Flags::SECONDARY;
        out.push(secondary);
        out
    }

    fn source(
        records: Vec<AlignmentRecord>,
    ) -> impl Iterator<Item = Result<AlignmentRecord, Error>> {
        records.into_iter().map(Ok)
    }

    type Summary = (Intron, u32, u64, u64, Vec<u32>, String, String, u64, u64);

    fn summary(index: &JunctionIndex) -> Vec<Summary> {
        index
            .sorted()
            .into_iter()
            .map(|j: &Junction| {
                let m = j.metrics().unwrap();
                let mut offsets = j.anchor_offsets().to_vec();
                offsets.sort_unstable();
                (
                    *j.intron(),
                    j.support_count(),
                    j.left_anchor(),
                    j.right_anchor(),
                    offsets,
                    m.donor_motif.clone(),
                    m.acceptor_motif.clone(),
                    m.entropy.to_bits(),
                    m.coverage.to_bits(),
                )
            })
            .collect()
    }

    #[test]
    fn builds_finalized_index() {
        let builder = JunctionBuilder::new(2, 3).with_coverage_flank(5);
        let (index, stats) = builder.build(source(records()), &TwoRefs::new()).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(stats.total_records, 8);
        assert_eq!(stats.ignored_by_flags, 1);
        assert_eq!(stats.spliced, 6);

        let pos = index
            .get(&Intron::new(0, 20, 30, Strand::Positive).unwrap())
            .unwrap();
        assert_eq!(pos.support_count(), 3);
        assert_eq!(pos.metrics().unwrap().canonical, CanonicalSs::Canonical);

        let neg = index
            .get(&Intron::new(1, 120, 319, Strand::Negative).unwrap())
            .unwrap();
        assert_eq!(neg.support_count(), 3);
        assert_eq!(neg.metrics().unwrap().donor_motif, "CT");
        assert_eq!(neg.metrics().unwrap().acceptor_motif, "AC");
        assert_eq!(neg.metrics().unwrap().canonical, CanonicalSs::Canonical);
    }

    #[test]
    fn result_independent_of_threads_and_chunk_size() {
        let genome = TwoRefs::new();
        let (reference, _) = JunctionBuilder::new(1, 10_000)
            .build(source(records()), &genome)
            .unwrap();

        for (threads, chunk) in [(1, 1), (2, 1), (3, 2), (4, 3), (8, 5)] {
            let (index, stats) = JunctionBuilder::new(threads, chunk)
                .build(source(records()), &genome)
                .unwrap();
            assert_eq!(summary(&index), summary(&reference), "threads={threads} chunk={chunk}");
            assert_eq!(stats.total_records, 8);
        }
    }

    #[test]
    fn malformed_records_are_skipped() {
        let mut input: Vec<Result<AlignmentRecord, Error>> =
            records().into_iter().map(Ok).collect();
        input.insert(2, Ok(rec(0, 0, "10M10N", Strand::Positive)));
        input.insert(4, Err(Error::MalformedAlignment("bad CIGAR".into())));

        let (index, stats) = JunctionBuilder::new(2, 2)
            .build(input.into_iter(), &TwoRefs::new())
            .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(stats.malformed, 2);
        assert_eq!(stats.total_records, 10);
    }

    #[test]
    fn source_failure_is_fatal() {
        let mut input: Vec<Result<AlignmentRecord, Error>> =
            records().into_iter().map(Ok).collect();
        input.push(Err(Error::Bam("truncated file".into())));

        let result = JunctionBuilder::new(1, 4).build(input.into_iter(), &TwoRefs::new());
        assert!(matches!(result, Err(Error::Bam(_))));
    }

    #[test]
    fn unknown_reference_is_fatal() {
        let mut input = records();
        input.push(rec(7, 10, "10M50N10M", Strand::Positive));
        let result = JunctionBuilder::new(2, 2).build(source(input), &TwoRefs::new());
        assert!(matches!(result, Err(Error::UnknownReference(7))));
    }

    #[test]
    fn strand_conflict_across_partitions_is_fatal() {
        let input = vec![
            rec(0, 10, "10M11N10M", Strand::Positive),
            rec(0, 10, "10M11N10M", Strand::Negative),
        ];
        let result = JunctionBuilder::new(2, 1).build(source(input), &TwoRefs::new());
        assert!(matches!(result, Err(Error::MergeConsistency { .. })));
    }

    #[test]
    fn oversized_partitions_are_rejected() {
        let result = JunctionBuilder::new(2, usize::MAX).build(source(records()), &TwoRefs::new());
        assert!(matches!(result, Err(Error::Parameter(_))));

        let result = JunctionBuilder::new(8, 1_000_000_000).build(source(records()), &TwoRefs::new());
        assert!(matches!(result, Err(Error::Parameter(_))));

        let result = JunctionBuilder::new(1, 10)
            .with_coverage_flank(100_000_000_000)
            .build(source(records()), &TwoRefs::new());
        assert!(matches!(result, Err(Error::Parameter(_))));
    }

    #[test]
    fn empty_stream() {
        let (index, stats) = JunctionBuilder::new(4, 100)
            .build(source(Vec::new()), &TwoRefs::new())
            .unwrap();
        assert!(index.is_empty());
        assert_eq!(stats, AggregationStats::default());
    }
}
