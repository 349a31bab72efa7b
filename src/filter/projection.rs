/// Projection of an alignment file onto the passing junctions
use crate::error::Error;
use crate::io::alignment::{AlignmentRecord, SpliceEvent};
use crate::io::bam::{self, BamWriter};
use crate::junction::{Intron, Junction};
use crate::params::{ProjectionPolicy, Strandedness};
use log::{debug, info, warn};
use noodles::bam as nbam;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// Keeps or drops alignments according to the junctions they imply.
///
/// Introns are recomputed with the same decomposition and strand inference
/// used during aggregation, so a record maps to exactly the junctions it
/// contributed to.
#[derive(Debug, Clone)]
pub struct BamFilterEngine {
    pass: HashSet<Intron>,
    policy: ProjectionPolicy,
    library: Strandedness,
}

/// Counters from one projection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionStats {
    pub total: u64,
    pub retained: u64,
    pub dropped: u64,
    /// Spliced records whose gaps could not be decoded (dropped)
    pub malformed: u64,
}

impl BamFilterEngine {
    pub fn new(pass: HashSet<Intron>, policy: ProjectionPolicy, library: Strandedness) -> Self {
        Self {
            pass,
            policy,
            library,
        }
    }

    /// Pass set from junctions read from a table of passing junctions.
    pub fn from_junctions<'a>(
        junctions: impl IntoIterator<Item = &'a Junction>,
        policy: ProjectionPolicy,
        library: Strandedness,
    ) -> Self {
        let pass = junctions.into_iter().map(|j| *j.intron()).collect();
        Self::new(pass, policy, library)
    }

    pub fn n_pass(&self) -> usize {
        self.pass.len()
    }

    /// Whether a record survives.
    ///
    /// Unspliced records are always kept. A spliced record is kept when all
    /// (policy `All`) or at least one (policy `Any`) of its introns passed.
    pub fn retains(&self, record: &AlignmentRecord) -> Result<bool, Error> {
        let events = record.splice_events(self.library)?;
        if events.is_empty() {
            return Ok(true);
        }
        let passed = |e: &SpliceEvent| self.pass.contains(&e.intron);
        Ok(match self.policy {
            ProjectionPolicy::All => events.iter().all(passed),
            ProjectionPolicy::Any => events.iter().any(passed),
        })
    }

    /// Single ordered pass over `reader`, writing retained records unchanged.
    ///
    /// Malformed spliced records are dropped with a warning. Container read
    /// failures abort the pass.
    pub fn project<R: Read>(
        &self,
        reader: &mut nbam::io::Reader<R>,
        input_path: &Path,
        writer: &mut BamWriter,
    ) -> Result<ProjectionStats, Error> {
        let mut stats = ProjectionStats::default();

        for result in reader.records() {
            let record = result
                .map_err(|e| Error::Bam(format!("{}: {}", input_path.display(), e)))?;
            stats.total += 1;

            let keep = match bam::decode(&record).and_then(|r| self.retains(&r)) {
                Ok(keep) => keep,
                Err(e) if e.is_recoverable() => {
                    if stats.malformed < 10 {
                        warn!("Dropping alignment: {e}");
                    } else {
                        debug!("Dropping alignment: {e}");
                    }
                    stats.malformed += 1;
                    false
                }
                Err(e) => return Err(e),
            };

            if keep {
                writer.write(&record)?;
                stats.retained += 1;
            } else {
                stats.dropped += 1;
            }
        }

        Ok(stats)
    }
}

impl ProjectionStats {
    /// Print summary statistics to log
    pub fn print_summary(&self) {
        info!("=== BAM Filter Summary ===");
        info!("Alignments read: {}", self.total);
        info!("Alignments retained: {}", self.retained);
        info!("Alignments dropped: {}", self.dropped);
        if self.malformed > 0 {
            warn!("Malformed alignments dropped: {}", self.malformed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::alignment::CigarOp;
    use crate::io::bam::tests::{test_header, write_bam};
    use crate::junction::Strand;
    use tempfile::NamedTempFile;

    fn rec(start: u64, cigar: &str) -> AlignmentRecord {
        let mut r = AlignmentRecord::new(0, start, CigarOp::parse_cigar(cigar).unwrap());
        r.xs_strand = Some(Strand::Positive);
        r
    }

    fn intron(start: u64, end: u64) -> Intron {
        Intron::new(0, start, end, Strand::Positive).unwrap()
    }

    /// Passing introns: 20..=30 and 50..=99
    fn engine(policy: ProjectionPolicy) -> BamFilterEngine {
        BamFilterEngine::new(
            [intron(20, 30), intron(50, 99)].into_iter().collect(),
            policy,
            Strandedness::Unknown,
        )
    }

    #[test]
    fn unspliced_always_retained() {
        for policy in [ProjectionPolicy::All, ProjectionPolicy::Any] {
            assert!(engine(policy).retains(&rec(0, "100M")).unwrap());
        }
    }

    #[test]
    fn all_policy() {
        let e = engine(ProjectionPolicy::All);
        assert!(e.retains(&rec(10, "10M11N10M")).unwrap());
        // 20..=30 passes, 41..=45 does not
        assert!(!e.retains(&rec(10, "10M11N10M5N10M")).unwrap());
        // Same coordinates, other strand
        let mut neg = rec(10, "10M11N10M");
        neg.xs_strand = Some(Strand::Negative);
        assert!(!e.retains(&neg).unwrap());
    }

    #[test]
    fn any_policy() {
        let e = engine(ProjectionPolicy::Any);
        assert!(e.retains(&rec(10, "10M11N10M5N10M")).unwrap());
        assert!(!e.retains(&rec(10, "10M5N10M")).unwrap());
    }

    #[test]
    fn malformed_record_is_an_error() {
        let e = engine(ProjectionPolicy::All);
        assert!(matches!(
            e.retains(&rec(0, "10M10N")),
            Err(Error::MalformedAlignment(_))
        ));
    }

    #[test]
    fn projection_preserves_order() {
        let header = test_header(&[("chr1", 1000)]);
        let input = NamedTempFile::new().unwrap();
        let output = NamedTempFile::new().unwrap();

        let records = vec![
            rec(0, "100M"),          // kept
            rec(10, "10M11N10M"),    // kept
            rec(10, "10M5N10M"),     // dropped
            rec(40, "10M50N10M"),    // kept
            rec(5, "10M11N10M"),     // dropped (intron 15..=25)
            rec(200, "50M"),         // kept
        ];
        write_bam(input.path(), &header, &records);

        let (read_header, mut reader) = bam::open(input.path()).unwrap();
        let mut writer = BamWriter::create(output.path(), &read_header).unwrap();
        let stats = engine(ProjectionPolicy::All)
            .project(&mut reader, input.path(), &mut writer)
            .unwrap();
        writer.finish().unwrap();

        assert_eq!(
            stats,
            ProjectionStats {
                total: 6,
                retained: 4,
                dropped: 2,
                malformed: 0,
            }
        );

        let (_, mut out_reader) = bam::open(output.path()).unwrap();
        let kept: Vec<(u64, String)> = bam::alignment_records(&mut out_reader, output.path())
            .map(|r| {
                let r = r.unwrap();
                (r.alignment_start, r.cigar_string())
            })
            .collect();
        assert_eq!(
            kept,
            vec![
                (0, "100M".to_string()),
                (10, "10M11N10M".to_string()),
                (40, "10M50N10M".to_string()),
                (200, "50M".to_string()),
            ]
        );
    }
}
