/// Alignment stream model and spliced-placement decomposition
use crate::error::Error;
use crate::junction::{Intron, Strand};
use crate::params::Strandedness;
use noodles::sam::alignment::record::Flags;
use std::fmt;

/// CIGAR operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOp {
    /// M: match/mismatch (default mode)
    Match(u32),
    /// =: exact match (optional)
    Equal(u32),
    /// X: mismatch (optional)
    Diff(u32),
    /// I: insertion to reference
    Ins(u32),
    /// D: deletion from reference
    Del(u32),
    /// N: splice junction (skipped reference region)
    RefSkip(u32),
    /// S: soft clip (clipped sequence present in read)
    SoftClip(u32),
    /// H: hard clip (clipped sequence not present)
    HardClip(u32),
    /// P: padding
    Pad(u32),
}

impl CigarOp {
    /// Get the operation character
    pub fn op_char(&self) -> char {
        match self {
            CigarOp::Match(_) => 'M',
            CigarOp::Equal(_) => '=',
            CigarOp::Diff(_) => 'X',
            CigarOp::Ins(_) => 'I',
            CigarOp::Del(_) => 'D',
            CigarOp::RefSkip(_) => 'N',
            CigarOp::SoftClip(_) => 'S',
            CigarOp::HardClip(_) => 'H',
            CigarOp::Pad(_) => 'P',
        }
    }

    /// Get the operation length
    pub fn len(&self) -> u32 {
        match self {
            CigarOp::Match(n)
            | CigarOp::Equal(n)
            | CigarOp::Diff(n)
            | CigarOp::Ins(n)
            | CigarOp::Del(n)
            | CigarOp::RefSkip(n)
            | CigarOp::SoftClip(n)
            | CigarOp::HardClip(n)
            | CigarOp::Pad(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aligned bases that lie on the reference (exon body, including deletions).
    pub fn covers_reference(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_) | CigarOp::Equal(_) | CigarOp::Diff(_) | CigarOp::Del(_)
        )
    }

    /// Parse a SAM-style CIGAR string such as `10M200N15M`.
    pub fn parse_cigar(s: &str) -> Result<Vec<CigarOp>, Error> {
        let mut ops = Vec::new();
        let mut len: Option<u32> = None;
        for c in s.chars() {
            if let Some(d) = c.to_digit(10) {
                len = Some(
                    len.unwrap_or(0)
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(d))
                        .ok_or_else(|| {
                            Error::MalformedAlignment(format!("CIGAR length overflow in '{s}'"))
                        })?,
                );
                continue;
            }
            let n = len.take().ok_or_else(|| {
                Error::MalformedAlignment(format!("CIGAR op '{c}' without length in '{s}'"))
            })?;
            ops.push(match c {
                'M' => CigarOp::Match(n),
                '=' => CigarOp::Equal(n),
                'X' => CigarOp::Diff(n),
                'I' => CigarOp::Ins(n),
                'D' => CigarOp::Del(n),
                'N' => CigarOp::RefSkip(n),
                'S' => CigarOp::SoftClip(n),
                'H' => CigarOp::HardClip(n),
                'P' => CigarOp::Pad(n),
                _ => {
                    return Err(Error::MalformedAlignment(format!(
                        "unknown CIGAR op '{c}' in '{s}'"
                    )));
                }
            });
        }
        if len.is_some() {
            return Err(Error::MalformedAlignment(format!(
                "trailing length without op in CIGAR '{s}'"
            )));
        }
        Ok(ops)
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.len(), self.op_char())
    }
}

/// One placed read, reduced to what junction analysis needs.
#[derive(Debug, Clone)]
pub struct AlignmentRecord {
    /// Reference sequence index (None when unplaced)
    pub reference_sequence_id: Option<usize>,
    /// Leftmost aligned position (0-based)
    pub alignment_start: u64,
    pub cigar: Vec<CigarOp>,
    pub flags: Flags,
    /// Strand from the `XS` tag, when the aligner provided one
    pub xs_strand: Option<Strand>,
}

/// A contiguous reference-covering block, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub start: u64,
    pub end: u64,
}

/// Evidence contributed by one internal gap of one alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceEvent {
    pub intron: Intron,
    /// First base of the exon block left of the gap
    pub left_anchor: u64,
    /// Last base of the exon block right of the gap
    pub right_anchor: u64,
    /// Distance from the alignment start to the intron start
    pub offset: u32,
}

impl AlignmentRecord {
    /// Mapped record without optional tags.
    pub fn new(reference_sequence_id: usize, alignment_start: u64, cigar: Vec<CigarOp>) -> Self {
        Self {
            reference_sequence_id: Some(reference_sequence_id),
            alignment_start,
            cigar,
            flags: Flags::empty(),
            xs_strand: None,
        }
    }

    /// Whether this record may contribute junction evidence.
    ///
    /// Unmapped, secondary, supplementary, QC-failed and duplicate records
    /// are ignored by aggregation.
    pub fn is_primary_evidence(&self) -> bool {
        !(self.flags.is_unmapped()
            || self.flags.is_secondary()
            || self.flags.is_supplementary()
            || self.flags.is_qc_fail()
            || self.flags.is_duplicate())
            && self.reference_sequence_id.is_some()
    }

    pub fn is_spliced(&self) -> bool {
        self.cigar.iter().any(|op| matches!(op, CigarOp::RefSkip(_)))
    }

    /// Transcript strand of the read's splice events.
    ///
    /// An `XS` tag always wins. Otherwise the library protocol decides: in a
    /// first-strand (dUTP) library the first segment maps antisense to the
    /// transcript, in a second-strand library it maps sense.
    pub fn strand(&self, library: Strandedness) -> Strand {
        if let Some(strand) = self.xs_strand {
            return strand;
        }

        let sense = match library {
            Strandedness::FirstStrand => false,
            Strandedness::SecondStrand => true,
            Strandedness::Unstranded | Strandedness::Unknown => return Strand::Unknown,
        };
        let second_segment = self.flags.is_segmented() && self.flags.is_last_segment();
        let forward = !self.flags.is_reverse_complemented();

        // Each inversion flips which genomic strand the transcript is on
        if forward ^ !sense ^ second_segment {
            Strand::Positive
        } else {
            Strand::Negative
        }
    }

    /// Reference-covering exon blocks, split at each `N` gap.
    ///
    /// A gap with no aligned block on either side, or a zero-length gap, is a
    /// malformed gap structure.
    pub fn exon_blocks(&self) -> Result<Vec<Block>, Error> {
        let mut blocks = Vec::new();
        let mut pos = self.alignment_start;
        let mut block_start = pos;
        let mut saw_gap = false;

        for op in &self.cigar {
            let len = op.len() as u64;
            match op {
                CigarOp::RefSkip(_) => {
                    if len == 0 {
                        return Err(self.malformed("zero-length N operation"));
                    }
                    if pos == block_start {
                        return Err(self.malformed("N operation without a preceding aligned block"));
                    }
                    blocks.push(Block {
                        start: block_start,
                        end: pos,
                    });
                    pos += len;
                    block_start = pos;
                    saw_gap = true;
                }
                op if op.covers_reference() => pos += len,
                _ => {}
            }
        }

        if pos > block_start {
            blocks.push(Block {
                start: block_start,
                end: pos,
            });
        } else if saw_gap {
            return Err(self.malformed("N operation without a following aligned block"));
        }

        Ok(blocks)
    }

    /// Decompose the spliced placement into one splice event per gap.
    ///
    /// Unspliced records yield no events. Both aggregation and projection go
    /// through here so they always agree on a record's introns.
    pub fn splice_events(&self, library: Strandedness) -> Result<Vec<SpliceEvent>, Error> {
        if !self.is_spliced() {
            return Ok(Vec::new());
        }
        let seq_id = self
            .reference_sequence_id
            .ok_or_else(|| self.malformed("spliced record without a reference sequence"))?;

        let blocks = self.exon_blocks()?;
        let strand = self.strand(library);

        blocks
            .windows(2)
            .map(|pair| {
                let (left, right) = (pair[0], pair[1]);
                let intron = Intron::new(seq_id, left.end, right.start - 1, strand)
                    .map_err(|_| self.malformed("gap shorter than two bases"))?;
                let offset = u32::try_from(left.end - self.alignment_start)
                    .map_err(|_| self.malformed("splice offset exceeds 32 bits"))?;
                Ok(SpliceEvent {
                    intron,
                    left_anchor: left.start,
                    right_anchor: right.end - 1,
                    offset,
                })
            })
            .collect()
    }

    pub fn cigar_string(&self) -> String {
        self.cigar.iter().map(|op| op.to_string()).collect()
    }

    fn malformed(&self, reason: &str) -> Error {
        Error::MalformedAlignment(format!(
            "{reason} (ref {:?}, pos {}, CIGAR {})",
            self.reference_sequence_id,
            self.alignment_start,
            self.cigar_string()
        ))
    }
}

/// Anything that yields alignment records in stream order.
///
/// Per-record failures come through as `Err` items; `MalformedAlignment`
/// items are skipped by consumers, anything else stops the stream.
pub trait AlignmentSource: Iterator<Item = Result<AlignmentRecord, Error>> {}

impl<I> AlignmentSource for I where I: Iterator<Item = Result<AlignmentRecord, Error>> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start: u64, cigar: &str) -> AlignmentRecord {
        AlignmentRecord::new(0, start, CigarOp::parse_cigar(cigar).unwrap())
    }

    #[test]
    fn parse_cigar_ops() {
        let ops = CigarOp::parse_cigar("5S10M200N15M2I3D").unwrap();
        assert_eq!(
            ops,
            vec![
                CigarOp::SoftClip(5),
                CigarOp::Match(10),
                CigarOp::RefSkip(200),
                CigarOp::Match(15),
                CigarOp::Ins(2),
                CigarOp::Del(3),
            ]
        );
        assert!(CigarOp::parse_cigar("10Q").is_err());
        assert!(CigarOp::parse_cigar("M").is_err());
        assert!(CigarOp::parse_cigar("10M5").is_err());
    }

    #[test]
    fn cigar_display_round_trips() {
        let rec = record(0, "3S10M100N20M");
        assert_eq!(rec.cigar_string(), "3S10M100N20M");
    }

    #[test]
    fn unspliced_record_has_no_events() {
        let rec = record(100, "50M");
        assert!(!rec.is_spliced());
        assert!(rec.splice_events(Strandedness::Unknown).unwrap().is_empty());
        assert_eq!(
            rec.exon_blocks().unwrap(),
            vec![Block {
                start: 100,
                end: 150
            }]
        );
    }

    #[test]
    fn single_gap_decomposition() {
        // Exon 10..20, intron 20..=30, exon 31..=40
        let mut rec = record(10, "10M11N10M");
        rec.xs_strand = Some(Strand::Positive);
        let events = rec.splice_events(Strandedness::Unknown).unwrap();
        assert_eq!(events.len(), 1);
        let ev = events[0];
        assert_eq!(ev.intron, Intron::new(0, 20, 30, Strand::Positive).unwrap());
        assert_eq!(ev.intron.size(), 11);
        assert_eq!(ev.left_anchor, 10);
        assert_eq!(ev.right_anchor, 40);
        assert_eq!(ev.offset, 10);
    }

    #[test]
    fn multiple_gaps_with_clips_and_deletions() {
        let rec = record(100, "5S10M2D8M50N20M100N5M3S");
        let events = rec.splice_events(Strandedness::Unknown).unwrap();
        assert_eq!(events.len(), 2);

        // First block 100..120 (10M + 2D + 8M)
        assert_eq!(events[0].intron.start(), 120);
        assert_eq!(events[0].intron.end(), 169);
        assert_eq!(events[0].left_anchor, 100);
        assert_eq!(events[0].right_anchor, 189);
        assert_eq!(events[0].offset, 20);

        assert_eq!(events[1].intron.start(), 190);
        assert_eq!(events[1].intron.end(), 289);
        assert_eq!(events[1].left_anchor, 170);
        assert_eq!(events[1].right_anchor, 294);
        assert_eq!(events[1].offset, 90);
        assert_eq!(events[1].intron.strand(), Strand::Unknown);
    }

    #[test]
    fn malformed_gap_structures() {
        assert!(matches!(
            record(0, "10N10M").splice_events(Strandedness::Unknown),
            Err(Error::MalformedAlignment(_))
        ));
        assert!(matches!(
            record(0, "10M10N").splice_events(Strandedness::Unknown),
            Err(Error::MalformedAlignment(_))
        ));
        assert!(matches!(
            record(0, "10M10N5S").splice_events(Strandedness::Unknown),
            Err(Error::MalformedAlignment(_))
        ));
        assert!(matches!(
            record(0, "10M5N5N10M").splice_events(Strandedness::Unknown),
            Err(Error::MalformedAlignment(_))
        ));
        assert!(matches!(
            record(0, "10M0N10M").splice_events(Strandedness::Unknown),
            Err(Error::MalformedAlignment(_))
        ));
        assert!(matches!(
            record(0, "10M1N10M").splice_events(Strandedness::Unknown),
            Err(Error::MalformedAlignment(_))
        ));
    }

    #[test]
    fn xs_tag_overrides_library() {
        let mut rec = record(0, "10M100N10M");
        rec.xs_strand = Some(Strand::Negative);
        assert_eq!(rec.strand(Strandedness::SecondStrand), Strand::Negative);
    }

    #[test]
    fn strand_from_library_protocol() {
        let mut rec = record(0, "10M100N10M");
        assert_eq!(rec.strand(Strandedness::Unstranded), Strand::Unknown);
        assert_eq!(rec.strand(Strandedness::Unknown), Strand::Unknown);

        // Single-end forward read
        assert_eq!(rec.strand(Strandedness::SecondStrand), Strand::Positive);
        assert_eq!(rec.strand(Strandedness::FirstStrand), Strand::Negative);

        // Single-end reverse read
        rec.flags = Flags::REVERSE_COMPLEMENTED;
        assert_eq!(rec.strand(Strandedness::SecondStrand), Strand::Negative);
        assert_eq!(rec.strand(Strandedness::FirstStrand), Strand::Positive);

        // Second mate of a pair, forward
        rec.flags = Flags::SEGMENTED | Flags::LAST_SEGMENT;
        assert_eq!(rec.strand(Strandedness::FirstStrand), Strand::Positive);
        assert_eq!(rec.strand(Strandedness::SecondStrand), Strand::Negative);

        // First mate of a pair, reverse
        rec.flags = Flags::SEGMENTED | Flags::FIRST_SEGMENT | Flags::REVERSE_COMPLEMENTED;
        assert_eq!(rec.strand(Strandedness::FirstStrand), Strand::Positive);
    }

    #[test]
    fn evidence_flags() {
        let mut rec = record(0, "10M100N10M");
        assert!(rec.is_primary_evidence());
        rec.flags = Flags::SECONDARY;
        assert!(!rec.is_primary_evidence());
        rec.flags = Flags::DUPLICATE;
        assert!(!rec.is_primary_evidence());
        rec.flags = Flags::UNMAPPED;
        assert!(!rec.is_primary_evidence());
        rec.flags = Flags::empty();
        rec.reference_sequence_id = None;
        assert!(!rec.is_primary_evidence());
    }
}
