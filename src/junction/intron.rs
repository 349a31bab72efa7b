/// Intron coordinates, strand and splice-site canonicality
use crate::error::Error;
use std::fmt;

/// Transcript strand of an intron.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strand {
    Positive,
    Negative,
    Unknown,
}

impl Strand {
    /// Single-character form used in junction tables (`+`, `-`, `?`).
    pub fn as_char(&self) -> char {
        match self {
            Strand::Positive => '+',
            Strand::Negative => '-',
            Strand::Unknown => '?',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Strand::Positive),
            '-' => Some(Strand::Negative),
            '?' | '.' => Some(Strand::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A candidate spliced-out region.
///
/// Coordinates are 0-based and inclusive on both ends. Identity is the exact
/// `(seq_id, start, end, strand)` tuple; fields are private so an intron
/// cannot change once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Intron {
    seq_id: usize,
    start: u64,
    end: u64,
    strand: Strand,
}

impl Intron {
    /// Build an intron, rejecting empty or inverted intervals.
    pub fn new(seq_id: usize, start: u64, end: u64, strand: Strand) -> Result<Self, Error> {
        if end <= start {
            return Err(Error::MalformedAlignment(format!(
                "intron end {end} must be greater than start {start}"
            )));
        }
        Ok(Self {
            seq_id,
            start,
            end,
            strand,
        })
    }

    pub fn seq_id(&self) -> usize {
        self.seq_id
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn strand(&self) -> Strand {
        self.strand
    }

    /// Intron length in bases. Independent of strand.
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Coordinates without the strand, used to detect strand conflicts.
    pub fn locus(&self) -> (usize, u64, u64) {
        (self.seq_id, self.start, self.end)
    }
}

impl fmt::Display for Intron {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}({})",
            self.seq_id, self.start, self.end, self.strand
        )
    }
}

/// Splice-site canonicality of a donor/acceptor pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalSs {
    Canonical,
    SemiCanonical,
    NotCanonical,
}

impl CanonicalSs {
    /// Numeric form consumed by filter rules.
    pub fn score(&self) -> f64 {
        match self {
            CanonicalSs::Canonical => 1.0,
            CanonicalSs::SemiCanonical => 0.5,
            CanonicalSs::NotCanonical => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalSs::Canonical => "C",
            CanonicalSs::SemiCanonical => "S",
            CanonicalSs::NotCanonical => "N",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "C" => Some(CanonicalSs::Canonical),
            "S" => Some(CanonicalSs::SemiCanonical),
            "N" => Some(CanonicalSs::NotCanonical),
            _ => None,
        }
    }
}

/// Donor/acceptor pair as read from the forward genome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MotifPair {
    donor: [u8; 2],
    acceptor: [u8; 2],
    strand: Strand,
}

/// Table of recognised splice-site motifs.
///
/// Motifs are always expressed on the forward genome, so the negative-strand
/// form of `GT..AG` is `CT..AC`. The default table holds only the canonical
/// pairs; a semi-canonical tier is opt-in.
#[derive(Debug, Clone)]
pub struct MotifTable {
    canonical: Vec<MotifPair>,
    semi_canonical: Vec<MotifPair>,
}

impl Default for MotifTable {
    fn default() -> Self {
        Self {
            canonical: pair_with_reverse(*b"GT", *b"AG"),
            semi_canonical: Vec::new(),
        }
    }
}

impl MotifTable {
    /// Default table plus semi-canonical pairs written as `DONOR/ACCEPTOR` in
    /// positive-strand notation (e.g. `GC/AG`, `AT/AC`).
    pub fn with_semi_canonical<S: AsRef<str>>(pairs: &[S]) -> Result<Self, Error> {
        let mut table = Self::default();
        for pair in pairs {
            let pair = pair.as_ref();
            let (donor, acceptor) = pair.split_once('/').ok_or_else(|| {
                Error::Parameter(format!("semi-canonical motif '{pair}' is not DONOR/ACCEPTOR"))
            })?;
            let (donor, acceptor) = two_base_pair(donor, acceptor).ok_or_else(|| {
                Error::Parameter(format!(
                    "semi-canonical motif '{pair}' needs a two-base donor and acceptor"
                ))
            })?;
            if !donor.iter().chain(acceptor.iter()).all(|b| b"ACGT".contains(b)) {
                return Err(Error::Parameter(format!(
                    "semi-canonical motif '{pair}' contains non-ACGT bases"
                )));
            }
            table
                .semi_canonical
                .extend(pair_with_reverse(donor, acceptor));
        }
        Ok(table)
    }

    /// Classify a donor/acceptor pair for an intron on `strand`.
    ///
    /// Both motifs must be exactly two characters; anything else fails with
    /// `InvalidMotif` before any lookup happens. Unknown-strand introns match
    /// a pair from either strand.
    pub fn classify(&self, strand: Strand, donor: &str, acceptor: &str) -> Result<CanonicalSs, Error> {
        let (d, a) = two_base_pair(donor, acceptor).ok_or_else(|| Error::InvalidMotif {
            donor: donor.to_string(),
            acceptor: acceptor.to_string(),
        })?;

        let matches = |pairs: &[MotifPair]| {
            pairs.iter().any(|p| {
                p.donor == d
                    && p.acceptor == a
                    && (strand == Strand::Unknown || p.strand == strand)
            })
        };

        if matches(&self.canonical) {
            Ok(CanonicalSs::Canonical)
        } else if matches(&self.semi_canonical) {
            Ok(CanonicalSs::SemiCanonical)
        } else {
            Ok(CanonicalSs::NotCanonical)
        }
    }
}

/// Classify against the default (canonical-only) motif table.
pub fn classify(strand: Strand, donor: &str, acceptor: &str) -> Result<CanonicalSs, Error> {
    MotifTable::default().classify(strand, donor, acceptor)
}

fn two_base_pair(donor: &str, acceptor: &str) -> Option<([u8; 2], [u8; 2])> {
    match (donor.as_bytes(), acceptor.as_bytes()) {
        ([d0, d1], [a0, a1]) => Some((
            [d0.to_ascii_uppercase(), d1.to_ascii_uppercase()],
            [a0.to_ascii_uppercase(), a1.to_ascii_uppercase()],
        )),
        _ => None,
    }
}

fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        other => other,
    }
}

/// Positive-strand pair plus its forward-genome form on the negative strand.
fn pair_with_reverse(donor: [u8; 2], acceptor: [u8; 2]) -> Vec<MotifPair> {
    let rc = |m: [u8; 2]| [complement(m[1]), complement(m[0])];
    vec![
        MotifPair {
            donor,
            acceptor,
            strand: Strand::Positive,
        },
        MotifPair {
            donor: rc(acceptor),
            acceptor: rc(donor),
            strand: Strand::Negative,
        },
    ]
}
