use std::path::PathBuf;

/// Errors that can occur in portcullis.
///
/// `MalformedAlignment` is recoverable: aggregation and projection skip the
/// offending record and carry on. Every other variant aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    Parameter(String),

    #[error("I/O error: {source} ({path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("FASTA parsing error: {0}")]
    Fasta(String),

    #[error("invalid splice motif: donor '{donor}', acceptor '{acceptor}' (expected two bases each)")]
    InvalidMotif { donor: String, acceptor: String },

    #[error("unknown reference sequence id {0}")]
    UnknownReference(usize),

    #[error("genome window error: {0}")]
    Genome(String),

    #[error("malformed alignment: {0}")]
    MalformedAlignment(String),

    #[error(
        "conflicting strands for intron {seq_id}:{start}-{end} ({first} vs {second})"
    )]
    MergeConsistency {
        seq_id: usize,
        start: u64,
        end: u64,
        first: char,
        second: char,
    },

    #[error("filter configuration error: {0}")]
    Configuration(String),

    #[error("junction table error: {0}")]
    Table(String),

    #[error("BAM error: {0}")]
    Bam(String),
}

impl Error {
    /// Convenience for wrapping an `io::Error` with a path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }

    /// True for per-record problems that are skipped with a warning.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedAlignment(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            source: err,
            path: PathBuf::from("<unknown>"),
        }
    }
}
