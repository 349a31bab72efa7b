use std::path::PathBuf;

use clap::Parser;

use crate::error::Error;
use crate::junction::MotifTable;

/// Largest accepted `--chunkSize`
pub const MAX_CHUNK_SIZE: usize = 1_000_000;

/// Largest number of records buffered at once (`--runThreadN` x `--chunkSize`)
pub const MAX_BATCH_RECORDS: usize = 16_000_000;

/// Largest accepted `--coverageFlank`
pub const MAX_COVERAGE_FLANK: u64 = 100_000;

// ---------------------------------------------------------------------------
// Run mode enum
// ---------------------------------------------------------------------------

/// `--runMode` values: one pipeline stage, or all of them in sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Aggregate junctions from a BAM file
    Junc,
    /// Classify a junction table
    Filter,
    /// Project a BAM file onto the passing junctions
    BamFilt,
    /// junc, then filter, then (with --bamFilter) bamfilt
    Full,
}

impl std::str::FromStr for RunMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "junc" => Ok(Self::Junc),
            "filter" => Ok(Self::Filter),
            "bamfilt" => Ok(Self::BamFilt),
            "full" => Ok(Self::Full),
            _ => Err(format!(
                "unknown runMode '{s}'; expected 'junc', 'filter', 'bamfilt' or 'full'"
            )),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Junc => write!(f, "junc"),
            Self::Filter => write!(f, "filter"),
            Self::BamFilt => write!(f, "bamfilt"),
            Self::Full => write!(f, "full"),
        }
    }
}

// ---------------------------------------------------------------------------
// Library strandedness
// ---------------------------------------------------------------------------

/// Library protocol used to infer a read's transcript strand when the
/// alignment carries no `XS` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strandedness {
    #[default]
    Unknown,
    Unstranded,
    /// dUTP-style: first segment is antisense to the transcript
    FirstStrand,
    /// Ligation-style: first segment is sense to the transcript
    SecondStrand,
}

impl std::str::FromStr for Strandedness {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "unstranded" => Ok(Self::Unstranded),
            "firststrand" => Ok(Self::FirstStrand),
            "secondstrand" => Ok(Self::SecondStrand),
            _ => Err(format!("unknown strandSpecific value: '{s}'")),
        }
    }
}

impl std::fmt::Display for Strandedness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Unstranded => write!(f, "unstranded"),
            Self::FirstStrand => write!(f, "firststrand"),
            Self::SecondStrand => write!(f, "secondstrand"),
        }
    }
}

// ---------------------------------------------------------------------------
// Projection policy
// ---------------------------------------------------------------------------

/// Which spliced alignments survive BAM filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionPolicy {
    /// Every junction the alignment implies must pass
    #[default]
    All,
    /// At least one implied junction must pass
    Any,
}

impl std::str::FromStr for ProjectionPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "any" => Ok(Self::Any),
            _ => Err(format!("unknown bamFilterPolicy value: '{s}'")),
        }
    }
}

impl std::fmt::Display for ProjectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Any => write!(f, "any"),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters struct
// ---------------------------------------------------------------------------

/// portcullis command-line parameters (`--camelCase` argument names).
///
/// Built once in `main` and handed to every stage.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "portcullis",
    about = "Identify genuine splice junctions from spliced RNA-seq alignments",
    version
)]
pub struct Parameters {
    // ── Run ─────────────────────────────────────────────────────────────
    /// Run mode: junc, filter, bamfilt or full
    #[arg(long = "runMode", default_value = "full")]
    pub run_mode: RunMode,

    /// Number of threads
    #[arg(long = "runThreadN", default_value_t = 1)]
    pub run_thread_n: usize,

    /// Re-run stages whose output already exists (full mode)
    #[arg(long = "force")]
    pub force: bool,

    // ── Inputs ──────────────────────────────────────────────────────────
    /// FASTA file(s) with the genome reference sequences (.gz accepted)
    #[arg(long = "genomeFastaFile", num_args = 1..)]
    pub genome_fasta_files: Vec<PathBuf>,

    /// Coordinate-sorted BAM file of spliced alignments
    #[arg(long = "bamFile")]
    pub bam_file: Option<PathBuf>,

    /// Junction table to filter (filter mode) or whose junctions pass
    /// (bamfilt mode); defaults to the previous stage's output
    #[arg(long = "junctionFile")]
    pub junction_file: Option<PathBuf>,

    /// JSON filter rule set; the built-in rules are used when absent
    #[arg(long = "filterFile")]
    pub filter_file: Option<PathBuf>,

    // ── Output ──────────────────────────────────────────────────────────
    /// Output directory
    #[arg(long = "outDir", default_value = "./portcullis_out")]
    pub out_dir: PathBuf,

    /// File name prefix for all outputs
    #[arg(long = "outPrefix", default_value = "portcullis")]
    pub out_prefix: String,

    /// Name prefix for junctions in the BED output
    #[arg(long = "source", default_value = "portcullis")]
    pub source: String,

    // ── Junction analysis ───────────────────────────────────────────────
    /// Library strandedness: unknown, unstranded, firststrand or secondstrand
    #[arg(long = "strandSpecific", default_value = "unknown")]
    pub strand_specific: Strandedness,

    /// Alignments per aggregation partition
    #[arg(long = "chunkSize", default_value_t = 10_000)]
    pub chunk_size: usize,

    /// Flank width (bases) either side of the intron for the coverage score
    #[arg(long = "coverageFlank", default_value_t = 10)]
    pub coverage_flank: u64,

    /// Extra DONOR/ACCEPTOR pairs scored as semi-canonical, e.g. GC/AG
    #[arg(long = "semiCanonicalMotifs", num_args = 1..)]
    pub semi_canonical_motifs: Vec<String>,

    // ── BAM filtering ───────────────────────────────────────────────────
    /// Also write a filtered BAM in full mode
    #[arg(long = "bamFilter")]
    pub bam_filter: bool,

    /// Spliced alignment retention: all or any implied junction must pass
    #[arg(long = "bamFilterPolicy", default_value = "all")]
    pub bam_filter_policy: ProjectionPolicy,
}

impl Parameters {
    /// Motif table with any configured semi-canonical pairs.
    pub fn motif_table(&self) -> Result<MotifTable, Error> {
        MotifTable::with_semi_canonical(&self.semi_canonical_motifs)
    }

    /// `<outDir>/2-junc`
    pub fn junc_dir(&self) -> PathBuf {
        self.out_dir.join("2-junc")
    }

    /// `<outDir>/3-filt`
    pub fn filt_dir(&self) -> PathBuf {
        self.out_dir.join("3-filt")
    }

    pub fn junction_table_path(&self) -> PathBuf {
        self.junc_dir()
            .join(format!("{}.junctions.tab", self.out_prefix))
    }

    pub fn junction_bed_path(&self) -> PathBuf {
        self.junc_dir()
            .join(format!("{}.junctions.bed", self.out_prefix))
    }

    pub fn pass_table_path(&self) -> PathBuf {
        self.filt_dir()
            .join(format!("{}.pass.junctions.tab", self.out_prefix))
    }

    pub fn fail_table_path(&self) -> PathBuf {
        self.filt_dir()
            .join(format!("{}.fail.junctions.tab", self.out_prefix))
    }

    pub fn filtered_bam_path(&self) -> PathBuf {
        self.out_dir
            .join(format!("{}.filtered.bam", self.out_prefix))
    }

    /// Table the filter stage reads.
    pub fn filter_input(&self) -> PathBuf {
        match (&self.junction_file, self.run_mode) {
            (Some(path), RunMode::Filter) => path.clone(),
            _ => self.junction_table_path(),
        }
    }

    /// Table of passing junctions the bamfilt stage reads.
    pub fn bamfilt_input(&self) -> PathBuf {
        match (&self.junction_file, self.run_mode) {
            (Some(path), RunMode::BamFilt) => path.clone(),
            _ => self.pass_table_path(),
        }
    }

    /// Validate parameters.
    pub fn validate(&self) -> Result<(), Error> {
        let needs_aggregation = matches!(self.run_mode, RunMode::Junc | RunMode::Full);

        if needs_aggregation && self.genome_fasta_files.is_empty() {
            return Err(Error::Parameter(format!(
                "--genomeFastaFile is required when --runMode {}",
                self.run_mode
            )));
        }

        let needs_bam = needs_aggregation || self.run_mode == RunMode::BamFilt;
        if needs_bam && self.bam_file.is_none() {
            return Err(Error::Parameter(format!(
                "--bamFile is required when --runMode {}",
                self.run_mode
            )));
        }

        if self.run_thread_n == 0 {
            return Err(Error::Parameter("--runThreadN must be >= 1".into()));
        }

        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::Parameter(format!(
                "--chunkSize must be between 1 and {MAX_CHUNK_SIZE}"
            )));
        }

        match self.run_thread_n.checked_mul(self.chunk_size) {
            Some(n) if n <= MAX_BATCH_RECORDS => {}
            _ => {
                return Err(Error::Parameter(format!(
                    "--runThreadN x --chunkSize must not exceed {MAX_BATCH_RECORDS} records"
                )));
            }
        }

        if self.coverage_flank > MAX_COVERAGE_FLANK {
            return Err(Error::Parameter(format!(
                "--coverageFlank must be <= {MAX_COVERAGE_FLANK}"
            )));
        }

        if self.out_prefix.is_empty() {
            return Err(Error::Parameter("--outPrefix must not be empty".into()));
        }

        self.motif_table()?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: parse a command line (without program name).
    fn parse(args: &[&str]) -> Parameters {
        let mut full = vec!["portcullis"];
        full.extend_from_slice(args);
        Parameters::parse_from(full)
    }

    #[test]
    fn defaults() {
        let p = parse(&[]);
        assert_eq!(p.run_mode, RunMode::Full);
        assert_eq!(p.run_thread_n, 1);
        assert!(!p.force);
        assert!(p.genome_fasta_files.is_empty());
        assert_eq!(p.bam_file, None);
        assert_eq!(p.junction_file, None);
        assert_eq!(p.filter_file, None);
        assert_eq!(p.out_dir, PathBuf::from("./portcullis_out"));
        assert_eq!(p.out_prefix, "portcullis");
        assert_eq!(p.source, "portcullis");
        assert_eq!(p.strand_specific, Strandedness::Unknown);
        assert_eq!(p.chunk_size, 10_000);
        assert_eq!(p.coverage_flank, 10);
        assert!(p.semi_canonical_motifs.is_empty());
        assert!(!p.bam_filter);
        assert_eq!(p.bam_filter_policy, ProjectionPolicy::All);
    }

    #[test]
    fn run_mode_round_trip() {
        for mode in ["junc", "filter", "bamfilt", "full"] {
            let parsed: RunMode = mode.parse().unwrap();
            assert_eq!(parsed.to_string(), mode);
        }
        assert!("alignReads".parse::<RunMode>().is_err());
    }

    #[test]
    fn strandedness_parsing() {
        let p = parse(&["--strandSpecific", "firststrand"]);
        assert_eq!(p.strand_specific, Strandedness::FirstStrand);
        assert_eq!(
            "secondstrand".parse::<Strandedness>().unwrap(),
            Strandedness::SecondStrand
        );
        assert!("reverse".parse::<Strandedness>().is_err());
    }

    #[test]
    fn invalid_run_mode_rejected() {
        let result = Parameters::try_parse_from(["portcullis", "--runMode", "bogus"]);
        assert!(result.is_err());
    }

    #[test]
    fn stage_paths() {
        let p = parse(&["--outDir", "/tmp/out", "--outPrefix", "sample"]);
        assert_eq!(p.junc_dir(), PathBuf::from("/tmp/out/2-junc"));
        assert_eq!(
            p.junction_table_path(),
            PathBuf::from("/tmp/out/2-junc/sample.junctions.tab")
        );
        assert_eq!(
            p.junction_bed_path(),
            PathBuf::from("/tmp/out/2-junc/sample.junctions.bed")
        );
        assert_eq!(
            p.pass_table_path(),
            PathBuf::from("/tmp/out/3-filt/sample.pass.junctions.tab")
        );
        assert_eq!(
            p.fail_table_path(),
            PathBuf::from("/tmp/out/3-filt/sample.fail.junctions.tab")
        );
        assert_eq!(
            p.filtered_bam_path(),
            PathBuf::from("/tmp/out/sample.filtered.bam")
        );
    }

    #[test]
    fn explicit_junction_file_only_applies_to_its_mode() {
        let p = parse(&["--runMode", "filter", "--junctionFile", "j.tab"]);
        assert_eq!(p.filter_input(), PathBuf::from("j.tab"));

        let p = parse(&["--runMode", "full", "--junctionFile", "j.tab"]);
        assert_eq!(p.filter_input(), p.junction_table_path());
        assert_eq!(p.bamfilt_input(), p.pass_table_path());

        let p = parse(&["--runMode", "bamfilt", "--junctionFile", "pass.tab"]);
        assert_eq!(p.bamfilt_input(), PathBuf::from("pass.tab"));
    }

    #[test]
    fn multi_value_args() {
        let p = parse(&[
            "--genomeFastaFile",
            "a.fa",
            "b.fa.gz",
            "--semiCanonicalMotifs",
            "GC/AG",
            "AT/AC",
        ]);
        assert_eq!(
            p.genome_fasta_files,
            vec![PathBuf::from("a.fa"), PathBuf::from("b.fa.gz")]
        );
        assert_eq!(p.semi_canonical_motifs, vec!["GC/AG", "AT/AC"]);
    }

    #[test]
    fn validate_junc_needs_genome_and_bam() {
        let p = parse(&["--runMode", "junc", "--bamFile", "in.bam"]);
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("genomeFastaFile"));

        let p = parse(&["--runMode", "junc", "--genomeFastaFile", "g.fa"]);
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("bamFile"));

        let p = parse(&[
            "--runMode",
            "junc",
            "--genomeFastaFile",
            "g.fa",
            "--bamFile",
            "in.bam",
        ]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn validate_filter_needs_nothing_extra() {
        let p = parse(&["--runMode", "filter"]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn validate_bamfilt_needs_bam() {
        let p = parse(&["--runMode", "bamfilt"]);
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("bamFile"));
    }

    #[test]
    fn validate_thread_and_chunk_counts() {
        let p = parse(&["--runMode", "filter", "--runThreadN", "0"]);
        assert!(p.validate().unwrap_err().to_string().contains("runThreadN"));

        let p = parse(&["--runMode", "filter", "--chunkSize", "0"]);
        assert!(p.validate().unwrap_err().to_string().contains("chunkSize"));
    }

    #[test]
    fn validate_upper_bounds() {
        let p = parse(&["--runMode", "filter", "--chunkSize", "18446744073709551615"]);
        assert!(p.validate().unwrap_err().to_string().contains("chunkSize"));

        let p = parse(&["--runMode", "filter", "--runThreadN", "64", "--chunkSize", "1000000"]);
        assert!(p.validate().unwrap_err().to_string().contains("runThreadN x --chunkSize"));

        let p = parse(&[
            "--runMode",
            "filter",
            "--runThreadN",
            "18446744073709551615",
            "--chunkSize",
            "2",
        ]);
        assert!(p.validate().is_err());

        let p = parse(&["--runMode", "filter", "--coverageFlank", "100000000000"]);
        assert!(p.validate().unwrap_err().to_string().contains("coverageFlank"));

        let p = parse(&["--runMode", "filter", "--runThreadN", "16", "--chunkSize", "1000000"]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn validate_semi_canonical_motifs() {
        let p = parse(&["--runMode", "filter", "--semiCanonicalMotifs", "GC/AG"]);
        assert!(p.validate().is_ok());

        let p = parse(&["--runMode", "filter", "--semiCanonicalMotifs", "GCAG"]);
        assert!(p.validate().is_err());
    }
}
