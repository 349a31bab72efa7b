/// Aggregation statistics tracking and reporting
use log::{info, warn};

/// How many malformed-record messages are kept for the summary
const MAX_KEPT_WARNINGS: usize = 10;

/// Tracks what happened to each record during junction aggregation
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct AggregationStats {
    /// Total number of records read from the alignment stream
    pub total_records: u64,
    /// Records ignored because of their flags (unmapped, secondary, ...)
    pub ignored_by_flags: u64,
    /// Records with at least one splice event
    pub spliced: u64,
    /// Total splice events across all records
    pub splice_events: u64,
    /// Records skipped because their gap structure could not be decoded
    pub malformed: u64,
    /// First few malformed-record messages, for the summary
    pub malformed_examples: Vec<String>,
}

impl AggregationStats {
    /// Create new statistics tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a record that contributed `n_events` splice events
    pub fn record_evidence(&mut self, n_events: usize) {
        self.total_records += 1;
        if n_events > 0 {
            self.spliced += 1;
            self.splice_events += n_events as u64;
        }
    }

    /// Record a record that was not eligible as evidence
    pub fn record_ignored(&mut self) {
        self.total_records += 1;
        self.ignored_by_flags += 1;
    }

    /// Record a skipped malformed record
    pub fn record_malformed(&mut self, message: String) {
        self.total_records += 1;
        self.malformed += 1;
        if self.malformed_examples.len() < MAX_KEPT_WARNINGS {
            self.malformed_examples.push(message);
        }
    }

    /// Combine counts from another partition
    pub fn merge(mut self, other: AggregationStats) -> Self {
        self.total_records += other.total_records;
        self.ignored_by_flags += other.ignored_by_flags;
        self.spliced += other.spliced;
        self.splice_events += other.splice_events;
        self.malformed += other.malformed;
        for message in other.malformed_examples {
            if self.malformed_examples.len() >= MAX_KEPT_WARNINGS {
                break;
            }
            self.malformed_examples.push(message);
        }
        self
    }

    /// Percentage of records that were spliced
    pub fn spliced_percent(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            100.0 * self.spliced as f64 / self.total_records as f64
        }
    }

    /// Print summary statistics to log
    pub fn print_summary(&self, n_junctions: usize) {
        if self.total_records == 0 {
            info!("No alignments processed");
            return;
        }

        info!("=== Junction Aggregation Summary ===");
        info!("Number of input alignments: {}", self.total_records);
        info!(
            "Spliced alignments: {} ({:.2}%)",
            self.spliced,
            self.spliced_percent()
        );
        info!("Splice events: {}", self.splice_events);
        info!("Ignored by flags: {}", self.ignored_by_flags);
        if self.malformed > 0 {
            warn!("Skipped malformed alignments: {}", self.malformed);
            for message in &self.malformed_examples {
                warn!("  {}", message);
            }
        }
        info!("Distinct junctions: {}", n_junctions);
    }
}
