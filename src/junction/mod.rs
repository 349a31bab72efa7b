/// Splice junction model, evidence aggregation and metrics
///
/// This module handles:
/// - Intron identity and splice-site canonicality
/// - Per-junction evidence and derived metrics (entropy, coverage)
/// - Partition-local aggregation and the order-independent merge
/// - Junction table and BED output
mod builder;
mod index;
mod intron;
mod metrics;
mod model;
mod table;

pub use builder::JunctionBuilder;
pub use index::JunctionIndex;
pub use intron::{CanonicalSs, Intron, MotifTable, Strand, classify};
pub use metrics::{DepthProfile, DepthTrack, coverage, entropy};
pub use model::{FilterResult, Junction, JunctionMetrics};
pub use table::{read_junction_table, write_junction_bed, write_junction_table};
