pub mod alignment;
pub mod bam;
