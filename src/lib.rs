//! Binning of metagenomic contigs using marker genes, tetranucleotide
//! composition, coverage and assembly graph connectivity.

pub mod binning;
pub mod config;
pub mod features;
pub mod graph;
pub mod markers;
pub mod parser;
pub mod pipeline;
pub mod scoring;
pub mod writer;

pub use self::binning::{BinningError, BinningResult, BinningState};
pub use self::config::BinningConfig;
pub use self::features::{Contig, FeatureStore, NameMap};
pub use self::graph::AssemblyGraph;
pub use self::markers::{
    CommandScanner, MarkerGeneScanner, MarkerRecords, ScanError,
};
pub use self::pipeline::{run_binning, BinningOutcome, BinningReport};
