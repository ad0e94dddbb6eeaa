use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use coagbin::markers::load_marker_records;
use coagbin::parser::TableParser;
use coagbin::writer::{save_snapshot, Snapshot};
use coagbin::{
    run_binning, AssemblyGraph, BinningConfig, CommandScanner, FeatureStore,
    MarkerGeneScanner, NameMap,
};

#[derive(Parser, Debug)]
#[command(name = "coagbin")]
#[command(version, about = "Bin metagenomic contigs using marker genes, composition, coverage and the assembly graph", long_about = None)]
struct Args {
    /// Contig table: label, length and coverage, tab separated
    #[arg(long)]
    contigs: PathBuf,

    /// Assembly graph as a tab separated edge list of contig labels
    #[arg(long)]
    graph: PathBuf,

    /// Composition table: label followed by raw tetranucleotide counts
    #[arg(long)]
    composition: PathBuf,

    /// Marker gene hit table (HMMER domtblout)
    #[arg(long)]
    markers: PathBuf,

    /// Command that writes the marker table when it doesn't exist yet.
    /// The table path is appended as the last argument
    #[arg(long)]
    scan_cmd: Option<String>,

    /// Output directory
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Prefix for the output file names
    #[arg(long, default_value = "")]
    prefix: String,

    /// Minimum contig length for the composition term
    #[arg(long)]
    min_length: Option<u64>,

    /// Maximum weight for joining an existing bin
    #[arg(long)]
    w_intra: Option<f64>,

    /// Minimum weight for starting a new bin
    #[arg(long)]
    w_inter: Option<f64>,

    /// Graph distance limit for matching
    #[arg(long)]
    d_limit: Option<usize>,

    /// Output delimiter: comma, tab, semicolon or space
    #[arg(long, value_parser = parse_delimiter)]
    delimiter: Option<u8>,

    /// Number of worker threads
    #[arg(short = 't', long)]
    nthreads: Option<usize>,

    /// Load parameters from a JSON file; command line options win
    #[cfg(feature = "serde1")]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log per-iteration detail
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn parse_delimiter(s: &str) -> std::result::Result<u8, String> {
    match s {
        "comma" | "," => Ok(b','),
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "semicolon" | ";" => Ok(b';'),
        "space" | " " => Ok(b' '),
        _ => Err(format!(
            "unknown delimiter `{}`, expected comma, tab, semicolon or space",
            s
        )),
    }
}

impl Args {
    fn binning_config(&self) -> Result<BinningConfig> {
        #[cfg(feature = "serde1")]
        let mut config = match &self.config {
            Some(path) => BinningConfig::load_json(path).with_context(|| {
                format!("Failed to load config {}", path.display())
            })?,
            None => BinningConfig::default(),
        };
        #[cfg(not(feature = "serde1"))]
        let mut config = BinningConfig::default();

        if let Some(x) = self.min_length {
            config.min_length = x;
        }
        if let Some(x) = self.w_intra {
            config.w_intra = x;
        }
        if let Some(x) = self.w_inter {
            config.w_inter = x;
        }
        if let Some(x) = self.d_limit {
            config.d_limit = x;
        }
        if let Some(x) = self.delimiter {
            config.delimiter = x;
        }
        if let Some(x) = self.nthreads {
            config.nthreads = x;
        }
        Ok(config)
    }
}

fn init_logging(log_path: &Path, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let log_file = File::create(log_path).with_context(|| {
        format!("Failed to create log file {}", log_path.display())
    })?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();
    Ok(())
}

fn load_features(parser: &TableParser, args: &Args) -> Result<FeatureStore> {
    let contigs = parser
        .parse_file(&args.contigs, |p, r| p.read_contigs(r))
        .with_context(|| {
            format!("Failed to read contig table {}", args.contigs.display())
        })?;

    let mut names = NameMap::new();
    for contig in contigs.iter() {
        names.insert(&contig.label);
    }

    let profiles = parser
        .parse_file(&args.composition, |p, r| p.read_composition(r, &names))
        .with_context(|| {
            format!(
                "Failed to read composition table {}",
                args.composition.display()
            )
        })?;

    Ok(FeatureStore::new(contigs, profiles)?)
}

fn run(args: Args) -> Result<()> {
    let config = args.binning_config()?;
    let parser = TableParser::new();

    let features = load_features(&parser, &args)?;
    info!(
        "Loaded {} contigs with {}-dimensional composition",
        features.len(),
        features.dimension()
    );

    let edges = parser
        .parse_file(&args.graph, |p, r| p.read_edges(r, features.names()))
        .with_context(|| {
            format!("Failed to read assembly graph {}", args.graph.display())
        })?;
    let graph = AssemblyGraph::from_edges(features.len(), edges);
    info!(
        "Assembly graph has {} edges, {} isolated contigs",
        graph.edge_count(),
        graph.isolated_count()
    );

    let scanner = args.scan_cmd.as_ref().and_then(|cmd| {
        let mut words = cmd.split_whitespace();
        let program = words.next()?;
        Some(words.fold(CommandScanner::new(program), |s, w| s.arg(w)))
    });
    let markers = load_marker_records(
        scanner.as_ref().map(|s| s as &dyn MarkerGeneScanner),
        &args.markers,
        features.names(),
        config.marker_length_fraction,
    )
    .with_context(|| {
        format!("Failed to load marker genes from {}", args.markers.display())
    })?;

    let outcome = run_binning(&features, &graph, &markers, &config)?;

    for (snapshot, state) in [
        (Snapshot::Seed, &outcome.seed),
        (Snapshot::Intermediate, &outcome.intermediate),
        (Snapshot::Final, &outcome.bins),
    ]
    .iter()
    {
        let path = save_snapshot(
            &args.output,
            &args.prefix,
            *snapshot,
            state,
            &features,
            config.delimiter,
        )
        .context("Failed to write bins")?;
        info!("Wrote {}", path.display());
    }

    let report = &outcome.report;
    info!("Number of bins: {}", report.n_bins);
    info!(
        "Binned {} of {} contigs in {:.2?}",
        report.n_binned,
        features.len(),
        report.elapsed
    );
    Ok(())
}

fn main() {
    let args = Args::parse();

    let setup = fs::create_dir_all(&args.output)
        .with_context(|| {
            format!("Failed to create output directory {}", args.output.display())
        })
        .and_then(|_| {
            let log_path =
                args.output.join(format!("{}binning.log", args.prefix));
            init_logging(&log_path, args.verbose)
        });
    if let Err(err) = setup {
        eprintln!("Error: {:?}", err);
        std::process::exit(1);
    }

    if let Err(err) = run(args) {
        error!("{:?}", err);
        std::process::exit(1);
    }
}
