use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::{error, fmt, io};

use bstr::{BStr, BString, ByteSlice};
use lazy_static::lazy_static;
use regex::bytes::Regex;
use tracing::{debug, info};

use crate::features::NameMap;
use crate::parser::{
    ParseError, ParseFieldError, ParseRow, TableFieldResult, TableParser,
    TableResult,
};

/// Single-copy marker genes found on each contig, as gene name to
/// hit count, indexed by contig id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerRecords {
    per_contig: Vec<BTreeMap<BString, usize>>,
}

impl MarkerRecords {
    pub fn new(n_contigs: usize) -> Self {
        MarkerRecords {
            per_contig: vec![BTreeMap::new(); n_contigs],
        }
    }

    /// Record one hit of `gene` on `contig`. Panics if the contig id
    /// is out of range.
    pub fn add_hit<G: AsRef<[u8]>>(&mut self, contig: usize, gene: G) {
        *self.per_contig[contig]
            .entry(BString::from(gene.as_ref()))
            .or_insert(0) += 1;
    }

    pub fn n_contigs(&self) -> usize {
        self.per_contig.len()
    }

    pub fn genes(&self, contig: usize) -> &BTreeMap<BString, usize> {
        &self.per_contig[contig]
    }

    /// Number of contigs that carry at least one marker gene.
    pub fn n_marker_contigs(&self) -> usize {
        self.per_contig.iter().filter(|g| !g.is_empty()).count()
    }

    /// For each gene, the number of contigs carrying it.
    pub fn gene_frequencies(&self) -> BTreeMap<&'_ BStr, usize> {
        let mut freqs = BTreeMap::new();
        for genes in self.per_contig.iter() {
            for gene in genes.keys() {
                *freqs.entry(gene.as_bstr()).or_insert(0) += 1;
            }
        }
        freqs
    }

    /// Ids of the contigs carrying `gene`, ascending.
    pub fn contigs_with(&self, gene: &[u8]) -> Vec<usize> {
        self.per_contig
            .iter()
            .enumerate()
            .filter(|(_, genes)| genes.contains_key(gene.as_bstr()))
            .map(|(c, _)| c)
            .collect()
    }
}

/// Contigs carrying the seed marker genes of one frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedGroup {
    pub frequency: usize,
    pub genes: Vec<BString>,
    pub contigs: Vec<usize>,
}

/// Group the contigs carrying seed marker genes by gene frequency.
///
/// A gene is a seed gene when it occurs on at least `seed_fraction`
/// of the contigs that carry any marker gene. Each distinct seed
/// frequency gives one group, and groups come in order of descending
/// frequency. Within a group, contigs are listed gene by gene in
/// lexicographic gene order, then by contig id, each contig once.
pub fn select_seed_groups(
    records: &MarkerRecords,
    seed_fraction: f64,
) -> Vec<SeedGroup> {
    let threshold = seed_fraction * records.n_marker_contigs() as f64;

    let mut by_frequency: BTreeMap<usize, Vec<&BStr>> = BTreeMap::new();
    for (gene, freq) in records.gene_frequencies() {
        if freq as f64 >= threshold {
            by_frequency.entry(freq).or_default().push(gene);
        }
    }

    by_frequency
        .into_iter()
        .rev()
        .map(|(frequency, genes)| {
            let mut seen = BTreeSet::new();
            let mut contigs = Vec::new();
            for gene in genes.iter() {
                for contig in records.contigs_with(gene) {
                    if seen.insert(contig) {
                        contigs.push(contig);
                    }
                }
            }
            SeedGroup {
                frequency,
                genes: genes.into_iter().map(BString::from).collect(),
                contigs,
            }
        })
        .collect()
}

/// One row of an HMM domain hit table.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerHit {
    pub orf: BString,
    pub gene: BString,
    pub model_length: u64,
    pub hmm_from: u64,
    pub hmm_to: u64,
}

impl MarkerHit {
    /// Label of the contig the ORF was predicted on. Gene callers name
    /// ORFs `<contig>_<start>_<end>_<strand>`; names without that
    /// suffix are returned whole.
    pub fn contig_label(&self) -> &[u8] {
        lazy_static! {
            static ref RE: Regex =
                Regex::new(r"(?-u)^(.+)_[0-9]+_[0-9]+_[+-]$").unwrap();
        }
        RE.captures(&self.orf)
            .and_then(|c| c.get(1))
            .map(|m| m.as_bytes())
            .unwrap_or(self.orf.as_slice())
    }

    /// Whether the hit covers more than `fraction` of the model.
    pub fn covers(&self, fraction: f64) -> bool {
        let mapped = self.hmm_to.saturating_sub(self.hmm_from) as f64;
        mapped > self.model_length as f64 * fraction
    }
}

impl ParseRow for MarkerHit {
    fn parse_row(fields: &[&[u8]]) -> TableFieldResult<Self> {
        if fields.len() < 17 {
            return Err(ParseFieldError::MissingFields);
        }
        let parse_u64 = |input: &[u8]| -> TableFieldResult<u64> {
            Ok(input.to_str()?.parse::<u64>()?)
        };
        Ok(MarkerHit {
            orf: BString::from(fields[0]),
            gene: BString::from(fields[3]),
            model_length: parse_u64(fields[5])?,
            hmm_from: parse_u64(fields[15])?,
            hmm_to: parse_u64(fields[16])?,
        })
    }
}

impl TableParser {
    /// Read a whitespace separated HMM domain hit table into marker
    /// records. Hits shorter than `length_fraction` of their model
    /// are dropped, as are hits on contigs missing from `names`.
    pub fn read_marker_hits<R: BufRead>(
        &self,
        reader: R,
        names: &NameMap,
        length_fraction: f64,
    ) -> TableResult<MarkerRecords> {
        let mut records = MarkerRecords::new(names.len());
        let mut kept = 0usize;
        self.for_each_line(reader, |line| {
            let fields: Vec<&[u8]> = line.fields().collect();
            let hit = MarkerHit::parse_row(&fields)?;
            if !hit.covers(length_fraction) {
                return Ok(());
            }
            match names.map_name(hit.contig_label()) {
                Some(contig) => {
                    records.add_hit(contig, &hit.gene);
                    kept += 1;
                }
                None => debug!(
                    "Skipping marker hit on unknown contig {}",
                    hit.contig_label().as_bstr()
                ),
            }
            Ok(())
        })?;
        debug!("Kept {} marker gene hits", kept);
        Ok(records)
    }
}

#[derive(Debug)]
pub enum ScanError {
    IOError(io::Error),
    /// The scanner ran but exited unsuccessfully.
    Failed { program: String, status: Option<i32> },
    /// No marker table was produced at the expected path.
    MissingOutput(PathBuf),
    /// The marker table exists but couldn't be read.
    Table(ParseError),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ScanError as SE;
        match self {
            SE::IOError(err) => write!(f, "IO error: {}", err),
            SE::Failed { program, status } => match status {
                Some(code) => {
                    write!(f, "`{}` exited with status {}", program, code)
                }
                None => write!(f, "`{}` was terminated by a signal", program),
            },
            SE::MissingOutput(path) => {
                write!(f, "No marker gene table at {}", path.display())
            }
            SE::Table(err) => write!(f, "Bad marker gene table: {}", err),
        }
    }
}

impl error::Error for ScanError {}

impl From<io::Error> for ScanError {
    fn from(err: io::Error) -> Self {
        Self::IOError(err)
    }
}

impl From<ParseError> for ScanError {
    fn from(err: ParseError) -> Self {
        Self::Table(err)
    }
}

/// Something that can produce a marker gene hit table. The table is
/// written to the given path.
pub trait MarkerGeneScanner {
    fn scan(&self, output: &Path) -> Result<(), ScanError>;
}

/// Runs an external program to produce the hit table. The output path
/// is passed as the last argument.
#[derive(Debug, Clone)]
pub struct CommandScanner {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl CommandScanner {
    pub fn new<S: Into<OsString>>(program: S) -> Self {
        CommandScanner {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<OsString>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl MarkerGeneScanner for CommandScanner {
    fn scan(&self, output: &Path) -> Result<(), ScanError> {
        info!("Running {:?} to scan for marker genes", self.program);
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(output)
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(ScanError::Failed {
                program: self.program.to_string_lossy().into_owned(),
                status: status.code(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// The table already existed; the scanner wasn't run.
    Cached,
    Scanned,
}

/// Make sure a marker hit table exists at `path`, running the scanner
/// only if it doesn't.
pub fn ensure_marker_table(
    scanner: Option<&dyn MarkerGeneScanner>,
    path: &Path,
) -> Result<ScanStatus, ScanError> {
    if path.exists() {
        info!("Marker gene table {} already exists", path.display());
        return Ok(ScanStatus::Cached);
    }
    match scanner {
        Some(scanner) => {
            scanner.scan(path)?;
            if path.exists() {
                Ok(ScanStatus::Scanned)
            } else {
                Err(ScanError::MissingOutput(path.to_path_buf()))
            }
        }
        None => Err(ScanError::MissingOutput(path.to_path_buf())),
    }
}

/// Scan for marker genes unless a cached table exists, then read the
/// table.
pub fn load_marker_records(
    scanner: Option<&dyn MarkerGeneScanner>,
    path: &Path,
    names: &NameMap,
    length_fraction: f64,
) -> Result<MarkerRecords, ScanError> {
    ensure_marker_table(scanner, path)?;
    let records = TableParser::new().parse_file(path, |p, r| {
        p.read_marker_hits(r, names, length_fraction)
    })?;
    Ok(records)
}
