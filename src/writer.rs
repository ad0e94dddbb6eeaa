use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bstr::{BString, ByteSlice};
use fnv::FnvHashSet;

use crate::binning::BinningState;
use crate::features::FeatureStore;
use crate::parser::{ParseError, ParseFieldError, TableResult};

/// The phase a bin snapshot was taken after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    Seed,
    Intermediate,
    Final,
}

impl Snapshot {
    pub fn file_name(&self, prefix: &str) -> String {
        let stem = match self {
            Snapshot::Seed => "seed_bins",
            Snapshot::Intermediate => "intermediate_bins",
            Snapshot::Final => "bins",
        };
        format!("{}{}.csv", prefix, stem)
    }
}

fn needs_quotes(label: &[u8], delimiter: u8) -> bool {
    label
        .iter()
        .any(|&b| b == delimiter || b == b'"' || b == b'\n' || b == b'\r')
}

// Write one label, quoted if it holds the delimiter, a quote or a
// line break
pub fn write_label<T: Write>(
    label: &[u8],
    delimiter: u8,
    stream: &mut T,
) -> io::Result<()> {
    if needs_quotes(label, delimiter) {
        stream.write_all(b"\"")?;
        stream.write_all(&label.replace(b"\"", b"\"\""))?;
        stream.write_all(b"\"")
    } else {
        stream.write_all(label)
    }
}

// Write bins, one `label<delim>bin` row per binned contig with bins
// numbered from 1
pub fn write_bins<T: Write>(
    state: &BinningState,
    features: &FeatureStore,
    delimiter: u8,
    stream: &mut T,
) -> io::Result<()> {
    for (contig, bin) in state.assignments() {
        write_label(features.label(contig), delimiter, stream)?;
        stream.write_all(&[delimiter])?;
        writeln!(stream, "{}", bin + 1)?;
    }
    Ok(())
}

pub fn bins_string(
    state: &BinningState,
    features: &FeatureStore,
    delimiter: u8,
) -> String {
    let mut result = Vec::new();
    // Writing to a Vec can't fail.
    let _ = write_bins(state, features, delimiter, &mut result);
    result.to_str_lossy().into_owned()
}

/// Write a snapshot file into `dir` and return its path.
pub fn save_snapshot(
    dir: &Path,
    prefix: &str,
    snapshot: Snapshot,
    state: &BinningState,
    features: &FeatureStore,
    delimiter: u8,
) -> io::Result<PathBuf> {
    let path = dir.join(snapshot.file_name(prefix));
    let mut writer = BufWriter::new(File::create(&path)?);
    write_bins(state, features, delimiter, &mut writer)?;
    writer.flush()?;
    Ok(path)
}

fn parse_bin(field: &[u8]) -> Result<usize, ParseFieldError> {
    let bin = field.to_str()?.trim().parse::<i64>()?;
    if bin <= 0 {
        Err(ParseFieldError::OutOfRange("bin"))
    } else {
        Ok(bin as usize)
    }
}

// Split `input` into records of fields, honouring quoted fields that
// may hold the delimiter, doubled quotes and line breaks. Each record
// comes with the line it started on.
fn split_records(input: &[u8], delimiter: u8) -> Vec<(usize, Vec<Vec<u8>>)> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = Vec::new();
    let mut quoted = false;
    let mut line = 1;
    let mut record_line = 1;

    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if quoted {
            if b == b'"' {
                if input.get(i + 1) == Some(&b'"') {
                    field.push(b'"');
                    i += 1;
                } else {
                    quoted = false;
                }
            } else {
                if b == b'\n' {
                    line += 1;
                }
                field.push(b);
            }
        } else if b == b'"' && field.is_empty() {
            quoted = true;
        } else if b == delimiter {
            fields.push(std::mem::take(&mut field));
        } else if b == b'\n' {
            fields.push(std::mem::take(&mut field));
            records.push((record_line, std::mem::take(&mut fields)));
            line += 1;
            record_line = line;
        } else if b != b'\r' {
            field.push(b);
        }
        i += 1;
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push((record_line, fields));
    }
    records
}

/// Parse a snapshot back into `(label, bin)` rows with 1-indexed
/// bins. Blank rows are skipped; a repeated label or a bin number
/// below 1 is an error.
pub fn parse_bins(
    input: &[u8],
    delimiter: u8,
) -> TableResult<Vec<(BString, usize)>> {
    let mut seen = FnvHashSet::default();
    let mut rows = Vec::new();
    for (line_no, fields) in split_records(input, delimiter) {
        if fields.len() == 1 && fields[0].trim().is_empty() {
            continue;
        }
        let line = || fields.join(&[delimiter][..]);
        if fields.len() != 2 {
            return Err(ParseError::invalid_line(
                ParseFieldError::MissingFields,
                line_no,
                &line(),
            ));
        }
        let bin = parse_bin(&fields[1])
            .map_err(|e| ParseError::invalid_line(e, line_no, &line()))?;
        let label = BString::from(fields[0].as_slice());
        if !seen.insert(label.clone()) {
            return Err(ParseError::DuplicateLabel(label.to_string()));
        }
        rows.push((label, bin));
    }
    Ok(rows)
}

pub fn read_bins<R: Read>(
    mut reader: R,
    delimiter: u8,
) -> TableResult<Vec<(BString, usize)>> {
    let mut input = Vec::new();
    reader.read_to_end(&mut input)?;
    parse_bins(&input, delimiter)
}
