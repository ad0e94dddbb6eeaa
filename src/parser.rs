pub mod error;

pub use self::error::{
    ParseError, ParseFieldError, ParserTolerance, TableFieldResult,
    TableResult,
};

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use bstr::io::BufReadExt;
use bstr::{BString, ByteSlice};

use crate::features::{Contig, NameMap};

/// Parsing of a single table row, already split into fields.
pub(crate) trait ParseRow: Sized {
    fn parse_row(fields: &[&[u8]]) -> TableFieldResult<Self>;
}

impl ParseRow for Contig {
    fn parse_row(fields: &[&[u8]]) -> TableFieldResult<Self> {
        if fields.len() < 3 {
            return Err(ParseFieldError::MissingFields);
        }
        let label = parse_label(fields[0])?;
        let length = fields[1].to_str()?.trim().parse::<u64>()?;
        let coverage = parse_non_negative(fields[2], "coverage")?;
        Ok(Contig {
            label,
            length,
            coverage,
        })
    }
}

/// An edge between two contig labels.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EdgeRow(BString, BString);

impl ParseRow for EdgeRow {
    fn parse_row(fields: &[&[u8]]) -> TableFieldResult<Self> {
        if fields.len() < 2 {
            return Err(ParseFieldError::MissingFields);
        }
        Ok(EdgeRow(parse_label(fields[0])?, parse_label(fields[1])?))
    }
}

/// A contig label followed by its raw composition counts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompositionRow(BString, Vec<f64>);

impl ParseRow for CompositionRow {
    fn parse_row(fields: &[&[u8]]) -> TableFieldResult<Self> {
        if fields.len() < 2 {
            return Err(ParseFieldError::MissingFields);
        }
        let label = parse_label(fields[0])?;
        let values = fields[1..]
            .iter()
            .map(|f| parse_non_negative(f, "composition"))
            .collect::<TableFieldResult<Vec<_>>>()?;
        Ok(CompositionRow(label, values))
    }
}

fn parse_label(input: &[u8]) -> TableFieldResult<BString> {
    let label = input.trim();
    if label.is_empty() {
        Err(ParseFieldError::InvalidField("label"))
    } else {
        Ok(BString::from(label))
    }
}

fn parse_non_negative(
    input: &[u8],
    field: &'static str,
) -> TableFieldResult<f64> {
    let value = input.to_str()?.trim().parse::<f64>()?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ParseFieldError::OutOfRange(field))
    }
}

fn split_tabs(line: &[u8]) -> Vec<&[u8]> {
    line.split_str(b"\t").collect()
}

/// Reader for the tab separated input tables: the contig table, the
/// edge list and the composition table. Blank lines and lines
/// starting with `#` are skipped; how other bad lines are treated is
/// decided by the parser tolerance.
#[derive(Debug, Clone, Default)]
pub struct TableParser {
    tolerance: ParserTolerance,
}

impl TableParser {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_tolerance(tolerance: ParserTolerance) -> Self {
        TableParser { tolerance }
    }

    /// Drive `f` over every data line of `reader`. Field errors from
    /// `f` are tagged with the line they came from.
    pub(crate) fn for_each_line<R, F>(
        &self,
        reader: R,
        mut f: F,
    ) -> TableResult<()>
    where
        R: BufRead,
        F: FnMut(&[u8]) -> TableResult<()>,
    {
        for (ix, line) in reader.byte_lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            let result = if line.trim().is_empty() {
                Err(ParseError::EmptyLine)
            } else if line.starts_with(b"#") {
                Err(ParseError::Comment)
            } else {
                f(line).map_err(|err| match err {
                    ParseError::InvalidField(e) => {
                        ParseError::invalid_line(e, ix + 1, line)
                    }
                    other => other,
                })
            };

            if let Err(err) = result {
                if !err.can_safely_continue(&self.tolerance) {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Read `label<TAB>length<TAB>coverage` rows. The row order gives
    /// the contig ids.
    pub fn read_contigs<R: BufRead>(&self, reader: R) -> TableResult<Vec<Contig>> {
        let mut names = NameMap::new();
        let mut contigs = Vec::new();
        self.for_each_line(reader, |line| {
            let contig = Contig::parse_row(&split_tabs(line))?;
            if names.insert(&contig.label).is_none() {
                return Err(ParseError::DuplicateLabel(contig.label.to_string()));
            }
            contigs.push(contig);
            Ok(())
        })?;
        Ok(contigs)
    }

    /// Read `label<TAB>label` edges and map them to contig ids.
    pub fn read_edges<R: BufRead>(
        &self,
        reader: R,
        names: &NameMap,
    ) -> TableResult<Vec<(usize, usize)>> {
        let mut edges = Vec::new();
        self.for_each_line(reader, |line| {
            let EdgeRow(from, to) = EdgeRow::parse_row(&split_tabs(line))?;
            let from = lookup(names, &from)?;
            let to = lookup(names, &to)?;
            edges.push((from, to));
            Ok(())
        })?;
        Ok(edges)
    }

    /// Read `label<TAB>count<TAB>count...` rows into one raw profile
    /// per contig, in id order. Rows may come in any order, but every
    /// contig needs exactly one.
    pub fn read_composition<R: BufRead>(
        &self,
        reader: R,
        names: &NameMap,
    ) -> TableResult<Vec<Vec<f64>>> {
        let mut profiles: Vec<Option<Vec<f64>>> = vec![None; names.len()];
        let mut dimension = None;
        self.for_each_line(reader, |line| {
            let CompositionRow(label, values) =
                CompositionRow::parse_row(&split_tabs(line))?;
            let id = lookup(names, &label)?;

            let expected = *dimension.get_or_insert(values.len());
            if values.len() != expected {
                return Err(ParseError::DimensionMismatch {
                    label: label.to_string(),
                    expected,
                    found: values.len(),
                });
            }
            if profiles[id].is_some() {
                return Err(ParseError::DuplicateLabel(label.to_string()));
            }
            profiles[id] = Some(values);
            Ok(())
        })?;

        profiles
            .into_iter()
            .enumerate()
            .map(|(id, p)| {
                p.ok_or_else(|| {
                    let label = names
                        .inverse_map_name(id)
                        .map(|l| l.to_string())
                        .unwrap_or_default();
                    ParseError::MissingProfile(label)
                })
            })
            .collect()
    }

    pub fn parse_file<P, T, F>(&self, path: P, read: F) -> TableResult<T>
    where
        P: AsRef<Path>,
        F: FnOnce(&Self, BufReader<File>) -> TableResult<T>,
    {
        let file = File::open(path.as_ref())?;
        read(self, BufReader::new(file))
    }
}

pub(crate) fn lookup(names: &NameMap, label: &[u8]) -> TableResult<usize> {
    names
        .map_name(label)
        .ok_or_else(|| ParseError::UnknownLabel(label.to_str_lossy().into()))
}
