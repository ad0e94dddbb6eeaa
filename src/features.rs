pub mod name_map;

pub use self::name_map::NameMap;

use bstr::{BStr, BString};

use crate::parser::error::{ParseError, TableResult};

/// One row of the contig table: the external label, the sequence
/// length in bp and the coverage depth.
#[derive(Debug, Clone, PartialEq)]
pub struct Contig {
    pub label: BString,
    pub length: u64,
    pub coverage: f64,
}

impl Contig {
    pub fn new(label: &[u8], length: u64, coverage: f64) -> Self {
        Contig {
            label: BString::from(label),
            length,
            coverage,
        }
    }
}

/// Per-contig features indexed by the dense contig id. Composition
/// vectors are stored twice: the raw counts, used to build bin
/// centroids, and a copy normalized to sum 1, used for distances.
#[derive(Debug, Clone)]
pub struct FeatureStore {
    names: NameMap,
    lengths: Vec<u64>,
    coverages: Vec<f64>,
    raw_composition: Vec<Vec<f64>>,
    composition: Vec<Vec<f64>>,
    dimension: usize,
}

impl FeatureStore {
    /// Build a store from contig rows and their raw composition
    /// profiles, both in id order. Fails on duplicate labels, on a
    /// missing profile, or on profiles of differing dimension.
    pub fn new(
        contigs: Vec<Contig>,
        raw_composition: Vec<Vec<f64>>,
    ) -> TableResult<Self> {
        let mut names = NameMap::new();
        for contig in contigs.iter() {
            if names.insert(&contig.label).is_none() {
                return Err(ParseError::DuplicateLabel(
                    contig.label.to_string(),
                ));
            }
        }

        if raw_composition.len() < contigs.len() {
            let label = &contigs[raw_composition.len()].label;
            return Err(ParseError::MissingProfile(label.to_string()));
        }

        let dimension = raw_composition.first().map(Vec::len).unwrap_or(0);
        for (contig, profile) in contigs.iter().zip(raw_composition.iter()) {
            if profile.len() != dimension {
                return Err(ParseError::DimensionMismatch {
                    label: contig.label.to_string(),
                    expected: dimension,
                    found: profile.len(),
                });
            }
        }

        let composition =
            raw_composition.iter().map(|p| normalize(p)).collect();
        let lengths = contigs.iter().map(|c| c.length).collect();
        let coverages = contigs.iter().map(|c| c.coverage).collect();

        Ok(FeatureStore {
            names,
            lengths,
            coverages,
            raw_composition,
            composition,
            dimension,
        })
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn names(&self) -> &NameMap {
        &self.names
    }

    /// Panics if `id` is out of range, like slice indexing.
    pub fn label(&self, id: usize) -> &BStr {
        self.names
            .inverse_map_name(id)
            .unwrap_or_else(|| panic!("contig id {} out of range", id))
    }

    pub fn length(&self, id: usize) -> u64 {
        self.lengths[id]
    }

    pub fn coverage(&self, id: usize) -> f64 {
        self.coverages[id]
    }

    /// Normalized composition vector.
    pub fn composition(&self, id: usize) -> &[f64] {
        &self.composition[id]
    }

    pub fn raw_composition(&self, id: usize) -> &[f64] {
        &self.raw_composition[id]
    }

    /// Length of every composition vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Scale a vector to sum 1. A vector summing to zero is returned
/// unchanged.
pub fn normalize(profile: &[f64]) -> Vec<f64> {
    let total: f64 = profile.iter().sum();
    if total > 0.0 {
        profile.iter().map(|v| v / total).collect()
    } else {
        profile.to_vec()
    }
}
