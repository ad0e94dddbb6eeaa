#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Parameters of a binning run. The defaults are the values used
/// when an option is not given on the command line.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(default))]
pub struct BinningConfig {
    /// Contigs shorter than this (in bp) get no composition term.
    pub min_length: u64,
    /// Maximum matching weight for joining an existing bin.
    pub w_intra: f64,
    /// Minimum matching weight for starting a new bin.
    pub w_inter: f64,
    /// Graph distance limit for matching.
    pub d_limit: usize,
    /// Depth of the neighbourhood search during label propagation.
    pub depth: usize,
    /// Worker count for the fallback assignment.
    pub nthreads: usize,
    /// Field delimiter of the output tables.
    pub delimiter: u8,
    /// A marker gene seeds bins if it occurs on at least this
    /// fraction of the contigs carrying any marker gene.
    pub seed_fraction: f64,
    /// A marker hit counts if it covers more than this fraction of
    /// the marker model.
    pub marker_length_fraction: f64,
    /// Stop a label propagation pass after this many bindings.
    pub propagation_step_limit: Option<usize>,
}

impl Default for BinningConfig {
    fn default() -> Self {
        BinningConfig {
            min_length: 1000,
            w_intra: 2.0,
            w_inter: 80.0,
            d_limit: 10,
            depth: 1,
            nthreads: 8,
            delimiter: b',',
            seed_fraction: 0.333333,
            marker_length_fraction: 0.5,
            propagation_step_limit: None,
        }
    }
}

impl BinningConfig {
    /// Load a configuration from a JSON file. Missing keys take
    /// their default values.
    #[cfg(feature = "serde1")]
    pub fn load_json<P: AsRef<std::path::Path>>(
        path: P,
    ) -> std::io::Result<Self> {
        use std::{fs::File, io::BufReader};
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let config = serde_json::from_reader(reader)?;
        Ok(config)
    }

    /// Save the configuration to a JSON file.
    #[cfg(feature = "serde1")]
    pub fn save_json<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> std::io::Result<()> {
        use std::{fs::File, io::BufWriter};
        let file = File::create(path.as_ref())?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
