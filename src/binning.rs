pub mod fallback;
pub mod matching;
pub mod propagation;

pub use self::fallback::assign_remaining;
pub use self::matching::match_seed_groups;
pub use self::propagation::propagate_labels;

use std::{error, fmt};

/// Errors raised when a phase would break the bin membership
/// invariants. None of these are expected in a correct run; they are
/// reported instead of panicking.
#[derive(Debug, Clone, PartialEq)]
pub enum BinningError {
    /// Tried to place a contig that already belongs to a bin.
    AlreadyBinned { contig: usize, bin: usize },
    UnknownBin(usize),
    UnknownContig(usize),
    /// The assignment solver rejected its input.
    Solver(String),
    /// The fallback worker pool could not be started.
    WorkerPool(String),
}

impl fmt::Display for BinningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinningError as BE;
        match self {
            BE::AlreadyBinned { contig, bin } => {
                write!(f, "Contig {} is already in bin {}", contig, bin)
            }
            BE::UnknownBin(bin) => write!(f, "Bin {} does not exist", bin),
            BE::UnknownContig(contig) => {
                write!(f, "Contig {} does not exist", contig)
            }
            BE::Solver(msg) => write!(f, "Matching solver error: {}", msg),
            BE::WorkerPool(msg) => {
                write!(f, "Failed to start worker pool: {}", msg)
            }
        }
    }
}

impl error::Error for BinningError {}

pub type BinningResult<T> = Result<T, BinningError>;

/// Bin membership of every contig. Bins get dense ids in creation
/// order, and membership is append-only: a contig moves from
/// unbinned to binned once and is never moved again.
#[derive(Debug, Clone, PartialEq)]
pub struct BinningState {
    bins: Vec<Vec<usize>>,
    bin_of: Vec<Option<usize>>,
    n_binned: usize,
}

impl BinningState {
    pub fn new(n_contigs: usize) -> Self {
        BinningState {
            bins: Vec::new(),
            bin_of: vec![None; n_contigs],
            n_binned: 0,
        }
    }

    pub fn n_contigs(&self) -> usize {
        self.bin_of.len()
    }

    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn n_binned(&self) -> usize {
        self.n_binned
    }

    pub fn n_unbinned(&self) -> usize {
        self.bin_of.len() - self.n_binned
    }

    pub fn bin_of(&self, contig: usize) -> Option<usize> {
        self.bin_of.get(contig).copied().flatten()
    }

    pub fn is_binned(&self, contig: usize) -> bool {
        self.bin_of(contig).is_some()
    }

    pub fn bins(&self) -> &[Vec<usize>] {
        &self.bins
    }

    /// Panics if `bin` doesn't exist.
    pub fn members(&self, bin: usize) -> &[usize] {
        &self.bins[bin]
    }

    /// Unbinned contigs in ascending id order.
    pub fn unbinned(&self) -> impl Iterator<Item = usize> + '_ {
        self.bin_of
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_none())
            .map(|(c, _)| c)
    }

    /// Binned contigs in ascending id order.
    pub fn binned(&self) -> impl Iterator<Item = usize> + '_ {
        self.bin_of
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_some())
            .map(|(c, _)| c)
    }

    fn check_unbinned(&self, contig: usize) -> BinningResult<()> {
        match self.bin_of.get(contig) {
            None => Err(BinningError::UnknownContig(contig)),
            Some(Some(bin)) => Err(BinningError::AlreadyBinned {
                contig,
                bin: *bin,
            }),
            Some(None) => Ok(()),
        }
    }

    /// Start a new bin holding only `contig` and return its id.
    pub fn create_bin(&mut self, contig: usize) -> BinningResult<usize> {
        self.check_unbinned(contig)?;
        let bin = self.bins.len();
        self.bins.push(vec![contig]);
        self.bin_of[contig] = Some(bin);
        self.n_binned += 1;
        Ok(bin)
    }

    /// Append an unbinned contig to an existing bin.
    pub fn assign(&mut self, contig: usize, bin: usize) -> BinningResult<()> {
        self.check_unbinned(contig)?;
        let members = self
            .bins
            .get_mut(bin)
            .ok_or(BinningError::UnknownBin(bin))?;
        members.push(contig);
        self.bin_of[contig] = Some(bin);
        self.n_binned += 1;
        Ok(())
    }

    /// Sort the members of every bin by contig id. Only affects the
    /// order members are listed in.
    pub fn sort_members(&mut self) {
        for members in self.bins.iter_mut() {
            members.sort_unstable();
        }
    }

    /// `(contig, bin)` pairs for every binned contig, ordered by bin
    /// and then by contig id.
    pub fn assignments(&self) -> Vec<(usize, usize)> {
        let mut rows: Vec<(usize, usize)> = self
            .bin_of
            .iter()
            .enumerate()
            .filter_map(|(c, b)| b.map(|b| (c, b)))
            .collect();
        rows.sort_unstable_by_key(|&(c, b)| (b, c));
        rows
    }
}
