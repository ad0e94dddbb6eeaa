use pathfinding::kuhn_munkres::kuhn_munkres_min;
use pathfinding::matrix::Matrix;
use tracing::{debug, info};

use crate::binning::{BinningError, BinningResult, BinningState};
use crate::config::BinningConfig;
use crate::features::FeatureStore;
use crate::graph::AssemblyGraph;
use crate::markers::SeedGroup;
use crate::scoring::{mean_weight, pair_weight, MAX_WEIGHT};

// Weights are matched as fixed point integers with this many steps
// per unit.
const WEIGHT_SCALE: f64 = 1e6;

/// Counts of what happened to the contigs of one or more matching
/// rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchingReport {
    /// Rounds with at least one contig to place.
    pub rounds: usize,
    /// Contigs that joined an existing bin.
    pub merged: usize,
    /// Contigs that started a new bin.
    pub new_bins: usize,
    /// Contigs left unbinned by matching.
    pub deferred: usize,
}

impl std::ops::AddAssign for MatchingReport {
    fn add_assign(&mut self, other: Self) {
        self.rounds += other.rounds;
        self.merged += other.merged;
        self.new_bins += other.new_bins;
        self.deferred += other.deferred;
    }
}

/// Mean weight between `contig` and the current members of `bin`.
pub fn bin_weight(
    features: &FeatureStore,
    state: &BinningState,
    contig: usize,
    bin: usize,
) -> f64 {
    let comp = features.composition(contig);
    let cov = features.coverage(contig);
    mean_weight(state.members(bin).iter().map(|&m| {
        pair_weight(comp, features.composition(m), cov, features.coverage(m))
    }))
}

fn solver_cost(weight: f64, cap: i64) -> i64 {
    if weight.is_finite() && weight < MAX_WEIGHT {
        ((weight.max(0.0) * WEIGHT_SCALE).round() as i64).min(cap)
    } else {
        cap
    }
}

/// Minimum-weight full matching of every row of `weights` to a
/// distinct column. All rows must have the same length.
///
/// When there are more rows than columns, zero-cost padding columns
/// are added and rows matched to padding come back as `None`.
/// Sentinel weights are given the largest cost the solver can sum
/// without overflowing, so they are only used when unavoidable.
pub fn min_weight_full_matching(
    weights: &[Vec<f64>],
) -> BinningResult<Vec<Option<usize>>> {
    let rows = weights.len();
    if rows == 0 {
        return Ok(Vec::new());
    }
    let real_columns = weights[0].len();
    let columns = real_columns.max(rows);
    let cap = i64::MAX / (4 * (rows as i64 + 1));

    let mut costs = Vec::with_capacity(rows * columns);
    for row in weights.iter() {
        if row.len() != real_columns {
            return Err(BinningError::Solver(format!(
                "ragged weight matrix: row of {} columns, expected {}",
                row.len(),
                real_columns
            )));
        }
        costs.extend(row.iter().map(|&w| solver_cost(w, cap)));
        costs.extend(std::iter::repeat(0).take(columns - real_columns));
    }

    let matrix = Matrix::from_vec(rows, columns, costs)
        .map_err(|e| BinningError::Solver(format!("{:?}", e)))?;
    let (_total, assignment) = kuhn_munkres_min(&matrix);

    Ok(assignment
        .into_iter()
        .map(|col| if col < real_columns { Some(col) } else { None })
        .collect())
}

/// Start one bin per contig of the first seed group. Returns the
/// number of bins created.
pub fn initialise_bins(
    state: &mut BinningState,
    group: &SeedGroup,
) -> BinningResult<usize> {
    let mut created = 0;
    for &contig in group.contigs.iter() {
        if !state.is_binned(contig) {
            state.create_bin(contig)?;
            created += 1;
        }
    }
    Ok(created)
}

/// One matching round: match the unbinned contigs of `contigs`
/// against the existing bins, then merge, spawn or defer each one.
///
/// A matched contig joins its bin when the weight is at most
/// `w_intra` and its mean path length to the bin's members, counted
/// in contigs, is at most `d_limit`. A rejected contig starts a new
/// bin when the weight is at least `w_inter` and the path length is
/// at least `d_limit`.
/// Anything in between is left for label propagation.
pub fn match_round(
    state: &mut BinningState,
    features: &FeatureStore,
    graph: &AssemblyGraph,
    config: &BinningConfig,
    contigs: &[usize],
) -> BinningResult<MatchingReport> {
    let mut report = MatchingReport::default();

    let to_bin: Vec<usize> = contigs
        .iter()
        .copied()
        .filter(|&c| !state.is_binned(c))
        .collect();
    if to_bin.is_empty() || state.n_bins() == 0 {
        return Ok(report);
    }
    report.rounds = 1;

    let n_bins = state.n_bins();
    let weights: Vec<Vec<f64>> = to_bin
        .iter()
        .map(|&c| {
            (0..n_bins)
                .map(|b| bin_weight(features, state, c, b))
                .collect()
        })
        .collect();

    let matching = min_weight_full_matching(&weights)?;
    let d_limit = config.d_limit as f64;

    let mut rejected = Vec::new();
    for (row, &contig) in to_bin.iter().enumerate() {
        let bin = match matching[row] {
            Some(bin) => bin,
            None => {
                report.deferred += 1;
                continue;
            }
        };
        let weight = weights[row][bin];
        let distance = graph.mean_path_length(contig, state.members(bin));
        if weight <= config.w_intra && distance.floor() <= d_limit {
            state.assign(contig, bin)?;
            report.merged += 1;
        } else {
            rejected.push((contig, bin, weight));
        }
    }

    for (contig, bin, weight) in rejected {
        if weight >= config.w_inter {
            let distance = graph.mean_path_length(contig, state.members(bin));
            if distance.floor() >= d_limit {
                let new_bin = state.create_bin(contig)?;
                debug!("Contig {} starts bin {}", contig, new_bin);
                report.new_bins += 1;
                continue;
            }
        }
        report.deferred += 1;
    }

    Ok(report)
}

/// Seed bins from the first group and match every later group in
/// turn.
pub fn match_seed_groups(
    state: &mut BinningState,
    features: &FeatureStore,
    graph: &AssemblyGraph,
    config: &BinningConfig,
    groups: &[SeedGroup],
) -> BinningResult<MatchingReport> {
    let mut report = MatchingReport::default();
    let first = match groups.first() {
        Some(group) => group,
        None => {
            info!("No seed marker genes found, no bins initialised");
            return Ok(report);
        }
    };

    let created = initialise_bins(state, first)?;
    info!("Number of initial bins detected: {}", created);

    for (i, group) in groups.iter().enumerate().skip(1) {
        debug!(
            "Matching round {}: {} contigs, gene frequency {}",
            i,
            group.contigs.len(),
            group.frequency
        );
        report += match_round(state, features, graph, config, &group.contigs)?;
    }

    info!(
        "Matching placed {} contigs in existing bins and started {} new bins",
        report.merged, report.new_bins
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::features::Contig;

    fn store(coverages: &[f64]) -> FeatureStore {
        let contigs = coverages
            .iter()
            .enumerate()
            .map(|(i, &cov)| Contig::new(format!("c{}", i).as_bytes(), 5000, cov))
            .collect();
        FeatureStore::new(contigs, vec![vec![1.0; 4]; coverages.len()]).unwrap()
    }

    fn config() -> BinningConfig {
        BinningConfig {
            d_limit: 3,
            ..Default::default()
        }
    }

    #[test]
    fn matching_is_full_and_minimal() {
        let weights = vec![vec![1.0, 5.0, 9.0], vec![1.5, 9.0, 2.0]];
        let matching = min_weight_full_matching(&weights).unwrap();
        assert_eq!(matching, vec![Some(0), Some(2)]);

        let weights = vec![vec![4.0, 1.0], vec![2.0, 8.0]];
        let matching = min_weight_full_matching(&weights).unwrap();
        assert_eq!(matching, vec![Some(1), Some(0)]);
    }

    #[test]
    fn extra_rows_are_padded() {
        let weights = vec![vec![3.0], vec![1.0], vec![MAX_WEIGHT]];
        let matching = min_weight_full_matching(&weights).unwrap();
        assert_eq!(matching.len(), 3);
        assert_eq!(matching, vec![None, Some(0), None]);
    }

    #[test]
    fn sentinel_weights_are_avoided() {
        let weights = vec![
            vec![MAX_WEIGHT, 0.5],
            vec![MAX_WEIGHT, MAX_WEIGHT],
        ];
        let matching = min_weight_full_matching(&weights).unwrap();
        assert_eq!(matching, vec![Some(1), Some(0)]);

        let mut seen: Vec<usize> = matching.into_iter().flatten().collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn ragged_weights_are_rejected() {
        let weights = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(matches!(
            min_weight_full_matching(&weights),
            Err(BinningError::Solver(_))
        ));
    }

    #[test]
    fn empty_round_is_a_no_op() {
        let features = store(&[10.0, 10.0, 10.0]);
        let graph = AssemblyGraph::from_edges(3, vec![(0, 1), (1, 2)]);
        let mut state = BinningState::new(3);
        state.create_bin(0).unwrap();
        state.create_bin(2).unwrap();
        let before = state.clone();

        let report =
            match_round(&mut state, &features, &graph, &config(), &[0, 2])
                .unwrap();
        assert_eq!(report, MatchingReport::default());
        assert_eq!(state, before);

        let report =
            match_round(&mut state, &features, &graph, &config(), &[])
                .unwrap();
        assert_eq!(report.rounds, 0);
        assert_eq!(state, before);
    }

    #[test]
    fn similar_nearby_contig_merges() {
        // 0 - 1 - 2, with 3 disconnected.
        let features = store(&[10.0, 10.0, 10.0, 10.0]);
        let graph = AssemblyGraph::from_edges(4, vec![(0, 1), (1, 2)]);
        let mut state = BinningState::new(4);
        state.create_bin(0).unwrap();

        let report =
            match_round(&mut state, &features, &graph, &config(), &[2])
                .unwrap();
        assert_eq!(report.merged, 1);
        assert_eq!(state.bin_of(2), Some(0));
        assert_eq!(state.members(0), &[0, 2]);
    }

    #[test]
    fn dissimilar_distant_contig_starts_bin() {
        // Coverage 0 against 10 is a zero probability: sentinel weight.
        let features = store(&[10.0, 0.0]);
        let graph = AssemblyGraph::new(2);
        let mut state = BinningState::new(2);
        state.create_bin(0).unwrap();

        let report =
            match_round(&mut state, &features, &graph, &config(), &[1])
                .unwrap();
        assert_eq!(report.new_bins, 1);
        assert_eq!(state.n_bins(), 2);
        assert_eq!(state.members(1), &[1]);
    }

    #[test]
    fn dissimilar_nearby_contig_is_deferred() {
        let features = store(&[10.0, 0.0]);
        let graph = AssemblyGraph::from_edges(2, vec![(0, 1)]);
        let mut state = BinningState::new(2);
        state.create_bin(0).unwrap();

        let report =
            match_round(&mut state, &features, &graph, &config(), &[1])
                .unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(state.n_bins(), 1);
        assert!(!state.is_binned(1));
    }

    #[test]
    fn similar_but_disconnected_contig_is_deferred() {
        // Weight is low, but the contig can't reach the bin, so it is
        // neither merged nor (weight below w_inter) a new bin.
        let features = store(&[10.0, 10.0]);
        let graph = AssemblyGraph::new(2);
        let mut state = BinningState::new(2);
        state.create_bin(0).unwrap();

        let report =
            match_round(&mut state, &features, &graph, &config(), &[1])
                .unwrap();
        assert_eq!(report.deferred, 1);
        assert!(!state.is_binned(1));
    }

    #[test]
    fn seed_groups_drive_rounds() {
        let features = store(&[10.0, 10.0, 10.0, 0.0]);
        let graph = AssemblyGraph::from_edges(4, vec![(0, 1), (1, 2)]);
        let mut state = BinningState::new(4);
        let groups = vec![
            SeedGroup {
                frequency: 3,
                genes: vec!["A".into()],
                contigs: vec![0],
            },
            SeedGroup {
                frequency: 2,
                genes: vec!["B".into()],
                contigs: vec![0, 2, 3],
            },
        ];

        let report =
            match_seed_groups(&mut state, &features, &graph, &config(), &groups)
                .unwrap();
        // Contig 0 is already binned, 2 and 3 compete for the single
        // bin: 2 wins it, 3 is padded out.
        assert_eq!(report.rounds, 1);
        assert_eq!(report.merged, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(state.members(0), &[0, 2]);
        assert_eq!(state.n_bins(), 1);
    }

    #[test]
    fn sentinel_member_gives_sentinel_bin_weight() {
        let features = store(&[10.0, 0.0, 10.0]);
        let mut state = BinningState::new(3);
        state.create_bin(0).unwrap();
        state.assign(1, 0).unwrap();

        assert_eq!(bin_weight(&features, &state, 2, 0), MAX_WEIGHT);
    }

    #[test]
    fn merge_limit_counts_contigs_on_the_path() {
        // 0 - 1 - ... - 10, all alike.
        let features = store(&[10.0; 11]);
        let graph = AssemblyGraph::from_edges(11, (1..11).map(|i| (i - 1, i)));
        let config = BinningConfig::default();
        let mut base = BinningState::new(11);
        base.create_bin(0).unwrap();

        // 10 contigs from 9 to 0.
        let mut state = base.clone();
        let report =
            match_round(&mut state, &features, &graph, &config, &[9]).unwrap();
        assert_eq!(report.merged, 1);
        assert_eq!(state.bin_of(9), Some(0));

        // 11 contigs from 10 to 0.
        let mut state = base.clone();
        let report =
            match_round(&mut state, &features, &graph, &config, &[10]).unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(state.bin_of(10), None);
    }

    #[test]
    fn new_bin_needs_path_at_least_the_limit() {
        // 0 - 1 - 2 - 3, only contig 0 has coverage.
        let features = store(&[10.0, 0.0, 0.0, 0.0]);
        let graph = AssemblyGraph::from_edges(4, vec![(0, 1), (1, 2), (2, 3)]);
        let mut base = BinningState::new(4);
        base.create_bin(0).unwrap();

        // Path 2-1-0 holds exactly `d_limit` contigs.
        let mut state = base.clone();
        let report =
            match_round(&mut state, &features, &graph, &config(), &[2])
                .unwrap();
        assert_eq!(report.new_bins, 1);
        assert_eq!(state.members(1), &[2]);

        let mut state = base.clone();
        let report =
            match_round(&mut state, &features, &graph, &config(), &[1])
                .unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(state.n_bins(), 1);
    }

    #[test]
    fn weight_and_path_length_average_over_members() {
        // 0 - 1 - 2 - 3 - 4, bin {0, 1} with 1 at half coverage.
        let features = store(&[10.0, 5.0, 10.0, 10.0, 10.0]);
        let graph = AssemblyGraph::from_edges(5, (1..5).map(|i| (i - 1, i)));
        let mut base = BinningState::new(5);
        base.create_bin(0).unwrap();
        base.assign(1, 0).unwrap();

        let pair = |a: usize, b: usize| {
            pair_weight(
                features.composition(a),
                features.composition(b),
                features.coverage(a),
                features.coverage(b),
            )
        };
        let weight = bin_weight(&features, &base, 3, 0);
        assert!((weight - (pair(3, 0) + pair(3, 1)) / 2.0).abs() < 1e-12);
        assert!(weight > pair(3, 0));

        // Paths of 4 and 3 contigs: mean 3.5, floored to the limit.
        let mut state = base.clone();
        let report =
            match_round(&mut state, &features, &graph, &config(), &[3])
                .unwrap();
        assert_eq!(report.merged, 1);
        assert_eq!(state.members(0), &[0, 1, 3]);

        // Paths of 5 and 4 contigs: mean 4.5.
        let mut state = base.clone();
        let report =
            match_round(&mut state, &features, &graph, &config(), &[4])
                .unwrap();
        assert_eq!(report.deferred, 1);
        assert!(!state.is_binned(4));
    }
}
