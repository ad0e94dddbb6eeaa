use std::time::{Duration, Instant};

use tracing::info;

use crate::binning::matching::MatchingReport;
use crate::binning::propagation::PropagationReport;
use crate::binning::{
    assign_remaining, match_seed_groups, propagate_labels, BinningResult,
    BinningState,
};
use crate::config::BinningConfig;
use crate::features::FeatureStore;
use crate::graph::AssemblyGraph;
use crate::markers::{select_seed_groups, MarkerRecords};

/// Summary of a binning run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinningReport {
    pub seed_groups: usize,
    pub initial_bins: usize,
    pub matching: MatchingReport,
    pub first_propagation: PropagationReport,
    pub fallback_assigned: usize,
    pub second_propagation: PropagationReport,
    pub n_bins: usize,
    pub n_binned: usize,
    pub n_unbinned: usize,
    pub elapsed: Duration,
}

/// The bins after each phase that gets written out: after seed
/// matching, after the first propagation, and at the end.
#[derive(Debug, Clone)]
pub struct BinningOutcome {
    pub seed: BinningState,
    pub intermediate: BinningState,
    pub bins: BinningState,
    pub report: BinningReport,
}

/// Run every binning phase in order on one contig set.
pub fn run_binning(
    features: &FeatureStore,
    graph: &AssemblyGraph,
    markers: &MarkerRecords,
    config: &BinningConfig,
) -> BinningResult<BinningOutcome> {
    let start = Instant::now();
    let mut report = BinningReport::default();
    let mut state = BinningState::new(features.len());

    let groups = select_seed_groups(markers, config.seed_fraction);
    report.seed_groups = groups.len();
    info!(
        "{} contigs carry marker genes, {} seed groups",
        markers.n_marker_contigs(),
        groups.len()
    );

    report.matching =
        match_seed_groups(&mut state, features, graph, config, &groups)?;
    report.initial_bins = groups.first().map(|g| g.contigs.len()).unwrap_or(0);
    let seed = state.clone();

    let isolated = (0..features.len())
        .filter(|&c| !state.is_binned(c) && graph.is_isolated(c))
        .count();
    info!(
        "After matching: {} bins, {} binned contigs, {} unbinned",
        state.n_bins(),
        state.n_binned(),
        state.n_unbinned()
    );
    info!(
        "Unbinned contigs: {} isolated, {} non-isolated",
        isolated,
        state.n_unbinned() - isolated
    );

    report.first_propagation =
        propagate_labels(&mut state, features, graph, config)?;
    let intermediate = state.clone();

    report.fallback_assigned = assign_remaining(&mut state, features, config)?;
    report.second_propagation =
        propagate_labels(&mut state, features, graph, config)?;
    state.sort_members();

    report.n_bins = state.n_bins();
    report.n_binned = state.n_binned();
    report.n_unbinned = state.n_unbinned();
    report.elapsed = start.elapsed();
    info!(
        "Binning finished: {} bins, {} binned, {} unbinned in {:.2?}",
        report.n_bins, report.n_binned, report.n_unbinned, report.elapsed
    );

    Ok(BinningOutcome {
        seed,
        intermediate,
        bins: state,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::features::Contig;

    // Two genomes on a path 0..=9, split by coverage, with the single
    // marker gene on contigs 0 and 5. Contig 10 is an isolated long
    // contig with the first genome's composition, contig 11 an
    // isolated short one.
    fn two_genomes() -> (FeatureStore, AssemblyGraph, MarkerRecords) {
        let mut contigs = Vec::new();
        let mut profiles = Vec::new();
        for i in 0..10 {
            let cov = if i < 5 { 10.0 } else { 50.0 };
            contigs.push(Contig::new(format!("c{}", i).as_bytes(), 5000, cov));
            profiles.push(vec![4.0, 3.0, 2.0, 1.0]);
        }
        contigs.push(Contig::new(b"c10", 5000, 12.0));
        profiles.push(vec![4.0, 3.0, 2.0, 1.0]);
        contigs.push(Contig::new(b"c11", 300, 12.0));
        profiles.push(vec![4.0, 3.0, 2.0, 1.0]);

        let features = FeatureStore::new(contigs, profiles).unwrap();
        let graph = AssemblyGraph::from_edges(12, (1..10).map(|i| (i - 1, i)));
        let mut markers = MarkerRecords::new(12);
        markers.add_hit(0, "G");
        markers.add_hit(5, "G");
        (features, graph, markers)
    }

    #[test]
    fn phases_run_in_order() {
        let (features, graph, markers) = two_genomes();
        let outcome = run_binning(
            &features,
            &graph,
            &markers,
            &BinningConfig::default(),
        )
        .unwrap();

        assert_eq!(outcome.report.seed_groups, 1);
        assert_eq!(outcome.report.initial_bins, 2);
        assert_eq!(outcome.seed.n_binned(), 2);
        assert_eq!(outcome.intermediate.n_binned(), 10);
        assert_eq!(outcome.report.first_propagation.bound, 8);
        assert_eq!(outcome.report.fallback_assigned, 1);

        let bins = &outcome.bins;
        assert_eq!(bins.members(0), &[0, 1, 2, 3, 4, 10]);
        assert_eq!(bins.members(1), &[5, 6, 7, 8, 9]);
        assert_eq!(bins.bin_of(11), None);
        assert_eq!(outcome.report.n_unbinned, 1);
    }

    #[test]
    fn snapshots_only_grow() {
        let (features, graph, markers) = two_genomes();
        let outcome = run_binning(
            &features,
            &graph,
            &markers,
            &BinningConfig::default(),
        )
        .unwrap();

        for contig in 0..features.len() {
            if let Some(bin) = outcome.seed.bin_of(contig) {
                assert_eq!(outcome.intermediate.bin_of(contig), Some(bin));
            }
            if let Some(bin) = outcome.intermediate.bin_of(contig) {
                assert_eq!(outcome.bins.bin_of(contig), Some(bin));
            }
        }

        let mut seen = vec![0; features.len()];
        for members in outcome.bins.bins() {
            for &m in members {
                seen[m] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n <= 1));
    }

    #[test]
    fn no_markers_no_bins() {
        let (features, graph, _) = two_genomes();
        let markers = MarkerRecords::new(features.len());
        let outcome = run_binning(
            &features,
            &graph,
            &markers,
            &BinningConfig::default(),
        )
        .unwrap();
        assert_eq!(outcome.bins.n_bins(), 0);
        assert_eq!(outcome.report.n_unbinned, features.len());
    }
}
