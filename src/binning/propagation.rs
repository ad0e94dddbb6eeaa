use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};

use fnv::{FnvHashMap, FnvHashSet};
use tracing::{debug, info, warn};

use crate::binning::{BinningError, BinningResult, BinningState};
use crate::config::BinningConfig;
use crate::features::FeatureStore;
use crate::graph::AssemblyGraph;
use crate::scoring::{
    composition_distance, composition_probability, coverage_probability,
    log_weight, MAX_WEIGHT,
};

/// A proposal to put the unbinned `target` in the bin of the binned
/// `source`, found `distance` hops away.
///
/// Candidates order by distance, then score, then the order they
/// were queued in, all ascending.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub target: usize,
    pub source: usize,
    pub distance: usize,
    pub score: f64,
    seq: u64,
    generation: u64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .cmp(&other.distance)
            .then_with(|| self.score.total_cmp(&other.score))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Score between an unbinned contig and a binned one: the coverage
/// weight, plus the composition weight when both contigs are at
/// least `min_length` long.
pub fn candidate_score(
    features: &FeatureStore,
    config: &BinningConfig,
    target: usize,
    source: usize,
) -> f64 {
    let coverage = log_weight(coverage_probability(
        features.coverage(target),
        features.coverage(source),
    ));
    if coverage >= MAX_WEIGHT {
        return MAX_WEIGHT;
    }

    if features.length(target) >= config.min_length
        && features.length(source) >= config.min_length
    {
        let dist = composition_distance(
            features.composition(target),
            features.composition(source),
        );
        let composition = log_weight(composition_probability(dist));
        if composition >= MAX_WEIGHT {
            return MAX_WEIGHT;
        }
        coverage + composition
    } else {
        coverage
    }
}

/// Binned contigs within `depth` hops of `start`, with their
/// distance. The search does not continue past binned contigs.
pub fn binned_within(
    graph: &AssemblyGraph,
    state: &BinningState,
    start: usize,
    depth: usize,
) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut visited = FnvHashSet::default();
    let mut queue = VecDeque::new();
    visited.insert(start);
    queue.push_back((start, 0));

    while let Some((contig, dist)) = queue.pop_front() {
        if dist >= depth {
            continue;
        }
        for next in graph.neighbors(contig) {
            if !visited.insert(next) {
                continue;
            }
            if state.is_binned(next) {
                found.push((next, dist + 1));
            } else {
                queue.push_back((next, dist + 1));
            }
        }
    }
    found
}

/// Priority queue of candidates with lazy deletion. Every contig has
/// a generation counter; candidates queued under an older generation
/// are dropped when popped.
#[derive(Debug, Clone)]
pub struct CandidateQueue {
    heap: BinaryHeap<Reverse<Candidate>>,
    generation: Vec<u64>,
    next_seq: u64,
}

impl CandidateQueue {
    pub fn new(n_contigs: usize) -> Self {
        CandidateQueue {
            heap: BinaryHeap::new(),
            generation: vec![0; n_contigs],
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn push(
        &mut self,
        target: usize,
        source: usize,
        distance: usize,
        score: f64,
    ) {
        let candidate = Candidate {
            target,
            source,
            distance,
            score,
            seq: self.next_seq,
            generation: self.generation[target],
        };
        self.next_seq += 1;
        self.heap.push(Reverse(candidate));
    }

    /// Drop every queued candidate for `target`.
    pub fn invalidate(&mut self, target: usize) {
        self.generation[target] += 1;
    }

    /// Search around `target` and queue a candidate for each binned
    /// contig found.
    pub fn push_from(
        &mut self,
        target: usize,
        state: &BinningState,
        features: &FeatureStore,
        graph: &AssemblyGraph,
        config: &BinningConfig,
    ) {
        for (source, distance) in
            binned_within(graph, state, target, config.depth)
        {
            let score = candidate_score(features, config, target, source);
            self.push(target, source, distance, score);
        }
    }

    /// Pop the best candidate whose target is still unbinned and not
    /// invalidated. Returns the candidate and how many entries were
    /// discarded on the way.
    pub fn pop_live(
        &mut self,
        state: &BinningState,
    ) -> Option<(Candidate, usize)> {
        let mut discarded = 0;
        while let Some(Reverse(candidate)) = self.heap.pop() {
            if state.is_binned(candidate.target)
                || candidate.generation != self.generation[candidate.target]
            {
                discarded += 1;
                continue;
            }
            return Some((candidate, discarded));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationReport {
    /// Contigs given a bin.
    pub bound: usize,
    /// Queue entries dropped as stale.
    pub discarded: usize,
    /// Whether the step limit cut the pass short.
    pub stopped_early: bool,
}

/// Grow bins outwards through the assembly graph, always binding the
/// closest and then most similar unbinned contig first.
pub fn propagate_labels(
    state: &mut BinningState,
    features: &FeatureStore,
    graph: &AssemblyGraph,
    config: &BinningConfig,
) -> BinningResult<PropagationReport> {
    let mut report = PropagationReport::default();
    let mut queue = CandidateQueue::new(state.n_contigs());

    let mut frontier: Vec<usize> = state
        .binned()
        .flat_map(|c| graph.neighbors(c))
        .filter(|&n| !state.is_binned(n))
        .collect::<FnvHashSet<_>>()
        .into_iter()
        .collect();
    frontier.sort_unstable();

    for &contig in frontier.iter() {
        queue.push_from(contig, state, features, graph, config);
    }
    debug!(
        "Propagation starts from {} unbinned contigs, {} candidates",
        frontier.len(),
        queue.len()
    );

    // Bin counts grown this pass, for the debug summary.
    let mut grown: FnvHashMap<usize, usize> = FnvHashMap::default();

    while let Some((candidate, discarded)) = queue.pop_live(state) {
        report.discarded += discarded;

        if let Some(limit) = config.propagation_step_limit {
            if report.bound >= limit {
                warn!(
                    "Label propagation stopped after {} steps with {} queued candidates",
                    limit,
                    queue.len() + 1
                );
                report.stopped_early = true;
                break;
            }
        }

        let bin = state
            .bin_of(candidate.source)
            .ok_or(BinningError::UnknownContig(candidate.source))?;
        state.assign(candidate.target, bin)?;
        report.bound += 1;
        *grown.entry(bin).or_default() += 1;

        for next in graph.neighbors(candidate.target) {
            if !state.is_binned(next) {
                queue.invalidate(next);
                queue.push_from(next, state, features, graph, config);
            }
        }
    }

    debug!("Propagation grew {} bins", grown.len());
    info!("Label propagation bound {} contigs", report.bound);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::features::Contig;

    fn path_features(coverages: &[f64], length: u64) -> FeatureStore {
        let contigs = coverages
            .iter()
            .enumerate()
            .map(|(i, &c)| Contig::new(format!("c{}", i).as_bytes(), length, c))
            .collect();
        FeatureStore::new(contigs, vec![vec![2.0, 1.0, 1.0]; coverages.len()])
            .unwrap()
    }

    fn path(n: usize) -> AssemblyGraph {
        AssemblyGraph::from_edges(n, (1..n).map(|i| (i - 1, i)))
    }

    #[test]
    fn candidates_order_by_distance_score_then_seq() {
        let mut queue = CandidateQueue::new(4);
        queue.push(0, 3, 2, 0.0);
        queue.push(1, 3, 1, 5.0);
        queue.push(2, 3, 1, 0.5);
        queue.push(3, 0, 1, 0.5);

        let state = BinningState::new(4);
        let order: Vec<usize> = std::iter::from_fn(|| queue.pop_live(&state))
            .map(|(c, _)| c.target)
            .collect();
        assert_eq!(order, vec![2, 3, 1, 0]);
    }

    #[test]
    fn stale_candidates_are_discarded() {
        let mut queue = CandidateQueue::new(3);
        let mut state = BinningState::new(3);
        state.create_bin(2).unwrap();

        queue.push(0, 2, 1, 0.0);
        queue.push(1, 2, 1, 1.0);
        queue.invalidate(0);
        queue.push(0, 2, 1, 3.0);

        let (first, discarded) = queue.pop_live(&state).unwrap();
        assert_eq!(first.target, 1);
        assert_eq!(discarded, 1);

        state.assign(1, 0).unwrap();
        let (second, _) = queue.pop_live(&state).unwrap();
        assert_eq!(second.target, 0);
        assert_eq!(second.score, 3.0);
        assert!(queue.pop_live(&state).is_none());
    }

    #[test]
    fn search_stops_at_binned_contigs() {
        // 0 - 1 - 2 - 3, 1 binned: from 0 at depth 3 only 1 is found.
        let graph = path(4);
        let mut state = BinningState::new(4);
        state.create_bin(1).unwrap();
        state.create_bin(3).unwrap();

        assert_eq!(binned_within(&graph, &state, 0, 3), vec![(1, 1)]);
        assert_eq!(binned_within(&graph, &state, 2, 1), vec![(1, 1), (3, 1)]);
        assert!(binned_within(&graph, &state, 0, 0).is_empty());
    }

    #[test]
    fn composition_only_counts_for_long_contigs() {
        let contigs = vec![
            Contig::new(b"a", 5000, 10.0),
            Contig::new(b"b", 5000, 10.0),
            Contig::new(b"c", 200, 10.0),
        ];
        let profiles = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0, 1.0]];
        let features = FeatureStore::new(contigs, profiles).unwrap();
        let config = BinningConfig::default();

        // Far apart compositions: the composition term underflows.
        assert_eq!(candidate_score(&features, &config, 0, 1), MAX_WEIGHT);
        // The short contig only gets the coverage term.
        assert_eq!(candidate_score(&features, &config, 2, 0), 0.0);
    }

    #[test]
    fn path_labels_grow_from_both_seeds() {
        let mut coverages = vec![10.0; 5];
        coverages.extend(vec![50.0; 5]);
        let features = path_features(&coverages, 5000);
        let graph = path(10);
        let config = BinningConfig::default();

        let mut state = BinningState::new(10);
        state.create_bin(0).unwrap();
        state.create_bin(5).unwrap();

        let report =
            propagate_labels(&mut state, &features, &graph, &config).unwrap();
        assert_eq!(report.bound, 8);
        assert!(!report.stopped_early);
        assert_eq!(state.n_unbinned(), 0);
        for c in 1..5 {
            assert_eq!(state.bin_of(c), Some(0), "contig {}", c);
        }
        for c in 6..10 {
            assert_eq!(state.bin_of(c), Some(1), "contig {}", c);
        }
    }

    #[test]
    fn unreachable_contigs_stay_unbinned() {
        let features = path_features(&[10.0; 4], 5000);
        let graph = AssemblyGraph::from_edges(4, vec![(0, 1)]);
        let config = BinningConfig::default();
        let mut state = BinningState::new(4);
        state.create_bin(0).unwrap();

        let report =
            propagate_labels(&mut state, &features, &graph, &config).unwrap();
        assert_eq!(report.bound, 1);
        assert_eq!(state.unbinned().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn step_limit_stops_the_pass() {
        let features = path_features(&[10.0; 6], 5000);
        let graph = path(6);
        let config = BinningConfig {
            propagation_step_limit: Some(2),
            ..Default::default()
        };
        let mut state = BinningState::new(6);
        state.create_bin(0).unwrap();

        let report =
            propagate_labels(&mut state, &features, &graph, &config).unwrap();
        assert_eq!(report.bound, 2);
        assert!(report.stopped_early);
        assert_eq!(state.members(0), &[0, 1, 2]);
    }
}
