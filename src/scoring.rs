//! Pairwise scores between contigs (and between a contig and a bin
//! centroid). All weights are `-log10` probabilities, so smaller is
//! more similar; a probability of exactly zero maps to
//! [`MAX_WEIGHT`] instead of an infinite log.

/// Sentinel weight for pairs with zero probability of belonging
/// together.
pub const MAX_WEIGHT: f64 = f64::MAX;

// Gaussian models of tetranucleotide distance between two contigs of
// the same genome (intra) and of different genomes (inter).
const INTRA_MEAN: f64 = 0.0;
const INTRA_STD: f64 = 0.01037897 / 2.0;
const INTER_MEAN: f64 = 0.0676654;
const INTER_STD: f64 = 0.03419337;

fn normal_pdf(x: f64, mean: f64, std: f64) -> f64 {
    let z = (x - mean) / std;
    (-0.5 * z * z).exp() / (std * (2.0 * std::f64::consts::PI).sqrt())
}

/// Euclidean distance between two normalized composition vectors.
pub fn composition_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Posterior probability that two contigs at composition distance
/// `dist` come from the same genome. Zero when both densities
/// underflow.
pub fn composition_probability(dist: f64) -> f64 {
    let intra = normal_pdf(dist, INTRA_MEAN, INTRA_STD);
    let inter = normal_pdf(dist, INTER_MEAN, INTER_STD);
    let total = intra + inter;
    if total > 0.0 {
        intra / total
    } else {
        0.0
    }
}

/// Ratio of the smaller to the larger coverage, i.e. one minus the
/// relative coverage difference. Two zero coverages are identical.
pub fn coverage_probability(a: f64, b: f64) -> f64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if hi <= 0.0 {
        1.0
    } else {
        lo.max(0.0) / hi
    }
}

/// `-log10(p)`, or the sentinel when `p` is zero.
pub fn log_weight(p: f64) -> f64 {
    if p > 0.0 {
        -p.log10()
    } else {
        MAX_WEIGHT
    }
}

/// Weight of a pair from its composition and coverage probabilities.
/// A zero product gives the sentinel.
pub fn combined_weight(prob_comp: f64, prob_cov: f64) -> f64 {
    if prob_comp * prob_cov == 0.0 {
        MAX_WEIGHT
    } else {
        -(prob_comp.log10() + prob_cov.log10())
    }
}

/// Composition and coverage weight between two contigs.
pub fn pair_weight(
    comp_a: &[f64],
    comp_b: &[f64],
    cov_a: f64,
    cov_b: f64,
) -> f64 {
    let dist = composition_distance(comp_a, comp_b);
    combined_weight(
        composition_probability(dist),
        coverage_probability(cov_a, cov_b),
    )
}

/// Mean of a set of weights, where any sentinel poisons the mean:
/// the result is the sentinel itself, not the sentinel divided by
/// the count. An empty set has weight 0.
pub fn mean_weight<I>(weights: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut total = 0.0;
    let mut count = 0usize;
    for w in weights {
        if w >= MAX_WEIGHT {
            return MAX_WEIGHT;
        }
        total += w;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}
