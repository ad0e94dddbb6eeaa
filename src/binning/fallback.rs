use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info};

use crate::binning::{BinningError, BinningResult, BinningState};
use crate::config::BinningConfig;
use crate::features::FeatureStore;
use crate::scoring::{
    composition_distance, composition_probability, log_weight, MAX_WEIGHT,
};

/// Composition centroid of every bin: the summed raw profiles of
/// members at least `min_length` long, divided by their total but
/// never by less than 1. A bin without long members gets the zero
/// vector.
pub fn bin_centroids(
    state: &BinningState,
    features: &FeatureStore,
    min_length: u64,
) -> Vec<Vec<f64>> {
    let dim = features.dimension();
    state
        .bins()
        .iter()
        .map(|members| {
            let mut sum = vec![0.0; dim];
            for &m in members.iter() {
                if features.length(m) >= min_length {
                    for (s, v) in sum.iter_mut().zip(features.raw_composition(m))
                    {
                        *s += v;
                    }
                }
            }
            let total = sum.iter().sum::<f64>().max(1.0);
            sum.iter().map(|s| s / total).collect()
        })
        .collect()
}

/// The bin whose centroid is closest in composition to `profile`, if
/// any scores below the sentinel. Ties go to the lowest bin id.
pub fn best_bin(profile: &[f64], centroids: &[Vec<f64>]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (bin, centroid) in centroids.iter().enumerate() {
        let dist = composition_distance(profile, centroid);
        let weight = log_weight(composition_probability(dist));
        if weight >= MAX_WEIGHT {
            continue;
        }
        match best {
            Some((_, w)) if w <= weight => {}
            _ => best = Some((bin, weight)),
        }
    }
    best.map(|(bin, _)| bin)
}

/// Place unbinned long contigs in the bin with the closest
/// composition centroid. Scoring runs on a pool of
/// `config.nthreads` workers; assignments are applied afterwards in
/// contig order. Returns how many contigs were assigned.
pub fn assign_remaining(
    state: &mut BinningState,
    features: &FeatureStore,
    config: &BinningConfig,
) -> BinningResult<usize> {
    if state.n_bins() == 0 {
        debug!("No bins to assign remaining contigs to");
        return Ok(0);
    }

    let centroids = bin_centroids(state, features, config.min_length);
    let pending: Vec<usize> = state
        .unbinned()
        .filter(|&c| features.length(c) >= config.min_length)
        .collect();
    debug!(
        "Scoring {} long unbinned contigs against {} bins",
        pending.len(),
        centroids.len()
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(config.nthreads.max(1))
        .build()
        .map_err(|e| BinningError::WorkerPool(e.to_string()))?;

    let choices: Vec<(usize, Option<usize>)> = pool.install(|| {
        pending
            .par_iter()
            .map(|&c| (c, best_bin(features.composition(c), &centroids)))
            .collect()
    });

    let mut assigned = 0;
    for (contig, bin) in choices {
        if let Some(bin) = bin {
            state.assign(contig, bin)?;
            assigned += 1;
        }
    }

    info!("Assigned {} remaining contigs by composition", assigned);
    Ok(assigned)
}
