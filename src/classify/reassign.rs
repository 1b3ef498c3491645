// src/classify/reassign.rs

use ahash::AHashMap;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use super::ClusterAlignments;
use crate::error::{PhyloError, Result};
use crate::types::BestHitGroup;

/// Picks an index into `weights` with probability proportional to its weight,
/// or uniformly when every weight is zero. `None` when `weights` is empty.
pub fn choose_candidate<R: Rng>(weights: &[usize], rng: &mut R) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    if weights.iter().all(|&w| w == 0) {
        return Some(rng.gen_range(0..weights.len()));
    }
    WeightedIndex::new(weights).ok().map(|dist| dist.sample(rng))
}

/// Assigns each ambiguous read to one of its tied clusters by a single
/// weighted draw. Weights are the unique-read counts as they stand before
/// this pass; reassignments made here never feed back into them.
///
/// Returns the number of reads reassigned.
pub fn reassign_ambiguous<R: Rng>(
    ambiguous: Vec<BestHitGroup>,
    alignments: &mut ClusterAlignments,
    rng: &mut R,
) -> Result<usize> {
    let unique_counts: AHashMap<String, usize> = alignments
        .iter()
        .map(|(id, alns)| (id.to_string(), alns.len()))
        .collect();

    let mut reassigned = 0usize;
    for mut group in ambiguous {
        if group.is_empty() {
            continue;
        }

        let weights = group
            .hits
            .iter()
            .map(|hit| {
                unique_counts
                    .get(hit.cluster_id())
                    .copied()
                    .ok_or_else(|| PhyloError::missing_cluster(hit.cluster_id()))
            })
            .collect::<Result<Vec<usize>>>()?;

        let chosen = choose_candidate(&weights, rng).ok_or_else(|| {
            PhyloError::EmptyResult(format!("no candidate cluster for read {}", group.query))
        })?;
        let hit = group.hits.swap_remove(chosen);
        log::debug!("{} -> {}", group.query, hit.cluster_id());
        alignments.assign(hit)?;
        reassigned += 1;
    }

    Ok(reassigned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refdb::ClusterSet;
    use crate::types::test_record;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const TRIALS: usize = 20_000;

    fn tied(query: &str, targets: &[&str]) -> BestHitGroup {
        let mut g = BestHitGroup::new(test_record(query, targets[0], 99.0, 100, 90.0));
        for t in &targets[1..] {
            g.offer(test_record(query, t, 99.0, 100, 90.0));
        }
        g
    }

    #[test]
    fn test_uniform_when_no_unique_information() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = [0usize; 3];
        for _ in 0..TRIALS {
            counts[choose_candidate(&[0, 0, 0], &mut rng).unwrap()] += 1;
        }
        for c in counts {
            let frac = c as f64 / TRIALS as f64;
            assert!((frac - 1.0 / 3.0).abs() < 0.02, "fraction {frac}");
        }
    }

    #[test]
    fn test_no_candidates() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(choose_candidate(&[], &mut rng), None);
        assert_eq!(choose_candidate(&[0, 5], &mut rng), Some(1));
    }

    #[test]
    fn test_weighted_three_to_one() {
        let clusters: ClusterSet = ["A", "B"].into_iter().collect();
        let mut base = ClusterAlignments::new(&clusters);
        for i in 0..3 {
            base.assign(test_record(&format!("ua{i}_100"), "A_m1", 99.0, 100, 1.0)).unwrap();
        }
        base.assign(test_record("ub_100", "B_m1", 99.0, 100, 1.0)).unwrap();

        let ambiguous: Vec<_> = (0..TRIALS)
            .map(|i| tied(&format!("amb{i}_100"), &["A_m2", "B_m2"]))
            .collect();

        let mut alns = base.clone();
        let mut rng = StdRng::seed_from_u64(42);
        let n = reassign_ambiguous(ambiguous, &mut alns, &mut rng).unwrap();
        assert_eq!(n, TRIALS);

        let to_a = alns.read_count("A").unwrap() - 3;
        let frac = to_a as f64 / TRIALS as f64;
        assert!((frac - 0.75).abs() < 0.02, "fraction {frac}");
        // conservation: 4 unique + every ambiguous read
        assert_eq!(alns.total_reads(), 4 + TRIALS);
    }

    #[test]
    fn test_zero_weight_candidate_never_chosen() {
        let clusters: ClusterSet = ["C1", "C2"].into_iter().collect();
        let mut alns = ClusterAlignments::new(&clusters);
        alns.assign(test_record("u_100", "C1_m1", 99.0, 50, 100.0)).unwrap();

        let ambiguous: Vec<_> = (0..500)
            .map(|i| tied(&format!("amb{i}_100"), &["C2_m1", "C1_m1"]))
            .collect();
        let mut rng = StdRng::seed_from_u64(1);
        reassign_ambiguous(ambiguous, &mut alns, &mut rng).unwrap();

        assert_eq!(alns.read_count("C1"), Some(501));
        assert_eq!(alns.read_count("C2"), Some(0));
        // the chosen record is the one aligned to the chosen cluster
        assert!(alns.get("C1").unwrap().iter().all(|a| a.cluster_id() == "C1"));
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let clusters: ClusterSet = ["A", "B", "C"].into_iter().collect();
        let ambiguous: Vec<_> = (0..100)
            .map(|i| tied(&format!("amb{i}_100"), &["A_m1", "B_m1", "C_m1"]))
            .collect();

        let run = |seed: u64| {
            let mut alns = ClusterAlignments::new(&clusters);
            let mut rng = StdRng::seed_from_u64(seed);
            reassign_ambiguous(ambiguous.clone(), &mut alns, &mut rng).unwrap();
            ["A", "B", "C"].map(|c| alns.read_count(c).unwrap())
        };
        assert_eq!(run(99), run(99));
    }

    #[test]
    fn test_candidate_outside_registry_is_fatal() {
        let clusters: ClusterSet = ["A"].into_iter().collect();
        let mut alns = ClusterAlignments::new(&clusters);
        let mut rng = StdRng::seed_from_u64(0);
        let err = reassign_ambiguous(vec![tied("r_100", &["A_m1", "Z_m1"])], &mut alns, &mut rng)
            .unwrap_err();
        assert!(matches!(err, PhyloError::MissingReferenceData { .. }));
        assert_eq!(alns.total_reads(), 0);
    }
}
