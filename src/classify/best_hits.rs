// src/classify/best_hits.rs

use ahash::AHashMap;
use rayon::prelude::*;

use crate::error::{PhyloError, Result};
use crate::refdb::MarkerCutoffs;
use crate::types::{AlignmentRecord, BestHitGroup};

/// Minimum fraction of a read that an alignment must span; shorter local
/// alignments are dropped.
pub const MIN_QUERY_COVERAGE: f64 = 0.75;

/// Returns whether `record` meets its marker's identity cutoff and the
/// query-coverage threshold. A marker missing from the cutoff table is fatal.
pub fn passes_filters(
    record: &AlignmentRecord,
    cutoffs: &MarkerCutoffs,
    min_query_coverage: f64,
) -> Result<bool> {
    let marker_id = record.marker_id();
    let min_pid = cutoffs
        .get(marker_id)
        .ok_or_else(|| PhyloError::MissingReferenceData {
            kind: "marker",
            id: marker_id.to_string(),
        })?;

    if record.percent_identity.is_nan() || record.percent_identity < *min_pid {
        return Ok(false);
    }
    Ok(record.query_coverage() >= min_query_coverage)
}

/// Best-hit groups keyed by read, kept in order of each read's first
/// accepted alignment so that downstream random draws replay under a seed.
#[derive(Debug, Clone, Default)]
pub struct BestHits {
    groups: Vec<BestHitGroup>,
    index: AHashMap<String, usize>,
    /// Records seen, accepted or not.
    pub total_alignments: usize,
    /// Records that passed the filters.
    pub accepted_alignments: usize,
}

impl BestHits {
    fn offer(&mut self, record: AlignmentRecord) {
        self.accepted_alignments += 1;
        match self.index.get(&record.query) {
            Some(&i) => self.groups[i].offer(record),
            None => {
                self.index.insert(record.query.clone(), self.groups.len());
                self.groups.push(BestHitGroup::new(record));
            }
        }
    }

    fn merge(mut self, other: BestHits) -> BestHits {
        self.total_alignments += other.total_alignments;
        self.accepted_alignments += other.accepted_alignments;
        for group in other.groups {
            match self.index.get(&group.query) {
                Some(&i) => self.groups[i].merge(group),
                None => {
                    self.index.insert(group.query.clone(), self.groups.len());
                    self.groups.push(group);
                }
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[BestHitGroup] {
        &self.groups
    }

    pub fn into_groups(self) -> Vec<BestHitGroup> {
        self.groups
    }
}

/// Streams `records` once, keeping the top-scoring accepted alignments of each read.
/// Stops at the first parse or lookup error.
pub fn resolve_best_hits<I>(
    records: I,
    cutoffs: &MarkerCutoffs,
    min_query_coverage: f64,
) -> Result<BestHits>
where
    I: IntoIterator<Item = Result<AlignmentRecord>>,
{
    let mut best = BestHits::default();
    for record in records {
        let record = record?;
        best.total_alignments += 1;
        if passes_filters(&record, cutoffs, min_query_coverage)? {
            best.offer(record);
        }
    }
    log::info!(
        "Resolved best hits: {} alignments, {} accepted, {} reads",
        best.total_alignments,
        best.accepted_alignments,
        best.len()
    );
    Ok(best)
}

/// Parallel variant over an in-memory record slice. Each worker resolves its
/// shard independently; shards are merged with the same score rules.
pub fn resolve_best_hits_parallel(
    records: &[AlignmentRecord],
    cutoffs: &MarkerCutoffs,
    min_query_coverage: f64,
) -> Result<BestHits> {
    let best = records
        .par_iter()
        .try_fold(BestHits::default, |mut acc, record| {
            acc.total_alignments += 1;
            if passes_filters(record, cutoffs, min_query_coverage)? {
                acc.offer(record.clone());
            }
            Ok::<_, PhyloError>(acc)
        })
        .try_reduce(BestHits::default, |a, b| Ok(a.merge(b)))?;

    log::info!(
        "Resolved best hits (parallel): {} alignments, {} accepted, {} reads",
        best.total_alignments,
        best.accepted_alignments,
        best.len()
    );
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_record;

    fn cutoffs() -> MarkerCutoffs {
        [("m1".to_string(), 95.0), ("m2".to_string(), 98.0)]
            .into_iter()
            .collect()
    }

    fn records() -> Vec<AlignmentRecord> {
        vec![
            // below m2 identity cutoff
            test_record("r1_100", "A_m2", 97.0, 100, 200.0),
            test_record("r1_100", "A_m1", 96.0, 100, 150.0),
            test_record("r1_100", "B_m1", 99.0, 100, 150.0),
            test_record("r1_100", "C_m1", 99.0, 100, 120.0),
            // short local alignment
            test_record("r2_100", "A_m1", 100.0, 70, 300.0),
            test_record("r2_100", "B_m1", 99.0, 80, 100.0),
            test_record("r2_100", "C_m1", 99.0, 90, 140.0),
            // only rejected hits
            test_record("r3_100", "A_m1", 90.0, 100, 200.0),
        ]
    }

    #[test]
    fn test_filters() {
        let c = cutoffs();
        assert!(!passes_filters(&test_record("r_100", "A_m2", 97.9, 100, 1.0), &c, 0.75).unwrap());
        assert!(passes_filters(&test_record("r_100", "A_m2", 98.0, 100, 1.0), &c, 0.75).unwrap());
        assert!(passes_filters(&test_record("r_100", "A_m1", 98.0, 75, 1.0), &c, 0.75).unwrap());
        assert!(!passes_filters(&test_record("r_100", "A_m1", 98.0, 74, 1.0), &c, 0.75).unwrap());
        assert!(!passes_filters(&test_record("r_100", "A_m1", f64::NAN, 100, 1.0), &c, 0.75).unwrap());
        assert!(matches!(
            passes_filters(&test_record("r_100", "A_m9", 98.0, 100, 1.0), &c, 0.75),
            Err(PhyloError::MissingReferenceData { .. })
        ));
    }

    #[test]
    fn test_resolve_best_hits() {
        let best = resolve_best_hits(records().into_iter().map(Ok), &cutoffs(), MIN_QUERY_COVERAGE)
            .unwrap();
        assert_eq!(best.total_alignments, 8);
        assert_eq!(best.accepted_alignments, 5);
        assert_eq!(best.len(), 2);

        let r1 = &best.groups()[0];
        assert_eq!(r1.query, "r1_100");
        assert_eq!(r1.score, 150.0);
        let targets: Vec<_> = r1.hits.iter().map(|h| h.target.as_str()).collect();
        assert_eq!(targets, vec!["A_m1", "B_m1"]);

        let r2 = &best.groups()[1];
        assert!(r2.is_unique());
        assert_eq!(r2.hits[0].target, "C_m1");

        for group in best.groups() {
            for hit in &group.hits {
                assert!(hit.percent_identity >= cutoffs()[hit.marker_id()]);
                assert!(hit.query_coverage() >= MIN_QUERY_COVERAGE);
                assert_eq!(hit.score, group.score);
            }
        }
    }

    #[test]
    fn test_best_hits_independent_of_order_for_increasing_scores() {
        let mut reversed = records();
        reversed.reverse();
        let best = resolve_best_hits(reversed.into_iter().map(Ok), &cutoffs(), MIN_QUERY_COVERAGE)
            .unwrap();
        let r1 = best.groups().iter().find(|g| g.query == "r1_100").unwrap();
        assert_eq!(r1.score, 150.0);
        assert_eq!(r1.len(), 2);
    }

    #[test]
    fn test_error_stops_resolution() {
        let input = vec![
            Ok(test_record("r1_100", "A_m1", 99.0, 100, 10.0)),
            Err(PhyloError::parse("hits.m8", 2, "bad")),
        ];
        assert!(resolve_best_hits(input, &cutoffs(), MIN_QUERY_COVERAGE).is_err());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut input = records();
        for i in 0..200 {
            let q = format!("q{}_100", i);
            input.push(test_record(&q, "A_m1", 99.0, 100, (i % 7) as f64));
            input.push(test_record(&q, "B_m1", 99.0, 100, (i % 5) as f64));
        }
        let seq = resolve_best_hits(input.clone().into_iter().map(Ok), &cutoffs(), MIN_QUERY_COVERAGE)
            .unwrap();
        let par = resolve_best_hits_parallel(&input, &cutoffs(), MIN_QUERY_COVERAGE).unwrap();

        assert_eq!(seq.total_alignments, par.total_alignments);
        assert_eq!(seq.accepted_alignments, par.accepted_alignments);
        assert_eq!(seq.len(), par.len());
        for (a, b) in seq.groups().iter().zip(par.groups()) {
            assert_eq!(a.query, b.query);
            assert_eq!(a.score, b.score);
            assert_eq!(a.len(), b.len());
        }
    }
}
