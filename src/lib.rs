// src/lib.rs
pub mod abundance;
pub mod classify;
pub mod error;
pub mod m8;
pub mod refdb;
pub mod select;
pub mod types;

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

use crate::abundance::{normalize_counts, AbundanceTable, NormalizationMode};
use crate::classify::{
    assign_unique, reassign_ambiguous, resolve_best_hits, resolve_best_hits_parallel,
    ClusterAlignments, MIN_QUERY_COVERAGE,
};
use crate::error::Result;
use crate::m8::{read_m8_records, AlignmentReader};
use crate::refdb::{ReferenceData, ReferencePaths};
use crate::types::ClassificationSummary;

/// Ambiguous-read fraction above which a warning is logged.
pub const HIGH_AMBIGUITY_FRACTION: f64 = 0.5;

/// Tunables of one estimation run.
#[derive(Debug, Clone)]
pub struct EstimateOptions {
    /// Minimum aligned fraction of a read.
    pub min_query_coverage: f64,
    /// Seed for ambiguous-read reassignment; `None` draws from OS entropy.
    pub seed: Option<u64>,
    pub normalization: NormalizationMode,
    /// Worker threads for best-hit resolution. 1 streams the file sequentially.
    pub threads: usize,
}

impl Default for EstimateOptions {
    fn default() -> Self {
        Self {
            min_query_coverage: MIN_QUERY_COVERAGE,
            seed: None,
            normalization: NormalizationMode::Proportional,
            threads: 1,
        }
    }
}

/// Everything one run produces. Text is generated on demand.
pub struct SpeciesResults {
    pub abundance: AbundanceTable,
    pub cluster_alignments: ClusterAlignments,
    pub summary: ClassificationSummary,
}

impl SpeciesResults {
    /// Abundance table as TSV.
    pub fn get_abundance_text(&self) -> String {
        self.abundance.to_tsv()
    }

    /// True when no read passed filtering.
    pub fn is_empty(&self) -> bool {
        self.summary.reads_with_hits == 0
    }
}

/// Classifies the alignments in `m8_path` against an already loaded panel
/// and estimates per-cluster abundance.
pub fn estimate_from_alignments<P: AsRef<Path>>(
    m8_path: P,
    refdata: &ReferenceData,
    options: &EstimateOptions,
) -> Result<SpeciesResults> {
    // 1. Best hit per read
    let best_hits = if options.threads > 1 {
        let records = read_m8_records(&m8_path)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .build()?;
        pool.install(|| {
            resolve_best_hits_parallel(&records, &refdata.marker_cutoffs, options.min_query_coverage)
        })?
    } else {
        resolve_best_hits(
            AlignmentReader::open(&m8_path)?,
            &refdata.marker_cutoffs,
            options.min_query_coverage,
        )?
    };

    let mut summary = ClassificationSummary {
        total_alignments: best_hits.total_alignments,
        accepted_alignments: best_hits.accepted_alignments,
        reads_with_hits: best_hits.len(),
        ..Default::default()
    };

    // 2. Unique reads, then 3. probabilistic reassignment of the rest
    let mut cluster_alignments = ClusterAlignments::new(&refdata.clusters);
    let unique = assign_unique(best_hits.into_groups(), &mut cluster_alignments)?;
    summary.unique_reads = unique.unique_reads;
    summary.ambiguous_reads = unique.ambiguous_reads;

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    reassign_ambiguous(unique.ambiguous, &mut cluster_alignments, &mut rng)?;

    if summary.reads_with_hits == 0 {
        log::warn!("No reads passed filtering; every cluster will report zero abundance");
    } else if summary.ambiguous_fraction() > HIGH_AMBIGUITY_FRACTION {
        log::warn!(
            "{:.1}% of classified reads were ambiguous",
            100.0 * summary.ambiguous_fraction()
        );
    }

    // 4. Coverage and relative abundance
    let abundance = normalize_counts(
        &cluster_alignments,
        &refdata.gene_lengths,
        options.normalization,
    )?;

    Ok(SpeciesResults {
        abundance,
        cluster_alignments,
        summary,
    })
}

/// Loads the reference tables, then runs [`estimate_from_alignments`].
pub fn estimate_species_abundance<P: AsRef<Path>>(
    m8_path: P,
    paths: &ReferencePaths,
    options: &EstimateOptions,
) -> Result<SpeciesResults> {
    let refdata = ReferenceData::load(paths)?;
    estimate_from_alignments(m8_path, &refdata, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PhyloError;
    use crate::refdb::{CLUSTER_IDS_FILE, GENE_LENGTH_FILE, MARKER_CUTOFFS_FILE};
    use std::fs;

    fn write_panel(dir: &Path) -> ReferencePaths {
        fs::write(dir.join(CLUSTER_IDS_FILE), "C1\nC2\nC3\n").unwrap();
        fs::write(dir.join(MARKER_CUTOFFS_FILE), "m1 95.0\nm2 95.0\n").unwrap();
        fs::write(
            dir.join(GENE_LENGTH_FILE),
            "C1_m1 600\nC1_m2 400\nC2_m1 500\nC2_m2 500\nC3_m1 800\n",
        )
        .unwrap();
        ReferencePaths::from_data_dir(dir)
    }

    fn m8_line(query: &str, target: &str, aln: u32, score: f64) -> String {
        format!("{query}\t{target}\t99.0\t{aln}\t0\t0\t1\t{aln}\t1\t{aln}\t1e-30\t{score}\n")
    }

    #[test]
    fn test_unique_and_tied_read() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_panel(dir.path());
        let m8 = dir.path().join("hits.m8");
        let mut text = String::new();
        text.push_str(&m8_line("read1_60", "C1_m1", 50, 100.0));
        text.push_str(&m8_line("read2_60", "C1_m2", 50, 90.0));
        text.push_str(&m8_line("read2_60", "C2_m2", 50, 90.0));
        fs::write(&m8, text).unwrap();

        // C2 has no unique reads, so the tied read must go to C1 whatever the seed
        for seed in 0..20 {
            let options = EstimateOptions {
                seed: Some(seed),
                ..Default::default()
            };
            let results = estimate_species_abundance(&m8, &paths, &options).unwrap();

            assert_eq!(results.summary.unique_reads, 1);
            assert_eq!(results.summary.ambiguous_reads, 1);
            assert_eq!(results.cluster_alignments.read_count("C1"), Some(2));
            assert_eq!(results.cluster_alignments.read_count("C2"), Some(0));

            let c1 = results.abundance.get("C1").unwrap();
            assert!((c1.coverage - 100.0 / 1000.0).abs() < 1e-12);
            assert!((c1.relative_abundance - 1.0).abs() < 1e-12);
            assert_eq!(results.abundance.get("C2").unwrap().coverage, 0.0);
            assert_eq!(results.abundance.get("C3").unwrap().coverage, 0.0);
        }
    }

    #[test]
    fn test_conservation_and_sum_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_panel(dir.path());
        let m8 = dir.path().join("hits.m8");
        let mut text = String::new();
        for i in 0..50 {
            text.push_str(&m8_line(&format!("u{i}_100"), ["C1_m1", "C2_m1", "C3_m1"][i % 3], 90, 150.0));
            text.push_str(&m8_line(&format!("a{i}_100"), "C1_m2", 90, 120.0));
            text.push_str(&m8_line(&format!("a{i}_100"), "C2_m2", 90, 120.0));
            // filtered: too short
            text.push_str(&m8_line(&format!("s{i}_100"), "C3_m1", 60, 200.0));
        }
        fs::write(&m8, text).unwrap();

        for threads in [1, 4] {
            let options = EstimateOptions {
                seed: Some(11),
                threads,
                ..Default::default()
            };
            let results = estimate_species_abundance(&m8, &paths, &options).unwrap();
            let s = &results.summary;
            assert_eq!(s.total_alignments, 200);
            assert_eq!(s.accepted_alignments, 150);
            assert_eq!(s.reads_with_hits, 100);
            assert_eq!(s.unique_reads + s.ambiguous_reads, s.reads_with_hits);
            assert_eq!(results.cluster_alignments.total_reads(), s.reads_with_hits);

            let sum: f64 = results.abundance.rows.iter().map(|r| r.relative_abundance).sum();
            assert!((sum - 1.0).abs() < 1e-9);
            assert_eq!(results.abundance.len(), 3);
        }
    }

    #[test]
    fn test_empty_sample() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_panel(dir.path());
        let m8 = dir.path().join("hits.m8");
        fs::write(&m8, m8_line("r1_100", "C1_m1", 10, 20.0)).unwrap();

        let results = estimate_species_abundance(&m8, &paths, &EstimateOptions::default()).unwrap();
        assert!(results.is_empty());
        assert_eq!(results.abundance.len(), 3);
        assert!(results.abundance.rows.iter().all(|r| r.relative_abundance == 0.0));
        assert_eq!(results.get_abundance_text().lines().count(), 4);
    }

    #[test]
    fn test_malformed_alignment_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_panel(dir.path());
        let m8 = dir.path().join("hits.m8");
        let mut text = m8_line("r1_100", "C1_m1", 90, 20.0);
        text.push_str("r2_100\tC1_m1\t99.0\n");
        fs::write(&m8, text).unwrap();

        assert!(matches!(
            estimate_species_abundance(&m8, &paths, &EstimateOptions::default()),
            Err(PhyloError::Parse { line: 2, .. })
        ));
    }
}
