//src/select.rs

use ahash::AHashSet;
use std::cmp::Ordering;
use std::path::Path;

use crate::abundance::AbundanceTable;
use crate::error::{PhyloError, Result};
use crate::refdb::{load_cluster_ids, ClusterSet};

/// Criteria for picking genome clusters out of an abundance profile.
/// Every criterion that is set contributes one candidate set; the
/// selection is their intersection minus `exclude`.
#[derive(Debug, Clone, Default)]
pub struct ClusterSelection {
    pub min_coverage: Option<f64>,
    pub min_relative_abundance: Option<f64>,
    pub top_n: Option<usize>,
    pub cluster_ids: Vec<String>,
    pub exclude: Vec<String>,
}

impl ClusterSelection {
    fn uses_profile(&self) -> bool {
        self.min_coverage.is_some() || self.min_relative_abundance.is_some() || self.top_n.is_some()
    }
}

/// A list of cluster ids, one per line (e.g. known-bad clusters).
pub fn load_cluster_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    Ok(load_cluster_ids(path)?.iter().map(str::to_string).collect())
}

fn by_abundance_desc(table: &AbundanceTable) -> Vec<(&str, f64)> {
    let mut ranked: Vec<(&str, f64)> = table
        .rows
        .iter()
        .map(|r| (r.cluster_id.as_str(), r.relative_abundance))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    ranked
}

/// Applies `selection` to `table`. Every explicit id and every selected id
/// must belong to `clusters`.
/// Returns the chosen ids ordered by relative abundance, highest first.
pub fn select_genome_clusters(
    table: &AbundanceTable,
    clusters: &ClusterSet,
    selection: &ClusterSelection,
) -> Result<Vec<String>> {
    let mut sets: Vec<AHashSet<&str>> = Vec::new();

    if let Some(min_cov) = selection.min_coverage {
        sets.push(
            table
                .rows
                .iter()
                .filter(|r| r.coverage >= min_cov)
                .map(|r| r.cluster_id.as_str())
                .collect(),
        );
    }
    if let Some(min_rbun) = selection.min_relative_abundance {
        sets.push(
            table
                .rows
                .iter()
                .filter(|r| r.relative_abundance >= min_rbun)
                .map(|r| r.cluster_id.as_str())
                .collect(),
        );
    }
    if let Some(n) = selection.top_n {
        sets.push(by_abundance_desc(table).into_iter().take(n).map(|(id, _)| id).collect());
    }
    if !selection.cluster_ids.is_empty() {
        for id in &selection.cluster_ids {
            if !clusters.contains(id) {
                return Err(PhyloError::missing_cluster(id));
            }
        }
        sets.push(selection.cluster_ids.iter().map(String::as_str).collect());
    }

    let mut iter = sets.into_iter();
    let mut chosen = match iter.next() {
        Some(first) => first,
        None => {
            return Err(PhyloError::EmptyResult(
                "no genome-cluster selection criteria given".to_string(),
            ))
        }
    };
    for set in iter {
        chosen.retain(|id| set.contains(id));
    }
    for bad in &selection.exclude {
        chosen.remove(bad.as_str());
    }
    let mut unknown: Vec<&str> = chosen
        .iter()
        .copied()
        .filter(|id| !clusters.contains(id))
        .collect();
    unknown.sort_unstable();
    if let Some(id) = unknown.first() {
        return Err(PhyloError::missing_cluster(id));
    }

    if chosen.is_empty() {
        return Err(PhyloError::EmptyResult(
            "no genome-clusters satisfied the selection criteria".to_string(),
        ));
    }

    // clusters named explicitly may be absent from the profile
    let mut ordered: Vec<String> = by_abundance_desc(table)
        .into_iter()
        .filter(|(id, _)| chosen.remove(id))
        .map(|(id, _)| id.to_string())
        .collect();
    let mut rest: Vec<String> = chosen.into_iter().map(str::to_string).collect();
    rest.sort();
    ordered.extend(rest);

    if selection.uses_profile() {
        log::info!("Selected {} genome clusters from abundance profile", ordered.len());
    }
    Ok(ordered)
}
