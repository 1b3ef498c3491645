// src/classify/assign_unique.rs

use super::ClusterAlignments;
use crate::error::Result;
use crate::types::BestHitGroup;

/// Outcome of the unique pass: the reads still to be resolved plus tallies.
#[derive(Debug, Default)]
pub struct UniqueAssignment {
    pub ambiguous: Vec<BestHitGroup>,
    pub unique_reads: usize,
    pub ambiguous_reads: usize,
}

/// Credits every read with a single best hit to that hit's cluster and sets
/// aside reads whose best score is tied across several alignments.
pub fn assign_unique(
    groups: Vec<BestHitGroup>,
    alignments: &mut ClusterAlignments,
) -> Result<UniqueAssignment> {
    let mut out = UniqueAssignment::default();

    for mut group in groups {
        if group.is_unique() {
            if let Some(hit) = group.hits.pop() {
                alignments.assign(hit)?;
                out.unique_reads += 1;
            }
        } else if !group.is_empty() {
            out.ambiguous_reads += 1;
            out.ambiguous.push(group);
        }
    }

    log::info!("  uniquely mapped reads: {}", out.unique_reads);
    log::info!("  ambiguously mapped reads: {}", out.ambiguous_reads);
    Ok(out)
}
