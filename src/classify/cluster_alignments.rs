// src/classify/cluster_alignments.rs

use ahash::AHashMap;

use crate::error::{PhyloError, Result};
use crate::refdb::ClusterSet;
use crate::types::AlignmentRecord;

/// Alignments assigned to each genome cluster.
///
/// Created with one (possibly empty) list per registry cluster, so every
/// cluster can be normalized even when no read landed on it. Only grows.
#[derive(Debug, Clone, Default)]
pub struct ClusterAlignments {
    order: Vec<String>,
    alignments: AHashMap<String, Vec<AlignmentRecord>>,
}

impl ClusterAlignments {
    pub fn new(clusters: &ClusterSet) -> Self {
        let order: Vec<String> = clusters.iter().map(str::to_string).collect();
        let alignments = order.iter().map(|id| (id.clone(), Vec::new())).collect();
        Self { order, alignments }
    }

    /// Assigns `record` to the cluster encoded in its target.
    pub fn assign(&mut self, record: AlignmentRecord) -> Result<()> {
        match self.alignments.get_mut(record.cluster_id()) {
            Some(list) => {
                list.push(record);
                Ok(())
            }
            None => Err(PhyloError::missing_cluster(record.cluster_id())),
        }
    }

    pub fn get(&self, cluster_id: &str) -> Option<&[AlignmentRecord]> {
        self.alignments.get(cluster_id).map(Vec::as_slice)
    }

    /// Reads currently assigned to `cluster_id`.
    pub fn read_count(&self, cluster_id: &str) -> Option<usize> {
        self.alignments.get(cluster_id).map(Vec::len)
    }

    /// Sum of alignment lengths assigned to `cluster_id`.
    pub fn aligned_bases(&self, cluster_id: &str) -> Option<u64> {
        self.alignments
            .get(cluster_id)
            .map(|alns| alns.iter().map(|a| a.alignment_length as u64).sum())
    }

    pub fn total_reads(&self) -> usize {
        self.alignments.values().map(Vec::len).sum()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Clusters in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[AlignmentRecord])> {
        self.order.iter().map(move |id| {
            let alns = self.alignments.get(id).map(Vec::as_slice).unwrap_or(&[]);
            (id.as_str(), alns)
        })
    }
}
