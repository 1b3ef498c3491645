//src/types.rs

/// One line of tabular (BLAST outfmt 6 / m8) alignment output.
///
/// Identifiers carry encoded data:
///  - `query` ends with `_<read_length>`
///  - `target` is `<cluster_id>_..._<marker_id>`
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    pub query: String,
    pub target: String,
    pub percent_identity: f64,
    pub alignment_length: u32,
    pub mismatches: u32,
    pub gap_count: u32,
    pub query_start: u32,
    pub query_end: u32,
    pub target_start: u32,
    pub target_end: u32,
    pub e_value: f64,
    pub score: f64,
    /// Decoded from the trailing integer of `query` when the line is parsed.
    pub read_length: u32,
}

impl AlignmentRecord {
    /// Genome cluster of the target: everything before the first `_`.
    pub fn cluster_id(&self) -> &str {
        cluster_prefix(&self.target)
    }

    /// Marker gene of the target: everything after the last `_`.
    pub fn marker_id(&self) -> &str {
        match self.target.rfind('_') {
            Some(pos) => &self.target[pos + 1..],
            None => &self.target,
        }
    }

    /// Fraction of the read covered by the alignment.
    pub fn query_coverage(&self) -> f64 {
        if self.read_length == 0 {
            return 0.0;
        }
        self.alignment_length as f64 / self.read_length as f64
    }
}

/// Cluster prefix of a composite `<cluster_id>_<marker_id>` identifier.
pub fn cluster_prefix(id: &str) -> &str {
    id.split('_').next().unwrap_or(id)
}

/// The alignments of one read tied at its best score.
///
/// Never empty; every member carries the same `score`.
#[derive(Debug, Clone)]
pub struct BestHitGroup {
    pub query: String,
    pub score: f64,
    pub hits: Vec<AlignmentRecord>,
}

impl BestHitGroup {
    pub fn new(record: AlignmentRecord) -> Self {
        Self {
            query: record.query.clone(),
            score: record.score,
            hits: vec![record],
        }
    }

    /// Offer another accepted alignment of the same read.
    /// Higher score replaces the group, equal score joins it, lower is dropped.
    pub fn offer(&mut self, record: AlignmentRecord) {
        if record.score > self.score {
            self.score = record.score;
            self.hits.clear();
            self.hits.push(record);
        } else if record.score == self.score {
            self.hits.push(record);
        }
    }

    /// Fold another group for the same read into this one.
    pub fn merge(&mut self, mut other: BestHitGroup) {
        if other.score > self.score {
            *self = other;
        } else if other.score == self.score {
            self.hits.append(&mut other.hits);
        }
    }

    pub fn is_unique(&self) -> bool {
        self.hits.len() == 1
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// One row of the abundance table.
#[derive(Debug, Clone, PartialEq)]
pub struct AbundanceRow {
    pub cluster_id: String,
    pub coverage: f64,
    pub relative_abundance: f64,
}

/// Read and alignment tallies from one classification pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationSummary {
    /// Alignment records read from the input
    pub total_alignments: usize,
    /// Records passing the identity and query-coverage filters
    pub accepted_alignments: usize,
    /// Reads with at least one accepted record
    pub reads_with_hits: usize,
    pub unique_reads: usize,
    pub ambiguous_reads: usize,
}

impl ClassificationSummary {
    pub fn ambiguous_fraction(&self) -> f64 {
        if self.reads_with_hits == 0 {
            0.0
        } else {
            self.ambiguous_reads as f64 / self.reads_with_hits as f64
        }
    }
}

#[cfg(test)]
pub(crate) fn test_record(query: &str, target: &str, pid: f64, aln: u32, score: f64) -> AlignmentRecord {
    let read_length = query
        .rsplit('_')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(100);
    AlignmentRecord {
        query: query.to_string(),
        target: target.to_string(),
        percent_identity: pid,
        alignment_length: aln,
        mismatches: 0,
        gap_count: 0,
        query_start: 1,
        query_end: aln,
        target_start: 1,
        target_end: aln,
        e_value: 1e-20,
        score,
        read_length,
    }
}
