//src/refdb.rs

use ahash::{AHashMap, AHashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use crate::error::{PhyloError, Result};
use crate::types::cluster_prefix;

/// File names inside a reference `data/` directory.
pub const CLUSTER_IDS_FILE: &str = "cluster_annotations.txt";
pub const GENE_LENGTH_FILE: &str = "gene_length.txt";
pub const MARKER_CUTOFFS_FILE: &str = "pid_cutoffs.txt";

/// Locations of the three reference tables.
#[derive(Debug, Clone)]
pub struct ReferencePaths {
    pub cluster_ids: PathBuf,
    pub gene_length: PathBuf,
    pub marker_cutoffs: PathBuf,
}

impl ReferencePaths {
    pub fn from_data_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            cluster_ids: dir.join(CLUSTER_IDS_FILE),
            gene_length: dir.join(GENE_LENGTH_FILE),
            marker_cutoffs: dir.join(MARKER_CUTOFFS_FILE),
        }
    }
}

/// The universe of valid genome-cluster identifiers, in registry order.
#[derive(Debug, Clone, Default)]
pub struct ClusterSet {
    ordered: Vec<String>,
    members: AHashSet<String>,
}

impl ClusterSet {
    pub fn insert(&mut self, cluster_id: &str) {
        if self.members.insert(cluster_id.to_string()) {
            self.ordered.push(cluster_id.to_string());
        }
    }

    pub fn contains(&self, cluster_id: &str) -> bool {
        self.members.contains(cluster_id)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for ClusterSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = ClusterSet::default();
        for id in iter {
            set.insert(id.as_ref());
        }
        set
    }
}

/// marker_id -> minimum percent identity
pub type MarkerCutoffs = AHashMap<String, f64>;

/// cluster_id -> summed reference gene length (bp)
pub type GeneLengthTable = AHashMap<String, u64>;

/// Iterate over `(line_no, line)` of non-blank lines, 1-based.
fn for_each_line<F>(path: &Path, mut f: F) -> Result<()>
where
    F: FnMut(usize, &str) -> Result<()>,
{
    let file = File::open(path).map_err(|e| PhyloError::io(path, e))?;
    let reader = BufReader::new(file);

    for (idx, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|e| match e.kind() {
            ErrorKind::InvalidData => {
                PhyloError::parse(path, idx + 1, format!("unreadable line: {e}"))
            }
            _ => PhyloError::io(path, e),
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        f(idx + 1, line)?;
    }
    Ok(())
}

/// Parses the cluster registry: the first whitespace-delimited token of each
/// line is a cluster id, the rest of the line (annotations) is ignored.
pub fn load_cluster_ids<P: AsRef<Path>>(filepath: P) -> Result<ClusterSet> {
    let mut clusters = ClusterSet::default();
    for_each_line(filepath.as_ref(), |_, line| {
        if let Some(id) = line.split_whitespace().next() {
            clusters.insert(id);
        }
        Ok(())
    })?;
    log::debug!("Loaded {} genome clusters", clusters.len());
    Ok(clusters)
}

/// Parses a marker cutoff table in the format:
/// ```text
/// <marker_id> <min_percent_identity>
/// ```
pub fn load_marker_cutoffs<P: AsRef<Path>>(filepath: P) -> Result<MarkerCutoffs> {
    let path = filepath.as_ref();
    let mut cutoffs = MarkerCutoffs::new();

    for_each_line(path, |line_no, line| {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 2 {
            return Err(PhyloError::parse(
                path,
                line_no,
                format!("expected '<marker_id> <min_pid>', found {} fields", parts.len()),
            ));
        }
        let min_pid = parts[1]
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                PhyloError::parse(path, line_no, format!("invalid min_pid '{}'", parts[1]))
            })?;
        cutoffs.insert(parts[0].to_string(), min_pid);
        Ok(())
    })?;

    log::debug!("Loaded identity cutoffs for {} markers", cutoffs.len());
    Ok(cutoffs)
}

/// Parses a gene length table in the format:
/// ```text
/// <cluster_id>_<marker_id> <gene_length>
/// ```
/// and sums the lengths per cluster. Every registry cluster gets an entry,
/// starting at 0; a gene belonging to an unregistered cluster is an error.
pub fn load_gene_lengths<P: AsRef<Path>>(
    filepath: P,
    clusters: &ClusterSet,
) -> Result<GeneLengthTable> {
    let path = filepath.as_ref();
    let mut lengths: GeneLengthTable = clusters.iter().map(|id| (id.to_string(), 0)).collect();

    for_each_line(path, |line_no, line| {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            return Err(PhyloError::parse(
                path,
                line_no,
                "expected '<cluster_id>_<marker_id> <gene_length>'",
            ));
        }
        let gene_length: u64 = parts[1].parse().map_err(|_| {
            PhyloError::parse(path, line_no, format!("invalid gene_length '{}'", parts[1]))
        })?;

        let cluster_id = cluster_prefix(parts[0]);
        match lengths.get_mut(cluster_id) {
            Some(total) => *total += gene_length,
            None => return Err(PhyloError::missing_cluster(cluster_id)),
        }
        Ok(())
    })?;

    Ok(lengths)
}

/// A loaded reference panel.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub clusters: ClusterSet,
    pub marker_cutoffs: MarkerCutoffs,
    pub gene_lengths: GeneLengthTable,
}

impl ReferenceData {
    pub fn load(paths: &ReferencePaths) -> Result<Self> {
        let clusters = load_cluster_ids(&paths.cluster_ids)?;
        let marker_cutoffs = load_marker_cutoffs(&paths.marker_cutoffs)?;
        let gene_lengths = load_gene_lengths(&paths.gene_length, &clusters)?;
        log::info!(
            "Loaded reference panel: {} clusters, {} markers",
            clusters.len(),
            marker_cutoffs.len()
        );
        Ok(Self {
            clusters,
            marker_cutoffs,
            gene_lengths,
        })
    }
}
