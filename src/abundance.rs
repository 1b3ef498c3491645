//src/abundance.rs

use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::Path;

use crate::classify::ClusterAlignments;
use crate::error::{PhyloError, Result};
use crate::refdb::GeneLengthTable;
use crate::types::AbundanceRow;

/// Header line of the abundance file.
pub const ABUNDANCE_HEADER: &str = "cluster_id\tcoverage\trelative_abundance";

/// How `relative_abundance` is derived from coverage.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum NormalizationMode {
    /// Coverage divided by total coverage; values sum to 1 across clusters.
    #[default]
    Proportional,
    /// Coverage divided by the genome equivalents in the sample
    /// (`sampled_bases / average_genome_size`): cells per genome copy.
    /// Values do not sum to 1.
    GenomeEquivalents {
        average_genome_size: f64,
        sampled_bases: u64,
    },
}

impl NormalizationMode {
    pub fn genome_equivalents(&self) -> Result<Option<f64>> {
        match *self {
            NormalizationMode::Proportional => Ok(None),
            NormalizationMode::GenomeEquivalents {
                average_genome_size,
                sampled_bases,
            } => {
                if !(average_genome_size.is_finite() && average_genome_size > 0.0) {
                    return Err(PhyloError::InvalidNormalization(format!(
                        "average genome size must be positive, got {}",
                        average_genome_size
                    )));
                }
                if sampled_bases == 0 {
                    return Err(PhyloError::InvalidNormalization(
                        "no sampled bases to derive genome equivalents from".to_string(),
                    ));
                }
                Ok(Some(sampled_bases as f64 / average_genome_size))
            }
        }
    }
}

/// Reads and bases handed to the aligner, as recorded by the read sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampledBases {
    pub reads: u64,
    pub bp: u64,
}

impl SampledBases {
    /// Parses a `"<reads> <bp>"` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| PhyloError::io(path, e))?;
        let parts: Vec<&str> = text.split_whitespace().collect();
        if parts.len() != 2 {
            return Err(PhyloError::parse(path, 1, "expected '<reads> <bp>'"));
        }
        let reads = parts[0]
            .parse()
            .map_err(|_| PhyloError::parse(path, 1, format!("invalid read count '{}'", parts[0])))?;
        let bp = parts[1]
            .parse()
            .map_err(|_| PhyloError::parse(path, 1, format!("invalid base count '{}'", parts[1])))?;
        Ok(Self { reads, bp })
    }
}

/// Per-cluster coverage and relative abundance, one row per registry cluster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbundanceTable {
    pub rows: Vec<AbundanceRow>,
}

impl AbundanceTable {
    pub fn get(&self, cluster_id: &str) -> Option<&AbundanceRow> {
        self.rows.iter().find(|r| r.cluster_id == cluster_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Tab-separated text with header.
    pub fn to_tsv(&self) -> String {
        let mut output = String::new();
        output.push_str(ABUNDANCE_HEADER);
        output.push('\n');
        for row in &self.rows {
            writeln!(
                output,
                "{}\t{}\t{}",
                row.cluster_id, row.coverage, row.relative_abundance
            )
            .unwrap();
        }
        output
    }
}

/// Converts assigned alignments into gene-length-normalized coverage and
/// relative abundance.
pub fn normalize_counts(
    alignments: &ClusterAlignments,
    gene_lengths: &GeneLengthTable,
    mode: NormalizationMode,
) -> Result<AbundanceTable> {
    let mut rows = Vec::with_capacity(alignments.len());

    for (cluster_id, _) in alignments.iter() {
        let bases = alignments.aligned_bases(cluster_id).unwrap_or(0);
        let coverage = if bases == 0 {
            0.0
        } else {
            let gene_length = *gene_lengths
                .get(cluster_id)
                .ok_or_else(|| PhyloError::missing_cluster(cluster_id))?;
            if gene_length == 0 {
                return Err(PhyloError::ZeroDenominator {
                    cluster_id: cluster_id.to_string(),
                    bases,
                });
            }
            bases as f64 / gene_length as f64
        };
        rows.push(AbundanceRow {
            cluster_id: cluster_id.to_string(),
            coverage,
            relative_abundance: 0.0,
        });
    }

    match mode.genome_equivalents()? {
        None => {
            let total_coverage: f64 = rows.iter().map(|r| r.coverage).sum();
            if total_coverage > 0.0 {
                for row in &mut rows {
                    row.relative_abundance = row.coverage / total_coverage;
                }
            }
        }
        Some(genomes) => {
            log::info!("  total genome equivalents: {:.2}", genomes);
            for row in &mut rows {
                row.relative_abundance = row.coverage / genomes;
            }
        }
    }

    Ok(AbundanceTable { rows })
}

/// Writes the abundance table as TSV.
pub fn write_abundance<P: AsRef<Path>>(path: P, table: &AbundanceTable) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, table.to_tsv()).map_err(|e| PhyloError::io(path, e))
}

/// Reads an abundance table written by [`write_abundance`].
pub fn read_abundance<P: AsRef<Path>>(path: P) -> Result<AbundanceTable> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| PhyloError::io(path, e))?;

    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 3 {
            return Err(PhyloError::parse(
                path,
                line_no,
                format!("expected 3 fields, found {}", fields.len()),
            ));
        }
        let coverage = fields[1].parse().map_err(|_| {
            PhyloError::parse(path, line_no, format!("invalid coverage '{}'", fields[1]))
        })?;
        let relative_abundance = fields[2].parse().map_err(|_| {
            PhyloError::parse(path, line_no, format!("invalid relative_abundance '{}'", fields[2]))
        })?;
        rows.push(AbundanceRow {
            cluster_id: fields[0].to_string(),
            coverage,
            relative_abundance,
        });
    }
    Ok(AbundanceTable { rows })
}
