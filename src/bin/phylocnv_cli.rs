use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process;

use phylocnv_rs::abundance::{write_abundance, NormalizationMode, SampledBases};
use phylocnv_rs::classify::MIN_QUERY_COVERAGE;
use phylocnv_rs::error::Result;
use phylocnv_rs::refdb::{ReferenceData, ReferencePaths};
use phylocnv_rs::{estimate_from_alignments, EstimateOptions};

/// Estimate genome-cluster abundance from marker-gene alignments.
#[derive(Parser, Debug)]
#[command(name = "phylocnv-species", version)]
struct Args {
    /// Tabular (m8 / outfmt 6) alignments of reads against the marker database
    #[arg(long)]
    m8: PathBuf,

    /// Directory holding cluster_annotations.txt, gene_length.txt and pid_cutoffs.txt
    #[arg(long, required_unless_present_all = ["cluster_ids", "gene_length", "marker_cutoffs"])]
    data_dir: Option<PathBuf>,

    #[arg(long)]
    cluster_ids: Option<PathBuf>,
    #[arg(long)]
    gene_length: Option<PathBuf>,
    #[arg(long)]
    marker_cutoffs: Option<PathBuf>,

    /// Output abundance table
    #[arg(short, long)]
    out: PathBuf,

    /// Seed for ambiguous-read reassignment
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value_t = 1)]
    threads: usize,

    #[arg(long, default_value_t = MIN_QUERY_COVERAGE)]
    min_qcov: f64,

    /// Average genome size; rescales relative abundance to genome equivalents
    #[arg(long, requires = "read_counts")]
    ags: Option<f64>,

    /// File with "<reads> <bp>" sampled from the input
    #[arg(long, requires = "ags")]
    read_counts: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn spinner(color: &str, msg: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template(&format!("{{spinner:.{color}}} {{msg}}"))
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg);
    pb
}

fn reference_paths(args: &Args) -> ReferencePaths {
    let mut paths = match &args.data_dir {
        Some(dir) => ReferencePaths::from_data_dir(dir),
        None => ReferencePaths {
            cluster_ids: PathBuf::new(),
            gene_length: PathBuf::new(),
            marker_cutoffs: PathBuf::new(),
        },
    };
    if let Some(p) = &args.cluster_ids {
        paths.cluster_ids = p.clone();
    }
    if let Some(p) = &args.gene_length {
        paths.gene_length = p.clone();
    }
    if let Some(p) = &args.marker_cutoffs {
        paths.marker_cutoffs = p.clone();
    }
    paths
}

fn run(args: Args) -> Result<()> {
    let normalization = match (args.ags, &args.read_counts) {
        (Some(ags), Some(path)) => {
            let sampled = SampledBases::from_file(path)?;
            log::info!("  average genome size: {:.2}", ags);
            log::info!("  total bp sampled: {}", sampled.bp);
            NormalizationMode::GenomeEquivalents {
                average_genome_size: ags,
                sampled_bases: sampled.bp,
            }
        }
        _ => NormalizationMode::Proportional,
    };

    let options = EstimateOptions {
        min_query_coverage: args.min_qcov,
        seed: args.seed,
        normalization,
        threads: args.threads,
    };

    let pb = spinner("blue", "Loading reference tables...");
    let refdata = ReferenceData::load(&reference_paths(&args))?;
    pb.finish_with_message(format!("Loaded {} genome clusters.", refdata.clusters.len()));

    let pb = spinner("green", "Classifying reads...");
    let results = estimate_from_alignments(&args.m8, &refdata, &options)?;
    let s = &results.summary;
    pb.finish_with_message(format!(
        "Classified {} reads ({} unique, {} ambiguous) from {} alignments.",
        s.reads_with_hits, s.unique_reads, s.ambiguous_reads, s.total_alignments
    ));

    let pb = spinner("yellow", "Writing abundance table...");
    write_abundance(&args.out, &results.abundance)?;
    pb.finish_with_message(format!("Wrote {}", args.out.display()));

    Ok(())
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    if let Err(e) = run(args) {
        log::error!("{e}");
        process::exit(1);
    }
}
