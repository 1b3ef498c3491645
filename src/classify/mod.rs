pub mod assign_unique;
pub mod best_hits;
pub mod cluster_alignments;
pub mod reassign;

pub use assign_unique::{assign_unique, UniqueAssignment};
pub use best_hits::{
    passes_filters, resolve_best_hits, resolve_best_hits_parallel, BestHits, MIN_QUERY_COVERAGE,
};
pub use cluster_alignments::ClusterAlignments;
pub use reassign::{choose_candidate, reassign_ambiguous};
