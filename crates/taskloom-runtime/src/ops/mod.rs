mod build;
mod index;
mod reconstruct;

pub use build::{BuildProgress, BuildService, BuildSummary};
pub use index::{IndexProgress, IndexService, IndexSummary};
pub use reconstruct::{ReconstructProgress, ReconstructService, ReconstructSummary};
