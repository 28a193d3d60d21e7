//! Background genome comparison jobs for OpenGenomeBrowser
//!
//! Similarity scores and core-genome dendrograms take minutes to hours to
//! compute. A request creates a persistent [`JobRecord`] in state RUNNING and
//! hands the computation to a bounded worker pool; callers poll the record
//! until it is DONE or FAILED.
//!
//! - [`JobManager`] is the only creation path and enqueues the worker
//! - [`JobStore`] implementations apply guarded status transitions
//! - [`tools`] wraps GenDisCal, OrthoANI, OrthoFinder and the dot-plot pipeline
//!
//! # Example
//!
//! ```no_run
//! use ogb_jobs::locator::DirectoryLocator;
//! use ogb_jobs::tools::gendiscal::{GenDisCal, GenDisCalConfig};
//! use ogb_jobs::{
//!     GenomeId, GenomePair, JobKind, JobManager, JobPoll, MemoryJobStore, PairwiseSimilarity,
//!     TaskRunner,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> ogb_jobs::Result<()> {
//! let computation = PairwiseSimilarity::new(
//!     JobKind::GenomeSimilarity,
//!     GenDisCal::new(GenDisCalConfig::default()),
//!     Arc::new(DirectoryLocator::new("/data/assemblies", "fna")),
//! )?;
//! let manager = JobManager::new(Arc::new(MemoryJobStore::new()), TaskRunner::default(), computation);
//!
//! let pair = GenomePair::new(GenomeId::new("FAM1079-i1-1")?, GenomeId::new("FAM10789-i1-1")?);
//! manager.get_or_create(pair.clone().into()).await?;
//! manager.runner().wait_idle().await;
//! if let JobPoll::Ready(output) = manager.poll(&pair.into()).await? {
//!     println!("{:?}", output.similarity());
//! }
//! # Ok(())
//! # }
//! ```

#![expect(
    clippy::missing_errors_doc,
    reason = "Error conditions are documented on the Error enum"
)]

pub mod backup;
mod computation;
mod error;
pub mod locator;
mod manager;
pub mod matrix;
mod runner;
pub mod store;
pub mod tools;
mod types;

pub use computation::{CoreGenomeDendrogram, JobComputation, PairwiseSimilarity};
pub use error::{Error, Result};
pub use manager::{JobManager, bulk_insert};
pub use runner::{DEFAULT_WORKERS, TaskRunner};
pub use store::{FileJobStore, JobStore, MemoryJobStore};
pub use types::{
    GenomeId, GenomePair, GenomeSet, JobKind, JobOutput, JobPoll, JobRecord, JobStatus, JobSubject,
};
