//! What a worker runs for each job kind

use crate::locator::AssemblyLocator;
use crate::tools::{DendrogramTool, SimilarityTool};
use crate::{Error, JobKind, JobOutput, JobSubject, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// The computation behind one job kind
#[async_trait]
pub trait JobComputation: Send + Sync + 'static {
    /// Kind of the records this computation fills
    fn kind(&self) -> JobKind;

    /// Result known without running a tool, e.g. a genome compared with itself
    fn trivial_output(&self, subject: &JobSubject) -> Option<JobOutput> {
        subject
            .as_pair()
            .filter(|pair| pair.is_identity())
            .map(|_| JobOutput::Similarity(1.0))
    }

    /// Run the external tool
    async fn compute(&self, subject: &JobSubject) -> Result<JobOutput>;
}

#[async_trait]
impl JobComputation for Box<dyn JobComputation> {
    fn kind(&self) -> JobKind {
        (**self).kind()
    }

    fn trivial_output(&self, subject: &JobSubject) -> Option<JobOutput> {
        (**self).trivial_output(subject)
    }

    async fn compute(&self, subject: &JobSubject) -> Result<JobOutput> {
        (**self).compute(subject).await
    }
}

/// Pairwise similarity of two assemblies (ANI or GenDisCal)
pub struct PairwiseSimilarity<T> {
    kind: JobKind,
    tool: T,
    locator: Arc<dyn AssemblyLocator>,
}

impl<T: SimilarityTool> PairwiseSimilarity<T> {
    /// Computation for the pairwise `kind` using `tool`
    pub fn new(kind: JobKind, tool: T, locator: Arc<dyn AssemblyLocator>) -> Result<Self> {
        if !kind.is_pairwise() {
            return Err(Error::configuration(format!(
                "{kind} is not a pairwise job kind"
            )));
        }
        Ok(Self {
            kind,
            tool,
            locator,
        })
    }
}

#[async_trait]
impl<T: SimilarityTool + 'static> JobComputation for PairwiseSimilarity<T> {
    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn compute(&self, subject: &JobSubject) -> Result<JobOutput> {
        let pair = subject
            .as_pair()
            .ok_or_else(|| Error::invalid_subject(self.kind, "expected a genome pair"))?;
        let first = self.locator.assembly(pair.first())?;
        let second = self.locator.assembly(pair.second())?;
        tracing::debug!(tool = self.tool.name(), %pair, "Calculating similarity");
        let similarity = self.tool.similarity(&first, &second).await?;
        Ok(JobOutput::Similarity(similarity))
    }
}

/// Core-genome dendrogram over a genome set
pub struct CoreGenomeDendrogram<T> {
    tool: T,
}

impl<T: DendrogramTool> CoreGenomeDendrogram<T> {
    /// Computation using `tool`
    pub const fn new(tool: T) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl<T: DendrogramTool + 'static> JobComputation for CoreGenomeDendrogram<T> {
    fn kind(&self) -> JobKind {
        JobKind::CoreGenomeDendrogram
    }

    async fn compute(&self, subject: &JobSubject) -> Result<JobOutput> {
        let set = subject.as_set().ok_or_else(|| {
            Error::invalid_subject(JobKind::CoreGenomeDendrogram, "expected a genome set")
        })?;
        tracing::debug!(tool = self.tool.name(), %set, "Calculating dendrogram");
        let newick = self.tool.dendrogram(set.members()).await?;
        Ok(JobOutput::Newick(newick))
    }
}
