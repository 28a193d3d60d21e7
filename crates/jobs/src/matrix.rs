//! Progress of an all-against-all similarity computation

use crate::computation::JobComputation;
use crate::manager::JobManager;
use crate::{Error, GenomeId, GenomePair, JobStatus, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Symmetric distance matrix (`1 - similarity`, zero diagonal)
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    labels: Vec<GenomeId>,
    values: Vec<Vec<f64>>,
}

impl DistanceMatrix {
    /// Row and column labels, sorted
    #[must_use]
    pub fn labels(&self) -> &[GenomeId] {
        &self.labels
    }

    /// Rows of distances, in label order
    #[must_use]
    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    /// Distance between labels `i` and `j`
    #[must_use]
    pub fn distance(&self, i: usize, j: usize) -> Option<f64> {
        self.values.get(i)?.get(j).copied()
    }

    /// CSV with a header row and one labelled row per genome
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for label in &self.labels {
            let _ = write!(out, ",{label}");
        }
        out.push('\n');
        for (label, row) in self.labels.iter().zip(&self.values) {
            out.push_str(label.as_str());
            for value in row {
                let _ = write!(out, ",{value}");
            }
            out.push('\n');
        }
        out
    }
}

/// Counts over all pairs of a genome set
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityProgress {
    /// Number of unordered pairs
    pub total: usize,
    /// Pairs with a result
    pub done: usize,
    /// Pairs still computing
    pub running: usize,
    /// Pairs whose computation failed
    pub failed: usize,
    /// Present once every pair is done
    pub matrix: Option<DistanceMatrix>,
}

impl SimilarityProgress {
    /// True once every pair is done
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.done == self.total
    }
}

/// Look up, or start, the similarity of every unordered pair in `genomes`.
///
/// Identifiers are sorted and de-duplicated first. Missing records are
/// created through [`JobManager::get_or_create`], so calling this repeatedly
/// drives the computation to completion.
pub async fn similarity_progress<C: JobComputation>(
    manager: &JobManager<C>,
    genomes: impl IntoIterator<Item = GenomeId>,
) -> Result<SimilarityProgress> {
    let kind = manager.kind();
    if !kind.is_pairwise() {
        return Err(Error::invalid_subject(
            kind,
            "similarity matrices need a pairwise job kind",
        ));
    }

    let mut labels: Vec<GenomeId> = genomes.into_iter().collect();
    labels.sort();
    labels.dedup();

    let mut progress = SimilarityProgress {
        total: 0,
        done: 0,
        running: 0,
        failed: 0,
        matrix: None,
    };
    let mut similarities = BTreeMap::new();

    for (i, first) in labels.iter().enumerate() {
        for second in &labels[i + 1..] {
            progress.total += 1;
            let pair = GenomePair::new(first.clone(), second.clone());
            let (record, _) = manager.get_or_create(pair.into()).await?;
            match record.status {
                JobStatus::Running => progress.running += 1,
                JobStatus::Failed => progress.failed += 1,
                JobStatus::Done => match record.output.as_ref().and_then(|o| o.similarity()) {
                    Some(similarity) => {
                        progress.done += 1;
                        similarities.insert((first, second), similarity);
                    }
                    None => progress.running += 1,
                },
            }
        }
    }

    tracing::debug!(
        kind = %kind,
        total = progress.total,
        done = progress.done,
        running = progress.running,
        failed = progress.failed,
        "Similarity progress"
    );

    if progress.is_complete() {
        let values = labels
            .iter()
            .map(|row| {
                labels
                    .iter()
                    .map(|col| {
                        let key = if row <= col { (row, col) } else { (col, row) };
                        similarities.get(&key).map_or(0.0, |s| 1.0 - s)
                    })
                    .collect()
            })
            .collect();
        progress.matrix = Some(DistanceMatrix { labels, values });
    }
    Ok(progress)
}
