//! Export and import of pairwise similarities as tab-separated text
//!
//! One line per DONE record:
//!
//! ```text
//! FAM10789-i1-1	FAM1079-i1-1	0.9871
//! ```

use crate::manager::bulk_insert;
use crate::store::JobStore;
use crate::{Error, GenomeId, GenomePair, JobKind, JobOutput, JobRecord, JobStatus, Result};
use std::fmt::Write as _;
use std::path::Path;
use tokio::io::AsyncWriteExt;

fn require_pairwise(kind: JobKind) -> Result<()> {
    if kind.is_pairwise() {
        Ok(())
    } else {
        Err(Error::invalid_subject(
            kind,
            "only pairwise similarities can be backed up",
        ))
    }
}

/// Write every DONE record of `kind` to `path`, which must not exist yet.
///
/// Returns the number of lines written.
pub async fn backup_similarities(store: &dyn JobStore, kind: JobKind, path: &Path) -> Result<usize> {
    require_pairwise(kind)?;

    let mut out = String::new();
    let mut count = 0;
    for record in store.list(kind, Some(JobStatus::Done)).await? {
        let (Some(pair), Some(similarity)) = (
            record.subject.as_pair(),
            record.result().and_then(JobOutput::similarity),
        ) else {
            continue;
        };
        let _ = writeln!(out, "{}\t{}\t{similarity}", pair.first(), pair.second());
        count += 1;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| Error::io(e, path, "create"))?;
    file.write_all(out.as_bytes())
        .await
        .map_err(|e| Error::io(e, path, "write"))?;
    file.flush().await.map_err(|e| Error::io(e, path, "flush"))?;

    tracing::info!(%kind, count, path = %path.display(), "Backed up similarities");
    Ok(count)
}

/// Parse backup text into DONE records of `kind`
pub fn parse_similarities(kind: JobKind, text: &str) -> Result<Vec<JobRecord>> {
    require_pairwise(kind)?;

    let mut records = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let invalid = |what: &str| {
            Error::serialization(format!("line {}: {what}: {line:?}", number + 1))
        };

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [first, second, similarity] = fields.as_slice() else {
            return Err(invalid("expected three columns"));
        };
        let similarity: f64 = similarity
            .parse()
            .map_err(|_| invalid("invalid similarity"))?;
        if !(0.0..=1.0).contains(&similarity) {
            return Err(invalid("similarity out of range"));
        }
        let pair = GenomePair::new(GenomeId::new(*first)?, GenomeId::new(*second)?);
        records.push(JobRecord::done(
            kind,
            pair.into(),
            JobOutput::Similarity(similarity),
        ));
    }
    Ok(records)
}

/// Load a backup written by [`backup_similarities`] into `store`.
///
/// Returns the number of records inserted.
pub async fn import_similarities(
    store: &dyn JobStore,
    kind: JobKind,
    path: &Path,
    ignore_conflicts: bool,
) -> Result<usize> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io(e, path, "read"))?;
    let records = parse_similarities(kind, &text)?;
    let inserted = bulk_insert(store, records, ignore_conflicts).await?;
    tracing::info!(%kind, inserted, path = %path.display(), "Imported similarities");
    Ok(inserted)
}
