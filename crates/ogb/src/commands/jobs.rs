//! `ogb jobs ...`
//!
//! Workers run inside this process, so every command that enqueues work
//! drains the pool before returning. `--wait` only decides whether the
//! reported state is taken before or after that.

use super::Context;
use crate::cli::{CliError, JobsCommands};
use ogb_jobs::backup::{backup_similarities, import_similarities};
use ogb_jobs::matrix::{SimilarityProgress, similarity_progress};
use ogb_jobs::tools::gendiscal::GenDisCal;
use ogb_jobs::tools::lock::ToolLock;
use ogb_jobs::tools::orthoani::OrthoAni;
use ogb_jobs::tools::orthofinder::OrthoFinder;
use ogb_jobs::{
    CoreGenomeDendrogram, FileJobStore, GenomeId, GenomePair, GenomeSet, JobComputation, JobKind,
    JobManager, JobOutput, JobRecord, JobStatus, JobStore, JobSubject, PairwiseSimilarity,
    TaskRunner,
};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

/// Lock file serializing OrthoFinder runs, inside the state directory
pub const ORTHOFINDER_LOCK: &str = "orthofinder.lock";

type Manager = JobManager<Box<dyn JobComputation>>;

/// Run a jobs subcommand
pub async fn execute(command: JobsCommands, ctx: &Context) -> Result<(), CliError> {
    match command {
        JobsCommands::Similarity {
            first,
            second,
            kind,
            wait,
        } => {
            let pair = GenomePair::new(GenomeId::new(first)?, GenomeId::new(second)?);
            get_or_create(ctx, kind, pair.into(), wait).await
        }
        JobsCommands::Dendrogram { genomes, wait } => {
            let set = GenomeSet::new(parse_genomes(genomes)?);
            get_or_create(ctx, JobKind::CoreGenomeDendrogram, set.into(), wait).await
        }
        JobsCommands::Status { kind, status } => {
            let records = open_store(ctx)?.list(kind, status).await?;
            ctx.emit(&records, || render_records(&records))
        }
        JobsCommands::Reload { kind, subjects } => reload(ctx, kind, &subjects).await,
        JobsCommands::Purge { kind, status } => {
            if status == JobStatus::Done {
                return Err(CliError::config_with_help(
                    "Refusing to purge finished jobs",
                    "Purge RUNNING (R) or FAILED (F) records",
                ));
            }
            let removed = open_store(ctx)?.purge(kind, status).await?;
            tracing::info!(%kind, %status, removed, "Purged jobs");
            ctx.emit(&serde_json::json!({ "removed": removed }), || {
                format!("Removed {removed} {status} {kind} jobs")
            })
        }
        JobsCommands::Backup { file, kind } => {
            let count = backup_similarities(open_store(ctx)?.as_ref(), kind, &file).await?;
            ctx.emit(&serde_json::json!({ "written": count }), || {
                format!("Wrote {count} similarities to {}", file.display())
            })
        }
        JobsCommands::Import {
            file,
            kind,
            ignore_conflicts,
        } => {
            let store = open_store(ctx)?;
            let count = import_similarities(store.as_ref(), kind, &file, ignore_conflicts).await?;
            ctx.emit(&serde_json::json!({ "inserted": count }), || {
                format!("Imported {count} similarities from {}", file.display())
            })
        }
        JobsCommands::Matrix {
            genomes,
            kind,
            wait,
        } => matrix(ctx, kind, parse_genomes(genomes)?, wait).await,
    }
}

fn parse_genomes(ids: Vec<String>) -> Result<Vec<GenomeId>, CliError> {
    ids.into_iter()
        .map(|id| GenomeId::new(id).map_err(CliError::from))
        .collect()
}

/// Parse `first:second` for pairwise kinds and `a,b,c` for set kinds
pub fn parse_subject(kind: JobKind, raw: &str) -> Result<JobSubject, CliError> {
    if kind.is_pairwise() {
        let (first, second) = raw.split_once(':').ok_or_else(|| {
            CliError::config_with_help(
                format!("Invalid pair {raw:?}"),
                "Write pairs as first:second",
            )
        })?;
        Ok(GenomePair::new(GenomeId::new(first)?, GenomeId::new(second)?).into())
    } else {
        let members = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(GenomeId::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GenomeSet::new(members).into())
    }
}

fn open_store(ctx: &Context) -> Result<Arc<dyn JobStore>, CliError> {
    let dir = ctx.settings.state_dir()?;
    tracing::debug!(state_dir = %dir.display(), "Opened job store");
    Ok(Arc::new(FileJobStore::new(dir)))
}

/// Computation for `kind` built from the configured tools
pub fn computation(ctx: &Context, kind: JobKind) -> Result<Box<dyn JobComputation>, CliError> {
    let tools = &ctx.settings.tools;
    Ok(match kind {
        JobKind::Ani => Box::new(PairwiseSimilarity::new(
            kind,
            OrthoAni::new(tools.orthoani.clone()),
            ctx.settings.locator()?,
        )?),
        JobKind::GenomeSimilarity => Box::new(PairwiseSimilarity::new(
            kind,
            GenDisCal::new(tools.gendiscal.clone()),
            ctx.settings.locator()?,
        )?),
        JobKind::CoreGenomeDendrogram => {
            let lock = ToolLock::new(ctx.settings.state_dir()?.join(ORTHOFINDER_LOCK));
            Box::new(CoreGenomeDendrogram::new(OrthoFinder::new(
                tools.orthofinder.clone(),
                lock,
            )))
        }
    })
}

fn manager(ctx: &Context, kind: JobKind) -> Result<Manager, CliError> {
    Ok(JobManager::new(
        open_store(ctx)?,
        TaskRunner::new(ctx.settings.jobs.workers),
        computation(ctx, kind)?,
    ))
}

async fn drain(manager: &Manager) {
    let pending = manager.runner().pending();
    if pending > 0 {
        tracing::info!(pending, "Waiting for background jobs");
    }
    manager.runner().wait_idle().await;
}

async fn get_or_create(
    ctx: &Context,
    kind: JobKind,
    subject: JobSubject,
    wait: bool,
) -> Result<(), CliError> {
    let manager = manager(ctx, kind)?;
    let (record, created) = manager.get_or_create(subject.clone()).await?;
    if created {
        tracing::info!(%kind, id = %record.id(), "Started job");
    }

    let record = if wait {
        drain(&manager).await;
        manager.get(&subject).await?.unwrap_or(record)
    } else {
        record
    };
    ctx.emit(&record, || render_record(&record))?;
    if !wait {
        drain(&manager).await;
    }
    Ok(())
}

async fn reload(ctx: &Context, kind: JobKind, subjects: &[String]) -> Result<(), CliError> {
    let subjects = subjects
        .iter()
        .map(|raw| parse_subject(kind, raw))
        .collect::<Result<Vec<_>, _>>()?;
    let manager = manager(ctx, kind)?;
    for subject in &subjects {
        manager.reload(subject.clone()).await?;
    }
    drain(&manager).await;

    let mut records = Vec::new();
    for subject in &subjects {
        if let Some(record) = manager.get(subject).await? {
            records.push(record);
        }
    }
    ctx.emit(&records, || render_records(&records))
}

#[derive(Serialize)]
struct MatrixView<'a> {
    total: usize,
    done: usize,
    running: usize,
    failed: usize,
    complete: bool,
    labels: Option<Vec<&'a str>>,
    distances: Option<&'a [Vec<f64>]>,
}

impl<'a> From<&'a SimilarityProgress> for MatrixView<'a> {
    fn from(p: &'a SimilarityProgress) -> Self {
        Self {
            total: p.total,
            done: p.done,
            running: p.running,
            failed: p.failed,
            complete: p.is_complete(),
            labels: p
                .matrix
                .as_ref()
                .map(|m| m.labels().iter().map(GenomeId::as_str).collect()),
            distances: p.matrix.as_ref().map(|m| m.values()),
        }
    }
}

async fn matrix(
    ctx: &Context,
    kind: JobKind,
    genomes: Vec<GenomeId>,
    wait: bool,
) -> Result<(), CliError> {
    let manager = manager(ctx, kind)?;
    let mut progress = similarity_progress(&manager, genomes.iter().cloned()).await?;
    if wait && !progress.is_complete() {
        drain(&manager).await;
        progress = similarity_progress(&manager, genomes).await?;
    }

    ctx.emit(&MatrixView::from(&progress), || {
        let mut out = format!(
            "{}/{} done, {} running, {} failed\n",
            progress.done, progress.total, progress.running, progress.failed
        );
        if let Some(matrix) = &progress.matrix {
            out.push_str(&matrix.to_csv());
        }
        out
    })?;
    drain(&manager).await;
    Ok(())
}

fn render_record(record: &JobRecord) -> String {
    let detail = match (&record.status, &record.output, &record.message) {
        (JobStatus::Done, Some(JobOutput::Similarity(value)), _) => value.to_string(),
        (JobStatus::Done, Some(JobOutput::Newick(tree)), _) => tree.clone(),
        (JobStatus::Failed, _, Some(message)) => message.clone(),
        _ => String::new(),
    };
    format!("{}\t{}\t{}\t{detail}", record.kind, record.subject, record.status)
}

fn render_records(records: &[JobRecord]) -> String {
    records.iter().fold(String::new(), |mut out, r| {
        let _ = writeln!(out, "{}", render_record(r));
        out
    })
}
