//! Job records and their subjects

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a job record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Placeholder while a worker computes the result
    #[serde(rename = "R")]
    Running,
    /// Result available
    #[serde(rename = "D")]
    Done,
    /// The worker's tool invocation failed
    #[serde(rename = "F")]
    Failed,
}

impl JobStatus {
    /// Single-letter code used in storage
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Running => "R",
            Self::Done => "D",
            Self::Failed => "F",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "R" | "RUNNING" => Ok(Self::Running),
            "D" | "DONE" => Ok(Self::Done),
            "F" | "FAILED" => Ok(Self::Failed),
            _ => Err(Error::configuration(format!("unknown job status: {s}"))),
        }
    }
}

/// The computations tracked as jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Average nucleotide identity via OrthoANI
    Ani,
    /// Genome similarity via GenDisCal
    GenomeSimilarity,
    /// Core-genome dendrogram via OrthoFinder
    CoreGenomeDendrogram,
}

impl JobKind {
    /// Every kind, in storage order
    pub const ALL: [Self; 3] = [Self::Ani, Self::GenomeSimilarity, Self::CoreGenomeDendrogram];

    /// Name used for directories and on the command line
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ani => "ani",
            Self::GenomeSimilarity => "genome-similarity",
            Self::CoreGenomeDendrogram => "core-genome-dendrogram",
        }
    }

    /// True for kinds whose subject is a genome pair
    #[must_use]
    pub const fn is_pairwise(self) -> bool {
        matches!(self, Self::Ani | Self::GenomeSimilarity)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::configuration(format!("unknown job kind: {s}")))
    }
}

/// Identifier of one genome, e.g. `FAM13496-i1-1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GenomeId(String);

impl GenomeId {
    /// Validate an identifier.
    ///
    /// Identifiers are used in file names and in record identities, so
    /// whitespace, path separators and `:` are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id == "." || id == ".." {
            return Err(Error::configuration(format!("invalid genome identifier: {id:?}")));
        }
        if id
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '\\' | ':' | '\0'))
        {
            return Err(Error::configuration(format!(
                "genome identifier contains a reserved character: {id:?}"
            )));
        }
        Ok(Self(id))
    }

    /// The identifier text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GenomeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for GenomeId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<GenomeId> for String {
    fn from(value: GenomeId) -> Self {
        value.0
    }
}

/// Unordered genome pair, stored with the lexicographically smaller identifier first
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawPair")]
pub struct GenomePair {
    first: GenomeId,
    second: GenomeId,
}

#[derive(Deserialize)]
struct RawPair {
    first: GenomeId,
    second: GenomeId,
}

impl From<RawPair> for GenomePair {
    fn from(raw: RawPair) -> Self {
        Self::new(raw.first, raw.second)
    }
}

impl GenomePair {
    /// Build the canonical pair; `(a, b)` and `(b, a)` are equal
    #[must_use]
    pub fn new(a: GenomeId, b: GenomeId) -> Self {
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    /// The smaller identifier
    #[must_use]
    pub const fn first(&self) -> &GenomeId {
        &self.first
    }

    /// The larger identifier
    #[must_use]
    pub const fn second(&self) -> &GenomeId {
        &self.second
    }

    /// True if a genome is compared with itself
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.first == self.second
    }

    /// Record identity, `first:second`
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}:{}", self.first, self.second)
    }
}

impl fmt::Display for GenomePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :: {}", self.first, self.second)
    }
}

/// Set of genomes, sorted and free of duplicates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<GenomeId>", into = "Vec<GenomeId>")]
pub struct GenomeSet {
    members: Vec<GenomeId>,
}

impl GenomeSet {
    /// Sort and de-duplicate `members`
    #[must_use]
    pub fn new(members: impl IntoIterator<Item = GenomeId>) -> Self {
        let mut members: Vec<GenomeId> = members.into_iter().collect();
        members.sort();
        members.dedup();
        Self { members }
    }

    /// Members in sorted order
    #[must_use]
    pub fn members(&self) -> &[GenomeId] {
        &self.members
    }

    /// Number of distinct genomes
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True for the empty set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// SHA-224 hex digest of the members joined with single spaces (56 characters)
    #[must_use]
    pub fn id(&self) -> String {
        let joined = self
            .members
            .iter()
            .map(GenomeId::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        hex::encode(Sha224::digest(joined.as_bytes()))
    }
}

impl From<Vec<GenomeId>> for GenomeSet {
    fn from(members: Vec<GenomeId>) -> Self {
        Self::new(members)
    }
}

impl From<GenomeSet> for Vec<GenomeId> {
    fn from(set: GenomeSet) -> Self {
        set.members
    }
}

impl fmt::Display for GenomeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.members.iter().map(GenomeId::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// What a job computes over
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobSubject {
    /// Two genomes
    Pair(GenomePair),
    /// A set of genomes
    Set {
        /// Members of the set
        genomes: GenomeSet,
    },
}

impl JobSubject {
    /// Record identity
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::Pair(pair) => pair.id(),
            Self::Set { genomes } => genomes.id(),
        }
    }

    /// The pair, if this is a pairwise subject
    #[must_use]
    pub const fn as_pair(&self) -> Option<&GenomePair> {
        match self {
            Self::Pair(pair) => Some(pair),
            Self::Set { .. } => None,
        }
    }

    /// The set, if this is a set subject
    #[must_use]
    pub const fn as_set(&self) -> Option<&GenomeSet> {
        match self {
            Self::Pair(_) => None,
            Self::Set { genomes } => Some(genomes),
        }
    }

    /// Check that this subject fits `kind`
    pub fn validate_for(&self, kind: JobKind) -> Result<()> {
        match (self, kind.is_pairwise()) {
            (Self::Pair(_), true) => Ok(()),
            (Self::Set { genomes }, false) if genomes.len() >= 2 => Ok(()),
            (Self::Set { .. }, false) => Err(Error::invalid_subject(
                kind,
                "a dendrogram needs at least two distinct genomes",
            )),
            (Self::Pair(_), false) => {
                Err(Error::invalid_subject(kind, "expected a genome set"))
            }
            (Self::Set { .. }, true) => {
                Err(Error::invalid_subject(kind, "expected a genome pair"))
            }
        }
    }
}

impl From<GenomePair> for JobSubject {
    fn from(pair: GenomePair) -> Self {
        Self::Pair(pair)
    }
}

impl From<GenomeSet> for JobSubject {
    fn from(genomes: GenomeSet) -> Self {
        Self::Set { genomes }
    }
}

impl fmt::Display for JobSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pair(pair) => pair.fmt(f),
            Self::Set { genomes } => genomes.fmt(f),
        }
    }
}

/// Result payload of a finished job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum JobOutput {
    /// Similarity score, 1.0 meaning identical
    Similarity(f64),
    /// Dendrogram in Newick format
    Newick(String),
}

impl JobOutput {
    /// The similarity score, if this is one
    #[must_use]
    pub const fn similarity(&self) -> Option<f64> {
        match self {
            Self::Similarity(value) => Some(*value),
            Self::Newick(_) => None,
        }
    }

    /// The Newick tree, if this is one
    #[must_use]
    pub fn newick(&self) -> Option<&str> {
        match self {
            Self::Newick(tree) => Some(tree),
            Self::Similarity(_) => None,
        }
    }
}

/// Persistent status of one asynchronous computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job kind
    pub kind: JobKind,
    /// Subject of the computation
    pub subject: JobSubject,
    /// Current state
    pub status: JobStatus,
    /// Result, present only when DONE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,
    /// Failure diagnostics, present only when FAILED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Number of resets; only the worker of the current attempt may finish the record
    #[serde(default)]
    pub attempt: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the last status change
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// New placeholder in state RUNNING
    #[must_use]
    pub fn running(kind: JobKind, subject: JobSubject) -> Self {
        let now = Utc::now();
        Self {
            kind,
            subject,
            status: JobStatus::Running,
            output: None,
            message: None,
            attempt: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// New record that is already DONE
    #[must_use]
    pub fn done(kind: JobKind, subject: JobSubject, output: JobOutput) -> Self {
        let mut record = Self::running(kind, subject);
        record.status = JobStatus::Done;
        record.output = Some(output);
        record
    }

    /// Record identity
    #[must_use]
    pub fn id(&self) -> String {
        self.subject.id()
    }

    /// The result, only while DONE
    #[must_use]
    pub fn result(&self) -> Option<&JobOutput> {
        match self.status {
            JobStatus::Done => self.output.as_ref(),
            JobStatus::Running | JobStatus::Failed => None,
        }
    }

    fn check_attempt(&self, attempt: u32) -> Result<()> {
        if attempt == self.attempt {
            Ok(())
        } else {
            Err(Error::stale(
                self.kind,
                self.id(),
                format!("attempt {attempt}, record is at attempt {}", self.attempt),
                self.status,
            ))
        }
    }

    /// RUNNING → DONE for the current `attempt`; refused otherwise
    pub fn complete(&mut self, attempt: u32, output: JobOutput) -> Result<()> {
        self.check_attempt(attempt)?;
        if self.status != JobStatus::Running {
            return Err(Error::stale(self.kind, self.id(), "RUNNING", self.status));
        }
        self.status = JobStatus::Done;
        self.output = Some(output);
        self.message = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// RUNNING or FAILED → FAILED for the current `attempt`; a DONE record
    /// is left untouched
    pub fn fail(&mut self, attempt: u32, message: impl Into<String>) -> Result<()> {
        self.check_attempt(attempt)?;
        if self.status == JobStatus::Done {
            return Err(Error::stale(
                self.kind,
                self.id(),
                "RUNNING or FAILED",
                self.status,
            ));
        }
        self.status = JobStatus::Failed;
        self.output = None;
        self.message = Some(message.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Any state → RUNNING, clearing result and message and starting a new attempt
    pub fn reset(&mut self) {
        self.attempt = self.attempt.wrapping_add(1);
        self.status = JobStatus::Running;
        self.output = None;
        self.message = None;
        self.updated_at = Utc::now();
    }
}

/// What a caller polling a job should do next
#[derive(Debug, Clone, PartialEq)]
pub enum JobPoll {
    /// Still running; ask again later
    Pending,
    /// Finished with this result
    Ready(JobOutput),
    /// Failed; the message is kept for diagnostics
    Failed(Option<String>),
    /// No record exists
    Missing,
}

impl From<Option<JobRecord>> for JobPoll {
    fn from(record: Option<JobRecord>) -> Self {
        let Some(record) = record else {
            return Self::Missing;
        };
        match record.status {
            JobStatus::Running => Self::Pending,
            JobStatus::Failed => Self::Failed(record.message),
            // A DONE record without payload is treated as still pending
            JobStatus::Done => record.output.map_or(Self::Pending, Self::Ready),
        }
    }
}
