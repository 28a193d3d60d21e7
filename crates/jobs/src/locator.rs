//! Resolving genome identifiers to assembly FASTA files

use crate::{Error, GenomeId, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Finds the assembly FASTA of a genome
pub trait AssemblyLocator: Send + Sync {
    /// Path of the assembly of `genome`
    fn assembly(&self, genome: &GenomeId) -> Result<PathBuf>;
}

/// Assemblies stored as `<dir>/<identifier>.<extension>`
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    dir: PathBuf,
    extension: String,
}

impl DirectoryLocator {
    /// Locator over `dir` with file extension `extension` (without dot)
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }
}

impl AssemblyLocator for DirectoryLocator {
    fn assembly(&self, genome: &GenomeId) -> Result<PathBuf> {
        let path = self
            .dir
            .join(format!("{}.{}", genome.as_str(), self.extension));
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::UnknownGenome {
                id: genome.to_string(),
            })
        }
    }
}

/// Explicit identifier → path table
#[derive(Debug, Clone, Default)]
pub struct MapLocator {
    paths: BTreeMap<GenomeId, PathBuf>,
}

impl MapLocator {
    /// Locator over a prepared table
    #[must_use]
    pub const fn new(paths: BTreeMap<GenomeId, PathBuf>) -> Self {
        Self { paths }
    }

    /// Add or replace one entry
    pub fn insert(&mut self, genome: GenomeId, path: impl Into<PathBuf>) {
        self.paths.insert(genome, path.into());
    }
}

impl AssemblyLocator for MapLocator {
    fn assembly(&self, genome: &GenomeId) -> Result<PathBuf> {
        self.paths.get(genome).cloned().ok_or_else(|| Error::UnknownGenome {
            id: genome.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn directory_locator_requires_existing_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("FAM1.fna"), b">c1\nACGT\n").unwrap();
        let locator = DirectoryLocator::new(tmp.path(), "fna");

        let found = locator.assembly(&GenomeId::new("FAM1").unwrap()).unwrap();
        assert_eq!(found, tmp.path().join("FAM1.fna"));
        assert!(matches!(
            locator.assembly(&GenomeId::new("FAM2").unwrap()),
            Err(Error::UnknownGenome { .. })
        ));
    }

    #[test]
    fn map_locator_lookup() {
        let mut locator = MapLocator::default();
        locator.insert(GenomeId::new("a").unwrap(), "/data/a.fna");
        assert_eq!(
            locator.assembly(&GenomeId::new("a").unwrap()).unwrap(),
            PathBuf::from("/data/a.fna")
        );
        assert!(locator.assembly(&GenomeId::new("b").unwrap()).is_err());
    }
}
