// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::path::{Path, PathBuf};

use crate::IngestError;

/// On-disk layout of the pipeline under one data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub root: PathBuf,
    pub raw: PathBuf,
    pub cleaned: PathBuf,
    pub enriched: PathBuf,
    pub combined: PathBuf,
}

impl DataLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            raw: root.join("raw"),
            cleaned: root.join("cleaned"),
            enriched: root.join("enriched"),
            combined: root.join("combined"),
            root,
        }
    }

    /// Creates every directory of the layout. Already-existing directories
    /// are left alone.
    pub fn ensure(&self) -> Result<(), IngestError> {
        for dir in [&self.root, &self.raw, &self.cleaned, &self.enriched, &self.combined] {
            fs::create_dir_all(dir)
                .map_err(|e| IngestError(format!("creating {}: {e}", dir.display())))?;
        }
        Ok(())
    }

    #[must_use]
    pub fn raw_articles(&self) -> PathBuf {
        self.raw.join("articles.json")
    }

    #[must_use]
    pub fn raw_authors(&self) -> PathBuf {
        self.raw.join("authors.json")
    }

    #[must_use]
    pub fn cleaned_articles(&self) -> PathBuf {
        self.cleaned.join("articles_cleaned.json")
    }

    #[must_use]
    pub fn cleaned_authors(&self) -> PathBuf {
        self.cleaned.join("authors_cleaned.json")
    }

    /// Part numbering is 1-based to match the part file names.
    #[must_use]
    pub fn enriched_part(&self, part: usize) -> PathBuf {
        self.enriched.join(format!("enriched_part_{part}.json.gz"))
    }

    #[must_use]
    pub fn enriched_manifest(&self) -> PathBuf {
        self.enriched.join("manifest.json")
    }

    #[must_use]
    pub fn combined_part(&self, part: usize) -> PathBuf {
        self.combined.join(format!("combined_part_{part}.json.gz"))
    }

    #[must_use]
    pub fn combined_manifest(&self) -> PathBuf {
        self.combined.join("manifest.json")
    }

    /// Part files present on disk, in part order.
    pub fn existing_parts(dir: &Path, prefix: &str) -> Vec<PathBuf> {
        let mut parts: Vec<PathBuf> = fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|entry| entry.path())
                    .filter(|path| {
                        path.file_name()
                            .and_then(|name| name.to_str())
                            .is_some_and(|name| {
                                name.starts_with(prefix) && name.ends_with(".json.gz")
                            })
                    })
                    .collect()
            })
            .unwrap_or_default();
        parts.sort();
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_creates_all_directories() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = DataLayout::new(tmp.path().join("data"));
        layout.ensure().expect("ensure layout");
        for dir in [&layout.raw, &layout.cleaned, &layout.enriched, &layout.combined] {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
        // A second run over the same tree is a no-op.
        layout.ensure().expect("ensure layout again");
    }

    #[test]
    fn existing_parts_filters_and_sorts() {
        let tmp = tempfile::tempdir().expect("tempdir");
        for name in ["enriched_part_2.json.gz", "enriched_part_1.json.gz", "manifest.json"] {
            std::fs::write(tmp.path().join(name), b"x").expect("write file");
        }
        let parts = DataLayout::existing_parts(tmp.path(), "enriched_part_");
        let names: Vec<_> = parts
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, ["enriched_part_1.json.gz", "enriched_part_2.json.gz"]);
    }
}
