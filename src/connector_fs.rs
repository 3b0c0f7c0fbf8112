//! Filesystem source collector.
//!
//! Walks a root directory (or accepts a single file), applies
//! include/exclude globs, and emits one [`RawInput`] per matching file.
//! Ordering is deterministic: entries are sorted by relative path.

use anyhow::{bail, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::FilesystemSourceConfig;
use crate::document::{Metadata, RawInput};
use crate::sources::SourceCollector;

#[derive(Debug)]
pub struct FilesystemCollector {
    config: FilesystemSourceConfig,
}

impl FilesystemCollector {
    pub fn new(config: FilesystemSourceConfig) -> Self {
        Self { config }
    }

    fn scan(&self) -> Result<Vec<RawInput>> {
        let root = &self.config.root;
        if !root.exists() {
            bail!("filesystem root does not exist: {}", root.display());
        }

        if root.is_file() {
            return Ok(vec![file_input(root, &root.to_string_lossy())]);
        }

        let include_set = build_globset(&self.config.include_globs)?;
        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(self.config.exclude_globs.clone());
        let exclude_set = build_globset(&default_excludes)?;

        let mut inputs = Vec::new();
        let walker = WalkDir::new(root).follow_links(self.config.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if exclude_set.is_match(&rel_str) {
                continue;
            }
            if !include_set.is_match(&rel_str) {
                continue;
            }
            inputs.push(file_input(path, &rel_str));
        }

        inputs.sort_by(|a, b| a.source_id().cmp(&b.source_id()));
        Ok(inputs)
    }
}

#[async_trait]
impl SourceCollector for FilesystemCollector {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn collect(&self) -> Result<Vec<RawInput>> {
        self.scan()
    }
}

fn file_input(path: &Path, relative: &str) -> RawInput {
    let mut metadata = Metadata::new();
    metadata.insert("file_path".to_string(), relative.into());
    metadata.insert("source".to_string(), "filesystem".into());
    RawInput::file(path.to_path_buf(), metadata)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(root: &Path, include: &[&str], exclude: &[&str]) -> FilesystemSourceConfig {
        FilesystemSourceConfig {
            root: root.to_path_buf(),
            include_globs: include.iter().map(|s| s.to_string()).collect(),
            exclude_globs: exclude.iter().map(|s| s.to_string()).collect(),
            follow_symlinks: false,
        }
    }

    #[tokio::test]
    async fn walks_sorted_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("skip.log"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.md"), "c").unwrap();

        let collector = FilesystemCollector::new(config(
            dir.path(),
            &["**/*.txt", "**/*.md"],
            &[],
        ));
        let inputs = collector.collect().await.unwrap();
        let ids: Vec<String> = inputs.iter().map(|i| i.source_id()).collect();
        assert_eq!(inputs.len(), 3);
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert!(inputs.iter().all(|i| i.discriminator != "log"));
    }

    #[tokio::test]
    async fn exclude_globs_win() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.txt"), "k").unwrap();
        std::fs::write(dir.path().join("drop.txt"), "d").unwrap();

        let collector =
            FilesystemCollector::new(config(dir.path(), &["**/*.txt"], &["drop.txt"]));
        let inputs = collector.collect().await.unwrap();
        assert_eq!(inputs.len(), 1);
        assert!(inputs[0].source_id().ends_with("keep.txt"));
    }

    #[tokio::test]
    async fn single_file_root_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("only.txt");
        std::fs::write(&file, "solo").unwrap();

        let collector = FilesystemCollector::new(config(&file, &["**/*"], &[]));
        let inputs = collector.collect().await.unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].discriminator, "txt");
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let collector = FilesystemCollector::new(config(
            Path::new("/definitely/not/here"),
            &["**/*"],
            &[],
        ));
        assert!(collector.collect().await.is_err());
    }
}
