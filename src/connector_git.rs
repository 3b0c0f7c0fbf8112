//! Git repository source collector.
//!
//! Clones the configured repository into a temporary directory (shallow by
//! default), filters files by extension, and emits [`RawInput`]s pointing
//! into the checkout. The collector owns the temporary directory so the
//! checkout outlives parsing; it is removed when the collector is dropped.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;
use tempfile::TempDir;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::GitSourceConfig;
use crate::document::{discriminator_for_path, Metadata, RawInput};
use crate::sources::SourceCollector;

/// Extensions skipped when no include/exclude filters are configured.
/// Binary assets that rarely carry indexable text; repositories wanting
/// image OCR opt in via `include_extensions`.
const DEFAULT_SKIP_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "svg", "zip", "gz", "tar", "exe", "dll", "so", "bin",
    "woff", "woff2", "ttf", "lock",
];

#[derive(Debug)]
pub struct GitCollector {
    config: GitSourceConfig,
    // Keeps the checkout alive until the pipeline run finishes.
    checkout: Mutex<Option<TempDir>>,
}

impl GitCollector {
    pub fn new(config: GitSourceConfig) -> Self {
        Self {
            config,
            checkout: Mutex::new(None),
        }
    }

    fn clone_repository(&self) -> Result<TempDir> {
        let dir = TempDir::with_prefix("vforge-git-")
            .context("failed to create temporary clone directory")?;
        info!(url = %self.config.url, dest = %dir.path().display(), "cloning repository");

        let mut cmd = Command::new("git");
        cmd.arg("clone");
        if self.config.shallow {
            cmd.args(["--depth", "1"]);
        }
        if let Some(branch) = &self.config.branch {
            cmd.args(["--branch", branch, "--single-branch"]);
        }
        cmd.arg(&self.config.url);
        cmd.arg(dir.path());

        let output = cmd.output().context("failed to run git clone")?;
        if !output.status.success() {
            bail!(
                "git clone of {} failed: {}",
                self.config.url,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(dir)
    }

    fn extension_allowed(&self, ext: &str) -> bool {
        if self
            .config
            .exclude_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
        {
            return false;
        }
        if !self.config.include_extensions.is_empty() {
            return self
                .config
                .include_extensions
                .iter()
                .any(|e| e.eq_ignore_ascii_case(ext));
        }
        if self.config.exclude_extensions.is_empty() {
            return !DEFAULT_SKIP_EXTENSIONS.contains(&ext);
        }
        true
    }

    fn walk_checkout(&self, root: &Path, head_sha: &str) -> Result<Vec<RawInput>> {
        let mut inputs = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();
            if rel_str.starts_with(".git/") || rel_str.contains("/.git/") {
                continue;
            }

            let ext = discriminator_for_path(path);
            if !self.extension_allowed(&ext) {
                debug!(path = %rel_str, "skipping filtered extension");
                continue;
            }

            let mut metadata = Metadata::new();
            metadata.insert("file_path".to_string(), rel_str.into());
            metadata.insert("source".to_string(), "git".into());
            metadata.insert("repository".to_string(), self.config.url.clone().into());
            metadata.insert("commit".to_string(), head_sha.into());
            inputs.push(RawInput::file(path.to_path_buf(), metadata));
        }

        inputs.sort_by(|a, b| a.source_id().cmp(&b.source_id()));
        if let Some(max) = self.config.max_files {
            inputs.truncate(max);
        }
        Ok(inputs)
    }
}

#[async_trait]
impl SourceCollector for GitCollector {
    fn name(&self) -> &str {
        "git"
    }

    async fn collect(&self) -> Result<Vec<RawInput>> {
        let checkout = self.clone_repository()?;
        let head_sha = git_head_sha(checkout.path()).unwrap_or_else(|_| "unknown".to_string());
        let inputs = self.walk_checkout(checkout.path(), &head_sha)?;
        info!(
            url = %self.config.url,
            files = inputs.len(),
            commit = %head_sha,
            "repository scan complete"
        );
        *self
            .checkout
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(checkout);
        Ok(inputs)
    }
}

fn git_head_sha(repo: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo)
        .output()
        .context("failed to run git rev-parse")?;
    if !output.status.success() {
        bail!("git rev-parse failed");
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector(include: &[&str], exclude: &[&str]) -> GitCollector {
        GitCollector::new(GitSourceConfig {
            url: "https://example.com/repo.git".to_string(),
            branch: None,
            include_extensions: include.iter().map(|s| s.to_string()).collect(),
            exclude_extensions: exclude.iter().map(|s| s.to_string()).collect(),
            max_files: None,
            shallow: true,
        })
    }

    #[test]
    fn exclude_wins_over_include() {
        let c = collector(&["md", "rs"], &["rs"]);
        assert!(c.extension_allowed("md"));
        assert!(!c.extension_allowed("rs"));
        assert!(!c.extension_allowed("txt"));
    }

    #[test]
    fn default_filter_skips_binary_assets() {
        let c = collector(&[], &[]);
        assert!(c.extension_allowed("md"));
        assert!(c.extension_allowed("rs"));
        assert!(!c.extension_allowed("png"));
        assert!(!c.extension_allowed("zip"));
    }

    #[test]
    fn explicit_exclude_disables_default_skip_list() {
        let c = collector(&[], &["md"]);
        assert!(!c.extension_allowed("md"));
        assert!(c.extension_allowed("png"));
    }

    #[test]
    fn max_files_caps_sorted_walk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        std::fs::write(dir.path().join("b.md"), "b").unwrap();
        std::fs::write(dir.path().join("c.md"), "c").unwrap();

        let mut c = collector(&["md"], &[]);
        c.config.max_files = Some(2);
        let inputs = c.walk_checkout(dir.path(), "deadbeef").unwrap();
        assert_eq!(inputs.len(), 2);
        assert!(inputs[0].source_id().ends_with("a.md"));
        assert_eq!(inputs[0].metadata.get("commit").unwrap(), "deadbeef");
    }
}
