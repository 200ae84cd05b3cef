//! Asset copier: the entry HTML and the public directory.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::BuildError;
use crate::output::OutputDir;
use crate::pipeline::Stage;
use crate::source::SourceTree;

/// Summary of the copy stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    /// Files copied, including the entry HTML
    pub copied: usize,
    /// Public files that could not be copied
    pub skipped: Vec<PathBuf>,
}

/// Copies static inputs into the output directory unchanged.
pub struct AssetCopier<'a> {
    tree: &'a SourceTree,
}

impl<'a> AssetCopier<'a> {
    pub fn new(tree: &'a SourceTree) -> Self {
        Self { tree }
    }

    /// Copy the entry HTML to `index.html`, then merge the public directory
    /// into the output root.
    ///
    /// Failing to copy the entry HTML is fatal. Public files that cannot be
    /// read or would overwrite another artifact are skipped with a warning.
    pub async fn copy(&self, out: &mut OutputDir) -> Result<CopyReport, BuildError> {
        let mut report = CopyReport::default();

        let html = tokio::fs::read(&self.tree.entry_html)
            .await
            .map_err(|e| BuildError::Read {
                path: self.tree.entry_html.clone(),
                message: e.to_string(),
            })?;
        out.write("index.html", &html, Stage::CopyAssets).await?;
        report.copied += 1;

        let Some(public) = &self.tree.public_dir else {
            return Ok(report);
        };
        if !public.is_dir() {
            tracing::debug!("No public directory at {}", public.display());
            return Ok(report);
        }

        for file in public_files(public) {
            let relative = match file.strip_prefix(public) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => continue,
            };

            if out.get(&relative).is_some() {
                tracing::warn!(
                    "Skipping public file {}: {} is already produced by the build",
                    file.display(),
                    relative.display()
                );
                report.skipped.push(file);
                continue;
            }

            let contents = match tokio::fs::read(&file).await {
                Ok(contents) => contents,
                Err(e) => {
                    tracing::warn!("Skipping public file {}: {}", file.display(), e);
                    report.skipped.push(file);
                    continue;
                }
            };

            match out.write(&relative, &contents, Stage::CopyAssets).await {
                Ok(_) => report.copied += 1,
                Err(e) => {
                    tracing::warn!("Skipping public file {}: {}", file.display(), e);
                    report.skipped.push(file);
                }
            }
        }

        Ok(report)
    }
}

/// Every non-directory entry under `dir`, in a stable order.
fn public_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable public entry: {}", e);
                None
            }
        })
        .filter(|entry| !entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn site(with_public: bool) -> (TempDir, SourceTree) {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("index.html"), "<html></html>").unwrap();
        fs::write(temp.path().join("src/main.jsx"), "").unwrap();
        fs::write(temp.path().join("src/index.css"), "").unwrap();
        if with_public {
            fs::create_dir_all(temp.path().join("public/img")).unwrap();
            fs::write(temp.path().join("public/favicon.ico"), [0u8, 1, 2]).unwrap();
            fs::write(temp.path().join("public/img/logo.svg"), "<svg/>").unwrap();
        }

        let tree = SourceTree::resolve(&BuildConfig {
            root: temp.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
        (temp, tree)
    }

    #[tokio::test]
    async fn copies_entry_html_and_public_files() {
        let (temp, tree) = site(true);
        let mut out = OutputDir::create(&tree.output_dir).await.unwrap();

        let report = AssetCopier::new(&tree).copy(&mut out).await.unwrap();

        assert_eq!(report.copied, 3);
        assert!(report.skipped.is_empty());
        assert_eq!(
            fs::read(temp.path().join("dist/favicon.ico")).unwrap(),
            vec![0u8, 1, 2]
        );
        assert!(temp.path().join("dist/img/logo.svg").exists());
        assert_eq!(
            fs::read_to_string(temp.path().join("dist/index.html")).unwrap(),
            "<html></html>"
        );
    }

    #[tokio::test]
    async fn absent_public_directory_is_a_no_op() {
        let (temp, tree) = site(false);
        let mut out = OutputDir::create(&tree.output_dir).await.unwrap();

        let report = AssetCopier::new(&tree).copy(&mut out).await.unwrap();

        assert_eq!(report, CopyReport { copied: 1, skipped: vec![] });
        assert!(temp.path().join("dist/index.html").exists());
    }

    #[tokio::test]
    async fn public_index_html_does_not_replace_entry() {
        let (temp, tree) = site(true);
        fs::write(temp.path().join("public/index.html"), "<p>stale</p>").unwrap();
        let mut out = OutputDir::create(&tree.output_dir).await.unwrap();

        let report = AssetCopier::new(&tree).copy(&mut out).await.unwrap();

        assert_eq!(report.skipped, vec![temp.path().join("public/index.html")]);
        assert_eq!(
            fs::read_to_string(temp.path().join("dist/index.html")).unwrap(),
            "<html></html>"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_public_file_is_skipped() {
        let (temp, tree) = site(true);
        std::os::unix::fs::symlink(
            temp.path().join("does-not-exist"),
            temp.path().join("public/broken.txt"),
        )
        .unwrap();
        let mut out = OutputDir::create(&tree.output_dir).await.unwrap();

        let report = AssetCopier::new(&tree).copy(&mut out).await.unwrap();

        assert_eq!(report.skipped, vec![temp.path().join("public/broken.txt")]);
        assert_eq!(report.copied, 3);
        assert!(!temp.path().join("dist/broken.txt").exists());
    }
}
