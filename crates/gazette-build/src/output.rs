//! Output directory ledger.
//!
//! Every file a build produces goes through [`OutputDir::write`], which
//! records an [`Artifact`] and refuses to silently overwrite a file another
//! stage already produced.

use std::path::{Component, Path, PathBuf};

use gazette_bundler::mime_for_path;
use serde::Serialize;

use crate::error::OutputError;
use crate::pipeline::Stage;

/// The one artifact a later stage may rewrite.
const ENTRY_HTML: &str = "index.html";

/// A file written to the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    /// Path relative to the output directory
    pub path: PathBuf,
    /// Stage that produced it
    pub stage: Stage,
    /// Size in bytes
    pub bytes: u64,
    /// Content type implied by the extension
    pub content_type: &'static str,
}

/// The build output directory and the artifacts written to it so far.
#[derive(Debug)]
pub struct OutputDir {
    root: PathBuf,
    artifacts: Vec<Artifact>,
}

impl OutputDir {
    /// Create the output directory if absent. Existing contents are kept.
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self, OutputError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| OutputError::Create {
                path: root.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            root,
            artifacts: Vec::new(),
        })
    }

    /// Absolute path of the output directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// The artifact recorded for `path`, if any.
    pub fn get(&self, path: &Path) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.path == path)
    }

    /// All artifacts in write order.
    pub fn into_artifacts(self) -> Vec<Artifact> {
        self.artifacts
    }

    /// Write `contents` to `path` (relative to the output directory).
    ///
    /// A path may be written once per build. The only replacement allowed is
    /// the HTML finalizer rewriting the copied `index.html`.
    pub async fn write(
        &mut self,
        path: impl AsRef<Path>,
        contents: &[u8],
        stage: Stage,
    ) -> Result<&Artifact, OutputError> {
        let path = normalize(path.as_ref())?;

        let existing = self.artifacts.iter().position(|a| a.path == path);
        if let Some(index) = existing {
            let first = self.artifacts[index].stage;
            if stage != Stage::FinalizeHtml || path != Path::new(ENTRY_HTML) {
                return Err(OutputError::Collision {
                    path,
                    first,
                    second: stage,
                });
            }
        }

        let full = self.root.join(&path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OutputError::Write {
                    path: full.clone(),
                    message: e.to_string(),
                })?;
        }
        tokio::fs::write(&full, contents)
            .await
            .map_err(|e| OutputError::Write {
                path: full.clone(),
                message: e.to_string(),
            })?;

        tracing::debug!("Wrote {} ({} bytes)", path.display(), contents.len());

        let artifact = Artifact {
            content_type: mime_for_path(&path),
            path,
            stage,
            bytes: contents.len() as u64,
        };

        let index = match existing {
            Some(index) => {
                self.artifacts[index] = artifact;
                index
            }
            None => {
                self.artifacts.push(artifact);
                self.artifacts.len() - 1
            }
        };
        Ok(&self.artifacts[index])
    }
}

/// Reject absolute paths and `..` so nothing lands outside the output root.
fn normalize(path: &Path) -> Result<PathBuf, OutputError> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(OutputError::OutsideOutput(path.to_path_buf())),
        }
    }
    if out.as_os_str().is_empty() {
        return Err(OutputError::OutsideOutput(path.to_path_buf()));
    }
    Ok(out)
}
