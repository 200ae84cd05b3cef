//! Pipeline driver.
//!
//! Runs the build stages strictly in order:
//!
//! ```text
//! Init → CopyAssets → ProcessStyles → BundleScript → FinalizeHtml → WriteMetadata → Done
//!   └──────────────┴──────────────┴──────────────┴──────────────┴───────────────→ Failed
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use gazette_bundler::{Bundler, ModuleFormat};
use gazette_css::{scan_content, StyleProcessor};
use serde::Serialize;

use crate::config::{BuildConfig, BuildResult};
use crate::copier::AssetCopier;
use crate::error::{BuildError, OutputError, PipelineError};
use crate::html::{HtmlFinalizer, HtmlPlan, ScriptTag};
use crate::output::{Artifact, OutputDir};
use crate::source::{slash_path, SourceTree};

/// Contents of the generated `_redirects` file.
pub const SPA_REDIRECTS: &str = "/*    /index.html   200\n";

/// A step of the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    CopyAssets,
    ProcessStyles,
    BundleScript,
    FinalizeHtml,
    /// `_redirects` and `meta.json`
    WriteMetadata,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::CopyAssets => "copy assets",
            Self::ProcessStyles => "process styles",
            Self::BundleScript => "bundle script",
            Self::FinalizeHtml => "finalize html",
            Self::WriteMetadata => "write metadata",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Drives one build from configuration to output directory.
pub struct Pipeline {
    config: BuildConfig,
    stage: Stage,
}

impl Pipeline {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            stage: Stage::Init,
        }
    }

    /// The current stage; `Done` or `Failed` once [`Pipeline::run`] returns.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run every stage. The first error stops the build.
    pub async fn run(&mut self) -> Result<BuildResult, PipelineError> {
        let start = Instant::now();

        match self.execute().await {
            Ok((artifacts, output_dir)) => {
                self.stage = Stage::Done;
                let duration = start.elapsed();
                tracing::info!(
                    "Built {} files into {} in {}ms",
                    artifacts.len(),
                    output_dir.display(),
                    duration.as_millis()
                );
                Ok(BuildResult {
                    artifacts,
                    duration_ms: duration.as_millis() as u64,
                    output_dir,
                })
            }
            Err(error) => {
                let stage = self.stage;
                self.stage = Stage::Failed;
                tracing::error!("Build failed during {}: {}", stage, error);
                Err(PipelineError { stage, error })
            }
        }
    }

    fn enter(&mut self, stage: Stage) {
        tracing::debug!("Entering stage: {}", stage);
        self.stage = stage;
    }

    async fn execute(&mut self) -> Result<(Vec<Artifact>, PathBuf), BuildError> {
        self.enter(Stage::Init);
        let tree = SourceTree::resolve(&self.config)?;
        let mut out = OutputDir::create(&tree.output_dir).await?;

        self.enter(Stage::CopyAssets);
        let report = AssetCopier::new(&tree).copy(&mut out).await?;
        tracing::info!(
            "Copied {} files ({} skipped)",
            report.copied,
            report.skipped.len()
        );

        self.enter(Stage::ProcessStyles);
        let processor = StyleProcessor::new(self.config.targets.clone(), self.config.minify)
            .with_classes(scan_content(&tree.content));

        // Process everything before writing so a failure leaves no partial output.
        let mut processed = Vec::with_capacity(tree.styles.len());
        for style in &tree.styles {
            let source = read_to_string(&style.source).await?;
            let name = slash_path(style.source.strip_prefix(&tree.root).unwrap_or(&style.source));
            let css = processor.process(&name, &source)?;
            tracing::info!("Processed {}", name);
            processed.push((style, css));
        }

        let mut stylesheets = Vec::new();
        for (style, css) in processed {
            for output in &style.outputs {
                out.write(output, css.as_bytes(), Stage::ProcessStyles).await?;
            }
            if let Some(primary) = style.primary() {
                stylesheets.push(self.public_url(primary));
            }
        }

        self.enter(Stage::BundleScript);
        let mut options = self.config.bundle.clone();
        options.format = self.config.format;
        options.minify = self.config.minify;

        tracing::info!(
            "Bundling {} for {} ({:?})",
            tree.entry_script.display(),
            self.config.platform,
            self.config.format
        );
        let bundle = Bundler::new(&tree.root, options)?.bundle(&tree.entry_script)?;

        let script_path = PathBuf::from(&bundle.script.path);
        let bundle_css = match &bundle.css {
            Some(css) => {
                let css_path = script_path.with_extension("css");
                Some((css_path.clone(), processor.process(&slash_path(&css_path), css)?))
            }
            None => None,
        };

        for asset in &bundle.assets {
            out.write(&asset.path, &asset.contents, Stage::BundleScript)
                .await?;
        }
        out.write(&script_path, &bundle.script.contents, Stage::BundleScript)
            .await?;
        if let Some((css_path, css)) = bundle_css {
            out.write(&css_path, css.as_bytes(), Stage::BundleScript)
                .await?;
            stylesheets.push(self.public_url(&css_path));
        }

        self.enter(Stage::FinalizeHtml);
        let source = read_to_string(&tree.entry_html).await?;
        let plan = HtmlPlan {
            entry_script: slash_path(&tree.entry_script),
            stylesheets,
            script: ScriptTag {
                src: self.public_url(&script_path),
                module: self.config.format == ModuleFormat::Esm,
            },
            shims: tree.shims.clone(),
        };
        let html = HtmlFinalizer::new().finalize(&source, &plan)?;
        out.write("index.html", html.as_bytes(), Stage::FinalizeHtml)
            .await?;

        self.enter(Stage::WriteMetadata);
        if self.config.redirects {
            if out.get(Path::new("_redirects")).is_some() {
                tracing::info!("Keeping _redirects from the public directory");
            } else {
                out.write("_redirects", SPA_REDIRECTS.as_bytes(), Stage::WriteMetadata)
                    .await?;
            }
        }

        if self.config.metafile {
            let json = serde_json::to_vec_pretty(&bundle.metafile).map_err(|e| {
                OutputError::Write {
                    path: out.path().join("meta.json"),
                    message: e.to_string(),
                }
            })?;
            out.write("meta.json", &json, Stage::WriteMetadata).await?;
        }

        let output_dir = out.path().to_path_buf();
        Ok((out.into_artifacts(), output_dir))
    }

    /// URL of an output file as referenced from the HTML.
    fn public_url(&self, path: &Path) -> String {
        format!(
            "{}/{}",
            self.config.bundle.public_path.trim_end_matches('/'),
            slash_path(path)
        )
    }
}

async fn read_to_string(path: &Path) -> Result<String, BuildError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BuildError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Shim;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <title>News</title>
  </head>
  <body>
    <div id="root" class="flex p-4"></div>
    <script type="module" src="/src/main.jsx"></script>
  </body>
</html>
"#;

    fn site() -> TempDir {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("public")).unwrap();
        fs::write(root.join("index.html"), INDEX_HTML).unwrap();
        fs::write(
            root.join("src/main.jsx"),
            "import { region } from './env';\nimport './app.css';\ndocument.title = region;\n",
        )
        .unwrap();
        fs::write(
            root.join("src/env.js"),
            "export const region = process.env.VITE_NHOST_REGION;\n",
        )
        .unwrap();
        fs::write(root.join("src/app.css"), ".app { user-select: none; }\n").unwrap();
        fs::write(
            root.join("src/index.css"),
            "@tailwind base;\n@tailwind components;\n@tailwind utilities;\n",
        )
        .unwrap();
        fs::write(root.join("public/robots.txt"), "User-agent: *\n").unwrap();
        temp
    }

    fn config(temp: &TempDir) -> BuildConfig {
        let mut config = BuildConfig {
            root: temp.path().to_path_buf(),
            ..Default::default()
        };
        config.bundle.define.insert(
            "process.env.VITE_NHOST_REGION".to_string(),
            "\"eu-central-1\"".to_string(),
        );
        config
    }

    fn read(temp: &TempDir, path: &str) -> String {
        fs::read_to_string(temp.path().join(path)).unwrap()
    }

    #[tokio::test]
    async fn builds_a_complete_site() {
        let temp = site();
        let mut pipeline = Pipeline::new(config(&temp));

        let result = pipeline.run().await.unwrap();

        assert_eq!(pipeline.stage(), Stage::Done);
        assert_eq!(result.output_dir, temp.path().join("dist"));

        let html = read(&temp, "dist/index.html");
        assert!(html.contains(r#"<script type="module" src="/assets/main.js" data-gazette></script>"#));
        assert!(html.contains(r#"<link rel="stylesheet" href="/index.css" data-gazette>"#));
        assert!(html.contains(r#"<link rel="stylesheet" href="/assets/main.css" data-gazette>"#));
        assert!(!html.contains("assets/index.css"));
        assert!(!html.contains("/src/main.jsx"));

        assert!(read(&temp, "dist/index.css").contains(".flex"));
        assert_eq!(read(&temp, "dist/index.css"), read(&temp, "dist/assets/index.css"));
        assert!(read(&temp, "dist/assets/main.css").contains(".app"));
        assert_eq!(read(&temp, "dist/robots.txt"), "User-agent: *\n");
        assert_eq!(read(&temp, "dist/_redirects"), SPA_REDIRECTS);
        assert!(read(&temp, "dist/meta.json").contains("src/env.js"));

        let paths: Vec<String> = result
            .artifacts
            .iter()
            .map(|a| slash_path(&a.path))
            .collect();
        assert_eq!(
            paths,
            vec![
                "index.html",
                "robots.txt",
                "index.css",
                "assets/index.css",
                "assets/main.js",
                "assets/main.css",
                "_redirects",
                "meta.json",
            ]
        );
        assert_eq!(
            result.artifacts.last().map(|a| a.stage),
            Some(Stage::WriteMetadata)
        );
    }

    #[tokio::test]
    async fn metafile_never_replaces_a_public_file() {
        let temp = site();
        fs::write(temp.path().join("public/meta.json"), r#"{"site":"user data"}"#).unwrap();

        let error = Pipeline::new(config(&temp)).run().await.unwrap_err();

        assert_eq!(error.stage, Stage::WriteMetadata);
        match error.error {
            BuildError::Output(OutputError::Collision { first, second, .. }) => {
                assert_eq!(first, Stage::CopyAssets);
                assert_eq!(second, Stage::WriteMetadata);
            }
            other => panic!("expected collision, got {:?}", other),
        }
        assert_eq!(read(&temp, "dist/meta.json"), r#"{"site":"user data"}"#);
    }

    #[tokio::test]
    async fn public_redirects_are_kept() {
        let temp = site();
        fs::write(temp.path().join("public/_redirects"), "/api/*  https://api.example.com/:splat  200\n").unwrap();

        let result = Pipeline::new(config(&temp)).run().await.unwrap();

        assert_eq!(
            read(&temp, "dist/_redirects"),
            "/api/*  https://api.example.com/:splat  200\n"
        );
        let redirects = result
            .artifacts
            .iter()
            .find(|a| a.path == Path::new("_redirects"))
            .unwrap();
        assert_eq!(redirects.stage, Stage::CopyAssets);
    }

    #[tokio::test]
    async fn substitutes_environment_values() {
        let temp = site();

        Pipeline::new(config(&temp)).run().await.unwrap();

        let script = read(&temp, "dist/assets/main.js");
        assert!(script.contains("eu-central-1"));
        assert!(!script.contains("process.env.VITE_NHOST_REGION"));
    }

    #[tokio::test]
    async fn builds_are_deterministic() {
        let temp = site();
        let mut first = config(&temp);
        first.output_dir = PathBuf::from("out-a");
        let mut second = config(&temp);
        second.output_dir = PathBuf::from("out-b");

        let a = Pipeline::new(first).run().await.unwrap();
        let b = Pipeline::new(second).run().await.unwrap();

        assert_eq!(a.artifacts, b.artifacts);
        for artifact in &a.artifacts {
            assert_eq!(
                fs::read(a.output_dir.join(&artifact.path)).unwrap(),
                fs::read(b.output_dir.join(&artifact.path)).unwrap(),
                "{} differs",
                artifact.path.display()
            );
        }
    }

    #[tokio::test]
    async fn missing_public_directory_still_builds() {
        let temp = site();
        fs::remove_dir_all(temp.path().join("public")).unwrap();

        let result = Pipeline::new(config(&temp)).run().await.unwrap();

        assert!(result
            .artifacts
            .iter()
            .all(|a| a.path != Path::new("robots.txt")));
    }

    #[tokio::test]
    async fn malformed_stylesheet_fails_before_writing_css() {
        let temp = site();
        fs::write(temp.path().join("src/index.css"), "..broken { color: red; }").unwrap();
        let mut pipeline = Pipeline::new(config(&temp));

        let error = pipeline.run().await.unwrap_err();

        assert_eq!(error.stage, Stage::ProcessStyles);
        assert!(matches!(error.error, BuildError::Style(_)));
        assert_eq!(pipeline.stage(), Stage::Failed);
        assert!(!temp.path().join("dist/index.css").exists());
        assert!(!temp.path().join("dist/assets/index.css").exists());
    }

    #[tokio::test]
    async fn missing_entry_script_fails_in_init() {
        let temp = site();
        fs::remove_file(temp.path().join("src/main.jsx")).unwrap();

        let error = Pipeline::new(config(&temp)).run().await.unwrap_err();

        assert_eq!(error.stage, Stage::Init);
        assert!(matches!(error.error, BuildError::MissingSource(_)));
        assert!(!temp.path().join("dist").exists());
    }

    #[tokio::test]
    async fn unresolved_import_fails_in_bundle_stage() {
        let temp = site();
        fs::write(temp.path().join("src/main.jsx"), "import './missing';\n").unwrap();

        let error = Pipeline::new(config(&temp)).run().await.unwrap_err();

        assert_eq!(error.stage, Stage::BundleScript);
        assert!(error.to_string().contains("./missing"));
    }

    #[tokio::test]
    async fn iife_builds_classic_script_with_shims() {
        let temp = site();
        let mut config = config(&temp);
        config.format = ModuleFormat::Iife;
        config.shims = vec![Shim::builtin("jwt-decode")];
        config.redirects = false;
        config.metafile = false;

        Pipeline::new(config).run().await.unwrap();

        let html = read(&temp, "dist/index.html");
        assert!(html.contains(r#"<script src="/assets/main.js" data-gazette></script>"#));
        assert!(html.contains("<body>\n<script data-gazette-shim=\"jwt-decode\">"));
        assert!(!temp.path().join("dist/_redirects").exists());
        assert!(!temp.path().join("dist/meta.json").exists());
    }

    #[tokio::test]
    async fn rebuilding_into_existing_output_is_stable() {
        let temp = site();

        Pipeline::new(config(&temp)).run().await.unwrap();
        let first = read(&temp, "dist/index.html");
        Pipeline::new(config(&temp)).run().await.unwrap();

        assert_eq!(read(&temp, "dist/index.html"), first);
    }
}
