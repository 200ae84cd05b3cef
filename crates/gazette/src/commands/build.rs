//! Site build command.

use std::path::Path;

use anyhow::Result;
use gazette_build::Pipeline;

use crate::config::{load_config, Overrides};

/// Run the build command.
pub async fn run(config_path: &Path, overrides: Overrides) -> Result<()> {
    tracing::info!("Building site...");

    let config = load_config(config_path)?.into_build_config(overrides, |name| {
        std::env::var(name).ok()
    })?;

    let result = Pipeline::new(config).run().await?;

    for artifact in &result.artifacts {
        tracing::debug!(
            "  {} ({} bytes, {})",
            artifact.path.display(),
            artifact.bytes,
            artifact.content_type
        );
    }

    tracing::info!(
        "Built {} files in {}ms",
        result.artifacts.len(),
        result.duration_ms
    );

    tracing::info!("Output: {}", result.output_dir.display());

    Ok(())
}
