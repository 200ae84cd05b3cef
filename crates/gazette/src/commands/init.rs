//! Write a starter gazette.toml.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Run the init command.
pub async fn run(config_path: &Path, yes: bool) -> Result<()> {
    if config_path.exists() && !yes {
        tracing::warn!(
            "{} already exists. Use --yes to overwrite.",
            config_path.display()
        );
        return Ok(());
    }

    fs::write(config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    tracing::info!("Created {}", config_path.display());
    tracing::info!("Run 'gazette build' to build the site.");

    Ok(())
}

pub const DEFAULT_CONFIG: &str = r#"# Gazette Configuration

[site]
# Application shell and entry module
html = "index.html"
script = "src/main.jsx"

# Copied verbatim into the output root ("" to disable)
public = "public"

# Scanned for utility class names
content = ["index.html", "src"]

[[styles]]
source = "src/index.css"
outputs = ["index.css", "assets/index.css"]

[css.targets]
chrome = 87
edge = 88
firefox = 78
safari = 14
ios_saf = 14

[bundle]
# "esm" or "iife"
format = "esm"

# Read from the environment at build time
env = ["VITE_NHOST_SUBDOMAIN", "VITE_NHOST_REGION"]

public_path = "/"
assets_dir = "assets"

[bundle.loader]
".woff2" = "file"

[output]
dir = "dist"
minify = true

# Route every path to index.html on the host
redirects = true

# Write meta.json with bundle inputs and outputs
metafile = true
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_default_config() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("gazette.toml");

        run(&path, false).await.unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);
    }

    #[tokio::test]
    async fn keeps_existing_config_without_yes() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("gazette.toml");
        fs::write(&path, "[output]\n").unwrap();

        run(&path, false).await.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[output]\n");

        run(&path, true).await.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);
    }
}
