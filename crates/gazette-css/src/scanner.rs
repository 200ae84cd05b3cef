//! Content scanning for utility class candidates.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use walkdir::WalkDir;

use crate::utilities::parse_class;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_\-:/.]+").expect("Invalid class token regex"));

/// Extensions scanned when a content path is a directory.
const CONTENT_EXTENSIONS: &[&str] = &["html", "js", "jsx", "ts", "tsx", "mjs", "vue", "svelte", "md", "mdx"];

/// Extract every known utility class mentioned in `text`.
pub fn extract_classes(text: &str, into: &mut BTreeSet<String>) {
    for token in TOKEN_RE.find_iter(text) {
        let candidate = token.as_str().trim_end_matches(['.', ':', '/']);
        if candidate.is_empty() || into.contains(candidate) {
            continue;
        }
        if parse_class(candidate).is_some() {
            into.insert(candidate.to_string());
        }
    }
}

/// Scan content files and directories for utility classes.
///
/// Missing paths and unreadable files are logged and skipped; the scan only
/// narrows which utilities get generated.
pub fn scan_content(paths: &[PathBuf]) -> BTreeSet<String> {
    let mut classes = BTreeSet::new();

    for path in paths {
        if !path.exists() {
            tracing::warn!("Content path not found: {}", path.display());
            continue;
        }

        for file in content_files(path) {
            match fs::read_to_string(&file) {
                Ok(text) => extract_classes(&text, &mut classes),
                Err(e) => tracing::warn!("Skipping content file {}: {}", file.display(), e),
            }
        }
    }

    tracing::debug!("Found {} utility classes in content", classes.len());
    classes
}

fn content_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_entry(|e| e.file_name() != "node_modules")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| CONTENT_EXTENSIONS.contains(&ext))
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn extracts_known_classes_from_markup() {
        let mut classes = BTreeSet::new();
        extract_classes(
            r#"<div className="flex items-center md:px-8 news-card">Hello.</div>"#,
            &mut classes,
        );

        let found: Vec<&str> = classes.iter().map(String::as_str).collect();
        assert_eq!(found, vec!["flex", "items-center", "md:px-8"]);
    }

    #[test]
    fn scans_directories_and_skips_node_modules() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("node_modules/pkg")).unwrap();
        fs::write(src.join("App.jsx"), "<main className=\"p-4 bg-white\" />").unwrap();
        fs::write(src.join("node_modules/pkg/index.js"), "'m-8'").unwrap();
        fs::write(src.join("notes.bin"), "hidden").unwrap();

        let classes = scan_content(&[src, temp.path().join("missing")]);

        assert!(classes.contains("p-4"));
        assert!(classes.contains("bg-white"));
        assert!(!classes.contains("m-8"));
        assert!(!classes.contains("hidden"));
    }
}
