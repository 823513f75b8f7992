//! Start-up document loading.

use std::path::Path;

use docqa_core::error::DocqaError;
use docqa_core::types::SourceDocument;
use tracing::{debug, info};

/// Load every file directly inside `dir` whose name ends in `.{extension}`.
///
/// Matching is case-insensitive and does not descend into subdirectories.
/// Documents are returned sorted by file name so the corpus fingerprint and
/// chunk order are stable across runs.
///
/// A missing directory, or one with no eligible files, is a configuration
/// error: the service cannot answer anything without a corpus.
pub fn load_documents(dir: &Path, extension: &str) -> Result<Vec<SourceDocument>, DocqaError> {
    if !dir.is_dir() {
        return Err(DocqaError::Config(format!(
            "Directory '{}' not found.",
            dir.display()
        )));
    }

    let suffix = format!(".{}", extension.trim_start_matches('.').to_lowercase());
    let mut documents = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.to_lowercase().ends_with(&suffix) {
            debug!(file = %name, "Skipping non-matching file");
            continue;
        }

        let text = std::fs::read_to_string(&path)?;
        documents.push(SourceDocument::new(name, text));
    }

    if documents.is_empty() {
        return Err(DocqaError::Config(format!(
            "No {} files found in '{}'.",
            suffix,
            dir.display()
        )));
    }

    documents.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    info!(
        dir = %dir.display(),
        count = documents.len(),
        "Loaded source documents"
    );
    Ok(documents)
}
