//! Pipeline diagnostic dump — writes intermediate artifacts to disk.
//!
//! Enables inspection of every pipeline stage: rendered pages, preprocessed images,
//! prompts, LLM responses, extraction results.
//!
//! **Activation**:
//! - Dev builds (`is_dev()`): auto-enabled, writes to `~/Coheara-dev/diagnostic/`
//! - Prod builds: disabled unless `COHEARA_DUMP_DIR` env var is set
//! - `COHEARA_DUMP_DIR` overrides the default in both modes
//!
//! **Output structure**:
//! ```text
//! {dump_dir}/{doc_id}/
//!   00-source-info.json
//!   01-rendered-page-0.png
//!   02-preprocessed-page-0.png
//!   02-preprocessed-page-0.json
//!   03-vision-ocr-prompt-page-0.txt
//!   03-vision-ocr-result-page-0.json
//!   04-extraction-result.json
//!   05-structuring-prompt-page-0.txt
//!   05-structuring-result-page-0.json
//!   06-final-result.json
//! ```

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::config;

// ──────────────────────────────────────────────
// Dump directory resolution
// ──────────────────────────────────────────────

/// Diagnostic dump subdirectory name inside app data.
const DIAGNOSTIC_SUBDIR: &str = "diagnostic";

/// Resolve the base dump directory.
///
/// Priority:
/// 1. `COHEARA_DUMP_DIR` env var (explicit override, any build)
/// 2. `~/Coheara-dev/diagnostic/` in dev builds (auto-enabled)
/// 3. `None` in production (disabled by default)
fn resolve_base_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("COHEARA_DUMP_DIR") {
        return Some(PathBuf::from(dir));
    }

    if config::is_dev() {
        return Some(config::app_data_dir().join(DIAGNOSTIC_SUBDIR));
    }

    None
}

/// Returns the dump directory for a document, or `None` if diagnostics are disabled.
///
/// Creates the directory tree on first call. Returns `None` (with a warning) if
/// directory creation fails — never panics, never blocks the pipeline.
pub fn dump_dir_for(doc_id: &Uuid) -> Option<PathBuf> {
    let base = resolve_base_dir()?;
    let dir = base.join(doc_id.to_string());

    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(
            path = %dir.display(),
            error = %e,
            "Diagnostic dump: failed to create directory"
        );
        return None;
    }

    Some(dir)
}

// ──────────────────────────────────────────────
// Dump writers
// ──────────────────────────────────────────────

/// Write a binary artifact (PNG image, raw bytes).
///
/// Logs on success (debug) and failure (warn). Never panics.
pub fn dump_binary(dir: &Path, filename: &str, data: &[u8]) {
    let path = dir.join(filename);
    match std::fs::write(&path, data) {
        Ok(()) => tracing::debug!(
            path = %path.display(),
            size = data.len(),
            "Diagnostic dump: binary written"
        ),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to write binary"
        ),
    }
}

/// Write a JSON artifact (any serde-serializable value).
///
/// Uses pretty-printing for human readability. Never panics.
pub fn dump_json<T: serde::Serialize>(dir: &Path, filename: &str, value: &T) {
    let path = dir.join(filename);
    match serde_json::to_string_pretty(value) {
        Ok(json) => match std::fs::write(&path, json.as_bytes()) {
            Ok(()) => tracing::debug!(
                path = %path.display(),
                size = json.len(),
                "Diagnostic dump: JSON written"
            ),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Diagnostic dump: failed to write JSON"
            ),
        },
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to serialize JSON"
        ),
    }
}

/// Write a text artifact (prompt, raw LLM response).
///
/// Never panics.
pub fn dump_text(dir: &Path, filename: &str, text: &str) {
    let path = dir.join(filename);
    match std::fs::write(&path, text.as_bytes()) {
        Ok(()) => tracing::debug!(
            path = %path.display(),
            size = text.len(),
            "Diagnostic dump: text written"
        ),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to write text"
        ),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
