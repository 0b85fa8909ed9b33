//! CT-01: Model Router — tag-driven pipeline assignment.
//!
//! Resolves which model handles each pipeline stage based on:
//! 1. User-assigned capability tags (VISION, MEDICAL, TXT, etc.)
//! 2. Enabled/disabled flag per model
//! 3. Prefix heuristic fallback (backward compatible)
//!
//! Produces a `PipelineAssignment` that tells the processor:
//! - Which extraction strategy to use (VisionOcr, PdfiumText, DirectText)
//! - Which model handles structuring
//! - Which processing mode to use (Interleaved vs BatchStages)

use std::collections::HashMap;

use rusqlite::Connection;

use crate::db::repository;
use crate::pipeline::import::format::FileCategory;
use crate::pipeline::structuring::ollama_types::{is_vision_model, CapabilityTag};
use crate::pipeline::structuring::preferences::{ActiveModelResolver, PreferenceError};
use crate::pipeline::structuring::types::LlmClient;

// ──────────────────────────────────────────────
// Types
// ──────────────────────────────────────────────

/// How the extraction stage processes the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Vision model renders PDF pages → images → text via OCR.
    VisionOcr { model: String },
    /// Pdfium native text extraction (digital PDF only, no model needed).
    PdfiumText,
    /// Direct UTF-8 read (plain text files).
    DirectText,
}

/// How pages flow through extraction → structuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    /// No model swap between stages.
    /// Used when same model handles both, or extraction needs no model.
    Interleaved,
    /// Extract ALL pages → swap models → structure ALL pages.
    /// Used when different models handle extraction vs structuring.
    BatchStages,
}

/// Complete pipeline assignment resolved from tags + fallbacks.
#[derive(Debug, Clone)]
pub struct PipelineAssignment {
    pub extraction: ExtractionStrategy,
    pub structuring_model: String,
    pub processing_mode: ProcessingMode,
    /// L6-05: Prompt strategy for this pipeline run. None = legacy behavior.
    pub prompt_strategy: Option<crate::pipeline::strategy::PromptStrategy>,
}

// ──────────────────────────────────────────────
// Resolution
// ──────────────────────────────────────────────

/// Resolve pipeline assignment from model tags, enabled state, and file category.
///
/// This is the single entry point for determining how a document is processed.
/// It replaces the ad-hoc model resolution in `commands/import.rs`.
pub fn resolve_pipeline(
    conn: &Connection,
    resolver: &ActiveModelResolver,
    client: &dyn LlmClient,
    file_category: &FileCategory,
) -> Result<PipelineAssignment, PreferenceError> {
    // Load all tags and disabled models from DB
    let all_tags = repository::get_all_model_tags(conn)?;
    let disabled = repository::get_disabled_models(conn)?;

    // Get installed models from Ollama
    let installed = client
        .list_models()
        .map_err(|e| PreferenceError::OllamaUnavailable(e.to_string()))?;

    // Filter to enabled-only
    let enabled = filter_enabled(&installed, &disabled);

    if enabled.is_empty() {
        return Err(PreferenceError::NoModelAvailable);
    }

    // Resolve each stage
    let extraction = resolve_extraction(file_category, &all_tags, &enabled)?;
    let structuring_model = resolve_structuring(conn, resolver, client, &all_tags, &enabled)?;

    // Auto-select processing mode
    let processing_mode = match &extraction {
        ExtractionStrategy::VisionOcr { model } if model != &structuring_model => {
            ProcessingMode::BatchStages
        }
        _ => ProcessingMode::Interleaved,
    };

    Ok(PipelineAssignment {
        extraction,
        structuring_model,
        processing_mode,
        prompt_strategy: None, // L6-05: Caller can resolve and set after pipeline assignment
    })
}

// ──────────────────────────────────────────────
// Internal helpers
// ──────────────────────────────────────────────

/// Resolve extraction strategy from file category + tags.
fn resolve_extraction(
    file_category: &FileCategory,
    all_tags: &HashMap<String, Vec<CapabilityTag>>,
    enabled: &[String],
) -> Result<ExtractionStrategy, PreferenceError> {
    match file_category {
        FileCategory::PlainText => Ok(ExtractionStrategy::DirectText),
        FileCategory::Unsupported => Err(PreferenceError::NoModelAvailable),

        FileCategory::DigitalPdf => {
            // Digital PDF: prefer vision model if available, else pdfium text layer
            if let Some(model) = find_enabled_with_tag(all_tags, enabled, CapabilityTag::Vision) {
                Ok(ExtractionStrategy::VisionOcr { model })
            } else if let Some(model) = find_enabled_vision_by_prefix(enabled) {
                Ok(ExtractionStrategy::VisionOcr { model })
            } else {
                Ok(ExtractionStrategy::PdfiumText)
            }
        }

        FileCategory::ScannedPdf | FileCategory::Image => {
            // Scanned PDF / Image: MUST have a vision model
            if let Some(model) = find_enabled_with_tag(all_tags, enabled, CapabilityTag::Vision) {
                Ok(ExtractionStrategy::VisionOcr { model })
            } else if let Some(model) = find_enabled_vision_by_prefix(enabled) {
                Ok(ExtractionStrategy::VisionOcr { model })
            } else {
                Err(PreferenceError::NoModelAvailable)
            }
        }
    }
}

/// Resolve structuring model from tags + preferences.
fn resolve_structuring(
    conn: &Connection,
    resolver: &ActiveModelResolver,
    client: &dyn LlmClient,
    all_tags: &HashMap<String, Vec<CapabilityTag>>,
    enabled: &[String],
) -> Result<String, PreferenceError> {
    // Step 1: User preference (if enabled and installed)
    if let Ok(resolved) = resolver.resolve(conn, client) {
        if enabled.iter().any(|m| m == &resolved.name) {
            return Ok(resolved.name);
        }
    }

    // Step 2: Enabled model with MEDICAL tag
    if let Some(model) = find_enabled_with_tag(all_tags, enabled, CapabilityTag::Medical) {
        return Ok(model);
    }

    // Step 3: Prefix heuristic — first enabled medical model
    for model in enabled {
        if super::structuring::preferences::classify_model(model)
            == super::structuring::preferences::ModelQuality::Medical
        {
            return Ok(model.clone());
        }
    }

    // Step 4: Any enabled model
    if let Some(model) = enabled.first() {
        return Ok(model.clone());
    }

    Err(PreferenceError::NoModelAvailable)
}

/// Find first enabled model with a specific tag.
fn find_enabled_with_tag(
    all_tags: &HashMap<String, Vec<CapabilityTag>>,
    enabled: &[String],
    tag: CapabilityTag,
) -> Option<String> {
    for model in enabled {
        if let Some(tags) = all_tags.get(model) {
            if tags.contains(&tag) {
                return Some(model.clone());
            }
        }
    }
    None
}

/// Find first enabled model that passes the vision prefix heuristic.
fn find_enabled_vision_by_prefix(enabled: &[String]) -> Option<String> {
    enabled.iter().find(|m| is_vision_model(m)).cloned()
}

/// Filter installed models to only those that are enabled.
fn filter_enabled(installed: &[String], disabled: &[String]) -> Vec<String> {
    installed
        .iter()
        .filter(|m| !disabled.contains(m))
        .cloned()
        .collect()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
