//! E2E-B02: Document Processing Orchestrator.
//!
//! Single entry point that drives the full document pipeline:
//! import → extract → structure → (save pending review in command layer).
//!
//! Uses trait-based DI for all engines (OcrEngine, LlmClient, etc.)
//! so the orchestrator remains fully testable with mock implementations.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::crypto::ProfileSession;
use crate::db::repository;
use crate::pipeline::extraction::orchestrator::DocumentExtractor;
use crate::pipeline::extraction::types::TextExtractor;
use crate::pipeline::extraction::ExtractionError;
use crate::pipeline::import::importer::{import_file, ImportResult, ImportStatus};
use crate::pipeline::import::ImportError;
use crate::pipeline::structuring::orchestrator::DocumentStructurer;
use crate::pipeline::structuring::types::{MedicalStructurer, StructuringResult};
use crate::pipeline::structuring::StructuringError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during document processing.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Structuring failed: {0}")]
    Structuring(#[from] StructuringError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Failed to persist for review: {0}")]
    PersistFailed(String),

    #[error("OCR engine initialization failed: {0}")]
    OcrInit(String),
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Summary returned to the frontend after processing a document.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    pub document_id: Uuid,
    pub original_filename: String,
    pub import_status: ImportStatus,
    /// Populated only if extraction succeeded (i.e., file was staged).
    pub extraction: Option<ExtractionSummary>,
    /// Populated only if structuring succeeded.
    pub structuring: Option<StructuringSummary>,
}

/// Extraction stage summary.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub method: String,
    pub confidence: f32,
    pub page_count: usize,
    pub text_length: usize,
}

/// Structuring stage summary.
#[derive(Debug, Clone, Serialize)]
pub struct StructuringSummary {
    pub document_type: String,
    pub confidence: f32,
    pub entities_count: usize,
    pub has_professional: bool,
    pub document_date: Option<String>,
}

/// Full output including the raw StructuringResult for persistence.
pub struct ProcessingOutput {
    pub outcome: ProcessingOutcome,
    /// The full structuring result — used by the command layer to save
    /// the pending review file. None if import was not staged or
    /// structuring was skipped.
    pub structuring_result: Option<StructuringResult>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Orchestrates document processing: import → extract → structure.
///
/// Pure pipeline logic with trait-based DI. Does NOT perform IPC or Tauri
/// event emission — that responsibility belongs to the command layer.
pub struct DocumentProcessor {
    extractor: Box<dyn TextExtractor + Send + Sync>,
    structurer: Box<dyn MedicalStructurer + Send + Sync>,
}

impl DocumentProcessor {
    pub fn new(
        extractor: Box<dyn TextExtractor + Send + Sync>,
        structurer: Box<dyn MedicalStructurer + Send + Sync>,
    ) -> Self {
        Self {
            extractor,
            structurer,
        }
    }

    /// Full pipeline from a source file path.
    ///
    /// 1. Import (format detect, hash, dedup, stage, DB insert)
    /// 2. If staged → extract text (OCR / PDF / plaintext)
    /// 3. If extracted → structure with LLM (entities, markdown)
    /// 4. Update document OCR confidence in DB
    ///
    /// Returns `ProcessingOutput` containing a summary for the frontend
    /// and the raw `StructuringResult` for persistence (pending review).
    pub fn process_file(
        &self,
        source_path: &Path,
        session: &ProfileSession,
        conn: &Connection,
    ) -> Result<ProcessingOutput, ProcessingError> {
        // Step 1: Import
        let import = import_file(source_path, session, conn)?;

        if import.status != ImportStatus::Staged {
            return Ok(ProcessingOutput {
                outcome: ProcessingOutcome {
                    document_id: import.document_id,
                    original_filename: import.original_filename,
                    import_status: import.status,
                    extraction: None,
                    structuring: None,
                },
                structuring_result: None,
            });
        }

        // Steps 2-4: extraction + structuring
        let (extraction_summary, structuring_summary, structuring_result) =
            self.extract_and_structure(&import, session, conn)?;

        Ok(ProcessingOutput {
            outcome: ProcessingOutcome {
                document_id: import.document_id,
                original_filename: import.original_filename,
                import_status: import.status,
                extraction: Some(extraction_summary),
                structuring: Some(structuring_summary),
            },
            structuring_result: Some(structuring_result),
        })
    }

    /// Process an already-imported document (e.g., from WiFi transfer).
    ///
    /// Same as steps 2-4 of `process_file`, but takes an existing
    /// `ImportResult` instead of a source path.
    pub fn process_imported(
        &self,
        import: &ImportResult,
        session: &ProfileSession,
        conn: &Connection,
    ) -> Result<ProcessingOutput, ProcessingError> {
        if import.status != ImportStatus::Staged {
            return Ok(ProcessingOutput {
                outcome: ProcessingOutcome {
                    document_id: import.document_id,
                    original_filename: import.original_filename.clone(),
                    import_status: import.status.clone(),
                    extraction: None,
                    structuring: None,
                },
                structuring_result: None,
            });
        }

        let (extraction_summary, structuring_summary, structuring_result) =
            self.extract_and_structure(import, session, conn)?;

        Ok(ProcessingOutput {
            outcome: ProcessingOutcome {
                document_id: import.document_id,
                original_filename: import.original_filename.clone(),
                import_status: import.status.clone(),
                extraction: Some(extraction_summary),
                structuring: Some(structuring_summary),
            },
            structuring_result: Some(structuring_result),
        })
    }

    /// Shared extraction + structuring logic.
    fn extract_and_structure(
        &self,
        import: &ImportResult,
        session: &ProfileSession,
        conn: &Connection,
    ) -> Result<(ExtractionSummary, StructuringSummary, StructuringResult), ProcessingError> {
        let staged_path = Path::new(&import.staged_path);

        // Step 2: Extract text
        tracing::info!(
            document_id = %import.document_id,
            "Processing: starting extraction"
        );
        let extraction = self
            .extractor
            .extract(&import.document_id, staged_path, &import.format, session)?;

        let extraction_summary = ExtractionSummary {
            method: format!("{:?}", extraction.method),
            confidence: extraction.overall_confidence,
            page_count: extraction.page_count,
            text_length: extraction.full_text.len(),
        };

        // Step 3: Update OCR confidence in DB
        if let Err(e) =
            update_ocr_confidence(conn, &import.document_id, extraction.overall_confidence)
        {
            tracing::warn!(
                document_id = %import.document_id,
                error = %e,
                "Failed to update OCR confidence — continuing"
            );
        }

        // Step 4: Structure with LLM
        tracing::info!(
            document_id = %import.document_id,
            confidence = extraction.overall_confidence,
            text_length = extraction.full_text.len(),
            "Processing: starting structuring"
        );
        let structuring = self.structurer.structure_document(
            &import.document_id,
            &extraction.full_text,
            extraction.overall_confidence,
            session,
        )?;

        let entities = &structuring.extracted_entities;
        let structuring_summary = StructuringSummary {
            document_type: structuring.document_type.as_str().to_string(),
            confidence: structuring.structuring_confidence,
            entities_count: count_entities(entities),
            has_professional: structuring.professional.is_some(),
            document_date: structuring.document_date.map(|d| d.to_string()),
        };

        tracing::info!(
            document_id = %import.document_id,
            document_type = structuring.document_type.as_str(),
            entities = structuring_summary.entities_count,
            "Processing complete"
        );

        Ok((extraction_summary, structuring_summary, structuring))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn count_entities(e: &crate::pipeline::structuring::types::ExtractedEntities) -> usize {
    e.medications.len()
        + e.lab_results.len()
        + e.diagnoses.len()
        + e.allergies.len()
        + e.procedures.len()
        + e.referrals.len()
        + e.instructions.len()
}

fn update_ocr_confidence(
    conn: &Connection,
    document_id: &Uuid,
    confidence: f32,
) -> Result<(), ProcessingError> {
    let mut doc = repository::get_document(conn, document_id)
        .map_err(|e| ProcessingError::Database(e.to_string()))?
        .ok_or_else(|| {
            ProcessingError::Database(format!("Document not found: {document_id}"))
        })?;

    doc.ocr_confidence = Some(confidence);
    repository::update_document(conn, &doc)
        .map_err(|e| ProcessingError::Database(e.to_string()))
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build a `DocumentProcessor` with production implementations.
///
/// - OCR: `BundledTesseract` (feature-gated) or `MockOcrEngine`
/// - PDF: `PdfTextExtractor`
/// - LLM: `OllamaClient` → `DocumentStructurer`
///
/// Returns an error if required services are unavailable (no Ollama, no model).
pub fn build_processor(model: &str) -> Result<DocumentProcessor, ProcessingError> {
    let ocr = build_ocr_engine()?;
    let pdf = Box::new(crate::pipeline::extraction::pdf::PdfTextExtractor);
    let extractor = Box::new(DocumentExtractor::new(ocr, pdf));

    let ollama = crate::pipeline::structuring::ollama::OllamaClient::default_local();
    tracing::info!(model = %model, "Document processor using LLM model");

    let structurer = Box::new(DocumentStructurer::new(Box::new(ollama), model));

    Ok(DocumentProcessor::new(extractor, structurer))
}

/// Build the OCR engine, respecting feature flags.
fn build_ocr_engine(
) -> Result<Box<dyn crate::pipeline::extraction::types::OcrEngine + Send + Sync>, ProcessingError>
{
    #[cfg(feature = "ocr")]
    {
        if let Ok(tessdata) = find_tessdata_dir() {
            let engine = crate::pipeline::extraction::ocr::BundledTesseract::new(&tessdata)
                .map_err(|e| ProcessingError::OcrInit(e.to_string()))?;
            tracing::info!(tessdata = %tessdata.display(), "Tesseract OCR initialized");
            return Ok(Box::new(engine));
        }
        tracing::warn!("Tesseract data not found — images will not be OCR'd");
    }

    // Fallback: mock OCR (digital PDFs and plaintext still work)
    tracing::info!("Using mock OCR engine — image OCR unavailable");
    Ok(Box::new(
        crate::pipeline::extraction::ocr::MockOcrEngine::new("[OCR not available]", 0.0),
    ))
}

/// Locate tessdata directory from environment or system paths.
#[cfg(feature = "ocr")]
fn find_tessdata_dir() -> Result<PathBuf, ProcessingError> {
    // 1. Check TESSDATA_PREFIX environment variable
    if let Ok(path) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&path);
        if p.join("eng.traineddata").exists() {
            return Ok(p);
        }
    }

    // 2. Try common system paths
    let candidates = [
        "/usr/share/tesseract-ocr/5/tessdata",
        "/usr/share/tesseract-ocr/4.00/tessdata",
        "/usr/share/tessdata",
        "/usr/local/share/tessdata",
        "/opt/homebrew/share/tessdata",
    ];

    for path in &candidates {
        let p = PathBuf::from(path);
        if p.join("eng.traineddata").exists() {
            return Ok(p);
        }
    }

    Err(ProcessingError::OcrInit(
        "Tesseract data directory not found. Set TESSDATA_PREFIX or install tesseract-ocr-eng"
            .into(),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
