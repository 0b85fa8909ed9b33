use regex::Regex;
use rusqlite::Connection;
use uuid::Uuid;

use super::types::{BoundaryCheck, Citation, ScoredChunk};
use crate::db::repository::get_document;

/// Extract citations from MedGemma's response and match to source chunks.
pub fn extract_citations(response_text: &str, context_chunks: &[ScoredChunk]) -> Vec<Citation> {
    let mut citations = Vec::new();

    // Pattern 1: Explicit [Doc: uuid, Date: date] citations from MedGemma
    let doc_pattern =
        Regex::new(r"\[Doc:\s*([a-f0-9-]+)(?:,\s*Date:\s*([^\]]+))?\]").unwrap();

    for cap in doc_pattern.captures_iter(response_text) {
        let doc_id_str = cap.get(1).map(|m| m.as_str()).unwrap_or("");
        let date = cap.get(2).map(|m| m.as_str().to_string());

        if let Ok(doc_id) = Uuid::parse_str(doc_id_str) {
            if let Some(chunk) = context_chunks.iter().find(|c| c.document_id == doc_id) {
                citations.push(Citation {
                    document_id: doc_id,
                    document_title: format!(
                        "Document from {}",
                        chunk.doc_date.as_deref().unwrap_or("unknown date")
                    ),
                    document_date: date.or_else(|| chunk.doc_date.clone()),
                    professional_name: chunk.professional_name.clone(),
                    chunk_text: chunk.content.chars().take(200).collect(),
                    relevance_score: chunk.score,
                });
            }
        }
    }

    // Pattern 2: If MedGemma didn't cite explicitly, attach top-scoring chunks
    if citations.is_empty() && !context_chunks.is_empty() {
        for chunk in context_chunks.iter().take(3) {
            if chunk.score > 0.5 {
                citations.push(Citation {
                    document_id: chunk.document_id,
                    document_title: format!(
                        "Document from {}",
                        chunk.doc_date.as_deref().unwrap_or("unknown date")
                    ),
                    document_date: chunk.doc_date.clone(),
                    professional_name: chunk.professional_name.clone(),
                    chunk_text: chunk.content.chars().take(200).collect(),
                    relevance_score: chunk.score,
                });
            }
        }
    }

    // Deduplicate by document_id
    citations.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    citations.dedup_by(|a, b| a.document_id == b.document_id);

    citations
}

/// Validate citations against the patient's document database (RS-L2-01-002).
///
/// Removes any citation whose `document_id` does not exist in the documents table.
/// This guards against hallucinated or stale UUIDs reaching the frontend.
pub fn validate_citations(conn: &Connection, citations: Vec<Citation>) -> Vec<Citation> {
    citations
        .into_iter()
        .filter(|c| {
            match get_document(conn, &c.document_id) {
                Ok(Some(_)) => true,
                Ok(None) => {
                    tracing::warn!(
                        document_id = %c.document_id,
                        "Citation references non-existent document — removed"
                    );
                    false
                }
                Err(e) => {
                    tracing::warn!(
                        document_id = %c.document_id,
                        error = %e,
                        "Failed to validate citation document — removed"
                    );
                    false
                }
            }
        })
        .collect()
}

/// Parse the BOUNDARY_CHECK from MedGemma's response.
/// Returns the boundary check and the cleaned response text.
pub fn parse_boundary_check(response: &str) -> (BoundaryCheck, String) {
    if let Some(first_line_end) = response.find('\n') {
        let first_line = response[..first_line_end].trim();
        if first_line.starts_with("BOUNDARY_CHECK:") {
            let check_str = first_line
                .strip_prefix("BOUNDARY_CHECK:")
                .unwrap()
                .trim();
            let check = match check_str.to_lowercase().as_str() {
                "understanding" => BoundaryCheck::Understanding,
                "awareness" => BoundaryCheck::Awareness,
                "preparation" => BoundaryCheck::Preparation,
                _ => BoundaryCheck::OutOfBounds,
            };
            let cleaned_response = response[first_line_end + 1..].trim().to_string();
            return (check, cleaned_response);
        }
    }
    // No boundary check found — treat as out of bounds
    (BoundaryCheck::OutOfBounds, response.to_string())
}

/// Clean citation markers from patient-visible text.
pub fn clean_citations_for_display(text: &str) -> String {
    let doc_pattern =
        Regex::new(r"\[Doc:\s*[a-f0-9-]+(?:,\s*Date:\s*[^\]]+)?\]").unwrap();
    doc_pattern.replace_all(text, "").to_string()
}

/// Calculate response confidence based on context quality.
pub fn calculate_confidence(
    boundary_check: &BoundaryCheck,
    citations_count: usize,
    semantic_chunks_used: usize,
) -> f32 {
    let mut confidence: f32 = 0.0;

    // Boundary check contributes to confidence
    match boundary_check {
        BoundaryCheck::Understanding => confidence += 0.4,
        BoundaryCheck::Awareness => confidence += 0.3,
        BoundaryCheck::Preparation => confidence += 0.3,
        BoundaryCheck::OutOfBounds => return 0.0,
    }

    // Citations boost confidence
    confidence += (citations_count as f32 * 0.15).min(0.3);

    // Semantic context boosts confidence
    confidence += (semantic_chunks_used as f32 * 0.06).min(0.3);

    confidence.min(1.0)
}
