use rusqlite::Connection;

use super::citation::{
    calculate_confidence, clean_citations_for_display, extract_citations, parse_boundary_check,
    validate_citations,
};
use super::classify::{classify_query, retrieval_strategy};
use super::context::assemble_context;
use super::conversation::ConversationManager;
use super::prompt::{build_conversation_prompt, conversation_system_prompt_i18n, no_context_response_i18n};
use super::retrieval::retrieve;
use super::types::{
    AssembledContext, ContextSummary, PatientQuery, RagResponse, VectorSearch,
};
use super::RagError;
use crate::pipeline::safety::sanitize::sanitize_patient_input;
use crate::pipeline::storage::types::EmbeddingModel;

/// Trait for LLM text generation within the RAG pipeline.
pub trait LlmGenerate {
    fn generate(&self, system: &str, prompt: &str) -> Result<String, RagError>;
}

/// Full RAG pipeline orchestrator.
///
/// Coordinates: classify → retrieve → assemble → generate → cite → persist.
pub struct DocumentRagPipeline<'a, G: LlmGenerate, E: EmbeddingModel, V: VectorSearch> {
    generator: &'a G,
    embedder: &'a E,
    vector_store: &'a V,
    conn: &'a Connection,
    /// I18N-19: Language for system prompt and no-context response.
    lang: String,
}

impl<'a, G: LlmGenerate, E: EmbeddingModel, V: VectorSearch> DocumentRagPipeline<'a, G, E, V> {
    pub fn new(
        generator: &'a G,
        embedder: &'a E,
        vector_store: &'a V,
        conn: &'a Connection,
    ) -> Self {
        Self {
            generator,
            embedder,
            vector_store,
            conn,
            lang: "en".to_string(),
        }
    }

    /// I18N-19: Create a pipeline with a specific response language.
    pub fn with_language(
        generator: &'a G,
        embedder: &'a E,
        vector_store: &'a V,
        conn: &'a Connection,
        lang: &str,
    ) -> Self {
        Self {
            generator,
            embedder,
            vector_store,
            conn,
            lang: lang.to_string(),
        }
    }

    /// Execute the full RAG pipeline for a patient query.
    ///
    /// Generates a response AND persists both patient message and response
    /// to the database. Use `generate()` when the caller manages persistence
    /// separately (e.g., after safety filtering).
    pub fn query(&self, query: &PatientQuery) -> Result<RagResponse, RagError> {
        let response = self.generate(query)?;

        // Persist patient message + response
        let conversation_mgr = ConversationManager::new(self.conn);
        conversation_mgr.add_patient_message(query.conversation_id, &query.text)?;

        let chunk_ids: Vec<&str> = response
            .citations
            .iter()
            .map(|c| c.document_title.as_str())
            .collect();
        let source_chunks_json = serde_json::to_string(&chunk_ids).ok();

        conversation_mgr.add_response(
            query.conversation_id,
            &response.text,
            source_chunks_json.as_deref(),
            response.confidence,
        )?;

        Ok(response)
    }

    /// Generate a RAG response without persisting to the database.
    ///
    /// Use this when the caller manages persistence separately,
    /// e.g., after applying safety filtering to the response text.
    pub fn generate(&self, query: &PatientQuery) -> Result<RagResponse, RagError> {
        // Step 1: Classify query
        let query_type = query
            .query_type
            .clone()
            .unwrap_or_else(|| classify_query(&query.text));

        // Step 2: Determine retrieval strategy
        let params = retrieval_strategy(&query_type);

        // Step 3: Retrieve context (semantic + structured)
        let retrieved = retrieve(
            &query.text,
            self.embedder,
            self.vector_store,
            &params,
            self.conn,
        )?;

        // Step 4: Check if we have any context
        let has_semantic = !retrieved.semantic_chunks.is_empty();
        let has_structured = !retrieved.structured_data.medications.is_empty()
            || !retrieved.structured_data.diagnoses.is_empty()
            || !retrieved.structured_data.allergies.is_empty()
            || !retrieved.structured_data.lab_results.is_empty()
            || !retrieved.structured_data.symptoms.is_empty();

        if !has_semantic && !has_structured {
            return Ok(self.no_context_result(query_type));
        }

        // Step 5: Assemble context within token budget
        let assembled = assemble_context(&retrieved, &query_type);

        if assembled.text.is_empty() {
            return Ok(self.no_context_result(query_type));
        }

        // Step 6: Get conversation history
        let conversation_mgr = ConversationManager::new(self.conn);
        let history = conversation_mgr
            .get_history(query.conversation_id)
            .unwrap_or_default();

        // Step 6b: Sanitize query before prompt construction (SEC-01-G03)
        let sanitized_query = sanitize_patient_input(&query.text, 2000)
            .map(|s| s.text)
            .unwrap_or_else(|_| query.text.clone());

        // Step 7: Build prompt
        let prompt = build_conversation_prompt(&sanitized_query, &assembled, &history);

        // Step 8: Generate response via LLM (I18N-19: language-keyed system prompt)
        let system_prompt = conversation_system_prompt_i18n(&self.lang);
        let raw_response = self
            .generator
            .generate(&system_prompt, &prompt)?;

        // Step 9: Parse boundary check + clean response
        let (boundary_check, cleaned_response) = parse_boundary_check(&raw_response);

        // Step 10: Extract citations
        let raw_citations = extract_citations(&cleaned_response, &assembled.chunks_included);

        // Step 10b: Validate citation document_ids against DB (RS-L2-01-002)
        let citations = validate_citations(self.conn, raw_citations);

        // Step 11: Clean citation markers from display text
        let display_text = clean_citations_for_display(&cleaned_response);

        // Step 12: Calculate confidence
        let confidence = calculate_confidence(
            &boundary_check,
            citations.len(),
            assembled.chunks_included.len(),
        );

        // Step 12b: M.11 — Low confidence gate
        // If confidence is very low, prepend a disclaimer to help the patient
        let display_text = if confidence < 0.3 {
            tracing::info!(confidence, "Low RAG confidence — adding disclaimer");
            format!(
                "**Note:** This response is based on limited information from your documents. \
                Please verify with your healthcare provider.\n\n{display_text}"
            )
        } else {
            display_text
        };

        // Step 13: Build response
        let context_used = build_context_summary(&assembled, &retrieved.structured_data);

        Ok(RagResponse {
            text: display_text,
            citations,
            confidence,
            query_type,
            context_used,
            boundary_check,
        })
    }

    fn no_context_result(&self, query_type: super::types::QueryType) -> RagResponse {
        RagResponse {
            text: no_context_response_i18n(&self.lang),
            citations: vec![],
            confidence: 0.0,
            query_type,
            context_used: ContextSummary {
                semantic_chunks_used: 0,
                structured_records_used: 0,
                total_context_tokens: 0,
            },
            boundary_check: super::types::BoundaryCheck::OutOfBounds,
        }
    }

}

fn build_context_summary(
    assembled: &AssembledContext,
    structured: &super::types::StructuredContext,
) -> ContextSummary {
    let structured_count = structured.medications.len()
        + structured.diagnoses.len()
        + structured.allergies.len()
        + structured.lab_results.len()
        + structured.symptoms.len();

    ContextSummary {
        semantic_chunks_used: assembled.chunks_included.len(),
        structured_records_used: structured_count,
        total_context_tokens: assembled.estimated_tokens,
    }
}
