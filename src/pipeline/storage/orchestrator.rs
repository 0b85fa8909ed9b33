use std::path::Path;

use rusqlite::Connection;

use super::StorageError;
use super::entity_store;
use super::markdown_store;
use super::types::{
    Chunker, EmbeddingModel, StoragePipeline, StorageResult, StorageWarning, VectorStore,
};
use crate::crypto::ProfileSession;
use crate::db::{repository, sqlite};
use crate::pipeline::structuring::types::StructuringResult;

/// Orchestrates the full storage pipeline:
/// chunk → embed → vector store → entity store → markdown → update document.
pub struct DocumentStoragePipeline<C: Chunker, E: EmbeddingModel, V: VectorStore> {
    chunker: C,
    embedder: E,
    vector_store: V,
    profiles_dir: std::path::PathBuf,
}

impl<C: Chunker, E: EmbeddingModel, V: VectorStore> DocumentStoragePipeline<C, E, V> {
    pub fn new(
        chunker: C,
        embedder: E,
        vector_store: V,
        profiles_dir: &Path,
    ) -> Self {
        Self {
            chunker,
            embedder,
            vector_store,
            profiles_dir: profiles_dir.to_path_buf(),
        }
    }
}

impl<C: Chunker, E: EmbeddingModel, V: VectorStore> StoragePipeline
    for DocumentStoragePipeline<C, E, V>
{
    fn store(
        &self,
        structuring_result: &StructuringResult,
        session: &ProfileSession,
    ) -> Result<StorageResult, StorageError> {
        let mut warnings: Vec<StorageWarning> = Vec::new();
        let document_id = structuring_result.document_id;

        // Step 1: Chunk the structured markdown
        let chunks = self.chunker.chunk(&structuring_result.structured_markdown);
        if chunks.is_empty() {
            return Err(StorageError::EmptyChunks);
        }

        // Step 2: Generate embeddings for each chunk
        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = match self.embedder.embed_batch(&texts) {
            Ok(embs) => embs,
            Err(e) => {
                tracing::warn!("Embedding batch failed, falling back to individual: {e}");
                let mut embs = Vec::with_capacity(chunks.len());
                for (i, chunk) in chunks.iter().enumerate() {
                    match self.embedder.embed(&chunk.content) {
                        Ok(emb) => embs.push(emb),
                        Err(_) => {
                            warnings.push(StorageWarning::EmbeddingFailed { chunk_index: i });
                            embs.push(vec![0.0; self.embedder.dimension()]);
                        }
                    }
                }
                embs
            }
        };

        // Step 3: Store chunks + embeddings in vector store
        let doc_type_str = structuring_result.document_type.as_str();
        let doc_date_str = structuring_result
            .document_date
            .map(|d| d.to_string());
        let professional_name = structuring_result
            .professional
            .as_ref()
            .map(|p| p.name.clone());

        let chunks_stored = self.vector_store.store_chunks(
            &chunks,
            &embeddings,
            &document_id,
            doc_type_str,
            doc_date_str.as_deref(),
            professional_name.as_deref(),
            Some(session),
        )?;

        // Step 4: Open database connection and store entities
        let conn = open_profile_db(session)?;
        let (entity_counts, entity_warnings) =
            entity_store::store_entities(&conn, structuring_result)?;
        warnings.extend(entity_warnings);

        // Step 5: Save encrypted markdown
        let markdown_path = markdown_store::save_encrypted_markdown(
            session,
            &self.profiles_dir,
            &document_id,
            &structuring_result.structured_markdown,
        )?;

        // Step 6: Update document record with results
        let professional_id = structuring_result
            .professional
            .as_ref()
            .and_then(|p| {
                repository::find_or_create_professional(&conn, &p.name, p.specialty.as_deref())
                    .ok()
                    .map(|prof| prof.id)
            });

        if let Ok(Some(mut doc)) = repository::get_document(&conn, &document_id) {
            doc.doc_type = structuring_result.document_type.clone();
            doc.document_date = structuring_result.document_date;
            doc.professional_id = professional_id;
            doc.markdown_file = Some(markdown_path);
            let _ = repository::update_document(&conn, &doc);
        }

        // Step 7: Update profile trust
        let _ = repository::update_profile_trust_verified(&conn);

        Ok(StorageResult {
            document_id,
            chunks_stored,
            entities_stored: entity_counts,
            document_type: structuring_result.document_type.clone(),
            professional_id,
            warnings,
        })
    }
}

fn open_profile_db(session: &ProfileSession) -> Result<Connection, StorageError> {
    sqlite::open_database(session.db_path()).map_err(StorageError::Database)
}
