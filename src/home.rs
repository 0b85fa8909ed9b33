//! L3-02 Home & Document Feed — types and repository functions.
//!
//! Provides the data layer for the home screen: recent document feed,
//! profile stats, onboarding progress, and entity counts per document.
//! All functions operate on the profile's SQLite database via rusqlite.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Document review status derived from `documents.verified` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    PendingReview,
    Confirmed,
}

/// A document card for the home feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCard {
    pub id: String,
    pub document_type: String,
    pub source_filename: String,
    pub professional_name: Option<String>,
    pub professional_specialty: Option<String>,
    pub document_date: Option<String>,
    pub imported_at: String,
    pub status: DocumentStatus,
    pub entity_summary: EntitySummary,
}

/// Counts of entities extracted from a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitySummary {
    pub medications: u32,
    pub lab_results: u32,
    pub diagnoses: u32,
    pub allergies: u32,
    pub procedures: u32,
    pub referrals: u32,
}

/// Aggregated profile stats for the home header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileStats {
    pub total_documents: u32,
    pub documents_pending_review: u32,
    pub total_medications: u32,
    pub total_lab_results: u32,
    pub last_document_date: Option<String>,
    pub extraction_accuracy: Option<f64>,
}

/// Onboarding milestone tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingProgress {
    pub first_document_loaded: bool,
    pub first_document_reviewed: bool,
    pub first_question_asked: bool,
    pub three_documents_loaded: bool,
    pub first_symptom_recorded: bool,
}

impl OnboardingProgress {
    pub fn is_complete(&self) -> bool {
        self.first_document_loaded
            && self.first_document_reviewed
            && self.first_question_asked
            && self.three_documents_loaded
            && self.first_symptom_recorded
    }

    pub fn completed_count(&self) -> u32 {
        [
            self.first_document_loaded,
            self.first_document_reviewed,
            self.first_question_asked,
            self.three_documents_loaded,
            self.first_symptom_recorded,
        ]
        .iter()
        .filter(|&&v| v)
        .count() as u32
    }
}

/// Home screen data — single fetch for all home content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeData {
    pub stats: ProfileStats,
    pub recent_documents: Vec<DocumentCard>,
    pub onboarding: OnboardingProgress,
    pub critical_alerts: Vec<crate::trust::CriticalLabAlert>,
}

// ---------------------------------------------------------------------------
// Repository functions
// ---------------------------------------------------------------------------

/// Extract filename from a file path string.
fn extract_filename(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Fetches recent documents with professional info for the home feed.
pub fn fetch_recent_documents(
    conn: &Connection,
    limit: u32,
    offset: u32,
) -> Result<Vec<DocumentCard>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT d.id, d.type, d.source_file, d.document_date, d.ingestion_date,
                d.verified,
                p.name AS prof_name, p.specialty AS prof_specialty
         FROM documents d
         LEFT JOIN professionals p ON d.professional_id = p.id
         ORDER BY d.ingestion_date DESC
         LIMIT ?1 OFFSET ?2",
    )?;

    let rows = stmt.query_map(params![limit, offset], |row| {
        let id: String = row.get(0)?;
        let doc_type: String = row.get(1)?;
        let source_file: String = row.get(2)?;
        let document_date: Option<String> = row.get(3)?;
        let ingestion_date: String = row.get(4)?;
        let verified: bool = row.get(5)?;
        let prof_name: Option<String> = row.get(6)?;
        let prof_specialty: Option<String> = row.get(7)?;

        Ok(DocumentCard {
            id,
            document_type: format_document_type(&doc_type),
            source_filename: extract_filename(&source_file),
            professional_name: prof_name,
            professional_specialty: prof_specialty,
            document_date,
            imported_at: ingestion_date,
            status: if verified {
                DocumentStatus::Confirmed
            } else {
                DocumentStatus::PendingReview
            },
            entity_summary: EntitySummary::default(),
        })
    })?;

    let mut cards: Vec<DocumentCard> = Vec::new();
    for row in rows {
        let mut card = row?;
        let doc_id = card.id.clone();
        card.entity_summary = fetch_entity_counts(conn, &doc_id)?;
        cards.push(card);
    }
    Ok(cards)
}

/// Counts entities per document across all entity tables.
pub fn fetch_entity_counts(
    conn: &Connection,
    document_id: &str,
) -> Result<EntitySummary, DatabaseError> {
    let count = |table: &str| -> Result<u32, DatabaseError> {
        conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE document_id = ?1",
                table
            ),
            params![document_id],
            |row| row.get(0),
        )
        .map_err(DatabaseError::from)
    };

    Ok(EntitySummary {
        medications: count("medications")?,
        lab_results: count("lab_results")?,
        diagnoses: count("diagnoses")?,
        allergies: count("allergies")?,
        procedures: count("procedures")?,
        referrals: count("referrals")?,
    })
}

/// Fetches aggregated profile stats for the home header.
pub fn fetch_profile_stats(conn: &Connection) -> Result<ProfileStats, DatabaseError> {
    let total_documents: u32 =
        conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;

    let documents_pending: u32 = conn.query_row(
        "SELECT COUNT(*) FROM documents WHERE verified = 0",
        [],
        |row| row.get(0),
    )?;

    let total_medications: u32 = conn.query_row(
        "SELECT COUNT(*) FROM medications WHERE status = 'active'",
        [],
        |row| row.get(0),
    )?;

    let total_lab_results: u32 =
        conn.query_row("SELECT COUNT(*) FROM lab_results", [], |row| row.get(0))?;

    let last_doc_date: Option<String> = conn
        .query_row(
            "SELECT MAX(ingestion_date) FROM documents",
            [],
            |row| row.get(0),
        )
        .ok()
        .flatten();

    let extraction_accuracy: Option<f64> = conn
        .query_row(
            "SELECT extraction_accuracy FROM profile_trust WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .ok();

    Ok(ProfileStats {
        total_documents,
        documents_pending_review: documents_pending,
        total_medications,
        total_lab_results,
        last_document_date: last_doc_date,
        extraction_accuracy,
    })
}

/// Computes onboarding milestone state from database counts.
pub fn compute_onboarding(conn: &Connection) -> Result<OnboardingProgress, DatabaseError> {
    let doc_count: u32 =
        conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;

    let reviewed_count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM documents WHERE verified = 1",
        [],
        |row| row.get(0),
    )?;

    let question_count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE role = 'patient'",
        [],
        |row| row.get(0),
    )?;

    let symptom_count: u32 =
        conn.query_row("SELECT COUNT(*) FROM symptoms", [], |row| row.get(0))?;

    Ok(OnboardingProgress {
        first_document_loaded: doc_count >= 1,
        first_document_reviewed: reviewed_count >= 1,
        first_question_asked: question_count >= 1,
        three_documents_loaded: doc_count >= 3,
        first_symptom_recorded: symptom_count >= 1,
    })
}

/// Format a raw document type string for display.
fn format_document_type(raw: &str) -> String {
    match raw {
        "prescription" => "Prescription".to_string(),
        "lab_result" => "Lab Report".to_string(),
        "clinical_note" => "Clinical Note".to_string(),
        "discharge_summary" => "Discharge Summary".to_string(),
        "radiology_report" => "Radiology Report".to_string(),
        "pharmacy_record" => "Pharmacy Record".to_string(),
        "other" => "Other".to_string(),
        _ => raw.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
