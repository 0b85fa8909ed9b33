//! L3-03 Chat Interface — types, helpers, and repository functions.
//!
//! Builds on top of:
//! - `models::Conversation` / `models::Message` (data structs)
//! - `pipeline::rag::conversation::ConversationManager` (CRUD lifecycle)
//! - `db::repository` (low-level insert/query)
//!
//! This module adds:
//! - Frontend-specific types (ConversationSummary, CitationView, streaming events)
//! - Derived queries (conversation list with message counts, contextual suggestions)
//! - Title generation helper

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;

// ═══════════════════════════════════════════
// Frontend-facing types
// ═══════════════════════════════════════════

/// Conversation summary for the conversation list sidebar.
/// Fields derived via JOIN since conversations table stores only id/started_at/title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub last_message_at: String,
    pub message_count: u32,
    pub last_message_preview: String,
}

/// Citation as displayed in the frontend (String IDs for JS interop).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationView {
    pub document_id: String,
    pub document_title: String,
    pub document_date: Option<String>,
    pub professional_name: Option<String>,
    pub chunk_text: String,
    pub relevance_score: f32,
}

/// Payload emitted via Tauri event during streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamEvent {
    pub conversation_id: String,
    pub chunk: StreamChunkPayload,
}

/// A single streaming chunk sent to the frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamChunkPayload {
    Token { text: String },
    Citation { citation: CitationView },
    Done {
        full_text: String,
        confidence: f32,
        boundary_check: String,
    },
    Error { message: String },
}

/// Prompt suggestion for empty state / new conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSuggestion {
    pub text: String,
    pub category: String,
}

// ═══════════════════════════════════════════
// Title generation
// ═══════════════════════════════════════════

/// Generate a conversation title from the first patient message.
/// Truncates at 50 characters with "..." if longer, handling UTF-8 correctly.
pub fn generate_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    if trimmed.is_empty() {
        return "New conversation".to_string();
    }

    // Find the byte position at or just before the 50th character
    let boundary = trimmed
        .char_indices()
        .take_while(|(i, _)| *i < 50)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(trimmed.len());

    if boundary >= trimmed.len() {
        trimmed.to_string()
    } else {
        format!("{}...", &trimmed[..boundary])
    }
}

// ═══════════════════════════════════════════
// Prompt suggestions
// ═══════════════════════════════════════════

/// Default prompt suggestions for empty conversations.
pub fn default_prompt_suggestions() -> Vec<PromptSuggestion> {
    vec![
        PromptSuggestion {
            text: "What medications am I currently taking?".into(),
            category: "medications".into(),
        },
        PromptSuggestion {
            text: "Summarize my latest lab results".into(),
            category: "labs".into(),
        },
        PromptSuggestion {
            text: "Are there any interactions between my medications?".into(),
            category: "medications".into(),
        },
        PromptSuggestion {
            text: "What should I ask my doctor at my next visit?".into(),
            category: "appointments".into(),
        },
        PromptSuggestion {
            text: "Explain my diagnosis in simple terms".into(),
            category: "general".into(),
        },
        PromptSuggestion {
            text: "What changed since my last appointment?".into(),
            category: "general".into(),
        },
    ]
}

/// Get prompt suggestions contextual to the patient's data.
/// Replaces generic defaults with contextual suggestions when data exists.
/// Returns at most 6 suggestions.
pub fn get_contextual_suggestions(conn: &Connection) -> Result<Vec<PromptSuggestion>, DatabaseError> {
    let mut suggestions = default_prompt_suggestions();

    let has_meds: bool = conn
        .query_row("SELECT COUNT(*) > 0 FROM medications", [], |row| row.get(0))
        .unwrap_or(false);

    let has_labs: bool = conn
        .query_row("SELECT COUNT(*) > 0 FROM lab_results", [], |row| row.get(0))
        .unwrap_or(false);

    // Replace generic suggestions with contextual ones (from the end)
    if has_meds && suggestions.len() >= 6 {
        suggestions[5] = PromptSuggestion {
            text: "Do any of my medications have common side effects?".into(),
            category: "medications".into(),
        };
    }
    if has_labs && suggestions.len() >= 5 {
        suggestions[4] = PromptSuggestion {
            text: "Are any of my lab values outside the normal range?".into(),
            category: "labs".into(),
        };
    }

    Ok(suggestions)
}

// ═══════════════════════════════════════════
// Repository functions
// ═══════════════════════════════════════════

/// List all conversations with derived summary fields.
/// Conversations are per-profile (each profile has its own SQLite DB).
pub fn list_conversation_summaries(
    conn: &Connection,
) -> Result<Vec<ConversationSummary>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT
            c.id,
            COALESCE(c.title, 'New conversation') AS title,
            COALESCE(MAX(m.timestamp), c.started_at) AS last_message_at,
            COUNT(m.id) AS message_count,
            COALESCE(
                (SELECT SUBSTR(m2.content, 1, 80) FROM messages m2
                 WHERE m2.conversation_id = c.id
                 ORDER BY m2.timestamp DESC LIMIT 1),
                ''
            ) AS last_message_preview
         FROM conversations c
         LEFT JOIN messages m ON m.conversation_id = c.id
         GROUP BY c.id
         ORDER BY last_message_at DESC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(ConversationSummary {
            id: row.get(0)?,
            title: row.get(1)?,
            last_message_at: row.get(2)?,
            message_count: row.get::<_, i64>(3)? as u32,
            last_message_preview: row.get(4)?,
        })
    })?;

    let mut summaries = Vec::new();
    for row in rows {
        summaries.push(row?);
    }
    Ok(summaries)
}

/// Delete a conversation and all its messages (CASCADE).
pub fn delete_conversation(conn: &Connection, conversation_id: &str) -> Result<bool, DatabaseError> {
    let rows_affected = conn.execute(
        "DELETE FROM conversations WHERE id = ?1",
        params![conversation_id],
    )?;
    Ok(rows_affected > 0)
}

/// Clear feedback on a message (set to NULL).
pub fn clear_message_feedback(conn: &Connection, message_id: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE messages SET feedback = NULL WHERE id = ?1",
        params![message_id],
    )?;
    Ok(())
}

/// Update the title of a conversation.
pub fn update_conversation_title(
    conn: &Connection,
    conversation_id: &str,
    title: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE conversations SET title = ?1 WHERE id = ?2",
        params![title, conversation_id],
    )?;
    Ok(())
}

// ═══════════════════════════════════════════
// Citation conversion
// ═══════════════════════════════════════════

impl From<crate::pipeline::rag::types::Citation> for CitationView {
    fn from(c: crate::pipeline::rag::types::Citation) -> Self {
        CitationView {
            document_id: c.document_id.to_string(),
            document_title: c.document_title,
            document_date: c.document_date,
            professional_name: c.professional_name,
            chunk_text: c.chunk_text,
            relevance_score: c.relevance_score,
        }
    }
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
