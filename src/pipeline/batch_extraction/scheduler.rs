//! M1: Batch Scheduler — determines when extraction runs and which conversations qualify.
//!
//! Eligibility rules (LP-01 Section 3.2):
//! - At least 2 messages (back-and-forth)
//! - Last message > cold_hours ago (conversation is "cold")
//! - Not yet extracted, or new messages since last extraction
//! - Max 20 conversations per batch

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::error::ExtractionError;
use super::traits::BatchScheduler;
use super::types::*;
use crate::db::DatabaseError;

/// SQLite-backed batch scheduler.
pub struct SqliteBatchScheduler;

impl SqliteBatchScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl BatchScheduler for SqliteBatchScheduler {
    fn has_pending_work(&self, conn: &Connection) -> Result<bool, ExtractionError> {
        let config = ExtractionConfig::default();
        let conversations = self.get_eligible_conversations(conn, &config)?;
        Ok(!conversations.is_empty())
    }

    fn get_eligible_conversations(
        &self,
        conn: &Connection,
        config: &ExtractionConfig,
    ) -> Result<Vec<ConversationBatch>, ExtractionError> {
        let cold_hours_clause = format!("-{} hours", config.cold_hours);

        // Find conversations eligible for extraction
        let mut stmt = conn.prepare(
            "SELECT c.id, c.title,
                    MAX(m.timestamp) as last_message_at,
                    COUNT(m.id) as message_count
             FROM conversations c
             JOIN messages m ON m.conversation_id = c.id
             LEFT JOIN extraction_batches eb ON c.id = eb.conversation_id
             GROUP BY c.id
             HAVING message_count >= 2
                AND last_message_at < datetime('now', ?1)
                AND (eb.extracted_at IS NULL
                     OR last_message_at > eb.extracted_at)
             ORDER BY last_message_at DESC
             LIMIT ?2"
        ).map_err(|e| ExtractionError::Database(DatabaseError::Sqlite(e)))?;

        let rows = stmt.query_map(
            params![cold_hours_clause, config.max_conversations_per_batch],
            |row| {
                Ok(ConversationRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    last_message_at: row.get(2)?,
                    message_count: row.get(3)?,
                })
            },
        ).map_err(|e| ExtractionError::Database(DatabaseError::Sqlite(e)))?;

        let mut conversations = Vec::new();

        for row in rows {
            let row = row.map_err(|e| ExtractionError::Database(DatabaseError::Sqlite(e)))?;

            // Load messages for this conversation
            let messages = self.load_messages(conn, &row.id)?;

            let last_message_at = NaiveDateTime::parse_from_str(
                &row.last_message_at,
                "%Y-%m-%d %H:%M:%S",
            ).unwrap_or_default();

            conversations.push(ConversationBatch {
                id: row.id,
                title: row.title,
                messages,
                last_message_at,
                message_count: row.message_count,
            });
        }

        Ok(conversations)
    }

    fn mark_extracted(
        &self,
        conn: &Connection,
        conversation_id: &str,
        batch_id: &str,
        domains_found: &[ExtractionDomain],
        items_count: u32,
        model_name: &str,
        duration_ms: u64,
    ) -> Result<(), ExtractionError> {
        let domains_json: Vec<&str> = domains_found.iter().map(|d| d.as_str()).collect();
        let domains_str = serde_json::to_string(&domains_json)
            .map_err(|e| ExtractionError::JsonParsing(e.to_string()))?;
        let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

        conn.execute(
            "INSERT OR REPLACE INTO extraction_batches
             (id, conversation_id, extracted_at, domains_found, items_extracted, model_name, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                batch_id,
                conversation_id,
                now,
                domains_str,
                items_count,
                model_name,
                duration_ms as i64,
            ],
        ).map_err(|e| ExtractionError::Database(DatabaseError::Sqlite(e)))?;

        Ok(())
    }
}

impl SqliteBatchScheduler {
    fn load_messages(
        &self,
        conn: &Connection,
        conversation_id: &str,
    ) -> Result<Vec<ConversationMessage>, ExtractionError> {
        let mut stmt = conn.prepare(
            "SELECT id, role, content, timestamp
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY timestamp ASC"
        ).map_err(|e| ExtractionError::Database(DatabaseError::Sqlite(e)))?;

        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                role: row.get(1)?,
                content: row.get(2)?,
                timestamp: row.get(3)?,
            })
        }).map_err(|e| ExtractionError::Database(DatabaseError::Sqlite(e)))?;

        let mut messages = Vec::new();
        for (idx, row) in rows.enumerate() {
            let row = row.map_err(|e| ExtractionError::Database(DatabaseError::Sqlite(e)))?;
            messages.push(ConversationMessage {
                id: row.id,
                index: idx,
                role: row.role,
                content: row.content,
                created_at: NaiveDateTime::parse_from_str(
                    &row.timestamp,
                    "%Y-%m-%d %H:%M:%S",
                ).unwrap_or_default(),
                is_signal: false, // Set by analyzer
            });
        }

        Ok(messages)
    }
}

struct ConversationRow {
    id: String,
    title: Option<String>,
    last_message_at: String,
    message_count: u32,
}

struct MessageRow {
    id: String,
    role: String,
    content: String,
    timestamp: String,
}

/// Generate a new batch ID.
pub fn new_batch_id() -> String {
    Uuid::new_v4().to_string()
}
