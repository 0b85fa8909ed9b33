use chrono::Local;
use rusqlite::Connection;
use uuid::Uuid;

use super::RagError;
use crate::db::repository;
use crate::models::enums::{MessageFeedback, MessageRole};
use crate::models::{Conversation, Message};

/// Manages conversation lifecycle and message persistence.
pub struct ConversationManager<'a> {
    conn: &'a Connection,
}

impl<'a> ConversationManager<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Start a new conversation. Returns the conversation ID.
    pub fn start(&self, title: Option<&str>) -> Result<Uuid, RagError> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            started_at: Local::now().naive_local(),
            title: title.map(|t| t.to_string()),
        };
        repository::insert_conversation(self.conn, &conversation)?;
        Ok(conversation.id)
    }

    /// Add a patient message to an existing conversation.
    pub fn add_patient_message(
        &self,
        conversation_id: Uuid,
        text: &str,
    ) -> Result<Uuid, RagError> {
        self.ensure_conversation_exists(conversation_id)?;

        let msg = Message {
            id: Uuid::new_v4(),
            conversation_id,
            role: MessageRole::Patient,
            content: text.to_string(),
            timestamp: Local::now().naive_local(),
            source_chunks: None,
            confidence: None,
            feedback: None,
        };
        repository::insert_message(self.conn, &msg)?;
        Ok(msg.id)
    }

    /// Add a Coheara response with citations and confidence.
    pub fn add_response(
        &self,
        conversation_id: Uuid,
        text: &str,
        source_chunks_json: Option<&str>,
        confidence: f32,
    ) -> Result<Uuid, RagError> {
        self.ensure_conversation_exists(conversation_id)?;

        let msg = Message {
            id: Uuid::new_v4(),
            conversation_id,
            role: MessageRole::Coheara,
            content: text.to_string(),
            timestamp: Local::now().naive_local(),
            source_chunks: source_chunks_json.map(|s| s.to_string()),
            confidence: Some(confidence),
            feedback: None,
        };
        repository::insert_message(self.conn, &msg)?;
        Ok(msg.id)
    }

    /// Get recent messages for a conversation (ordered by timestamp).
    pub fn get_history(&self, conversation_id: Uuid) -> Result<Vec<Message>, RagError> {
        self.ensure_conversation_exists(conversation_id)?;
        let messages = repository::get_messages_by_conversation(self.conn, &conversation_id)?;
        Ok(messages)
    }

    /// Update feedback on a message.
    pub fn set_feedback(
        &self,
        message_id: Uuid,
        feedback: MessageFeedback,
    ) -> Result<(), RagError> {
        self.conn
            .execute(
                "UPDATE messages SET feedback = ?1 WHERE id = ?2",
                rusqlite::params![feedback.as_str(), message_id.to_string()],
            )
            .map_err(crate::db::DatabaseError::Sqlite)?;
        Ok(())
    }

    fn ensure_conversation_exists(&self, id: Uuid) -> Result<(), RagError> {
        let conv = repository::get_conversation(self.conn, &id)?;
        if conv.is_none() {
            return Err(RagError::ConversationNotFound(id));
        }
        Ok(())
    }
}
