//! M2: Conversation Analyzer — structural pre-filter.
//!
//! Skips pure Q&A conversations (all patient messages are questions).
//! For all other conversations, marks all domains as candidates and
//! delegates actual classification to the SLM extractor.

use super::traits::ConversationAnalyzer;
use super::types::*;

/// Check if a conversation is purely informational (Q&A) with
/// no health data entry. Skip these to save LLM calls.
///
/// A conversation is pure Q&A when all patient messages end with `?`.
fn is_pure_qa(messages: &[ConversationMessage]) -> bool {
    let patient_messages: Vec<&ConversationMessage> = messages
        .iter()
        .filter(|m| m.role == "patient")
        .collect();

    if patient_messages.is_empty() {
        return true;
    }

    // All patient messages are questions (end with ?)
    patient_messages.iter().all(|m| m.content.trim().ends_with('?'))
}

/// Structural conversation analyzer.
///
/// Uses only structural signals (message shape, not content keywords).
/// Actual domain classification is the SLM's responsibility.
pub struct RuleBasedAnalyzer;

impl RuleBasedAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl ConversationAnalyzer for RuleBasedAnalyzer {
    fn analyze(&self, conversation: &ConversationBatch) -> AnalysisResult {
        if is_pure_qa(&conversation.messages) {
            return AnalysisResult {
                domains: vec![],
                is_pure_qa: true,
            };
        }

        // Not pure Q&A — mark all domains as candidates.
        // The SLM extractor will determine which domains actually have data.
        let patient_indices: Vec<usize> = conversation
            .messages
            .iter()
            .filter(|m| m.role == "patient")
            .map(|m| m.index)
            .collect();

        let domains = vec![
            DomainMatch {
                domain: ExtractionDomain::Symptom,
                signal_message_indices: patient_indices.clone(),
                detection_confidence: 0.5,
            },
            DomainMatch {
                domain: ExtractionDomain::Medication,
                signal_message_indices: patient_indices.clone(),
                detection_confidence: 0.5,
            },
            DomainMatch {
                domain: ExtractionDomain::Appointment,
                signal_message_indices: patient_indices,
                detection_confidence: 0.5,
            },
        ];

        AnalysisResult {
            domains,
            is_pure_qa: false,
        }
    }
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
