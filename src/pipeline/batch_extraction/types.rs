//! Core types for the night batch extraction pipeline.
//!
//! These types model the full lifecycle:
//! Conversation → Analysis → Extraction → Verification → Pending Review → Dispatch.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════
// Domain Enum
// ═══════════════════════════════════════════

/// The three extractable domains from conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionDomain {
    Symptom,
    Medication,
    Appointment,
}

impl ExtractionDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Symptom => "symptom",
            Self::Medication => "medication",
            Self::Appointment => "appointment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "symptom" => Some(Self::Symptom),
            "medication" => Some(Self::Medication),
            "appointment" => Some(Self::Appointment),
            _ => None,
        }
    }

    pub fn all() -> &'static [ExtractionDomain] {
        &[Self::Symptom, Self::Medication, Self::Appointment]
    }
}

impl std::fmt::Display for ExtractionDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Conversation Batch (input to analyzer)
// ═══════════════════════════════════════════

/// A conversation eligible for batch extraction.
/// Loaded from DB by the scheduler.
#[derive(Debug, Clone)]
pub struct ConversationBatch {
    pub id: String,
    pub title: Option<String>,
    pub messages: Vec<ConversationMessage>,
    pub last_message_at: NaiveDateTime,
    pub message_count: u32,
}

/// A single message within a conversation batch.
#[derive(Debug, Clone)]
pub struct ConversationMessage {
    pub id: String,
    pub index: usize,
    pub role: String,
    pub content: String,
    pub created_at: NaiveDateTime,
    /// Set by the analyzer: true if this message triggered domain classification.
    pub is_signal: bool,
}

// ═══════════════════════════════════════════
// Analysis Result (output of M2: Analyzer)
// ═══════════════════════════════════════════

/// Result of analyzing a conversation for extractable domains.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// Domains detected in this conversation, with relevant message indices.
    pub domains: Vec<DomainMatch>,
    /// True if no health data detected (pure Q&A conversation).
    pub is_pure_qa: bool,
}

/// A domain match within a conversation.
#[derive(Debug, Clone)]
pub struct DomainMatch {
    pub domain: ExtractionDomain,
    /// Indices of messages that contain signal for this domain.
    pub signal_message_indices: Vec<usize>,
    /// Confidence of domain detection (0.0-1.0).
    pub detection_confidence: f32,
}

impl AnalysisResult {
    /// Build an ExtractionInput for a specific domain match.
    pub fn build_input(
        &self,
        conversation: &ConversationBatch,
        domain_match: &DomainMatch,
        patient_context: PatientContext,
        conversation_date: NaiveDate,
    ) -> ExtractionInput {
        // Include signal messages + 1 surrounding message for context.
        let mut selected_indices: Vec<usize> = Vec::new();
        for &idx in &domain_match.signal_message_indices {
            if idx > 0 {
                selected_indices.push(idx - 1);
            }
            selected_indices.push(idx);
            if idx + 1 < conversation.messages.len() {
                selected_indices.push(idx + 1);
            }
        }
        selected_indices.sort_unstable();
        selected_indices.dedup();

        let messages: Vec<ConversationMessage> = selected_indices
            .iter()
            .filter_map(|&idx| conversation.messages.get(idx))
            .cloned()
            .collect();

        ExtractionInput {
            conversation_id: conversation.id.clone(),
            messages,
            patient_context,
            conversation_date,
        }
    }
}

// ═══════════════════════════════════════════
// Extraction Input (input to M3: Engine)
// ═══════════════════════════════════════════

/// Input for a single domain extraction call.
#[derive(Debug, Clone)]
pub struct ExtractionInput {
    pub conversation_id: String,
    pub messages: Vec<ConversationMessage>,
    pub patient_context: PatientContext,
    pub conversation_date: NaiveDate,
}

/// Patient context for disambiguation.
#[derive(Debug, Clone, Default)]
pub struct PatientContext {
    pub active_medications: Vec<ActiveMedicationSummary>,
    pub recent_symptoms: Vec<RecentSymptomSummary>,
    pub known_allergies: Vec<String>,
    pub known_professionals: Vec<ProfessionalSummary>,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveMedicationSummary {
    pub name: String,
    pub dose: String,
    pub frequency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentSymptomSummary {
    pub category: String,
    pub specific: String,
    pub severity: i32,
    pub onset_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfessionalSummary {
    pub name: String,
    pub specialty: Option<String>,
}

// ═══════════════════════════════════════════
// Extracted Item (output of M3: Engine)
// ═══════════════════════════════════════════

/// A single extracted item from any domain.
/// The `data` field holds domain-specific JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub domain: ExtractionDomain,
    pub data: serde_json::Value,
    pub confidence: f32,
    pub source_message_indices: Vec<usize>,
}

// ═══════════════════════════════════════════
// Domain-specific extracted data structures
// ═══════════════════════════════════════════

/// Custom deserializer for source_messages that accepts both integers and
/// strings like "Msg 0" (MEDGEMMA-BENCHMARK-03 F4: inconsistent indexing).
fn deserialize_flexible_source_messages<'de, D>(deserializer: D) -> Result<Vec<usize>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct FlexibleVec;

    impl<'de> de::Visitor<'de> for FlexibleVec {
        type Value = Vec<usize>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("an array of integers or strings like \"Msg 0\"")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Vec<usize>, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut result = Vec::new();
            while let Some(val) = seq.next_element::<serde_json::Value>()? {
                if let Some(n) = val.as_u64() {
                    result.push(n as usize);
                } else if let Some(s) = val.as_str() {
                    let trimmed = s.trim();
                    if let Some(num_str) = trimmed
                        .strip_prefix("Msg ")
                        .or_else(|| trimmed.strip_prefix("msg "))
                    {
                        if let Ok(n) = num_str.trim().parse::<usize>() {
                            result.push(n);
                        }
                    } else if let Ok(n) = trimmed.parse::<usize>() {
                        result.push(n);
                    }
                }
            }
            Ok(result)
        }
    }

    deserializer.deserialize_seq(FlexibleVec)
}

/// Symptom extracted from conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedSymptomData {
    pub category: String,
    pub specific: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_hint: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onset_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
    #[serde(default)]
    pub aggravating: Vec<String>,
    #[serde(default)]
    pub relieving: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_medication_hint: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_source_messages")]
    pub source_messages: Vec<usize>,
}

/// Medication extracted from conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedMedicationData {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub is_otc: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adherence_note: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_source_messages")]
    pub source_messages: Vec<usize>,
}

/// Appointment extracted from conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedAppointmentData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub professional_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_source_messages")]
    pub source_messages: Vec<usize>,
}

// ═══════════════════════════════════════════
// Validation Result (output of validator)
// ═══════════════════════════════════════════

/// Result of validating extracted items.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub items: Vec<ExtractedItem>,
    pub warnings: Vec<String>,
    pub rejected_count: usize,
}

// ═══════════════════════════════════════════
// Grounding Assessment
// ═══════════════════════════════════════════

/// How well an extracted item is grounded in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grounding {
    /// Key terms verified in source messages.
    Grounded,
    /// Some terms verified, some inferred.
    Partial,
    /// Cannot verify against source text.
    Ungrounded,
}

impl Grounding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grounded => "grounded",
            Self::Partial => "partial",
            Self::Ungrounded => "ungrounded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "grounded" => Some(Self::Grounded),
            "partial" => Some(Self::Partial),
            "ungrounded" => Some(Self::Ungrounded),
            _ => None,
        }
    }
}

impl std::fmt::Display for Grounding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Duplicate Detection
// ═══════════════════════════════════════════

/// Result of checking if an extracted item duplicates an existing DB record.
#[derive(Debug, Clone)]
pub enum DuplicateStatus {
    /// No duplicate found.
    New,
    /// Exact duplicate — skip extraction.
    AlreadyTracked { existing_id: String },
    /// Similar but not exact — show as warning.
    PossibleDuplicate { existing_id: String },
}

// ═══════════════════════════════════════════
// Pending Review Item (output of M4: Store)
// ═══════════════════════════════════════════

/// An item awaiting user review on the Home screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReviewItem {
    pub id: String,
    pub conversation_id: String,
    pub batch_id: String,
    pub domain: ExtractionDomain,
    pub extracted_data: serde_json::Value,
    pub confidence: f32,
    pub grounding: Grounding,
    pub duplicate_of: Option<String>,
    pub source_message_ids: Vec<String>,
    /// Excerpt from the triggering conversation message(s) (LP-01 REV-12).
    pub source_quote: Option<String>,
    pub status: PendingStatus,
    pub created_at: String,
    pub reviewed_at: Option<String>,
}

/// Status of a pending review item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Pending,
    Confirmed,
    EditedConfirmed,
    Dismissed,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::EditedConfirmed => "edited_confirmed",
            Self::Dismissed => "dismissed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "edited_confirmed" => Some(Self::EditedConfirmed),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════
// Frontend View (sent over IPC)
// ═══════════════════════════════════════════

/// Frontend-facing view of a pending extraction item.
/// Enriched with display-ready fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingExtractionView {
    pub id: String,
    pub domain: ExtractionDomain,
    pub confidence: f32,
    pub grounding: Grounding,
    pub fields: serde_json::Value,
    pub source_quote: String,
    pub source_conversation_title: String,
    pub duplicate_warning: Option<String>,
    pub created_at: String,
}

// ═══════════════════════════════════════════
// Batch Result (output of BatchRunner)
// ═══════════════════════════════════════════

/// Result of running a full extraction batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub conversations_processed: u32,
    pub conversations_skipped: u32,
    pub items_extracted: u32,
    pub items_stored: u32,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

impl BatchResult {
    pub fn empty() -> Self {
        Self {
            conversations_processed: 0,
            conversations_skipped: 0,
            items_extracted: 0,
            items_stored: 0,
            duration_ms: 0,
            errors: Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════
// Batch Status Events (Tauri events)
// ═══════════════════════════════════════════

/// Event emitted during batch processing for the header indicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BatchStatusEvent {
    Started {
        conversation_count: u32,
    },
    Progress {
        completed: u32,
        total: u32,
        current_title: String,
    },
    Completed {
        items_found: u32,
        duration_ms: u64,
    },
    Failed {
        error: String,
    },
}

// ═══════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════

/// Configuration for the extraction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Model to use for extraction (e.g., "medgemma:4b").
    pub model_name: String,
    /// Minimum confidence to store an extracted item (0.0-1.0).
    /// MEDGEMMA-BENCHMARK-03 F7 validated 0.7: grounded items score 0.8+,
    /// partially-grounded items score ~0.6, hallucinated items score lower.
    pub confidence_threshold: f32,
    /// Hours between batch runs (default: 6).
    pub batch_cooldown_hours: u32,
    /// User-configured hour to start batch (0-23, None = any idle time).
    pub batch_start_hour: Option<u32>,
    /// Minutes of inactivity before batch can run.
    pub idle_minutes: u32,
    /// Maximum conversations per batch (prevents runaway processing).
    pub max_conversations_per_batch: u32,
    /// Maximum items extracted per domain per conversation.
    pub max_items_per_domain: u32,
    /// Hours a conversation must be "cold" before extraction.
    pub cold_hours: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model_name: "medgemma:4b".to_string(),
            confidence_threshold: 0.7,
            batch_cooldown_hours: 6,
            batch_start_hour: Some(2), // Default: 2:00 AM
            idle_minutes: 5,
            max_conversations_per_batch: 20,
            max_items_per_domain: 5,
            cold_hours: 6,
        }
    }
}

// ═══════════════════════════════════════════
// Dispatch Result (after user confirms)
// ═══════════════════════════════════════════

/// Result of dispatching a confirmed item to the actual database table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub item_id: String,
    pub domain: ExtractionDomain,
    pub success: bool,
    pub created_record_id: Option<String>,
    pub error: Option<String>,
    /// Temporal correlations found after symptom dispatch (medication changes near onset date).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlations: Option<Vec<crate::journal::TemporalCorrelation>>,
    /// Warning if a duplicate record was found for this item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_warning: Option<String>,
}
