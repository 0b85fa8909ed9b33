use crate::models::*;

use super::types::{AssembledContext, QueryType, RetrievedContext, ScoredChunk};

const MAX_CONTEXT_TOKENS: usize = 3000;

/// English text averages ~4 chars/token for subword tokenizers.
const CHARS_PER_TOKEN_EN: usize = 4;
/// French text averages ~3.3 chars/token due to longer words and diacritics.
/// M.7: Use a conservative estimate to avoid exceeding token budget.
const CHARS_PER_TOKEN_FR: usize = 3;

/// Detect if text is predominantly French using common French markers.
fn detect_french_content(text: &str) -> bool {
    let lower = text.to_lowercase();
    let french_markers = [
        " le ", " la ", " les ", " des ", " du ", " un ", " une ",
        " de ", " est ", " sont ", " avec ", " pour ", " dans ",
        " qui ", " que ", " ce ", " cette ", " ces ",
        "é", "è", "ê", "à", "ù", "ç", "ô", "î",
    ];
    let hits: usize = french_markers.iter().filter(|m| lower.contains(*m)).count();
    hits >= 5
}

/// Get max context chars based on content language.
fn max_context_chars(text_sample: &str) -> usize {
    let ratio = if detect_french_content(text_sample) {
        CHARS_PER_TOKEN_FR
    } else {
        CHARS_PER_TOKEN_EN
    };
    MAX_CONTEXT_TOKENS * ratio
}

/// Estimate tokens for a given text based on language.
fn estimate_tokens(text: &str) -> usize {
    let ratio = if detect_french_content(text) {
        CHARS_PER_TOKEN_FR
    } else {
        CHARS_PER_TOKEN_EN
    };
    text.len() / ratio
}

/// Assemble retrieved context into a structured prompt section.
/// Prioritizes: allergies > semantic chunks > medications > diagnoses > labs > symptoms.
/// M.7: Budget is language-aware — French text gets a tighter char limit to stay within token budget.
pub fn assemble_context(
    retrieved: &RetrievedContext,
    query_type: &QueryType,
) -> AssembledContext {
    // M.7: Sample content to detect language for token budget adjustment
    let content_sample: String = retrieved
        .semantic_chunks
        .iter()
        .take(3)
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let budget = max_context_chars(&content_sample);

    let mut sections = Vec::new();
    let mut total_chars = 0;

    // Priority 1: Allergies (always include — safety critical)
    if !retrieved.structured_data.allergies.is_empty() {
        let section = format_allergies(&retrieved.structured_data.allergies);
        total_chars += section.len();
        sections.push(("KNOWN ALLERGIES", section));
    }

    // Priority 2: Most relevant semantic chunks (ordered by score)
    let mut chunks = retrieved.semantic_chunks.clone();
    chunks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut chunks_included = Vec::new();
    for chunk in &chunks {
        if total_chars >= budget {
            break;
        }
        let section = format_chunk(chunk);
        if total_chars + section.len() <= budget {
            total_chars += section.len();
            sections.push(("DOCUMENT EXCERPT", section));
            chunks_included.push(chunk.clone());
        }
    }

    // Priority 3: Active medications (if room)
    if !retrieved.structured_data.medications.is_empty() && total_chars < budget {
        let section = format_medications(&retrieved.structured_data.medications);
        if total_chars + section.len() <= budget {
            total_chars += section.len();
            sections.push(("CURRENT MEDICATIONS", section));
        }
    }

    // Priority 4: Active diagnoses (if room)
    if !retrieved.structured_data.diagnoses.is_empty() && total_chars < budget {
        let section = format_diagnoses(&retrieved.structured_data.diagnoses);
        if total_chars + section.len() <= budget {
            total_chars += section.len();
            sections.push(("ACTIVE DIAGNOSES", section));
        }
    }

    // Priority 5: Lab results (if room)
    if !retrieved.structured_data.lab_results.is_empty() && total_chars < budget {
        let section = format_labs(&retrieved.structured_data.lab_results);
        if total_chars + section.len() <= budget {
            total_chars += section.len();
            sections.push(("RECENT LAB RESULTS", section));
        }
    }

    // Priority 6: Recent symptoms (for symptom queries)
    if *query_type == QueryType::Symptom
        && !retrieved.structured_data.symptoms.is_empty()
        && total_chars < budget
    {
        let section = format_symptoms(&retrieved.structured_data.symptoms);
        if total_chars + section.len() <= budget {
            let _ = total_chars + section.len(); // last section, no further budget check
            sections.push(("RECENT SYMPTOMS", section));
        }
    }

    let context_text = sections
        .iter()
        .map(|(label, content)| format!("<{label}>\n{content}\n</{label}>"))
        .collect::<Vec<_>>()
        .join("\n\n");

    let estimated_tokens = estimate_tokens(&context_text);

    AssembledContext {
        text: context_text,
        estimated_tokens,
        chunks_included,
    }
}

fn format_allergies(allergies: &[Allergy]) -> String {
    allergies
        .iter()
        .map(|a| {
            format!(
                "- {} (severity: {}, reaction: {})",
                a.allergen,
                a.severity.as_str(),
                a.reaction.as_deref().unwrap_or("not specified")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_chunk(chunk: &ScoredChunk) -> String {
    let mut text = String::new();
    if let Some(ref date) = chunk.doc_date {
        text.push_str(&format!("[Date: {date}] "));
    }
    if let Some(ref prof) = chunk.professional_name {
        text.push_str(&format!("[From: {prof}] "));
    }
    text.push_str(&format!("[Doc ID: {}]\n", chunk.document_id));
    text.push_str(&chunk.content);
    text
}

fn format_medications(meds: &[Medication]) -> String {
    meds.iter()
        .map(|m| {
            format!(
                "- {} {} {} ({})",
                m.generic_name,
                m.dose,
                m.frequency,
                m.status.as_str(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_diagnoses(diagnoses: &[Diagnosis]) -> String {
    diagnoses
        .iter()
        .map(|d| format!("- {} (status: {})", d.name, d.status.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_labs(labs: &[LabResult]) -> String {
    labs.iter()
        .take(10)
        .map(|l| {
            format!(
                "- {}: {} {} (flag: {})",
                l.test_name,
                l.value
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| l.value_text.clone().unwrap_or_default()),
                l.unit.as_deref().unwrap_or(""),
                l.abnormal_flag.as_str(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_symptoms(symptoms: &[Symptom]) -> String {
    symptoms
        .iter()
        .take(5)
        .map(|s| {
            format!(
                "- {} ({}): severity {}/5, since {}",
                s.specific, s.category, s.severity, s.onset_date
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
