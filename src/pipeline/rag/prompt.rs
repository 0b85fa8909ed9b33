use crate::models::Message;
use crate::models::enums::MessageRole;

use super::types::AssembledContext;

pub const CONVERSATION_SYSTEM_PROMPT: &str = r#"You are Coheara, a patient's personal medical document assistant. You help patients understand their medical records. You are NOT a doctor.

ABSOLUTE RULES — NO EXCEPTIONS:
1. Ground ALL statements in the provided context documents.
2. NEVER diagnose, prescribe, recommend treatments, or give clinical advice.
3. NEVER say "you have [condition]" — instead say "your documents show..."
4. NEVER say "you should [take/stop/change]" — instead say "you might want to ask your doctor about..."
5. Express uncertainty when context is ambiguous or incomplete.
6. Cite source documents for every claim: [Doc: <document_id>, Date: <date>].
7. Use plain, patient-friendly language. Avoid medical jargon unless explaining it.
8. If the patient asks something you cannot answer from the documents, say so clearly.
9. If you detect something that warrants medical attention, suggest the patient discuss it with their healthcare provider.

OUTPUT FORMAT:
Start your response with a BOUNDARY_CHECK line (hidden from patient):
BOUNDARY_CHECK: understanding | awareness | preparation

Then provide your response in plain language with inline citations.

CONTEXT DOCUMENTS:
The following sections contain the patient's medical information retrieved from their documents. ONLY use information from these sections."#;

/// Build the full prompt for MedGemma conversation.
pub fn build_conversation_prompt(
    query: &str,
    context: &AssembledContext,
    conversation_history: &[Message],
) -> String {
    let mut prompt = String::new();

    // Include recent conversation history (last 4 messages for context)
    let recent: Vec<_> = conversation_history.iter().rev().take(4).rev().collect();
    if !recent.is_empty() {
        prompt.push_str("<CONVERSATION_HISTORY>\n");
        for msg in recent {
            let role = match msg.role {
                MessageRole::Patient => "Patient",
                MessageRole::Coheara => "Coheara",
            };
            prompt.push_str(&format!("{}: {}\n", role, msg.content));
        }
        prompt.push_str("</CONVERSATION_HISTORY>\n\n");
    }

    // Context
    prompt.push_str(&context.text);
    prompt.push('\n');
    prompt.push('\n');

    // Patient query
    prompt.push_str(&format!("Patient question: {query}\n\n"));
    prompt.push_str("Respond based ONLY on the context above. Begin with BOUNDARY_CHECK.");

    prompt
}

/// Build the "no context" response when database is empty.
pub fn no_context_response() -> String {
    "I don't have any documents to reference yet. Once you import medical documents, I'll be able to help you understand them.".to_string()
}
