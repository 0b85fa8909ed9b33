use serde::Deserialize;

use super::types::{ExtractedEntities, ExtractedProfessional};
use super::StructuringError;

/// Parse MedGemma's response into structured entities and Markdown.
pub fn parse_structuring_response(
    response: &str,
) -> Result<(ExtractedEntities, String, Option<RawDocumentMeta>), StructuringError> {
    let (json_str, markdown) = extract_json_and_markdown(response)?;
    let (entities, meta) = parse_entities_json(&json_str)?;
    Ok((entities, markdown, Some(meta)))
}

/// Metadata extracted from the top-level JSON (document_type, date, professional)
#[derive(Debug, Clone)]
pub struct RawDocumentMeta {
    pub document_type: Option<String>,
    pub document_date: Option<String>,
    pub professional: Option<ExtractedProfessional>,
}

/// Extract the JSON block and Markdown from MedGemma's response.
fn extract_json_and_markdown(response: &str) -> Result<(String, String), StructuringError> {
    let json_start = response
        .find("```json")
        .ok_or_else(|| StructuringError::MalformedResponse("No JSON block found".into()))?;
    let json_content_start = json_start + 7;

    let json_end = response[json_content_start..]
        .find("```")
        .ok_or_else(|| StructuringError::MalformedResponse("Unclosed JSON block".into()))?;

    let json_str = response[json_content_start..json_content_start + json_end]
        .trim()
        .to_string();

    let markdown_start = json_content_start + json_end + 3;
    let markdown = if markdown_start < response.len() {
        response[markdown_start..].trim().to_string()
    } else {
        String::new()
    };

    Ok((json_str, markdown))
}

/// Parse the JSON string into ExtractedEntities and raw document metadata.
fn parse_entities_json(
    json_str: &str,
) -> Result<(ExtractedEntities, RawDocumentMeta), StructuringError> {
    #[derive(Deserialize)]
    struct RawResponse {
        document_type: Option<String>,
        document_date: Option<String>,
        professional: Option<serde_json::Value>,
        medications: Option<Vec<serde_json::Value>>,
        lab_results: Option<Vec<serde_json::Value>>,
        diagnoses: Option<Vec<serde_json::Value>>,
        allergies: Option<Vec<serde_json::Value>>,
        procedures: Option<Vec<serde_json::Value>>,
        referrals: Option<Vec<serde_json::Value>>,
        instructions: Option<Vec<serde_json::Value>>,
    }

    let raw: RawResponse = serde_json::from_str(json_str)
        .map_err(|e| StructuringError::JsonParsing(e.to_string()))?;

    let professional: Option<ExtractedProfessional> =
        raw.professional.and_then(|v| serde_json::from_value(v).ok());

    let meta = RawDocumentMeta {
        document_type: raw.document_type,
        document_date: raw.document_date,
        professional: professional.clone(),
    };

    let entities = ExtractedEntities {
        medications: parse_array_lenient(raw.medications.as_deref()),
        lab_results: parse_array_lenient(raw.lab_results.as_deref()),
        diagnoses: parse_array_lenient(raw.diagnoses.as_deref()),
        allergies: parse_array_lenient(raw.allergies.as_deref()),
        procedures: parse_array_lenient(raw.procedures.as_deref()),
        referrals: parse_array_lenient(raw.referrals.as_deref()),
        instructions: parse_array_lenient(raw.instructions.as_deref()),
    };

    Ok((entities, meta))
}

/// Parse an array leniently — skip items that fail to deserialize.
fn parse_array_lenient<T: for<'de> Deserialize<'de>>(
    items: Option<&[serde_json::Value]>,
) -> Vec<T> {
    match items {
        None => vec![],
        Some(arr) => arr
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect(),
    }
}
