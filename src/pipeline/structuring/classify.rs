use chrono::NaiveDate;

use super::types::ExtractedEntities;
use crate::models::enums::DocumentType;

/// Classify document type from MedGemma's response string.
/// Handles English and French document type names.
pub fn classify_document_type(type_str: &str) -> DocumentType {
    match type_str.to_lowercase().trim() {
        // English
        "prescription" => DocumentType::Prescription,
        "lab_result" | "lab result" | "laboratory" => DocumentType::LabResult,
        "clinical_note" | "clinical note" | "consultation" => DocumentType::ClinicalNote,
        "discharge_summary" | "discharge summary" | "discharge" => DocumentType::DischargeSummary,
        "radiology_report" | "radiology report" | "radiology" | "imaging" => {
            DocumentType::RadiologyReport
        }
        "pharmacy_record" | "pharmacy record" | "pharmacy" => DocumentType::PharmacyRecord,
        // French (K.1)
        "ordonnance" => DocumentType::Prescription,
        "résultat" | "résultats" | "résultat de laboratoire" | "résultats de laboratoire"
        | "bilan sanguin" | "bilan biologique" | "analyse" | "analyses" => DocumentType::LabResult,
        "note clinique" | "compte rendu" | "compte-rendu" | "consultation médicale" => {
            DocumentType::ClinicalNote
        }
        "lettre de sortie" | "résumé de sortie" | "compte rendu de sortie" => {
            DocumentType::DischargeSummary
        }
        "radiologie" | "imagerie" | "compte rendu radiologique" | "irm" | "scanner" => {
            DocumentType::RadiologyReport
        }
        "pharmacie" | "fiche pharmacie" | "dispensation" => DocumentType::PharmacyRecord,
        _ => DocumentType::Other,
    }
}

/// Infer document type from extracted entities when classifier returns Other (K.2).
pub fn classify_from_entities(entities: &ExtractedEntities) -> DocumentType {
    let has_meds = !entities.medications.is_empty();
    let has_labs = !entities.lab_results.is_empty();
    let has_procedures = !entities.procedures.is_empty();
    let has_referrals = !entities.referrals.is_empty();

    // Strong signals
    if has_labs && !has_meds {
        return DocumentType::LabResult;
    }
    if has_meds && !has_labs && !has_procedures {
        return DocumentType::Prescription;
    }

    // Mixed content
    if has_procedures && has_meds {
        return DocumentType::ClinicalNote;
    }
    if has_referrals {
        return DocumentType::ClinicalNote;
    }

    DocumentType::Other
}

/// Parse a date string from MedGemma output (handles various formats).
/// Supports: ISO 8601, European DD/MM/YYYY, US MM/DD/YYYY, French textual dates.
pub fn parse_document_date(date_str: &str) -> Option<NaiveDate> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() || trimmed == "null" || trimmed == "NOT_FOUND" {
        return None;
    }

    // ISO 8601: YYYY-MM-DD
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(d);
    }
    // European: DD/MM/YYYY
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%d/%m/%Y") {
        return Some(d);
    }
    // European dash: DD-MM-YYYY
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%d-%m-%Y") {
        return Some(d);
    }
    // US: MM/DD/YYYY
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%m/%d/%Y") {
        return Some(d);
    }
    // French textual: "15 janvier 2024", "1er mars 2024" (K.3)
    if let Some(d) = parse_french_textual_date(trimmed) {
        return Some(d);
    }
    None
}

/// Parse French textual date like "15 janvier 2024" or "1er mars 2024".
fn parse_french_textual_date(text: &str) -> Option<NaiveDate> {
    let lower = text.to_lowercase();
    let parts: Vec<&str> = lower.split_whitespace().collect();
    if parts.len() < 3 {
        return None;
    }

    // Parse day (handle "1er")
    let day_str = parts[0].trim_end_matches("er").trim_end_matches("ème");
    let day: u32 = day_str.parse().ok()?;

    // Parse month
    let month = match parts[1] {
        "janvier" => 1,
        "février" | "fevrier" => 2,
        "mars" => 3,
        "avril" => 4,
        "mai" => 5,
        "juin" => 6,
        "juillet" => 7,
        "août" | "aout" => 8,
        "septembre" => 9,
        "octobre" => 10,
        "novembre" => 11,
        "décembre" | "decembre" => 12,
        _ => return None,
    };

    // Parse year
    let year: i32 = parts[2].parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)
}
