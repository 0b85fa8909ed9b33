//! Patient context loading for the extraction pipeline.
//!
//! Loads current patient data from the database to provide disambiguation
//! context to the LLM during extraction. Active medications, recent symptoms,
//! allergies, and known professionals help the LLM produce better extractions.

use chrono::Utc;
use rusqlite::Connection;

use super::error::ExtractionError;
use super::types::{ActiveMedicationSummary, PatientContext, ProfessionalSummary, RecentSymptomSummary};
use crate::db::repository::{
    get_active_medications, get_all_allergies, get_all_professionals, get_symptoms_in_date_range,
};

/// Load patient context from the database for extraction disambiguation.
///
/// Pulls active medications, recent symptoms (last 30 days), all allergies,
/// and all known professionals. Falls back to empty context on any failure.
pub fn load_patient_context(conn: &Connection) -> Result<PatientContext, ExtractionError> {
    let today = Utc::now().date_naive();
    let thirty_days_ago = today - chrono::Duration::days(30);

    let active_medications = load_active_medications(conn)?;
    let recent_symptoms = load_recent_symptoms(conn, &thirty_days_ago, &today)?;
    let known_allergies = load_known_allergies(conn)?;
    let known_professionals = load_known_professionals(conn)?;

    Ok(PatientContext {
        active_medications,
        recent_symptoms,
        known_allergies,
        known_professionals,
        date_of_birth: None, // Profile DOB not yet in schema
    })
}

fn load_active_medications(conn: &Connection) -> Result<Vec<ActiveMedicationSummary>, ExtractionError> {
    let meds = get_active_medications(conn)?;
    Ok(meds
        .iter()
        .map(|m| ActiveMedicationSummary {
            name: m.generic_name.clone(),
            dose: m.dose.clone(),
            frequency: m.frequency.clone(),
        })
        .collect())
}

fn load_recent_symptoms(
    conn: &Connection,
    from: &chrono::NaiveDate,
    to: &chrono::NaiveDate,
) -> Result<Vec<RecentSymptomSummary>, ExtractionError> {
    let symptoms = get_symptoms_in_date_range(conn, from, to)?;
    Ok(symptoms
        .iter()
        .map(|s| RecentSymptomSummary {
            category: s.category.clone(),
            specific: s.specific.clone(),
            severity: s.severity,
            onset_date: s.onset_date,
        })
        .collect())
}

fn load_known_allergies(conn: &Connection) -> Result<Vec<String>, ExtractionError> {
    let allergies = get_all_allergies(conn)?;
    Ok(allergies.iter().map(|a| a.allergen.clone()).collect())
}

fn load_known_professionals(conn: &Connection) -> Result<Vec<ProfessionalSummary>, ExtractionError> {
    let professionals = get_all_professionals(conn)?;
    Ok(professionals
        .iter()
        .map(|p| ProfessionalSummary {
            name: p.name.clone(),
            specialty: p.specialty.clone(),
        })
        .collect())
}
