//! L4-01: Symptom Journal — backend types and repository functions.
//!
//! View types for the symptom journal (recording, history, correlation,
//! nudge logic, category/subcategory data), plus query functions that
//! operate against the existing L0-02 symptoms table.

use chrono::{Local, NaiveDate};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::SymptomSource;

// ═══════════════════════════════════════════
// Constants — Categories, Subcategories, Body Regions
// ═══════════════════════════════════════════

pub const CATEGORIES: &[&str] = &[
    "Pain",
    "Digestive",
    "Respiratory",
    "Neurological",
    "General",
    "Mood",
    "Skin",
    "Other",
];

pub fn subcategories_for(category: &str) -> Vec<&'static str> {
    match category {
        "Pain" => vec![
            "Headache", "Back pain", "Joint pain", "Chest pain",
            "Abdominal pain", "Muscle pain", "Neck pain", "Other",
        ],
        "Digestive" => vec![
            "Nausea", "Vomiting", "Diarrhea", "Constipation",
            "Bloating", "Heartburn", "Loss of appetite", "Other",
        ],
        "Respiratory" => vec![
            "Shortness of breath", "Cough", "Wheezing",
            "Chest tightness", "Sore throat", "Congestion", "Other",
        ],
        "Neurological" => vec![
            "Dizziness", "Numbness", "Tingling", "Tremor",
            "Memory issues", "Confusion", "Other",
        ],
        "General" => vec![
            "Fatigue", "Fever", "Chills", "Weight change",
            "Night sweats", "Swelling", "Other",
        ],
        "Mood" => vec![
            "Anxiety", "Low mood", "Irritability", "Sleep difficulty",
            "Difficulty concentrating", "Other",
        ],
        "Skin" => vec![
            "Rash", "Itching", "Bruising", "Dryness",
            "Swelling", "Color change", "Other",
        ],
        "Other" => vec!["Other"],
        _ => vec![],
    }
}

pub const BODY_REGIONS: &[&str] = &[
    "head", "face", "neck",
    "chest_left", "chest_right", "chest_center",
    "abdomen_upper", "abdomen_lower",
    "back_upper", "back_lower",
    "shoulder_left", "shoulder_right",
    "arm_left", "arm_right",
    "hand_left", "hand_right",
    "hip_left", "hip_right",
    "leg_left", "leg_right",
    "knee_left", "knee_right",
    "foot_left", "foot_right",
];

// ═══════════════════════════════════════════
// View types — serialised to frontend
// ═══════════════════════════════════════════

/// Input for recording a new symptom (from guided flow).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomEntry {
    pub category: String,
    pub specific: String,
    pub severity: u8,
    pub onset_date: String, // YYYY-MM-DD
    pub onset_time: Option<String>, // HH:MM or null
    pub body_region: Option<String>,
    pub duration: Option<String>,
    pub character: Option<String>,
    pub aggravating: Vec<String>,
    pub relieving: Vec<String>,
    pub timing_pattern: Option<String>,
    pub notes: Option<String>,
}

/// Stored symptom with joined metadata for history display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSymptom {
    pub id: String,
    pub category: String,
    pub specific: String,
    pub severity: u8,
    pub body_region: Option<String>,
    pub duration: Option<String>,
    pub character: Option<String>,
    pub aggravating: Option<String>,
    pub relieving: Option<String>,
    pub timing_pattern: Option<String>,
    pub onset_date: String,
    pub onset_time: Option<String>,
    pub recorded_date: String,
    pub still_active: bool,
    pub resolved_date: Option<String>,
    pub related_medication_name: Option<String>,
    pub related_diagnosis_name: Option<String>,
    pub notes: Option<String>,
    pub source: String,
}

/// Temporal correlation — medication change near symptom onset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalCorrelation {
    pub medication_name: String,
    pub medication_change_date: String,
    pub days_since_change: i64,
    pub message: String,
}

/// Result of recording a symptom.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResult {
    pub symptom_id: String,
    pub correlations: Vec<TemporalCorrelation>,
}

/// Check-in nudge decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NudgeDecision {
    pub should_nudge: bool,
    pub nudge_type: Option<String>, // "DailyCheckIn" or "PostMedicationChange"
    pub message: Option<String>,
    pub related_medication: Option<String>,
}

/// Symptom history filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomFilter {
    pub category: Option<String>,
    pub severity_min: Option<u8>,
    pub severity_max: Option<u8>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub still_active: Option<bool>,
}

/// Category info with subcategories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub name: String,
    pub subcategories: Vec<String>,
}

// ═══════════════════════════════════════════
// Repository functions
// ═══════════════════════════════════════════

/// Records a new symptom entry. Returns the generated UUID.
pub fn record_symptom(conn: &Connection, entry: &SymptomEntry) -> Result<Uuid, DatabaseError> {
    let symptom_id = Uuid::new_v4();
    let now = Local::now().naive_local().format("%Y-%m-%d %H:%M:%S").to_string();

    let aggravating = if entry.aggravating.is_empty() {
        None
    } else {
        Some(entry.aggravating.join(", "))
    };
    let relieving = if entry.relieving.is_empty() {
        None
    } else {
        Some(entry.relieving.join(", "))
    };

    conn.execute(
        "INSERT INTO symptoms (id, category, specific, severity, body_region,
         duration, character, aggravating, relieving, timing_pattern,
         onset_date, onset_time, recorded_date, still_active, source, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1, ?14, ?15)",
        params![
            symptom_id.to_string(),
            entry.category,
            entry.specific,
            entry.severity as i32,
            entry.body_region,
            entry.duration,
            entry.character,
            aggravating,
            relieving,
            entry.timing_pattern,
            entry.onset_date,
            entry.onset_time,
            now,
            SymptomSource::PatientReported.as_str(),
            entry.notes,
        ],
    )?;

    Ok(symptom_id)
}

/// Fetches symptom history with optional filters, joined with medication/diagnosis names.
pub fn fetch_symptoms_filtered(
    conn: &Connection,
    filter: &Option<SymptomFilter>,
) -> Result<Vec<StoredSymptom>, DatabaseError> {
    let mut sql = String::from(
        "SELECT s.id, s.category, s.specific, s.severity, s.body_region,
                s.duration, s.character, s.aggravating, s.relieving, s.timing_pattern,
                s.onset_date, s.onset_time, s.recorded_date, s.still_active,
                s.resolved_date, s.notes, s.source,
                m.generic_name AS med_name,
                d.name AS diag_name
         FROM symptoms s
         LEFT JOIN medications m ON s.related_medication_id = m.id
         LEFT JOIN diagnoses d ON s.related_diagnosis_id = d.id
         WHERE 1=1"
    );

    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut param_idx = 1u32;

    if let Some(ref f) = filter {
        if let Some(ref cat) = f.category {
            sql.push_str(&format!(" AND s.category = ?{param_idx}"));
            params_vec.push(Box::new(cat.clone()));
            param_idx += 1;
        }
        if let Some(min) = f.severity_min {
            sql.push_str(&format!(" AND s.severity >= ?{param_idx}"));
            params_vec.push(Box::new(min as i32));
            param_idx += 1;
        }
        if let Some(max) = f.severity_max {
            sql.push_str(&format!(" AND s.severity <= ?{param_idx}"));
            params_vec.push(Box::new(max as i32));
            param_idx += 1;
        }
        if let Some(ref from) = f.date_from {
            sql.push_str(&format!(" AND s.onset_date >= ?{param_idx}"));
            params_vec.push(Box::new(from.clone()));
            param_idx += 1;
        }
        if let Some(ref to) = f.date_to {
            sql.push_str(&format!(" AND s.onset_date <= ?{param_idx}"));
            params_vec.push(Box::new(to.clone()));
            param_idx += 1;
        }
        if let Some(active) = f.still_active {
            sql.push_str(&format!(" AND s.still_active = ?{param_idx}"));
            params_vec.push(Box::new(active as i32));
            param_idx += 1;
        }
    }
    let _ = param_idx; // suppress unused warning

    sql.push_str(" ORDER BY s.recorded_date DESC");

    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), |row| {
        let still_active_int: i32 = row.get(13)?;
        Ok(StoredSymptom {
            id: row.get(0)?,
            category: row.get(1)?,
            specific: row.get(2)?,
            severity: row.get::<_, i32>(3)? as u8,
            body_region: row.get(4)?,
            duration: row.get(5)?,
            character: row.get(6)?,
            aggravating: row.get(7)?,
            relieving: row.get(8)?,
            timing_pattern: row.get(9)?,
            onset_date: row.get(10)?,
            onset_time: row.get(11)?,
            recorded_date: row.get(12)?,
            still_active: still_active_int != 0,
            resolved_date: row.get(14)?,
            notes: row.get(15)?,
            source: row.get(16)?,
            related_medication_name: row.get(17)?,
            related_diagnosis_name: row.get(18)?,
        })
    })?;

    let mut symptoms = Vec::new();
    for row in rows {
        symptoms.push(row?);
    }
    Ok(symptoms)
}

/// Marks a symptom as resolved (no longer active).
pub fn resolve_symptom(conn: &Connection, symptom_id: &str) -> Result<(), DatabaseError> {
    let today = Local::now().date_naive().to_string();
    let updated = conn.execute(
        "UPDATE symptoms SET still_active = 0, resolved_date = ?1 WHERE id = ?2",
        params![today, symptom_id],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Symptom".into(),
            id: symptom_id.into(),
        });
    }
    Ok(())
}

/// Hard-deletes a symptom entry.
pub fn delete_symptom(conn: &Connection, symptom_id: &str) -> Result<(), DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM symptoms WHERE id = ?1",
        params![symptom_id],
    )?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Symptom".into(),
            id: symptom_id.into(),
        });
    }
    Ok(())
}

/// Detects medication changes within 14 days of symptom onset date.
pub fn detect_temporal_correlation(
    conn: &Connection,
    onset_date_str: &str,
) -> Result<Vec<TemporalCorrelation>, DatabaseError> {
    let onset = NaiveDate::parse_from_str(onset_date_str, "%Y-%m-%d")
        .map_err(|e| DatabaseError::ConstraintViolation(format!("Invalid onset date: {e}")))?;
    let window_start = onset - chrono::Duration::days(14);

    let mut correlations = Vec::new();

    // 1. New medications started within the 14-day window
    {
        let mut stmt = conn.prepare(
            "SELECT m.generic_name, m.start_date
             FROM medications m
             WHERE m.start_date BETWEEN ?1 AND ?2
             ORDER BY m.start_date DESC"
        )?;

        let rows = stmt.query_map(
            params![window_start.to_string(), onset_date_str],
            |row| {
                let name: String = row.get(0)?;
                let start_date_str: String = row.get(1)?;
                Ok((name, start_date_str))
            },
        )?;

        for row in rows {
            let (name, start_date_str) = row?;
            if let Ok(start_date) = NaiveDate::parse_from_str(&start_date_str, "%Y-%m-%d") {
                let days = (onset - start_date).num_days();
                correlations.push(TemporalCorrelation {
                    medication_name: name.clone(),
                    medication_change_date: start_date_str,
                    days_since_change: days,
                    message: format!(
                        "You started {} on {}. If you think this might be related, mention it to your doctor at your next visit.",
                        name,
                        start_date.format("%B %d")
                    ),
                });
            }
        }
    }

    // 2. Dose changes within the 14-day window
    {
        let mut stmt = conn.prepare(
            "SELECT m.generic_name, dc.change_date
             FROM dose_changes dc
             JOIN medications m ON dc.medication_id = m.id
             WHERE dc.change_date BETWEEN ?1 AND ?2
             ORDER BY dc.change_date DESC"
        )?;

        let rows = stmt.query_map(
            params![window_start.to_string(), onset_date_str],
            |row| {
                let name: String = row.get(0)?;
                let change_date_str: String = row.get(1)?;
                Ok((name, change_date_str))
            },
        )?;

        for row in rows {
            let (name, change_date_str) = row?;
            if let Ok(change_date) = NaiveDate::parse_from_str(&change_date_str, "%Y-%m-%d") {
                let days = (onset - change_date).num_days();
                correlations.push(TemporalCorrelation {
                    medication_name: name.clone(),
                    medication_change_date: change_date_str,
                    days_since_change: days,
                    message: format!(
                        "Your dose of {} was changed on {}. If you think this might be related, mention it to your doctor at your next visit.",
                        name,
                        change_date.format("%B %d")
                    ),
                });
            }
        }
    }

    correlations.sort_by_key(|c| c.days_since_change);
    Ok(correlations)
}

/// Determines whether to show a check-in nudge.
pub fn check_nudge(conn: &Connection) -> Result<NudgeDecision, DatabaseError> {
    let today = Local::now().date_naive();
    let seven_days_ago = (today - chrono::Duration::days(7)).to_string();

    // 1. Post-medication-change nudge (higher priority)
    let recent_med: Option<(String, String)> = conn
        .query_row(
            "SELECT m.generic_name, m.start_date
             FROM medications m
             WHERE m.start_date >= ?1
             AND m.status = 'active'
             ORDER BY m.start_date DESC
             LIMIT 1",
            params![seven_days_ago],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .ok();

    if let Some((med_name, start_date_str)) = recent_med {
        // Check if there's already a symptom entry since this medication started
        let has_entry: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM symptoms WHERE recorded_date >= ?1",
            params![start_date_str],
            |row| row.get(0),
        )?;

        if !has_entry {
            if let Ok(start_date) = NaiveDate::parse_from_str(&start_date_str, "%Y-%m-%d") {
                return Ok(NudgeDecision {
                    should_nudge: true,
                    nudge_type: Some("PostMedicationChange".into()),
                    message: Some(format!(
                        "You started {} on {}. Over the next few days, would you like to track how you're feeling? This can help your doctor understand how you're responding.",
                        med_name,
                        start_date.format("%B %d")
                    )),
                    related_medication: Some(med_name),
                });
            }
        }
    }

    // 2. Daily check-in nudge (3 days no entry + active symptoms)
    let last_entry_date: Option<String> = conn
        .query_row(
            "SELECT MAX(DATE(recorded_date)) FROM symptoms",
            [],
            |row| row.get(0),
        )
        .ok()
        .flatten();

    let active_symptoms: i64 = conn.query_row(
        "SELECT COUNT(*) FROM symptoms WHERE still_active = 1",
        [],
        |row| row.get(0),
    )?;

    if let Some(ref last_str) = last_entry_date {
        if let Ok(last_date) = NaiveDate::parse_from_str(last_str, "%Y-%m-%d") {
            let days_since = (today - last_date).num_days();
            if days_since >= 3 && active_symptoms > 0 {
                return Ok(NudgeDecision {
                    should_nudge: true,
                    nudge_type: Some("DailyCheckIn".into()),
                    message: Some(
                        "It's been a few days \u{2014} would you like to note how you're feeling?"
                            .into(),
                    ),
                    related_medication: None,
                });
            }
        }
    }

    Ok(NudgeDecision {
        should_nudge: false,
        nudge_type: None,
        message: None,
        related_medication: None,
    })
}

/// Returns all symptom categories with their subcategories.
pub fn get_symptom_categories() -> Vec<CategoryInfo> {
    CATEGORIES
        .iter()
        .map(|&cat| CategoryInfo {
            name: cat.to_string(),
            subcategories: subcategories_for(cat)
                .iter()
                .map(|s| s.to_string())
                .collect(),
        })
        .collect()
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
