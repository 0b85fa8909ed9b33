//! M0-04: Sync Engine — version-based delta sync between desktop and phone.
//!
//! The sync engine keeps the phone's cache current without mirroring the desktop
//! database. Each entity type has a monotonic version counter. When the phone
//! connects, it sends its known versions; the desktop returns only what changed.
//!
//! Six entity types: medications, labs, timeline, alerts, appointments, profile.
//!
//! Journal entries flow phone → desktop (piggybacked on sync requests).

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;

// ═══════════════════════════════════════════════════════════════════════════
// Sync Version Types
// ═══════════════════════════════════════════════════════════════════════════

/// Version counters for all 6 entity types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncVersions {
    pub medications: i64,
    pub labs: i64,
    pub timeline: i64,
    pub alerts: i64,
    pub appointments: i64,
    pub profile: i64,
}

/// Sync request from phone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub versions: SyncVersions,
    #[serde(default)]
    pub journal_entries: Vec<MobileJournalEntry>,
}

/// Sync response to phone. Fields are `None` if that entity type hasn't changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medications: Option<Vec<CachedMedication>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labs: Option<Vec<CachedLabResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Vec<CachedTimelineEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts: Option<Vec<CachedAlert>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment: Option<CachedAppointment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<CachedProfile>,
    pub versions: SyncVersions,
    pub synced_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_sync: Option<JournalSyncResult>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Cached Entity Types (curated payloads for phone)
// ═══════════════════════════════════════════════════════════════════════════

/// Curated medication for phone cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedMedication {
    pub id: String,
    pub generic_name: String,
    pub brand_name: Option<String>,
    pub dose: String,
    pub frequency: String,
    pub route: String,
    pub status: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub prescriber_name: Option<String>,
    pub condition: Option<String>,
    pub is_otc: bool,
}

/// Curated lab result for phone cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedLabResult {
    pub id: String,
    pub test_name: String,
    pub value: Option<f64>,
    pub value_text: Option<String>,
    pub unit: Option<String>,
    pub reference_range_low: Option<f64>,
    pub reference_range_high: Option<f64>,
    pub abnormal_flag: String,
    pub collection_date: String,
    pub is_abnormal: bool,
    /// Trend vs. prior result of the same test: "up", "down", "stable", or null.
    pub trend_direction: Option<String>,
}

/// Curated timeline event for phone cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedTimelineEvent {
    pub id: String,
    pub event_type: String,
    pub category: String,
    pub description: String,
    pub severity: Option<i32>,
    pub date: String,
    pub still_active: bool,
}

/// Curated alert for phone cache (matches phone `CachedAlert` type).
///
/// Currently populated from `dismissed_alerts` table only (all have `dismissed: true`).
/// Active (non-dismissed) alerts require coherence engine persistence (RS-L2-03-001).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAlert {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: String,
    pub created_at: String,
    pub dismissed: bool,
}

/// Curated appointment for phone cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAppointment {
    pub id: String,
    pub professional_name: String,
    pub professional_specialty: Option<String>,
    pub date: String,
    pub appointment_type: String,
    pub prep_available: bool,
}

/// Curated profile summary for phone cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedProfile {
    pub profile_name: String,
    pub total_documents: u32,
    pub extraction_accuracy: f64,
    pub allergies: Vec<CachedAllergy>,
}

/// Allergy summary within profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAllergy {
    pub allergen: String,
    pub severity: String,
    pub verified: bool,
}

// ═══════════════════════════════════════════════════════════════════════════
// Journal Sync Types (phone → desktop)
// ═══════════════════════════════════════════════════════════════════════════

/// Journal entry from phone (piggybacked on sync request).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobileJournalEntry {
    pub id: String,
    pub severity: i32,
    pub body_location: Option<String>,
    pub free_text: Option<String>,
    pub activity_context: Option<String>,
    pub symptom_chip: Option<String>,
    pub created_at: String,
}

/// Result of processing piggybacked journal entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalSyncResult {
    pub synced_ids: Vec<String>,
    pub correlations: Vec<JournalCorrelation>,
}

/// Medication-symptom correlation found during journal sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalCorrelation {
    pub entry_id: String,
    pub medication_name: String,
    pub days_since_change: i64,
    pub message: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// Version Counter Functions
// ═══════════════════════════════════════════════════════════════════════════

/// Get current sync versions from the database.
pub fn get_sync_versions(conn: &Connection) -> Result<SyncVersions, DatabaseError> {
    let mut versions = SyncVersions::default();

    let mut stmt = conn.prepare(
        "SELECT entity_type, version FROM sync_versions",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    for row in rows {
        let (entity_type, version) = row?;
        match entity_type.as_str() {
            "medications" => versions.medications = version,
            "labs" => versions.labs = version,
            "timeline" => versions.timeline = version,
            "alerts" => versions.alerts = version,
            "appointments" => versions.appointments = version,
            "profile" => versions.profile = version,
            _ => {}
        }
    }

    Ok(versions)
}

/// Check which entity types have changed between phone versions and desktop versions.
/// Returns (has_any_changes, changed_types_list).
pub fn diff_versions(phone: &SyncVersions, desktop: &SyncVersions) -> Vec<String> {
    let mut changed = Vec::new();
    if phone.medications < desktop.medications {
        changed.push("medications".to_string());
    }
    if phone.labs < desktop.labs {
        changed.push("labs".to_string());
    }
    if phone.timeline < desktop.timeline {
        changed.push("timeline".to_string());
    }
    if phone.alerts < desktop.alerts {
        changed.push("alerts".to_string());
    }
    if phone.appointments < desktop.appointments {
        changed.push("appointments".to_string());
    }
    if phone.profile < desktop.profile {
        changed.push("profile".to_string());
    }
    changed
}

// ═══════════════════════════════════════════════════════════════════════════
// Payload Assembly Functions
// ═══════════════════════════════════════════════════════════════════════════

/// Assemble curated medication payload (all active + recently discontinued).
pub fn assemble_medications(conn: &Connection) -> Result<Vec<CachedMedication>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.generic_name, m.brand_name, m.dose, m.frequency, m.route,
                m.status, m.start_date, m.end_date, m.condition, m.is_otc,
                p.name AS prescriber_name
         FROM medications m
         LEFT JOIN professionals p ON m.prescriber_id = p.id
         WHERE m.status = 'active'
            OR (m.status = 'stopped' AND m.end_date >= date('now', '-6 months'))
         ORDER BY m.status ASC, m.generic_name ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(CachedMedication {
            id: row.get(0)?,
            generic_name: row.get(1)?,
            brand_name: row.get(2)?,
            dose: row.get(3)?,
            frequency: row.get(4)?,
            route: row.get(5)?,
            status: row.get(6)?,
            start_date: row.get(7)?,
            end_date: row.get(8)?,
            condition: row.get(9)?,
            is_otc: row.get::<_, i32>(10)? != 0,
            prescriber_name: row.get(11)?,
        })
    })?;

    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Assemble recent lab results with abnormal flag and trend direction.
pub fn assemble_recent_labs(
    conn: &Connection,
    limit: u32,
) -> Result<Vec<CachedLabResult>, DatabaseError> {
    // Subquery computes trend by comparing each result's value to the prior
    // result of the same test type (by collection_date).
    let mut stmt = conn.prepare(
        "SELECT lr.id, lr.test_name, lr.value, lr.value_text, lr.unit,
                lr.reference_range_low, lr.reference_range_high, lr.abnormal_flag,
                lr.collection_date,
                (SELECT prev.value FROM lab_results prev
                 WHERE prev.test_name = lr.test_name
                   AND prev.collection_date < lr.collection_date
                   AND prev.value IS NOT NULL
                 ORDER BY prev.collection_date DESC
                 LIMIT 1) AS prev_value
         FROM lab_results lr
         ORDER BY lr.collection_date DESC
         LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit], |row| {
        let abnormal_flag: String = row.get(7)?;
        let is_abnormal = abnormal_flag != "normal";
        let current_value: Option<f64> = row.get(2)?;
        let prev_value: Option<f64> = row.get(9)?;

        let trend_direction = match (current_value, prev_value) {
            (Some(curr), Some(prev)) => {
                let diff = (curr - prev).abs();
                let threshold = prev.abs() * 0.01; // 1% tolerance for "stable"
                if diff <= threshold {
                    Some("stable".to_string())
                } else if curr > prev {
                    Some("up".to_string())
                } else {
                    Some("down".to_string())
                }
            }
            _ => None,
        };

        Ok(CachedLabResult {
            id: row.get(0)?,
            test_name: row.get(1)?,
            value: current_value,
            value_text: row.get(3)?,
            unit: row.get(4)?,
            reference_range_low: row.get(5)?,
            reference_range_high: row.get(6)?,
            abnormal_flag,
            collection_date: row.get(8)?,
            is_abnormal,
            trend_direction,
        })
    })?;

    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Assemble recent timeline events (symptoms/journal entries).
pub fn assemble_recent_timeline(
    conn: &Connection,
    limit: u32,
) -> Result<Vec<CachedTimelineEvent>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, category, specific, severity, onset_date, still_active
         FROM symptoms
         ORDER BY onset_date DESC
         LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit], |row| {
        let category: String = row.get(1)?;
        let specific: String = row.get(2)?;
        Ok(CachedTimelineEvent {
            id: row.get(0)?,
            event_type: "journal".to_string(),
            category: category.clone(),
            description: specific,
            severity: row.get(3)?,
            date: row.get(4)?,
            still_active: row.get::<_, i32>(5)? != 0,
        })
    })?;

    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Assemble alerts for phone cache.
///
/// Currently returns dismissed alerts only (with `dismissed: true`).
/// Active (non-dismissed) coherence alerts will be added when the alert store
/// is persisted to DB (RS-L2-03-001).
pub fn assemble_alerts(conn: &Connection) -> Result<Vec<CachedAlert>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, alert_type, reason, dismissed_date
         FROM dismissed_alerts
         ORDER BY dismissed_date DESC",
    )?;

    let rows = stmt.query_map([], |row| {
        let id: String = row.get(0)?;
        let alert_type: String = row.get(1)?;
        let reason: Option<String> = row.get(2)?;
        let dismissed_date: String = row.get(3)?;
        let severity = match alert_type.as_str() {
            "critical" | "emergency" => "critical",
            "conflict" | "contradiction" => "warning",
            _ => "info",
        };
        Ok(CachedAlert {
            id,
            title: format_alert_title(&alert_type),
            description: reason.unwrap_or_default(),
            severity: severity.to_string(),
            created_at: dismissed_date,
            dismissed: true,
        })
    })?;

    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Format alert type string into a human-readable title.
fn format_alert_title(alert_type: &str) -> String {
    match alert_type {
        "conflict" => "Medication Conflict".to_string(),
        "contradiction" => "Data Contradiction".to_string(),
        "critical" => "Critical Alert".to_string(),
        "emergency" => "Emergency Alert".to_string(),
        "duplicate" => "Duplicate Entry".to_string(),
        "gap" => "Coverage Gap".to_string(),
        "trend" => "Trend Alert".to_string(),
        other => other.replace('_', " "),
    }
}

/// Assemble next appointment (within 7 days).
pub fn assemble_next_appointment(
    conn: &Connection,
) -> Result<Option<CachedAppointment>, DatabaseError> {
    let result = conn.query_row(
        "SELECT a.id, p.name, p.specialty, a.date, a.type, a.pre_summary_generated
         FROM appointments a
         JOIN professionals p ON a.professional_id = p.id
         WHERE a.type = 'upcoming'
           AND a.date >= date('now')
           AND a.date <= date('now', '+7 days')
         ORDER BY a.date ASC
         LIMIT 1",
        [],
        |row| {
            Ok(CachedAppointment {
                id: row.get(0)?,
                professional_name: row.get(1)?,
                professional_specialty: row.get(2)?,
                date: row.get(3)?,
                appointment_type: row.get(4)?,
                prep_available: row.get::<_, i32>(5)? != 0,
            })
        },
    );

    match result {
        Ok(appt) => Ok(Some(appt)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Assemble profile summary (name, trust metrics, allergies).
pub fn assemble_profile_summary(
    conn: &Connection,
    profile_name: &str,
) -> Result<CachedProfile, DatabaseError> {
    let (total_documents, extraction_accuracy): (u32, f64) = conn.query_row(
        "SELECT total_documents, extraction_accuracy FROM profile_trust WHERE id = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT allergen, severity, verified FROM allergies",
    )?;

    let allergies: Vec<CachedAllergy> = stmt
        .query_map([], |row| {
            Ok(CachedAllergy {
                allergen: row.get(0)?,
                severity: row.get(1)?,
                verified: row.get::<_, i32>(2)? != 0,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();

    Ok(CachedProfile {
        profile_name: profile_name.to_string(),
        total_documents,
        extraction_accuracy,
        allergies,
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Journal Sync Processing (phone → desktop)
// ═══════════════════════════════════════════════════════════════════════════

/// Process journal entries piggybacked on sync request.
///
/// Uses INSERT OR IGNORE for idempotency (duplicate UUIDs are silently skipped).
/// After inserting, checks for medication-symptom temporal correlations.
pub fn process_journal_sync(
    conn: &Connection,
    entries: &[MobileJournalEntry],
) -> Result<JournalSyncResult, DatabaseError> {
    let mut synced_ids = Vec::new();
    let mut correlations = Vec::new();

    for entry in entries {
        // INSERT OR IGNORE for idempotency
        let rows_changed = conn.execute(
            "INSERT OR IGNORE INTO symptoms
             (id, category, specific, severity, body_region, onset_date, recorded_date, source, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'patient_reported', ?8)",
            params![
                entry.id,
                entry.symptom_chip.as_deref().unwrap_or("general"),
                entry.free_text.as_deref().unwrap_or(""),
                entry.severity,
                entry.body_location,
                entry.created_at,
                entry.created_at,
                entry.activity_context,
            ],
        )?;

        synced_ids.push(entry.id.clone());

        // Only check correlations for newly inserted entries
        if rows_changed > 0 {
            if let Ok(corrs) = find_medication_correlations(conn, entry) {
                correlations.extend(corrs);
            }
        }
    }

    Ok(JournalSyncResult {
        synced_ids,
        correlations,
    })
}

/// Find temporal correlations between a journal entry and recent medication changes.
///
/// Checks for dose changes within the last 14 days before the symptom onset.
fn find_medication_correlations(
    conn: &Connection,
    entry: &MobileJournalEntry,
) -> Result<Vec<JournalCorrelation>, DatabaseError> {
    let onset_date = entry.created_at.split('T').next().unwrap_or(&entry.created_at);

    let mut stmt = conn.prepare(
        "SELECT m.generic_name, dc.change_date,
                julianday(?1) - julianday(dc.change_date) AS days_diff
         FROM dose_changes dc
         JOIN medications m ON dc.medication_id = m.id
         WHERE dc.change_date >= date(?1, '-14 days')
           AND dc.change_date <= ?1
         ORDER BY dc.change_date DESC",
    )?;

    let rows = stmt.query_map(params![onset_date], |row| {
        let med_name: String = row.get(0)?;
        let days: f64 = row.get(2)?;
        let days_since = days.round() as i64;
        Ok(JournalCorrelation {
            entry_id: entry.id.clone(),
            medication_name: med_name.clone(),
            days_since_change: days_since,
            message: format!(
                "Your {} dose was changed {} day(s) ago. This symptom may be related.",
                med_name, days_since
            ),
        })
    })?;

    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// Full Sync Orchestration
// ═══════════════════════════════════════════════════════════════════════════

/// Build the complete sync response by comparing versions and assembling changed payloads.
///
/// Returns `None` if nothing changed and no journal entries were submitted.
pub fn build_sync_response(
    conn: &Connection,
    request: &SyncRequest,
    profile_name: &str,
) -> Result<Option<SyncResponse>, DatabaseError> {
    let current = get_sync_versions(conn)?;
    let changed = diff_versions(&request.versions, &current);

    // Process journal entries (always, even if nothing else changed)
    let journal_sync = if !request.journal_entries.is_empty() {
        Some(process_journal_sync(conn, &request.journal_entries)?)
    } else {
        None
    };

    // If nothing changed and no journal entries, return None (caller sends 204)
    if changed.is_empty() && journal_sync.is_none() {
        return Ok(None);
    }

    let mut response = SyncResponse {
        versions: current.clone(),
        synced_at: chrono::Utc::now().to_rfc3339(),
        journal_sync,
        ..Default::default()
    };

    for entity_type in &changed {
        match entity_type.as_str() {
            "medications" => {
                response.medications = Some(assemble_medications(conn)?);
            }
            "labs" => {
                response.labs = Some(assemble_recent_labs(conn, 10)?);
            }
            "timeline" => {
                response.timeline = Some(assemble_recent_timeline(conn, 30)?);
            }
            "alerts" => {
                response.alerts = Some(assemble_alerts(conn)?);
            }
            "appointments" => {
                response.appointment = assemble_next_appointment(conn)?;
            }
            "profile" => {
                response.profile = Some(assemble_profile_summary(conn, profile_name)?);
            }
            _ => {}
        }
    }

    Ok(Some(response))
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
