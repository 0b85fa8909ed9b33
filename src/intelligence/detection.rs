use uuid::Uuid;

use crate::models::enums::{AbnormalFlag, AlertType, DiagnosisStatus, MedicationStatus};
use crate::models::Medication;

use super::helpers::{
    dedup_symmetric_alerts, display_name, format_dose_mg, frequency_to_daily_multiplier,
    is_same_drug_family, normalize_dose, normalize_frequency, parse_dose_to_mg,
    resolve_generic_name,
};
use super::messages::MessageTemplates;
use super::reference::CoherenceReferenceData;
use super::types::*;

/// Temporal correlation window in days.
const TEMPORAL_CORRELATION_WINDOW_DAYS: i64 = 14;

// ---------------------------------------------------------------------------
// [4] CONFLICT detection
// ---------------------------------------------------------------------------

/// Detect medication conflicts: same medication, different parameters, different prescribers.
pub fn detect_conflicts(
    document_id: &Uuid,
    data: &RepositorySnapshot,
    reference: &CoherenceReferenceData,
) -> Vec<CoherenceAlert> {
    let mut alerts = Vec::new();

    let active_meds: Vec<&Medication> = data
        .medications
        .iter()
        .filter(|m| m.status == MedicationStatus::Active)
        .collect();

    let new_meds: Vec<&&Medication> = active_meds
        .iter()
        .filter(|m| m.document_id == *document_id)
        .collect();

    for new_med in &new_meds {
        let resolved_generic = resolve_generic_name(new_med, reference);

        let existing_matches: Vec<&&Medication> = active_meds
            .iter()
            .filter(|m| {
                m.id != new_med.id
                    && m.document_id != *document_id
                    && resolve_generic_name(m, reference) == resolved_generic
                    && m.status == MedicationStatus::Active
            })
            .collect();

        for existing in &existing_matches {
            let different_prescriber = match (new_med.prescriber_id, existing.prescriber_id) {
                (Some(a), Some(b)) => a != b,
                _ => true,
            };

            if !different_prescriber {
                continue;
            }

            if normalize_dose(&new_med.dose) != normalize_dose(&existing.dose) {
                alerts.push(build_conflict_alert(
                    new_med, existing, "dose", &new_med.dose, &existing.dose, data,
                ));
            }

            if normalize_frequency(&new_med.frequency)
                != normalize_frequency(&existing.frequency)
            {
                alerts.push(build_conflict_alert(
                    new_med,
                    existing,
                    "frequency",
                    &new_med.frequency,
                    &existing.frequency,
                    data,
                ));
            }

            if new_med.route.to_lowercase() != existing.route.to_lowercase() {
                alerts.push(build_conflict_alert(
                    new_med, existing, "route", &new_med.route, &existing.route, data,
                ));
            }
        }
    }

    alerts
}

fn build_conflict_alert(
    new_med: &Medication,
    existing_med: &Medication,
    field: &str,
    new_value: &str,
    existing_value: &str,
    data: &RepositorySnapshot,
) -> CoherenceAlert {
    let prescriber_a_name = data.resolve_prescriber_name(new_med.prescriber_id);
    let prescriber_b_name = data.resolve_prescriber_name(existing_med.prescriber_id);

    let message = MessageTemplates::conflict(
        &new_med.generic_name,
        field,
        new_value,
        &prescriber_a_name,
        existing_value,
        &prescriber_b_name,
    );

    CoherenceAlert {
        id: Uuid::new_v4(),
        alert_type: AlertType::Conflict,
        severity: AlertSeverity::Standard,
        entity_ids: vec![new_med.id, existing_med.id],
        source_document_ids: vec![new_med.document_id, existing_med.document_id],
        patient_message: message,
        detail: AlertDetail::Conflict(ConflictDetail {
            medication_name: new_med.generic_name.clone(),
            prescriber_a: PrescriberRef {
                professional_id: new_med.prescriber_id.unwrap_or(Uuid::nil()),
                name: prescriber_a_name,
                document_id: new_med.document_id,
                document_date: None,
            },
            prescriber_b: PrescriberRef {
                professional_id: existing_med.prescriber_id.unwrap_or(Uuid::nil()),
                name: prescriber_b_name,
                document_id: existing_med.document_id,
                document_date: None,
            },
            field_conflicted: field.to_string(),
            value_a: new_value.to_string(),
            value_b: existing_value.to_string(),
        }),
        detected_at: chrono::Local::now().naive_local(),
        surfaced: false,
        dismissed: false,
        dismissal: None,
    }
}

// ---------------------------------------------------------------------------
// [5] DUPLICATE detection
// ---------------------------------------------------------------------------

/// Detect duplicate medications: same generic under different brand names.
pub fn detect_duplicates(
    document_id: &Uuid,
    data: &RepositorySnapshot,
    reference: &CoherenceReferenceData,
) -> Vec<CoherenceAlert> {
    let mut alerts = Vec::new();

    let active_meds: Vec<&Medication> = data
        .medications
        .iter()
        .filter(|m| m.status == MedicationStatus::Active)
        .collect();

    let new_meds: Vec<&&Medication> = active_meds
        .iter()
        .filter(|m| m.document_id == *document_id)
        .collect();

    for new_med in &new_meds {
        let new_generic = resolve_generic_name(new_med, reference);

        let duplicates: Vec<&&Medication> = active_meds
            .iter()
            .filter(|m| {
                m.id != new_med.id
                    && m.document_id != *document_id
                    && resolve_generic_name(m, reference) == new_generic
                    && m.status == MedicationStatus::Active
            })
            .collect();

        for existing in &duplicates {
            let new_display = display_name(new_med);
            let existing_display = display_name(existing);

            if new_display.to_lowercase() != existing_display.to_lowercase() {
                let message =
                    MessageTemplates::duplicate(&new_display, &existing_display, &new_generic);

                alerts.push(CoherenceAlert {
                    id: Uuid::new_v4(),
                    alert_type: AlertType::Duplicate,
                    severity: AlertSeverity::Standard,
                    entity_ids: vec![new_med.id, existing.id],
                    source_document_ids: vec![new_med.document_id, existing.document_id],
                    patient_message: message,
                    detail: AlertDetail::Duplicate(DuplicateDetail {
                        generic_name: new_generic.clone(),
                        brand_a: new_display,
                        brand_b: existing_display,
                        medication_id_a: new_med.id,
                        medication_id_b: existing.id,
                    }),
                    detected_at: chrono::Local::now().naive_local(),
                    surfaced: false,
                    dismissed: false,
                    dismissal: None,
                });
            }
        }
    }

    dedup_symmetric_alerts(&mut alerts);
    alerts
}

// ---------------------------------------------------------------------------
// [6] GAP detection
// ---------------------------------------------------------------------------

/// Detect care gaps: diagnosis without treatment, treatment without diagnosis.
pub fn detect_gaps(
    document_id: &Uuid,
    data: &RepositorySnapshot,
) -> Vec<CoherenceAlert> {
    let mut alerts = Vec::new();

    let active_diagnoses: Vec<&_> = data
        .diagnoses
        .iter()
        .filter(|d| d.status == DiagnosisStatus::Active)
        .collect();
    let active_meds: Vec<&_> = data
        .medications
        .iter()
        .filter(|m| m.status == MedicationStatus::Active)
        .collect();

    // GAP TYPE 1: Diagnosis without treatment
    for diag in &active_diagnoses {
        let has_treatment = active_meds
            .iter()
            .any(|m| super::helpers::medication_relates_to_diagnosis(m, diag));

        if !has_treatment && (diag.document_id == *document_id || document_id.is_nil()) {
            let message = MessageTemplates::gap_no_treatment(&diag.name);

            alerts.push(CoherenceAlert {
                id: Uuid::new_v4(),
                alert_type: AlertType::Gap,
                severity: AlertSeverity::Info,
                entity_ids: vec![diag.id],
                source_document_ids: vec![diag.document_id],
                patient_message: message,
                detail: AlertDetail::Gap(GapDetail {
                    gap_type: GapType::DiagnosisWithoutTreatment,
                    entity_name: diag.name.clone(),
                    entity_id: diag.id,
                    expected: "medication or treatment plan".to_string(),
                    document_id: diag.document_id,
                }),
                detected_at: chrono::Local::now().naive_local(),
                surfaced: false,
                dismissed: false,
                dismissal: None,
            });
        }
    }

    // GAP TYPE 2: Medication without diagnosis
    for med in &active_meds {
        if med.is_otc {
            continue;
        }

        let has_diagnosis = active_diagnoses
            .iter()
            .any(|d| super::helpers::medication_relates_to_diagnosis(med, d));

        let has_reason = med
            .reason_start
            .as_ref()
            .map(|r| !r.trim().is_empty())
            .unwrap_or(false);

        if !has_diagnosis
            && !has_reason
            && (med.document_id == *document_id || document_id.is_nil())
        {
            let med_display = display_name(med);
            let message = MessageTemplates::gap_no_diagnosis(&med_display);

            alerts.push(CoherenceAlert {
                id: Uuid::new_v4(),
                alert_type: AlertType::Gap,
                severity: AlertSeverity::Info,
                entity_ids: vec![med.id],
                source_document_ids: vec![med.document_id],
                patient_message: message,
                detail: AlertDetail::Gap(GapDetail {
                    gap_type: GapType::MedicationWithoutDiagnosis,
                    entity_name: med_display,
                    entity_id: med.id,
                    expected: "documented diagnosis or reason".to_string(),
                    document_id: med.document_id,
                }),
                detected_at: chrono::Local::now().naive_local(),
                surfaced: false,
                dismissed: false,
                dismissal: None,
            });
        }
    }

    alerts
}

// ---------------------------------------------------------------------------
// [7] DRIFT detection
// ---------------------------------------------------------------------------

/// Detect care drift: unexplained medication or diagnosis changes.
pub fn detect_drift(
    document_id: &Uuid,
    data: &RepositorySnapshot,
    reference: &CoherenceReferenceData,
) -> Vec<CoherenceAlert> {
    let mut alerts = Vec::new();

    // --- Medication drift ---
    let new_meds: Vec<&Medication> = data
        .medications
        .iter()
        .filter(|m| m.document_id == *document_id)
        .collect();

    for new_med in &new_meds {
        let new_generic = resolve_generic_name(new_med, reference);

        let prior: Vec<&Medication> = data
            .medications
            .iter()
            .filter(|m| {
                m.id != new_med.id
                    && m.document_id != *document_id
                    && resolve_generic_name(m, reference) == new_generic
            })
            .collect();

        for old_med in &prior {
            // Status changed to stopped without reason
            if old_med.status == MedicationStatus::Active
                && new_med.status == MedicationStatus::Stopped
            {
                let reason_given = new_med
                    .reason_stop
                    .as_ref()
                    .map(|r| !r.trim().is_empty())
                    .unwrap_or(false);

                if !reason_given {
                    let message = MessageTemplates::drift(
                        &new_med.generic_name,
                        old_med.status.as_str(),
                        new_med.status.as_str(),
                    );
                    alerts.push(build_drift_alert(
                        new_med,
                        "status",
                        old_med.status.as_str(),
                        new_med.status.as_str(),
                        false,
                        &message,
                    ));
                }
            }

            // Dose changed without documented reason
            if normalize_dose(&old_med.dose) != normalize_dose(&new_med.dose) {
                let has_dose_change_record = data
                    .get_dose_history(&new_med.id)
                    .iter()
                    .any(|dc| {
                        dc.reason
                            .as_ref()
                            .map(|r| !r.trim().is_empty())
                            .unwrap_or(false)
                    });

                if !has_dose_change_record {
                    let message = MessageTemplates::drift(
                        &new_med.generic_name,
                        &old_med.dose,
                        &new_med.dose,
                    );
                    alerts.push(build_drift_alert(
                        new_med,
                        "dose",
                        &old_med.dose,
                        &new_med.dose,
                        false,
                        &message,
                    ));
                }
            }
        }
    }

    // --- Diagnosis drift ---
    let new_diags: Vec<&_> = data
        .diagnoses
        .iter()
        .filter(|d| d.document_id == *document_id)
        .collect();

    for new_diag in &new_diags {
        let prior_diags: Vec<&_> = data
            .diagnoses
            .iter()
            .filter(|d| {
                d.id != new_diag.id
                    && d.document_id != *document_id
                    && d.name.to_lowercase() == new_diag.name.to_lowercase()
            })
            .collect();

        for old_diag in &prior_diags {
            if old_diag.status != new_diag.status {
                let message = format!(
                    "The status of {} changed from {} to {}. \
                     I don't see a note explaining this change.",
                    new_diag.name,
                    old_diag.status.as_str(),
                    new_diag.status.as_str(),
                );

                alerts.push(CoherenceAlert {
                    id: Uuid::new_v4(),
                    alert_type: AlertType::Drift,
                    severity: AlertSeverity::Info,
                    entity_ids: vec![new_diag.id, old_diag.id],
                    source_document_ids: vec![new_diag.document_id, old_diag.document_id],
                    patient_message: message,
                    detail: AlertDetail::Drift(DriftDetail {
                        entity_type: "diagnosis".to_string(),
                        entity_name: new_diag.name.clone(),
                        old_value: old_diag.status.as_str().to_string(),
                        new_value: new_diag.status.as_str().to_string(),
                        change_date: new_diag.date_diagnosed,
                        reason_documented: false,
                    }),
                    detected_at: chrono::Local::now().naive_local(),
                    surfaced: false,
                    dismissed: false,
                    dismissal: None,
                });
            }
        }
    }

    alerts
}

fn build_drift_alert(
    med: &Medication,
    _field: &str,
    old_val: &str,
    new_val: &str,
    reason_documented: bool,
    message: &str,
) -> CoherenceAlert {
    CoherenceAlert {
        id: Uuid::new_v4(),
        alert_type: AlertType::Drift,
        severity: AlertSeverity::Standard,
        entity_ids: vec![med.id],
        source_document_ids: vec![med.document_id],
        patient_message: message.to_string(),
        detail: AlertDetail::Drift(DriftDetail {
            entity_type: "medication".to_string(),
            entity_name: med.generic_name.clone(),
            old_value: old_val.to_string(),
            new_value: new_val.to_string(),
            change_date: None,
            reason_documented,
        }),
        detected_at: chrono::Local::now().naive_local(),
        surfaced: false,
        dismissed: false,
        dismissal: None,
    }
}

// ---------------------------------------------------------------------------
// [8] TEMPORAL detection
// ---------------------------------------------------------------------------

/// Detect temporal correlations: symptoms near medication/dose/procedure changes.
pub fn detect_temporal(
    document_id: &Uuid,
    data: &RepositorySnapshot,
) -> Vec<CoherenceAlert> {
    let mut alerts = Vec::new();

    let symptoms = if document_id.is_nil() {
        // Full analysis: all active symptoms
        data.symptoms
            .iter()
            .filter(|s| s.still_active)
            .collect::<Vec<_>>()
    } else {
        // Document-triggered: recent symptoms within window
        let window_start = chrono::Local::now().date_naive()
            - chrono::Duration::days(TEMPORAL_CORRELATION_WINDOW_DAYS);
        data.symptoms
            .iter()
            .filter(|s| s.onset_date >= window_start)
            .collect()
    };

    let active_meds: Vec<&Medication> = data
        .medications
        .iter()
        .filter(|m| m.status == MedicationStatus::Active)
        .collect();

    for symptom in &symptoms {
        let onset = symptom.onset_date;

        // Check medication start dates
        for med in &active_meds {
            if let Some(start) = med.start_date {
                let days_between = (onset - start).num_days();
                if (0..=TEMPORAL_CORRELATION_WINDOW_DAYS).contains(&days_between) {
                    let message = MessageTemplates::temporal(
                        &symptom.specific,
                        &onset.to_string(),
                        days_between,
                        &format!("starting {}", med.generic_name),
                    );

                    alerts.push(CoherenceAlert {
                        id: Uuid::new_v4(),
                        alert_type: AlertType::Temporal,
                        severity: AlertSeverity::Standard,
                        entity_ids: vec![symptom.id, med.id],
                        source_document_ids: vec![med.document_id],
                        patient_message: message,
                        detail: AlertDetail::Temporal(TemporalDetail {
                            symptom_id: symptom.id,
                            symptom_name: symptom.specific.clone(),
                            symptom_onset: onset,
                            correlated_event: TemporalEvent::MedicationStarted {
                                medication_id: med.id,
                                medication_name: med.generic_name.clone(),
                                start_date: start,
                            },
                            days_between,
                        }),
                        detected_at: chrono::Local::now().naive_local(),
                        surfaced: false,
                        dismissed: false,
                        dismissal: None,
                    });
                }
            }

            // Check dose changes
            for dc in data.get_dose_history(&med.id) {
                let change_date = dc.change_date;
                let days_between = (onset - change_date).num_days();
                if (0..=TEMPORAL_CORRELATION_WINDOW_DAYS).contains(&days_between) {
                    let message = MessageTemplates::temporal(
                        &symptom.specific,
                        &onset.to_string(),
                        days_between,
                        &format!(
                            "your {} dose was changed from {} to {}",
                            med.generic_name,
                            dc.old_dose.as_deref().unwrap_or("unknown"),
                            dc.new_dose,
                        ),
                    );

                    alerts.push(CoherenceAlert {
                        id: Uuid::new_v4(),
                        alert_type: AlertType::Temporal,
                        severity: AlertSeverity::Standard,
                        entity_ids: vec![symptom.id, med.id],
                        source_document_ids: if let Some(doc_id) = dc.document_id {
                            vec![doc_id]
                        } else {
                            vec![med.document_id]
                        },
                        patient_message: message,
                        detail: AlertDetail::Temporal(TemporalDetail {
                            symptom_id: symptom.id,
                            symptom_name: symptom.specific.clone(),
                            symptom_onset: onset,
                            correlated_event: TemporalEvent::DoseChanged {
                                medication_id: med.id,
                                medication_name: med.generic_name.clone(),
                                old_dose: dc
                                    .old_dose
                                    .clone()
                                    .unwrap_or_else(|| "unknown".to_string()),
                                new_dose: dc.new_dose.clone(),
                                change_date,
                            },
                            days_between,
                        }),
                        detected_at: chrono::Local::now().naive_local(),
                        surfaced: false,
                        dismissed: false,
                        dismissal: None,
                    });
                }
            }
        }

        // Check procedures
        for procedure in &data.procedures {
            if let Some(proc_date) = procedure.date {
                let days_between = (onset - proc_date).num_days();
                if (0..=TEMPORAL_CORRELATION_WINDOW_DAYS).contains(&days_between) {
                    let message = MessageTemplates::temporal(
                        &symptom.specific,
                        &onset.to_string(),
                        days_between,
                        &format!("your {} procedure", procedure.name),
                    );

                    alerts.push(CoherenceAlert {
                        id: Uuid::new_v4(),
                        alert_type: AlertType::Temporal,
                        severity: AlertSeverity::Standard,
                        entity_ids: vec![symptom.id, procedure.id],
                        source_document_ids: vec![procedure.document_id],
                        patient_message: message,
                        detail: AlertDetail::Temporal(TemporalDetail {
                            symptom_id: symptom.id,
                            symptom_name: symptom.specific.clone(),
                            symptom_onset: onset,
                            correlated_event: TemporalEvent::ProcedurePerformed {
                                procedure_id: procedure.id,
                                procedure_name: procedure.name.clone(),
                                procedure_date: proc_date,
                            },
                            days_between,
                        }),
                        detected_at: chrono::Local::now().naive_local(),
                        surfaced: false,
                        dismissed: false,
                        dismissal: None,
                    });
                }
            }
        }
    }

    alerts
}

// ---------------------------------------------------------------------------
// [9] ALLERGY detection
// ---------------------------------------------------------------------------

/// Detect allergy cross-matches: new medication contains known allergen.
/// Severity: CRITICAL.
pub fn detect_allergy_conflicts(
    document_id: &Uuid,
    data: &RepositorySnapshot,
    reference: &CoherenceReferenceData,
) -> Vec<CoherenceAlert> {
    let mut alerts = Vec::new();

    if data.allergies.is_empty() {
        return alerts;
    }

    let allergen_map: std::collections::HashMap<String, &_> = data
        .allergies
        .iter()
        .map(|a| (a.allergen.to_lowercase(), a))
        .collect();

    let new_meds: Vec<&Medication> = data
        .medications
        .iter()
        .filter(|m| m.document_id == *document_id)
        .collect();

    for med in &new_meds {
        let mut ingredient_names: Vec<(String, String)> = Vec::new();

        let generic = resolve_generic_name(med, reference);
        if !generic.is_empty() {
            ingredient_names.push((generic.clone(), med.generic_name.clone()));
        }

        if med.is_compound {
            for ing in data.get_compound_ingredients(&med.id) {
                let resolved = ing
                    .maps_to_generic
                    .as_deref()
                    .unwrap_or(&ing.ingredient_name)
                    .to_lowercase();
                ingredient_names.push((resolved, ing.ingredient_name.clone()));
            }
        }

        for (resolved_name, ingredient_display) in &ingredient_names {
            // Direct allergen match
            if let Some(allergy) = allergen_map.get(resolved_name.as_str()) {
                let med_display = display_name(med);
                let message =
                    MessageTemplates::allergy(&allergy.allergen, &med_display, ingredient_display);

                alerts.push(build_allergy_alert(
                    med,
                    allergy,
                    &med_display,
                    ingredient_display,
                    resolved_name,
                    &message,
                ));
            }

            // Drug family match
            for allergy in &data.allergies {
                let allergen_lower = allergy.allergen.to_lowercase();
                if allergen_lower != *resolved_name
                    && is_same_drug_family(&allergen_lower, resolved_name)
                {
                    let med_display = display_name(med);
                    let message = MessageTemplates::allergy(
                        &allergy.allergen,
                        &med_display,
                        ingredient_display,
                    );

                    alerts.push(build_allergy_alert(
                        med,
                        allergy,
                        &med_display,
                        ingredient_display,
                        resolved_name,
                        &message,
                    ));
                }
            }
        }
    }

    dedup_symmetric_alerts(&mut alerts);
    alerts
}

fn build_allergy_alert(
    med: &Medication,
    allergy: &crate::models::Allergy,
    med_display: &str,
    ingredient_display: &str,
    resolved_name: &str,
    message: &str,
) -> CoherenceAlert {
    CoherenceAlert {
        id: Uuid::new_v4(),
        alert_type: AlertType::Allergy,
        severity: AlertSeverity::Critical,
        entity_ids: vec![med.id, allergy.id],
        source_document_ids: vec![
            med.document_id,
            allergy.document_id.unwrap_or(Uuid::nil()),
        ],
        patient_message: message.to_string(),
        detail: AlertDetail::Allergy(AllergyDetail {
            allergen: allergy.allergen.clone(),
            allergy_severity: allergy.severity.as_str().to_string(),
            allergy_id: allergy.id,
            medication_name: med_display.to_string(),
            medication_id: med.id,
            matching_ingredient: ingredient_display.to_string(),
            ingredient_maps_to: resolved_name.to_string(),
        }),
        detected_at: chrono::Local::now().naive_local(),
        surfaced: false,
        dismissed: false,
        dismissal: None,
    }
}

// ---------------------------------------------------------------------------
// [10] DOSE detection
// ---------------------------------------------------------------------------

/// Detect dose plausibility issues: extracted dose outside typical range.
pub fn detect_dose_issues(
    document_id: &Uuid,
    data: &RepositorySnapshot,
    reference: &CoherenceReferenceData,
) -> Vec<CoherenceAlert> {
    let mut alerts = Vec::new();

    let new_meds: Vec<&Medication> = data
        .medications
        .iter()
        .filter(|m| m.document_id == *document_id)
        .collect();

    for med in &new_meds {
        let generic = resolve_generic_name(med, reference);

        let dose_range = match reference.get_dose_range(&generic) {
            Some(range) => range,
            None => continue,
        };

        let extracted_mg = match parse_dose_to_mg(&med.dose) {
            Some(mg) => mg,
            None => continue,
        };

        let outside_range = extracted_mg < dose_range.min_single_dose_mg
            || extracted_mg > dose_range.max_single_dose_mg;

        if outside_range {
            let med_display = display_name(med);
            let message = MessageTemplates::dose(
                &med.dose,
                &med_display,
                &format_dose_mg(dose_range.min_single_dose_mg),
                &format_dose_mg(dose_range.max_single_dose_mg),
            );

            alerts.push(CoherenceAlert {
                id: Uuid::new_v4(),
                alert_type: AlertType::Dose,
                severity: AlertSeverity::Standard,
                entity_ids: vec![med.id],
                source_document_ids: vec![med.document_id],
                patient_message: message,
                detail: AlertDetail::Dose(DoseDetail {
                    medication_name: med_display,
                    medication_id: med.id,
                    extracted_dose: med.dose.clone(),
                    extracted_dose_mg: extracted_mg,
                    typical_range_low_mg: dose_range.min_single_dose_mg,
                    typical_range_high_mg: dose_range.max_single_dose_mg,
                    source: "dose_ranges.json".to_string(),
                }),
                detected_at: chrono::Local::now().naive_local(),
                surfaced: false,
                dismissed: false,
                dismissal: None,
            });
        }
    }

    alerts
}

// ---------------------------------------------------------------------------
// [10b] DAILY DOSE ACCUMULATION detection (RS-L2-03-002)
// ---------------------------------------------------------------------------

/// Detect daily dose accumulation: single_dose × frequency > max daily dose.
pub fn detect_daily_dose_accumulation(
    document_id: &Uuid,
    data: &RepositorySnapshot,
    reference: &CoherenceReferenceData,
) -> Vec<CoherenceAlert> {
    let mut alerts = Vec::new();

    let new_meds: Vec<&Medication> = data
        .medications
        .iter()
        .filter(|m| m.document_id == *document_id || document_id.is_nil())
        .filter(|m| m.status == MedicationStatus::Active)
        .collect();

    for med in &new_meds {
        let single_dose_mg = match parse_dose_to_mg(&med.dose) {
            Some(mg) => mg,
            None => continue,
        };

        let multiplier = match frequency_to_daily_multiplier(&med.frequency) {
            Some(m) => m,
            None => continue, // "as needed" or unparseable — skip
        };

        let daily_total_mg = single_dose_mg * multiplier;

        // Check against reference max daily dose
        let generic = resolve_generic_name(med, reference);
        let max_daily_mg = reference
            .get_dose_range(&generic)
            .map(|r| r.max_daily_dose_mg);

        // Also check prescriber-provided max_daily_dose on the medication itself
        let prescriber_max_mg = med
            .max_daily_dose
            .as_ref()
            .and_then(|d| parse_dose_to_mg(d));

        // Use the lower of the two limits (more conservative)
        let effective_max = match (max_daily_mg, prescriber_max_mg) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };

        if let Some(max_mg) = effective_max {
            if daily_total_mg > max_mg {
                let med_display = display_name(med);
                let message = MessageTemplates::daily_dose(
                    &med_display,
                    &format_dose_mg(daily_total_mg),
                    &format_dose_mg(max_mg),
                );

                alerts.push(CoherenceAlert {
                    id: Uuid::new_v4(),
                    alert_type: AlertType::Dose,
                    severity: AlertSeverity::Standard,
                    entity_ids: vec![med.id],
                    source_document_ids: vec![med.document_id],
                    patient_message: message,
                    detail: AlertDetail::Dose(DoseDetail {
                        medication_name: med_display,
                        medication_id: med.id,
                        extracted_dose: format!(
                            "{}/day ({} × {})",
                            format_dose_mg(daily_total_mg),
                            med.dose,
                            med.frequency
                        ),
                        extracted_dose_mg: daily_total_mg,
                        typical_range_low_mg: 0.0,
                        typical_range_high_mg: max_mg,
                        source: "dose_ranges.json (daily limit)".to_string(),
                    }),
                    detected_at: chrono::Local::now().naive_local(),
                    surfaced: false,
                    dismissed: false,
                    dismissal: None,
                });
            }
        }
    }

    alerts
}

// ---------------------------------------------------------------------------
// [11] CRITICAL detection (lab values)
// ---------------------------------------------------------------------------

/// Detect critical lab values.
pub fn detect_critical_labs(
    document_id: &Uuid,
    data: &RepositorySnapshot,
) -> Vec<CoherenceAlert> {
    let mut alerts = Vec::new();

    let new_labs: Vec<&_> = data
        .lab_results
        .iter()
        .filter(|l| l.document_id == *document_id)
        .collect();

    for lab in &new_labs {
        let is_critical = matches!(
            lab.abnormal_flag,
            AbnormalFlag::CriticalLow | AbnormalFlag::CriticalHigh
        );

        if !is_critical {
            continue;
        }

        let value_display = lab
            .value
            .map(|v| format!("{}", v))
            .or_else(|| lab.value_text.clone())
            .unwrap_or_else(|| "value".to_string());

        let unit_display = lab.unit.as_deref().unwrap_or("");

        let flag_description = match lab.abnormal_flag {
            AbnormalFlag::CriticalLow => "below the expected range",
            AbnormalFlag::CriticalHigh => "above the expected range",
            _ => "outside the expected range",
        };

        let message = format!(
            "Your lab report from {} flags {} as needing prompt attention. \
             The result ({} {}) is {}. \
             Please contact your doctor or pharmacist soon.",
            lab.collection_date, lab.test_name, value_display, unit_display, flag_description,
        );

        alerts.push(CoherenceAlert {
            id: Uuid::new_v4(),
            alert_type: AlertType::Critical,
            severity: AlertSeverity::Critical,
            entity_ids: vec![lab.id],
            source_document_ids: vec![lab.document_id],
            patient_message: message,
            detail: AlertDetail::Critical(CriticalDetail {
                test_name: lab.test_name.clone(),
                lab_result_id: lab.id,
                value: lab.value.unwrap_or(0.0),
                unit: unit_display.to_string(),
                abnormal_flag: lab.abnormal_flag.as_str().to_string(),
                reference_range_low: lab.reference_range_low,
                reference_range_high: lab.reference_range_high,
                collection_date: lab.collection_date,
                document_id: lab.document_id,
            }),
            detected_at: chrono::Local::now().naive_local(),
            surfaced: false,
            dismissed: false,
            dismissal: None,
        });
    }

    alerts
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
