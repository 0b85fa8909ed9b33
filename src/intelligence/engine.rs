use std::time::Instant;

use uuid::Uuid;

use crate::models::enums::{AlertType, DismissedBy};

use super::detection::{
    detect_allergy_conflicts, detect_conflicts, detect_critical_labs, detect_dose_issues,
    detect_drift, detect_duplicates, detect_gaps, detect_temporal,
};
use super::emergency::EmergencyProtocol;
use super::reference::CoherenceReferenceData;
use super::store::AlertStore;
use super::types::{
    AlertCounts, CoherenceAlert, CoherenceEngine, CoherenceError, CoherenceResult,
    RepositorySnapshot,
};

/// Default implementation of the coherence engine.
/// Orchestrates all 8 detection algorithms, stores results, and manages the alert lifecycle.
pub struct DefaultCoherenceEngine {
    pub(crate) store: AlertStore,
    pub(crate) reference: CoherenceReferenceData,
}

impl DefaultCoherenceEngine {
    pub fn new(reference: CoherenceReferenceData) -> Self {
        Self {
            store: AlertStore::new(),
            reference,
        }
    }

    /// Run all 8 detection algorithms and collect alerts.
    fn run_detections(
        &self,
        document_id: &Uuid,
        data: &RepositorySnapshot,
    ) -> (Vec<CoherenceAlert>, AlertCounts) {
        let conflicts = detect_conflicts(document_id, data, &self.reference);
        let duplicates = detect_duplicates(document_id, data, &self.reference);
        let gaps = detect_gaps(document_id, data);
        let drifts = detect_drift(document_id, data, &self.reference);
        let temporals = detect_temporal(document_id, data);
        let allergies = detect_allergy_conflicts(document_id, data, &self.reference);
        let doses = detect_dose_issues(document_id, data, &self.reference);
        let criticals = detect_critical_labs(document_id, data);

        let counts = AlertCounts {
            conflicts: conflicts.len(),
            duplicates: duplicates.len(),
            gaps: gaps.len(),
            drifts: drifts.len(),
            temporals: temporals.len(),
            allergies: allergies.len(),
            doses: doses.len(),
            criticals: criticals.len(),
        };

        let all_alerts = conflicts
            .into_iter()
            .chain(duplicates)
            .chain(gaps)
            .chain(drifts)
            .chain(temporals)
            .chain(allergies)
            .chain(doses)
            .chain(criticals)
            .collect();

        (all_alerts, counts)
    }

    /// Store alerts, filtering out dismissed and duplicates.
    /// Returns only the newly stored alerts.
    fn store_new_alerts(
        &self,
        alerts: Vec<CoherenceAlert>,
        data: &RepositorySnapshot,
    ) -> Result<Vec<CoherenceAlert>, CoherenceError> {
        let mut stored = Vec::new();

        for alert in alerts {
            let is_dismissed =
                data.is_dismissed(alert.alert_type.as_str(), &alert.entity_ids);
            let was_stored = self.store.store_alert(alert.clone(), is_dismissed)?;
            if was_stored {
                stored.push(alert);
            }
        }

        Ok(stored)
    }

    /// Get emergency actions for any CRITICAL alerts in the result set.
    pub fn get_emergency_actions(
        alerts: &[CoherenceAlert],
    ) -> Vec<super::emergency::EmergencyAction> {
        EmergencyProtocol::process_critical_alerts(alerts)
    }
}

impl CoherenceEngine for DefaultCoherenceEngine {
    fn analyze_new_document(
        &self,
        document_id: &Uuid,
        data: &RepositorySnapshot,
    ) -> Result<CoherenceResult, CoherenceError> {
        let start = Instant::now();

        let (all_alerts, counts) = self.run_detections(document_id, data);
        let new_alerts = self.store_new_alerts(all_alerts, data)?;

        let processing_time_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            document_id = %document_id,
            total = counts.total(),
            stored = new_alerts.len(),
            processing_ms = processing_time_ms,
            "Coherence analysis complete for document"
        );

        Ok(CoherenceResult {
            new_alerts,
            counts,
            processing_time_ms,
        })
    }

    fn analyze_full(
        &self,
        data: &RepositorySnapshot,
    ) -> Result<CoherenceResult, CoherenceError> {
        let start = Instant::now();
        let nil = Uuid::nil();

        let (all_alerts, counts) = self.run_detections(&nil, data);
        let new_alerts = self.store_new_alerts(all_alerts, data)?;

        let processing_time_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            total = counts.total(),
            stored = new_alerts.len(),
            processing_ms = processing_time_ms,
            "Full coherence analysis complete"
        );

        Ok(CoherenceResult {
            new_alerts,
            counts,
            processing_time_ms,
        })
    }

    fn get_active_alerts(
        &self,
        alert_type: Option<&AlertType>,
    ) -> Result<Vec<CoherenceAlert>, CoherenceError> {
        self.store.get_active(alert_type)
    }

    fn get_relevant_alerts(
        &self,
        entity_ids: &[Uuid],
        keywords: &[String],
    ) -> Result<Vec<CoherenceAlert>, CoherenceError> {
        self.store.get_relevant(entity_ids, keywords)
    }

    fn get_critical_alerts(&self) -> Result<Vec<CoherenceAlert>, CoherenceError> {
        self.store.get_critical()
    }

    fn dismiss_alert(
        &self,
        alert_id: &Uuid,
        reason: &str,
        dismissed_by: DismissedBy,
    ) -> Result<(), CoherenceError> {
        self.store.dismiss(alert_id, reason, dismissed_by)
    }

    fn dismiss_critical_alert(
        &self,
        alert_id: &Uuid,
        reason: &str,
        two_step_confirmed: bool,
    ) -> Result<(), CoherenceError> {
        self.store
            .dismiss_critical(alert_id, reason, two_step_confirmed)
    }
}
