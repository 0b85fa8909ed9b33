use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{AlertDetail, AlertSeverity, CoherenceAlert};

/// Emergency protocol handler for CRITICAL alerts.
pub struct EmergencyProtocol;

impl EmergencyProtocol {
    /// Process critical alerts detected during ingestion.
    /// Returns actions that need immediate surfacing.
    pub fn process_critical_alerts(alerts: &[CoherenceAlert]) -> Vec<EmergencyAction> {
        alerts
            .iter()
            .filter(|a| a.severity == AlertSeverity::Critical)
            .map(|alert| match &alert.detail {
                AlertDetail::Critical(_) => EmergencyAction {
                    alert_id: alert.id,
                    action_type: EmergencyActionType::LabCritical,
                    ingestion_message:
                        "This result is marked as requiring attention on your lab report."
                            .to_string(),
                    home_banner: alert.patient_message.clone(),
                    appointment_priority: true,
                    dismissal_steps: 2,
                    dismissal_prompt_1: "Has your doctor addressed this?".to_string(),
                    dismissal_prompt_2: "Yes, my doctor has seen this result".to_string(),
                },
                AlertDetail::Allergy(_) => EmergencyAction {
                    alert_id: alert.id,
                    action_type: EmergencyActionType::AllergyMatch,
                    ingestion_message:
                        "This medication may contain an ingredient related to a known allergy in your records."
                            .to_string(),
                    home_banner: alert.patient_message.clone(),
                    appointment_priority: true,
                    dismissal_steps: 2,
                    dismissal_prompt_1:
                        "Has your doctor or pharmacist addressed this?".to_string(),
                    dismissal_prompt_2:
                        "Yes, this has been reviewed by my healthcare provider".to_string(),
                },
                _ => EmergencyAction {
                    alert_id: alert.id,
                    action_type: EmergencyActionType::Other,
                    ingestion_message: alert.patient_message.clone(),
                    home_banner: alert.patient_message.clone(),
                    appointment_priority: true,
                    dismissal_steps: 2,
                    dismissal_prompt_1: "Has your doctor addressed this?".to_string(),
                    dismissal_prompt_2: "Yes, my doctor has reviewed this".to_string(),
                },
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyAction {
    pub alert_id: Uuid,
    pub action_type: EmergencyActionType,
    /// Message shown during ingestion review (L3-04).
    pub ingestion_message: String,
    /// Banner shown on Home/Chat screens (L3-02).
    pub home_banner: String,
    /// Whether to add as priority item in appointment prep (L4-02).
    pub appointment_priority: bool,
    /// Number of dismissal steps required (always 2 for CRITICAL).
    pub dismissal_steps: u8,
    /// Step 1 prompt.
    pub dismissal_prompt_1: String,
    /// Step 2 prompt: confirmation text.
    pub dismissal_prompt_2: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EmergencyActionType {
    LabCritical,
    AllergyMatch,
    Other,
}
