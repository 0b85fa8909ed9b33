use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(DocumentType {
    Prescription => "prescription",
    LabResult => "lab_result",
    ClinicalNote => "clinical_note",
    DischargeSummary => "discharge_summary",
    RadiologyReport => "radiology_report",
    PharmacyRecord => "pharmacy_record",
    Other => "other",
});

str_enum!(FrequencyType {
    Scheduled => "scheduled",
    AsNeeded => "as_needed",
    Tapering => "tapering",
});

str_enum!(MedicationStatus {
    Active => "active",
    Stopped => "stopped",
    Paused => "paused",
});

str_enum!(DoseType {
    Fixed => "fixed",
    SlidingScale => "sliding_scale",
    WeightBased => "weight_based",
    Variable => "variable",
});

str_enum!(AbnormalFlag {
    Normal => "normal",
    Low => "low",
    High => "high",
    CriticalLow => "critical_low",
    CriticalHigh => "critical_high",
});

str_enum!(DiagnosisStatus {
    Active => "active",
    Resolved => "resolved",
    Monitoring => "monitoring",
});

str_enum!(AllergySeverity {
    Mild => "mild",
    Moderate => "moderate",
    Severe => "severe",
    LifeThreatening => "life_threatening",
});

str_enum!(AllergySource {
    DocumentExtracted => "document_extracted",
    PatientReported => "patient_reported",
});

str_enum!(SymptomSource {
    PatientReported => "patient_reported",
    GuidedCheckin => "guided_checkin",
    FreeText => "free_text",
});

str_enum!(AppointmentType {
    Upcoming => "upcoming",
    Completed => "completed",
});

str_enum!(ReferralStatus {
    Pending => "pending",
    Scheduled => "scheduled",
    Completed => "completed",
    Cancelled => "cancelled",
});

str_enum!(AlertType {
    Conflict => "conflict",
    Gap => "gap",
    Drift => "drift",
    Ambiguity => "ambiguity",
    Duplicate => "duplicate",
    Allergy => "allergy",
    Dose => "dose",
    Critical => "critical",
    Temporal => "temporal",
});

str_enum!(DismissedBy {
    Patient => "patient",
    ProfessionalFeedback => "professional_feedback",
});

str_enum!(MessageRole {
    Patient => "patient",
    Coheara => "coheara",
});

str_enum!(MessageFeedback {
    Helpful => "helpful",
    NotHelpful => "not_helpful",
});

str_enum!(AliasSource {
    Bundled => "bundled",
    UserAdded => "user_added",
});
