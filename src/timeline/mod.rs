//! L4-04: Timeline View — chronological visualization of the patient's medical journey.
//!
//! Assembles events from ALL entity tables (medications, dose_changes, lab_results,
//! symptoms, procedures, appointments, documents, diagnoses) into a unified
//! `Vec<TimelineEvent>`, sorted by date. Detects temporal correlations between
//! symptom onset and medication changes. Returns everything in a single payload.

mod aggregates;
mod correlations;
mod fetch;
mod types;

pub use aggregates::*;
pub use correlations::*;
pub use types::*;

// ── Tests ──────────────────────────────────────────────────────────────────
