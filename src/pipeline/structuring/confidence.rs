use super::types::ExtractedEntities;

/// Confidence thresholds for structuring quality
pub mod structuring_thresholds {
    /// Below this: structuring likely unreliable
    pub const LOW: f32 = 0.50;

    /// Below this: some entity fields may be wrong
    pub const MODERATE: f32 = 0.70;

    /// Above this: high confidence in extracted entities
    pub const HIGH: f32 = 0.85;
}

/// Assign an overall structuring confidence based on OCR confidence
/// and the richness of extracted entities.
pub fn compute_structuring_confidence(
    ocr_confidence: f32,
    entities: &ExtractedEntities,
) -> f32 {
    let entity_count = count_entities(entities);

    // Base confidence from OCR quality
    let base = ocr_confidence;

    // Boost if entities were actually extracted (model found structure)
    let entity_bonus = if entity_count == 0 {
        -0.10 // Penalty: no entities suggests structuring failed
    } else if entity_count <= 2 {
        0.0
    } else if entity_count <= 5 {
        0.02
    } else {
        0.05 // Rich extraction suggests good structuring
    };

    (base + entity_bonus).clamp(0.0, 1.0)
}

/// Count total entities across all categories.
fn count_entities(entities: &ExtractedEntities) -> usize {
    entities.medications.len()
        + entities.lab_results.len()
        + entities.diagnoses.len()
        + entities.allergies.len()
        + entities.procedures.len()
        + entities.referrals.len()
        + entities.instructions.len()
}

/// Adjust individual entity confidence based on OCR confidence.
/// If OCR was poor, cap entity confidence accordingly.
pub fn adjust_entity_confidence(entity_confidence: f32, ocr_confidence: f32) -> f32 {
    // Entity confidence can't exceed OCR confidence + small margin
    let cap = (ocr_confidence + 0.05).min(1.0);
    entity_confidence.min(cap)
}
