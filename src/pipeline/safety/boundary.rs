use crate::pipeline::rag::types::BoundaryCheck;

use super::types::{FilterLayer, Violation, ViolationCategory};

/// Allowed boundary check values.
const ALLOWED_BOUNDARIES: &[BoundaryCheck] = &[
    BoundaryCheck::Understanding,
    BoundaryCheck::Awareness,
    BoundaryCheck::Preparation,
];

/// Layer 1: Validate that the boundary check is within acceptable scope.
/// Out-of-bounds responses must be blocked, not rephrased.
pub fn check_boundary(boundary: &BoundaryCheck) -> Vec<Violation> {
    if ALLOWED_BOUNDARIES.contains(boundary) {
        return vec![];
    }

    vec![Violation {
        layer: FilterLayer::BoundaryCheck,
        category: ViolationCategory::BoundaryViolation,
        reason: format!(
            "Boundary check is {:?}, expected one of: understanding, awareness, preparation",
            boundary
        ),
    }]
}
