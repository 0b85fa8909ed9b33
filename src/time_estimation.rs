//! Time estimation for document processing based on hardware profile.
//!
//! Provides informed progress estimates by combining hardware-detected
//! inference speed with document characteristics (page count).

use serde::Serialize;

use crate::pipeline_config::{PipelineConfig, WarmStrategy};

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Estimated tokens generated per page during vision OCR extraction.
const TOKENS_PER_PAGE_VISION: u32 = 2000;

/// Estimated tokens generated per page during LLM structuring.
const TOKENS_PER_PAGE_STRUCTURING: u32 = 1500;

/// Fixed overhead for pipeline setup, file I/O, DB operations (seconds).
const PIPELINE_OVERHEAD_SECS: u64 = 5;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Estimated processing time breakdown by stage.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingEstimate {
    /// Estimated vision extraction time (seconds).
    pub vision_secs: u64,
    /// Model swap time between stages (>0 only for CPU swap strategy).
    pub swap_secs: u64,
    /// Estimated LLM structuring time (seconds).
    pub structuring_secs: u64,
    /// Total estimated processing time (seconds).
    pub total_secs: u64,
}

// ═══════════════════════════════════════════════════════════
// Estimation
// ═══════════════════════════════════════════════════════════

/// Estimate document processing time based on hardware profile and page count.
///
/// Formula per stage: `(tokens_per_page * pages) / tok_per_sec`
/// CPU swap adds `model_load_secs` between stages.
pub fn estimate_processing_time(config: &PipelineConfig, page_count: usize) -> ProcessingEstimate {
    let pages = page_count.max(1) as f32;
    let tok_s = config.estimated_tok_per_sec.max(0.1); // avoid division by zero

    let vision_secs = ((TOKENS_PER_PAGE_VISION as f32 * pages) / tok_s).ceil() as u64;
    let structuring_secs = ((TOKENS_PER_PAGE_STRUCTURING as f32 * pages) / tok_s).ceil() as u64;

    let swap_secs = match config.warm_strategy {
        WarmStrategy::SwapBetweenStages => config.estimated_model_load_secs.ceil() as u64,
        WarmStrategy::WarmBoth => 0,
    };

    let total_secs = vision_secs + swap_secs + structuring_secs + PIPELINE_OVERHEAD_SECS;

    ProcessingEstimate {
        vision_secs,
        swap_secs,
        structuring_secs,
        total_secs,
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
