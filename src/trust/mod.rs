//! L5-01: Trust & Safety — cross-cutting hardening layer.
//!
//! Five sub-systems:
//! 1. Emergency Protocol — critical lab alerts with 2-step dismissal
//! 2. Dose Plausibility — cross-reference doses against known ranges
//! 3. Backup & Restore — encrypted .coheara-backup archives
//! 4. Cryptographic Erasure — profile deletion via key zeroing
//! 5. Privacy Verification — prove offline + encryption promises

mod backup;
mod dose;
mod emergency;
mod erasure;
pub mod fs_helpers;
mod recovery;

use crate::db::DatabaseError;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum TrustError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<crate::crypto::CryptoError> for TrustError {
    fn from(e: crate::crypto::CryptoError) -> Self {
        TrustError::Crypto(e.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports
// ═══════════════════════════════════════════════════════════════════════════

pub use backup::*;
pub use dose::*;
pub use emergency::*;
pub use erasure::*;
pub use recovery::*;

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
