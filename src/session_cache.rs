//! MP-01: Multi-profile session cache.
//!
//! Caches unlocked profile keys in memory (iOS Keychain pattern).
//! Enables companion phone access to multiple profiles without
//! switching the desktop UI's active profile.
//!
//! Key properties:
//! - Keys exist only in memory — never persisted to disk
//! - Keys zeroed via `Zeroize` trait on eviction or cache clear
//! - Inactivity timeout clears ALL sessions (security)
//! - App close clears ALL sessions

use std::collections::HashMap;
use std::path::PathBuf;

use uuid::Uuid;
use zeroize::Zeroize;

use crate::db;
use crate::db::DatabaseError;

// ═══════════════════════════════════════════════════════════
// CachedKey — zeroed on drop
// ═══════════════════════════════════════════════════════════

/// Cached encryption key — zeroed on drop to prevent memory leakage.
#[derive(Zeroize)]
#[zeroize(drop)]
struct CachedKey {
    bytes: [u8; 32],
}

impl CachedKey {
    fn new(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }
}

// ═══════════════════════════════════════════════════════════
// CachedSession — one unlocked profile
// ═══════════════════════════════════════════════════════════

/// A cached profile session — key + metadata for one unlocked profile.
pub struct CachedSession {
    profile_id: Uuid,
    profile_name: String,
    key: CachedKey,
    db_path: PathBuf,
}

impl CachedSession {
    /// Create a new cached session from raw components.
    pub fn new(profile_id: Uuid, profile_name: String, key_bytes: [u8; 32], db_path: PathBuf) -> Self {
        Self {
            profile_id,
            profile_name,
            key: CachedKey::new(key_bytes),
            db_path,
        }
    }

    pub fn profile_id(&self) -> Uuid {
        self.profile_id
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub fn db_path(&self) -> &std::path::Path {
        &self.db_path
    }

    /// Open a database connection for this cached profile.
    pub fn open_db(&self) -> Result<rusqlite::Connection, DatabaseError> {
        db::open_database(&self.db_path, Some(&self.key.bytes))
    }
}

// ═══════════════════════════════════════════════════════════
// SessionCache — all unlocked profiles
// ═══════════════════════════════════════════════════════════

/// Multi-profile session cache.
///
/// Holds unlocked profile keys in memory so companion devices
/// can access multiple profiles without switching the desktop UI.
/// Pattern borrowed from iOS Keychain: keys in memory, zeroed on lock.
pub struct SessionCache {
    /// The profile currently shown on the desktop UI.
    active_id: Option<Uuid>,
    /// All unlocked profiles (including the active one).
    sessions: HashMap<Uuid, CachedSession>,
}

impl SessionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            active_id: None,
            sessions: HashMap::new(),
        }
    }

    // ── Active session (desktop UI) ──────────────────────

    /// Get the active profile ID (currently shown on desktop).
    pub fn active_id(&self) -> Option<Uuid> {
        self.active_id
    }

    /// Get the active session (currently shown on desktop).
    pub fn active_session(&self) -> Option<&CachedSession> {
        self.active_id
            .and_then(|id| self.sessions.get(&id))
    }

    /// Set the active profile to an already-cached session.
    /// Returns false if the profile is not cached.
    pub fn set_active(&mut self, profile_id: Uuid) -> bool {
        if self.sessions.contains_key(&profile_id) {
            self.active_id = Some(profile_id);
            true
        } else {
            false
        }
    }

    // ── Cache operations ─────────────────────────────────

    /// Cache a session without switching the desktop UI.
    /// Used for companion access: unlock a managed profile in the background.
    pub fn cache_session(&mut self, session: CachedSession) {
        let id = session.profile_id;
        self.sessions.insert(id, session);
    }

    /// Cache a session AND set it as the active desktop profile.
    /// Used during normal desktop login/unlock.
    pub fn set_active_session(&mut self, session: CachedSession) {
        let id = session.profile_id;
        self.sessions.insert(id, session);
        self.active_id = Some(id);
    }

    /// Get a cached session by profile ID.
    pub fn get_session(&self, profile_id: &Uuid) -> Option<&CachedSession> {
        self.sessions.get(profile_id)
    }

    /// Check if a profile is unlocked (cached).
    pub fn is_unlocked(&self, profile_id: &Uuid) -> bool {
        self.sessions.contains_key(profile_id)
    }

    /// Evict a specific profile from the cache.
    /// Key is zeroed via CachedKey's Drop implementation.
    pub fn evict(&mut self, profile_id: &Uuid) {
        self.sessions.remove(profile_id);
        if self.active_id == Some(*profile_id) {
            self.active_id = None;
        }
    }

    /// Clear ALL cached sessions. Keys zeroed via Drop.
    /// Called on app close, inactivity timeout, or explicit lock.
    pub fn clear(&mut self) {
        self.sessions.clear();
        self.active_id = None;
    }

    /// List all cached profile IDs.
    pub fn cached_profile_ids(&self) -> Vec<Uuid> {
        self.sessions.keys().copied().collect()
    }

    /// Number of cached sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Open a database connection for a cached profile.
    pub fn open_db(&self, profile_id: &Uuid) -> Result<rusqlite::Connection, SessionCacheError> {
        let session = self
            .sessions
            .get(profile_id)
            .ok_or(SessionCacheError::ProfileNotCached(*profile_id))?;
        session
            .open_db()
            .map_err(SessionCacheError::Database)
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════

/// Errors from session cache operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionCacheError {
    #[error("Profile {0} is not cached (not unlocked)")]
    ProfileNotCached(Uuid),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
