//! Usage session tracking
//!
//! Supplies a stable session identifier for a machine and records run
//! starts. Reporting is fire-and-forget: every failure in here degrades to
//! a debug log and never aborts a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

const SESSION_FILE: &str = "session.json";

/// Environment variable that opts out of usage reporting
pub const DISABLE_USAGE_ENV: &str = "TIDEWAY_DISABLE_USAGE_STATS";

/// Collaborator that identifies the session and records run starts
pub trait UsageReporter: Send + Sync {
    /// Stable identifier for this machine's session
    fn session_id(&self) -> &str;

    /// Record that a run started; must never fail the caller
    fn record_run(&self);
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    id: String,
    created_at: DateTime<Utc>,
}

/// File-backed session tracker
///
/// The session id is persisted under the system temp directory so repeated
/// runs on one machine report the same identity.
pub struct SessionTracker {
    session_id: String,
    enabled: bool,
}

impl SessionTracker {
    /// Load (or create) the session under the default state directory
    pub fn load() -> Self {
        Self::load_from(std::env::temp_dir().join("tideway"))
    }

    /// Load (or create) the session under an explicit state directory
    pub fn load_from(state_dir: impl AsRef<Path>) -> Self {
        let enabled = std::env::var_os(DISABLE_USAGE_ENV).is_none();
        let session_id = read_or_create_session(state_dir.as_ref()).unwrap_or_else(|e| {
            debug!(error = %e, "failed to load session id, using an ephemeral one");
            Uuid::new_v4().to_string()
        });
        Self {
            session_id,
            enabled,
        }
    }
}

impl UsageReporter for SessionTracker {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn record_run(&self) {
        if !self.enabled {
            return;
        }
        info!(
            session = %self.session_id,
            "usage stats collection is enabled; set {} to opt out",
            DISABLE_USAGE_ENV
        );
    }
}

fn read_or_create_session(state_dir: &Path) -> std::io::Result<String> {
    fs::create_dir_all(state_dir)?;
    let path: PathBuf = state_dir.join(SESSION_FILE);

    if let Ok(raw) = fs::read_to_string(&path) {
        if let Ok(existing) = serde_json::from_str::<SessionFile>(&raw) {
            return Ok(existing.id);
        }
        debug!(path = %path.display(), "unreadable session file, recreating");
    }

    let fresh = SessionFile {
        id: Uuid::new_v4().to_string(),
        created_at: Utc::now(),
    };
    fs::write(&path, serde_json::to_string(&fresh)?)?;
    Ok(fresh.id)
}
