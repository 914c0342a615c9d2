//! Lock information stored alongside a state lock

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, BackendResult};

/// Information about a state lock and the process holding it
///
/// This is what gets serialized into the `Info` attribute of a lock row, and
/// what callers get back when a lock is already held by someone else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LockInfo {
    /// Unique identifier for this lock. Filled in on acquire when empty.
    #[serde(rename = "ID")]
    pub id: String,
    /// The operation being performed (e.g., "apply", "destroy", "plan")
    pub operation: String,
    /// Free-form reason supplied by the operator
    #[serde(default)]
    pub info: String,
    /// Who acquired the lock (username@hostname)
    pub who: String,
    /// Version of Strata that acquired the lock
    pub version: String,
    /// When the lock was created
    pub created: DateTime<Utc>,
    /// Resource path the lock guards, set by the coordinator
    #[serde(default)]
    pub path: String,
}

impl LockInfo {
    /// Create lock info for an operation, without an identifier yet
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            operation: operation.into(),
            info: String::new(),
            who: get_lock_owner(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created: Utc::now(),
            path: String::new(),
        }
    }

    /// Attach a free-form reason
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    /// Use a caller-chosen identifier instead of a generated one
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Serialize into the string stored in the lock table
    pub fn marshal(&self) -> BackendResult<String> {
        serde_json::to_string(self).map_err(|e| BackendError::Serialization(e.to_string()))
    }

    /// Parse the string stored in the lock table
    pub fn parse(data: &str) -> BackendResult<Self> {
        serde_json::from_str(data).map_err(|e| BackendError::InvalidLockInfo(e.to_string()))
    }
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Lock Info:")?;
        writeln!(f, "  ID:        {}", self.id)?;
        writeln!(f, "  Path:      {}", self.path)?;
        writeln!(f, "  Operation: {}", self.operation)?;
        writeln!(f, "  Who:       {}", self.who)?;
        writeln!(f, "  Version:   {}", self.version)?;
        writeln!(f, "  Created:   {}", self.created)?;
        write!(f, "  Info:      {}", self.info)
    }
}

/// Get the lock owner string (username@hostname)
fn get_lock_owner() -> String {
    let username = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    format!("{}@{}", username, hostname)
}
