//! Durable key-value record kept per installation.
//!
//! Holds which permissions were requested before (so DENIED and
//! PERMANENTLY_DENIED can be told apart), whether tracking is intended to
//! be running, and the last tracking configuration so a cold process can
//! resume with it.

use rusqlite::{Connection, OptionalExtension};
use sentinel_events::TrackingConfig;
use sentinel_permissions::{Capability, PermissionLedger};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const KEY_TRACKING_INTENT: &str = "tracking_intent_registered";
const KEY_TRACKING_CONFIG: &str = "tracking_config";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Tracking intent and configuration that must survive process death.
pub trait IntentStore: Send + Sync {
    fn tracking_intent(&self) -> Result<bool>;
    fn set_tracking_intent(&self, registered: bool) -> Result<()>;
    fn load_config(&self) -> Result<Option<TrackingConfig>>;
    fn save_config(&self, config: &TrackingConfig) -> Result<()>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            (key, value),
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(())
    }

    fn get_bool(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.as_deref() == Some("true"))
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set(key, if value { "true" } else { "false" })
    }
}

impl PermissionLedger for Database {
    fn has_requested(&self, capability: Capability) -> bool {
        match self.get_bool(capability.ledger_key()) {
            Ok(requested) => requested,
            Err(e) => {
                tracing::warn!(error = %e, %capability, "failed to read permission ledger");
                false
            }
        }
    }

    fn mark_requested(&self, capability: Capability) {
        if let Err(e) = self.set_bool(capability.ledger_key(), true) {
            tracing::warn!(error = %e, %capability, "failed to write permission ledger");
        }
    }
}

impl IntentStore for Database {
    fn tracking_intent(&self) -> Result<bool> {
        self.get_bool(KEY_TRACKING_INTENT)
    }

    fn set_tracking_intent(&self, registered: bool) -> Result<()> {
        self.set_bool(KEY_TRACKING_INTENT, registered)
    }

    fn load_config(&self) -> Result<Option<TrackingConfig>> {
        match self.get(KEY_TRACKING_CONFIG)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_config(&self, config: &TrackingConfig) -> Result<()> {
        let json = serde_json::to_string(config)?;
        self.set(KEY_TRACKING_CONFIG, &json)
    }
}

/// Volatile store for tests and hosts without a data directory.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

impl PermissionLedger for MemoryStore {
    fn has_requested(&self, capability: Capability) -> bool {
        matches!(self.get(capability.ledger_key()), Ok(Some(v)) if v == "true")
    }

    fn mark_requested(&self, capability: Capability) {
        if let Err(e) = self.set(capability.ledger_key(), "true".to_string()) {
            tracing::warn!(error = %e, %capability, "failed to write permission ledger");
        }
    }
}

impl IntentStore for MemoryStore {
    fn tracking_intent(&self) -> Result<bool> {
        Ok(self.get(KEY_TRACKING_INTENT)?.as_deref() == Some("true"))
    }

    fn set_tracking_intent(&self, registered: bool) -> Result<()> {
        self.set(KEY_TRACKING_INTENT, registered.to_string())
    }

    fn load_config(&self) -> Result<Option<TrackingConfig>> {
        match self.get(KEY_TRACKING_CONFIG)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_config(&self, config: &TrackingConfig) -> Result<()> {
        self.set(KEY_TRACKING_CONFIG, serde_json::to_string(config)?)
    }
}
