use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use diesel::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ServiceError;
use crate::models::site_models::NewVisitorSetting;
use crate::schema::visitor_settings;
use crate::DbPool;

// Keys carried over from the browser build of the site so a migrated visitor
// profile keeps its prior choices.
pub const CONSENT_PREFERENCES_KEY: &str = "cookie-consent-preferences";
pub const CONSENT_SUMMARY_KEY: &str = "cookie-consent";
pub const POPUP_DISMISSED_KEY: &str = "popup_dismissed_v1";

/// Storage backend for per-visitor persisted flags. Production uses the
/// database; tests inject an in-memory map instead.
#[cfg_attr(test, mockall::automock)]
pub trait SettingsStorage: Send + Sync {
    fn get(&self, visitor_id: &str, key: &str) -> Result<Option<String>, ServiceError>;
    fn set(&self, visitor_id: &str, key: &str, value: &str) -> Result<(), ServiceError>;
    fn remove(&self, visitor_id: &str, key: &str) -> Result<(), ServiceError>;
}

pub struct DbSettingsStorage {
    pool: DbPool,
}

impl DbSettingsStorage {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl SettingsStorage for DbSettingsStorage {
    fn get(&self, visitor_id: &str, key: &str) -> Result<Option<String>, ServiceError> {
        let mut conn = self.pool.get().map_err(|e| ServiceError::Storage(e.to_string()))?;
        let value = visitor_settings::table
            .filter(visitor_settings::visitor_id.eq(visitor_id))
            .filter(visitor_settings::key.eq(key))
            .select(visitor_settings::value)
            .first::<String>(&mut conn)
            .optional()?;
        Ok(value)
    }

    fn set(&self, visitor_id: &str, key: &str, value: &str) -> Result<(), ServiceError> {
        let mut conn = self.pool.get().map_err(|e| ServiceError::Storage(e.to_string()))?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i32;
        let row = NewVisitorSetting {
            visitor_id: visitor_id.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            updated_at: now,
        };
        diesel::insert_into(visitor_settings::table)
            .values(&row)
            .on_conflict((visitor_settings::visitor_id, visitor_settings::key))
            .do_update()
            .set((
                visitor_settings::value.eq(value),
                visitor_settings::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    fn remove(&self, visitor_id: &str, key: &str) -> Result<(), ServiceError> {
        let mut conn = self.pool.get().map_err(|e| ServiceError::Storage(e.to_string()))?;
        diesel::delete(
            visitor_settings::table
                .filter(visitor_settings::visitor_id.eq(visitor_id))
                .filter(visitor_settings::key.eq(key)),
        )
        .execute(&mut conn)?;
        Ok(())
    }
}

/// In-memory backend for tests.
#[derive(Default)]
pub struct MemorySettingsStorage {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl SettingsStorage for MemorySettingsStorage {
    fn get(&self, visitor_id: &str, key: &str) -> Result<Option<String>, ServiceError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(&(visitor_id.to_string(), key.to_string())).cloned())
    }

    fn set(&self, visitor_id: &str, key: &str, value: &str) -> Result<(), ServiceError> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert((visitor_id.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn remove(&self, visitor_id: &str, key: &str) -> Result<(), ServiceError> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(&(visitor_id.to_string(), key.to_string()));
        Ok(())
    }
}

/// Typed get/set contract over whichever backend was injected.
pub struct SettingsService {
    storage: Arc<dyn SettingsStorage>,
}

impl SettingsService {
    pub fn new(storage: Arc<dyn SettingsStorage>) -> Self {
        Self { storage }
    }

    pub fn get_json<T: DeserializeOwned>(
        &self,
        visitor_id: &str,
        key: &str,
    ) -> Result<Option<T>, ServiceError> {
        match self.storage.get(visitor_id, key)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    // A corrupt record is treated as absent rather than fatal.
                    tracing::warn!("Discarding unparseable setting {} for visitor: {}", key, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(
        &self,
        visitor_id: &str,
        key: &str,
        value: &T,
    ) -> Result<(), ServiceError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        self.storage.set(visitor_id, key, &raw)
    }

    pub fn get_flag(&self, visitor_id: &str, key: &str) -> Result<bool, ServiceError> {
        Ok(self.storage.get(visitor_id, key)?.as_deref() == Some("true"))
    }

    pub fn set_flag(&self, visitor_id: &str, key: &str, value: bool) -> Result<(), ServiceError> {
        self.storage
            .set(visitor_id, key, if value { "true" } else { "false" })
    }

    pub fn contains(&self, visitor_id: &str, key: &str) -> Result<bool, ServiceError> {
        Ok(self.storage.get(visitor_id, key)?.is_some())
    }

    pub fn set_raw(&self, visitor_id: &str, key: &str, value: &str) -> Result<(), ServiceError> {
        self.storage.set(visitor_id, key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        enabled: bool,
        label: String,
    }

    #[test]
    fn json_round_trips_through_memory_backend() {
        let service = SettingsService::new(Arc::new(MemorySettingsStorage::default()));
        let sample = Sample { enabled: true, label: "hi".into() };
        service.set_json("v-1", "sample", &sample).unwrap();
        assert_eq!(service.get_json::<Sample>("v-1", "sample").unwrap(), Some(sample));
        assert_eq!(service.get_json::<Sample>("v-2", "sample").unwrap(), None);
    }

    #[test]
    fn corrupt_record_reads_as_absent() {
        let storage = Arc::new(MemorySettingsStorage::default());
        storage.set("v-1", "sample", "{not json").unwrap();
        let service = SettingsService::new(storage);
        assert_eq!(service.get_json::<Sample>("v-1", "sample").unwrap(), None);
    }

    #[test]
    fn flags_default_to_false() {
        let service = SettingsService::new(Arc::new(MemorySettingsStorage::default()));
        assert!(!service.get_flag("v-1", POPUP_DISMISSED_KEY).unwrap());
        service.set_flag("v-1", POPUP_DISMISSED_KEY, true).unwrap();
        assert!(service.get_flag("v-1", POPUP_DISMISSED_KEY).unwrap());
    }

    #[test]
    fn storage_calls_are_scoped_to_the_visitor() {
        let mut storage = MockSettingsStorage::new();
        storage
            .expect_set()
            .withf(|visitor, key, value| visitor == "v-9" && key == "k" && value == "true")
            .times(1)
            .returning(|_, _, _| Ok(()));
        let service = SettingsService::new(Arc::new(storage));
        service.set_flag("v-9", "k", true).unwrap();
    }
}
