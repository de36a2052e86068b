// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Rule configuration store - flat file persistence and JSON interchange

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info, warn};

use super::ini;
use super::record::{field_spec, ConfigRecord, ConfigValue, SECTION};
use crate::error::ConfigError;

/// Load a record from the flat file. Absence is reported as `Missing`.
pub fn load(path: &Path) -> Result<ConfigRecord, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::Missing(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    let record = ini::parse(&content)?;
    info!("Loaded rule configuration from {:?}", path);
    Ok(record)
}

/// Persist every declared field.
pub fn save(record: &ConfigRecord, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, ini::render(record))?;
    info!("Saved rule configuration to {:?}", path);
    Ok(())
}

/// Mirror the record under its section name.
pub fn export_json(record: &ConfigRecord) -> Value {
    let mut fields = Map::new();
    for (key, value) in record.iter() {
        let json = match value {
            ConfigValue::Bool(b) => Value::Bool(*b),
            ConfigValue::Int(n) => Value::from(*n),
            ConfigValue::Str(s) => Value::String(s.clone()),
        };
        fields.insert(key.to_string(), json);
    }
    let mut doc = Map::new();
    doc.insert(SECTION.to_string(), Value::Object(fields));
    Value::Object(doc)
}

/// Merge the fields present in `doc` into `base`. Fields missing from the
/// document keep their current value; fields this version does not know are
/// skipped with a warning.
pub fn import_json(base: &ConfigRecord, doc: &Value) -> Result<ConfigRecord, ConfigError> {
    let fields = doc
        .get(SECTION)
        .and_then(Value::as_object)
        .ok_or_else(|| ConfigError::UnsupportedValueType {
            field: SECTION.to_string(),
            expected: "object",
            found: doc.to_string(),
        })?;

    let mut merged = base.clone();
    for (key, json) in fields {
        if field_spec(key).is_none() {
            warn!("Skipping unknown config field `{}` in import", key);
            continue;
        }
        let value = match json {
            Value::Bool(b) => ConfigValue::Bool(*b),
            Value::String(s) => ConfigValue::Str(s.clone()),
            Value::Number(n) if n.is_i64() => ConfigValue::Int(n.as_i64().unwrap_or_default()),
            other => {
                return Err(ConfigError::UnsupportedValueType {
                    field: key.clone(),
                    expected: "string, integer or boolean",
                    found: other.to_string(),
                })
            }
        };
        merged.set(key, value)?;
    }
    Ok(merged)
}

/// Owner of the current record. Every mutation holds the lock across the file
/// write so saves never interleave.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    record: Mutex<ConfigRecord>,
    revision: AtomicU64,
}

impl ConfigStore {
    /// Open the store, bootstrapping defaults on first run.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let record = match load(&path) {
            Ok(record) => record,
            Err(ConfigError::Missing(_)) => {
                info!("No rule configuration at {:?}, writing defaults", path);
                let record = ConfigRecord::default();
                save(&record, &path)?;
                record
            }
            Err(e) => {
                error!("Rule configuration at {:?} is unusable: {}", path, e);
                return Err(e);
            }
        };
        Ok(Self::with_record(path, record))
    }

    /// Open the store, falling back to in-memory defaults when the file cannot
    /// be used. The file is left as it is until the next update, save, reset
    /// or import writes it. The load error is returned alongside the store.
    pub fn open_or_default(path: impl Into<PathBuf>) -> (Self, Option<ConfigError>) {
        let path = path.into();
        match Self::open(path.clone()) {
            Ok(store) => (store, None),
            Err(e) => {
                warn!("Using default rule configuration until {:?} is repaired", path);
                (Self::with_record(path, ConfigRecord::default()), Some(e))
            }
        }
    }

    fn with_record(path: PathBuf, record: ConfigRecord) -> Self {
        Self {
            path,
            record: Mutex::new(record),
            revision: AtomicU64::new(0),
        }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current record
    pub fn snapshot(&self) -> ConfigRecord {
        self.record.lock().clone()
    }

    /// Bumped on every change to the in-memory record
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Apply `f` to the record and persist the result. The in-memory record
    /// only changes when both succeed.
    pub fn update<F>(&self, f: F) -> Result<ConfigRecord, ConfigError>
    where
        F: FnOnce(&mut ConfigRecord) -> Result<(), ConfigError>,
    {
        let mut guard = self.record.lock();
        let mut next = guard.clone();
        f(&mut next)?;
        save(&next, &self.path)?;
        *guard = next.clone();
        self.revision.fetch_add(1, Ordering::AcqRel);
        Ok(next)
    }

    /// Persist the current record as is
    pub fn save(&self) -> Result<(), ConfigError> {
        let guard = self.record.lock();
        save(&guard, &self.path)
    }

    /// Re-read the file, replacing the in-memory record.
    pub fn reload(&self) -> Result<ConfigRecord, ConfigError> {
        let mut guard = self.record.lock();
        let record = load(&self.path)?;
        *guard = record.clone();
        self.revision.fetch_add(1, Ordering::AcqRel);
        Ok(record)
    }

    /// Restore every field to its default and persist
    pub fn reset(&self) -> Result<ConfigRecord, ConfigError> {
        info!("Resetting rule configuration to defaults");
        self.update(|record| {
            *record = ConfigRecord::default();
            Ok(())
        })
    }

    /// Current record as a `{"Config": {...}}` document
    pub fn export_json(&self) -> Value {
        export_json(&self.record.lock())
    }

    /// Write the JSON form to `path`
    pub fn export_to(&self, path: &Path) -> Result<(), ConfigError> {
        let doc = self.export_json();
        std::fs::write(path, serde_json::to_string_pretty(&doc)?)?;
        info!("Exported rule configuration to {:?}", path);
        Ok(())
    }

    /// Merge a JSON document into the record and persist it
    pub fn import_json(&self, doc: &Value) -> Result<ConfigRecord, ConfigError> {
        self.update(|record| {
            *record = import_json(record, doc)?;
            Ok(())
        })
    }

    /// Import a JSON file written by [`ConfigStore::export_to`]
    pub fn import_from(&self, path: &Path) -> Result<ConfigRecord, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let doc: Value = serde_json::from_str(&content)?;
        let record = self.import_json(&doc)?;
        info!("Imported rule configuration from {:?}", path);
        Ok(record)
    }
}
