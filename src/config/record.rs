// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Typed rule configuration record

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

/// Name of the single section in the flat file and the JSON envelope key
pub const SECTION: &str = "Config";

/// Field names
pub mod field {
    /// Model path loaded at startup
    pub const YOLO_MODEL: &str = "yolo_model";
    /// Class counted by clause A
    pub const TYPE_1: &str = "type_1";
    /// Class counted by clause B
    pub const TYPE_2: &str = "type_2";
    /// Relation code of clause A
    pub const RELATION_1: &str = "relation_1";
    /// Relation code of clause B
    pub const RELATION_2: &str = "relation_2";
    /// Threshold of clause A
    pub const NUMBER_1: &str = "number_1";
    /// Threshold of clause B
    pub const NUMBER_2: &str = "number_2";
    /// Combinator code
    pub const LOGIC: &str = "logic";
    /// Command template sent when the rule holds
    pub const COMMAND: &str = "command";
    /// Command template sent when it does not
    pub const NEGATE_COMMAND: &str = "negate_command";
    /// Whether the negated command is sent
    pub const HAS_NEGATE: &str = "has_negate";
}

/// A persisted value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// `True`/`False` in the flat file
    Bool(bool),
    /// Integer
    Int(i64),
    /// Free text
    Str(String),
}

impl ConfigValue {
    /// Kind this value would be stored as
    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::Bool(_) => ValueKind::Bool,
            ConfigValue::Int(_) => ValueKind::Int,
            ConfigValue::Str(_) => ValueKind::Str,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Int(n) => write!(f, "{}", n),
            ConfigValue::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Free text
    Str,
    /// Signed integer
    Int,
    /// `True`/`False`
    Bool,
}

impl ValueKind {
    /// Name used in type errors
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Str => "string",
            ValueKind::Int => "integer",
            ValueKind::Bool => "boolean",
        }
    }

    fn default_value(self) -> ConfigValue {
        match self {
            ValueKind::Str => ConfigValue::Str(String::new()),
            ValueKind::Int => ConfigValue::Int(0),
            ValueKind::Bool => ConfigValue::Bool(false),
        }
    }
}

/// Declared field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Field name as persisted
    pub name: &'static str,
    /// Declared type
    pub kind: ValueKind,
}

/// Every declared field, in persisted order
pub const FIELDS: &[FieldSpec] = &[
    FieldSpec { name: field::YOLO_MODEL, kind: ValueKind::Str },
    FieldSpec { name: field::TYPE_1, kind: ValueKind::Str },
    FieldSpec { name: field::TYPE_2, kind: ValueKind::Str },
    FieldSpec { name: field::RELATION_1, kind: ValueKind::Int },
    FieldSpec { name: field::RELATION_2, kind: ValueKind::Int },
    FieldSpec { name: field::NUMBER_1, kind: ValueKind::Int },
    FieldSpec { name: field::NUMBER_2, kind: ValueKind::Int },
    FieldSpec { name: field::LOGIC, kind: ValueKind::Int },
    FieldSpec { name: field::COMMAND, kind: ValueKind::Str },
    FieldSpec { name: field::NEGATE_COMMAND, kind: ValueKind::Str },
    FieldSpec { name: field::HAS_NEGATE, kind: ValueKind::Bool },
];

/// Look up a declared field by name
pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|f| f.name == name)
}

/// Coerce a bare persisted token: integer first, then `True`/`False`, else string.
pub fn coerce(raw: &str) -> ConfigValue {
    if let Ok(n) = raw.parse::<i64>() {
        return ConfigValue::Int(n);
    }
    match raw {
        "True" => ConfigValue::Bool(true),
        "False" => ConfigValue::Bool(false),
        _ => ConfigValue::Str(raw.to_string()),
    }
}

/// Ordered mapping of every declared field to its typed value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRecord {
    entries: Vec<(&'static str, ConfigValue)>,
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self {
            entries: FIELDS
                .iter()
                .map(|f| (f.name, f.kind.default_value()))
                .collect(),
        }
    }
}

impl ConfigRecord {
    /// Typed value of a field, `None` for undeclared names
    pub fn get(&self, name: &str) -> Option<&ConfigValue> {
        self.entries
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    /// String field value, empty when unset or of another kind
    pub fn get_str(&self, name: &str) -> &str {
        match self.get(name) {
            Some(ConfigValue::Str(s)) => s,
            _ => "",
        }
    }

    /// Integer field value, 0 when unset or of another kind
    pub fn get_int(&self, name: &str) -> i64 {
        match self.get(name) {
            Some(ConfigValue::Int(n)) => *n,
            _ => 0,
        }
    }

    /// Boolean field value, false when unset
    pub fn get_bool(&self, name: &str) -> bool {
        matches!(self.get(name), Some(ConfigValue::Bool(true)))
    }

    /// Set a declared field, rejecting unknown names and mismatched types.
    pub fn set(&mut self, name: &str, value: ConfigValue) -> Result<(), ConfigError> {
        let spec = field_spec(name).ok_or_else(|| ConfigError::UnknownField(name.to_string()))?;
        if value.kind() != spec.kind {
            return Err(ConfigError::UnsupportedValueType {
                field: name.to_string(),
                expected: spec.kind.name(),
                found: value.to_string(),
            });
        }
        if let Some(slot) = self.entries.iter_mut().find(|(key, _)| *key == spec.name) {
            slot.1 = value;
        }
        Ok(())
    }

    /// Set a field from a raw user-supplied token. String fields take the text
    /// verbatim so that e.g. a command of `5` is not rejected as an integer.
    pub fn set_raw(&mut self, name: &str, raw: &str) -> Result<(), ConfigError> {
        let spec = field_spec(name).ok_or_else(|| ConfigError::UnknownField(name.to_string()))?;
        let value = match spec.kind {
            ValueKind::Str => ConfigValue::Str(raw.to_string()),
            _ => coerce(raw),
        };
        self.set(name, value)
    }

    /// Fields in persisted order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ConfigValue)> {
        self.entries.iter().map(|(key, value)| (*key, value))
    }
}
