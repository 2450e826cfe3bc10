//! TaskType - 作業の種類とパラメータ契約

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{BrokerError, FieldError};
use super::ids::TaskTypeId;

/// 型名の最大長（文字数）
pub const MAX_TYPE_NAME_LEN: usize = 128;

/// A registered category of work.
///
/// Never hard-deleted: deactivation flips `active` so historical tasks stay
/// interpretable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskType {
    pub id: TaskTypeId,
    pub name: String,
    pub version: String,
    pub parameter_schema: Value,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskType {
    /// A fresh, active definition. Stores keep the existing `id`/`created_at` when
    /// the name is already registered.
    pub fn new(id: TaskTypeId, registration: TypeRegistration, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: registration.name,
            version: registration.version,
            parameter_schema: registration.schema,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input of `Register(name, version, schema)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRegistration {
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub schema: Value,
}

impl TypeRegistration {
    pub fn new(name: impl Into<String>, version: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            schema,
        }
    }

    /// Checks the name contract and that the schema is an object; reports both.
    pub fn validate(&self) -> Result<(), BrokerError> {
        let mut errors = Vec::new();
        if let Err(e) = validate_type_name(&self.name) {
            errors.push(e);
        }
        if !self.schema.is_object() {
            errors.push(FieldError::new("schema", "must be a JSON object"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BrokerError::ValidationError { errors })
        }
    }
}

/// 型名: 1〜128 文字の `[A-Za-z0-9._:-]`
///
/// NUL を含め区切り文字になりうるものは拒否する（dedup key の前提）。
pub fn validate_type_name(name: &str) -> Result<(), FieldError> {
    if name.is_empty() {
        return Err(FieldError::new("name", "must not be empty"));
    }
    if name.chars().count() > MAX_TYPE_NAME_LEN {
        return Err(FieldError::new(
            "name",
            format!("must be at most {MAX_TYPE_NAME_LEN} characters"),
        ));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-')))
    {
        return Err(FieldError::new(
            "name",
            format!("contains disallowed character {bad:?}"),
        ));
    }
    Ok(())
}
