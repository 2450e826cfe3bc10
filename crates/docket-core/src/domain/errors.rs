//! Errors - ブローカーのエラー分類
//!
//! すべてのドメインエラーは `BrokerError` で呼び出し元に返します（panic しない）。
//! `kind()` は機械可読な名前、`Display` は人間向けメッセージです。
//!
//! # 分類
//! - 呼び出し側の誤り: TypeNotFound, TypeInactive, ValidationError, NotFound,
//!   NotClaimed, NotOwner, InvalidSortField
//! - 一時的: StoreConflict（リクエスト全体を再試行してよい）
//! - インフラ: Store
//!
//! 「取得できるタスクがない」はエラーではなく `Ok(None)` で表現します。

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::state::TaskStatus;

/// One failing field of a validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Path of the offending value (`$.x.y[0]`) or a request field name.
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// ErrorKind は運用上の分類（機械可読）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TypeNotFound,
    TypeInactive,
    ValidationError,
    NotFound,
    NotClaimed,
    NotOwner,
    InvalidSortField,
    StoreConflict,
    Store,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::TypeNotFound => "type_not_found",
            ErrorKind::TypeInactive => "type_inactive",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NotClaimed => "not_claimed",
            ErrorKind::NotOwner => "not_owner",
            ErrorKind::InvalidSortField => "invalid_sort_field",
            ErrorKind::StoreConflict => "store_conflict",
            ErrorKind::Store => "store",
        }
    }

    /// 再試行すれば成功しうるか
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::StoreConflict)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BrokerError はブローカー操作のエラー
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BrokerError {
    #[error("task type '{0}' is not registered")]
    TypeNotFound(String),

    #[error("task type '{0}' is inactive")]
    TypeInactive(String),

    #[error("validation failed: {}", summarize(.errors))]
    ValidationError { errors: Vec<FieldError> },

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {task_id} is not claimed (status: {status})")]
    NotClaimed { task_id: TaskId, status: TaskStatus },

    #[error("task {task_id} is not held by worker '{worker_id}'")]
    NotOwner { task_id: TaskId, worker_id: String },

    #[error("invalid sort field '{0}'")]
    InvalidSortField(String),

    #[error("store conflict: {0}")]
    StoreConflict(String),

    #[error("store failure: {0}")]
    Store(String),
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(FieldError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl BrokerError {
    /// Single-field validation failure.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        BrokerError::ValidationError {
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::TypeNotFound(_) => ErrorKind::TypeNotFound,
            BrokerError::TypeInactive(_) => ErrorKind::TypeInactive,
            BrokerError::ValidationError { .. } => ErrorKind::ValidationError,
            BrokerError::NotFound(_) => ErrorKind::NotFound,
            BrokerError::NotClaimed { .. } => ErrorKind::NotClaimed,
            BrokerError::NotOwner { .. } => ErrorKind::NotOwner,
            BrokerError::InvalidSortField(_) => ErrorKind::InvalidSortField,
            BrokerError::StoreConflict(_) => ErrorKind::StoreConflict,
            BrokerError::Store(_) => ErrorKind::Store,
        }
    }

    /// Field errors of a `ValidationError`, empty for every other kind.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            BrokerError::ValidationError { errors } => errors,
            _ => &[],
        }
    }
}

/// StoreError は TaskStore 実装が返すエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// ロック競合・楽観ロック失敗・シリアライズ失敗（再試行可）
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend: {0}")]
    Backend(String),

    /// 保存済みの行がドメイン型に戻せない
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<StoreError> for BrokerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => BrokerError::StoreConflict(msg),
            other => BrokerError::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn validation_message_lists_every_field() {
        let err = BrokerError::ValidationError {
            errors: vec![
                FieldError::new("$.x", "is required"),
                FieldError::new("$.y", "expected integer, got string"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("$.x: is required"));
        assert!(msg.contains("$.y: expected integer"));
        assert_eq!(err.field_errors().len(), 2);
    }

    #[test]
    fn kinds_have_snake_case_names() {
        let id = TaskId::from_ulid(Ulid::new());
        assert_eq!(BrokerError::NotFound(id).kind().as_str(), "not_found");
        assert_eq!(
            BrokerError::InvalidSortField("x".into()).kind().as_str(),
            "invalid_sort_field"
        );
        let json = serde_json::to_string(&ErrorKind::TypeInactive).unwrap();
        assert_eq!(json, "\"type_inactive\"");
    }

    #[test]
    fn store_conflict_stays_transient() {
        let err: BrokerError = StoreError::Conflict("lock timeout".into()).into();
        assert!(err.kind().is_transient());

        let err: BrokerError = StoreError::Backend("connection reset".into()).into();
        assert_eq!(err.kind(), ErrorKind::Store);
        assert!(!err.kind().is_transient());
    }
}
