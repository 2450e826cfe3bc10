//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID
//! すべての ID は ULID (Universally Unique Lexicographically Sortable Identifier) です。
//! - 時刻でソート可能: `sort_by=id` は作成順と一致する
//! - ストアに依存せず生成できる（採番テーブル不要）
//!
//! `Id<T>` は Phantom type パターンで、`TaskId` と `TaskTypeId` を混同できません。
//! JSON 上は素の ULID 文字列、`Display` はプレフィックス付き（ログ用）です。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "task-", "type-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Canonical storage form: the bare 26 character ULID string.
    pub fn to_ulid_string(&self) -> String {
        self.ulid.to_string()
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Error returned when an id string is neither a ULID nor a prefixed ULID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid id '{0}'")]
pub struct ParseIdError(pub String);

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ParseIdError;

    /// Accepts both the bare ULID and the `Display` form (`task-01H...`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|_| ParseIdError(s.to_string()))
    }
}

// ========================================
// マーカー型の定義
// ========================================

pub mod marker {
    use super::IdMarker;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum Task {}

    impl IdMarker for Task {
        fn prefix() -> &'static str {
            "task-"
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum TaskType {}

    impl IdMarker for TaskType {
        fn prefix() -> &'static str {
            "type-"
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum History {}

    impl IdMarker for History {
        fn prefix() -> &'static str {
            "hist-"
        }
    }
}

/// Identifier of a Task (one unit of queued work).
pub type TaskId = Id<marker::Task>;

/// Identifier of a registered TaskType.
pub type TaskTypeId = Id<marker::TaskType>;

/// Identifier of one TaskHistory ledger row.
pub type HistoryId = Id<marker::History>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let task = TaskId::from_ulid(Ulid::new());
        let task_type = TaskTypeId::from_ulid(Ulid::new());

        assert!(task.to_string().starts_with("task-"));
        assert!(task_type.to_string().starts_with("type-"));
        // let _: TaskId = task_type; // <- does not compile
    }

    #[test]
    fn ids_serialize_as_bare_ulid() {
        let ulid = Ulid::new();
        let id = TaskId::from_ulid(ulid);

        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, format!("\"{ulid}\""));

        let back: TaskId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn parse_accepts_prefixed_and_bare_forms() {
        let id = TaskId::from_ulid(Ulid::new());

        assert_eq!(id.to_string().parse::<TaskId>().unwrap(), id);
        assert_eq!(id.to_ulid_string().parse::<TaskId>().unwrap(), id);
        assert!("type-nope".parse::<TaskId>().is_err());
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = TaskId::from_ulid(Ulid::from_parts(1_000, 5));
        let id2 = TaskId::from_ulid(Ulid::from_parts(1_001, 0));
        assert!(id1 < id2);
        assert!(id1.to_ulid_string() < id2.to_ulid_string());
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
    }
}
