//! docket-pg
//!
//! PostgreSQL の TaskStore 実装。
//!
//! # 排他と一貫性
//! - claim: `FOR UPDATE SKIP LOCKED` で候補をロックし、同じトランザクションで更新
//! - 重複排除: `dedup_key` の部分ユニークインデックス（pending/claimed のみ）
//! - 完了・進捗: `revision` 列による楽観ロック（不一致は `StoreError::Conflict`）
//! - 状態更新と history 行の追記は必ず同一トランザクション

mod error;
mod ordering;
mod rows;
mod store;

pub use self::store::PgTaskStore;
