//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **MemoryTaskStore**: プロセス内の正本
//! - **TracingEventSink / NoopEventSink / MemoryEventSink**
//!
//! # 本番用実装
//! PostgreSQL の TaskStore は別クレート `docket-pg` に配置します。

pub mod event_sinks;
pub mod memory_store;

pub use self::event_sinks::{MemoryEventSink, NoopEventSink, TracingEventSink};
pub use self::memory_store::MemoryTaskStore;
