//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」です。各 trait は外部システム
//! （PostgreSQL、時計、ID 採番、イベント送信先）へのインターフェースを提供し、
//! サービスはコンストラクタで注入されたものだけを使います（グローバル状態なし）。

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::{ClaimSpec, Claimed, Insertion, TaskFilter, TaskStore};
