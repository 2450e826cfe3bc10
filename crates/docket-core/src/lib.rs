//! docket-core
//!
//! Core building blocks for the Docket task broker.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task_type, task, state, history, decision, errors, events）
//! - **ports**: 抽象化レイヤー（TaskStore, Clock, IdGenerator, EventSink）
//! - **app**: アプリケーションロジック（Broker, 各サービス）
//! - **impls**: 実装（MemoryTaskStore, EventSink 各種）
//! - **schema / dedup / scheduling**: パラメータ検証、重複排除キー、取得順序
//! - **worker**: 組み込みのポーリングワーカー

pub mod app;
pub mod config;
pub mod dedup;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod scheduling;
pub mod schema;
pub mod worker;

pub use app::{Broker, BrokerBuilder, BuildError};
pub use config::{BrokerConfig, ConflictRetryPolicy};
pub use domain::{BrokerError, ErrorKind, Task, TaskStatus, TaskType};
