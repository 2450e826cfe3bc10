//! Worker - 組み込みのポーリングワーカー
//!
//! Broker の公開 API だけを使う（Claim → Handler → Complete）。
//!
//! # 二層構造
//! - **表層（Typed）**: `TaskPayload` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure

pub mod group;
pub mod handler;
pub mod registry;

pub use self::group::{WorkerGroup, WorkerOptions};
pub use self::handler::{DynHandler, Handler, HandlerError, TaskPayload, TypedHandler};
pub use self::registry::{HandlerRegistry, RegistryError};
