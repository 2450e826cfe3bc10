//! Handler trait - タスクを実行する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<T, H> → DynHandler)

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::Task;

/// TaskPayload はタスク型名とパラメータの型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Deserialize)]
/// struct ResizeImage {
///     url: String,
///     width: u32,
/// }
///
/// impl TaskPayload for ResizeImage {
///     const TYPE: &'static str = "images.resize";
/// }
/// ```
pub trait TaskPayload: DeserializeOwned + Send + Sync + 'static {
    /// 登録済み TaskType の name
    const TYPE: &'static str;
}

/// Handler の失敗
///
/// `Retryable` は Decider に委ねる（attempts が残っていれば pending に戻る）。
/// `Permanent` は残り attempts に関係なく failed にする。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Retryable(String),

    #[error("{0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Handler は型付きパラメータを受け取り、result (任意) を返す
///
/// # ジェネリクスによる型安全性
/// - `Handler<ResizeImage>` は `ResizeImage` しか受け取れない
/// - 型名 (`T::TYPE`) と Handler の対応がコンパイル時に決まる
#[async_trait]
pub trait Handler<T: TaskPayload>: Send + Sync {
    async fn handle(&self, params: T, task: &Task) -> Result<Option<Value>, HandlerError>;
}

/// DynHandler は object-safe な Handler
///
/// `HashMap<String, Arc<dyn DynHandler>>` に格納するための型消去層。
/// 型付けが不要な Handler はこれを直接実装してもよい。
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, task: &Task) -> Result<Option<Value>, HandlerError>;
}

pub struct TypedHandler<T: TaskPayload, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: TaskPayload, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: TaskPayload, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(&self, task: &Task) -> Result<Option<Value>, HandlerError> {
        // パラメータはスキーマ検証済みだが、Rust の型と合わなければ再試行しても無駄
        let params: T = serde_json::from_value(task.parameters.clone())
            .map_err(|e| HandlerError::permanent(format!("json decode: {e}")))?;
        self.handler.handle(params, task).await
    }
}
