//! EventSink port - イベント記録の抽象化
//!
//! 実装は `impls::event_sinks`（tracing / noop / memory）。

use std::sync::Arc;

use crate::domain::DomainEvent;

/// EventSink はドメインイベントを受け取る
///
/// 状態変更の確定後に同期で呼ばれるため、ブロックしないこと。
/// 失敗してもブローカーの操作結果は変わらない（戻り値なし）。
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: DomainEvent) {
        (**self).emit(event)
    }
}
