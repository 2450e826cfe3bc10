//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース。同一プロセス内で厳密に単調増加。
//!
//! `sort_by=id` は ULID の順序（= 作成順）で並べるので、同じミリ秒内で
//! 生成した ID も前後関係を保つ必要があります。

use std::sync::{Mutex, PoisonError};

use ulid::Ulid;

use crate::domain::ids::{HistoryId, TaskId, TaskTypeId};
use crate::ports::Clock;

/// IdGenerator は ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数のリクエストから共有される）
pub trait IdGenerator: Send + Sync {
    fn task_id(&self) -> TaskId;

    fn task_type_id(&self) -> TaskTypeId;

    fn history_id(&self) -> HistoryId;
}

/// UlidGenerator は Clock の時刻から ULID を生成
///
/// FixedClock / ManualClock を使えば timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
    last: Mutex<Ulid>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            last: Mutex::new(Ulid::nil()),
        }
    }

    /// 直前の値より必ず大きい ULID
    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        let candidate = Ulid::from_parts(timestamp_ms, rand::random());

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let next = if candidate > *last {
            candidate
        } else {
            // 同一ミリ秒（または時計の巻き戻り）: 直前値のランダム部を +1
            last.increment().unwrap_or(candidate)
        };
        *last = next;
        next
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn task_id(&self) -> TaskId {
        TaskId::from(self.next_ulid())
    }

    fn task_type_id(&self) -> TaskTypeId {
        TaskTypeId::from(self.next_ulid())
    }

    fn history_id(&self) -> HistoryId {
        HistoryId::from(self.next_ulid())
    }
}
