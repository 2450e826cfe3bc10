//! Bounded internal retry of store conflicts.

use std::future::Future;

use crate::config::ConflictRetryPolicy;
use crate::domain::BrokerError;

/// Runs `op` again while it fails with `StoreConflict`, up to `policy.max_retries`
/// times with exponential backoff. Every other result is returned as is.
///
/// `op` must be a whole transaction: each call starts from a fresh read.
pub(crate) async fn retry_on_conflict<T, F, Fut>(
    policy: &ConflictRetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T, BrokerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BrokerError>>,
{
    let mut retry = 0;
    loop {
        match op().await {
            Err(BrokerError::StoreConflict(reason)) if retry < policy.max_retries => {
                retry += 1;
                let delay = policy.next_delay(retry);
                tracing::warn!(operation, retry, ?delay, %reason, "store conflict, retrying");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_policy(max_retries: u32) -> ConflictRetryPolicy {
        ConflictRetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            multiplier: 1.0,
        }
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_success() {
        let calls = &AtomicU32::new(0);
        let result = retry_on_conflict(&fast_policy(3), "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(BrokerError::StoreConflict("busy".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn conflict_surfaces_after_max_retries() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = retry_on_conflict(&fast_policy(2), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BrokerError::StoreConflict("busy".into()))
        })
        .await;

        assert!(matches!(result, Err(BrokerError::StoreConflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = retry_on_conflict(&fast_policy(5), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BrokerError::TypeNotFound("t".into()))
        })
        .await;

        assert!(matches!(result, Err(BrokerError::TypeNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
