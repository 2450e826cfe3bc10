//! WorkerGroup - N 本のポーリングループ
//!
//! 各ループは登録済みの型を順に Claim し、Handler を実行して Complete する。
//! どの型にもタスクがなければ `poll_interval` だけ待つ。
//!
//! # 停止
//! - `watch` チャネルで停止を通知する
//! - 実行中の Handler は最後まで走り、結果を報告してから抜ける

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::handler::{DynHandler, HandlerError};
use super::registry::HandlerRegistry;
use crate::app::{Broker, ClaimTask, CompleteTask};
use crate::domain::{BrokerError, TaskTypeId};
use crate::scheduling::SortSpec;

/// Worker の動作パラメータ
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOptions {
    /// ワーカー i の worker_id は `{prefix}-{i}`
    pub worker_id_prefix: String,

    /// 全ての型で取得できるタスクがなかったときの待ち時間
    pub poll_interval: Duration,

    /// `None` なら BrokerConfig::default_claim_timeout
    pub claim_timeout: Option<Duration>,

    pub sort: SortSpec,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            worker_id_prefix: "docket-worker".to_string(),
            poll_interval: Duration::from_millis(500),
            claim_timeout: None,
            sort: SortSpec::default(),
        }
    }
}

struct Binding {
    task_type_id: TaskTypeId,
    task_type: String,
    handler: Arc<dyn DynHandler>,
}

/// Worker group handle.
/// - `shutdown_tx` を drop するとワーカー全体が止まる
/// - `join()` で全ワーカーの終了を待てる
///
/// ワーカーは Broker の普通のクライアントで、特権はない
/// （Claim → Handler → Complete を繰り返すだけ）。
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers polling every type in `registry`.
    ///
    /// 型名はここで TaskTypeId に解決する。未登録の型があれば `TypeNotFound`。
    pub async fn spawn(
        n: usize,
        broker: Broker,
        registry: Arc<HandlerRegistry>,
        options: WorkerOptions,
    ) -> Result<Self, BrokerError> {
        let mut bindings = Vec::with_capacity(registry.len());
        for name in registry.registered_types() {
            let task_type = broker.task_type(&name).await?;
            if let Some(handler) = registry.get(&name) {
                bindings.push(Binding {
                    task_type_id: task_type.id,
                    task_type: name,
                    handler,
                });
            }
        }
        let bindings: Arc<[Binding]> = bindings.into();
        let options = Arc::new(options);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for i in 0..n {
            let worker_id = format!("{}-{i}", options.worker_id_prefix);
            let broker = broker.clone();
            let bindings = Arc::clone(&bindings);
            let options = Arc::clone(&options);
            let rx = shutdown_rx.clone();

            let span = tracing::info_span!("worker", worker_id = %worker_id);
            let join = tokio::spawn(
                worker_loop(worker_id, broker, bindings, options, rx).instrument(span),
            );
            joins.push(join);
        }

        tracing::info!(workers = n, types = bindings.len(), "worker group started");
        Ok(Self { shutdown_tx, joins })
    }

    /// Request shutdown for all workers.
    /// 実行中の Handler は中断しない。新しい Claim をやめるだけ。
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            if let Err(e) = j.await {
                tracing::error!(error = %e, "worker task panicked");
            }
        }
    }
}

async fn worker_loop(
    worker_id: String,
    broker: Broker,
    bindings: Arc<[Binding]>,
    options: Arc<WorkerOptions>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let mut worked = false;
        for binding in bindings.iter() {
            match run_once(&worker_id, &broker, binding, &options).await {
                Ok(ran) => worked |= ran,
                Err(e) => {
                    tracing::warn!(task_type = %binding.task_type, kind = e.kind().as_str(), error = %e, "worker iteration failed");
                }
            }
        }

        if !worked {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // sender dropped
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(options.poll_interval) => {}
            }
        }
    }
    tracing::debug!("worker stopped");
}

/// Claims one task of `binding`'s type and reports the outcome.
/// `Ok(false)` when nothing was available.
async fn run_once(
    worker_id: &str,
    broker: &Broker,
    binding: &Binding,
    options: &WorkerOptions,
) -> Result<bool, BrokerError> {
    let mut request = ClaimTask::new(worker_id, binding.task_type_id).sort(options.sort);
    if let Some(timeout) = options.claim_timeout {
        request = request.claim_timeout(timeout);
    }
    let Some(task) = broker.claim_task(request).await? else {
        return Ok(false);
    };

    let span = tracing::info_span!(
        "handle_task",
        task_id = %task.id,
        task_type = %task.task_type,
        attempts = task.attempts,
    );
    let outcome = binding.handler.handle_dyn(&task).instrument(span).await;

    let completion = match outcome {
        Ok(result) => CompleteTask::success(task.id, worker_id, result),
        Err(HandlerError::Retryable(message)) => {
            CompleteTask::failure(task.id, worker_id, Some(message))
        }
        Err(HandlerError::Permanent(message)) => {
            CompleteTask::failure(task.id, worker_id, Some(message)).no_retry()
        }
    };

    match broker.complete_task(completion).await {
        Ok(done) => {
            tracing::debug!(task_id = %done.id, status = %done.status, "task reported");
        }
        // the claim expired while the handler ran and someone else holds the task now
        Err(e @ (BrokerError::NotOwner { .. } | BrokerError::NotClaimed { .. })) => {
            tracing::warn!(task_id = %task.id, error = %e, "claim lost before completion");
        }
        Err(e) => return Err(e),
    }
    Ok(true)
}
