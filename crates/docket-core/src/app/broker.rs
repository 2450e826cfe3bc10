//! Broker - サービスの組み立てと公開 API
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 依存はコンストラクタで注入（グローバルな「現在のストア」はない）

use std::sync::Arc;

use super::claim::{ClaimService, ClaimTask};
use super::completion::{CompleteTask, CompletionService, UpdateProgress};
use super::context::ServiceContext;
use super::creation::{CreateTask, TaskCreationService};
use super::queries::{ListTasks, TaskQueries};
use super::registry::TaskTypeRegistry;
use crate::config::BrokerConfig;
use crate::domain::{
    BrokerError, Decider, DefaultDecider, Task, TaskHistory, TaskId, TaskType, TypeRegistration,
};
use crate::impls::TracingEventSink;
use crate::ports::{Clock, EventSink, IdGenerator, SystemClock, TaskStore, UlidGenerator};
use crate::scheduling::SchedulingStrategy;

/// BrokerBuilder は Broker を構築
///
/// # 使用例
/// ```ignore
/// let broker = Broker::builder()
///     .store(MemoryTaskStore::new())
///     .config(BrokerConfig::default())
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - store は必須。未設定なら BuildError::MissingStore
/// - config の値は build() 時に検証（0 の上限など）
/// - clock / ids / events / decider は省略時に本番用の実装を使う
#[derive(Default)]
pub struct BrokerBuilder {
    store: Option<Arc<dyn TaskStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    events: Option<Arc<dyn EventSink>>,
    decider: Option<Arc<dyn Decider>>,
    config: BrokerConfig,
}

/// BuildError は Broker 構築時のエラー
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("No task store configured. Call `store()` or `shared_store()` before `build()`.")]
    MissingStore,

    #[error("Invalid broker configuration: {0}")]
    InvalidConfig(String),
}

impl BrokerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(self, store: impl TaskStore + 'static) -> Self {
        self.shared_store(Arc::new(store))
    }

    pub fn shared_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Broker, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        validate_config(&self.config)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        let ctx = ServiceContext {
            store,
            clock,
            ids,
            events: self.events.unwrap_or_else(|| Arc::new(TracingEventSink)),
            decider: self.decider.unwrap_or_else(|| Arc::new(DefaultDecider)),
            config: self.config,
        };
        Ok(Broker::from_context(ctx))
    }
}

fn validate_config(config: &BrokerConfig) -> Result<(), BuildError> {
    let mut problems = Vec::new();
    if config.default_max_attempts == 0 {
        problems.push("default_max_attempts must be at least 1");
    }
    if config.default_claim_timeout.is_zero() {
        problems.push("default_claim_timeout must be positive");
    }
    if config.max_list_limit == 0 {
        problems.push("max_list_limit must be at least 1");
    }
    if config.default_list_limit == 0 || config.default_list_limit > config.max_list_limit {
        problems.push("default_list_limit must be between 1 and max_list_limit");
    }
    if config.claim_candidate_batch == 0 {
        problems.push("claim_candidate_batch must be at least 1");
    }
    if !(config.conflict_retry.multiplier >= 1.0) {
        problems.push("conflict_retry.multiplier must be >= 1.0");
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(BuildError::InvalidConfig(problems.join("; ")))
    }
}

/// Broker は 5 つのサービスの窓口
///
/// リクエスト間で状態を持たない（正本は TaskStore のみ）。Clone は安価で、
/// HTTP ハンドラやワーカー間で共有できる。
#[derive(Clone)]
pub struct Broker {
    registry: TaskTypeRegistry,
    creation: TaskCreationService,
    claims: ClaimService,
    completion: CompletionService,
    queries: TaskQueries,
    config: BrokerConfig,
}

impl Broker {
    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::new()
    }

    pub fn from_context(ctx: ServiceContext) -> Self {
        Self {
            registry: TaskTypeRegistry::new(ctx.clone()),
            creation: TaskCreationService::new(ctx.clone()),
            claims: ClaimService::new(ctx.clone()),
            completion: CompletionService::new(ctx.clone()),
            queries: TaskQueries::new(ctx.clone()),
            config: ctx.config,
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub async fn register_type(&self, registration: TypeRegistration) -> Result<TaskType, BrokerError> {
        self.registry.register(registration).await
    }

    pub async fn task_type(&self, name: &str) -> Result<TaskType, BrokerError> {
        self.registry.get(name).await
    }

    pub async fn task_types(&self, active_only: bool) -> Result<Vec<TaskType>, BrokerError> {
        self.registry.list(active_only).await
    }

    pub async fn deactivate_type(&self, name: &str) -> Result<TaskType, BrokerError> {
        self.registry.deactivate(name).await
    }

    pub async fn create_task(&self, request: CreateTask) -> Result<Task, BrokerError> {
        self.creation.create(request).await
    }

    /// `Ok(None)` means no task is available (not an error).
    pub async fn claim_task(&self, request: ClaimTask) -> Result<Option<Task>, BrokerError> {
        self.claims.claim(request).await
    }

    pub async fn claim_task_with(
        &self,
        request: ClaimTask,
        strategy: &dyn SchedulingStrategy,
    ) -> Result<Option<Task>, BrokerError> {
        self.claims.claim_with(request, strategy).await
    }

    pub async fn complete_task(&self, request: CompleteTask) -> Result<Task, BrokerError> {
        self.completion.complete(request).await
    }

    pub async fn update_progress(&self, request: UpdateProgress) -> Result<Task, BrokerError> {
        self.completion.update_progress(request).await
    }

    pub async fn task(&self, id: TaskId) -> Result<Task, BrokerError> {
        self.queries.get(id).await
    }

    pub async fn list_tasks(&self, request: ListTasks) -> Result<Vec<Task>, BrokerError> {
        self.queries.list(request).await
    }

    pub async fn task_history(&self, id: TaskId) -> Result<Vec<TaskHistory>, BrokerError> {
        self.queries.history(id).await
    }
}
