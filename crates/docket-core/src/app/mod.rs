//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//! どのサービスもリクエスト間で状態を持たず、正本は TaskStore だけ。
//!
//! # 主要コンポーネント
//! - **BrokerBuilder / Broker**: 構築とワイヤリング、公開 API
//! - **TaskTypeRegistry**: 型の登録・取得・無効化
//! - **TaskCreationService**: 検証 → 重複排除 → 作成
//! - **ClaimService**: 排他的な取得（期限切れの lazy reclaim を含む）
//! - **CompletionService**: 所有者検証 → リトライ判定 → 遷移、進捗更新
//! - **TaskQueries**: 取得・一覧・履歴

pub mod broker;
pub mod claim;
pub mod completion;
pub mod context;
pub mod creation;
pub mod queries;
pub mod registry;
mod retry;

// 主要な型を再エクスポート
pub use self::broker::{Broker, BrokerBuilder, BuildError};
pub use self::claim::{ClaimService, ClaimTask};
pub use self::completion::{CompleteTask, Completion, CompletionService, UpdateProgress};
pub use self::context::ServiceContext;
pub use self::creation::{CreateTask, TaskCreationService};
pub use self::queries::{ListTasks, TaskQueries};
pub use self::registry::TaskTypeRegistry;
