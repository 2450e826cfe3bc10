//! Domain model (IDs, task types, tasks, history, state machine, errors, events).
//!
//! I/O を持たない純粋な型とルールだけを置きます。永続化は `ports::TaskStore` 経由。

pub mod decision;
pub mod errors;
pub mod events;
pub mod history;
pub mod ids;
pub mod state;
pub mod task;
pub mod task_type;

pub use decision::{Decider, Decision, DefaultDecider};
pub use errors::{BrokerError, ErrorKind, FieldError, StoreError};
pub use events::DomainEvent;
pub use history::{StatusChange, TaskHistory};
pub use ids::{HistoryId, Id, IdMarker, ParseIdError, TaskId, TaskTypeId};
pub use state::{ParseStatusError, TaskStatus, Transition};
pub use task::{NewTask, Task, reclaim_cutoff};
pub use task_type::{TaskType, TypeRegistration, validate_type_name};
