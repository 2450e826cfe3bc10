//! Decision model: what happens to a task after a failed attempt.
//!
//! The Decider is consulted only on the failure path of completion. It sees the
//! task as it stands after the attempt (so `attempts` already counts it) and
//! answers with `Retry` (back to pending) or `Fail` (terminal).

use super::task::Task;

/// The next action after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Return the task to the claimable pool.
    Retry { reason: String },

    /// Give up: the task becomes `failed`.
    Fail { reason: String },
}

impl Decision {
    pub fn reason(&self) -> &str {
        match self {
            Decision::Retry { reason } | Decision::Fail { reason } => reason,
        }
    }
}

/// Deciders are pure: same task, same decision, no side effects.
pub trait Decider: Send + Sync {
    fn decide(&self, task: &Task) -> Decision;
}

/// Retry while `attempts < max_attempts`, fail otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDecider;

impl Decider for DefaultDecider {
    fn decide(&self, task: &Task) -> Decision {
        if task.attempts >= task.max_attempts {
            Decision::Fail {
                reason: format!(
                    "max attempts reached: {}/{}",
                    task.attempts, task.max_attempts
                ),
            }
        } else {
            Decision::Retry {
                reason: format!("attempt {}/{} failed", task.attempts, task.max_attempts),
            }
        }
    }
}
