//! HTTP handlers. Each one maps a JSON request onto one broker operation.

pub mod health;
pub mod task_types;
pub mod tasks;
