//! Background task table for report pipelines.
//!
//! A task is created `pending`, moves to `running` when its job starts and
//! ends `complete` (with a report URL) or `error` (with a detail message).
//! Terminal records stay pollable until the sweep evicts them.

pub mod context;
pub mod manager;
pub mod task;

pub use context::TaskContext;
pub use manager::{TaskManager, TaskManagerConfig};
pub use task::{TaskKind, TaskSnapshot, TaskStatus};
