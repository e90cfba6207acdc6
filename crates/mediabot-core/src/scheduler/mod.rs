//! # Mediabot Core Scheduler
//!
//! The interface the plugin runtime uses to hand periodic plugin tasks to a
//! scheduler, plus [`InMemoryScheduler`], which keeps tasks in memory and
//! runs the `run_at_startup` ones when started.
//!
//! Every registered task gets a [`TaskHandle`]. [`TaskInfo`] reports the
//! owning plugin so a plugin's tasks can be found again on uninstall.
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::plugin_system::task::{PluginTask, Schedule};

pub mod memory;

pub use memory::InMemoryScheduler;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid schedule for task '{task}': {reason}")]
    InvalidSchedule { task: String, reason: String },
}

/// Identifies a registered task
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TaskHandle(pub(crate) u64);

impl TaskHandle {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// A registered task as reported by [`TaskScheduler::get_tasks`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub handle: TaskHandle,
    pub name: String,
    /// Name of the plugin that registered the task
    pub owner: Option<String>,
    pub schedule: Schedule,
}

#[async_trait]
pub trait TaskScheduler: Send + Sync + fmt::Debug {
    async fn add_task(&self, task: Arc<PluginTask>) -> Result<TaskHandle, SchedulerError>;

    /// Returns whether a task with this handle existed
    async fn remove_task(&self, handle: &TaskHandle) -> bool;

    /// Registered tasks in registration order
    async fn get_tasks(&self) -> Vec<TaskInfo>;
}

#[cfg(test)]
mod tests;
