use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::RwLock;

use crate::event::bus::panic_message;
use crate::kernel::component::KernelComponent;
use crate::kernel::error::Result;
use crate::plugin_system::task::PluginTask;
use crate::scheduler::{SchedulerError, TaskHandle, TaskInfo, TaskScheduler};

/// Keeps tasks in memory without any timing of its own.
///
/// `run_at_startup` tasks run when the scheduler is started, or right away
/// when they are added to an already started scheduler.
#[derive(Debug, Default)]
pub struct InMemoryScheduler {
    tasks: RwLock<BTreeMap<TaskHandle, Arc<PluginTask>>>,
    next_id: AtomicU64,
    started: AtomicBool,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn task(&self, handle: &TaskHandle) -> Option<Arc<PluginTask>> {
        self.tasks.read().await.get(handle).cloned()
    }

    /// Run a task now; false if no such task exists
    pub async fn run_now(&self, handle: &TaskHandle) -> bool {
        let Some(task) = self.task(handle).await else {
            return false;
        };
        run_guarded(task).await;
        true
    }

    /// Run every `run_at_startup` task; returns how many were started
    pub async fn run_startup_tasks(&self) -> usize {
        let startup: Vec<Arc<PluginTask>> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.runs_at_startup())
            .cloned()
            .collect();
        for task in &startup {
            launch_startup(task.clone()).await;
        }
        startup.len()
    }
}

async fn launch_startup(task: Arc<PluginTask>) {
    if task.runs_at_startup_in_thread() {
        tokio::spawn(run_guarded(task));
    } else {
        run_guarded(task).await;
    }
}

async fn run_guarded(task: Arc<PluginTask>) {
    log::debug!("Running task '{}'", task.name());
    let job = {
        let task = task.clone();
        async move { task.run().await }
    };
    let message = match AssertUnwindSafe(job).catch_unwind().await {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(panic) => panic_message(panic.as_ref()),
    };
    log::error!(
        "Task '{}' of plugin {} failed: {}",
        task.name(),
        task.owner().unwrap_or("<none>"),
        message
    );
}

#[async_trait]
impl TaskScheduler for InMemoryScheduler {
    async fn add_task(&self, task: Arc<PluginTask>) -> std::result::Result<TaskHandle, SchedulerError> {
        task.schedule()
            .validate()
            .map_err(|reason| SchedulerError::InvalidSchedule {
                task: task.name().to_string(),
                reason,
            })?;
        let handle = TaskHandle(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.tasks.write().await.insert(handle, task.clone());
        log::info!(
            "Task added: {} ({}) as {}",
            task.name(),
            task.owner().unwrap_or("<none>"),
            handle
        );
        if task.runs_at_startup() && self.started.load(Ordering::SeqCst) {
            launch_startup(task).await;
        }
        Ok(handle)
    }

    async fn remove_task(&self, handle: &TaskHandle) -> bool {
        let removed = self.tasks.write().await.remove(handle);
        if let Some(task) = &removed {
            log::info!("Task removed: {} ({})", task.name(), handle);
        }
        removed.is_some()
    }

    async fn get_tasks(&self) -> Vec<TaskInfo> {
        self.tasks
            .read()
            .await
            .iter()
            .map(|(handle, task)| TaskInfo {
                handle: *handle,
                name: task.name().to_string(),
                owner: task.owner().map(str::to_string),
                schedule: task.schedule().clone(),
            })
            .collect()
    }
}

#[async_trait]
impl KernelComponent for InMemoryScheduler {
    fn name(&self) -> &'static str {
        "InMemoryScheduler"
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::SeqCst);
        let count = self.run_startup_tasks().await;
        log::info!("Scheduler started; ran {} startup task(s)", count);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }
}
