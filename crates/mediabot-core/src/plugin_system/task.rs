use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::kernel::error::HandlerResult;

/// Type-erased task job
pub type TaskFn = dyn Fn() -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// When a task runs. Jitter is a random delay bound in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Schedule {
    Cron {
        expression: String,
        jitter: Option<u64>,
    },
    Interval {
        minutes: u64,
        seconds: u64,
        jitter: Option<u64>,
    },
}

impl Schedule {
    pub fn cron(expression: impl Into<String>) -> Self {
        Schedule::Cron {
            expression: expression.into(),
            jitter: None,
        }
    }

    pub fn every(minutes: u64, seconds: u64) -> Self {
        Schedule::Interval {
            minutes,
            seconds,
            jitter: None,
        }
    }

    pub fn with_jitter(self, jitter_secs: u64) -> Self {
        match self {
            Schedule::Cron { expression, .. } => Schedule::Cron {
                expression,
                jitter: Some(jitter_secs),
            },
            Schedule::Interval { minutes, seconds, .. } => Schedule::Interval {
                minutes,
                seconds,
                jitter: Some(jitter_secs),
            },
        }
    }

    /// Reason this schedule can never fire, if any
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Schedule::Cron { expression, .. } => {
                let fields = expression.split_whitespace().count();
                if (5..=6).contains(&fields) {
                    Ok(())
                } else {
                    Err(format!(
                        "cron expression '{}' must have 5 or 6 fields, found {}",
                        expression, fields
                    ))
                }
            }
            Schedule::Interval { minutes: 0, seconds: 0, .. } => {
                Err("interval must be longer than zero".to_string())
            }
            Schedule::Interval { .. } => Ok(()),
        }
    }
}

/// A periodic job registered by a plugin
#[derive(Clone)]
pub struct PluginTask {
    name: String,
    description: String,
    schedule: Schedule,
    run_at_startup: bool,
    run_at_startup_in_thread: bool,
    owner: Option<String>,
    job: Arc<TaskFn>,
}

impl PluginTask {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, schedule: Schedule, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let job: Arc<TaskFn> = Arc::new(move || -> BoxFuture<'static, HandlerResult> { Box::pin(job()) });
        Self {
            name: name.into(),
            description: description.into(),
            schedule,
            run_at_startup: false,
            run_at_startup_in_thread: false,
            owner: None,
            job,
        }
    }

    /// Also run once when the scheduler starts
    pub fn run_at_startup(mut self, enabled: bool) -> Self {
        self.run_at_startup = enabled;
        self
    }

    /// Run the startup invocation without holding up the rest of startup
    pub fn run_at_startup_in_thread(mut self, enabled: bool) -> Self {
        self.run_at_startup_in_thread = enabled;
        self
    }

    pub(crate) fn with_owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn runs_at_startup(&self) -> bool {
        self.run_at_startup
    }

    pub fn runs_at_startup_in_thread(&self) -> bool {
        self.run_at_startup_in_thread
    }

    /// Name of the plugin that registered this task
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn run(&self) -> BoxFuture<'static, HandlerResult> {
        (self.job)()
    }
}

impl fmt::Debug for PluginTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginTask")
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .field("run_at_startup", &self.run_at_startup)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// Returned by [`RegistrationContext::task`](crate::plugin_system::RegistrationContext::task)
pub struct TaskBuilder<'a> {
    task: &'a mut PluginTask,
}

impl<'a> TaskBuilder<'a> {
    pub(crate) fn new(task: &'a mut PluginTask) -> Self {
        Self { task }
    }

    pub fn run_at_startup(self, enabled: bool) -> Self {
        self.task.run_at_startup = enabled;
        self
    }

    pub fn run_at_startup_in_thread(self, enabled: bool) -> Self {
        self.task.run_at_startup_in_thread = enabled;
        self
    }
}
