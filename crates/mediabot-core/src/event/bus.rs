use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{Notify, RwLock, Semaphore};

use crate::event::error::EventSystemError;
use crate::event::listener::{EventListener, ListenerContext, ListenerId};
use crate::event::types::Event;
use crate::kernel::component::KernelComponent;
use crate::kernel::constants::DEFAULT_EVENT_WORKERS;
use crate::kernel::error::Result;
use crate::storage::config::{ConfigData, PluginConfigStore};

/// Listener lists are replaced, never mutated, so a publish can keep the
/// snapshot it took while registrations change underneath it.
type ListenerList = Arc<Vec<Arc<EventListener>>>;

/// Routes published events to the listeners bound to their type.
///
/// Listeners of one event type run in ascending `order`; listeners with the
/// same order run in registration order. A listener that fails or panics is
/// logged and the remaining listeners still run.
pub struct EventBus {
    listeners: RwLock<HashMap<String, ListenerList>>,
    config_store: Option<Arc<dyn PluginConfigStore>>,
    workers: Arc<Semaphore>,
    worker_count: usize,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    stopped: AtomicBool,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_workers(DEFAULT_EVENT_WORKERS)
    }

    /// Create a bus whose background pool runs at most `workers` listeners at once
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            listeners: RwLock::new(HashMap::new()),
            config_store: None,
            workers: Arc::new(Semaphore::new(workers)),
            worker_count: workers,
            pending: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Plugin listeners receive their plugin's config from this store
    pub fn with_config_store(mut self, store: Arc<dyn PluginConfigStore>) -> Self {
        self.config_store = Some(store);
        self
    }

    /// Bind a listener to each of its event types
    pub async fn add_listener(&self, listener: impl Into<Arc<EventListener>>) -> ListenerId {
        let listener: Arc<EventListener> = listener.into();
        let mut listeners = self.listeners.write().await;
        for event_type in listener.event_types() {
            let mut list: Vec<Arc<EventListener>> = listeners
                .get(event_type)
                .map(|existing| existing.as_ref().clone())
                .unwrap_or_default();
            list.push(listener.clone());
            // Stable sort keeps registration order among equal orders.
            list.sort_by_key(|l| l.order());
            listeners.insert(event_type.clone(), Arc::new(list));
        }
        log::info!(
            "Listener added: {}{} bound to [{}] with order {}",
            listener
                .owner()
                .map(|o| format!("{}.", o.name))
                .unwrap_or_default(),
            listener.name(),
            listener.event_types().join(","),
            listener.order()
        );
        listener.id()
    }

    /// Remove a listener from every event type it is bound to
    pub async fn remove_listener(&self, id: ListenerId) -> bool {
        self.remove_where(|l| l.id() == id).await > 0
    }

    /// Remove every listener registered by the named plugin; returns how many
    pub async fn remove_listeners_owned_by(&self, plugin: &str) -> usize {
        self.remove_where(|l| l.owner().is_some_and(|o| o.name == plugin))
            .await
    }

    async fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&EventListener) -> bool,
    {
        let mut listeners = self.listeners.write().await;
        let mut removed: Vec<ListenerId> = Vec::new();
        for list in listeners.values_mut() {
            if !list.iter().any(|l| predicate(l)) {
                continue;
            }
            let mut kept: Vec<Arc<EventListener>> = Vec::with_capacity(list.len());
            for listener in list.iter() {
                if predicate(listener) {
                    if !removed.contains(&listener.id()) {
                        removed.push(listener.id());
                    }
                } else {
                    kept.push(listener.clone());
                }
            }
            *list = Arc::new(kept);
        }
        listeners.retain(|_, list| !list.is_empty());
        removed.len()
    }

    /// Listeners bound to an event type, in invocation order
    pub async fn listeners_for(&self, event_type: &str) -> Vec<Arc<EventListener>> {
        self.listeners
            .read()
            .await
            .get(event_type)
            .map(|list| list.as_ref().clone())
            .unwrap_or_default()
    }

    /// Ids of every listener registered by the named plugin
    pub async fn listeners_owned_by(&self, plugin: &str) -> Vec<ListenerId> {
        let listeners = self.listeners.read().await;
        let mut ids: Vec<ListenerId> = Vec::new();
        for list in listeners.values() {
            for listener in list.iter() {
                if listener.owner().is_some_and(|o| o.name == plugin) && !ids.contains(&listener.id()) {
                    ids.push(listener.id());
                }
            }
        }
        ids
    }

    /// Number of distinct registered listeners
    pub async fn listener_count(&self) -> usize {
        let listeners = self.listeners.read().await;
        let mut ids: Vec<ListenerId> = listeners
            .values()
            .flat_map(|list| list.iter().map(|l| l.id()))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    /// Invoke every matching listener in order and wait for all of them
    pub async fn publish(&self, event: Event) {
        let Some(snapshot) = self.snapshot(event.event_type()).await else {
            log::debug!("No listeners for event '{}'", event.event_type());
            return;
        };
        let event = Arc::new(event);
        for listener in snapshot.iter() {
            let ctx = self.context_for(listener);
            run_isolated(listener.clone(), ctx, event.clone()).await;
        }
    }

    /// Submit every matching listener to the worker pool and return at once.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn publish_in_background(&self, event: Event) -> std::result::Result<(), EventSystemError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(EventSystemError::DispatcherStopped {
                event_type: event.event_type().to_string(),
            });
        }
        let Some(snapshot) = self.snapshot(event.event_type()).await else {
            return Ok(());
        };
        let event = Arc::new(event);
        for listener in snapshot.iter() {
            let ctx = self.context_for(listener);
            let listener = listener.clone();
            let event = event.clone();
            self.spawn_worker(async move { run_isolated(listener, ctx, event).await })?;
        }
        Ok(())
    }

    /// Run an arbitrary job on the event worker pool
    pub fn spawn_background<F>(&self, job: F) -> std::result::Result<(), EventSystemError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(EventSystemError::DispatcherStopped {
                event_type: "<background job>".to_string(),
            });
        }
        self.spawn_worker(job)
    }

    fn spawn_worker<F>(&self, job: F) -> std::result::Result<(), EventSystemError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| EventSystemError::InternalError(format!("no runtime for background work: {}", e)))?;
        let workers = self.workers.clone();
        let pending = self.pending.clone();
        let idle = self.idle.clone();
        pending.fetch_add(1, Ordering::SeqCst);
        handle.spawn(async move {
            // The semaphore is never closed, so acquiring can only fail if it were.
            if let Ok(_permit) = workers.acquire_owned().await {
                if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
                    log::error!("Background job {}", panic_message(panic.as_ref()));
                }
            }
            if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                idle.notify_waiters();
            }
        });
        Ok(())
    }

    /// Wait until every submitted background job has finished
    pub async fn drain(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Number of background jobs submitted but not yet finished
    pub fn pending_jobs(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    async fn snapshot(&self, event_type: &str) -> Option<ListenerList> {
        self.listeners
            .read()
            .await
            .get(event_type)
            .filter(|list| !list.is_empty())
            .cloned()
    }

    fn context_for(&self, listener: &EventListener) -> ListenerContext {
        let Some(owner) = listener.owner() else {
            return ListenerContext::default();
        };
        let config = match &self.config_store {
            Some(store) => store.get(&owner.name).unwrap_or_else(|e| {
                log::warn!("Failed to read config of plugin '{}': {}", owner.name, e);
                ConfigData::new()
            }),
            None => ConfigData::new(),
        };
        ListenerContext {
            plugin: Some(owner.clone()),
            config,
        }
    }
}

async fn run_isolated(listener: Arc<EventListener>, ctx: ListenerContext, event: Arc<Event>) {
    let invocation = {
        let listener = listener.clone();
        let event = event.clone();
        // Build the future inside the guarded block so a panic while creating it is caught too.
        async move { listener.invoke(ctx, event).await }
    };
    let message = match AssertUnwindSafe(invocation).catch_unwind().await {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(panic) => panic_message(panic.as_ref()),
    };
    let error = EventSystemError::ListenerExecution {
        event_type: event.event_type().to_string(),
        plugin: listener.owner().map(|o| o.title.clone()),
        message,
    };
    log::error!("{} (listener: {}, event: {})", error, listener.name(), event.to_json());
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("worker_count", &self.worker_count)
            .field("pending", &self.pending.load(Ordering::SeqCst))
            .field("stopped", &self.stopped.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KernelComponent for EventBus {
    fn name(&self) -> &'static str {
        "EventBus"
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.stopped.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        log::info!("Waiting for {} background event job(s)", self.pending_jobs());
        self.drain().await;
        Ok(())
    }
}
