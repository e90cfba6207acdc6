use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::event::types::Event;
use crate::kernel::constants::DEFAULT_LISTENER_ORDER;
use crate::kernel::error::HandlerResult;
use crate::storage::config::ConfigData;

/// Identifier handed out for every listener, used for removal
pub type ListenerId = u64;

/// Type-erased listener callable
pub type ListenerFn = dyn Fn(ListenerContext, Arc<Event>) -> BoxFuture<'static, HandlerResult> + Send + Sync;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// The plugin a listener was registered by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginOwner {
    pub name: String,
    pub title: String,
}

/// What a listener receives besides the event: its owning plugin and that
/// plugin's current configuration. Both are empty for built-in listeners.
#[derive(Debug, Clone, Default)]
pub struct ListenerContext {
    pub plugin: Option<PluginOwner>,
    pub config: ConfigData,
}

/// A callable bound to one or more event types
pub struct EventListener {
    id: ListenerId,
    name: String,
    event_types: Vec<String>,
    order: i32,
    owner: Option<PluginOwner>,
    handler: Arc<ListenerFn>,
}

impl EventListener {
    pub fn new<I, E, F, Fut>(event_types: I, handler: F) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
        F: Fn(ListenerContext, Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: Arc<ListenerFn> = Arc::new(
            move |ctx: ListenerContext, event: Arc<Event>| -> BoxFuture<'static, HandlerResult> {
                Box::pin(handler(ctx, event))
            },
        );
        Self::from_handler(event_types, handler)
    }

    /// Wrap an already type-erased handler
    pub fn from_handler<I, E>(event_types: I, handler: Arc<ListenerFn>) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
    {
        let id = NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed);
        let mut types: Vec<String> = Vec::new();
        for event_type in event_types {
            let event_type = event_type.into();
            if !types.contains(&event_type) {
                types.push(event_type);
            }
        }
        Self {
            id,
            name: format!("listener-{}", id),
            event_types: types,
            order: DEFAULT_LISTENER_ORDER,
            owner: None,
            handler,
        }
    }

    /// Lower orders run first
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Name used in log lines
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub(crate) fn with_owner(mut self, owner: PluginOwner) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_types(&self) -> &[String] {
        &self.event_types
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn owner(&self) -> Option<&PluginOwner> {
        self.owner.as_ref()
    }

    pub(crate) fn invoke(&self, ctx: ListenerContext, event: Arc<Event>) -> BoxFuture<'static, HandlerResult> {
        (self.handler)(ctx, event)
    }
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("event_types", &self.event_types)
            .field("order", &self.order)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// Helper to create listeners from synchronous closures
pub fn sync_listener<F>(f: F) -> Arc<ListenerFn>
where
    F: Fn(&ListenerContext, &Event) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(
        move |ctx: ListenerContext, event: Arc<Event>| -> BoxFuture<'static, HandlerResult> {
            let result = f(&ctx, &event);
            Box::pin(async move { result })
        },
    )
}
