use std::path::PathBuf;
use std::sync::Arc;

use crate::event::EventBus;
use crate::kernel::component::KernelComponent;
use crate::kernel::constants;
use crate::kernel::error::{Error, KernelLifecyclePhase, Result};
use crate::kernel::settings::HostSettings;
use crate::plugin_system::dependency::CompatibilityGate;
use crate::plugin_system::loader::PluginLoader;
use crate::plugin_system::manager::DefaultPluginManager;
use crate::plugin_system::traits::PluginTable;
use crate::scheduler::{InMemoryScheduler, TaskScheduler};
use crate::storage::config::{FilePluginConfigStore, PluginConfigStore};
use crate::storage::local::LocalStorageProvider;
use crate::storage::provider::StorageProvider;

/// Main application struct wiring the plugin runtime together
pub struct Application {
    settings: HostSettings,
    config_store: Arc<dyn PluginConfigStore>,
    event_bus: Arc<EventBus>,
    scheduler: Arc<InMemoryScheduler>,
    plugin_manager: Arc<DefaultPluginManager>,
    // Start order; shutdown runs in reverse
    components: Vec<Arc<dyn KernelComponent>>,
    initialized: bool,
    started: bool,
}

impl Application {
    /// Create an application whose plugin configs live in the file named by
    /// `settings.plugin_config_file`
    pub fn new(settings: HostSettings, table: PluginTable) -> Result<Self> {
        let provider: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::new(PathBuf::new()));
        let store = FilePluginConfigStore::open(provider, settings.plugin_config_file.clone())?;
        Ok(Self::with_config_store(settings, table, Arc::new(store)))
    }

    /// Create an application on top of an existing config store
    pub fn with_config_store(
        settings: HostSettings,
        table: PluginTable,
        config_store: Arc<dyn PluginConfigStore>,
    ) -> Self {
        log::info!("Initializing {} v{}", constants::APP_NAME, settings.app_version);

        let event_bus = Arc::new(EventBus::with_workers(settings.event_workers).with_config_store(config_store.clone()));
        let scheduler = Arc::new(InMemoryScheduler::new());
        let gate = CompatibilityGate::new(settings.host_capabilities());
        let task_scheduler: Arc<dyn TaskScheduler> = scheduler.clone();
        let loader = PluginLoader::new(
            settings.plugin_dir.clone(),
            table,
            gate,
            event_bus.clone(),
            task_scheduler,
            config_store.clone(),
        );
        let plugin_manager = Arc::new(DefaultPluginManager::new(
            Arc::new(loader),
            event_bus.clone(),
            config_store.clone(),
        ));

        // Plugins load before the scheduler starts so their startup tasks run.
        let components: Vec<Arc<dyn KernelComponent>> =
            vec![event_bus.clone(), plugin_manager.clone(), scheduler.clone()];

        Self {
            settings,
            config_store,
            event_bus,
            scheduler,
            plugin_manager,
            components,
            initialized: false,
            started: false,
        }
    }

    /// Initialize and start every component
    pub async fn run(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::KernelLifecycleError {
                phase: KernelLifecyclePhase::Bootstrap,
                component_name: None,
                message: "Application already started".to_string(),
                source: None,
            });
        }
        self.initialize().await?;
        self.start().await?;
        log::info!("Application initialized and started successfully.");
        Ok(())
    }

    /// Initialize all components in order
    pub async fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        log::info!("Initializing components...");
        for component in &self.components {
            log::debug!("Initializing component: {}", component.name());
            component
                .initialize()
                .await
                .map_err(|e| lifecycle_error(KernelLifecyclePhase::Initialize, component.as_ref(), e))?;
        }
        self.initialized = true;
        Ok(())
    }

    /// Start all initialized components in order
    pub async fn start(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(Error::KernelLifecycleError {
                phase: KernelLifecyclePhase::Start,
                component_name: None,
                message: "Application must be initialized before it is started".to_string(),
                source: None,
            });
        }
        log::info!("Starting components...");
        for component in &self.components {
            log::debug!("Starting component: {}", component.name());
            component
                .start()
                .await
                .map_err(|e| lifecycle_error(KernelLifecyclePhase::Start, component.as_ref(), e))?;
        }
        self.started = true;
        Ok(())
    }

    /// Stop all components in reverse order. Every component is asked to
    /// stop; the first failure is returned.
    pub async fn shutdown(&mut self) -> Result<()> {
        log::info!("Shutting down components...");
        let mut first_error = None;
        for component in self.components.iter().rev() {
            log::debug!("Stopping component: {}", component.name());
            if let Err(e) = component.stop().await {
                log::error!("Error stopping component {}: {}", component.name(), e);
                if first_error.is_none() {
                    first_error = Some(lifecycle_error(KernelLifecyclePhase::Shutdown, component.as_ref(), e));
                }
            }
        }
        self.started = false;
        self.initialized = false;
        log::info!("Component shutdown complete.");
        first_error.map_or(Ok(()), Err)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn scheduler(&self) -> Arc<InMemoryScheduler> {
        self.scheduler.clone()
    }

    pub fn plugin_manager(&self) -> Arc<DefaultPluginManager> {
        self.plugin_manager.clone()
    }

    pub fn config_store(&self) -> Arc<dyn PluginConfigStore> {
        self.config_store.clone()
    }
}

fn lifecycle_error(phase: KernelLifecyclePhase, component: &dyn KernelComponent, source: Error) -> Error {
    Error::KernelLifecycleError {
        phase,
        component_name: Some(component.name().to_string()),
        message: format!("Component {} failed", component.name()),
        source: Some(Box::new(source)),
    }
}
