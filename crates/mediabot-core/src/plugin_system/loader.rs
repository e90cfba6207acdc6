use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::RwLock;

use crate::event::bus::{panic_message, EventBus};
use crate::kernel::constants::{INSTALL_STAGING_PREFIX, MANIFEST_FILENAME, SKIP_FOLDERS};
use crate::plugin_system::context::RegistrationContext;
use crate::plugin_system::dependency::CompatibilityGate;
use crate::plugin_system::error::{PluginSystemError, PluginSystemErrorSource};
use crate::plugin_system::manifest::PluginManifest;
use crate::plugin_system::registry::{HookFn, PluginMeta, PluginRegistry};
use crate::plugin_system::traits::PluginTable;
use crate::scheduler::TaskScheduler;
use crate::storage::config::{ConfigData, PluginConfigStore};
use crate::utils::fs::{copy_dir_all, find_file, move_dir};

/// Where a plugin folder got to in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PluginState {
    Discovered,
    ManifestRead,
    GateChecked,
    /// Skipped: bad manifest, unsupported host, unknown entry or failed registration
    Rejected,
    Activating,
    Active,
    Uninstalling,
    Removed,
}

/// Last known state of one plugin folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    pub folder: PathBuf,
    pub plugin: Option<String>,
    pub state: PluginState,
    pub error: Option<String>,
}

/// Discovers plugin folders, activates them and tears them down again.
///
/// Failures while loading one plugin are logged and recorded in the load
/// report; they never abort loading of the others.
pub struct PluginLoader {
    plugin_root: PathBuf,
    table: PluginTable,
    gate: CompatibilityGate,
    bus: Arc<EventBus>,
    scheduler: Arc<dyn TaskScheduler>,
    config_store: Arc<dyn PluginConfigStore>,
    registry: Arc<RwLock<PluginRegistry>>,
    report: RwLock<BTreeMap<PathBuf, LoadOutcome>>,
    http: reqwest::Client,
}

impl PluginLoader {
    pub fn new(
        plugin_root: impl Into<PathBuf>,
        table: PluginTable,
        gate: CompatibilityGate,
        bus: Arc<EventBus>,
        scheduler: Arc<dyn TaskScheduler>,
        config_store: Arc<dyn PluginConfigStore>,
    ) -> Self {
        Self {
            plugin_root: plugin_root.into(),
            table,
            gate,
            bus,
            scheduler,
            config_store,
            registry: Arc::new(RwLock::new(PluginRegistry::new())),
            report: RwLock::new(BTreeMap::new()),
            http: reqwest::Client::new(),
        }
    }

    pub fn plugin_root(&self) -> &Path {
        &self.plugin_root
    }

    pub fn registry(&self) -> Arc<RwLock<PluginRegistry>> {
        self.registry.clone()
    }

    pub fn gate(&self) -> &CompatibilityGate {
        &self.gate
    }

    /// Outcome of every folder seen so far, ordered by path
    pub async fn report(&self) -> Vec<LoadOutcome> {
        self.report.read().await.values().cloned().collect()
    }

    pub async fn state_of(&self, folder: &Path) -> Option<PluginState> {
        self.report.read().await.get(folder).map(|o| o.state)
    }

    /// Plugin folders under the root, sorted by name
    pub async fn discover(&self) -> Result<Vec<PathBuf>, PluginSystemError> {
        let io_err = |e: std::io::Error| PluginSystemError::LoadingError {
            plugin_id: "*".to_string(),
            path: Some(self.plugin_root.clone()),
            source: Box::new(PluginSystemErrorSource::Io(e)),
        };
        let mut entries = fs::read_dir(&self.plugin_root).await.map_err(io_err)?;
        let mut folders: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            let reserved = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_none_or(|name| SKIP_FOLDERS.contains(&name) || name.starts_with(INSTALL_STAGING_PREFIX));
            if reserved {
                continue;
            }
            if fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
                folders.push(path);
            }
        }
        folders.sort();
        Ok(folders)
    }

    /// Load every discovered plugin; returns the ones that became active
    pub async fn load_all(&self) -> Result<Vec<Arc<PluginMeta>>, PluginSystemError> {
        let folders = self.discover().await?;
        log::info!("Found {} plugin folder(s) in {}", folders.len(), self.plugin_root.display());
        let mut loaded = Vec::new();
        for folder in folders {
            if let Some(meta) = self.load_one(&folder).await {
                loaded.push(meta);
            }
        }
        Ok(loaded)
    }

    /// Load one plugin folder. Any failure is logged and yields `None`.
    pub async fn load_one(&self, folder: &Path) -> Option<Arc<PluginMeta>> {
        match self.try_load(folder).await {
            Ok(meta) => Some(meta),
            Err(e @ PluginSystemError::NotSupported { .. }) => {
                log::warn!("Skipping plugin in {}: {}", folder.display(), e);
                None
            }
            Err(e) => {
                log::error!("Failed to load plugin from {}: {}", folder.display(), e);
                None
            }
        }
    }

    async fn try_load(&self, folder: &Path) -> Result<Arc<PluginMeta>, PluginSystemError> {
        self.record(folder, None, PluginState::Discovered, None).await;

        let manifest = match PluginManifest::read_from_folder(folder).await {
            Ok(manifest) => manifest,
            Err(e) => return Err(self.reject(folder, None, e).await),
        };
        let name = manifest.name.clone();
        self.record(folder, Some(&name), PluginState::ManifestRead, None).await;

        if let Err(source) = self.gate.check(&manifest.dependencies) {
            let e = PluginSystemError::NotSupported {
                plugin_id: name.clone(),
                source,
            };
            return Err(self.reject(folder, Some(&name), e).await);
        }
        self.record(folder, Some(&name), PluginState::GateChecked, None).await;

        let Some(plugin) = self.table.get(&name) else {
            let e = PluginSystemError::LoadingError {
                plugin_id: name.clone(),
                path: Some(folder.to_path_buf()),
                source: Box::new(PluginSystemErrorSource::Other(
                    "no plugin implementation registered under this name".to_string(),
                )),
            };
            return Err(self.reject(folder, Some(&name), e).await);
        };

        self.record(folder, Some(&name), PluginState::Activating, None).await;
        let mut ctx = RegistrationContext::new(PluginMeta::new(manifest, folder));
        let registered = std::panic::catch_unwind(AssertUnwindSafe(|| plugin.register(&mut ctx)));
        let message = match registered {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(panic_message(panic.as_ref())),
        };
        let meta = ctx.into_meta();
        if let Some(message) = message {
            let e = PluginSystemError::RegistrationError {
                plugin_id: name.clone(),
                message,
            };
            if self.registry.read().await.contains(&name) {
                log::warn!("Reload of plugin {} failed; the loaded instance stays active", name);
            }
            return Err(self.reject(folder, Some(&name), e).await);
        }

        // Listeners and tasks are matched by owner name, so the previous
        // instance has to go before the new one pushes anything out.
        if self.registry.read().await.contains(&name) {
            log::info!("Plugin {} is already loaded; reloading from {}", name, folder.display());
            self.unload(&name).await;
        }

        if let Err(e) = self.activate(&meta).await {
            self.detach(&name).await;
            return Err(self.reject(folder, Some(&name), e).await);
        }

        let meta = Arc::new(meta);
        if let Err(e) = self.registry.write().await.register(meta.clone()) {
            self.detach(&name).await;
            return Err(self.reject(folder, Some(&name), e).await);
        }
        self.record(folder, Some(&name), PluginState::Active, None).await;
        log::info!(
            "Plugin loaded: {} v{} ({} listener(s), {} command(s), {} task(s))",
            meta.title(),
            meta.manifest().version,
            meta.listeners().len(),
            meta.commands().len(),
            meta.tasks().len()
        );
        Ok(meta)
    }

    /// Push listeners and tasks out and run the after-setup hook
    async fn activate(&self, meta: &PluginMeta) -> Result<(), PluginSystemError> {
        for listener in meta.listeners() {
            self.bus.add_listener(listener.clone()).await;
        }
        for task in meta.tasks() {
            self.scheduler
                .add_task(task.clone())
                .await
                .map_err(|e| PluginSystemError::RegistrationError {
                    plugin_id: meta.name().to_string(),
                    message: e.to_string(),
                })?;
        }
        if let Some(hook) = &meta.after_setup {
            let config = self.config_of(meta.name());
            run_hook(meta.name(), "after_setup", hook, config).await?;
        }
        Ok(())
    }

    fn config_of(&self, plugin: &str) -> ConfigData {
        self.config_store.get(plugin).unwrap_or_else(|e| {
            log::warn!("Failed to read config of plugin '{}': {}", plugin, e);
            ConfigData::new()
        })
    }

    /// Remove everything a plugin pushed out, leaving its folder and config alone
    async fn unload(&self, name: &str) {
        self.detach(name).await;
        self.registry.write().await.unregister(name);
    }

    /// Drop a plugin's listeners and tasks from the bus and scheduler
    async fn detach(&self, name: &str) -> (usize, usize) {
        let listeners = self.bus.remove_listeners_owned_by(name).await;
        let mut tasks = 0;
        for info in self.scheduler.get_tasks().await {
            if info.owner.as_deref() == Some(name) && self.scheduler.remove_task(&info.handle).await {
                tasks += 1;
            }
        }
        (listeners, tasks)
    }

    /// Remove an installed plugin. Each step is logged and later steps still
    /// run when one fails.
    pub async fn uninstall(&self, name: &str, delete_config: bool) -> Result<(), PluginSystemError> {
        let meta = self.registry.read().await.require(name)?;
        let folder = meta.folder().to_path_buf();
        self.record(&folder, Some(name), PluginState::Uninstalling, None).await;
        log::info!("Uninstalling plugin {}", name);

        match fs::remove_dir_all(&folder).await {
            Ok(()) => log::info!("Removed plugin folder {}", folder.display()),
            Err(e) => log::error!("Failed to remove plugin folder {}: {}", folder.display(), e),
        }

        let (listeners, tasks) = self.detach(name).await;
        log::info!("Removed {} listener(s) and {} task(s) of plugin {}", listeners, tasks, name);

        if delete_config {
            let removed = self.config_store.remove(name).and_then(|_| self.config_store.persist());
            match removed {
                Ok(()) => log::info!("Removed config of plugin {}", name),
                Err(e) => log::error!("Failed to remove config of plugin {}: {}", name, e),
            }
        }

        self.registry.write().await.unregister(name);
        self.record(&folder, Some(name), PluginState::Removed, None).await;
        log::info!("Plugin {} uninstalled", name);
        Ok(())
    }

    /// Install a plugin from an http(s) URL or a local zip archive.
    ///
    /// Returns the plugin folder, which is not loaded yet.
    pub async fn install(&self, source: &str) -> Result<PathBuf, PluginSystemError> {
        fs::create_dir_all(&self.plugin_root)
            .await
            .map_err(|e| PluginSystemError::install(source, "cannot create plugin directory", e))?;

        let mut downloaded: Option<NamedTempFile> = None;
        let archive_path = if is_url(source) {
            let file = self.download(source).await?;
            let path = file.path().to_path_buf();
            downloaded = Some(file);
            path
        } else {
            let path = PathBuf::from(source);
            if !fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
                return Err(PluginSystemError::InstallError {
                    origin: source.to_string(),
                    message: "archive not found".to_string(),
                    source: None,
                });
            }
            path
        };

        let (root, origin) = (self.plugin_root.clone(), source.to_string());
        let (staging, manifest_path) = blocking(move || {
            let staging = tempfile::Builder::new()
                .prefix(INSTALL_STAGING_PREFIX)
                .tempdir_in(&root)
                .map_err(|e| PluginSystemError::install(&origin, "cannot create staging directory", e))?;
            extract_archive(&origin, &archive_path, staging.path())?;
            let manifest_path = find_file(staging.path(), MANIFEST_FILENAME)
                .map_err(|e| PluginSystemError::install(&origin, "cannot scan extracted archive", e))?
                .ok_or_else(|| PluginSystemError::InstallError {
                    origin: origin.clone(),
                    message: format!("archive contains no {}", MANIFEST_FILENAME),
                    source: None,
                })?;
            Ok((staging, manifest_path))
        })
        .await?;

        let plugin_dir = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| staging.path().to_path_buf());
        let manifest = PluginManifest::read_from_folder(&plugin_dir).await?;
        let at_root = plugin_dir == staging.path();
        let folder_name = match plugin_dir.file_name() {
            Some(name) if !at_root => name.to_os_string(),
            _ => manifest.name.clone().into(),
        };
        let target = self.plugin_root.join(folder_name);

        if fs::try_exists(&target).await.unwrap_or(false) {
            log::info!("Replacing existing plugin folder {}", target.display());
            fs::remove_dir_all(&target)
                .await
                .map_err(|e| PluginSystemError::install(source, "cannot replace existing plugin folder", e))?;
        }

        let (dest, origin) = (target.clone(), source.to_string());
        blocking(move || {
            let moved = if at_root {
                copy_dir_all(&plugin_dir, &dest)
            } else {
                move_dir(&plugin_dir, &dest)
            };
            moved.map_err(|e| PluginSystemError::install(&origin, "cannot move plugin into place", e))?;
            if let Err(e) = staging.close() {
                log::warn!("Failed to clean up staging directory: {}", e);
            }
            if let Some(file) = downloaded {
                if let Err(e) = file.close() {
                    log::warn!("Failed to remove downloaded archive: {}", e);
                }
            }
            Ok(())
        })
        .await?;

        log::info!("Plugin {} installed into {}", manifest.name, target.display());
        Ok(target)
    }

    async fn download(&self, url: &str) -> Result<NamedTempFile, PluginSystemError> {
        log::info!("Downloading plugin archive from {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PluginSystemError::install(url, "download failed", e))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PluginSystemError::install(url, "download interrupted", e))?;
        let (root, origin) = (self.plugin_root.clone(), url.to_string());
        blocking(move || {
            let mut file = tempfile::Builder::new()
                .prefix(INSTALL_STAGING_PREFIX)
                .suffix(".zip")
                .tempfile_in(&root)
                .map_err(|e| PluginSystemError::install(&origin, "cannot create download file", e))?;
            file.write_all(&bytes)
                .map_err(|e| PluginSystemError::install(&origin, "cannot write download file", e))?;
            Ok(file)
        })
        .await
    }

    async fn record(&self, folder: &Path, plugin: Option<&str>, state: PluginState, error: Option<String>) {
        self.report.write().await.insert(
            folder.to_path_buf(),
            LoadOutcome {
                folder: folder.to_path_buf(),
                plugin: plugin.map(str::to_string),
                state,
                error,
            },
        );
    }

    async fn reject(&self, folder: &Path, plugin: Option<&str>, error: PluginSystemError) -> PluginSystemError {
        self.record(folder, plugin, PluginState::Rejected, Some(error.to_string()))
            .await;
        error
    }
}

impl fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginLoader")
            .field("plugin_root", &self.plugin_root)
            .field("table", &self.table)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

/// Invoke a plugin hook, turning errors and panics into [`PluginSystemError::HookError`]
pub(crate) async fn run_hook(
    plugin: &str,
    hook_name: &'static str,
    hook: &Arc<HookFn>,
    config: ConfigData,
) -> Result<(), PluginSystemError> {
    let invocation = {
        let hook = hook.clone();
        async move { hook(config).await }
    };
    let message = match AssertUnwindSafe(invocation).catch_unwind().await {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => e.to_string(),
        Err(panic) => panic_message(panic.as_ref()),
    };
    Err(PluginSystemError::HookError {
        plugin_id: plugin.to_string(),
        hook: hook_name,
        message,
    })
}

/// Run synchronous file work off the async worker threads
async fn blocking<T, F>(job: F) -> Result<T, PluginSystemError>
where
    F: FnOnce() -> Result<T, PluginSystemError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| PluginSystemError::InternalError(format!("file operation aborted: {}", e)))?
}

fn is_url(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn extract_archive(origin: &str, archive: &Path, dest: &Path) -> Result<(), PluginSystemError> {
    let file = std::fs::File::open(archive).map_err(|e| PluginSystemError::install(origin, "cannot open archive", e))?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| PluginSystemError::install(origin, "not a zip archive", e))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| PluginSystemError::install(origin, "cannot read archive entry", e))?;
        // Entries escaping the destination are skipped.
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let out_path = dest.join(relative);
        let io_err = |e: std::io::Error| PluginSystemError::install(origin, "cannot extract archive", e);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(io_err)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut out = std::fs::File::create(&out_path).map_err(io_err)?;
        std::io::copy(&mut entry, &mut out).map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode)).map_err(io_err)?;
            }
        }
    }
    Ok(())
}
