mod cli;
mod logging;

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};
use serde_json::{Map, Value};

use cli::{CliArgs, Commands, PluginAction};
use compat_check::CompatCheckPlugin;
use download_notifier::DownloadNotifier;
use mediabot_core::plugin_system::DefaultPluginManager;
use mediabot_core::{
    Application, BoxError, CommandContext, Event, EventType, HostSettings, PluginManager, PluginTable,
};

/// Plugins compiled into this binary, with the manifest each one ships
fn bundled_plugins(settings: &HostSettings) -> (PluginTable, [(&'static str, &'static str); 2]) {
    let table = PluginTable::new()
        .with(DownloadNotifier::new())
        .with(CompatCheckPlugin::new(settings.host_capabilities()));
    let manifests = [
        (download_notifier::NAME, download_notifier::MANIFEST),
        (compat_check::NAME, compat_check::MANIFEST),
    ];
    (table, manifests)
}

/// On first run the plugin folder does not exist yet; fill it with the
/// bundled plugins. An existing folder is left alone so uninstalls stick.
fn seed_plugin_dir(dir: &Path, manifests: &[(&str, &str)]) -> Result<(), BoxError> {
    if dir.exists() {
        return Ok(());
    }
    for (name, manifest) in manifests {
        let folder = dir.join(name);
        fs::create_dir_all(&folder)?;
        fs::write(folder.join("manifest.json"), manifest)?;
        info!("Added bundled plugin {} to {}", name, dir.display());
    }
    Ok(())
}

fn parse_event_data(text: &str) -> Result<Map<String, Value>, BoxError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        other => Err(format!("event data must be a JSON object, got {}", other).into()),
    }
}

async fn print_plugins(manager: &DefaultPluginManager) {
    let summaries = manager.summaries().await;
    if summaries.is_empty() {
        println!("No plugins loaded.");
    }
    for summary in &summaries {
        println!("{} v{} ({})", summary.name, summary.version, summary.title);
        if !summary.commands.is_empty() {
            println!("  commands: {}", summary.commands.join(", "));
        }
        if !summary.tasks.is_empty() {
            println!("  tasks: {}", summary.tasks.join(", "));
        }
        println!("  listeners: {}", summary.listeners);
    }
    for outcome in manager.load_report().await {
        if let Some(reason) = outcome.error {
            println!("Rejected {}: {}", outcome.folder.display(), reason);
        }
    }
}

async fn execute(app: &Application, command: Commands) -> Result<ExitCode, BoxError> {
    let manager = app.plugin_manager();
    match command {
        Commands::Run => {
            info!("Running; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            info!("Ctrl-C received");
        }
        Commands::Plugin { action } => match action {
            PluginAction::List => print_plugins(&manager).await,
            PluginAction::Install { source } => match manager.install_plugin(&source).await? {
                Some(meta) => println!("Installed {} v{}", meta.name(), meta.manifest().version),
                None => {
                    eprintln!("Installed {} but the plugin failed to load; see `plugin list`", source);
                    return Ok(ExitCode::FAILURE);
                }
            },
            PluginAction::Uninstall { name, keep_config } => {
                manager.uninstall_plugin(&name, !keep_config).await?;
                println!("Uninstalled {}", name);
            }
        },
        Commands::Publish {
            event_type,
            data,
            background,
        } => {
            if event_type.parse::<EventType>().is_err() {
                warn!("'{}' is not a built-in event type; publishing it as a custom event", event_type);
            }
            let data = match data {
                Some(text) => parse_event_data(&text)?,
                None => Map::new(),
            };
            let bus = app.event_bus();
            let event = Event::new(event_type.as_str(), data);
            if background {
                bus.publish_in_background(event).await?;
                bus.drain().await;
            } else {
                bus.publish(event).await;
            }
            println!("Published {}", event_type);
        }
        Commands::Command {
            plugin,
            command,
            args,
            uid,
        } => {
            let raw: Map<String, Value> = args.into_iter().collect();
            let response = manager
                .run_command(&plugin, &command, CommandContext::new(uid), &raw)
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.success {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run(args: CliArgs) -> Result<ExitCode, BoxError> {
    let mut settings = match &args.config {
        Some(path) => HostSettings::load(path)?,
        None => HostSettings::default(),
    };
    if let Some(dir) = args.plugin_dir {
        settings.plugin_dir = dir;
    }

    let (table, manifests) = bundled_plugins(&settings);
    seed_plugin_dir(&settings.plugin_dir, &manifests)?;

    let mut app = Application::new(settings, table)?;
    app.run().await?;

    let outcome = execute(&app, args.command.unwrap_or(Commands::Run)).await;
    let shutdown = app.shutdown().await;
    let code = outcome?;
    shutdown?;
    Ok(code)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    if args.ping {
        println!("pong");
        return ExitCode::SUCCESS;
    }

    if let Err(e) = logging::init(args.log_json) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
