use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

/// mediabot: media automation host with a plugin runtime
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Respond with "pong" and exit
    #[arg(long)]
    pub ping: bool,

    /// Host settings file (.json, .yaml or .toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Plugin folder, overriding the settings file
    #[arg(long, value_name = "DIR")]
    pub plugin_dir: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load plugins, start scheduled tasks and run until Ctrl-C (default)
    Run,
    /// Manage plugins
    Plugin {
        #[command(subcommand)]
        action: PluginAction,
    },
    /// Publish an event to every listener bound to it
    Publish {
        /// Event type, e.g. DownloadCompleted
        event_type: String,
        /// Event payload as a JSON object
        #[arg(long, value_name = "JSON")]
        data: Option<String>,
        /// Dispatch through the background worker pool
        #[arg(long)]
        background: bool,
    },
    /// Invoke a command exposed by a plugin
    Command {
        plugin: String,
        command: String,
        /// Command argument, repeatable
        #[arg(long = "arg", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        args: Vec<(String, Value)>,
        /// Id of the invoking user
        #[arg(long, default_value_t = 0)]
        uid: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum PluginAction {
    /// List loaded plugins and folders that failed to load
    List,
    /// Install a plugin from a zip archive path or URL
    Install { source: String },
    /// Remove a plugin's folder, listeners and tasks
    Uninstall {
        name: String,
        /// Keep the plugin's saved config
        #[arg(long)]
        keep_config: bool,
    },
}

/// Parse `key=value`. The value is read as JSON when it parses, else kept as text.
pub fn parse_key_value(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", s));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(parse_key_value("limit=5").unwrap(), ("limit".to_string(), json!(5)));
        assert_eq!(parse_key_value("who=Ann").unwrap(), ("who".to_string(), json!("Ann")));
        assert_eq!(parse_key_value("q=a=b").unwrap(), ("q".to_string(), json!("a=b")));
        assert_eq!(parse_key_value("empty=").unwrap(), ("empty".to_string(), json!("")));
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=5").is_err());
    }

    #[test]
    fn test_command_args_collect_in_order() {
        let args = CliArgs::try_parse_from([
            "mediabot", "command", "download_notifier", "history", "--arg", "limit=3", "--arg", "kind=completed",
        ])
        .unwrap();
        match args.command {
            Some(Commands::Command { plugin, command, args, uid }) => {
                assert_eq!(plugin, "download_notifier");
                assert_eq!(command, "history");
                assert_eq!(uid, 0);
                assert_eq!(args[0], ("limit".to_string(), json!(3)));
                assert_eq!(args[1], ("kind".to_string(), json!("completed")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
