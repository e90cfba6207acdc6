//! Example plugin: answers "would a plugin with these dependencies load here?"
//! and keeps count of site errors reported by the host.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mediabot_core::plugin_system::dependency::{APP_VERSION_KEY, MEDIA_SERVER_KEY};
use mediabot_core::plugin_system::{CompatibilityGate, HostCapabilities};
use mediabot_core::{CommandResponse, EventType, HandlerResult, ParamDecl, Plugin, RegistrationContext};
use serde_json::Value;

pub const NAME: &str = "compat_check";

/// The manifest shipped in the plugin folder
pub const MANIFEST: &str = include_str!("../manifest.json");

#[derive(Debug, Clone)]
pub struct CompatCheckPlugin {
    gate: CompatibilityGate,
    site_errors: Arc<AtomicUsize>,
}

impl CompatCheckPlugin {
    /// Check against the capabilities of the running host
    pub fn new(host: HostCapabilities) -> Self {
        Self {
            gate: CompatibilityGate::new(host),
            site_errors: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn site_errors(&self) -> usize {
        self.site_errors.load(Ordering::SeqCst)
    }
}

fn dependencies_from(args: &serde_json::Map<String, Value>) -> BTreeMap<String, Value> {
    [("app_version", APP_VERSION_KEY), ("media_server", MEDIA_SERVER_KEY)]
        .into_iter()
        .filter_map(|(arg, key)| {
            args.get(arg)
                .filter(|value| !value.is_null())
                .map(|value| (key.to_string(), value.clone()))
        })
        .collect()
}

impl Plugin for CompatCheckPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn register(&self, ctx: &mut RegistrationContext) -> HandlerResult {
        let gate = self.gate.clone();
        ctx.command(
            "check",
            "Check dependencies",
            &[
                ParamDecl::typed::<String>("app_version").with_default(Value::Null),
                ParamDecl::typed::<String>("media_server").with_default(Value::Null),
            ],
            move |_, args| {
                let gate = gate.clone();
                async move {
                    let dependencies = dependencies_from(&args);
                    Ok(match gate.check(&dependencies) {
                        Ok(()) => CommandResponse::ok(format!(
                            "Compatible with version {}",
                            gate.host().app_version
                        )),
                        Err(e) => CommandResponse::failed(e.to_string()),
                    })
                }
            },
        )
        .description("Evaluates appVersion and mediaServer expressions the way the plugin loader does");

        let site_errors = self.site_errors.clone();
        ctx.on_event([EventType::SiteError.key()], 200, move |_, event| {
            let site_errors = site_errors.clone();
            async move {
                let site = event.get("site").and_then(Value::as_str).unwrap_or("unknown site");
                let total = site_errors.fetch_add(1, Ordering::SeqCst) + 1;
                log::warn!("{} needs attention ({} site errors so far)", site, total);
                Ok(())
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests;
