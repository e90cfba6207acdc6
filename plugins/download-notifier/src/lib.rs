//! # Download notifier
//!
//! Bundled plugin that keeps a short history of download notices and logs
//! a daily digest of finished downloads.
//!
//! The plugin's config decides what is recorded:
//! - `enabled`: turn notices off without uninstalling
//! - `level`: `all` or `completed`
//! - `history_size`: number of notices kept
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mediabot_core::plugin_system::{ArgEnum, EnumChoice};
use mediabot_core::{
    CommandContext, CommandResponse, ConfigData, Event, EventType, HandlerResult, ParamDecl, Plugin,
    RegistrationContext, Schedule,
};
use serde_json::Value;

/// Plugin name, matching the bundled manifest
pub const NAME: &str = "download_notifier";

/// The manifest shipped in the plugin folder
pub const MANIFEST: &str = include_str!("../manifest.json");

const DEFAULT_HISTORY_SIZE: usize = 50;
const LEVEL_COMPLETED: &str = "completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Started,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NoticeKind::Started => write!(f, "Started: {}", self.title),
            NoticeKind::Completed => write!(f, "Completed: {}", self.title),
        }
    }
}

/// Filter accepted by the `history` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryFilter {
    All,
    Started,
    Completed,
}

impl HistoryFilter {
    const VARIANTS: [HistoryFilter; 3] = [HistoryFilter::All, HistoryFilter::Started, HistoryFilter::Completed];

    /// Accepts a choice's value or its name
    fn from_arg(arg: &str) -> Option<Self> {
        Self::choices()
            .into_iter()
            .zip(Self::VARIANTS)
            .find(|(choice, _)| choice.value == arg || choice.name == arg)
            .map(|(_, filter)| filter)
    }

    fn matches(&self, kind: NoticeKind) -> bool {
        match self {
            HistoryFilter::All => true,
            HistoryFilter::Started => kind == NoticeKind::Started,
            HistoryFilter::Completed => kind == NoticeKind::Completed,
        }
    }
}

impl ArgEnum for HistoryFilter {
    fn choices() -> Vec<EnumChoice> {
        vec![
            EnumChoice::new("All", "all"),
            EnumChoice::new("Started", "started"),
            EnumChoice::new("Completed", "completed"),
        ]
    }

    fn name(&self) -> &'static str {
        match self {
            HistoryFilter::All => "All",
            HistoryFilter::Started => "Started",
            HistoryFilter::Completed => "Completed",
        }
    }
}

/// Notices recorded by the plugin, shared between its listeners, commands and task
#[derive(Debug)]
pub struct NotifierState {
    capacity: AtomicUsize,
    history: Mutex<VecDeque<Notice>>,
    completed_since_digest: AtomicUsize,
}

impl Default for NotifierState {
    fn default() -> Self {
        Self {
            capacity: AtomicUsize::new(DEFAULT_HISTORY_SIZE),
            history: Mutex::new(VecDeque::new()),
            completed_since_digest: AtomicUsize::new(0),
        }
    }
}

impl NotifierState {
    /// Oldest first
    pub fn history(&self) -> Vec<Notice> {
        self.lock().iter().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }

    pub fn completed_since_digest(&self) -> usize {
        self.completed_since_digest.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Notice>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, config: &ConfigData) {
        let capacity = config.get_or("history_size", DEFAULT_HISTORY_SIZE).max(1);
        self.capacity.store(capacity, Ordering::SeqCst);
        let mut history = self.lock();
        while history.len() > capacity {
            history.pop_front();
        }
    }

    /// Record a notice unless the config filters it out
    fn record(&self, kind: NoticeKind, title: String, config: &ConfigData) -> bool {
        if !config.get_or("enabled", true) {
            log::debug!("Notices are disabled; ignoring '{}'", title);
            return false;
        }
        if kind == NoticeKind::Started && config.get::<String>("level").as_deref() == Some(LEVEL_COMPLETED) {
            return false;
        }
        let notice = Notice { kind, title };
        log::info!("{}", notice);
        let capacity = self.capacity();
        let mut history = self.lock();
        history.push_back(notice);
        while history.len() > capacity {
            history.pop_front();
        }
        if kind == NoticeKind::Completed {
            self.completed_since_digest.fetch_add(1, Ordering::SeqCst);
        }
        true
    }

    fn clear(&self) -> usize {
        let mut history = self.lock();
        let cleared = history.len();
        history.clear();
        cleared
    }

    fn take_digest(&self) -> usize {
        self.completed_since_digest.swap(0, Ordering::SeqCst)
    }
}

/// Title of the download an event refers to
fn download_title(event: &Event) -> String {
    event
        .get("title")
        .or_else(|| event.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("unknown download")
        .to_string()
}

#[derive(Debug, Clone, Default)]
pub struct DownloadNotifier {
    state: Arc<NotifierState>,
}

impl DownloadNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Arc<NotifierState> {
        self.state.clone()
    }
}

impl Plugin for DownloadNotifier {
    fn name(&self) -> &'static str {
        NAME
    }

    fn register(&self, ctx: &mut RegistrationContext) -> HandlerResult {
        for (event_type, kind, order) in [
            (EventType::DownloadStart, NoticeKind::Started, 100),
            (EventType::DownloadCompleted, NoticeKind::Completed, 50),
        ] {
            let state = self.state.clone();
            ctx.on_event([event_type.key()], order, move |listener, event| {
                let state = state.clone();
                async move {
                    state.record(kind, download_title(&event), &listener.config);
                    Ok(())
                }
            });
        }

        let state = self.state.clone();
        ctx.command(
            "history",
            "Recent downloads",
            &[
                ParamDecl::context("ctx"),
                ParamDecl::enumeration::<HistoryFilter>("kind").with_enum_default(HistoryFilter::All),
                ParamDecl::typed::<i64>("limit").with_default(10),
            ],
            move |ctx: CommandContext, args| {
                let state = state.clone();
                async move {
                    let filter = args
                        .get("kind")
                        .and_then(Value::as_str)
                        .and_then(HistoryFilter::from_arg)
                        .unwrap_or(HistoryFilter::All);
                    let limit = args.get("limit").and_then(Value::as_i64).unwrap_or(10);
                    if limit < 1 {
                        return Ok(CommandResponse::failed("limit must be at least 1"));
                    }
                    log::debug!("User {} asked for download history", ctx.uid);
                    let lines: Vec<String> = state
                        .history()
                        .iter()
                        .rev()
                        .filter(|notice| filter.matches(notice.kind))
                        .take(limit as usize)
                        .map(Notice::to_string)
                        .collect();
                    if lines.is_empty() {
                        return Ok(CommandResponse::ok("No downloads yet"));
                    }
                    Ok(CommandResponse::ok(lines.join("\n")))
                }
            },
        )
        .description("Newest first");

        ctx.command(
            "test",
            "Send a test notice",
            &[ParamDecl::typed::<String>("message").with_default("Test")],
            |_, args| async move {
                let message = args.get("message").and_then(Value::as_str).unwrap_or_default().to_string();
                log::info!("Test notice: {}", message);
                Ok(CommandResponse::ok(format!("Sent: {}", message)))
            },
        );

        let state = self.state.clone();
        ctx.command("clear", "Clear history", &[], move |_, _| {
            let state = state.clone();
            async move { Ok(CommandResponse::ok(format!("Cleared {} notices", state.clear()))) }
        })
        .run_in_background(true);

        let state = self.state.clone();
        ctx.task("digest", "Daily download digest", Schedule::cron("0 9 * * *"), move || {
            let state = state.clone();
            async move {
                match state.take_digest() {
                    0 => log::debug!("No downloads finished since the last digest"),
                    count => log::info!("{} downloads finished since the last digest", count),
                }
                Ok(())
            }
        });

        let state = self.state.clone();
        ctx.after_setup(move |config| {
            let state = state.clone();
            async move {
                state.apply(&config);
                Ok(())
            }
        });
        let state = self.state.clone();
        ctx.on_config_changed(move |config| {
            let state = state.clone();
            async move {
                state.apply(&config);
                log::info!("Download notifier keeps {} notices", state.capacity());
                Ok(())
            }
        });
        Ok(())
    }
}
