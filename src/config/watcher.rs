//! Hot reload of the stage list.
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by writing a temp file and renaming it over the original keep
//! triggering reloads. Events for other files in that directory are ignored.
//!
//! A reload is forwarded only when the file still loads and validates and
//! its stage list differs from the one last applied.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::{GatewayConfig, ServiceConfig};

/// Result of one reload attempt.
#[derive(Debug)]
pub enum Reload {
    /// A new stage list was sent; carries its length.
    Applied(usize),
    /// The file changed but the stages did not.
    Unchanged,
    /// The file no longer loads; the running pipeline is kept.
    Rejected(ConfigError),
}

/// Re-reads the config file and forwards changed stage lists.
struct Reloader {
    path: PathBuf,
    applied: Vec<ServiceConfig>,
    updates: mpsc::UnboundedSender<GatewayConfig>,
}

impl Reloader {
    fn reload(&mut self) -> Reload {
        let config = match load_config(&self.path) {
            Ok(config) => config,
            Err(e) => return Reload::Rejected(e),
        };
        if config.pipeline.services == self.applied {
            return Reload::Unchanged;
        }

        self.applied = config.pipeline.services.clone();
        let stages = self.applied.len();
        // A closed receiver means the server is shutting down.
        let _ = self.updates.send(config);
        Reload::Applied(stages)
    }
}

/// Whether `event` may have changed the file called `file_name`.
fn touches(event: &Event, file_name: &OsStr) -> bool {
    let relevant = match event.kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    };
    relevant && event.paths.iter().any(|p| p.file_name() == Some(file_name))
}

pub struct ConfigWatcher {
    reloader: Reloader,
}

impl ConfigWatcher {
    /// `current` is the configuration the server starts with; reloads that
    /// leave its stage list untouched are not forwarded.
    pub fn new(path: &Path, current: &GatewayConfig) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let reloader = Reloader {
            path: path.to_path_buf(),
            applied: current.pipeline.services.clone(),
            updates,
        };
        (Self { reloader }, rx)
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let mut reloader = self.reloader;
        let path = reloader.path.clone();
        let file_name: OsString = path.file_name().map(OsStr::to_os_string).unwrap_or_default();
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, &file_name) => match reloader.reload() {
                    Reload::Applied(stages) => {
                        tracing::info!(path = ?reloader.path, stages, "Pipeline reloaded")
                    }
                    Reload::Unchanged => {
                        tracing::debug!(path = ?reloader.path, "Config changed, stage list unchanged")
                    }
                    Reload::Rejected(e) => {
                        tracing::error!(error = %e, "Failed to reload config, keeping current pipeline")
                    }
                },
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}
