//! Directory watching and serialized regeneration.
//!
//! [`Regenerator`] guards the output file with a single lock so only one pass
//! runs at a time. [`DirectoryWatcher`] subscribes to the input directory with
//! the `notify` crate and triggers one pass per relevant event.

use std::{path::PathBuf, sync::Arc};
use log::{debug, error, info};
use notify::{
    event::ModifyKind, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use tokio::{
    sync::{mpsc, Mutex},
    task,
};

use crate::config::GeneratorConfig;
use crate::errors::GeneratorError;
use crate::pipeline::{regenerate, PassSummary};

/// Runs regeneration passes one at a time.
#[derive(Debug)]
pub struct Regenerator {
    config: Arc<GeneratorConfig>,
    write_lock: Mutex<()>,
}

impl Regenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config: Arc::new(config),
            write_lock: Mutex::new(()),
        }
    }

    /// Run one pass, waiting for any pass already in progress.
    ///
    /// Errors are logged here and returned for callers that care; the lock is
    /// released on every exit path.
    pub async fn run_pass(&self, trigger: &str) -> Result<PassSummary, GeneratorError> {
        let _guard = self.write_lock.lock().await;
        debug!("Starting regeneration pass ({})", trigger);

        let config = Arc::clone(&self.config);
        let result = task::spawn_blocking(move || regenerate(&config))
            .await
            .map_err(|e| GeneratorError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
            .and_then(|res| res);

        match &result {
            Ok(summary) => info!(
                "Wrote {} server block(s) from {} fragment(s) ({} bytes) to {}",
                summary.blocks,
                summary.fragments,
                summary.bytes,
                summary.output_path.display()
            ),
            Err(e) => error!("Error writing new config: {}", e),
        }
        result
    }
}

/// Whether an event of `kind` should trigger a regeneration pass.
///
/// Creation, removal, renames and content writes count; metadata and access
/// events do not.
pub fn triggers_regeneration(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Any
    )
}

/// Watches the input directory for fragment changes.
pub struct DirectoryWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<Event>,
}

impl DirectoryWatcher {
    /// Subscribe to change events of `path` (non-recursive).
    ///
    /// Events are buffered from this point on, even before [`DirectoryWatcher::run`].
    pub fn new(path: PathBuf) -> Result<Self, GeneratorError> {
        let (tx, events) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => error!("error: {}", e),
            },
            notify::Config::default(),
        )
        .map_err(|e| GeneratorError::Watch(format!("failed to create watcher: {e}")))?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| GeneratorError::Watch(format!("failed to watch {}: {e}", path.display())))?;

        info!("Watch directory {}", path.display());
        Ok(Self {
            path,
            _watcher: watcher,
            events,
        })
    }

    /// Receive the next relevant event, or `None` once the watcher is gone.
    pub async fn next_change(&mut self) -> Option<Event> {
        while let Some(event) = self.events.recv().await {
            debug!("event: {:?}", event);
            if triggers_regeneration(&event.kind) {
                return Some(event);
            }
        }
        None
    }

    /// Run one pass per relevant event until the event stream ends.
    pub async fn run(mut self, regenerator: Arc<Regenerator>) -> Result<(), GeneratorError> {
        while self.next_change().await.is_some() {
            // Errors are already logged, the next event is the retry
            let _ = regenerator.run_pass("file system event").await;
        }
        info!("Stopped watching {}", self.path.display());
        Ok(())
    }
}
