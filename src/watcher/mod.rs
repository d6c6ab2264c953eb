//! Host file-system watcher.
//!
//! Watches a directory tree with [`notify`] and submits changed files to the
//! [`Scanner`] under the configured policy. The notify callback runs on the
//! watcher's own thread and only forwards raw events over an unbounded
//! channel; a single async consumer ([`FileWatcher::run`]) classifies and
//! scans them one at a time.
//!
//! Results arrive later through the host webhook
//! ([`crate::handlers::Pipeline::handle_host_callback`]).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use regex::{Regex, RegexBuilder};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{DlpGateError, Result};
use crate::scan::{FileScan, Scanner};

/// How long a lone rename half waits for its partner before it is resolved.
const RENAME_SETTLE: Duration = Duration::from_millis(200);

/// A file-system change the watcher cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsAction {
    Created(PathBuf),
    Modified(PathBuf),
    Moved { from: Option<PathBuf>, to: PathBuf },
    Removed(PathBuf),
}

impl FsAction {
    /// Every path the action touches.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            FsAction::Created(p) | FsAction::Modified(p) | FsAction::Removed(p) => vec![p],
            FsAction::Moved { from, to } => from.iter().map(PathBuf::as_path).chain([to.as_path()]).collect(),
        }
    }
}

/// Translate a single raw notify event into watcher actions.
///
/// Access and metadata-only events produce nothing. Rename halves are
/// mapped on their own; [`EventClassifier`] pairs them across events.
pub fn classify(event: &Event) -> Vec<FsAction> {
    match &event.kind {
        EventKind::Create(_) => event.paths.iter().cloned().map(FsAction::Created).collect(),
        EventKind::Remove(_) => event.paths.iter().cloned().map(FsAction::Removed).collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match (mode, event.paths.as_slice()) {
            (RenameMode::Both, [from, to]) => vec![FsAction::Moved {
                from: Some(from.clone()),
                to: to.clone(),
            }],
            (RenameMode::To, [to]) => vec![FsAction::Moved {
                from: None,
                to: to.clone(),
            }],
            (RenameMode::From, [from]) => vec![FsAction::Removed(from.clone())],
            _ => Vec::new(),
        },
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => event.paths.iter().cloned().map(FsAction::Modified).collect(),
        _ => Vec::new(),
    }
}

/// One half (or both halves) of a rename still waiting for its partner.
#[derive(Debug)]
enum PendingRename {
    From {
        tracker: Option<usize>,
        from: PathBuf,
    },
    Paired {
        tracker: Option<usize>,
        from: PathBuf,
        to: PathBuf,
    },
}

/// Stateful event classifier that folds the separate rename events some
/// backends emit into a single move.
///
/// inotify reports one rename as `Name(From)`, `Name(To)` and `Name(Both)`
/// sharing a tracker. The halves are held back until the matching event
/// arrives; a source path whose partner never shows up (moved out of the
/// watched tree) is reported as removed on the next unrelated event or
/// [`flush`](Self::flush).
#[derive(Debug, Default)]
pub struct EventClassifier {
    pending: Option<PendingRename>,
}

impl EventClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a rename half is waiting for its partner.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed one raw event, returning the actions it completes.
    pub fn push(&mut self, event: &Event) -> Vec<FsAction> {
        let EventKind::Modify(ModifyKind::Name(mode)) = &event.kind else {
            let mut actions = self.flush();
            actions.extend(classify(event));
            return actions;
        };
        let tracker = event.tracker();
        match (mode, event.paths.as_slice()) {
            (RenameMode::From, [from]) => {
                let actions = self.flush();
                self.pending = Some(PendingRename::From {
                    tracker,
                    from: from.clone(),
                });
                actions
            }
            (RenameMode::To, [to]) => match self.pending.take() {
                Some(PendingRename::From { tracker: t, from }) if t == tracker => {
                    self.pending = Some(PendingRename::Paired {
                        tracker,
                        from,
                        to: to.clone(),
                    });
                    Vec::new()
                }
                other => {
                    self.pending = other;
                    let mut actions = self.flush();
                    actions.extend(classify(event));
                    actions
                }
            },
            (RenameMode::Both, [_, _]) => {
                let matched = matches!(
                    &self.pending,
                    Some(PendingRename::From { tracker: t, .. } | PendingRename::Paired { tracker: t, .. })
                        if *t == tracker
                );
                let mut actions = if matched {
                    self.pending = None;
                    Vec::new()
                } else {
                    self.flush()
                };
                actions.extend(classify(event));
                actions
            }
            _ => {
                let mut actions = self.flush();
                actions.extend(classify(event));
                actions
            }
        }
    }

    /// Resolve any held rename half on its own.
    pub fn flush(&mut self) -> Vec<FsAction> {
        match self.pending.take() {
            None => Vec::new(),
            Some(PendingRename::From { from, .. }) => vec![FsAction::Removed(from)],
            Some(PendingRename::Paired { from, to, .. }) => vec![FsAction::Moved {
                from: Some(from),
                to,
            }],
        }
    }
}

/// Case-insensitive path patterns, anchored at the start of the path.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    patterns: Vec<Regex>,
}

impl IgnoreSet {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(&format!("^(?:{})", p))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| DlpGateError::Config(format!("invalid ignore pattern '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        self.patterns.iter().any(|re| re.is_match(&text))
    }
}

/// Consumes file-system events and scans the affected files.
pub struct FileWatcher {
    scanner: Arc<dyn Scanner>,
    policy_uuid: String,
    ignore: IgnoreSet,
    min_file_size: u64,
}

impl FileWatcher {
    pub fn new(
        scanner: Arc<dyn Scanner>,
        policy_uuid: impl Into<String>,
        ignore: IgnoreSet,
        min_file_size: u64,
    ) -> Self {
        Self {
            scanner,
            policy_uuid: policy_uuid.into(),
            ignore,
            min_file_size,
        }
    }

    pub fn from_config(config: &AppConfig, scanner: Arc<dyn Scanner>) -> Result<Self> {
        let policy_uuid = config
            .nightfall
            .policy_uuid
            .clone()
            .ok_or_else(|| DlpGateError::Config("nightfall.policy_uuid is not set".to_string()))?;
        Ok(Self::new(
            scanner,
            policy_uuid,
            IgnoreSet::new(&config.watcher.ignore)?,
            config.watcher.min_file_size,
        ))
    }

    /// Act on one change. Returns the scan submitted for it, if any.
    pub async fn process(&self, action: &FsAction) -> Result<Option<FileScan>> {
        if action.paths().iter().any(|p| self.ignore.is_ignored(p)) {
            debug!("Ignoring {:?}", action);
            return Ok(None);
        }
        match action {
            FsAction::Removed(path) => {
                info!(file = %path.display(), "File {} deleted", path.display());
                Ok(None)
            }
            FsAction::Created(path) => {
                let meta = tokio::fs::metadata(path).await?;
                if meta.is_dir() || meta.len() <= self.min_file_size {
                    return Ok(None);
                }
                info!(file = %path.display(), "File {} created", path.display());
                self.scan_path(path).await.map(Some)
            }
            FsAction::Modified(path) => {
                if tokio::fs::metadata(path).await?.is_dir() {
                    return Ok(None);
                }
                info!(file = %path.display(), "File {} modified", path.display());
                self.scan_path(path).await.map(Some)
            }
            FsAction::Moved { from, to } => {
                if tokio::fs::metadata(to).await?.is_dir() {
                    return Ok(None);
                }
                match from {
                    Some(from) => info!(
                        file = %to.display(),
                        "File moved from {} to {}",
                        from.display(),
                        to.display()
                    ),
                    None => info!(file = %to.display(), "File moved to {}", to.display()),
                }
                self.scan_path(to).await.map(Some)
            }
        }
    }

    async fn scan_path(&self, path: &Path) -> Result<FileScan> {
        let data = tokio::fs::read(path).await?;
        let scan = self.scanner.scan_file(&data, &self.policy_uuid).await?;
        info!(
            event = "file_upload",
            file = %path.display(),
            id = %scan.id,
            "File {} queued for scanning with id {}",
            path.display(),
            scan.id
        );
        Ok(scan)
    }

    /// Watch `root` recursively until the event channel closes.
    ///
    /// Individual failures are logged and never stop the loop.
    pub async fn run(self, root: &Path) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = start_watcher(root, tx)?;
        let mut classifier = EventClassifier::new();

        loop {
            let next = if classifier.has_pending() {
                match tokio::time::timeout(RENAME_SETTLE, rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        self.process_all(classifier.flush()).await;
                        continue;
                    }
                }
            } else {
                rx.recv().await
            };
            let Some(res) = next else { break };
            match res {
                Ok(event) => self.process_all(classifier.push(&event)).await,
                Err(e) => warn!("File watcher error: {}", e),
            }
        }
        self.process_all(classifier.flush()).await;
        Ok(())
    }

    async fn process_all(&self, actions: Vec<FsAction>) {
        for action in actions {
            if let Err(e) = self.process(&action).await {
                warn!("Failed to handle {:?}: {}", action, e);
            }
        }
    }
}

/// Start a recursive notify watcher forwarding raw events to `tx`.
///
/// Dropping the returned handle stops the watch.
pub fn start_watcher(
    root: &Path,
    tx: mpsc::UnboundedSender<notify::Result<Event>>,
) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        // Receiver gone means the consumer is shutting down.
        let _ = tx.send(res);
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    info!("Watching {} for changes", root.display());
    Ok(watcher)
}
