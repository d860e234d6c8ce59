use notify::{RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("failed to create file watcher: {0}")]
    Create(#[source] notify::Error),
    #[error("failed to watch path '{path}': {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

// ---------------------------------------------------------------------------
// Watch targets
// ---------------------------------------------------------------------------

/// A watched file or directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTarget {
    /// Watched through its parent directory, so replacing the file (as many
    /// editors do) is noticed as well.
    File(PathBuf),
    Dir(PathBuf),
}

impl WatchTarget {
    pub fn new(path: &Path) -> Self {
        let path = normalize(path);
        if path.is_dir() {
            WatchTarget::Dir(path)
        } else {
            WatchTarget::File(path)
        }
    }

    fn watch_path(&self) -> (&Path, RecursiveMode) {
        match self {
            WatchTarget::Dir(dir) => (dir, RecursiveMode::Recursive),
            WatchTarget::File(file) => (
                file.parent().unwrap_or(Path::new("/")),
                RecursiveMode::NonRecursive,
            ),
        }
    }

    fn matches(&self, path: &Path) -> bool {
        match self {
            WatchTarget::File(file) => path == file,
            WatchTarget::Dir(dir) => path.starts_with(dir),
        }
    }
}

/// Absolute path with symlinks resolved as far as the path exists, to match
/// what the OS reports in events.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(path) = std::fs::canonicalize(path) {
        return path;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => match std::fs::canonicalize(parent) {
            Ok(parent) => parent.join(name),
            Err(_) => absolute,
        },
        _ => absolute,
    }
}

fn is_relevant(path: &Path, targets: &[WatchTarget], ignored: &[PathBuf]) -> bool {
    !ignored.iter().any(|p| p == path) && targets.iter().any(|t| t.matches(path))
}

// ---------------------------------------------------------------------------
// Watcher task
// ---------------------------------------------------------------------------

/// Watches `paths` and sends on `changes` once no further relevant event
/// arrived for `delay`. Events for `ignored` files (e.g. the rendered config
/// written next to the source) are dropped.
pub fn spawn_watcher(
    paths: &[PathBuf],
    ignored: &[PathBuf],
    delay: Duration,
    changes: mpsc::Sender<()>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<JoinHandle<()>, WatchError> {
    let targets: Vec<WatchTarget> = paths.iter().map(|p| WatchTarget::new(p)).collect();
    let ignored: Vec<PathBuf> = ignored.iter().map(|p| normalize(p)).collect();

    let (tx, mut rx) = mpsc::channel(256);
    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
        if let Ok(event) = res {
            let _ = tx.blocking_send(event);
        }
    })
    .map_err(WatchError::Create)?;

    for target in &targets {
        let (path, mode) = target.watch_path();
        watcher
            .watch(path, mode)
            .map_err(|source| WatchError::Watch {
                path: path.to_path_buf(),
                source,
            })?;
    }

    Ok(tokio::spawn(async move {
        // Keep the watcher alive as long as the task runs.
        let _watcher = watcher;

        loop {
            let event = tokio::select! {
                event = rx.recv() => match event {
                    Some(e) => e,
                    None => return,
                },
                _ = shutdown_rx.changed() => return,
            };
            if !event.paths.iter().any(|p| is_relevant(p, &targets, &ignored)) {
                continue;
            }

            // Debounce: restart the delay on every further event.
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => break,
                    event = rx.recv() => if event.is_none() { return },
                    _ = shutdown_rx.changed() => return,
                }
            }

            if *shutdown_rx.borrow() || changes.send(()).await.is_err() {
                return;
            }
        }
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_target_kind() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("nginx.conf");
        std::fs::write(&file, "").unwrap();

        assert!(matches!(WatchTarget::new(dir.path()), WatchTarget::Dir(_)));
        assert!(matches!(WatchTarget::new(&file), WatchTarget::File(_)));
        // Paths that don't exist yet are treated as files.
        assert!(matches!(
            WatchTarget::new(&dir.path().join("later.conf")),
            WatchTarget::File(_)
        ));
    }

    #[test]
    fn test_file_target_watches_parent() {
        let target = WatchTarget::File(PathBuf::from("/etc/nginx/nginx.conf"));
        let (path, mode) = target.watch_path();
        assert_eq!(path, Path::new("/etc/nginx"));
        assert_eq!(mode, RecursiveMode::NonRecursive);
    }

    #[test]
    fn test_is_relevant() {
        let targets = vec![
            WatchTarget::File(PathBuf::from("/etc/nginx/nginx.conf")),
            WatchTarget::Dir(PathBuf::from("/srv/html")),
        ];
        let ignored = vec![PathBuf::from("/etc/nginx/.nginx.conf~")];

        assert!(is_relevant(Path::new("/etc/nginx/nginx.conf"), &targets, &ignored));
        assert!(is_relevant(Path::new("/srv/html/a/index.html"), &targets, &ignored));
        assert!(!is_relevant(Path::new("/etc/nginx/.nginx.conf~"), &targets, &ignored));
        assert!(!is_relevant(Path::new("/etc/nginx/mime.types"), &targets, &ignored));
        assert!(!is_relevant(Path::new("/srv/other"), &targets, &ignored));
    }

    #[test]
    fn test_is_relevant_ignored_inside_dir() {
        let targets = vec![WatchTarget::Dir(PathBuf::from("/etc/nginx"))];
        let ignored = vec![PathBuf::from("/etc/nginx/.nginx.conf~")];
        assert!(!is_relevant(Path::new("/etc/nginx/.nginx.conf~"), &targets, &ignored));
        assert!(is_relevant(Path::new("/etc/nginx/nginx.conf"), &targets, &ignored));
    }

    #[tokio::test]
    async fn test_watch_missing_directory_errors() {
        let (tx, _rx) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let err = spawn_watcher(
            &[PathBuf::from("/does/not/exist/nginx.conf")],
            &[],
            Duration::from_millis(50),
            tx,
            shutdown_rx,
        )
        .unwrap_err();
        assert!(matches!(err, WatchError::Watch { .. }));
    }

    #[tokio::test]
    async fn test_reports_debounced_change() {
        let dir = tempdir().unwrap();
        let conf = dir.path().join("nginx.conf");
        let rendered = dir.path().join(".nginx.conf~");
        std::fs::write(&conf, "events {}\n").unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = spawn_watcher(
            std::slice::from_ref(&conf),
            std::slice::from_ref(&rendered),
            Duration::from_millis(100),
            tx,
            shutdown_rx,
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Writing the ignored file alone triggers nothing.
        std::fs::write(&rendered, "x").unwrap();
        let quiet = tokio::time::timeout(Duration::from_millis(400), rx.recv()).await;
        assert!(quiet.is_err());

        for i in 0..3 {
            std::fs::write(&conf, format!("events {{}}\n# {i}\n")).unwrap();
        }
        let got = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert_eq!(got.unwrap(), Some(()));

        // The burst was coalesced into one notification.
        let more = tokio::time::timeout(Duration::from_millis(400), rx.recv()).await;
        assert!(more.is_err());

        shutdown_tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
    }
}
