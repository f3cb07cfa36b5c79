use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::app::{AppState, AppStateError};

#[derive(Debug, Clone)]
pub enum ReloadEvent {
    Reloaded,
    Failed(Arc<AppStateError>),
}

pub struct WatchHandle {
    pub join_handle: JoinHandle<()>,
    event_tx: broadcast::Sender<ReloadEvent>,
    _watcher: RecommendedWatcher,
}

impl WatchHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.event_tx.subscribe()
    }
}

/// Quiet period after the last file event before reloading.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Reload `state` whenever the file at `path` changes.
pub fn watch_config(path: PathBuf, state: Arc<Mutex<AppState>>) -> notify::Result<WatchHandle> {
    watch_config_with(path, state, DEFAULT_DEBOUNCE)
}

pub fn watch_config_with(
    path: PathBuf,
    state: Arc<Mutex<AppState>>,
    debounce: Duration,
) -> notify::Result<WatchHandle> {
    let (event_tx, _) = broadcast::channel(16);
    let (notify_tx, notify_rx) = mpsc::channel(16);

    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = notify_tx.blocking_send(res);
    })?;
    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    tracing::debug!(path = %path.display(), "watching configuration");

    let join_handle = tokio::spawn(debounce_reloads(
        notify_rx,
        state,
        event_tx.clone(),
        debounce,
    ));

    Ok(WatchHandle {
        join_handle,
        event_tx,
        _watcher: watcher,
    })
}

async fn debounce_reloads(
    mut notify_rx: mpsc::Receiver<notify::Result<notify::Event>>,
    state: Arc<Mutex<AppState>>,
    event_tx: broadcast::Sender<ReloadEvent>,
    debounce: Duration,
) {
    let mut deadline: Option<Instant> = None;
    loop {
        let received = match deadline {
            Some(at) => tokio::select! {
                received = notify_rx.recv() => received,
                _ = tokio::time::sleep_until(at) => {
                    deadline = None;
                    reload_state(&state, &event_tx).await;
                    continue;
                }
            },
            None => notify_rx.recv().await,
        };

        match received {
            Some(Ok(event)) if !is_relevant(&event.kind) => {}
            Some(Ok(_)) => deadline = Some(Instant::now() + debounce),
            Some(Err(err)) => {
                // Editors sometimes replace the file; try a reload anyway.
                tracing::debug!("watch error: {err}");
                deadline = Some(Instant::now() + debounce);
            }
            None => break,
        }
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_) | EventKind::Other
    )
}

async fn reload_state(state: &Arc<Mutex<AppState>>, event_tx: &broadcast::Sender<ReloadEvent>) {
    let mut guard = state.lock().await;
    let event = match guard.reload() {
        Ok(()) => ReloadEvent::Reloaded,
        Err(err) => {
            tracing::warn!(path = %guard.config_path().display(), "reload failed: {err}");
            ReloadEvent::Failed(Arc::new(err))
        }
    };
    let _ = event_tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventSink;
    use crate::midi::LoopbackDriverFactory;
    use crate::AppState;
    use std::fs;

    fn sample_config() -> String {
        r#"
version: 1
devices:
  - name: Synth
collections:
  - name: Main
    bindings:
      - name: Pads
        messages:
          - device: Pads
"#
        .trim_start()
        .to_string()
    }

    #[tokio::test]
    async fn watcher_detects_changes() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config_path = dir.path().join("config.yaml");
        fs::write(&config_path, sample_config()).expect("write config");

        let state = Arc::new(Mutex::new(
            AppState::initialize(
                config_path.clone(),
                LoopbackDriverFactory::new(),
                RecordingEventSink::new(),
            )
            .expect("init"),
        ));

        let handle = watch_config(config_path.clone(), state.clone()).expect("watch");
        let mut rx = handle.subscribe();

        // Modify config to trigger reload.
        let updated = r#"
version: 1
devices:
  - name: Synth
  - name: Pads
    active: 3
collections:
  - name: Main
    bindings:
      - name: Pads
        messages:
          - device: Pads
"#
        .trim_start();
        fs::write(&config_path, updated).expect("rewrite config");

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timeout waiting for reload")
            .expect("channel closed");
        assert!(matches!(event, ReloadEvent::Reloaded));

        let guard = state.lock().await;
        let pads = guard.registry().find("Pads").expect("pads added").id();
        let binding = guard.graph().and_then(|g| g.binding("Pads")).expect("binding");
        assert_eq!(binding.linked_device(), Some(pads));
        handle.join_handle.abort();
    }
}
