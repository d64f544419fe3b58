//! Server-Sent Events stream and file watcher.
//!
//! The watcher polls `.tracker/` and turns document changes into
//! [`ChangeEvent`]s. Changes made by other processes (for example the CLI)
//! reach clients the same way as changes made through the API.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::path::Path;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use notify::{Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::state::{AppState, ChangeEvent};

#[derive(Serialize)]
struct SsePayload<'a> {
    #[serde(rename = "type")]
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    test_id: Option<&'a str>,
}

impl<'a> From<&'a ChangeEvent> for SsePayload<'a> {
    fn from(event: &'a ChangeEvent) -> Self {
        match event {
            ChangeEvent::TestChanged { test_id } => SsePayload {
                event_type: "test_changed",
                test_id: Some(test_id),
            },
            ChangeEvent::TestRemoved { test_id } => SsePayload {
                event_type: "test_removed",
                test_id: Some(test_id),
            },
            ChangeEvent::ConfigChanged => SsePayload {
                event_type: "config_changed",
                test_id: None,
            },
        }
    }
}

/// GET /events
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));

        loop {
            match rx.recv().await {
                Ok(change_event) => {
                    let payload = SsePayload::from(&change_event);
                    if let Ok(json) = serde_json::to_string(&payload) {
                        yield Ok(Event::default().event("change").data(json));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// Start the file watcher in a background task.
pub fn start_file_watcher(state: AppState) {
    tokio::spawn(async move {
        if let Err(e) = run_file_watcher(state).await {
            warn!(error = %e, "file watcher failed");
        }
    });
}

async fn run_file_watcher(state: AppState) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel::<NotifyEvent>(100);

    let mut watcher = PollWatcher::new(
        move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.try_send(event);
            }
        },
        notify::Config::default().with_poll_interval(Duration::from_millis(250)),
    )?;

    let tracker_dir = &state.paths.tracker_dir;
    watcher.watch(tracker_dir, RecursiveMode::Recursive)?;
    info!(path = %tracker_dir.display(), "watching tracker directory");

    let mut pending_events: Vec<NotifyEvent> = Vec::new();
    let mut flush_tick = tokio::time::interval(Duration::from_millis(250));
    flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                pending_events.push(event);
            }
            _ = flush_tick.tick() => {
                if pending_events.is_empty() {
                    continue;
                }
                process_events(&state, &pending_events);
                pending_events.clear();
            }
        }
    }
}

/// Broadcast one event per affected test (and config) for a batch.
fn process_events(state: &AppState, events: &[NotifyEvent]) {
    let mut changed: BTreeSet<String> = BTreeSet::new();
    let mut removed: BTreeSet<String> = BTreeSet::new();
    let mut config_changed = false;

    let tests_dir = &state.paths.tests_dir;
    let config_path = &state.paths.config_path;

    for event in events {
        let is_remove = match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => false,
            EventKind::Remove(_) => true,
            _ => continue,
        };

        for path in &event.paths {
            if path == config_path {
                config_changed |= !is_remove;
                continue;
            }
            let Some(test_id) = test_id_for_path(tests_dir, path) else {
                continue;
            };
            if is_remove {
                changed.remove(&test_id);
                removed.insert(test_id);
            } else {
                removed.remove(&test_id);
                changed.insert(test_id);
            }
        }
    }

    if config_changed {
        debug!("broadcasting config change");
        let _ = state.event_tx.send(ChangeEvent::ConfigChanged);
    }
    for test_id in changed {
        debug!(test_id = %test_id, "broadcasting test change");
        let _ = state.event_tx.send(ChangeEvent::TestChanged { test_id });
    }
    for test_id in removed {
        debug!(test_id = %test_id, "broadcasting test removal");
        let _ = state.event_tx.send(ChangeEvent::TestRemoved { test_id });
    }
}

/// `<tests_dir>/<id>.json` → `<id>`. Temp files and other paths are ignored.
fn test_id_for_path(tests_dir: &Path, path: &Path) -> Option<String> {
    if path.parent()? != tests_dir {
        return None;
    }
    if path.extension()?.to_str()? != "json" {
        return None;
    }
    Some(path.file_stem()?.to_str()?.to_string())
}
