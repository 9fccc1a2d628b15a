// Progress events and where they go
//
// Publishing never blocks the engine. The bounded channel drops the oldest
// intermediate tick when full; boundary events (pass start/end, state
// changes) are only evicted when the queue holds nothing else.

use crate::engine::JobState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub operation_id: String,
    pub state: JobState,
    pub pass_number: u32,
    pub total_passes: u32,
    pub percent: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Pass start/end or state change; never dropped in favour of a tick
    #[serde(default)]
    pub boundary: bool,
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn emit(&self, _event: &ProgressEvent) {}
}

struct ChannelState {
    events: VecDeque<ProgressEvent>,
    closed: bool,
    dropped: u64,
}

struct Shared {
    state: Mutex<ChannelState>,
    ready: Condvar,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, ChannelState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Create a bounded progress channel
pub fn progress_channel(capacity: usize) -> (ProgressPublisher, ProgressReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(ChannelState {
            events: VecDeque::with_capacity(capacity.max(1)),
            closed: false,
            dropped: 0,
        }),
        ready: Condvar::new(),
        capacity: capacity.max(1),
    });
    (
        ProgressPublisher {
            shared: Arc::clone(&shared),
        },
        ProgressReceiver { shared },
    )
}

/// Producer half; closes the channel when dropped
pub struct ProgressPublisher {
    shared: Arc<Shared>,
}

impl ProgressSink for ProgressPublisher {
    fn emit(&self, event: &ProgressEvent) {
        let mut state = self.shared.lock();
        if state.events.len() >= self.shared.capacity {
            let victim = state
                .events
                .iter()
                .position(|e| !e.boundary)
                .unwrap_or(0);
            state.events.remove(victim);
            state.dropped += 1;
        }
        state.events.push_back(event.clone());
        drop(state);
        self.shared.ready.notify_one();
    }
}

impl Drop for ProgressPublisher {
    fn drop(&mut self) {
        self.shared.lock().closed = true;
        self.shared.ready.notify_all();
    }
}

pub struct ProgressReceiver {
    shared: Arc<Shared>,
}

impl ProgressReceiver {
    /// Block until an event arrives; `None` once the publisher is gone and
    /// the queue is drained
    pub fn recv(&self) -> Option<ProgressEvent> {
        let mut state = self.shared.lock();
        loop {
            if let Some(event) = state.events.pop_front() {
                return Some(event);
            }
            if state.closed {
                return None;
            }
            state = self
                .shared
                .ready
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<ProgressEvent> {
        let state = self.shared.lock();
        let (mut state, _) = self
            .shared
            .ready
            .wait_timeout_while(state, timeout, |s| s.events.is_empty() && !s.closed)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.events.pop_front()
    }

    pub fn try_recv(&self) -> Option<ProgressEvent> {
        self.shared.lock().events.pop_front()
    }

    /// Events evicted because the consumer fell behind
    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

/// Persists the latest event to a well-known file for UI polling.
/// Each write goes to a sibling temp file that is renamed over the target.
#[derive(Debug, Clone)]
pub struct ProgressFile {
    path: PathBuf,
}

impl ProgressFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, event: &ProgressEvent) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(event).map_err(std::io::Error::other)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)
    }
}

impl ProgressSink for ProgressFile {
    fn emit(&self, event: &ProgressEvent) {
        if let Err(e) = self.write(event) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to persist progress");
        }
    }
}

/// Forwards each event to every inner sink in order
#[derive(Default, Clone)]
pub struct Fanout {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ProgressSink for Fanout {
    fn emit(&self, event: &ProgressEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
