//
// Copyright 2025 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Progress and status notification sinks.

use crate::worker::WorkerKind;

/// Receiver for worker progress and status notifications.
///
/// The coordination core is headless; anything that wants to render worker
/// activity (a terminal, a GUI, a test harness) implements this trait and
/// injects it into the [`Coordinator`](crate::Coordinator). Callbacks are
/// invoked from worker threads, so implementations must be thread-safe and
/// should return quickly.
pub trait ProgressSink: Send + Sync {
    /// A worker finished a phase; `percent` runs from just above zero up to
    /// exactly 100 on the final phase.
    fn on_progress(&self, worker: &str, percent: u32);

    /// A human-readable log line (start, admission, interruption, and
    /// completion messages).
    fn on_status(&self, line: &str);

    /// A worker reached a terminal state and its start control may be
    /// re-labelled. Purely presentational; the default does nothing.
    fn on_button_label(&self, kind: WorkerKind, key: u32, label: &str) {
        let _ = (kind, key, label);
    }
}

/// A [`ProgressSink`] that forwards everything to [`tracing`].
///
/// # Examples
///
/// ```rust
/// use worklock::{Coordinator, TracingSink, WorkerKind};
///
/// let coordinator = Coordinator::new(TracingSink);
/// let handle = coordinator.start(WorkerKind::Reader, 0).unwrap();
/// handle.wait();
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_progress(&self, worker: &str, percent: u32) {
        tracing::info!(worker, percent, "progress");
    }

    fn on_status(&self, line: &str) {
        tracing::info!("{line}");
    }

    fn on_button_label(&self, kind: WorkerKind, key: u32, label: &str) {
        tracing::debug!(%kind, key, label, "button label changed");
    }
}

/// A [`ProgressSink`] that discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _worker: &str, _percent: u32) {}

    fn on_status(&self, _line: &str) {}
}
