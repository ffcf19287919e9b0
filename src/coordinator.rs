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

//! The start/cancel façade over the guard and worker machinery.

use crate::cancel::CancelToken;
use crate::guard::ResourceGuard;
use crate::result::{WorklockError, WorklockResult};
use crate::sink::ProgressSink;
use crate::worker::{StateCell, Worker, WorkerConfig, WorkerHandle, WorkerId, WorkerKind, WorkerState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

/// Initial value of the shared resource.
pub const START_VALUE: &str = "Start value";

/// Creates workers, registers them, and routes start/cancel commands.
///
/// The coordinator owns the [`ResourceGuard`] and a registry mapping each
/// running worker identity to its cancellation token. Starting a worker is
/// non-blocking: the body runs on its own named OS thread, and the returned
/// [`WorkerHandle`] observes its lifecycle. One worker per identity may run
/// at a time; a duplicate start is rejected, and the identity becomes
/// startable again the moment its previous run reaches a terminal state.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use worklock::{Coordinator, NullSink, WorkerConfig, WorkerKind, WorkerState};
///
/// let config = WorkerConfig {
///     phases: 5,
///     max_phase_delay: Duration::from_millis(10),
/// };
/// let coordinator = Coordinator::with_config(NullSink, config);
///
/// let reader = coordinator.start(WorkerKind::Reader, 0).unwrap();
/// let writer = coordinator.start(WorkerKind::Writer, 0).unwrap();
/// reader.wait();
/// assert_eq!(writer.wait(), WorkerState::Completed);
/// assert_eq!(coordinator.resource(), "value by Writer0");
/// ```
pub struct Coordinator {
    guard: Arc<ResourceGuard>,
    sink: Arc<dyn ProgressSink>,
    config: WorkerConfig,
    registry: Arc<Mutex<HashMap<WorkerId, CancelToken>>>,
}

impl Coordinator {
    /// Creates a coordinator with the default [`WorkerConfig`].
    pub fn new(sink: impl ProgressSink + 'static) -> Self {
        Self::with_config(sink, WorkerConfig::default())
    }

    /// Creates a coordinator with an explicit worker configuration.
    pub fn with_config(sink: impl ProgressSink + 'static, config: WorkerConfig) -> Self {
        Self {
            guard: Arc::new(ResourceGuard::new(START_VALUE)),
            sink: Arc::new(sink),
            config,
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Starts a worker for `(kind, key)` and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`WorklockError::DuplicateWorker`] if a worker for the same
    /// identity is still registered, and [`WorklockError::Spawn`] if the OS
    /// thread could not be created (in which case the registry entry is
    /// rolled back).
    pub fn start(&self, kind: WorkerKind, key: u32) -> WorklockResult<WorkerHandle> {
        let id = WorkerId::new(kind, key);
        let token = CancelToken::new();
        {
            let mut registry = self.registry.lock();
            if registry.contains_key(&id) {
                return Err(WorklockError::DuplicateWorker(id));
            }
            registry.insert(id, token.clone());
        }

        let cell = Arc::new(StateCell::new());
        let worker = Worker::new(
            id,
            self.config,
            token,
            Arc::clone(&self.guard),
            Arc::clone(&self.sink),
        );
        let registry = Arc::clone(&self.registry);
        let thread_cell = Arc::clone(&cell);
        let spawned = thread::Builder::new().name(id.to_string()).spawn(move || {
            thread_cell.set(WorkerState::Running);
            let terminal = worker.run();
            // Free the identity before publishing the terminal state, so an
            // observer returning from `wait` can start it again at once.
            registry.lock().remove(&id);
            thread_cell.set(terminal);
        });
        if let Err(err) = spawned {
            self.registry.lock().remove(&id);
            return Err(WorklockError::Spawn(err));
        }

        tracing::debug!(worker = %id, "worker started");
        Ok(WorkerHandle::new(id, cell))
    }

    /// Requests cancellation of the worker for `(kind, key)`.
    ///
    /// A no-op when no such worker is running; never blocks. The worker
    /// observes the signal at its next phase boundary or admission wait and
    /// unwinds to a `Cancelled` terminal state, releasing any admission it
    /// holds.
    pub fn cancel(&self, kind: WorkerKind, key: u32) {
        let id = WorkerId::new(kind, key);
        let token = self.registry.lock().get(&id).cloned();
        if let Some(token) = token {
            token.cancel();
            self.guard.wake_waiters();
            tracing::debug!(worker = %id, "cancellation requested");
        } else {
            tracing::debug!(worker = %id, "cancel ignored, no such worker");
        }
    }

    /// Returns `true` while a worker for `(kind, key)` is registered.
    pub fn is_running(&self, kind: WorkerKind, key: u32) -> bool {
        self.registry.lock().contains_key(&WorkerId::new(kind, key))
    }

    /// Returns a copy of the current shared resource value.
    pub fn resource(&self) -> String {
        self.guard.snapshot()
    }

    /// The guard coordinating access to the shared resource.
    pub fn guard(&self) -> &ResourceGuard {
        &self.guard
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Coordinator {{ running: {} }}", self.registry.lock().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        progress: Mutex<Vec<(String, u32)>>,
        status: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn status_index(&self, prefix: &str) -> Option<usize> {
            self.status.lock().iter().position(|line| line.starts_with(prefix))
        }

        fn has_status(&self, prefix: &str) -> bool {
            self.status_index(prefix).is_some()
        }
    }

    impl ProgressSink for RecordingSink {
        fn on_progress(&self, worker: &str, percent: u32) {
            self.progress.lock().push((worker.to_string(), percent));
        }

        fn on_status(&self, line: &str) {
            self.status.lock().push(line.to_string());
        }
    }

    fn quick_config() -> WorkerConfig {
        WorkerConfig {
            phases: 5,
            max_phase_delay: Duration::from_millis(5),
        }
    }

    fn slow_config() -> WorkerConfig {
        WorkerConfig {
            phases: 5,
            max_phase_delay: Duration::from_millis(200),
        }
    }

    fn coordinator_with(config: WorkerConfig) -> (Coordinator, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let share = Arc::clone(&sink);
        struct Fwd(Arc<RecordingSink>);
        impl ProgressSink for Fwd {
            fn on_progress(&self, worker: &str, percent: u32) {
                self.0.on_progress(worker, percent);
            }
            fn on_status(&self, line: &str) {
                self.0.on_status(line);
            }
        }
        (Coordinator::with_config(Fwd(share), config), sink)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..2000 {
            if condition() {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("condition not reached within two seconds");
    }

    #[test]
    fn test_reader_progress_roundtrip() {
        let (coordinator, sink) = coordinator_with(quick_config());
        let handle = coordinator.start(WorkerKind::Reader, 0).unwrap();
        assert_eq!(handle.wait(), WorkerState::Completed);

        let progress = sink.progress.lock();
        let percents: Vec<u32> = progress
            .iter()
            .filter(|(name, _)| name == "Reader0")
            .map(|(_, p)| *p)
            .collect();
        assert_eq!(percents, vec![20, 40, 60, 80, 100]);
        assert!(!coordinator.guard().is_reading(0));
        assert_eq!(coordinator.resource(), START_VALUE);
    }

    #[test]
    fn test_duplicate_start_rejected() {
        let (coordinator, _sink) = coordinator_with(slow_config());
        let handle = coordinator.start(WorkerKind::Reader, 0).unwrap();
        assert!(matches!(
            coordinator.start(WorkerKind::Reader, 0),
            Err(WorklockError::DuplicateWorker(_))
        ));
        // A different key of the same kind is a distinct identity.
        let other = coordinator.start(WorkerKind::Reader, 1).unwrap();
        coordinator.cancel(WorkerKind::Reader, 0);
        coordinator.cancel(WorkerKind::Reader, 1);
        assert!(handle.wait().is_terminal());
        assert!(other.wait().is_terminal());
    }

    #[test]
    fn test_identity_restartable_after_terminal() {
        let (coordinator, _sink) = coordinator_with(quick_config());
        let first = coordinator.start(WorkerKind::Writer, 0).unwrap();
        assert_eq!(first.wait(), WorkerState::Completed);
        assert!(!coordinator.is_running(WorkerKind::Writer, 0));
        let second = coordinator.start(WorkerKind::Writer, 0).unwrap();
        assert_eq!(second.wait(), WorkerState::Completed);
    }

    #[test]
    fn test_cancel_unknown_worker_is_noop() {
        let (coordinator, sink) = coordinator_with(quick_config());
        coordinator.cancel(WorkerKind::Reader, 5);
        assert!(!coordinator.is_running(WorkerKind::Reader, 5));
        assert!(sink.status.lock().is_empty());
    }

    #[test]
    fn test_reader_blocked_behind_active_writer() {
        let (coordinator, sink) = coordinator_with(quick_config());
        let writer = coordinator.start(WorkerKind::Writer, 0).unwrap();
        wait_until(|| sink.has_status("Writer0 is beginning to write"));

        let reader = coordinator.start(WorkerKind::Reader, 0).unwrap();
        assert_eq!(writer.wait(), WorkerState::Completed);
        assert_eq!(reader.wait(), WorkerState::Completed);

        // The reader could not be admitted until the writer withdrew, so it
        // observed the mutated value, and its admission line comes after the
        // writer's.
        assert!(sink.has_status("Reader0 is beginning to read the value by Writer0"));
        let reading = sink.status_index("Reader0 is beginning to read").unwrap();
        let writing = sink.status_index("Writer0 is beginning to write").unwrap();
        assert!(reading > writing);
        assert_eq!(coordinator.resource(), "value by Writer0");
    }

    #[test]
    fn test_writer_waits_for_both_readers() {
        let (coordinator, sink) = coordinator_with(quick_config());
        let r0 = coordinator.start(WorkerKind::Reader, 0).unwrap();
        let r1 = coordinator.start(WorkerKind::Reader, 1).unwrap();
        wait_until(|| {
            sink.has_status("Reader0 is beginning to read")
                && sink.has_status("Reader1 is beginning to read")
        });

        let writer = coordinator.start(WorkerKind::Writer, 0).unwrap();
        assert_eq!(writer.wait(), WorkerState::Completed);
        r0.wait();
        r1.wait();

        // Both readers were admitted before the writer arrived, so they saw
        // the start value; the writer could not mutate until both withdrew,
        // so its admission line still reports the start value too.
        assert!(sink.has_status("Reader0 is beginning to read the Start value"));
        assert!(sink.has_status("Reader1 is beginning to read the Start value"));
        let began_write = sink
            .status_index("Writer0 is beginning to write the Start value")
            .unwrap();
        assert!(began_write > sink.status_index("Reader0 is beginning to read").unwrap());
        assert!(began_write > sink.status_index("Reader1 is beginning to read").unwrap());
        assert_eq!(coordinator.resource(), "value by Writer0");
    }

    #[test]
    fn test_cancel_writer_waiting_for_readers() {
        let (coordinator, sink) = coordinator_with(quick_config());
        let token = CancelToken::new();
        let admission = coordinator.guard().begin_read(9, &token).unwrap();

        let writer = coordinator.start(WorkerKind::Writer, 0).unwrap();
        wait_until(|| coordinator.guard().writer_active());

        coordinator.cancel(WorkerKind::Writer, 0);
        assert_eq!(writer.wait(), WorkerState::Cancelled);
        assert_eq!(coordinator.resource(), START_VALUE);
        assert!(!coordinator.guard().writer_active());
        assert!(sink.has_status("Writer0 is interrupted"));
        drop(admission);
    }

    #[test]
    fn test_cancelled_reader_leaves_clean_state() {
        let (coordinator, _sink) = coordinator_with(slow_config());
        let handle = coordinator.start(WorkerKind::Reader, 2).unwrap();
        wait_until(|| coordinator.guard().is_reading(2));

        coordinator.cancel(WorkerKind::Reader, 2);
        assert!(handle.wait().is_terminal());
        assert!(!coordinator.guard().is_reading(2));
        assert!(!coordinator.is_running(WorkerKind::Reader, 2));

        // The slot is free again immediately.
        let again = coordinator.start(WorkerKind::Reader, 2).unwrap();
        coordinator.cancel(WorkerKind::Reader, 2);
        again.wait();
    }

    #[test]
    fn test_panicking_body_fails_worker() {
        struct PanickingSink {
            labels: Arc<Mutex<Vec<String>>>,
        }
        impl ProgressSink for PanickingSink {
            fn on_progress(&self, _worker: &str, _percent: u32) {
                panic!("sink rejected progress");
            }
            fn on_status(&self, _line: &str) {}
            fn on_button_label(&self, _kind: WorkerKind, _key: u32, label: &str) {
                self.labels.lock().push(label.to_string());
            }
        }

        let labels = Arc::new(Mutex::new(Vec::new()));
        let coordinator = Coordinator::with_config(
            PanickingSink {
                labels: Arc::clone(&labels),
            },
            quick_config(),
        );

        let handle = coordinator.start(WorkerKind::Reader, 0).unwrap();
        assert_eq!(handle.wait(), WorkerState::Failed);

        // The admission released during unwind and the slot was freed.
        assert_eq!(coordinator.guard().reader_count(), 0);
        assert!(!coordinator.is_running(WorkerKind::Reader, 0));
        assert_eq!(labels.lock().as_slice(), &["Start \"Reader0\""]);

        let again = coordinator.start(WorkerKind::Reader, 0).unwrap();
        assert_eq!(again.wait(), WorkerState::Failed);
    }

    #[test]
    fn test_many_workers_drain_to_idle() {
        let (coordinator, _sink) = coordinator_with(quick_config());
        let mut handles = Vec::new();
        for key in 0..3 {
            handles.push(coordinator.start(WorkerKind::Reader, key).unwrap());
        }
        for key in 0..2 {
            handles.push(coordinator.start(WorkerKind::Writer, key).unwrap());
        }
        for handle in &handles {
            assert!(handle.wait().is_terminal());
        }
        assert_eq!(coordinator.guard().reader_count(), 0);
        assert!(!coordinator.guard().writer_active());
        assert!(coordinator.resource().starts_with("value by Writer"));
    }
}
