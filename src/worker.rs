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

//! Worker identity, lifecycle state, and the simulated multi-phase body.

use crate::cancel::CancelToken;
use crate::guard::ResourceGuard;
use crate::result::{WorklockError, WorklockResult};
use crate::sink::ProgressSink;
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// The two kinds of workers competing for the shared resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    /// Requires shared, non-exclusive access; any number may run at once.
    Reader,
    /// Requires exclusive access against readers and other writers.
    Writer,
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerKind::Reader => write!(f, "Reader"),
            WorkerKind::Writer => write!(f, "Writer"),
        }
    }
}

/// A worker identity: kind plus a small integer key.
///
/// Displays as the worker's name, e.g. `Reader0` or `Writer1`. At most one
/// worker per identity may be running at any time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkerId {
    /// Whether this identity reads or writes.
    pub kind: WorkerKind,
    /// Key distinguishing identities of the same kind.
    pub key: u32,
}

impl WorkerId {
    /// Creates an identity from a kind and key.
    pub fn new(kind: WorkerKind, key: u32) -> Self {
        Self { kind, key }
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind, self.key)
    }
}

/// Lifecycle state of a worker instance.
///
/// Workers move `Created → Running → {Completed, Cancelled, Failed}`; the
/// last three are terminal and a worker instance is single-use. Restarting
/// an identity means a new worker and a new registry entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Registered but the worker thread has not begun the body yet.
    Created,
    /// The body is executing (this includes admission waits).
    Running,
    /// All phases finished and the admission was released.
    Completed,
    /// The cancellation signal was observed; any held admission was released.
    Cancelled,
    /// The body panicked; any held admission was released during unwind.
    Failed,
}

impl WorkerState {
    /// Returns `true` for `Completed`, `Cancelled`, and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkerState::Completed | WorkerState::Cancelled | WorkerState::Failed
        )
    }
}

/// Tuning for the simulated worker body.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use worklock::WorkerConfig;
///
/// let config = WorkerConfig::default();
/// assert_eq!(config.phases, 5);
/// assert_eq!(config.max_phase_delay, Duration::from_millis(1000));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct WorkerConfig {
    /// Number of work phases per run; each phase reports one progress step.
    pub phases: u32,
    /// Upper bound for the randomized per-phase delay.
    pub max_phase_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            phases: 5,
            max_phase_delay: Duration::from_millis(1000),
        }
    }
}

pub(crate) struct StateCell {
    state: Mutex<WorkerState>,
    cond: Condvar,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(WorkerState::Created),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn set(&self, next: WorkerState) {
        *self.state.lock() = next;
        self.cond.notify_all();
    }

    pub(crate) fn get(&self) -> WorkerState {
        *self.state.lock()
    }

    pub(crate) fn wait_terminal(&self) -> WorkerState {
        let mut state = self.state.lock();
        while !state.is_terminal() {
            self.cond.wait(&mut state);
        }
        *state
    }
}

/// Observer handle for a started worker.
///
/// Returned by [`Coordinator::start`](crate::Coordinator::start). Dropping
/// the handle does not affect the worker; use
/// [`Coordinator::cancel`](crate::Coordinator::cancel) for that.
#[derive(Clone)]
pub struct WorkerHandle {
    id: WorkerId,
    cell: Arc<StateCell>,
}

impl WorkerHandle {
    pub(crate) fn new(id: WorkerId, cell: Arc<StateCell>) -> Self {
        Self { id, cell }
    }

    /// The identity this handle observes.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// The worker's current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.cell.get()
    }

    /// Blocks until the worker reaches a terminal state and returns it.
    pub fn wait(&self) -> WorkerState {
        self.cell.wait_terminal()
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WorkerHandle {{ id: {}, state: {:?} }}", self.id, self.state())
    }
}

/// One runnable reader or writer instance.
pub(crate) struct Worker {
    id: WorkerId,
    config: WorkerConfig,
    token: CancelToken,
    guard: Arc<ResourceGuard>,
    sink: Arc<dyn ProgressSink>,
}

impl Worker {
    pub(crate) fn new(
        id: WorkerId,
        config: WorkerConfig,
        token: CancelToken,
        guard: Arc<ResourceGuard>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            id,
            config,
            token,
            guard,
            sink,
        }
    }

    /// Executes the body to a terminal state. Panics in the body are caught
    /// and reported as [`WorkerState::Failed`]; admissions held at the time
    /// of the panic release during unwind.
    pub(crate) fn run(&self) -> WorkerState {
        self.sink.on_status(&format!("{} attempts to start...", self.id));
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.body()));
        let terminal = match outcome {
            Ok(Ok(())) => WorkerState::Completed,
            Ok(Err(WorklockError::Interrupted)) => WorkerState::Cancelled,
            Ok(Err(_)) | Err(_) => WorkerState::Failed,
        };
        self.sink
            .on_button_label(self.id.kind, self.id.key, &format!("Start \"{}\"", self.id));
        tracing::debug!(worker = %self.id, state = ?terminal, "worker finished");
        terminal
    }

    fn body(&self) -> WorklockResult<()> {
        match self.id.kind {
            WorkerKind::Reader => self.read_body(),
            WorkerKind::Writer => self.write_body(),
        }
    }

    fn read_body(&self) -> WorklockResult<()> {
        let admission = match self.guard.begin_read(self.id.key, &self.token) {
            Ok(admission) => admission,
            Err(err) => {
                self.sink.on_status(&format!("{} is interrupted", self.id));
                self.sink.on_status(&format!(
                    "{} was ended to read the {} and unloaded",
                    self.id,
                    self.guard.snapshot()
                ));
                return Err(err);
            }
        };
        self.sink.on_status(&format!(
            "{} is beginning to read the {}",
            self.id,
            admission.value()
        ));
        let outcome = self.run_phases();
        if outcome.is_err() {
            self.sink.on_status(&format!("{} is interrupted", self.id));
        }
        let value = admission.value();
        drop(admission);
        self.sink.on_status(&format!(
            "{} was ended to read the {} and unloaded",
            self.id, value
        ));
        outcome
    }

    fn write_body(&self) -> WorklockResult<()> {
        let mut admission = match self.guard.begin_write(self.id.key, &self.token) {
            Ok(admission) => admission,
            Err(err) => {
                self.sink.on_status(&format!("{} is interrupted", self.id));
                self.sink.on_status(&format!(
                    "{} was ended to write the {} and unloaded",
                    self.id,
                    self.guard.snapshot()
                ));
                return Err(err);
            }
        };
        self.sink.on_status(&format!(
            "{} is beginning to write the {}",
            self.id,
            admission.value()
        ));
        admission.set(format!("value by {}", self.id));
        let outcome = self.run_phases();
        if outcome.is_err() {
            self.sink.on_status(&format!("{} is interrupted", self.id));
        }
        let value = admission.value();
        drop(admission);
        self.sink.on_status(&format!(
            "{} was ended to write the {} and unloaded",
            self.id, value
        ));
        outcome
    }

    fn run_phases(&self) -> WorklockResult<()> {
        let phases = self.config.phases.max(1);
        let step = 100 / phases;
        let name = self.id.to_string();
        for phase in 1..=phases {
            if self.token.sleep(self.random_delay()) {
                return Err(WorklockError::Interrupted);
            }
            self.sink.on_progress(&name, phase * step);
        }
        Ok(())
    }

    fn random_delay(&self) -> Duration {
        let cap = u64::try_from(self.config.max_phase_delay.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=cap))
    }
}
