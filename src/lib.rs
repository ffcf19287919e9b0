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

//! # Worklock
//!
//! A Rust library coordinating concurrent access to a single shared mutable
//! resource under the classic readers-writers discipline: any number of
//! readers may hold the resource at once, a writer requires exclusive
//! access, and once a writer has committed to writing no new reader is
//! admitted until it finishes. Workers are long-running, individually
//! startable and cancellable units that simulate multi-phase work while
//! reporting progress through an injected sink.
//!
//! ## Key Features
//!
//! - **Readers-writers admission**: concurrent readers, exclusive writers,
//!   enforced by [`ResourceGuard`] with a mutex and condition variable
//! - **RAII Admissions**: [`ReadAdmission`] and [`WriteAdmission`] release
//!   membership exactly once on drop, even across panics and cancellation
//! - **Cooperative Cancellation**: [`CancelToken`] interrupts phase delays
//!   and admission waits without ever leaking guard state
//! - **Worker Lifecycle**: `Created → Running → {Completed, Cancelled,
//!   Failed}` observable through [`WorkerHandle`]
//! - **Injected Presentation**: all progress and status output flows through
//!   the [`ProgressSink`] capability; the core is rendering-agnostic
//!
//! ## Usage Examples
//!
//! ### Starting and awaiting workers
//!
//! ```rust
//! use std::time::Duration;
//! use worklock::{Coordinator, NullSink, WorkerConfig, WorkerKind, WorkerState};
//!
//! let config = WorkerConfig {
//!     phases: 5,
//!     max_phase_delay: Duration::from_millis(10),
//! };
//! let coordinator = Coordinator::with_config(NullSink, config);
//!
//! // Readers run concurrently; the writer waits for them to drain.
//! let r0 = coordinator.start(WorkerKind::Reader, 0).unwrap();
//! let r1 = coordinator.start(WorkerKind::Reader, 1).unwrap();
//! let w0 = coordinator.start(WorkerKind::Writer, 0).unwrap();
//!
//! assert_eq!(w0.wait(), WorkerState::Completed);
//! r0.wait();
//! r1.wait();
//! assert_eq!(coordinator.resource(), "value by Writer0");
//! ```
//!
//! ### Cancelling a worker
//!
//! ```rust
//! use worklock::{Coordinator, NullSink, WorkerKind};
//!
//! let coordinator = Coordinator::new(NullSink);
//! let handle = coordinator.start(WorkerKind::Reader, 0).unwrap();
//!
//! // Cancellation is cooperative and non-blocking; the worker observes it
//! // at its next phase boundary and unwinds cleanly.
//! coordinator.cancel(WorkerKind::Reader, 0);
//! assert!(handle.wait().is_terminal());
//!
//! // Cancelling an identity that is not running is a benign no-op.
//! coordinator.cancel(WorkerKind::Reader, 5);
//! ```
//!
//! ### Driving the guard directly
//!
//! ```rust
//! use worklock::{CancelToken, ResourceGuard};
//!
//! let guard = ResourceGuard::new("Start value");
//! let token = CancelToken::new();
//!
//! let reader = guard.begin_read(0, &token).unwrap();
//! assert_eq!(reader.value(), "Start value");
//! drop(reader);
//!
//! let mut writer = guard.begin_write(0, &token).unwrap();
//! writer.set("value by Writer0");
//! drop(writer);
//! assert_eq!(guard.snapshot(), "value by Writer0");
//! ```
//!
//! ## Ordering Guarantees
//!
//! Writers are serialized against each other and against reader admission:
//! a writer's mutation happens only after it has observed an empty reader
//! set, and no reader can complete admission while the writer holds the
//! exclusive section. Readers therefore never observe a partially-written
//! value. There is no FIFO fairness between waiting readers or writers;
//! wake order is whatever the condition variable provides, and a writer can
//! starve under a continuous stream of readers.
//!
//! ## Error Handling
//!
//! Operations return `WorklockResult<T>` which can contain the following
//! errors:
//!
//! - `WorklockError::DuplicateWorker`: a start was requested for an
//!   identity that is already running (the policy is reject, never
//!   cancel-and-replace)
//! - `WorklockError::Interrupted`: the calling worker was cancelled while
//!   waiting for admission; surfaces to observers as the `Cancelled`
//!   terminal state
//! - `WorklockError::Spawn`: the worker thread could not be created
//!
//! No error is fatal to the process; each worker's failure is isolated to
//! that worker.
//!
//! ## License
//!
//! Licensed under the Apache License, Version 2.0.

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(
    clippy::option_if_let_else,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

mod cancel;
mod coordinator;
mod guard;
mod result;
mod sink;
mod worker;

pub use self::cancel::CancelToken;
pub use self::coordinator::{Coordinator, START_VALUE};
pub use self::guard::{ReadAdmission, ResourceGuard, WriteAdmission};
pub use self::result::{WorklockError, WorklockResult};
pub use self::sink::{NullSink, ProgressSink, TracingSink};
pub use self::worker::{WorkerConfig, WorkerHandle, WorkerId, WorkerKind, WorkerState};
