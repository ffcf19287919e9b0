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

//! Error types and results for the Worklock library.

use crate::worker::WorkerId;

/// A specialized Result type for Worklock operations.
pub type WorklockResult<T> = Result<T, WorklockError>;

/// Errors that can occur during Worklock operations.
#[derive(Debug, thiserror::Error)]
pub enum WorklockError {
    /// A start was requested for an identity that is already running.
    ///
    /// The duplicate-start policy is reject: the running worker keeps its
    /// slot, and the caller must cancel it (or wait for it to finish)
    /// before starting a replacement.
    #[error("worker {0} is already running")]
    DuplicateWorker(WorkerId),
    /// The calling worker was cancelled while waiting for admission.
    ///
    /// This never escapes the coordinator; a worker that hits it records a
    /// `Cancelled` terminal state.
    #[error("cancelled while waiting for admission")]
    Interrupted,
    /// The OS refused to spawn the worker thread.
    #[error("failed to spawn worker thread")]
    Spawn(#[from] std::io::Error),
}
