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

//! Implementation of the shared-resource readers-writers guard.

use crate::cancel::CancelToken;
use crate::result::{WorklockError, WorklockResult};
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::Arc;

/// A readers-writers guard around a single shared value.
///
/// `ResourceGuard` admits any number of concurrent readers but at most one
/// writer, and the writer is exclusive against readers as well. Admission
/// follows the admit-under-lock, run-unlocked, withdraw-under-lock pattern:
/// readers hold the internal lock only long enough to join or leave the
/// reader set, while a writer claims an exclusive section for its whole
/// operation — from the moment it starts waiting for readers to drain until
/// its admission is dropped. While that section is held, no new reader can
/// complete [`ResourceGuard::begin_read`] and no other writer can enter, but
/// readers admitted beforehand finish undisturbed.
///
/// Admissions are RAII guards: dropping a [`ReadAdmission`] or
/// [`WriteAdmission`] performs the matching exit exactly once, including
/// when the owning thread unwinds.
///
/// # Fairness
///
/// Wake order among blocked readers and writers is whatever the underlying
/// condition variable provides; there is no FIFO guarantee. Under a
/// continuous stream of readers a writer can wait indefinitely, because a
/// writer only drains readers that were admitted before it claimed the
/// exclusive section, and nothing throttles fresh writers from slipping in
/// between. This is a known liveness caveat, not a correctness bug.
///
/// # Examples
///
/// ```rust
/// use worklock::{CancelToken, ResourceGuard};
///
/// let guard = ResourceGuard::new("Start value");
/// let token = CancelToken::new();
///
/// // Any number of readers may be admitted at once.
/// let r0 = guard.begin_read(0, &token).unwrap();
/// let r1 = guard.begin_read(1, &token).unwrap();
/// assert_eq!(guard.reader_count(), 2);
/// drop((r0, r1));
///
/// // A writer is exclusive, and its admission is the only mutation path.
/// let mut w = guard.begin_write(0, &token).unwrap();
/// w.set("value by Writer0");
/// drop(w);
/// assert_eq!(guard.snapshot(), "value by Writer0");
/// ```
pub struct ResourceGuard {
    inner: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
}

struct State {
    /// The shared value. Mutated only through a held [`WriteAdmission`].
    resource: String,
    /// Identities of currently-admitted readers.
    readers: HashSet<u32>,
    /// Set while a writer holds the exclusive section, waiting included.
    writer_active: bool,
}

impl ResourceGuard {
    /// Creates a guard around the given initial value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use worklock::ResourceGuard;
    ///
    /// let guard = ResourceGuard::new("Start value");
    /// assert_eq!(guard.snapshot(), "Start value");
    /// ```
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Shared {
                state: Mutex::new(State {
                    resource: initial.into(),
                    readers: HashSet::new(),
                    writer_active: false,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Admits a reader, blocking while a writer holds the exclusive section.
    ///
    /// On success `reader_id` is recorded in the reader set and the returned
    /// admission keeps it there until dropped. Multiple readers may be
    /// admitted concurrently; the only thing that blocks admission is an
    /// active writer.
    ///
    /// # Errors
    ///
    /// Returns [`WorklockError::Interrupted`] if `token` is cancelled before
    /// the reader is registered; in that case the reader set is untouched.
    pub fn begin_read(&self, reader_id: u32, token: &CancelToken) -> WorklockResult<ReadAdmission> {
        let mut state = self.inner.state.lock();
        loop {
            if token.is_cancelled() {
                return Err(WorklockError::Interrupted);
            }
            if !state.writer_active {
                break;
            }
            self.inner.cond.wait(&mut state);
        }
        state.readers.insert(reader_id);
        tracing::trace!(reader = reader_id, readers = state.readers.len(), "reader admitted");
        Ok(ReadAdmission {
            inner: Arc::clone(&self.inner),
            reader_id,
        })
    }

    /// Admits a writer, blocking until it holds exclusive access.
    ///
    /// Admission happens in two steps. The writer first waits for any other
    /// writer to leave, then claims the exclusive section; from that moment
    /// no new reader or writer can be admitted. It then waits for the
    /// readers admitted before it to drain. Once the reader set is empty the
    /// admission is returned, and [`WriteAdmission::set`] may mutate the
    /// shared value.
    ///
    /// # Errors
    ///
    /// Returns [`WorklockError::Interrupted`] if `token` is cancelled during
    /// either wait. A writer cancelled while draining readers releases the
    /// exclusive section, wakes all waiters, and leaves the shared value
    /// untouched.
    pub fn begin_write(&self, writer_id: u32, token: &CancelToken) -> WorklockResult<WriteAdmission> {
        let mut state = self.inner.state.lock();
        // Outer exclusion against other writers.
        loop {
            if token.is_cancelled() {
                return Err(WorklockError::Interrupted);
            }
            if !state.writer_active {
                break;
            }
            self.inner.cond.wait(&mut state);
        }
        state.writer_active = true;
        tracing::trace!(writer = writer_id, "writer holds exclusive section");
        // Drain readers admitted before this writer arrived.
        while !state.readers.is_empty() {
            if token.is_cancelled() {
                state.writer_active = false;
                self.inner.cond.notify_all();
                tracing::trace!(writer = writer_id, "writer cancelled while draining readers");
                return Err(WorklockError::Interrupted);
            }
            self.inner.cond.wait(&mut state);
        }
        tracing::trace!(writer = writer_id, "writer admitted");
        Ok(WriteAdmission {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Returns a copy of the current shared value.
    pub fn snapshot(&self) -> String {
        self.inner.state.lock().resource.clone()
    }

    /// Returns the number of currently-admitted readers.
    pub fn reader_count(&self) -> usize {
        self.inner.state.lock().readers.len()
    }

    /// Returns `true` while `reader_id` is in the reader set.
    pub fn is_reading(&self, reader_id: u32) -> bool {
        self.inner.state.lock().readers.contains(&reader_id)
    }

    /// Returns `true` while a writer holds the exclusive section.
    ///
    /// This includes the time the writer spends waiting for readers to
    /// drain, not just the time it spends past admission.
    pub fn writer_active(&self) -> bool {
        self.inner.state.lock().writer_active
    }

    /// Wakes every thread blocked inside an admission wait.
    ///
    /// Cancelling a token does not by itself wake a worker parked on this
    /// guard's condition variable; callers that cancel a token for a worker
    /// that may be blocked in [`ResourceGuard::begin_read`] or
    /// [`ResourceGuard::begin_write`] should follow up with this so the
    /// worker re-checks its token promptly.
    pub fn wake_waiters(&self) {
        // Taking the state lock orders this notify against a waiter's
        // check-then-park: a worker that checked its token before this call
        // is guaranteed to be parked (and woken), and one that checks after
        // sees the cancelled flag.
        let _state = self.inner.state.lock();
        self.inner.cond.notify_all();
    }
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResourceGuard {{ .. }}")
    }
}

/// A RAII admission granting shared read access.
///
/// Created by [`ResourceGuard::begin_read`]. While any `ReadAdmission` is
/// live, no writer can pass its drain wait. Dropping the admission removes
/// the reader from the reader set and, when the set becomes empty, wakes a
/// writer blocked waiting for readers to drain.
pub struct ReadAdmission {
    inner: Arc<Shared>,
    reader_id: u32,
}

impl ReadAdmission {
    /// Returns the identity this admission was granted to.
    pub fn reader_id(&self) -> u32 {
        self.reader_id
    }

    /// Returns a copy of the shared value as of this call.
    pub fn value(&self) -> String {
        self.inner.state.lock().resource.clone()
    }
}

impl std::fmt::Debug for ReadAdmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReadAdmission {{ reader_id: {} }}", self.reader_id)
    }
}

impl Drop for ReadAdmission {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.readers.remove(&self.reader_id);
        tracing::trace!(reader = self.reader_id, readers = state.readers.len(), "reader withdrew");
        if state.readers.is_empty() {
            self.inner.cond.notify_all();
        }
    }
}

/// A RAII admission granting exclusive write access.
///
/// Created by [`ResourceGuard::begin_write`] once the reader set has
/// drained. Holding this admission is the only way to mutate the shared
/// value, so a value mutation is never interleaved with readers or with
/// another writer. Dropping the admission releases the exclusive section
/// and wakes all blocked readers and writers.
pub struct WriteAdmission {
    inner: Arc<Shared>,
}

impl WriteAdmission {
    /// Returns a copy of the shared value as of this call.
    pub fn value(&self) -> String {
        self.inner.state.lock().resource.clone()
    }

    /// Replaces the shared value.
    pub fn set(&mut self, value: impl Into<String>) {
        let mut state = self.inner.state.lock();
        state.resource = value.into();
        tracing::debug!(resource = %state.resource, "resource written");
    }
}

impl std::fmt::Debug for WriteAdmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WriteAdmission {{ .. }}")
    }
}

impl Drop for WriteAdmission {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.writer_active = false;
        tracing::trace!("writer withdrew");
        self.inner.cond.notify_all();
    }
}
