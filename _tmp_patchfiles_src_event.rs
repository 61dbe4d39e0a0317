/* Copyright © 2018 Gianmarco Garrisi

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>. */

//! The basic unit of the kernel: something that may happen once, carries
//! at most one resolved value, and runs a list of callbacks when it does.
//!
//! Grounded on `simgo`'s `Event` (`events.go`) and `quantverse-desim`'s
//! process values, generalized from `Rc<RefCell<..>>` to `Arc<Mutex<..>>`
//! because an `Event` yielded from a process closure crosses the real OS
//! thread boundary `ProcessBridge` (module F) runs on.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::environment::Environment;
use crate::error::SimError;
use crate::queue::Priority;
use crate::value::{EventValue, Outcome};

/// A callback invoked once, when its event is processed. Takes the
/// environment (so it can schedule further events, e.g. a process
/// resuming) and the event it was attached to (so it can read the value).
pub type Callback = Box<dyn FnOnce(&Environment, &Event) + Send>;

/// Handle returned by [`Event::add_callback`], usable with
/// [`Event::remove_callback`] for the cycle-breaking removal
/// [`Condition`](crate::condition::Condition) cleanup relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(0);

enum Callbacks {
    Pending(Vec<(CallbackId, Callback)>),
    /// The processed sentinel: the callback list has collapsed and no
    /// further `AddCallback`/`RemoveCallback` calls are legal.
    Processed,
}

pub(crate) struct EventInner {
    env: Environment,
    value: EventValue,
    callbacks: Callbacks,
}

/// A cheaply-`Clone`-able handle to a shared event. Two handles are the
/// same event iff they point at the same inner allocation (see
/// [`Event::same_event`]), matching the original's pointer-identity
/// semantics for condition-value lookups.
#[derive(Clone)]
pub struct Event {
    pub(crate) inner: Arc<Mutex<EventInner>>,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("Event")
            .field("triggered", &!inner.value.is_pending())
            .field("processed", &matches!(inner.callbacks, Callbacks::Processed))
            .finish()
    }
}

impl Event {
    pub fn new(env: &Environment) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EventInner {
                env: env.clone(),
                value: EventValue::pending(),
                callbacks: Callbacks::Pending(Vec::new()),
            })),
        }
    }

    /// Identity comparison: `true` iff both handles refer to the same
    /// underlying event, mirroring the Go original's use of pointer
    /// identity for `ConditionValue` lookups.
    pub fn same_event(&self, other: &Event) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_triggered(&self) -> bool {
        !self.inner.lock().unwrap().value.is_pending()
    }

    pub fn is_processed(&self) -> bool {
        matches!(self.inner.lock().unwrap().callbacks, Callbacks::Processed)
    }

    /// The environment this event belongs to. Used by
    /// [`Condition`](crate::condition::Condition) to reject children
    /// drawn from more than one `Environment`.
    pub(crate) fn env(&self) -> Environment {
        self.inner.lock().unwrap().env.clone()
    }

    /// Resolves the event successfully with `value` and schedules it to
    /// fire at the current simulated time.
    pub fn succeed<T: Any + Send + Sync>(&self, value: T) -> Result<(), SimError> {
        self.trigger(Outcome::success(value), 0, Priority::Normal)
    }

    /// Resolves the event as a failure and schedules it to fire at the
    /// current simulated time. Distinct from [`SimError`]: this is a
    /// *simulated* failure carried as the event's own value, not a
    /// protocol violation.
    pub fn fail<E: Error + Send + Sync + 'static>(&self, err: E) -> Result<(), SimError> {
        self.trigger(Outcome::failure(err), 0, Priority::Normal)
    }

    /// Copies `source`'s already-resolved outcome into `self` and
    /// schedules `self`. Used by [`Process`](crate::process::Process)
    /// completion and by [`Condition`](crate::condition::Condition)
    /// failure propagation — both cases where one event's result becomes
    /// another event's result verbatim.
    pub(crate) fn trigger_from(&self, source: &Event, priority: Priority) -> Result<(), SimError> {
        let outcome = {
            let src = source.inner.lock().unwrap();
            src.value
                .peek()
                .cloned()
                .expect("trigger_from requires an already-resolved source event")
        };
        self.trigger(outcome, 0, priority)
    }

    /// Like [`Event::trigger_from`] but schedules `delay` simulated time
    /// units out instead of immediately — used by
    /// [`Timeout`](crate::timeout::Timeout), whose value is fixed at
    /// construction but whose dispatch is deferred.
    pub(crate) fn trigger_after(
        &self,
        outcome: Outcome,
        delay: u64,
        priority: Priority,
    ) -> Result<(), SimError> {
        self.trigger(outcome, delay, priority)
    }

    /// Resolves the event with a raw outcome at the current time. Used by
    /// [`Process`](crate::process::Process) completion, which produces a
    /// fresh [`Outcome`] from the process function's return value rather
    /// than copying another event's.
    pub(crate) fn resolve(&self, outcome: Outcome, priority: Priority) -> Result<(), SimError> {
        self.trigger(outcome, 0, priority)
    }

    fn trigger(&self, outcome: Outcome, delay: u64, priority: Priority) -> Result<(), SimError> {
        let env = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.value.is_pending() {
                return Err(SimError::AlreadyTriggered);
            }
            inner.value.set(outcome);
            inner.env.clone()
        };
        log::trace!("event triggered, scheduling for dispatch");
        env.schedule_event(self.clone(), delay, priority);
        Ok(())
    }

    /// Registers a callback to run when this event is processed. If the
    /// event has already been processed, returns `EventProcessed`; if it
    /// has merely already triggered but not yet processed, the callback
    /// is simply queued and still runs at dispatch time.
    pub fn add_callback(&self, cb: Callback) -> Result<CallbackId, SimError> {
        let mut inner = self.inner.lock().unwrap();
        match &mut inner.callbacks {
            Callbacks::Pending(list) => {
                let id = CallbackId(NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed));
                list.push((id, cb));
                Ok(id)
            }
            Callbacks::Processed => Err(SimError::EventProcessed),
        }
    }

    /// Removes a previously-added callback by id. Used to break cycles
    /// when a `Condition` no longer needs to watch a sibling child after
    /// it has already resolved the condition.
    pub fn remove_callback(&self, id: CallbackId) -> Result<(), SimError> {
        let mut inner = self.inner.lock().unwrap();
        match &mut inner.callbacks {
            Callbacks::Pending(list) => {
                list.retain(|(cb_id, _)| *cb_id != id);
                Ok(())
            }
            Callbacks::Processed => Err(SimError::EventProcessed),
        }
    }

    /// Returns the resolved outcome, marking any failure as observed
    /// (defusing it), or `None` while the event is still pending.
    pub fn value(&self) -> Option<Outcome> {
        self.inner.lock().unwrap().value.get()
    }

    /// Drains the callback list and collapses it to the processed
    /// sentinel. Called exactly once, by [`Environment::step`], when the
    /// event is popped off the queue for dispatch.
    pub(crate) fn take_callbacks(&self) -> Vec<Callback> {
        let mut inner = self.inner.lock().unwrap();
        match std::mem::replace(&mut inner.callbacks, Callbacks::Processed) {
            Callbacks::Pending(list) => list.into_iter().map(|(_, cb)| cb).collect(),
            Callbacks::Processed => Vec::new(),
        }
    }

    /// Warns once if this event resolved to a failure nobody ever looked
    /// at. Called by `Environment::step` right after callback dispatch,
    /// by which point any callback that cared has already called
    /// [`Event::value`].
    pub(crate) fn warn_if_undefused(&self) {
        let inner = self.inner.lock().unwrap();
        if inner.value.is_undefused_failure() {
            log::warn!("event failure was never observed by a callback");
        }
    }
}
