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

//! The clock and the queue that drives it.
//!
//! Grounded on `simgo`'s `Environment` (`core.go`: `now`, `eid`, `queue`,
//! `Step`, `Schedule`) and `quantverse-desim`'s `Context<T>`/`Simulation<T>`
//! split. Generalized to `Arc<Mutex<..>>` for the same reason as
//! [`Event`](crate::event::Event): scheduling can be invoked from a
//! process's worker thread, not only from the thread driving `step`/`run`.

use std::sync::{Arc, Mutex};

use crate::error::SimError;
use crate::event::Event;
use crate::queue::{EventQueue, Priority};
use crate::value::Outcome;

struct EnvironmentInner {
    now: u64,
    next_eid: u64,
    queue: EventQueue,
    active_process: Option<Event>,
}

/// How long [`Environment::run`] should keep stepping, the way
/// `quantverse-desim`'s `EndCondition` (`Time`/`NoEvents`/`NSteps`)
/// enumerates its own run-until knobs.
pub enum Until {
    /// Run until the queue is empty.
    NoMoreEvents,
    /// Run until simulated time would advance past `time`, inclusive of
    /// events scheduled exactly at `time`.
    Time(u64),
    /// Run for exactly `steps` dispatched events, or until the queue
    /// empties first.
    Steps(u64),
    /// Run until `event` has been processed, or the queue empties first.
    /// If `event` is already processed when `run` is called, it returns
    /// immediately with that event's value.
    Event(Event),
}

/// A cheaply-cloned handle to the shared clock and event queue. All
/// clones observe the same simulated time and the same queue.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<Mutex<EnvironmentInner>>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(EnvironmentInner {
                now: 0,
                next_eid: 0,
                queue: EventQueue::new(),
                active_process: None,
            })),
        }
    }

    pub fn now(&self) -> u64 {
        self.inner.lock().unwrap().now
    }

    /// The event of the [`Process`](crate::process::Process) currently
    /// being resumed, if any. Set for exactly the duration of one
    /// `ProcessBridge::resume` round trip — never observable as `Some`
    /// from outside a process resumption callback.
    pub fn active_process(&self) -> Option<Event> {
        self.inner.lock().unwrap().active_process.clone()
    }

    pub(crate) fn set_active_process(&self, event: Option<Event>) {
        self.inner.lock().unwrap().active_process = event;
    }

    /// Identity comparison used by [`Condition`](crate::condition::Condition)
    /// to reject children drawn from different environments.
    pub(crate) fn same_env(&self, other: &Environment) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Schedules an already-valued event `delay` simulated time units
    /// from now. Called by [`Event::trigger`](crate::event::Event) and
    /// friends, never directly by users (who go through
    /// `Event::succeed`/`fail`/the `Timeout`/`Condition`/`Process`
    /// constructors).
    pub(crate) fn schedule_event(&self, event: Event, delay: u64, priority: Priority) {
        let mut inner = self.inner.lock().unwrap();
        let eid = inner.next_eid;
        inner.next_eid += 1;
        let time = inner.now + delay;
        log::trace!("scheduling event {eid} for time {time} at priority {priority:?}");
        inner.queue.push(event, time, priority, eid);
    }

    /// Pops and dispatches the single next-due event: advances `now` to
    /// its time, drains its callbacks, runs each with `(self, event)`,
    /// then checks for an undefused failure. Returns `Ok(false)` if the
    /// queue was already empty.
    pub fn step(&self) -> Result<bool, SimError> {
        let entry = {
            let mut inner = self.inner.lock().unwrap();
            let Some(entry) = inner.queue.pop() else {
                return Ok(false);
            };
            inner.now = entry.time;
            entry
        };
        log::trace!("dispatching event {} at time {}", entry.eid, entry.time);
        let callbacks = entry.event.take_callbacks();
        for cb in callbacks {
            cb(self, &entry.event);
        }
        entry.event.warn_if_undefused();
        Ok(true)
    }

    /// Steps repeatedly per `until`. Returns `InvalidUntil` if `until` is
    /// `Time(t)` with `t <= now()` at the time of the call. Returns the
    /// `until` event's value when `until` is `Event(..)` and it fired (or
    /// had already fired); `None` for every other variant.
    pub fn run(&self, until: Until) -> Result<Option<Outcome>, SimError> {
        match until {
            Until::NoMoreEvents => {
                while self.step()? {}
                Ok(None)
            }
            Until::Steps(n) => {
                for _ in 0..n {
                    if !self.step()? {
                        break;
                    }
                }
                Ok(None)
            }
            Until::Time(limit) => {
                if limit <= self.now() {
                    return Err(SimError::InvalidUntil);
                }
                // Mirrors the base spec's "creates a synthetic event,
                // schedules it at t-Now with PriorityUrgent, and stops when
                // it fires": a real queue entry rather than a polled
                // timestamp, so its `(time, priority, eid)` key interleaves
                // correctly with whatever else is already due at `limit` —
                // any `Normal`-priority event also due exactly at `limit`
                // sorts after this `Urgent` one and is left unprocessed for
                // a later `run` call, matching "no further Step is executed
                // by Run" once the stop condition fires.
                let delay = limit - self.now();
                let stop_event = Event::new(self);
                let stopped = Arc::new(Mutex::new(false));
                let flag = stopped.clone();
                stop_event
                    .add_callback(Box::new(move |_env, _ev| {
                        *flag.lock().unwrap() = true;
                    }))
                    .expect("freshly constructed event cannot already be processed");
                self.schedule_event(stop_event, delay, Priority::Urgent);
                while self.step()? {
                    if *stopped.lock().unwrap() {
                        break;
                    }
                }
                Ok(None)
            }
            Until::Event(event) => {
                if !event.is_processed() {
                    while self.step()? {
                        if event.is_processed() {
                            break;
                        }
                    }
                }
                Ok(event.value())
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
