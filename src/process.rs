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

//! A process: a coroutine-like unit of simulated activity, itself an
//! [`Event`] that fires when its function returns.
//!
//! Grounded on `simgo`'s `Process`/`ProcWrapper` (its own example
//! programs show the shape: a function of `(*Environment, *ProcComm)
//! interface{}` adapted into something `NewProcess` can drive) and
//! `quantverse-desim`'s generator-resumption loop in `Simulation::step`,
//! generalized here to drive a [`ProcessBridge`] instead of a
//! `Generator`.

use std::sync::{Arc, Mutex};

use crate::bridge::{ProcessBridge, ResumeOutcome, YieldHandle};
use crate::environment::Environment;
use crate::event::Event;
use crate::queue::Priority;
use crate::value::Outcome;

/// The function a process runs. Receives the environment (to create
/// further events/timeouts/conditions/sub-processes) and a
/// [`YieldHandle`] (to suspend itself on an event), and returns the
/// outcome the process's own event resolves to.
pub type ProcessFn = dyn FnOnce(Environment, YieldHandle) -> Outcome + Send;

struct Shared {
    bridge: ProcessBridge,
}

/// A running (or finished) process. `Process::event()` returns the event
/// that fires once the process function returns — yield on it from
/// another process, or fold it into an `AnyOf`/`AllOf`, the same as any
/// other event.
#[derive(Clone)]
pub struct Process {
    event: Event,
}

impl Process {
    /// Spawns `body` on a worker thread and arranges for it to be driven
    /// to its first yield (or to completion, if it never yields) the
    /// moment the environment takes its next `step`. An auxiliary init
    /// event is scheduled at `PriorityUrgent` with delay 0 and `drive`
    /// wired as its callback, so process kickoff is ordered by the same
    /// `(time, priority, eid)` queue as every other event rather than
    /// running eagerly at construction time — urgent-priority kickoffs
    /// for processes constructed before a `step` all fire ahead of any
    /// normal-priority event due at the same instant, regardless of
    /// construction order relative to those other schedulings.
    pub fn new<F>(env: &Environment, body: F) -> Self
    where
        F: FnOnce(Environment, YieldHandle) -> Outcome + Send + 'static,
    {
        let process_event = Event::new(env);
        let env_for_body = env.clone();
        let bridge = ProcessBridge::spawn(move |yield_handle| body(env_for_body, yield_handle));
        let shared = Arc::new(Mutex::new(Shared { bridge }));

        let init_event = Event::new(env);
        let init_shared = shared.clone();
        let init_process_event = process_event.clone();
        init_event
            .add_callback(Box::new(move |callback_env, fired| {
                let outcome = fired.value().expect("init event always resolves with a value");
                drive(init_shared, callback_env.clone(), init_process_event, outcome);
            }))
            .expect("freshly constructed event cannot already be processed");
        init_event
            .resolve(Outcome::success(()), Priority::Urgent)
            .expect("freshly constructed event cannot already be triggered");

        Process { event: process_event }
    }

    /// The event that resolves when this process's function returns.
    pub fn event(&self) -> Event {
        self.event.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.event.is_triggered()
    }
}

/// Drives one `resume` round trip: `env.active_process()` reads `Some`
/// only for the duration of this call (and any tail-recursion into it
/// below) — never observable outside an actual process resumption.
fn drive(shared: Arc<Mutex<Shared>>, env: Environment, process_event: Event, resume_value: Outcome) {
    env.set_active_process(Some(process_event.clone()));
    let resumed = shared.lock().unwrap().bridge.resume(resume_value);
    match resumed {
        ResumeOutcome::Yielded(yielded_event) => {
            log::trace!("process yielded, waiting for child event");
            let shared_for_callback = shared.clone();
            let process_event_for_callback = process_event.clone();
            let registered = yielded_event.add_callback(Box::new(move |callback_env, fired| {
                let outcome = fired
                    .value()
                    .expect("callback only runs once its event has resolved");
                drive(shared_for_callback, callback_env.clone(), process_event_for_callback, outcome);
            }));
            env.set_active_process(None);
            if registered.is_err() {
                // The yielded event was already fully processed before we
                // could attach — only possible if it was already
                // triggered and dispatched earlier on this same tick.
                // Re-drive immediately with its (already final) value.
                let outcome = yielded_event
                    .value()
                    .expect("an already-processed event must have a resolved value");
                drive(shared, env, process_event, outcome);
            }
        }
        ResumeOutcome::Finished(outcome) => {
            log::debug!("process finished");
            let _ = process_event.resolve(outcome, Priority::Normal);
            env.set_active_process(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Until;
    use crate::timeout::Timeout;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn process_runs_to_completion() {
        let env = Environment::new();
        let seen = Arc::new(AtomicU64::new(0));
        let seen2 = seen.clone();
        let _p = Process::new(&env, move |env, yield_handle| {
            let t = Timeout::new(&env, 5, ());
            t.schedule().unwrap();
            yield_handle.yield_event(t.event()).unwrap();
            seen2.store(env.now(), Ordering::SeqCst);
            Outcome::success(())
        });
        env.run(Until::NoMoreEvents).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn process_event_fires_on_completion() {
        let env = Environment::new();
        let p = Process::new(&env, |env, yield_handle| {
            let t = Timeout::new(&env, 1, "done");
            t.schedule().unwrap();
            let v = yield_handle.yield_event(t.event()).unwrap();
            Outcome::Success(v)
        });
        assert!(!p.is_finished());
        env.run(Until::NoMoreEvents).unwrap();
        assert!(p.is_finished());
        match p.event().value().unwrap() {
            Outcome::Success(v) => assert_eq!(v.downcast_ref::<&str>(), Some(&"done")),
            Outcome::Failure(_) => panic!("expected success"),
        }
    }

    #[test]
    fn process_can_yield_another_process() {
        let env = Environment::new();
        let outer_env = env.clone();
        let _outer = Process::new(&env, move |env, yield_handle| {
            let inner = Process::new(&env, |env, yield_handle| {
                let t = Timeout::new(&env, 3, 99i32);
                t.schedule().unwrap();
                let v = yield_handle.yield_event(t.event()).unwrap();
                Outcome::Success(v)
            });
            let v = yield_handle.yield_event(inner.event()).unwrap();
            Outcome::Success(v)
        });
        let _ = outer_env;
        env.run(Until::NoMoreEvents).unwrap();
        assert_eq!(env.now(), 3);
    }

    #[test]
    fn active_process_set_only_during_resumption() {
        let env = Environment::new();
        assert!(env.active_process().is_none());
        let seen_active = Arc::new(std::sync::Mutex::new(false));
        let seen_active2 = seen_active.clone();
        let p = Process::new(&env, move |env, yield_handle| {
            let active = env.active_process();
            *seen_active2.lock().unwrap() = active.is_some();
            let t = Timeout::new(&env, 1, ());
            t.schedule().unwrap();
            yield_handle.yield_event(t.event()).unwrap();
            Outcome::success(())
        });
        env.run(Until::NoMoreEvents).unwrap();
        assert!(*seen_active.lock().unwrap());
        assert!(env.active_process().is_none());
        assert!(p.is_finished());
    }
}
