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

//! The worker-thread rendezvous that lets a process function behave like
//! a coroutine: `Yield` hands control back to the scheduler and blocks
//! until `Resume`, even though the two run on separate OS threads.
//! Control strictly alternates, so there is never real concurrency
//! between a process body and the scheduler driving it.
//!
//! Grounded on `pcomm.go`'s `ProcComm`: its `yieldCh`/`resumeCh`
//! unbuffered channels map directly onto a pair of
//! `std::sync::mpsc::sync_channel(0)` channels. This is the one place the
//! teacher's approach (nightly `Generator`/`Rc<RefCell<..>>`) can't be
//! kept as-is on stable Rust, so this module follows the Go original's
//! thread-and-channel shape instead.

use std::panic;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use crate::event::Event;
use crate::value::{AnyValue, ErrorValue, Outcome};

enum WorkerMessage {
    Yielded(Event),
    Finished(Outcome),
}

/// Passed into a process function so it can suspend itself on an event.
pub struct YieldHandle {
    to_scheduler: SyncSender<WorkerMessage>,
    from_scheduler: Receiver<Outcome>,
}

impl YieldHandle {
    /// Suspends the calling process until `event` resolves. Returns the
    /// event's success value, or propagates its failure as an `Err` so
    /// process functions can use `?` to bail out on a failed child event.
    pub fn yield_event(&self, event: Event) -> Result<AnyValue, ErrorValue> {
        self.to_scheduler
            .send(WorkerMessage::Yielded(event))
            .expect("scheduler dropped the bridge while the process was suspended");
        match self
            .from_scheduler
            .recv()
            .expect("scheduler dropped the bridge without resuming it")
        {
            Outcome::Success(v) => Ok(v),
            Outcome::Failure(e) => Err(e),
        }
    }
}

pub(crate) enum ResumeOutcome {
    Yielded(Event),
    Finished(Outcome),
}

/// The scheduler-side handle to a process's worker thread.
pub(crate) struct ProcessBridge {
    to_worker: Option<SyncSender<Outcome>>,
    from_worker: Receiver<WorkerMessage>,
    handle: Option<JoinHandle<()>>,
}

impl ProcessBridge {
    /// Spawns the worker thread for `body`. The thread blocks on its
    /// first `recv` before calling `body` at all, so a process never
    /// starts running before its first `resume` — no separate round trip
    /// is needed to guarantee that ordering.
    pub(crate) fn spawn<F>(body: F) -> Self
    where
        F: FnOnce(YieldHandle) -> Outcome + Send + 'static,
    {
        let (to_worker, from_scheduler) = sync_channel::<Outcome>(0);
        let (to_scheduler, from_worker) = sync_channel::<WorkerMessage>(0);

        let handle = thread::spawn(move || {
            if from_scheduler.recv().is_err() {
                return;
            }
            let finisher = to_scheduler.clone();
            let yield_handle = YieldHandle { to_scheduler, from_scheduler };
            let result = body(yield_handle);
            let _ = finisher.send(WorkerMessage::Finished(result));
        });

        Self { to_worker: Some(to_worker), from_worker, handle: Some(handle) }
    }

    /// Hands `value` to the worker (resuming its last yield, or kicking
    /// it off the very first time) and blocks until it yields again or
    /// finishes.
    ///
    /// If the worker thread panicked, the channel it would have replied
    /// on is closed; this is detected and the panic is re-raised on the
    /// caller's thread with `std::panic::resume_unwind` rather than
    /// being caught and converted into a `SimError` — a process
    /// function's panics stay opaque to the scheduler.
    pub(crate) fn resume(&mut self, value: Outcome) -> ResumeOutcome {
        let sender = self.to_worker.as_ref().expect("bridge already finished");
        if sender.send(value).is_err() {
            return self.propagate_worker_panic();
        }
        match self.from_worker.recv() {
            Ok(WorkerMessage::Yielded(ev)) => ResumeOutcome::Yielded(ev),
            Ok(WorkerMessage::Finished(outcome)) => ResumeOutcome::Finished(outcome),
            Err(_) => self.propagate_worker_panic(),
        }
    }

    fn propagate_worker_panic(&mut self) -> ResumeOutcome {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(()) => panic!("process worker thread exited without yielding or finishing"),
                Err(payload) => panic::resume_unwind(payload),
            },
            None => panic!("process worker thread already joined"),
        }
    }
}

impl Drop for ProcessBridge {
    fn drop(&mut self) {
        // Drop the sender first so a worker parked on `recv` unblocks
        // with an error and exits its pre-yield wait, then reap it.
        self.to_worker.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_drives_to_first_yield() {
        let env_event_placeholder = (); // bridge module is env-agnostic
        let _ = env_event_placeholder;
        let mut bridge = ProcessBridge::spawn(|yield_handle| {
            let _ = yield_handle; // body under test lives in process.rs integration tests
            Outcome::success(())
        });
        match bridge.resume(Outcome::success(())) {
            ResumeOutcome::Finished(Outcome::Success(_)) => {}
            _ => panic!("expected immediate completion"),
        }
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn panicking_body_reraises_on_resume() {
        let mut bridge = ProcessBridge::spawn(|_yield_handle| {
            panic!("boom");
        });
        bridge.resume(Outcome::success(()));
    }
}


