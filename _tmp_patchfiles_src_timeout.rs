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

//! A `Timeout` is an [`Event`] that fires a fixed delay after it is
//! scheduled, carrying a value fixed at construction time.
//!
//! Grounded on `simgo`'s `Timeout` (`events.go`) and its usage in the Go
//! examples (`car.go`, `school.go`, `nested_condition.go`), which
//! construct a `Timeout` then call `.Schedule(env)` on it explicitly
//! rather than scheduling implicitly at construction.

use std::any::Any;
use std::sync::Arc;

use crate::environment::Environment;
use crate::error::SimError;
use crate::event::Event;
use crate::queue::Priority;
use crate::value::Outcome;

/// A delayed, pre-valued event. `Timeout::new` builds the event but does
/// not schedule it; call [`Timeout::schedule`] to put it on the queue.
pub struct Timeout {
    event: Event,
    delay: u64,
    value: Arc<dyn Any + Send + Sync>,
}

impl Timeout {
    pub fn new<T: Any + Send + Sync>(env: &Environment, delay: u64, value: T) -> Self {
        Self {
            event: Event::new(env),
            delay,
            value: Arc::new(value),
        }
    }

    /// The underlying event, to be yielded from a process or passed into
    /// an `AnyOf`/`AllOf` condition.
    pub fn event(&self) -> Event {
        self.event.clone()
    }

    /// Schedules this timeout to fire `delay` simulated time units from
    /// now, at `Normal` priority. Fails with `AlreadyTriggered` if called
    /// twice on the same `Timeout`.
    pub fn schedule(&self) -> Result<(), SimError> {
        self.event
            .trigger_after(Outcome::Success(self.value.clone()), self.delay, Priority::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_fires_at_delay() {
        let env = Environment::new();
        let t = Timeout::new(&env, 5, "spam");
        t.schedule().unwrap();
        env.run(crate::environment::Until::NoMoreEvents).unwrap();
        assert_eq!(env.now(), 5);
    }

    #[test]
    fn double_schedule_errors() {
        let env = Environment::new();
        let t = Timeout::new(&env, 1, 1i32);
        t.schedule().unwrap();
        assert_eq!(t.schedule(), Err(SimError::AlreadyTriggered));
    }
}


