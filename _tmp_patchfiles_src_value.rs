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

//! The value an [`Event`](crate::event::Event) resolves to.
//!
//! `simgo`'s `EventValue.Get() (interface{}, error)` returns either a
//! payload or an error; this crate keeps that two-armed shape as
//! [`Outcome`] instead of bolting an `Option<Error>` onto a plain `Any`,
//! so a resolved event can never be in the nonsensical "both a value and
//! an error" or "neither" state.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Type-erased error payload carried by a failed event. `Arc` rather than
/// `Box` because a `Condition`'s propagated failure and the original
/// failing child both need to hold a reference to the same error.
pub type ErrorValue = Arc<dyn Error + Send + Sync>;

/// Type-erased success payload. `Any` because a process function's return
/// type, a `Timeout`'s value, and a `Condition`'s composite value are all
/// different concrete types sharing one channel.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// What an event resolved to: a success payload or a failure payload.
/// Mirrors the two branches callers must distinguish after `Get()` in the
/// original — `ok=true` with a value, or `ok=false` with an error.
#[derive(Clone)]
pub enum Outcome {
    Success(AnyValue),
    Failure(ErrorValue),
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success(_) => f.write_str("Outcome::Success(..)"),
            Outcome::Failure(e) => write!(f, "Outcome::Failure({e})"),
        }
    }
}

impl Outcome {
    pub fn success<T: Any + Send + Sync>(value: T) -> Self {
        Outcome::Success(Arc::new(value))
    }

    pub fn failure<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Outcome::Failure(Arc::new(err))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn downcast_success<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Outcome::Success(v) => v.downcast_ref::<T>(),
            Outcome::Failure(_) => None,
        }
    }
}

/// A resolved (or not-yet-resolved) event value, with "was this failure
/// ever looked at" bookkeeping so an unobserved simulated failure can be
/// flagged. Pending until an `Event` triggers.
#[derive(Debug, Default, Clone)]
pub struct EventValue {
    outcome: Option<Outcome>,
    observed: bool,
}

impl EventValue {
    pub(crate) fn pending() -> Self {
        Self { outcome: None, observed: false }
    }

    pub(crate) fn set(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
        self.observed = false;
    }

    pub(crate) fn mark_observed(&mut self) {
        self.observed = true;
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.outcome.is_none()
    }

    /// `true` if this resolved to a failure that no callback and no
    /// `get()` call has looked at yet.
    pub(crate) fn is_undefused_failure(&self) -> bool {
        matches!(&self.outcome, Some(Outcome::Failure(_))) && !self.observed
    }

    pub(crate) fn peek(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// `simgo`'s `EventValue.Get`: returns the resolved outcome, marking
    /// it observed, or `None` while still pending.
    pub fn get(&mut self) -> Option<Outcome> {
        let outcome = self.outcome.clone();
        if outcome.is_some() {
            self.observed = true;
        }
        outcome
    }
}
