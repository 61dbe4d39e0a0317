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

use thiserror::Error;

/// Protocol violations reported to callers, as opposed to simulated
/// failures carried by a failed [`Event`](crate::event::Event)'s value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// `Succeed`/`Fail`/`Trigger` called on an event that already has a
    /// value, whether or not it has been processed yet.
    #[error("event was already triggered")]
    AlreadyTriggered,

    /// `AddCallback`/`RemoveCallback` called on an event whose callback
    /// list has collapsed to the processed sentinel.
    #[error("event has already been processed")]
    EventProcessed,

    /// `EventValue::get` (or the `Event::value` accessor built on it)
    /// called before the event resolved.
    #[error("event value is still pending")]
    ValuePending,

    /// A [`Condition`](crate::condition::Condition) was built from
    /// children that don't all belong to the same `Environment`.
    #[error("condition children do not share an environment")]
    CrossEnvironment,

    /// `Run` was asked to stop at a numeric time at or before `now`.
    #[error("run(until) time must be strictly greater than the current time")]
    InvalidUntil,

    /// Reserved: a process function can only yield a
    /// [`crate::event::Event`] — the type system enforces this at compile
    /// time, so this variant is never actually constructed. Kept for API
    /// documentation completeness.
    #[error("process function yielded a value that was not an event")]
    NotAnEvent,
}
