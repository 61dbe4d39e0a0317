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

//! A discrete-event simulation kernel inspired by the SimPy library for
//! Python.
//!
//! # Simulation
//! A simulation is built out of an [`Environment`] driving [`Event`]s
//! through simulated time. [`Process`]es run ordinary Rust closures that
//! suspend themselves on events with a [`YieldHandle`] and resume when
//! those events fire; [`Timeout`] schedules a fixed-delay, pre-valued
//! event; [`any_of`]/[`all_of`] build composite events over a set of
//! children.
//!
//! After setting up a simulation, step through it one event at a time
//! with [`Environment::step`], or run it all at once with
//! [`Environment::run`] until an ending condition is met.
//!
//! Unlike the generator-based implementation this crate descends from,
//! a process function runs on its own OS thread and communicates with
//! the environment through a rendezvous channel — the feature this
//! crate relies on (`generators`) is nightly-only, and a real coroutine
//! is the only stable substitute that preserves the same suspend/resume
//! shape.

mod bridge;
mod condition;
mod environment;
mod error;
mod event;
mod process;
mod queue;
mod timeout;
mod value;

pub use condition::{all_of, any_of, Condition, ConditionValue};
pub use environment::{Environment, Until};
pub use error::SimError;
pub use event::{Callback, CallbackId, Event};
pub use process::{Process, ProcessFn};
pub use queue::Priority;
pub use timeout::Timeout;
pub use value::{AnyValue, ErrorValue, Outcome};

// `YieldHandle` lives in `bridge` since it's the scheduler/process
// rendezvous primitive, but it's part of the public process-authoring
// surface: a process function's second argument.
pub use bridge::YieldHandle;
