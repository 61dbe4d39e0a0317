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

//! `AnyOf`/`AllOf`: an event that fires once enough of a set of child
//! events have fired, carrying a composite value keyed by child identity.
//!
//! Grounded on the Go original's `Condition` (named in `events.go` as a
//! stub) and its real behavior as exercised by
//! `examples/nested_condition.go`: a condition nested inside another
//! condition is stored as a plain child `Event`, and the outer
//! condition's composite value flattens the nested one's entries into
//! its own rather than nesting a `ConditionValue` one level deeper.

use std::sync::{Arc, Mutex};

use crate::environment::Environment;
use crate::error::SimError;
use crate::event::{CallbackId, Event};
use crate::queue::Priority;
use crate::value::Outcome;

/// The composite value a `Condition` event resolves to: an ordered list
/// of `(child, outcome)` pairs in the order those children fired, with
/// lookup by child identity (mirroring the Go original's use of a
/// condition value as a dictionary keyed by event pointer).
#[derive(Clone, Default)]
pub struct ConditionValue {
    entries: Vec<(Event, Outcome)>,
}

impl ConditionValue {
    fn push_flattened(&mut self, event: &Event, outcome: Outcome) {
        if let Outcome::Success(payload) = &outcome {
            if let Some(nested) = payload.downcast_ref::<ConditionValue>() {
                self.entries.extend(nested.entries.iter().cloned());
                return;
            }
        }
        self.entries.push((event.clone(), outcome));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a child's outcome by identity, the shape
    /// `nested_condition.go` relies on (`r[0]`, `r[1]` there are
    /// positional, but the Python original indexes this structure by
    /// event identity — this crate supports both).
    pub fn get(&self, event: &Event) -> Option<&Outcome> {
        self.entries.iter().find(|(e, _)| e.same_event(event)).map(|(_, o)| o)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Event, Outcome)> {
        self.entries.iter()
    }
}

/// An `Event` that fires once its children satisfy an evaluator
/// (`AnyOf`: at least one; `AllOf`: all of them).
pub struct Condition {
    event: Event,
}

impl Condition {
    /// The underlying event, to be yielded from a process or nested
    /// inside another `AnyOf`/`AllOf`.
    pub fn event(&self) -> Event {
        self.event.clone()
    }
}

/// Fires as soon as any one child fires successfully; fails immediately
/// if any child fails, propagating that child's error.
pub fn any_of(env: &Environment, children: Vec<Event>) -> Result<Condition, SimError> {
    build(env, children, |resolved, _total| resolved >= 1)
}

/// Fires once every child has fired successfully; fails immediately if
/// any child fails, propagating that child's error.
pub fn all_of(env: &Environment, children: Vec<Event>) -> Result<Condition, SimError> {
    build(env, children, |resolved, total| resolved >= total)
}

struct ConditionState {
    /// The original children, left to right — `build_value` walks this
    /// order rather than `resolved`'s fire order, so the composite value
    /// always reflects original left-to-right position, not arrival time.
    children: Vec<Event>,
    resolved: Vec<Event>,
    decided: bool,
}

fn build(
    env: &Environment,
    children: Vec<Event>,
    evaluator: fn(usize, usize) -> bool,
) -> Result<Condition, SimError> {
    for child in &children {
        if !env.same_env(&child.env()) {
            return Err(SimError::CrossEnvironment);
        }
    }

    let condition_event = Event::new(env);
    let total = children.len();

    // Handles the degenerate case up front, unconditionally on the
    // evaluator: base spec §4.5 construction step 1 says a `Condition`
    // over zero children immediately succeeds with a nil value, with no
    // `AnyOf`/`AllOf` distinction. (`any_of`'s evaluator, `resolved >= 1`,
    // is false at `(0, 0)` and would otherwise leave this condition
    // pending forever — real SimPy's `Condition.__init__` special-cases
    // the empty list before ever consulting `evaluate`.)
    if total == 0 {
        condition_event.succeed(ConditionValue::default())?;
        return Ok(Condition { event: condition_event });
    }

    let state = Arc::new(Mutex::new(ConditionState {
        children: children.clone(),
        resolved: Vec::new(),
        decided: false,
    }));
    let links: Arc<Mutex<Vec<(Event, CallbackId)>>> = Arc::new(Mutex::new(Vec::with_capacity(total)));

    // A child may already be processed at construction time (e.g. folded
    // into this condition after already firing elsewhere). Its callback
    // list has collapsed to the processed sentinel, so `add_callback`
    // would error — account for it directly instead, once every
    // still-pending child's callback is registered so `cleanup` below
    // sees the complete link set.
    let mut already_processed = Vec::new();
    for child in &children {
        if child.is_processed() {
            already_processed.push(child.clone());
            continue;
        }
        let state = state.clone();
        let condition_event = condition_event.clone();
        let links_for_callback = links.clone();
        let id = child.add_callback(Box::new(move |_env, fired| {
            on_child_fired(&state, &condition_event, fired, evaluator, total, &links_for_callback);
        }))?;
        links.lock().unwrap().push((child.clone(), id));
    }

    for child in &already_processed {
        if state.lock().unwrap().decided {
            break;
        }
        on_child_fired(&state, &condition_event, child, evaluator, total, &links);
    }

    Ok(Condition { event: condition_event })
}

fn on_child_fired(
    state: &Arc<Mutex<ConditionState>>,
    condition_event: &Event,
    fired: &Event,
    evaluator: fn(usize, usize) -> bool,
    total: usize,
    links: &Arc<Mutex<Vec<(Event, CallbackId)>>>,
) {
    let mut guard = state.lock().unwrap();
    if guard.decided {
        return;
    }
    let outcome = fired.value().expect("a condition callback only runs once its child triggered");
    match outcome {
        Outcome::Failure(_) => {
            guard.decided = true;
            drop(guard);
            log::debug!("condition failing: a child failed");
            let _ = condition_event.trigger_from(fired, Priority::Normal);
            cleanup(links, fired);
        }
        Outcome::Success(_) => {
            guard.resolved.push(fired.clone());
            if evaluator(guard.resolved.len(), total) {
                guard.decided = true;
                let value = build_value(&guard.children, &guard.resolved);
                drop(guard);
                log::debug!("condition satisfied, removing callbacks from remaining children");
                let _ = condition_event.succeed(value);
                cleanup(links, fired);
            }
        }
    }
}

/// Removes every remaining callback except the one belonging to the
/// child that just fired (whose callback list has already collapsed to
/// the processed sentinel, so removing it would be a no-op error anyway).
/// A stale callback left on an unremoved sibling is still harmless
/// because of the `decided` guard above.
fn cleanup(links: &Arc<Mutex<Vec<(Event, CallbackId)>>>, just_fired: &Event) {
    for (event, id) in links.lock().unwrap().iter() {
        if event.same_event(just_fired) {
            continue;
        }
        let _ = event.remove_callback(*id);
    }
}

/// Builds the composite value in the original children's left-to-right
/// order, not the order they happened to resolve in — a slower child
/// listed first still appears first in the flattened result.
fn build_value(children: &[Event], resolved: &[Event]) -> ConditionValue {
    let mut value = ConditionValue::default();
    for child in children {
        if !resolved.iter().any(|r| r.same_event(child)) {
            continue;
        }
        if let Ok(outcome) = child.value() {
            value.push_flattened(child, outcome);
        }
    }
    value
}
