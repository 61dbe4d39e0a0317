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

    // Handles the degenerate cases up front: `all_of(env, [])` is
    // vacuously satisfied, `any_of(env, [])` never would be (and simply
    // never registers a callback, so it waits forever — matching "a
    // condition over no children never fires" rather than erroring).
    if evaluator(0, total) {
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
        let links = links.clone();
        let id = child.add_callback(Box::new(move |_env, fired| {
            on_child_fired(&state, &condition_event, fired, evaluator, total, &links);
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
        if let Some(outcome) = child.value() {
            value.push_flattened(child, outcome);
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Until;
    use crate::timeout::Timeout;
    use std::fmt;

    #[derive(Debug)]
    struct Boom;
    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boom")
        }
    }
    impl std::error::Error for Boom {}

    #[test]
    fn any_of_fires_on_first_success() {
        let env = Environment::new();
        let t1 = Timeout::new(&env, 3, "slow");
        let t2 = Timeout::new(&env, 1, "fast");
        t1.schedule().unwrap();
        t2.schedule().unwrap();
        let cond = any_of(&env, vec![t1.event(), t2.event()]).unwrap();
        env.run(Until::NoMoreEvents).unwrap();
        let value = cond.event().value().unwrap();
        match value {
            Outcome::Success(v) => {
                let cv = v.downcast_ref::<ConditionValue>().unwrap();
                assert_eq!(cv.len(), 1);
            }
            Outcome::Failure(_) => panic!("expected success"),
        }
    }

    #[test]
    fn all_of_waits_for_every_child() {
        let env = Environment::new();
        let t1 = Timeout::new(&env, 1, "a");
        let t2 = Timeout::new(&env, 4, "b");
        t1.schedule().unwrap();
        t2.schedule().unwrap();
        let cond = all_of(&env, vec![t1.event(), t2.event()]).unwrap();
        env.step().unwrap(); // t1 fires
        assert!(!cond.event().is_triggered());
        env.run(Until::NoMoreEvents).unwrap();
        assert!(cond.event().is_triggered());
        let cv = match cond.event().value().unwrap() {
            Outcome::Success(v) => v.downcast_ref::<ConditionValue>().unwrap().clone(),
            Outcome::Failure(_) => panic!("expected success"),
        };
        assert_eq!(cv.len(), 2);
    }

    #[test]
    fn failure_propagates_immediately() {
        let env = Environment::new();
        let a = Event::new(&env);
        let b = Event::new(&env);
        let cond = all_of(&env, vec![a.clone(), b.clone()]).unwrap();
        a.fail(Boom).unwrap();
        env.run(Until::NoMoreEvents).unwrap();
        match cond.event().value().unwrap() {
            Outcome::Failure(_) => {}
            Outcome::Success(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn all_of_accounts_for_a_child_already_processed_at_construction() {
        let env = Environment::new();
        let a = Event::new(&env);
        a.succeed("first").unwrap();
        env.step().unwrap(); // a is now fully processed before the condition exists
        assert!(a.is_processed());

        let b = Timeout::new(&env, 1, "second");
        b.schedule().unwrap();
        let cond = all_of(&env, vec![a.clone(), b.event()]).unwrap();
        env.run(Until::NoMoreEvents).unwrap();

        let cv = match cond.event().value().unwrap() {
            Outcome::Success(v) => v.downcast_ref::<ConditionValue>().unwrap().clone(),
            Outcome::Failure(_) => panic!("expected success"),
        };
        assert_eq!(cv.len(), 2);
    }

    #[test]
    fn composite_value_follows_original_order_not_resolution_order() {
        let env = Environment::new();
        let slow = Timeout::new(&env, 5, "slow"); // listed first, resolves second
        let fast = Timeout::new(&env, 1, "fast"); // listed second, resolves first
        slow.schedule().unwrap();
        fast.schedule().unwrap();

        let cond = all_of(&env, vec![slow.event(), fast.event()]).unwrap();
        env.run(Until::NoMoreEvents).unwrap();

        let cv = match cond.event().value().unwrap() {
            Outcome::Success(v) => v.downcast_ref::<ConditionValue>().unwrap().clone(),
            Outcome::Failure(_) => panic!("expected success"),
        };
        let ordered: Vec<&str> =
            cv.iter().map(|(_, o)| *o.downcast_success::<&str>().unwrap()).collect();
        assert_eq!(ordered, vec!["slow", "fast"]);
    }

    #[test]
    fn all_of_empty_succeeds_immediately() {
        let env = Environment::new();
        let cond = all_of(&env, vec![]).unwrap();
        assert!(cond.event().is_triggered());
    }

    #[test]
    fn nested_condition_flattens_into_parent_value() {
        let env = Environment::new();
        let t1 = Timeout::new(&env, 1, "spam");
        let t2 = Timeout::new(&env, 2, "eggs");
        let t3 = Timeout::new(&env, 3, "coconut");
        t1.schedule().unwrap();
        t2.schedule().unwrap();
        t3.schedule().unwrap();

        let inner = all_of(&env, vec![t1.event(), t2.event()]).unwrap();
        let outer = any_of(&env, vec![inner.event(), t3.event()]).unwrap();
        env.run(Until::NoMoreEvents).unwrap();

        let cv = match outer.event().value().unwrap() {
            Outcome::Success(v) => v.downcast_ref::<ConditionValue>().unwrap().clone(),
            Outcome::Failure(_) => panic!("expected success"),
        };
        assert_eq!(cv.len(), 2);
        assert_eq!(env.now(), 2);
    }
}


