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

//! Time/priority/sequence-ordered heap of scheduled entries.
//!
//! This mirrors `bgmerrell/simgo`'s hand-rolled `container/heap.Interface`
//! implementation (`eventqueue.go`) rather than reaching for
//! `std::collections::BinaryHeap`: the original keeps each entry's index
//! in the backing slice up to date on every swap so that, in principle,
//! an entry could later be located for O(log n) removal. No current
//! caller removes an entry by index, but the field and the bookkeeping
//! that keeps it correct are kept as a preserved contract.

use crate::event::Event;

/// The two priority tiers events can be scheduled at. `Urgent` sorts
/// before `Normal` at the same simulated time — the derived `Ord` relies
/// on `Urgent` being declared first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Urgent,
    Normal,
}

pub(crate) struct EventQueueEntry {
    pub(crate) event: Event,
    pub(crate) time: u64,
    pub(crate) priority: Priority,
    pub(crate) eid: u64,
    idx: usize,
}

impl EventQueueEntry {
    fn key(&self) -> (u64, Priority, u64) {
        (self.time, self.priority, self.eid)
    }
}

/// A min-heap keyed by `(time, priority, eid)`, ascending. Ties across all
/// three are impossible because `eid` is assigned uniquely at schedule time.
#[derive(Default)]
pub(crate) struct EventQueue {
    entries: Vec<EventQueueEntry>,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn push(&mut self, event: Event, time: u64, priority: Priority, eid: u64) {
        let idx = self.entries.len();
        self.entries.push(EventQueueEntry { event, time, priority, eid, idx });
        self.sift_up(idx);
    }

    /// Pops the entry with the smallest `(time, priority, eid)` key, or
    /// `None` if the queue is empty — the idiomatic Rust stand-in for the
    /// Go original's `nil` "empty" sentinel.
    pub(crate) fn pop(&mut self) -> Option<EventQueueEntry> {
        let len = self.entries.len();
        if len == 0 {
            return None;
        }
        self.entries.swap(0, len - 1);
        let top = self.entries.pop().expect("checked non-empty above");
        if !self.entries.is_empty() {
            self.entries[0].idx = 0;
            self.sift_down(0);
        }
        Some(top)
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.entries[idx].key() < self.entries[parent].key() {
                self.swap(idx, parent);
                idx = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut smallest = idx;
            if left < len && self.entries[left].key() < self.entries[smallest].key() {
                smallest = left;
            }
            if right < len && self.entries[right].key() < self.entries[smallest].key() {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.swap(idx, smallest);
            idx = smallest;
        }
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.entries.swap(i, j);
        self.entries[i].idx = i;
        self.entries[j].idx = j;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;

    fn ev(env: &Environment) -> Event {
        Event::new(env)
    }

    #[test]
    fn pop_orders_by_time_then_priority_then_eid() {
        let env = Environment::new();
        let mut q = EventQueue::new();
        let a = ev(&env);
        let b = ev(&env);
        let c = ev(&env);
        q.push(a.clone(), 5, Priority::Normal, 2);
        q.push(b.clone(), 5, Priority::Urgent, 3);
        q.push(c.clone(), 1, Priority::Normal, 1);

        let first = q.pop().unwrap();
        assert_eq!(first.time, 1);
        let second = q.pop().unwrap();
        assert_eq!((second.time, second.priority), (5, Priority::Urgent));
        let third = q.pop().unwrap();
        assert_eq!((third.time, third.priority), (5, Priority::Normal));
        assert!(q.pop().is_none());
    }

    #[test]
    fn ties_break_on_insertion_order() {
        let env = Environment::new();
        let mut q = EventQueue::new();
        for eid in 0..10u64 {
            q.push(ev(&env), 0, Priority::Normal, eid);
        }
        let mut eids = Vec::new();
        while let Some(entry) = q.pop() {
            eids.push(entry.eid);
        }
        assert_eq!(eids, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn empty_pop_is_none() {
        let mut q: EventQueue = EventQueue::new();
        assert!(q.pop().is_none());
        assert_eq!(q.len(), 0);
    }
}
