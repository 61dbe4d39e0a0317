//! End-to-end scenarios: a handful of small simulations exercised the way
//! a user of this crate actually would, through the public API only.

use std::sync::{Arc, Mutex};

use simpy_rs::{all_of, any_of, AnyValue, Environment, Event, Outcome, Process, Timeout, Until};

fn downcast_value<T: std::any::Any + Clone>(value: AnyValue) -> T {
    value.downcast_ref::<T>().expect("unexpected value type").clone()
}

/// Installs the `log` subscriber so the kernel's `trace!`/`debug!`/`warn!`
/// call sites (scheduling, condition resolution, undefused failures) are
/// visible with `--nocapture`. `try_init` rather than `init` because the
/// test harness runs every `#[test]` in this file in the same process.
fn init_logging() {
    let _ = env_logger::try_init();
}

/// A process alternating `Timeout(5)` and `Timeout(2)` forever records
/// its resumption times at 0, 5, 7, 12, 14 by the time `run(until=15)`
/// stops (the 15th tick itself is never reached: the next resumption
/// would fall at 19).
#[test]
fn car_alternates_timeouts() {
    init_logging();
    let env = Environment::new();
    let starts = Arc::new(Mutex::new(Vec::new()));
    let starts_in_process = starts.clone();

    let _car = Process::new(&env, move |env, yield_handle| {
        let mut delay = 5u64;
        loop {
            starts_in_process.lock().unwrap().push(env.now());
            let t = Timeout::new(&env, delay, ());
            t.schedule().unwrap();
            yield_handle.yield_event(t.event()).unwrap();
            delay = if delay == 5 { 2 } else { 5 };
        }
    });

    env.run(Until::Time(15)).unwrap();
    assert_eq!(*starts.lock().unwrap(), vec![0, 5, 7, 12, 14]);
}

/// Yielding `Timeout(10, 40+i)` for `i in 0..3` produces `(now, value)`
/// pairs `(10, 40), (20, 41), (30, 42)`.
#[test]
fn three_timeouts_accumulate_now_and_value() {
    init_logging();
    let env = Environment::new();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let observed_in_process = observed.clone();

    let _p = Process::new(&env, move |env, yield_handle| {
        for i in 0..3u32 {
            let t = Timeout::new(&env, 10, 40 + i);
            t.schedule().unwrap();
            let v: u32 = downcast_value(yield_handle.yield_event(t.event()).unwrap());
            observed_in_process.lock().unwrap().push((env.now(), v));
        }
        Outcome::success(())
    });

    env.run(Until::NoMoreEvents).unwrap();
    assert_eq!(*observed.lock().unwrap(), vec![(10, 40), (20, 41), (30, 42)]);
}

/// `AnyOf` among two simultaneously-scheduled timeouts resumes with a
/// composite containing only the faster child, at `now == 1`.
#[test]
fn any_of_selects_the_faster_child() {
    init_logging();
    let env = Environment::new();
    let t1 = Timeout::new(&env, 1, "spam");
    let t2 = Timeout::new(&env, 2, "eggs");
    t1.schedule().unwrap();
    t2.schedule().unwrap();

    let cond = any_of(&env, vec![t1.event(), t2.event()]).unwrap();
    env.run(Until::NoMoreEvents).unwrap();

    assert_eq!(env.now(), 2); // the queue drains past t2's dispatch too
    let value = match cond.event().value().unwrap() {
        Outcome::Success(v) => v.downcast_ref::<simpy_rs::ConditionValue>().unwrap().clone(),
        Outcome::Failure(_) => panic!("expected success"),
    };
    assert_eq!(value.len(), 1);
    let spam: &&str = value.get(&t1.event()).unwrap().downcast_success::<&str>().unwrap();
    assert_eq!(*spam, "spam");
}

/// Base spec §8 boundary behavior: "`AnyOf` among two simultaneously-
/// scheduled timeouts selects the one with the lower `(priority, eid)`."
/// Both timeouts here share a delay, so the tie is broken purely by
/// scheduling order (`t1` is scheduled first and so gets the lower `eid`),
/// not by which one happens to have the smaller simulated time.
#[test]
fn any_of_breaks_same_time_tie_by_insertion_order() {
    init_logging();
    let env = Environment::new();
    let t1 = Timeout::new(&env, 3, "first");
    let t2 = Timeout::new(&env, 3, "second");
    t1.schedule().unwrap();
    t2.schedule().unwrap();

    let cond = any_of(&env, vec![t1.event(), t2.event()]).unwrap();
    env.run(Until::NoMoreEvents).unwrap();

    assert_eq!(env.now(), 3);
    let value = match cond.event().value().unwrap() {
        Outcome::Success(v) => v.downcast_ref::<simpy_rs::ConditionValue>().unwrap().clone(),
        Outcome::Failure(_) => panic!("expected success"),
    };
    assert_eq!(value.len(), 1);
    let winner: &&str = value.get(&t1.event()).unwrap().downcast_success::<&str>().unwrap();
    assert_eq!(*winner, "first");
    assert!(value.get(&t2.event()).is_none(), "the later-scheduled tied timeout must not contribute");
}

/// The same two timeouts under `AllOf` resume with both children once
/// the slower one fires, at `now == 2`.
#[test]
fn all_of_waits_for_both_children() {
    init_logging();
    let env = Environment::new();
    let t1 = Timeout::new(&env, 1, "spam");
    let t2 = Timeout::new(&env, 2, "eggs");
    t1.schedule().unwrap();
    t2.schedule().unwrap();

    let cond = all_of(&env, vec![t1.event(), t2.event()]).unwrap();
    let value = env.run(Until::Event(cond.event())).unwrap();
    assert_eq!(env.now(), 2);

    let cv = match value.unwrap() {
        Outcome::Success(v) => v.downcast_ref::<simpy_rs::ConditionValue>().unwrap().clone(),
        Outcome::Failure(_) => panic!("expected success"),
    };
    assert_eq!(cv.len(), 2);
}

/// `AnyOf(AllOf(T1, T2), T3)` with delays 1, 2, 3 resolves at `now == 2`
/// with the composite value flattened to `{T1: "spam", T2: "eggs"}` —
/// `T3` loses the race and never contributes.
#[test]
fn nested_or_flattens_winning_branch() {
    init_logging();
    let env = Environment::new();
    let t1 = Timeout::new(&env, 1, "spam");
    let t2 = Timeout::new(&env, 2, "eggs");
    let t3 = Timeout::new(&env, 3, "late");
    t1.schedule().unwrap();
    t2.schedule().unwrap();
    t3.schedule().unwrap();

    let inner = all_of(&env, vec![t1.event(), t2.event()]).unwrap();
    let outer = any_of(&env, vec![inner.event(), t3.event()]).unwrap();

    let value = env.run(Until::Event(outer.event())).unwrap();
    assert_eq!(env.now(), 2);

    let cv = match value.unwrap() {
        Outcome::Success(v) => v.downcast_ref::<simpy_rs::ConditionValue>().unwrap().clone(),
        Outcome::Failure(_) => panic!("expected success"),
    };
    assert_eq!(cv.len(), 2);
    let spam: &&str = cv.get(&t1.event()).unwrap().downcast_success::<&str>().unwrap();
    let eggs: &&str = cv.get(&t2.event()).unwrap().downcast_success::<&str>().unwrap();
    assert_eq!((*spam, *eggs), ("spam", "eggs"));
}

/// `AllOf(AnyOf(T1, T2), T3)` with delays 1, 9999, 3 resolves at
/// `now == 3` with `{T1: "cat", T3: "dog"}`. `T2`'s far-future timeout is
/// still sitting unprocessed in the queue when `run` returns.
#[test]
fn nested_and_stops_before_far_future_timeout() {
    init_logging();
    let env = Environment::new();
    let t1 = Timeout::new(&env, 1, "cat");
    let t2 = Timeout::new(&env, 9999, "never");
    let t3 = Timeout::new(&env, 3, "dog");
    t1.schedule().unwrap();
    t2.schedule().unwrap();
    t3.schedule().unwrap();

    let inner = any_of(&env, vec![t1.event(), t2.event()]).unwrap();
    let outer = all_of(&env, vec![inner.event(), t3.event()]).unwrap();

    let value = env.run(Until::Event(outer.event())).unwrap();
    assert_eq!(env.now(), 3);
    assert!(!t2.event().is_processed(), "T2 must not have been dispatched yet");

    let cv = match value.unwrap() {
        Outcome::Success(v) => v.downcast_ref::<simpy_rs::ConditionValue>().unwrap().clone(),
        Outcome::Failure(_) => panic!("expected success"),
    };
    assert_eq!(cv.len(), 2);
    let cat: &&str = cv.get(&t1.event()).unwrap().downcast_success::<&str>().unwrap();
    let dog: &&str = cv.get(&t3.event()).unwrap().downcast_success::<&str>().unwrap();
    assert_eq!((*cat, *dog), ("cat", "dog"));
}

/// A process yielding another process resumes with that inner process's
/// return value.
#[test]
fn process_yields_process_and_gets_its_return_value() {
    init_logging();
    let env = Environment::new();
    let result = Arc::new(Mutex::new(None));
    let result_in_process = result.clone();

    let _outer = Process::new(&env, move |env, yield_handle| {
        let inner = Process::new(&env, |env, yield_handle| {
            let t = Timeout::new(&env, 1, ());
            t.schedule().unwrap();
            yield_handle.yield_event(t.event()).unwrap();
            let _ = env.now();
            Outcome::success(42i32)
        });
        let v: i32 = downcast_value(yield_handle.yield_event(inner.event()).unwrap());
        result_in_process.lock().unwrap().replace(v);
        Outcome::success(())
    });

    env.run(Until::NoMoreEvents).unwrap();
    assert_eq!(*result.lock().unwrap(), Some(42));
}

/// A bell process fires a fresh `classEnds` event at 45 and 90; three
/// pupil processes each wait on whatever `classEnds` event is current
/// and record once per bell.
#[test]
fn school_bell_wakes_every_pupil_each_period() {
    init_logging();
    let env = Environment::new();
    let class_ends: Arc<Mutex<Event>> = Arc::new(Mutex::new(Event::new(&env)));

    let bell_class_ends = class_ends.clone();
    let _bell = Process::new(&env, move |env, yield_handle| {
        for _ in 0..2 {
            let t = Timeout::new(&env, 45, ());
            t.schedule().unwrap();
            yield_handle.yield_event(t.event()).unwrap();
            let ending = bell_class_ends.lock().unwrap().clone();
            ending.succeed(()).unwrap();
            *bell_class_ends.lock().unwrap() = Event::new(&env);
        }
        Outcome::success(())
    });

    let cheers = Arc::new(Mutex::new(Vec::new()));
    let mut _pupils = Vec::new();
    for pupil_id in 0..3u32 {
        let pupil_class_ends = class_ends.clone();
        let pupil_cheers = cheers.clone();
        _pupils.push(Process::new(&env, move |env, yield_handle| {
            for _ in 0..2 {
                let current = pupil_class_ends.lock().unwrap().clone();
                yield_handle.yield_event(current).unwrap();
                pupil_cheers.lock().unwrap().push((pupil_id, env.now()));
            }
            Outcome::success(())
        }));
    }

    env.run(Until::NoMoreEvents).unwrap();

    let cheers = cheers.lock().unwrap();
    assert_eq!(cheers.len(), 6);
    for pupil_id in 0..3u32 {
        let times: Vec<u64> =
            cheers.iter().filter(|(id, _)| *id == pupil_id).map(|(_, t)| *t).collect();
        assert_eq!(times, vec![45, 90]);
    }
}
