//! Detached, attached, and dependency-ordered async tasks.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use weft_runtime::{Executor, Flow, PreemptionGuard};

#[test]
fn silent_async_tasks_all_run() {
    let executor = Executor::new(4);
    let count = Arc::new(AtomicUsize::new(0));
    for _ in 0..200 {
        let count = Arc::clone(&count);
        executor.silent_async(move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
    }
    executor.wait_for_all();
    assert_eq!(count.load(Ordering::SeqCst), 200);
}

#[test]
fn async_task_returns_a_value() {
    let executor = Executor::new(2);
    let future = executor.async_task(|| 6 * 7);
    assert_eq!(future.get().unwrap(), 42);
}

#[test]
fn async_task_panic_lands_in_the_future() {
    let executor = Executor::new(2);
    let future = executor.async_task::<_, ()>(|| panic!("async boom"));
    let err = future.get().unwrap_err();
    assert!(format!("{err}").contains("async boom"));
    executor.wait_for_all();
}

#[test]
fn dependent_async_diamond_runs_in_order() {
    let executor = Executor::new(4);
    let log = Arc::new(Mutex::new(Vec::new()));

    let push = |tag: &'static str| {
        let log = Arc::clone(&log);
        move || log.lock().unwrap().push(tag)
    };

    let a = executor.silent_dependent_async(push("a"), &[]);
    let b = executor.silent_dependent_async(push("b"), &[a.clone()]);
    let c = executor.silent_dependent_async(push("c"), &[a.clone()]);
    let (d, future) = executor.dependent_async(push("d"), &[b.clone(), c.clone()]);

    future.get().unwrap();
    assert!(d.is_done());

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 4);
    assert_eq!(log[0], "a");
    assert_eq!(log[3], "d");
}

#[test]
fn finished_predecessor_contributes_no_edge() {
    let executor = Executor::new(2);

    let a = executor.silent_dependent_async(|| {}, &[]);
    while !a.is_done() {
        std::thread::sleep(Duration::from_millis(1));
    }

    let ran = Arc::new(AtomicBool::new(false));
    let b = {
        let ran = Arc::clone(&ran);
        executor.silent_dependent_async(
            move || ran.store(true, Ordering::SeqCst),
            &[a.clone()],
        )
    };
    executor.wait_for_all();
    assert!(b.is_done());
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn dependent_async_chain() {
    let executor = Executor::new(4);
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut previous = None;
    for i in 0..50usize {
        let log = Arc::clone(&log);
        let preds: Vec<_> = previous.take().into_iter().collect();
        previous = Some(executor.silent_dependent_async(
            move || log.lock().unwrap().push(i),
            &preds,
        ));
    }
    executor.wait_for_all();

    let log = log.lock().unwrap();
    assert!(log.iter().copied().eq(0..50));
}

#[test]
fn runtime_children_join_inside_the_task() {
    let executor = Executor::new(4);
    let mut flow = Flow::new();
    let inside = Arc::new(AtomicUsize::new(0));
    let joined = Arc::new(AtomicUsize::new(usize::MAX));

    {
        let inside = Arc::clone(&inside);
        let joined = Arc::clone(&joined);
        flow.emplace_runtime(move |rt| {
            for _ in 0..10 {
                let inside = Arc::clone(&inside);
                rt.silent_async(move || {
                    inside.fetch_add(1, Ordering::SeqCst);
                });
            }
            rt.join().unwrap();
            joined.store(inside.load(Ordering::SeqCst), Ordering::SeqCst);
        });
    }

    executor.run(&flow).get().unwrap();
    assert_eq!(joined.load(Ordering::SeqCst), 10);
}

#[test]
fn preemption_guard_defers_completion_to_children() {
    let executor = Executor::new(4);
    let mut flow = Flow::new();
    let children = Arc::new(AtomicUsize::new(0));
    let observed = Arc::new(AtomicUsize::new(usize::MAX));

    let parent = {
        let children = Arc::clone(&children);
        flow.emplace_runtime(move |rt| {
            let _guard = PreemptionGuard::new(rt);
            for _ in 0..16 {
                let children = Arc::clone(&children);
                rt.silent_async(move || {
                    children.fetch_add(1, Ordering::SeqCst);
                });
            }
        })
    };
    let after = {
        let children = Arc::clone(&children);
        let observed = Arc::clone(&observed);
        flow.emplace(move || observed.store(children.load(Ordering::SeqCst), Ordering::SeqCst))
    };
    parent.precede(&[&after]);

    executor.run(&flow).get().unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 16);
}

#[test]
fn resumable_async_task_is_reentered() {
    let executor = Executor::new(4);
    let spawned = Arc::new(AtomicUsize::new(0));
    let resumed = Arc::new(AtomicBool::new(false));

    {
        let spawned = Arc::clone(&spawned);
        let resumed = Arc::clone(&resumed);
        executor.silent_async_resumable(move |rt, is_first| {
            if is_first {
                let guard = PreemptionGuard::new(rt);
                for _ in 0..4 {
                    let spawned = Arc::clone(&spawned);
                    rt.silent_async(move || {
                        spawned.fetch_add(1, Ordering::SeqCst);
                    });
                }
                drop(guard);
            } else {
                resumed.store(true, Ordering::SeqCst);
            }
        });
    }

    executor.wait_for_all();
    assert_eq!(spawned.load(Ordering::SeqCst), 4);
    assert!(resumed.load(Ordering::SeqCst));
}

#[test]
fn corun_runs_a_flow_from_inside_a_task() {
    let executor = Executor::new(4);

    let inner_count = Arc::new(AtomicUsize::new(0));
    let mut inner = Flow::new();
    for _ in 0..8 {
        let inner_count = Arc::clone(&inner_count);
        inner.emplace(move || {
            inner_count.fetch_add(1, Ordering::SeqCst);
        });
    }
    let inner = Arc::new(inner);

    let mut outer = Flow::new();
    let observed = Arc::new(AtomicUsize::new(usize::MAX));
    {
        let inner = Arc::clone(&inner);
        let inner_count = Arc::clone(&inner_count);
        let observed = Arc::clone(&observed);
        outer.emplace_runtime(move |rt| {
            rt.corun(&inner).unwrap();
            observed.store(inner_count.load(Ordering::SeqCst), Ordering::SeqCst);
        });
    }

    executor.run(&outer).get().unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 8);
}

#[test]
fn corun_until_polls_external_state() {
    let executor = Executor::new(2);
    let mut flow = Flow::new();
    let released = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));

    {
        let released = Arc::clone(&released);
        let finished = Arc::clone(&finished);
        flow.emplace_runtime(move |rt| {
            rt.corun_until(|| released.load(Ordering::SeqCst)).unwrap();
            finished.store(true, Ordering::SeqCst);
        });
    }

    let future = executor.run(&flow);
    std::thread::sleep(Duration::from_millis(10));
    assert!(!finished.load(Ordering::SeqCst));
    released.store(true, Ordering::SeqCst);
    future.get().unwrap();
    assert!(finished.load(Ordering::SeqCst));
}

#[test]
fn resumable_with_immediate_children_completes_inline() {
    // Children may all finish before the guard drops; the task must then
    // complete without a resume pass.
    let executor = Executor::new(1);
    let done = Arc::new(AtomicBool::new(false));
    {
        let done = Arc::clone(&done);
        executor.silent_async_runtime(move |rt| {
            let _guard = PreemptionGuard::new(rt);
            done.store(true, Ordering::SeqCst);
        });
    }
    executor.wait_for_all();
    assert!(done.load(Ordering::SeqCst));
}
