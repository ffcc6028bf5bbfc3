//! Dynamic expansion: subflows, nesting, and module composition.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use weft_runtime::{Executor, Flow};

#[test]
fn subflow_children_finish_before_successors() {
    let executor = Executor::new(4);
    let mut flow = Flow::new();

    let counter = Arc::new(AtomicUsize::new(0));
    let observed = Arc::new(AtomicUsize::new(usize::MAX));

    let s = {
        let counter = Arc::clone(&counter);
        flow.emplace_subflow(move |sf| {
            for _ in 0..100 {
                let counter = Arc::clone(&counter);
                sf.emplace(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        })
        .with_name("S")
    };
    let t = {
        let counter = Arc::clone(&counter);
        let observed = Arc::clone(&observed);
        flow.emplace(move || observed.store(counter.load(Ordering::SeqCst), Ordering::SeqCst))
            .with_name("T")
    };
    s.precede(&[&t]);

    executor.run(&flow).get().unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 100);
}

#[test]
fn subflow_children_respect_internal_edges() {
    let executor = Executor::new(4);
    let mut flow = Flow::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    {
        let order = Arc::clone(&order);
        flow.emplace_subflow(move |sf| {
            let order_a = Arc::clone(&order);
            let order_b = Arc::clone(&order);
            let a = sf.emplace(move || order_a.lock().unwrap().push('a'));
            let b = sf.emplace(move || order_b.lock().unwrap().push('b'));
            a.precede(&[&b]);
        });
    }

    executor.run(&flow).get().unwrap();
    assert_eq!(*order.lock().unwrap(), ['a', 'b']);
}

#[test]
fn nested_subflows_recurse() {
    let executor = Executor::new(4);
    let mut flow = Flow::new();
    let count = Arc::new(AtomicUsize::new(0));

    {
        let count = Arc::clone(&count);
        flow.emplace_subflow(move |outer| {
            for _ in 0..4 {
                let count = Arc::clone(&count);
                outer.emplace_subflow(move |inner| {
                    for _ in 0..8 {
                        let count = Arc::clone(&count);
                        inner.emplace(move || {
                            count.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                });
            }
        });
    }

    executor.run(&flow).get().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 32);
}

#[test]
fn empty_subflow_completes() {
    let executor = Executor::new(2);
    let mut flow = Flow::new();
    let after = Arc::new(AtomicBool::new(false));

    let s = flow.emplace_subflow(|_| {});
    let t = {
        let after = Arc::clone(&after);
        flow.emplace(move || after.store(true, Ordering::SeqCst))
    };
    s.precede(&[&t]);

    executor.run(&flow).get().unwrap();
    assert!(after.load(Ordering::SeqCst));
}

#[test]
fn subflow_rebuilds_on_each_run() {
    let executor = Executor::new(2);
    let mut flow = Flow::new();
    let count = Arc::new(AtomicUsize::new(0));

    {
        let count = Arc::clone(&count);
        flow.emplace_subflow(move |sf| {
            let count = Arc::clone(&count);
            sf.emplace(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        });
    }

    executor.run_n(&flow, 3).get().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[test]
fn module_runs_under_its_parent() {
    let executor = Executor::new(4);

    let shared = Arc::new(AtomicUsize::new(0));
    let mut library = Flow::named("library");
    for _ in 0..5 {
        let shared = Arc::clone(&shared);
        library.emplace(move || {
            shared.fetch_add(1, Ordering::SeqCst);
        });
    }

    let mut outer = Flow::named("outer");
    let before = outer.emplace(|| {});
    let module = outer.composed_of(&library).with_name("m");
    let observed = Arc::new(AtomicUsize::new(usize::MAX));
    let after = {
        let shared = Arc::clone(&shared);
        let observed = Arc::clone(&observed);
        outer.emplace(move || observed.store(shared.load(Ordering::SeqCst), Ordering::SeqCst))
    };
    before.precede(&[&module]);
    module.precede(&[&after]);

    executor.run(&outer).get().unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 5);
}

#[test]
fn sequential_modules_of_the_same_flow() {
    let executor = Executor::new(4);

    let shared = Arc::new(AtomicUsize::new(0));
    let mut library = Flow::new();
    {
        let shared = Arc::clone(&shared);
        library.emplace(move || {
            shared.fetch_add(1, Ordering::SeqCst);
        });
    }

    // Two module tasks over the same flow must be strictly ordered; the
    // second splice re-executes the library graph.
    let mut outer = Flow::new();
    let first = outer.composed_of(&library);
    let second = outer.composed_of(&library);
    first.precede(&[&second]);

    executor.run(&outer).get().unwrap();
    assert_eq!(shared.load(Ordering::SeqCst), 2);
}

#[test]
fn module_reruns_with_run_n() {
    let executor = Executor::new(2);

    let count = Arc::new(AtomicUsize::new(0));
    let mut library = Flow::new();
    {
        let count = Arc::clone(&count);
        library.emplace(move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
    }

    let mut outer = Flow::new();
    outer.composed_of(&library);

    executor.run_n(&outer, 4).get().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 4);
}

#[test]
fn module_of_empty_flow_completes() {
    let executor = Executor::new(2);
    let library = Flow::new();
    let mut outer = Flow::new();
    let done = Arc::new(AtomicBool::new(false));
    let module = outer.composed_of(&library);
    let after = {
        let done = Arc::clone(&done);
        outer.emplace(move || done.store(true, Ordering::SeqCst))
    };
    module.precede(&[&after]);

    executor.run(&outer).get().unwrap();
    assert!(done.load(Ordering::SeqCst));
}
