//! Integration tests for dependent tasks, waiting, resizing and shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use callq_core::QueueConfig;
use callq_queue::{CallbackQueue, FutureHandle, FutureStatus, QueueError};

#[test]
fn dependent_sees_prior_effects() {
    let queue = CallbackQueue::new(2).unwrap();
    let value = Arc::new(AtomicUsize::new(0));

    let v = Arc::clone(&value);
    let a = queue.push(move || {
        thread::sleep(Duration::from_millis(20));
        v.store(7, Ordering::SeqCst);
    });
    let v = Arc::clone(&value);
    let b = queue
        .push_dependent(&[a.into_handle()], move || v.load(Ordering::SeqCst) * 2)
        .unwrap();

    assert_eq!(queue.get(b).unwrap(), 14);
}

#[test]
fn diamond_respects_every_edge() {
    let queue = CallbackQueue::new(4).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    let step = |label: &'static str| {
        let order = Arc::clone(&order);
        move || order.lock().unwrap().push(label)
    };

    let top = queue.push(step("top")).into_handle();
    let left = queue.push_dependent(&[top.clone()], step("left")).unwrap().into_handle();
    let right = queue.push_dependent(&[top.clone()], step("right")).unwrap().into_handle();
    let bottom = queue.push_dependent(&[left, right], step("bottom")).unwrap();

    queue.wait(bottom.handle()).unwrap();
    let order = order.lock().unwrap();
    let pos = |label| order.iter().position(|l| *l == label).unwrap();
    assert_eq!(order.len(), 4);
    assert!(pos("top") < pos("left"));
    assert!(pos("top") < pos("right"));
    assert!(pos("left") < pos("bottom"));
    assert!(pos("right") < pos("bottom"));
}

#[test]
fn many_chains_complete_in_order() {
    let queue = CallbackQueue::new(4).unwrap();
    let chains = 16;
    let depth = 50;
    let logs: Vec<Arc<Mutex<Vec<usize>>>> =
        (0..chains).map(|_| Arc::new(Mutex::new(Vec::new()))).collect();

    let mut tails = Vec::new();
    for log in &logs {
        let mut prev: Option<FutureHandle> = None;
        for step in 0..depth {
            let log = Arc::clone(log);
            let job = move || log.lock().unwrap().push(step);
            let future = match prev.take() {
                Some(p) => queue.push_dependent(&[p], job).unwrap(),
                None => queue.push(job),
            };
            prev = Some(future.into_handle());
        }
        tails.extend(prev);
    }

    queue.wait_all(&tails).unwrap();
    for log in &logs {
        assert_eq!(*log.lock().unwrap(), (0..depth).collect::<Vec<_>>());
    }
}

#[test]
fn workers_blocked_in_wait_do_not_deadlock() {
    let queue = Arc::new(CallbackQueue::new(1).unwrap());
    let inner_queue = Arc::clone(&queue);
    // The only worker waits on a task queued behind it.
    let outer = queue.push(move || {
        let inner = inner_queue.push(|| 11);
        inner_queue.get(inner).unwrap() + 1
    });
    assert_eq!(queue.get(outer).unwrap(), 12);
}

#[test]
fn zero_workers_still_make_progress_through_wait() {
    let queue = CallbackQueue::new(0).unwrap();
    let a = queue.push(|| 2);
    let a_handle = a.handle().clone();
    let b = queue.push_dependent(&[a_handle], || 3).unwrap();

    assert_eq!(queue.get(b).unwrap(), 3);
    assert_eq!(a.status(), FutureStatus::Done);
    assert_eq!(queue.get(a).unwrap(), 2);
}

#[test]
fn panicking_task_reports_through_get() {
    let queue = CallbackQueue::new(2).unwrap();
    let future = queue.push(|| -> String { panic!("bad input {}", 4) });
    let err = queue.get(future).unwrap_err();
    assert!(matches!(err, QueueError::TaskPanicked { ref message, .. } if message == "bad input 4"));
}

#[test]
fn resize_under_load_loses_nothing() {
    let queue = CallbackQueue::new(2).unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for round in 0..6 {
        for _ in 0..200 {
            let done = Arc::clone(&done);
            handles.push(
                queue
                    .push(move || {
                        done.fetch_add(1, Ordering::SeqCst);
                    })
                    .into_handle(),
            );
        }
        queue.set_number_of_threads([6, 1, 3, 0, 8, 2][round]).unwrap();
    }

    queue.wait_all(&handles).unwrap();
    assert_eq!(done.load(Ordering::SeqCst), 1200);
    assert_eq!(queue.number_of_threads(), 2);
    assert_eq!(queue.stats().live_workers, 2);
}

#[test]
fn shrink_leaves_remaining_workers_indexed_from_zero() {
    let queue = Arc::new(CallbackQueue::new(4).unwrap());
    queue.set_number_of_threads(1).unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let q = Arc::clone(&queue);
            queue.push(move || q.current_worker_index())
        })
        .collect();
    for future in handles {
        // Either the single worker or this thread (claiming) ran it.
        let index = queue.get(future).unwrap();
        assert!(matches!(index, Some(0) | None));
    }
}

#[test]
fn queue_from_config_names_its_workers() {
    let config = QueueConfig {
        worker_threads: 2,
        thread_name_prefix: "plan".into(),
        stack_size: Some(256 * 1024),
    };
    let queue = CallbackQueue::with_config(config).unwrap();
    assert_eq!(queue.number_of_threads(), 2);

    let (tx, rx) = std::sync::mpsc::channel();
    let gate = queue.push(move || {
        let _ = rx.recv();
        thread::current().name().map(str::to_string)
    });
    while gate.status() != FutureStatus::Running {
        thread::yield_now();
    }
    tx.send(()).unwrap();
    let name = queue.get(gate).unwrap().unwrap();
    assert!(name.starts_with("plan-"), "unexpected thread name {name}");
}

#[test]
fn drop_finishes_running_and_discards_the_rest() {
    let ran = Arc::new(AtomicUsize::new(0));
    let queue = CallbackQueue::new(1).unwrap();

    let r = Arc::clone(&ran);
    let running = queue.push(move || {
        thread::sleep(Duration::from_millis(100));
        r.fetch_add(1, Ordering::SeqCst);
    });
    let r = Arc::clone(&ran);
    let queued = queue.push(move || {
        r.fetch_add(10, Ordering::SeqCst);
    });
    let r = Arc::clone(&ran);
    let held = queue
        .push_dependent(&[queued.handle().clone()], move || {
            r.fetch_add(100, Ordering::SeqCst);
        })
        .unwrap();

    while running.status() != FutureStatus::Running {
        thread::yield_now();
    }
    drop(queue);

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert!(running.is_ready());
    assert!(!queued.is_ready());
    assert_eq!(held.status(), FutureStatus::OnHold);
}
