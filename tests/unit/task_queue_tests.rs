//! Unit tests for the sequential task queue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_supervisor::supervisor::queue::TaskQueue;

#[tokio::test]
async fn jobs_run_in_submission_order() {
    let (queue, worker) = TaskQueue::spawn("test");
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..20u32 {
        let seen = Arc::clone(&seen);
        // Earlier jobs sleep longer; order must still hold.
        queue
            .submit(async move {
                tokio::time::sleep(Duration::from_millis(u64::from(20 - i))).await;
                seen.lock().unwrap().push(i);
            })
            .await
            .expect("submit");
    }

    drop(queue);
    worker.await.expect("worker");
    assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn closure_jobs_run() {
    let (queue, worker) = TaskQueue::spawn("test");
    let seen = Arc::new(Mutex::new(false));

    let flag = Arc::clone(&seen);
    queue
        .submit_fn(move || *flag.lock().unwrap() = true)
        .await
        .expect("submit");

    drop(queue);
    worker.await.expect("worker");
    assert!(*seen.lock().unwrap());
}

#[tokio::test]
async fn submit_after_worker_stops_fails() {
    let (queue, worker) = TaskQueue::spawn("test");
    worker.abort();
    let _ = worker.await;

    let err = queue.submit_fn(|| {}).await.unwrap_err();
    assert!(err.to_string().starts_with("queue:"));
}

#[tokio::test]
async fn panicking_job_does_not_stop_the_worker() {
    let (queue, worker) = TaskQueue::spawn("test");
    let seen = Arc::new(Mutex::new(Vec::new()));

    let before = Arc::clone(&seen);
    queue
        .submit_fn(move || before.lock().unwrap().push("before"))
        .await
        .expect("submit");
    queue
        .submit_fn(|| panic!("observer bug"))
        .await
        .expect("submit panicking job");
    let after = Arc::clone(&seen);
    queue
        .submit_fn(move || after.lock().unwrap().push("after"))
        .await
        .expect("queue still accepts jobs");

    drop(queue);
    worker.await.expect("worker survives the panic");
    assert_eq!(*seen.lock().unwrap(), vec!["before", "after"]);
}
