//! Sequence lane ordering and parallelism.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stepbatch_domain::{
    BatchExecutor, BatchOutcome, BatchQuery, BatchResult, RequestDescriptor, ResultCache,
    ResultCacheConfig,
};
use stepbatch_server::Scheduler;
use tokio::sync::Notify;

use common::{geo_scheduler, lookup};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_preparations_are_serialized_in_arrival_order() {
    // Arrange - the first submitter holds the lane until every other
    // submitter is queued behind it
    let (executor, scheduler) = geo_scheduler(&[]);
    let scheduler = Arc::new(scheduler);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let prepared = Arc::new(Mutex::new(Vec::new()));
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let mut gate = Some(release_rx);
    let ips: Vec<String> = (1..=20).map(|i| format!("192.0.2.{i}")).collect();

    // Act
    let mut tasks = Vec::new();
    for ip in &ips {
        let scheduler = Arc::clone(&scheduler);
        let in_flight = Arc::clone(&in_flight);
        let max_in_flight = Arc::clone(&max_in_flight);
        let prepared = Arc::clone(&prepared);
        let gate = gate.take();
        let ip = ip.clone();
        tasks.push(tokio::spawn(async move {
            let (descriptor, query) = lookup(&ip);
            scheduler
                .submit(descriptor, move || {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);
                    match gate {
                        Some(gate) => {
                            let _ = gate.recv();
                        }
                        None => std::thread::sleep(Duration::from_millis(1)),
                    }
                    prepared.lock().unwrap().push(ip);
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    query()
                })
                .await
                .unwrap()
        }));
        // Give this submitter time to queue on the lane before the next one
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    release_tx.send(()).unwrap();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }
    scheduler.flush_step().await;

    // Assert
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(*prepared.lock().unwrap(), ips);
    assert_eq!(executor.calls(), vec![ips]);
    for handle in handles {
        assert!(handle.await.is_err(), "addresses are not in the table");
    }
}

/// Executor where the "slow" lane waits until the "fast" lane has executed.
struct HandshakeExecutor {
    fast_done: Notify,
}

#[async_trait]
impl BatchExecutor for HandshakeExecutor {
    type Identity = String;
    type Query = ();
    type Value = String;

    async fn execute(
        &self,
        queries: Vec<BatchQuery<String, ()>>,
    ) -> BatchResult<BatchOutcome<String, String>> {
        let slow = queries.iter().any(|q| q.identity.starts_with("slow"));
        if slow {
            self.fast_done.notified().await;
        } else {
            self.fast_done.notify_one();
        }
        Ok(queries
            .into_iter()
            .map(|q| (q.identity.clone(), Ok(q.identity)))
            .collect::<HashMap<_, _>>())
    }
}

#[tokio::test]
async fn test_different_groups_execute_in_parallel() {
    // Arrange
    let executor = Arc::new(HandshakeExecutor {
        fast_done: Notify::new(),
    });
    let cache = Arc::new(ResultCache::new(ResultCacheConfig::default()));
    let scheduler = Scheduler::new(executor, cache);

    let slow = scheduler
        .submit(RequestDescriptor::read("slow".to_string(), "A", "lane-slow"), || ())
        .await
        .unwrap();
    let fast = scheduler
        .submit(RequestDescriptor::read("fast".to_string(), "B", "lane-fast"), || ())
        .await
        .unwrap();

    // Act - a sequential flush of lanes would never finish
    let report = tokio::time::timeout(Duration::from_secs(5), scheduler.flush_step())
        .await
        .expect("lanes should flush concurrently");

    // Assert
    assert_eq!(report.batches, 2);
    assert_eq!(slow.await.unwrap(), "slow");
    assert_eq!(fast.await.unwrap(), "fast");
}

#[tokio::test]
async fn test_steps_never_overlap() {
    // Arrange
    let (executor, scheduler) = geo_scheduler(&[("1.1.1.1", "AU")]);
    let scheduler = Arc::new(scheduler);

    // Act - flush from two tasks at once
    let (descriptor, query) = lookup("1.1.1.1");
    let handle = scheduler.submit(descriptor, query).await.unwrap();
    let first = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.flush_step().await }
    });
    let second = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.flush_step().await }
    });
    let mut steps = vec![first.await.unwrap().step, second.await.unwrap().step];
    steps.sort_unstable();

    // Assert
    assert_eq!(steps, vec![0, 1]);
    assert_eq!(handle.await.unwrap().country, "AU");
    assert_eq!(executor.call_count(), 1);
}
