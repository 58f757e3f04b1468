use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use token_lease::error::LeaseError;
use token_lease::scheduler::{LeaseScheduler, StaticSource, TokenSource};

const TIMEOUT: Duration = Duration::from_secs(60);

async fn scheduler_with(tokens: &[&str]) -> LeaseScheduler {
    let source = Arc::new(StaticSource::new(tokens.iter().copied()));
    let scheduler = LeaseScheduler::new(source, TIMEOUT);
    scheduler.rescan().await.unwrap();
    scheduler
}

/// Source whose listing can be swapped or made to fail between rescans.
struct FlakySource {
    tokens: std::sync::Mutex<Option<Vec<String>>>,
}

#[tonic::async_trait]
impl TokenSource for FlakySource {
    async fn scan(&self) -> std::io::Result<Vec<String>> {
        self.tokens
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "listing failed"))
    }
}

/// Source that answers each scan with the next scripted listing after a delay.
struct ScriptedSource {
    script: std::sync::Mutex<VecDeque<(Duration, Vec<String>)>>,
}

#[tonic::async_trait]
impl TokenSource for ScriptedSource {
    async fn scan(&self) -> std::io::Result<Vec<String>> {
        let (delay, tokens) = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("script exhausted");
        tokio::time::sleep(delay).await;
        Ok(tokens)
    }
}

#[tokio::test]
async fn test_batches_clamp_at_end_of_catalog() {
    let scheduler = scheduler_with(&["a", "b", "c", "d", "e"]).await;

    let batch = scheduler.get("job1", 2).await.unwrap();
    assert_eq!(batch.tokens, vec!["a", "b"]);
    assert_eq!(batch.lease_key.len(), 8);
    assert_eq!(scheduler.job_summary("job1").await.unwrap().cursor, 2);

    let batch = scheduler.get("job1", 2).await.unwrap();
    assert_eq!(batch.tokens, vec!["c", "d"]);
    assert_eq!(scheduler.job_summary("job1").await.unwrap().cursor, 4);

    let batch = scheduler.get("job1", 2).await.unwrap();
    assert_eq!(batch.tokens, vec!["e"]);
    assert_eq!(scheduler.job_summary("job1").await.unwrap().cursor, 5);

    let batch = scheduler.get("job1", 2).await.unwrap();
    assert!(batch.tokens.is_empty());
    assert!(batch.lease_key.is_empty());
}

#[tokio::test]
async fn test_assigned_ranges_cover_catalog_without_gaps() {
    let names: Vec<String> = (0..23).map(|i| format!("t{}", i)).collect();
    let source = Arc::new(StaticSource::new(names.clone()));

    for batch_size in [1usize, 4, 5, 23, 100] {
        let scheduler = LeaseScheduler::new(source.clone(), TIMEOUT);
        scheduler.rescan().await.unwrap();

        let mut seen = Vec::new();
        let mut keys = HashSet::new();
        let mut previous_cursor = 0;
        loop {
            let batch = scheduler.get("job", batch_size).await.unwrap();
            if batch.is_empty() {
                break;
            }
            let cursor = scheduler.job_summary("job").await.unwrap().cursor;
            assert_eq!(cursor - previous_cursor, batch_size.min(23 - previous_cursor));
            previous_cursor = cursor;

            assert!(keys.insert(batch.lease_key.clone()));
            seen.extend(batch.tokens);
        }
        assert_eq!(seen, names, "batch size {}", batch_size);
    }
}

#[tokio::test]
async fn test_jobs_have_independent_cursors() {
    let scheduler = scheduler_with(&["a", "b", "c"]).await;

    assert_eq!(scheduler.get("job1", 2).await.unwrap().tokens, vec!["a", "b"]);
    assert_eq!(scheduler.get("job2", 1).await.unwrap().tokens, vec!["a"]);
    assert_eq!(scheduler.get("job1", 2).await.unwrap().tokens, vec!["c"]);
    assert_eq!(scheduler.get("job2", 5).await.unwrap().tokens, vec!["b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_stale_lease_is_reassigned_under_same_key() {
    let scheduler = scheduler_with(&["a", "b", "c"]).await;

    let first = scheduler.get("job1", 2).await.unwrap();
    let second = scheduler.get("job1", 2).await.unwrap();
    assert_eq!(second.tokens, vec!["c"]);

    // Keep the second lease alive, let the first go silent
    tokio::time::advance(Duration::from_secs(40)).await;
    assert!(!scheduler.heartbeat("job1", &second.lease_key).await.unwrap());
    tokio::time::advance(Duration::from_secs(30)).await;

    let reissued = scheduler.get("job1", 2).await.unwrap();
    assert_eq!(reissued.tokens, first.tokens);
    assert_eq!(reissued.lease_key, first.lease_key);

    // Reassignment refreshes the heartbeat, so the lease is not handed out again
    let nothing = scheduler.get("job1", 2).await.unwrap();
    assert!(nothing.is_empty());

    let summary = scheduler.job_summary("job1").await.unwrap();
    assert_eq!(summary.cursor, 3);
    assert_eq!(summary.outstanding_leases, 2);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_lease_is_not_reassigned() {
    let scheduler = scheduler_with(&["a", "b"]).await;

    scheduler.get("job1", 2).await.unwrap();
    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(scheduler.get("job1", 2).await.unwrap().is_empty());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(scheduler.get("job1", 2).await.unwrap().tokens, vec!["a", "b"]);
}

#[tokio::test]
async fn test_done_is_accepted_once() {
    let scheduler = scheduler_with(&["a", "b"]).await;
    let batch = scheduler.get("job1", 2).await.unwrap();

    assert!(scheduler.done("job1", &batch.lease_key).await);
    assert!(!scheduler.done("job1", &batch.lease_key).await);
    assert!(!scheduler.done("job1", "nosuchky").await);
    assert!(!scheduler.done("ghost", &batch.lease_key).await);
}

#[tokio::test]
async fn test_completion_follows_lease_drain() {
    let scheduler = scheduler_with(&["a", "b", "c", "d"]).await;

    let first = scheduler.get("job1", 2).await.unwrap();
    assert!(!scheduler.heartbeat("job1", &first.lease_key).await.unwrap());

    assert!(scheduler.done("job1", &first.lease_key).await);
    let summary = scheduler.job_summary("job1").await.unwrap();
    assert!(summary.completed);
    assert!(summary.completed_at.is_some());
    assert!(summary.duration_ms.is_some());

    // Heartbeat on the removed key: known job, unknown key
    assert!(scheduler.heartbeat("job1", &first.lease_key).await.unwrap());

    let second = scheduler.get("job1", 2).await.unwrap();
    assert!(!scheduler.job_summary("job1").await.unwrap().completed);

    let third = scheduler.get("job1", 2).await.unwrap();
    assert!(third.is_empty());

    assert!(scheduler.done("job1", &second.lease_key).await);
    assert!(scheduler.job_summary("job1").await.unwrap().completed);
}

#[tokio::test]
async fn test_completion_needs_every_lease_released() {
    let scheduler = scheduler_with(&["a", "b", "c", "d"]).await;

    let first = scheduler.get("job1", 2).await.unwrap();
    let second = scheduler.get("job1", 2).await.unwrap();

    assert!(scheduler.done("job1", &second.lease_key).await);
    assert!(!scheduler.heartbeat("job1", &first.lease_key).await.unwrap());

    assert!(scheduler.done("job1", &first.lease_key).await);
    assert!(scheduler.heartbeat("job1", &first.lease_key).await.unwrap());
}

#[tokio::test]
async fn test_heartbeat_unknown_job_is_not_found() {
    let scheduler = scheduler_with(&["a"]).await;
    let err = scheduler.heartbeat("ghost", "abcdefgh").await.unwrap_err();
    assert!(matches!(err, LeaseError::JobNotFound(ref id) if id == "ghost"));
    assert!(scheduler.job_summary("ghost").await.is_none());
}

#[tokio::test]
async fn test_shuffle_preserves_tokens() {
    let names: Vec<String> = (0..200).map(|i| format!("f{:03}", i)).collect();
    let scheduler = LeaseScheduler::new(Arc::new(StaticSource::new(names.clone())), TIMEOUT);
    scheduler.rescan().await.unwrap();

    assert_eq!(scheduler.shuffle().await, 200);
    let shuffled = scheduler.show().await;
    assert_eq!(shuffled.len(), 200);

    let mut sorted = shuffled.clone();
    sorted.sort();
    assert_eq!(sorted, names);
    assert_ne!(shuffled, names, "200 tokens should not shuffle into identity");
}

#[tokio::test]
async fn test_shuffle_keeps_outstanding_ranges() {
    let names: Vec<String> = (0..50).map(|i| format!("f{:02}", i)).collect();
    let scheduler = LeaseScheduler::new(Arc::new(StaticSource::new(names)), TIMEOUT);
    scheduler.rescan().await.unwrap();

    let batch = scheduler.get("job1", 10).await.unwrap();
    scheduler.shuffle().await;

    let summary = scheduler.job_summary("job1").await.unwrap();
    assert_eq!(summary.cursor, 10);
    assert_eq!(summary.outstanding_leases, 1);
    assert!(scheduler.done("job1", &batch.lease_key).await);
}

#[tokio::test]
async fn test_reset_keeps_catalog() {
    let scheduler = scheduler_with(&["a", "b", "c"]).await;
    scheduler.get("job1", 2).await.unwrap();
    scheduler.get("job2", 1).await.unwrap();

    assert_eq!(scheduler.reset().await, 3);
    assert!(scheduler.job_summaries().await.is_empty());
    assert_eq!(scheduler.show().await, vec!["a", "b", "c"]);

    // The job starts over from the beginning
    assert_eq!(scheduler.get("job1", 2).await.unwrap().tokens, vec!["a", "b"]);
}

#[tokio::test]
async fn test_rescan_replaces_catalog_and_clears_jobs() {
    let source = Arc::new(FlakySource {
        tokens: std::sync::Mutex::new(Some(vec!["a".to_string(), "b".to_string()])),
    });
    let scheduler = LeaseScheduler::new(source.clone(), TIMEOUT);
    assert_eq!(scheduler.rescan().await.unwrap(), 2);
    scheduler.get("job1", 1).await.unwrap();

    *source.tokens.lock().unwrap() = Some(vec!["x".into(), "y".into(), "z".into()]);
    assert_eq!(scheduler.rescan().await.unwrap(), 3);
    assert_eq!(scheduler.show().await, vec!["x", "y", "z"]);
    assert!(scheduler.job_summary("job1").await.is_none());
}

#[tokio::test]
async fn test_failed_rescan_leaves_state_intact() {
    let source = Arc::new(FlakySource {
        tokens: std::sync::Mutex::new(Some(vec!["a".to_string(), "b".to_string()])),
    });
    let scheduler = LeaseScheduler::new(source.clone(), TIMEOUT);
    scheduler.rescan().await.unwrap();
    let batch = scheduler.get("job1", 1).await.unwrap();

    *source.tokens.lock().unwrap() = None;
    let err = scheduler.rescan().await.unwrap_err();
    assert!(matches!(err, LeaseError::Io(_)));

    assert_eq!(scheduler.show().await, vec!["a", "b"]);
    assert_eq!(scheduler.job_summary("job1").await.unwrap().cursor, 1);
    assert!(scheduler.done("job1", &batch.lease_key).await);
}

#[tokio::test]
async fn test_overlapping_rescans_install_in_call_order() {
    let source = Arc::new(ScriptedSource {
        script: std::sync::Mutex::new(VecDeque::from([
            (Duration::from_millis(200), vec!["old".to_string()]),
            (Duration::ZERO, vec!["new".to_string()]),
        ])),
    });
    let scheduler = Arc::new(LeaseScheduler::new(source, TIMEOUT));

    let slow = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.rescan().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let fast = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.rescan().await })
    };

    assert_eq!(fast.await.unwrap().unwrap(), 1);
    assert_eq!(scheduler.show().await, vec!["new"]);
    let batch = scheduler.get("job1", 1).await.unwrap();
    assert_eq!(batch.tokens, vec!["new"]);

    assert_eq!(slow.await.unwrap().unwrap(), 1);
    assert_eq!(scheduler.show().await, vec!["new"]);
    assert_eq!(scheduler.job_summary("job1").await.unwrap().cursor, 1);
}

#[tokio::test]
async fn test_empty_catalog_hands_out_nothing() {
    let scheduler = LeaseScheduler::new(Arc::new(StaticSource::new(Vec::<String>::new())), TIMEOUT);
    assert_eq!(scheduler.rescan().await.unwrap(), 0);

    let batch = scheduler.get("job1", 10).await.unwrap();
    assert!(batch.is_empty());
    let summary = scheduler.job_summary("job1").await.unwrap();
    assert_eq!(summary.cursor, 0);
    assert!(!summary.completed);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_evicts_by_start_time() {
    let scheduler = scheduler_with(&["a", "b", "c"]).await;
    let old = scheduler.get("old", 1).await.unwrap();

    tokio::time::advance(Duration::from_secs(3600)).await;
    scheduler.get("young", 1).await.unwrap();
    // Activity does not protect a job from retention
    scheduler.heartbeat("old", &old.lease_key).await.unwrap();

    tokio::time::advance(Duration::from_secs(1800)).await;
    assert_eq!(scheduler.sweep(Duration::from_secs(5000)).await, 1);

    let remaining: Vec<String> = scheduler
        .job_summaries()
        .await
        .into_iter()
        .map(|s| s.job_id)
        .collect();
    assert_eq!(remaining, vec!["young"]);
}

#[tokio::test]
async fn test_concurrent_workers_never_share_fresh_tokens() {
    let names: Vec<String> = (0..500).map(|i| format!("t{:03}", i)).collect();
    let scheduler = Arc::new(LeaseScheduler::new(
        Arc::new(StaticSource::new(names.clone())),
        TIMEOUT,
    ));
    scheduler.rescan().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let scheduler = scheduler.clone();
        handles.push(tokio::spawn(async move {
            let mut mine = Vec::new();
            loop {
                let batch = scheduler.get("shared", 7).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                assert!(scheduler.done("shared", &batch.lease_key).await);
                mine.extend(batch.tokens);
            }
            mine
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all.sort();
    assert_eq!(all, names);
    assert!(scheduler.job_summary("shared").await.unwrap().completed);
}
