//! End-to-end checks through the public API

use durable_ratelimit::{
    BucketStore, IdentityKey, InMemoryStore, LimitRequest, LimiterConfig, PersistMode, RateLimiter,
    Subject, TokioClock,
};
use std::sync::Arc;
use std::time::Duration;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn limiter(store: Arc<dyn BucketStore>, config: LimiterConfig) -> RateLimiter {
    RateLimiter::builder(store)
        .config(config)
        .clock(Arc::new(TokioClock::anchored_at(1_700_000_000_000)))
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_burst_exhaustion_and_refill() {
    let limiter = limiter(Arc::new(InMemoryStore::new()), LimiterConfig::default());
    let request = LimitRequest::new(5, "1m");

    for expected in (0..5).rev() {
        let decision = limiter.check("user-1", &request).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, expected);
    }

    let rejected = limiter.check("user-1", &request).await.unwrap();
    assert!(!rejected.allowed);
    assert_eq!(rejected.retry_after_ms, 12_000);

    tokio::time::advance(Duration::from_millis(12_000)).await;
    let refilled = limiter.check("user-1", &request).await.unwrap();
    assert!(refilled.allowed);
    assert_eq!(refilled.remaining, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cost_and_impossible_cost() {
    let limiter = limiter(Arc::new(InMemoryStore::new()), LimiterConfig::default());

    let decision = limiter
        .check("user-2", &LimitRequest::new(5, "1m").with_cost(2.0))
        .await
        .unwrap();
    assert_eq!(decision.remaining, 3);

    let impossible = limiter
        .check("user-2", &LimitRequest::new(5, "1m").with_cost(6.0))
        .await
        .unwrap();
    assert!(!impossible.allowed);
    assert!(impossible.is_impossible());
    assert_eq!(impossible.retry_after_ms, -1);

    // The impossible request consumed nothing.
    let decision = limiter.check("user-2", &LimitRequest::new(5, "1m")).await.unwrap();
    assert_eq!(decision.remaining, 2);
}

#[tokio::test(start_paused = true)]
async fn test_keys_are_isolated() {
    let limiter = limiter(Arc::new(InMemoryStore::new()), LimiterConfig::default());
    let request = LimitRequest::new(1, "1h");

    let alice = IdentityKey::new(&Subject::resolve(None, Some("alice")), "posts");
    let bob = IdentityKey::new(&Subject::resolve(None, Some("bob")), "posts");

    assert!(limiter.check(alice.as_str(), &request).await.unwrap().allowed);
    assert!(!limiter.check(alice.as_str(), &request).await.unwrap().allowed);
    assert!(limiter.check(bob.as_str(), &request).await.unwrap().allowed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_keys_admit_exactly_capacity() {
    let limiter = limiter(Arc::new(InMemoryStore::new()), LimiterConfig::default());
    let request = LimitRequest::new(3, "1h");

    let mut tasks = Vec::new();
    for key in 0..10 {
        for _ in 0..8 {
            let limiter = limiter.clone();
            let request = request.clone();
            tasks.push(tokio::spawn(async move {
                let decision = limiter.check(&format!("user-{key}:burst"), &request).await.unwrap();
                (key, decision.allowed)
            }));
        }
    }

    let mut admitted = [0usize; 10];
    for task in tasks {
        let (key, allowed) = task.await.unwrap();
        if allowed {
            admitted[key] += 1;
        }
    }
    assert_eq!(admitted, [3; 10]);
    assert_eq!(limiter.active_actors(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_state_survives_restart() {
    let store = Arc::new(InMemoryStore::new());
    let config = LimiterConfig {
        persist_mode: PersistMode::BeforeReply,
        ..LimiterConfig::default()
    };
    let request = LimitRequest::new(3, "1h");

    {
        let before = limiter(store.clone(), config.clone());
        for _ in 0..3 {
            assert!(before.check("user-3", &request).await.unwrap().allowed);
        }
    }

    let after = limiter(store, config);
    let decision = after.check("user-3", &request).await.unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.retry_after_ms, 20 * 60 * 1000);
}

#[tokio::test(start_paused = true)]
async fn test_idle_bucket_is_purged() {
    let store = Arc::new(InMemoryStore::new());
    let limiter = limiter(store.clone(), LimiterConfig::default());
    let request = LimitRequest::new(5, "1m");

    limiter.check("cleanup-1", &request).await.unwrap();
    assert_eq!(store.bucket_count(), 1);

    tokio::time::advance(7 * DAY + Duration::from_secs(1)).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.bucket_count(), 0);

    let handle = limiter.resolve("cleanup-1");
    assert!(!handle.run_alarm().await.unwrap());
    let decision = limiter.check("cleanup-1", &request).await.unwrap();
    assert_eq!(decision.remaining, 4);
}

#[tokio::test(start_paused = true)]
async fn test_recent_activity_rearms_alarm() {
    let store = Arc::new(InMemoryStore::new());
    let limiter = limiter(store.clone(), LimiterConfig::default());
    let request = LimitRequest::new(5, "1m");

    limiter.check("cleanup-2", &request).await.unwrap();
    tokio::time::advance(3 * DAY).await;
    limiter.check("cleanup-2", &request).await.unwrap();
    tokio::time::advance(5 * DAY).await;

    let handle = limiter.resolve("cleanup-2");
    assert!(handle.run_alarm().await.unwrap());
    assert!(!handle.is_stopped());
    assert_eq!(store.bucket_count(), 1);

    let decision = limiter.check("cleanup-2", &request).await.unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 4);
    assert_eq!(limiter.stats().alarms_rearmed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_yaml_policies() {
    let config = LimiterConfig::from_yaml_str(
        r#"
cleanup_interval: 1d
policies:
  uploads:
    capacity: 2
    interval: 10m
"#,
    )
    .unwrap();
    let limiter = limiter(Arc::new(InMemoryStore::new()), config);
    let subject = Subject::resolve(Some("192.0.2.10"), None);

    assert!(limiter.check_policy(&subject, "uploads").await.unwrap().allowed);
    assert!(limiter.check_policy(&subject, "uploads").await.unwrap().allowed);
    let rejected = limiter.check_policy(&subject, "uploads").await.unwrap();
    assert!(!rejected.allowed);
    assert_eq!(rejected.retry_after_ms, 5 * 60 * 1000);
}
