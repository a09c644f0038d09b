//! `RedisQueue` against the server named by `REDIS_URL`.

use std::time::{Duration, Instant};

use roster::queue::{Queue, RedisQueue};

async fn test_queue() -> RedisQueue {
    let env_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(env_path);

    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/0".into());
    let prefix = format!("roster_test_{}", rand::random::<u32>());
    RedisQueue::connect(&url, &prefix)
        .await
        .expect("failed to connect to Redis")
}

#[tokio::test]
async fn zero_wait_returns_at_once_when_empty() {
    let queue = test_queue().await;

    let started = Instant::now();
    let empty = tokio::time::timeout(Duration::from_secs(2), queue.next("roles", Duration::ZERO))
        .await
        .expect("zero wait must not block");
    assert!(empty.unwrap().is_none());
    assert!(started.elapsed() < Duration::from_secs(1));

    queue.publish("roles", "a").await.unwrap();
    let d = queue.next("roles", Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(d.payload, "a");
    queue.ack(&d).await.unwrap();
}

#[tokio::test]
async fn blocking_polls_keep_working_across_reuse() {
    let queue = test_queue().await;

    for n in 0..3 {
        let payload = format!("m{n}");
        queue.publish("members", &payload).await.unwrap();
        let d = queue
            .next("members", Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(d.payload, payload);
        queue.ack(&d).await.unwrap();
    }

    assert!(queue
        .next("members", Duration::from_millis(100))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn requeued_delivery_comes_back() {
    let queue = test_queue().await;

    queue.publish("roles", "r").await.unwrap();
    let d = queue
        .next("roles", Duration::from_millis(500))
        .await
        .unwrap()
        .unwrap();
    queue.requeue(&d).await.unwrap();

    let again = queue
        .next("roles", Duration::from_millis(500))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again, d);
    queue.ack(&again).await.unwrap();
}
