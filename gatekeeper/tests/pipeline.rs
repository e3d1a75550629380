mod support;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use db::{Store, models::usage::Outcome};
use gatekeeper::{
    Handled,
    pipeline::{CLIENT_CLOSED, INTERNAL_ERROR},
};
use limiter::{RateDecision, RateLimiter};
use uuid::Uuid;

use common::{
    error::{AppError, Res},
    reject::{RejectReason, Rejection},
};

use support::{Options, harness, harness_with};

fn reason_of<T: std::fmt::Debug>(result: Result<T, Rejection>) -> RejectReason {
    result.unwrap_err().reason
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn quota_admits_exactly_the_limit_under_concurrency() {
    let h = harness(5, 1000).await;
    let key = h.issue(&[]).await;

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let gatekeeper = h.gatekeeper.clone();
        let token = key.key.clone();
        tasks.push(tokio::spawn(async move {
            gatekeeper.authenticate(&token, "weather").await.unwrap()
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }

    let sixth = h.gatekeeper.authenticate(&key.key, "weather").await.unwrap();
    let rejection = sixth.unwrap_err();
    assert_eq!(rejection.reason, RejectReason::QuotaExceeded);
    assert!(rejection.retry_after_secs.is_some());
    assert_eq!(h.usage_count().await, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tenfold_burst_never_overshoots_quota() {
    let h = harness(5, 1000).await;
    let key = h.issue(&[]).await;

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let gatekeeper = h.gatekeeper.clone();
        let token = key.key.clone();
        tasks.push(tokio::spawn(async move {
            gatekeeper.authenticate(&token, "weather").await.unwrap()
        }));
    }

    let mut admitted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(rejection) => assert_eq!(rejection.reason, RejectReason::QuotaExceeded),
        }
    }
    assert_eq!(admitted, 5);
    assert_eq!(h.usage_count().await, 5);
}

#[tokio::test]
async fn rate_limit_applies_per_window() {
    let h = harness(1000, 3).await;
    let key = h.issue(&[]).await;
    let now = Utc::now();

    for _ in 0..3 {
        assert!(
            h.gatekeeper
                .authenticate_at(&key.key, "weather", now)
                .await
                .unwrap()
                .is_ok()
        );
    }

    let fourth = h
        .gatekeeper
        .authenticate_at(&key.key, "weather", now)
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(fourth.reason, RejectReason::RateLimited);
    assert!(fourth.retry_after_secs.unwrap() <= 60);

    let later = now + chrono::Duration::seconds(61);
    assert!(
        h.gatekeeper
            .authenticate_at(&key.key, "weather", later)
            .await
            .unwrap()
            .is_ok()
    );
}

#[tokio::test]
async fn rate_limited_calls_do_not_touch_quota() {
    let h = harness(100, 2).await;
    let key = h.issue(&[]).await;
    let now = Utc::now();

    let mut admitted = 0;
    for _ in 0..5 {
        if h.gatekeeper
            .authenticate_at(&key.key, "weather", now)
            .await
            .unwrap()
            .is_ok()
        {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 2);
    assert_eq!(h.usage_count().await, 2);
}

#[tokio::test]
async fn key_scope_blocks_other_services() {
    let h = harness(100, 100).await;
    let key = h.issue(&["weather"]).await;

    let result = h.gatekeeper.authenticate(&key.key, "currency").await.unwrap();
    assert_eq!(reason_of(result), RejectReason::ServiceNotAllowed);
    assert!(h.gatekeeper.authenticate(&key.key, "weather").await.unwrap().is_ok());
}

#[tokio::test]
async fn plan_scope_blocks_other_services() {
    let h = harness_with(Options {
        plan_services: vec!["currency".to_string()],
        ..Default::default()
    })
    .await;
    let key = h.issue(&[]).await;

    let result = h.gatekeeper.authenticate(&key.key, "weather").await.unwrap();
    assert_eq!(reason_of(result), RejectReason::ServiceNotAllowed);
}

#[tokio::test]
async fn revoked_key_is_rejected_before_any_counter() {
    let h = harness(100, 100).await;
    let key = h.issue(&[]).await;
    h.store.revoke_key(key.id).await.unwrap();

    let result = h.gatekeeper.authenticate(&key.key, "weather").await.unwrap();
    assert_eq!(reason_of(result), RejectReason::KeyInactive);
    assert_eq!(h.usage_count().await, 0);

    // no path back to active
    let again = h.gatekeeper.authenticate(&key.key, "weather").await.unwrap();
    assert_eq!(reason_of(again), RejectReason::KeyInactive);
}

#[tokio::test]
async fn credential_failures_look_alike() {
    let h = harness(100, 100).await;
    let key = h.issue(&[]).await;
    let wrong_secret = format!("{}.{}", key.prefix, "x".repeat(32));

    let unknown = reason_of(
        h.gatekeeper
            .authenticate("zzzz9999.secretsecret", "weather")
            .await
            .unwrap(),
    );
    let invalid = reason_of(h.gatekeeper.authenticate(&wrong_secret, "weather").await.unwrap());
    assert_eq!(unknown.code(), invalid.code());
    assert_eq!(unknown.status(), invalid.status());

    let malformed = reason_of(h.gatekeeper.authenticate("no-dot-here", "weather").await.unwrap());
    assert_eq!(malformed, RejectReason::MalformedCredential);
}

#[tokio::test]
async fn verifying_twice_gives_the_same_answer() {
    let h = harness(100, 100).await;
    let key = h.issue(&[]).await;

    let first = h.gatekeeper.authenticate(&key.key, "weather").await.unwrap().unwrap();
    let second = h.gatekeeper.authenticate(&key.key, "weather").await.unwrap().unwrap();
    assert_eq!(first.key_id, second.key_id);
    assert_eq!(second.usage_count, first.usage_count + 1);
}

#[tokio::test]
async fn suspended_owner_is_rejected() {
    let h = harness(100, 100).await;
    let key = h.issue(&[]).await;
    h.store.set_user_active(h.user_id, false).await.unwrap();

    let result = h.gatekeeper.authenticate(&key.key, "weather").await.unwrap();
    assert_eq!(reason_of(result), RejectReason::AccountSuspended);
}

#[tokio::test]
async fn successful_call_is_recorded_durably() {
    let h = harness(100, 100).await;
    let key = h.issue(&[]).await;

    let handled = h
        .gatekeeper
        .handle(&key.key, "weather", |_| async { Ok::<_, String>("sunny") })
        .await
        .unwrap();
    assert!(matches!(handled, Handled::Completed("sunny")));

    // written before `handle` returned, no waiting on the background writer
    let events = h.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, Outcome::Success);
    assert_eq!(events[0].key_id, Some(key.id));
}

#[tokio::test]
async fn downstream_failure_keeps_the_charge() {
    let h = harness(100, 100).await;
    let key = h.issue(&[]).await;

    let handled = h
        .gatekeeper
        .handle(&key.key, "weather", |_| async {
            Err::<(), _>("upstream exploded".to_string())
        })
        .await
        .unwrap();
    assert!(matches!(handled, Handled::Failed(ref e) if e == "upstream exploded"));
    assert_eq!(h.usage_count().await, 1);

    let events = h.events().await;
    assert_eq!(events[0].outcome, Outcome::Failure);
    assert_eq!(events[0].reason.as_deref(), Some("downstream_error"));
}

#[tokio::test]
async fn slow_downstream_times_out_and_stays_charged() {
    let h = harness_with(Options {
        downstream_timeout: Duration::from_millis(20),
        ..Default::default()
    })
    .await;
    let key = h.issue(&[]).await;

    let handled = h
        .gatekeeper
        .handle(&key.key, "weather", |_| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, String>(())
        })
        .await
        .unwrap();
    match handled {
        Handled::Rejected(rejection) => {
            assert_eq!(rejection.reason, RejectReason::DownstreamTimeout)
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
    assert_eq!(h.usage_count().await, 1);

    let events = h.events().await;
    assert_eq!(events[0].reason.as_deref(), Some("downstream_timeout"));
}

#[tokio::test]
async fn abandoned_call_is_still_recorded() {
    let h = harness(100, 100).await;
    let key = h.issue(&[]).await;

    let (started_tx, started_rx) = tokio::sync::oneshot::channel();
    let call = h.gatekeeper.handle(&key.key, "weather", move |_| async move {
        let _ = started_tx.send(());
        std::future::pending::<Result<(), String>>().await
    });

    // the caller goes away once the downstream call is under way
    tokio::select! {
        _ = call => panic!("the downstream call never finishes"),
        _ = started_rx => {}
    }
    assert_eq!(h.usage_count().await, 1);

    let events = h.wait_for_events(1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, Outcome::Failure);
    assert_eq!(events[0].reason.as_deref(), Some(CLIENT_CLOSED));
    assert_eq!(events[0].key_id, Some(key.id));
}

#[tokio::test]
async fn completed_call_is_recorded_once() {
    let h = harness(100, 100).await;
    let key = h.issue(&[]).await;

    h.gatekeeper
        .handle(&key.key, "weather", |_| async { Ok::<_, String>(()) })
        .await
        .unwrap();

    // nothing left behind for a dropped guard to write
    tokio::time::sleep(Duration::from_millis(50)).await;
    let events = h.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, Outcome::Success);
}

#[tokio::test]
async fn rejections_are_recorded_in_the_background() {
    let h = harness(100, 100).await;
    let key = h.issue(&["weather"]).await;

    let _ = h.gatekeeper.authenticate("garbage", "weather").await.unwrap();
    let _ = h.gatekeeper.authenticate(&key.key, "currency").await.unwrap();

    let events = h.wait_for_events(2).await;
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|event| event.outcome == Outcome::Rejected));

    let scoped = events
        .iter()
        .find(|event| event.reason.as_deref() == Some("service_not_allowed"))
        .unwrap();
    assert_eq!(scoped.key_id, Some(key.id));
    assert_eq!(scoped.user_id, Some(h.user_id));

    let malformed = events
        .iter()
        .find(|event| event.reason.as_deref() == Some("malformed_credential"))
        .unwrap();
    assert_eq!(malformed.key_id, None);
}

struct BrokenLimiter;

#[async_trait]
impl RateLimiter for BrokenLimiter {
    async fn check(&self, _: Uuid, _: u32, _: chrono::DateTime<Utc>) -> Res<RateDecision> {
        Err(AppError::Unavailable("rate backend down".to_string()))
    }
}

#[tokio::test]
async fn backend_failure_fails_closed() {
    let h = harness_with(Options {
        rate_limiter: Some(Arc::new(BrokenLimiter)),
        ..Default::default()
    })
    .await;
    let key = h.issue(&[]).await;

    let err = h
        .gatekeeper
        .authenticate(&key.key, "weather")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unavailable(_)));
    assert_eq!(err.to_http_response().status(), 503);
    assert_eq!(h.usage_count().await, 0);

    let events = h.wait_for_events(1).await;
    assert_eq!(events[0].outcome, Outcome::Failure);
    assert_eq!(events[0].reason.as_deref(), Some(INTERNAL_ERROR));
}
