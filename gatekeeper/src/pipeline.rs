use std::{future::Future, sync::Arc, time::Duration};

use api_keys::CredentialVerifier;
use api_subs::AuthorizationResolver;
use chrono::{DateTime, Utc};
use common::{
    error::{AppError, Res},
    reject::{RejectReason, Rejection},
};
use db::models::usage::{Outcome, UsageEvent};
use limiter::{QuotaDecision, QuotaLedger, RateDecision, RateLimiter};
use logger::UsageRecorder;
use uuid::Uuid;

/// Reason code stored on events for requests that died on a storage failure.
pub const INTERNAL_ERROR: &str = "internal_error";

/// Reason code for admitted calls the caller abandoned before they finished.
pub const CLIENT_CLOSED: &str = "client_closed";

/// Where a request is in the pipeline. Any failure jumps to `Rejected`,
/// and every request ends in `Recorded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Verified,
    Authorized,
    RateChecked,
    QuotaChecked,
    Forwarded,
    Rejected,
    Recorded,
}

/// A request that passed every gate. Its quota charge is already committed.
#[derive(Debug, Clone)]
pub struct Admission {
    pub key_id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub endpoint: String,
    /// Calls charged in the current cycle, this one included.
    pub usage_count: i64,
    pub monthly_limit: i64,
    pub reset_at: DateTime<Utc>,
    pub rate_remaining: u32,
    pub admitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownstreamOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

impl DownstreamOutcome {
    fn event_fields(&self) -> (Outcome, Option<RejectReason>) {
        match self {
            DownstreamOutcome::Succeeded => (Outcome::Success, None),
            DownstreamOutcome::Failed => (Outcome::Failure, Some(RejectReason::DownstreamError)),
            DownstreamOutcome::TimedOut => {
                (Outcome::Failure, Some(RejectReason::DownstreamTimeout))
            }
        }
    }
}

/// Result of running a call through the whole pipeline.
#[derive(Debug)]
pub enum Handled<T, E> {
    /// Admitted and the downstream call succeeded.
    Completed(T),
    /// Admitted, but the downstream call failed. Its error is passed through.
    Failed(E),
    /// Refused by a gate, or the downstream call ran out of time.
    Rejected(Rejection),
}

/// What the pipeline knows about the caller so far; used to attribute
/// rejection events.
struct Trace {
    stage: Stage,
    key_id: Option<Uuid>,
    user_id: Option<Uuid>,
}

impl Trace {
    fn advance(&mut self, stage: Stage) {
        log::debug!("{:?} -> {:?} (key {:?})", self.stage, stage, self.key_id);
        self.stage = stage;
    }
}

/// An admitted call whose usage event is still owed.
///
/// Dropped unfinished (the caller went away mid-call), it still writes the
/// event as a `client_closed` failure from a spawned task.
struct InFlight {
    recorder: UsageRecorder,
    trace: Trace,
    event: Option<UsageEvent>,
}

impl InFlight {
    fn new(recorder: UsageRecorder, admission: &Admission) -> Self {
        let mut trace = Trace {
            stage: Stage::QuotaChecked,
            key_id: Some(admission.key_id),
            user_id: Some(admission.user_id),
        };
        trace.advance(Stage::Forwarded);
        let event = event(
            &trace,
            &admission.endpoint,
            Utc::now(),
            Outcome::Failure,
            Some(CLIENT_CLOSED),
        );
        Self {
            recorder,
            trace,
            event: Some(event),
        }
    }

    async fn finish(mut self, outcome: DownstreamOutcome) -> Res<()> {
        let Some(pending) = self.event.as_ref() else {
            return Ok(());
        };
        let (event_outcome, reason) = outcome.event_fields();
        let event = UsageEvent {
            timestamp: Utc::now(),
            outcome: event_outcome,
            reason: reason.map(|reason| reason.code().to_string()),
            ..pending.clone()
        };
        let endpoint = event.endpoint.clone();

        let written = self.recorder.record(event).await;
        self.event = None;
        written.map_err(|e| {
            log::error!("Failed to record admitted call {}: {}", endpoint, e);
            AppError::Unavailable(format!("Usage store unavailable: {}", e))
        })?;
        self.trace.advance(Stage::Recorded);
        Ok(())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let Some(event) = self.event.take() else {
            return;
        };
        log::warn!(
            "Caller left {} at {:?} (key {:?}), recording it as {}",
            event.endpoint,
            self.trace.stage,
            self.trace.key_id,
            CLIENT_CLOSED
        );
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let recorder = self.recorder.clone();
                runtime.spawn(async move {
                    let endpoint = event.endpoint.clone();
                    if let Err(e) = recorder.record(event).await {
                        log::error!("Failed to record abandoned call {}: {}", endpoint, e);
                    }
                });
            }
            Err(_) => self.recorder.record_best_effort(event),
        }
    }
}

/// Single entry point for protected calls: verify, authorize, rate check,
/// charge quota, forward, record.
pub struct Gatekeeper {
    verifier: CredentialVerifier,
    resolver: AuthorizationResolver,
    rate_limiter: Arc<dyn RateLimiter>,
    quota: QuotaLedger,
    recorder: UsageRecorder,
    downstream_timeout: Duration,
}

impl Gatekeeper {
    pub fn new(
        verifier: CredentialVerifier,
        resolver: AuthorizationResolver,
        rate_limiter: Arc<dyn RateLimiter>,
        quota: QuotaLedger,
        recorder: UsageRecorder,
        downstream_timeout: Duration,
    ) -> Self {
        Self {
            verifier,
            resolver,
            rate_limiter,
            quota,
            recorder,
            downstream_timeout,
        }
    }

    pub async fn authenticate(&self, token: &str, endpoint: &str) -> Res<Result<Admission, Rejection>> {
        self.authenticate_at(token, endpoint, Utc::now()).await
    }

    /// Runs the gates for one call at `now`.
    ///
    /// Rejections come back as `Ok(Err(_))` and are recorded best-effort.
    /// Storage failures come back as `Err(AppError::Unavailable)`: the request
    /// is refused rather than let through unchecked.
    pub async fn authenticate_at(
        &self,
        token: &str,
        endpoint: &str,
        now: DateTime<Utc>,
    ) -> Res<Result<Admission, Rejection>> {
        let mut trace = Trace {
            stage: Stage::Received,
            key_id: None,
            user_id: None,
        };

        match self.admit(token, endpoint, now, &mut trace).await {
            Ok(Ok(admission)) => Ok(Ok(admission)),
            Ok(Err(rejection)) => {
                log::info!(
                    "Rejected {} at {:?}: {} (key {:?})",
                    endpoint,
                    trace.stage,
                    rejection.reason.code(),
                    trace.key_id
                );
                trace.advance(Stage::Rejected);
                self.recorder.record_best_effort(event(
                    &trace,
                    endpoint,
                    now,
                    Outcome::Rejected,
                    Some(rejection.reason.code()),
                ));
                trace.advance(Stage::Recorded);
                Ok(Err(rejection))
            }
            Err(e) => {
                log::error!("Gate failed for {} at {:?}: {}", endpoint, trace.stage, e);
                trace.advance(Stage::Rejected);
                self.recorder.record_best_effort(event(
                    &trace,
                    endpoint,
                    now,
                    Outcome::Failure,
                    Some(INTERNAL_ERROR),
                ));
                trace.advance(Stage::Recorded);
                Err(AppError::Unavailable(format!("Gatekeeper unavailable: {}", e)))
            }
        }
    }

    async fn admit(
        &self,
        token: &str,
        endpoint: &str,
        now: DateTime<Utc>,
        trace: &mut Trace,
    ) -> Res<Result<Admission, Rejection>> {
        let key = match self.verifier.verify(token, now).await? {
            Ok(key) => key,
            Err(reason) => return Ok(Err(Rejection::new(reason))),
        };
        trace.key_id = Some(key.id);
        trace.user_id = Some(key.user_id);
        trace.advance(Stage::Verified);

        let authorization = match self.resolver.resolve(&key, endpoint).await? {
            Ok(authorization) => authorization,
            Err(reason) => return Ok(Err(Rejection::new(reason))),
        };
        trace.advance(Stage::Authorized);

        let plan = authorization.plan;
        let rate_limit = u32::try_from(plan.rate_limit_per_minute).unwrap_or(0);
        let rate_remaining = match self.rate_limiter.check(key.id, rate_limit, now).await? {
            RateDecision::Allowed { remaining } => remaining,
            RateDecision::Limited { retry_after_secs } => {
                return Ok(Err(Rejection::retry_after(
                    RejectReason::RateLimited,
                    retry_after_secs,
                )));
            }
        };
        trace.advance(Stage::RateChecked);

        let subscription = match self
            .quota
            .consume(authorization.subscription.id, plan.monthly_limit, now)
            .await?
        {
            QuotaDecision::Admitted { subscription } => subscription,
            QuotaDecision::Exhausted { retry_after_secs } => {
                return Ok(Err(Rejection::retry_after(
                    RejectReason::QuotaExceeded,
                    retry_after_secs,
                )));
            }
        };
        trace.advance(Stage::QuotaChecked);

        Ok(Ok(Admission {
            key_id: key.id,
            user_id: key.user_id,
            plan_id: plan.id,
            endpoint: endpoint.to_string(),
            usage_count: subscription.usage_count,
            monthly_limit: plan.monthly_limit,
            reset_at: subscription.reset_at,
            rate_remaining,
            admitted_at: now,
        }))
    }

    /// Durably records how an admitted call ended. Never touches the quota:
    /// a failed or timed out call stays charged.
    pub async fn complete(&self, admission: &Admission, outcome: DownstreamOutcome) -> Res<()> {
        InFlight::new(self.recorder.clone(), admission).finish(outcome).await
    }

    /// Forwards an admitted call under the downstream timeout and records the
    /// result. The event is written even if this future is dropped mid-call.
    pub async fn forward<T, E, Fut>(&self, admission: &Admission, call: Fut) -> Res<Handled<T, E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let in_flight = InFlight::new(self.recorder.clone(), admission);
        let (outcome, handled) = match tokio::time::timeout(self.downstream_timeout, call).await {
            Ok(Ok(value)) => (DownstreamOutcome::Succeeded, Handled::Completed(value)),
            Ok(Err(e)) => (DownstreamOutcome::Failed, Handled::Failed(e)),
            Err(_) => {
                log::warn!(
                    "{} timed out after {:?} for key {}",
                    admission.endpoint,
                    self.downstream_timeout,
                    admission.key_id
                );
                (
                    DownstreamOutcome::TimedOut,
                    Handled::Rejected(Rejection::new(RejectReason::DownstreamTimeout)),
                )
            }
        };
        in_flight.finish(outcome).await?;
        Ok(handled)
    }

    /// The whole pipeline: gates, timed downstream call, recording.
    pub async fn handle<T, E, F, Fut>(&self, token: &str, endpoint: &str, call: F) -> Res<Handled<T, E>>
    where
        F: FnOnce(&Admission) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = match self.authenticate(token, endpoint).await? {
            Ok(admission) => admission,
            Err(rejection) => return Ok(Handled::Rejected(rejection)),
        };
        let fut = call(&admission);
        self.forward(&admission, fut).await
    }
}

fn event(
    trace: &Trace,
    endpoint: &str,
    timestamp: DateTime<Utc>,
    outcome: Outcome,
    reason: Option<&str>,
) -> UsageEvent {
    UsageEvent {
        id: Uuid::new_v4(),
        timestamp,
        key_id: trace.key_id,
        user_id: trace.user_id,
        endpoint: endpoint.to_string(),
        outcome,
        reason: reason.map(str::to_string),
    }
}
