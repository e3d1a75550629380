use actix_web::{HttpResponse, http::StatusCode};
use thiserror::Error;

/// Reasons the gatekeeper refuses (or fails) a request.
///
/// `UnknownKey` and `InvalidSecret` stay distinct for internal logging but share
/// one external code and message, so a caller cannot tell which half of the
/// token was wrong.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    #[error("API key is malformed")]
    MalformedCredential,

    #[error("Invalid API key")]
    UnknownKey,

    #[error("Invalid API key")]
    InvalidSecret,

    #[error("API key is revoked or expired")]
    KeyInactive,

    #[error("Account is suspended")]
    AccountSuspended,

    #[error("No active subscription plan")]
    NoActivePlan,

    #[error("Service not allowed for this API key")]
    ServiceNotAllowed,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Monthly quota exceeded")]
    QuotaExceeded,

    #[error("Downstream service timed out")]
    DownstreamTimeout,

    #[error("Downstream service failed")]
    DownstreamError,
}

impl RejectReason {
    /// Stable identifier for client SDKs.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::MalformedCredential => "malformed_credential",
            RejectReason::UnknownKey | RejectReason::InvalidSecret => "invalid_credential",
            RejectReason::KeyInactive => "key_inactive",
            RejectReason::AccountSuspended => "account_suspended",
            RejectReason::NoActivePlan => "no_active_plan",
            RejectReason::ServiceNotAllowed => "service_not_allowed",
            RejectReason::RateLimited => "rate_limited",
            RejectReason::QuotaExceeded => "quota_exceeded",
            RejectReason::DownstreamTimeout => "downstream_timeout",
            RejectReason::DownstreamError => "downstream_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RejectReason::MalformedCredential
            | RejectReason::UnknownKey
            | RejectReason::InvalidSecret
            | RejectReason::KeyInactive => StatusCode::UNAUTHORIZED,
            RejectReason::AccountSuspended
            | RejectReason::NoActivePlan
            | RejectReason::ServiceNotAllowed => StatusCode::FORBIDDEN,
            RejectReason::RateLimited | RejectReason::QuotaExceeded => {
                StatusCode::TOO_MANY_REQUESTS
            }
            RejectReason::DownstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            RejectReason::DownstreamError => StatusCode::BAD_GATEWAY,
        }
    }

    /// Rate and quota rejections clear on their own once the window or cycle rolls.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RejectReason::RateLimited | RejectReason::QuotaExceeded)
    }
}

/// A rejection as handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub retry_after_secs: Option<u64>,
}

impl Rejection {
    pub fn new(reason: RejectReason) -> Self {
        Self {
            reason,
            retry_after_secs: None,
        }
    }

    pub fn retry_after(reason: RejectReason, secs: u64) -> Self {
        Self {
            reason,
            retry_after_secs: Some(secs.max(1)),
        }
    }

    pub fn code(&self) -> &'static str {
        self.reason.code()
    }

    pub fn to_http_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.reason.status());
        let body = match self.retry_after_secs {
            Some(secs) => {
                builder.insert_header(("Retry-After", secs.to_string()));
                serde_json::json!({
                    "error": self.reason.to_string(),
                    "code": self.code(),
                    "retry_after": secs,
                })
            }
            None => serde_json::json!({
                "error": self.reason.to_string(),
                "code": self.code(),
            }),
        };
        builder.json(body)
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.reason, self.code())
    }
}

impl actix_web::ResponseError for Rejection {
    fn status_code(&self) -> StatusCode {
        self.reason.status()
    }

    fn error_response(&self) -> HttpResponse {
        self.to_http_response()
    }
}
