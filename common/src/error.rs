use actix_web::HttpResponse;
use thiserror::Error;

pub type Res<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    // === CONVERSION ERRORS ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("Redis pool error: {0}")]
    RedisPool(#[from] deadpool_redis::PoolError),

    #[error("JWT error: {0}")]
    JWT(#[from] jsonwebtoken::errors::Error),

    // === APPLICATION ERRORS ===
    #[error("Authorization error: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource conflict: {0}")]
    Conflict(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Too Many Requests: {0}")]
    TooManyRequests(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn to_http_response(&self) -> HttpResponse {
        let is_dev = cfg!(debug_assertions);

        let to_internal_json = |err_msg: &str| {
            if is_dev {
                serde_json::json!({ "error": err_msg, "code": "internal_error" })
            } else {
                serde_json::json!({ "error": "Internal server error", "code": "internal_error" })
            }
        };

        match self {
            // === CONVERSION ERRORS ===
            AppError::Database(error) => {
                log::error!("Database error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(&error.to_string()))
            }
            AppError::Redis(error) => {
                log::error!("Redis error: {}", error);
                HttpResponse::ServiceUnavailable().json(to_internal_json(&error.to_string()))
            }
            AppError::RedisPool(error) => {
                log::error!("Redis pool error: {}", error);
                HttpResponse::ServiceUnavailable().json(to_internal_json(&error.to_string()))
            }
            AppError::JWT(error) => {
                log::debug!("JWT error: {}", error);
                HttpResponse::Unauthorized()
                    .json(serde_json::json!({ "error": "Invalid token", "code": "unauthorized" }))
            }

            // === APPLICATION ERRORS ===
            AppError::Unauthorized(_) => HttpResponse::Unauthorized()
                .json(serde_json::json!({ "error": self.to_string(), "code": "unauthorized" })),
            AppError::Forbidden(_) => HttpResponse::Forbidden()
                .json(serde_json::json!({ "error": self.to_string(), "code": "forbidden" })),
            AppError::Conflict(_) => HttpResponse::Conflict()
                .json(serde_json::json!({ "error": self.to_string(), "code": "conflict" })),
            AppError::NotFound(_) => HttpResponse::NotFound()
                .json(serde_json::json!({ "error": self.to_string(), "code": "not_found" })),
            AppError::BadRequest(_) => HttpResponse::BadRequest()
                .json(serde_json::json!({ "error": self.to_string(), "code": "bad_request" })),
            AppError::TooManyRequests(_) => HttpResponse::TooManyRequests()
                .json(serde_json::json!({ "error": self.to_string(), "code": "too_many_requests" })),
            AppError::Unavailable(error) => {
                log::error!("Unavailable: {}", error);
                HttpResponse::ServiceUnavailable().json(to_internal_json(error))
            }

            AppError::Internal(error) => {
                log::error!("Internal error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(error))
            }
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        self.to_http_response()
    }
}
