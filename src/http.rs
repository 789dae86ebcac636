//! axum middleware (feature `http`)
//!
//! ```rust,ignore
//! let comments = HttpRateLimit::new(limiter.clone(), "comments:create", RateLimit::new(10, 60_000));
//! let app = Router::new()
//!     .route("/api/comments", post(create_comment))
//!     .layer(axum::middleware::from_fn_with_state(comments, rate_limit));
//! ```

use crate::{Decision, IdentityKey, RateLimit, RateLimitError, RateLimiter, Subject};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Header set by the edge proxy with the original client address
pub const CONNECTING_IP_HEADER: &str = "cf-connecting-ip";

/// What to do with a request when the limiter itself fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Let the request through
    #[default]
    Open,
    /// Answer 503
    Closed,
}

/// Authenticated user id, inserted into request extensions by an auth layer
#[derive(Clone, Debug)]
pub struct AuthenticatedUser(pub String);

/// Middleware state: one limit under one scope
#[derive(Clone)]
pub struct HttpRateLimit {
    limiter: RateLimiter,
    scope: Arc<str>,
    limit: RateLimit,
    failure_policy: FailurePolicy,
}

impl HttpRateLimit {
    /// Fail-open state for `limit` under `scope`
    pub fn new(limiter: RateLimiter, scope: &str, limit: RateLimit) -> Self {
        Self {
            limiter,
            scope: scope.into(),
            limit,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// State for a policy named in the limiter's configuration
    pub fn from_policy(limiter: RateLimiter, scope: &str) -> Result<Self, RateLimitError> {
        let limit = limiter.config().policy(scope)?.to_limit();
        Ok(Self::new(limiter, scope, limit))
    }

    /// Override the failure policy
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// Client address from proxy headers, falling back to the socket peer
fn client_address(request: &Request) -> Option<String> {
    let headers: &HeaderMap = request.headers();
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    };

    header_value(CONNECTING_IP_HEADER)
        .or_else(|| {
            header_value("x-forwarded-for")
                .and_then(|list| list.split(',').next().map(|first| first.trim().to_owned()))
        })
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}

/// Subject for a request: client address, then authenticated user, then unknown
pub fn request_subject(request: &Request) -> Subject {
    let address = client_address(request);
    let user = request.extensions().get::<AuthenticatedUser>();
    Subject::resolve(address.as_deref(), user.map(|u| u.0.as_str()))
}

/// 429 response carrying `Retry-After` in milliseconds
pub fn too_many_requests(decision: &Decision) -> Response {
    let body = serde_json::json!({
        "message": "Too Many Requests",
        "retryAfterSeconds": decision.retry_after_ms as f64 / 1000.0,
    });
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, decision.retry_after_ms.to_string())],
        Json(body),
    )
        .into_response()
}

/// Rate limiting middleware for `axum::middleware::from_fn_with_state`
pub async fn rate_limit(State(state): State<HttpRateLimit>, request: Request, next: Next) -> Response {
    let key = IdentityKey::new(&request_subject(&request), &state.scope);

    match state.limiter.check_limit(key.as_str(), state.limit).await {
        Ok(decision) if decision.allowed => next.run(request).await,
        Ok(decision) => too_many_requests(&decision),
        Err(error) => match state.failure_policy {
            FailurePolicy::Open => {
                tracing::warn!(key = %key, error = %error, "Rate limiter failed, allowing request");
                next.run(request).await
            }
            FailurePolicy::Closed => {
                tracing::warn!(key = %key, error = %error, "Rate limiter failed, rejecting request");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(serde_json::json!({ "message": "Service Unavailable" })),
                )
                    .into_response()
            }
        },
    }
}
