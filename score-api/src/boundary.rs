//! Origin based request admission.
//!
//! The filter runs as axum middleware in front of every route, so a rejected
//! request never reaches token verification or the player store. The same
//! policy drives the CORS layer so browsers see a consistent decision.
//!
//! Origin headers are trivially spoofed by non-browser clients. This is a
//! coarse first barrier; the token check in [`crate::identity`] is the real
//! security boundary.

use crate::config::BoundaryPolicy;
use crate::errors::ScoreError;
use crate::metrics_defs::BOUNDARY_REJECTED;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::{
    HeaderMap, HeaderValue, Method,
    header::{CONTENT_TYPE, ORIGIN, REFERER},
    request::Parts,
};
use shared::counter;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;
use url::Url;

#[derive(Clone, Debug)]
pub struct BoundaryFilter {
    policy: BoundaryPolicy,
}

impl BoundaryFilter {
    pub fn new(policy: BoundaryPolicy) -> Self {
        let policy = match policy {
            BoundaryPolicy::Domain { domain } => BoundaryPolicy::Domain {
                domain: domain.trim().trim_matches('.').to_ascii_lowercase(),
            },
            other => other,
        };

        BoundaryFilter { policy }
    }

    pub fn policy(&self) -> &BoundaryPolicy {
        &self.policy
    }

    /// Decides whether a request with these headers may proceed.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), ScoreError> {
        match &self.policy {
            BoundaryPolicy::Open => Ok(()),
            BoundaryPolicy::AllowList { .. } => {
                // Native apps and command line clients send no origin at all
                let Some(origin) = headers.get(ORIGIN) else {
                    return Ok(());
                };

                match origin.to_str() {
                    Ok(origin) if self.allows_origin(origin) => Ok(()),
                    _ => {
                        warn!("Blocked request from origin {origin:?}");
                        Err(ScoreError::Forbidden)
                    }
                }
            }
            BoundaryPolicy::Domain { domain } => {
                let source = headers.get(ORIGIN).or_else(|| headers.get(REFERER));
                let host = source
                    .and_then(|value| value.to_str().ok())
                    .and_then(host_of);

                match host {
                    Some(host) if host_in_domain(&host, domain) => Ok(()),
                    _ => {
                        warn!("Blocked request from {source:?}, not within {domain}");
                        Err(ScoreError::Forbidden)
                    }
                }
            }
        }
    }

    /// Whether a browser origin is acceptable under the configured policy.
    pub fn allows_origin(&self, origin: &str) -> bool {
        match &self.policy {
            BoundaryPolicy::Open => true,
            BoundaryPolicy::AllowList { origins, suffix } => {
                origins.iter().any(|allowed| allowed == origin)
                    || suffix
                        .as_deref()
                        .is_some_and(|suffix| !suffix.is_empty() && origin.ends_with(suffix))
            }
            BoundaryPolicy::Domain { domain } => {
                host_of(origin).is_some_and(|host| host_in_domain(&host, domain))
            }
        }
    }

    /// CORS headers mirroring the admission policy.
    pub fn cors_layer(self: &Arc<Self>) -> CorsLayer {
        let filter = self.clone();

        CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(
                move |origin: &HeaderValue, _parts: &Parts| {
                    origin
                        .to_str()
                        .is_ok_and(|origin| filter.allows_origin(origin))
                },
            ))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE])
            .max_age(Duration::from_secs(60 * 60))
    }
}

/// Middleware entry point, see [`axum::middleware::from_fn_with_state`].
pub async fn enforce(
    State(filter): State<Arc<BoundaryFilter>>,
    request: Request,
    next: Next,
) -> Response {
    match filter.check(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(err) => {
            counter!(BOUNDARY_REJECTED).increment(1);
            err.into_response()
        }
    }
}

fn host_of(value: &str) -> Option<String> {
    Url::parse(value)
        .ok()?
        .host_str()
        .map(|host| host.to_ascii_lowercase())
}

fn host_in_domain(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
