//! Request authentication: bearer sessions for users, HMAC signatures for
//! webhooks.

use axum::{
    async_trait,
    body::{to_bytes, Body},
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::error::ApiError;
use super::state::AppState;
use crate::crypto::{verify_body, SIGNATURE_HEADER};
use crate::types::UserId;

/// Largest webhook body accepted
pub const MAX_WEBHOOK_BODY: usize = 64 * 1024;

/// The profile owning the request's session token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

impl AuthenticatedUser {
    /// Reject a body that names a different user
    ///
    /// # Errors
    /// Returns `Forbidden` on mismatch
    pub fn ensure_self(&self, claimed: Option<UserId>) -> Result<(), ApiError> {
        match claimed {
            Some(id) if id != self.0 => {
                warn!(user_id = %self.0, claimed = %id, "request names another user");
                Err(ApiError::Forbidden)
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

        let user = state.sessions().verify(token.trim())?;
        Ok(Self(user))
    }
}

/// Verify `x-webhook-signature` over the raw body before any handler runs.
///
/// With signatures not required, an unsigned request is let through with a
/// warning; a present but wrong signature is always rejected.
pub async fn webhook_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_WEBHOOK_BODY)
        .await
        .map_err(|e| ApiError::validation(format!("unreadable body: {e}")))?;

    match parts.headers.get(SIGNATURE_HEADER) {
        Some(value) => {
            let signature = value
                .to_str()
                .map_err(|_| ApiError::Unauthorized("malformed signature header".into()))?;
            if let Err(e) = verify_body(state.webhook_secret(), &bytes, signature) {
                warn!(path = %parts.uri.path(), error = %e, "webhook signature rejected");
                return Err(e.into());
            }
            debug!(path = %parts.uri.path(), "webhook signature verified");
        }
        None if state.require_signatures() => {
            warn!(path = %parts.uri.path(), "unsigned webhook rejected");
            return Err(ApiError::Unauthorized("missing webhook signature".into()));
        }
        None => {
            warn!(path = %parts.uri.path(), "accepting unsigned webhook; signatures are not required");
        }
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
