//! Custom Axum extractors.
//!
//! - [`BearerToken`]: the raw credential from `Authorization: Bearer ...`
//! - [`CurrentUser`]: the resolved caller, via the app's [`Identity`]
//! - [`AppJson`] / [`AppQuery`]: `Json` and `Query` whose rejections render
//!   as [`AppError`]
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     State(state): State<AppState>,
//!     CurrentUser(user): CurrentUser,
//! ) -> Result<Json<Vec<RideRecord>>, AppError> {
//!     Ok(Json(state.controller.rides_for(&user).await?))
//! }
//! ```

use crate::error::AppError;
use crate::state::{AppState, Identity};
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::{header, request::Parts},
};
use rideshare_core::types::User;
use rideshare_core::RideError;

/// Bearer credential from the `Authorization` header.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?;

        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::unauthorized("Authorization must be a Bearer token"))?;

        Ok(Self(token.to_string()))
    }
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let user = authenticate(&state.identity, &token).await?;
        Ok(Self(user))
    }
}

/// JSON request body; malformed input becomes a `{code, message}` error.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Query string; unparseable input becomes a `{code, message}` error.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

/// Verifies `credential` and resolves it to a user.
///
/// # Errors
///
/// Returns [`RideError::Unauthenticated`] if either step rejects, or whatever
/// the collaborators fail with.
pub async fn authenticate(identity: &Identity, credential: &str) -> Result<User, RideError> {
    let subject = identity.authenticator.verify(credential).await?;
    identity.directory.resolve(&subject).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use rideshare_testing::fixtures::{self, ALICE};
    use rideshare_testing::mocks::{InMemoryUserDirectory, StaticAuthenticator};
    use std::sync::Arc;

    async fn bearer(header_value: Option<&str>) -> Result<BearerToken, AppError> {
        let mut builder = Request::builder();
        if let Some(value) = header_value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let (mut parts, ()) = builder.body(()).expect("Valid request").into_parts();
        BearerToken::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_bearer_token_extracted() {
        let token = bearer(Some("Bearer abc123")).await.unwrap();
        assert_eq!(token.0, "abc123");
    }

    #[tokio::test]
    async fn test_missing_or_malformed_header_is_unauthorized() {
        for value in [None, Some("Basic abc"), Some("Bearer   ")] {
            let err = bearer(value).await.unwrap_err();
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_authenticate_runs_both_collaborators() {
        let identity = Identity {
            authenticator: Arc::new(StaticAuthenticator::new().with_token("t-alice", "sub-alice")),
            directory: Arc::new(
                InMemoryUserDirectory::new().with_user("sub-alice", fixtures::rider(ALICE)),
            ),
        };

        assert_eq!(authenticate(&identity, "t-alice").await.unwrap().id, ALICE);
        assert!(matches!(
            authenticate(&identity, "t-bob").await,
            Err(RideError::Unauthenticated(_))
        ));
    }
}
