use std::convert::Infallible;

use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};

use crate::error::AppError;
use crate::models::CurrentUser;
use crate::services::AuthService;
use crate::AppState;

/// The requesting account, if the request carried a valid bearer token.
/// Never rejects: a missing or invalid token means anonymous.
pub struct MaybeUser(pub Option<CurrentUser>);

/// The requesting account; rejects with 401 when there is none.
pub struct RequireUser(pub CurrentUser);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let user = AuthService::authenticate(auth_header, &state.config.jwt)
            .map(|id| CurrentUser { id });
        Ok(MaybeUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state)
            .await
            .unwrap_or(MaybeUser(None));

        user.map(RequireUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}
