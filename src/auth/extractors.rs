use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::jwt::JwtKeys;
use super::AuthService;
use crate::domain::Session;
use crate::error::AuthError;

/// Extracts the bearer JWT and re-validates its session against the store,
/// so a regenerated magic token cuts off bearers issued for the old one.
pub struct AuthSession(pub Session);

/// Raw bearer token from the `Authorization` header.
pub(crate) fn bearer(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::Unauthorized)?;

    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .ok_or_else(|| {
            warn!("invalid auth scheme");
            AuthError::Unauthorized
        })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
    AuthService: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(bearer(parts)?)?;
        let session = AuthService::from_ref(state)
            .verify_session(&claims.session()?)
            .await?;
        Ok(AuthSession(session))
    }
}

impl AuthSession {
    pub fn therapist_id(&self) -> Result<&str, AuthError> {
        match &self.0 {
            Session::Therapist { therapist_id, .. } => Ok(therapist_id),
            Session::Patient { .. } => Err(AuthError::Unauthorized),
        }
    }

    pub fn patient_id(&self) -> Result<&str, AuthError> {
        match &self.0 {
            Session::Patient { patient_id, .. } => Ok(patient_id),
            Session::Therapist { .. } => Err(AuthError::Unauthorized),
        }
    }
}
