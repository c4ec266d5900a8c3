use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};

use super::claims::{Claims, Role};
use crate::config::JwtConfig;
use crate::domain::Session;
use crate::error::{AuthError, AuthResult};
use crate::state::AppState;

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64) * 60),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.jwt)
    }
}

impl JwtKeys {
    /// Issue a time-limited bearer token for an authenticated session.
    pub fn sign(&self, session: &Session) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let (role, email, token) = match session {
            Session::Therapist { email, .. } => (Role::Therapist, Some(email.clone()), None),
            Session::Patient { token, .. } => (Role::Patient, None, Some(token.clone())),
        };
        let claims = Claims {
            sub: session.subject().to_string(),
            role,
            therapist_id: session.therapist_id().to_string(),
            email,
            token,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let jwt = encode(&Header::default(), &claims, &self.encoding).map_err(AuthError::internal)?;
        debug!(sub = %claims.sub, role = ?role, "jwt signed");
        Ok(jwt)
    }

    pub fn verify(&self, jwt: &str) -> AuthResult<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(jwt, &self.decoding, &validation).map_err(|e| {
            warn!(error = %e, "jwt rejected");
            AuthError::Unauthorized
        })?;
        debug!(sub = %data.claims.sub, role = ?data.claims.role, "jwt verified");
        Ok(data.claims)
    }
}
