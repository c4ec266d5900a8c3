use serde::{Deserialize, Serialize};

use crate::domain::Session;
use crate::error::{AuthError, AuthResult};

/// Role carried in the bearer token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Therapist,
    Patient,
}

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,          // therapist or patient id
    pub role: Role,
    pub therapist_id: String, // owning therapist for patients, self for therapists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>, // therapists only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>, // patients only: magic token at sign-in
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

impl Claims {
    /// Rebuild the session descriptor these claims were signed for.
    pub fn session(&self) -> AuthResult<Session> {
        match self.role {
            Role::Therapist => Ok(Session::Therapist {
                therapist_id: self.sub.clone(),
                email: self.email.clone().ok_or(AuthError::Unauthorized)?,
            }),
            Role::Patient => Ok(Session::Patient {
                patient_id: self.sub.clone(),
                therapist_id: self.therapist_id.clone(),
                token: self.token.clone().ok_or(AuthError::Unauthorized)?,
            }),
        }
    }
}
