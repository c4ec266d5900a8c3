use serde::{Deserialize, Serialize};

use crate::domain::Session;

/// Request body for therapist login.
#[derive(Debug, Serialize, Deserialize)]
pub struct TherapistLoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for patient login: a magic token or the patient's email.
#[derive(Debug, Serialize, Deserialize)]
pub struct PatientLoginRequest {
    pub token_or_email: String,
}

/// Response returned after either login path.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub session: Session,
    pub access_token: String,
}

/// Request body for the admin therapist-creation endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTherapistRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub profession: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub booking_link: Option<String>,
}
