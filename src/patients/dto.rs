use serde::{Deserialize, Serialize};

use crate::domain::Patient;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePatientRequest {
    pub name: String,
    pub email: String,
}

/// A patient as shown to their therapist, with the link to encode as a QR code.
#[derive(Debug, Serialize, Deserialize)]
pub struct PatientView {
    #[serde(flatten)]
    pub patient: Patient,
    pub onboarding_link: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub patient_id: String,
    pub token: String,
    pub onboarding_link: String,
}
