use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::password::{hash_password, verify_password};
use super::token::{issue_magic_token, normalize_token};
use crate::domain::{new_patient_id, new_therapist_id, Patient, Session, Therapist};
use crate::error::{AuthError, AuthResult};
use crate::store::{Store, StoreError};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn required<'a>(value: &'a str, field: &str) -> AuthResult<&'a str> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AuthError::validation(format!("{field} is required")));
    }
    Ok(v)
}

/// Input for creating a therapist account.
#[derive(Debug, Clone)]
pub struct NewTherapist {
    pub email: String,
    pub password: String,
    pub name: String,
    pub profession: Option<String>,
    pub city: Option<String>,
    pub booking_link: Option<String>,
}

/// Both sign-in paths plus magic-token issuance, over a [`Store`].
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    #[instrument(skip(self, password))]
    pub async fn authenticate_therapist(&self, email: &str, password: &str) -> AuthResult<Session> {
        let email = normalize_email(required(email, "email")?);
        required(password, "password")?;

        let therapist = match self.store.find_therapist_by_email(&email).await {
            Ok(t) => t,
            Err(StoreError::NotFound(_)) => {
                warn!(%email, "login unknown email");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        if !verify_password(password, &therapist.password_hash)? {
            warn!(%email, therapist_id = %therapist.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        info!(therapist_id = %therapist.id, "therapist logged in");
        Ok(Session::for_therapist(&therapist))
    }

    /// Accepts a magic token (any case) or the patient's email.
    #[instrument(skip(self, token_or_email))]
    pub async fn authenticate_patient(&self, token_or_email: &str) -> AuthResult<Session> {
        let raw = required(token_or_email, "token or email")?;

        let patient = match self.store.find_patient_by_token(&normalize_token(raw)).await {
            Ok(p) => p,
            Err(StoreError::NotFound(_)) if is_valid_email(raw) => {
                match self.store.find_patient_by_email(&normalize_email(raw)).await {
                    Ok(p) => p,
                    Err(StoreError::NotFound(_)) => {
                        warn!("patient login unknown email");
                        return Err(AuthError::InvalidToken);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(StoreError::NotFound(_)) => {
                warn!("patient login unknown token");
                return Err(AuthError::InvalidToken);
            }
            Err(e) => return Err(e.into()),
        };

        info!(patient_id = %patient.id, "patient logged in");
        Ok(Session::for_patient(&patient))
    }

    /// Check that a previously issued descriptor still matches the store.
    ///
    /// A patient session dies with its magic token.
    #[instrument(skip(self, session))]
    pub async fn verify_session(&self, session: &Session) -> AuthResult<Session> {
        let current = match session {
            Session::Therapist { therapist_id, email } => {
                match self.store.find_therapist_by_id(therapist_id).await {
                    Ok(t) if &t.email == email => Session::for_therapist(&t),
                    Ok(_) | Err(StoreError::NotFound(_)) => return Err(AuthError::Unauthorized),
                    Err(e) => return Err(e.into()),
                }
            }
            Session::Patient { patient_id, token, .. } => {
                match self.store.find_patient_by_id(patient_id).await {
                    Ok(p) if &p.magic_token == token => Session::for_patient(&p),
                    Ok(_) | Err(StoreError::NotFound(_)) => return Err(AuthError::Unauthorized),
                    Err(e) => return Err(e.into()),
                }
            }
        };
        Ok(current)
    }

    pub async fn issue_magic_token(&self, patient_id: &str) -> AuthResult<String> {
        issue_magic_token(self.store.as_ref(), patient_id).await
    }

    /// Replace the patient's token; the old one is invalid immediately.
    #[instrument(skip(self))]
    pub async fn regenerate_magic_token(&self, patient_id: &str) -> AuthResult<String> {
        let patient = self.store.find_patient_by_id(patient_id).await?;
        self.issue_magic_token(&patient.id).await
    }

    /// Like [`Self::regenerate_magic_token`], restricted to the caller's own patients.
    pub async fn regenerate_for(&self, caller: &Session, patient_id: &str) -> AuthResult<String> {
        self.owned_patient(caller, patient_id).await?;
        self.regenerate_magic_token(patient_id).await
    }

    /// Load a patient the calling therapist owns.
    pub async fn owned_patient(&self, caller: &Session, patient_id: &str) -> AuthResult<Patient> {
        let Session::Therapist { therapist_id, .. } = caller else {
            return Err(AuthError::Unauthorized);
        };
        let patient = self.store.find_patient_by_id(patient_id).await?;
        if &patient.therapist_id != therapist_id {
            warn!(%therapist_id, %patient_id, "patient owned by another therapist");
            return Err(AuthError::Unauthorized);
        }
        Ok(patient)
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_therapist(&self, input: NewTherapist) -> AuthResult<Therapist> {
        let email = normalize_email(&input.email);
        if !is_valid_email(&email) {
            return Err(AuthError::validation("invalid email"));
        }
        if input.password.len() < 8 {
            return Err(AuthError::validation("password too short"));
        }
        let name = required(&input.name, "name")?.to_string();

        let therapist = Therapist {
            id: new_therapist_id(),
            email,
            password_hash: hash_password(&input.password)?,
            name,
            profession: input.profession,
            city: input.city,
            booking_link: input.booking_link,
            created_at: OffsetDateTime::now_utc(),
        };
        self.store.insert_therapist(&therapist).await?;
        info!(therapist_id = %therapist.id, "therapist created");
        Ok(therapist)
    }

    /// Create a patient under `therapist_id` and issue its first magic token.
    #[instrument(skip(self, name, email))]
    pub async fn create_patient(&self, therapist_id: &str, name: &str, email: &str) -> AuthResult<Patient> {
        let name = required(name, "name")?.to_string();
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AuthError::validation("invalid email"));
        }
        self.store.find_therapist_by_id(therapist_id).await?;

        let mut patient = Patient {
            id: new_patient_id(),
            therapist_id: therapist_id.to_string(),
            name,
            email,
            // placeholder until the first real token is issued below
            magic_token: format!("PENDING-{}", uuid::Uuid::new_v4().simple()).to_uppercase(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.store.insert_patient(&patient).await?;
        patient.magic_token = self.issue_magic_token(&patient.id).await?;
        info!(patient_id = %patient.id, %therapist_id, "patient created");
        Ok(patient)
    }
}
