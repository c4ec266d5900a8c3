use axum::{
    extract::{FromRef, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{AuthResponse, CreateTherapistRequest, PatientLoginRequest, TherapistLoginRequest},
    extractors::AuthSession,
    jwt::JwtKeys,
    password::verify_password,
    services::{AuthService, NewTherapist},
};
use crate::{
    domain::{Session, Therapist},
    error::{AuthError, AuthResult},
    state::AppState,
};

const ADMIN_KEY_HEADER: &str = "x-admin-key";

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        AuthService::new(state.store.clone())
    }
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/therapist/login", post(therapist_login))
        .route("/auth/patient/login", post(patient_login))
        .route("/auth/verify", get(verify))
        .route("/auth/logout", post(logout))
        .route("/admin/therapists", post(create_therapist))
}

/// Checks the presented admin key against the configured digest in constant time.
fn check_admin_key(expected_hash: Option<&str>, presented: Option<&str>) -> AuthResult<()> {
    match (expected_hash, presented) {
        (Some(hash), Some(given)) if verify_password(given, hash)? => Ok(()),
        _ => {
            warn!("admin key missing or wrong");
            Err(AuthError::Unauthorized)
        }
    }
}

fn signed(state: &AppState, session: Session) -> AuthResult<Json<AuthResponse>> {
    let access_token = JwtKeys::from_ref(state).sign(&session)?;
    Ok(Json(AuthResponse {
        session,
        access_token,
    }))
}

#[instrument(skip(state, payload))]
pub async fn therapist_login(
    State(state): State<AppState>,
    Json(payload): Json<TherapistLoginRequest>,
) -> AuthResult<Json<AuthResponse>> {
    let session = AuthService::from_ref(&state)
        .authenticate_therapist(&payload.email, &payload.password)
        .await?;
    signed(&state, session)
}

#[instrument(skip(state, payload))]
pub async fn patient_login(
    State(state): State<AppState>,
    Json(payload): Json<PatientLoginRequest>,
) -> AuthResult<Json<AuthResponse>> {
    let session = AuthService::from_ref(&state)
        .authenticate_patient(&payload.token_or_email)
        .await?;
    signed(&state, session)
}

/// The caller's session, already re-validated by the extractor.
#[instrument(skip(auth))]
pub async fn verify(auth: AuthSession) -> Json<Session> {
    Json(auth.0)
}

/// Sessions are stateless; this only records the sign-out.
#[instrument(skip(auth))]
pub async fn logout(auth: AuthSession) -> StatusCode {
    info!(sub = %auth.0.subject(), "logged out");
    StatusCode::NO_CONTENT
}

#[instrument(skip(state, headers, payload))]
pub async fn create_therapist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateTherapistRequest>,
) -> AuthResult<(StatusCode, Json<Therapist>)> {
    let presented = headers.get(ADMIN_KEY_HEADER).and_then(|v| v.to_str().ok());
    check_admin_key(state.config.admin_key_hash.as_deref(), presented)?;

    let therapist = AuthService::from_ref(&state)
        .create_therapist(NewTherapist {
            email: payload.email,
            password: payload.password,
            name: payload.name,
            profession: payload.profession,
            city: payload.city,
            booking_link: payload.booking_link,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(therapist)))
}
