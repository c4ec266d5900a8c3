use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;

use super::dto::{PostMessageRequest, SeverityRequest};
use super::services;
use crate::{
    auth::{extractors::AuthSession, AuthService},
    domain::ChatSession,
    error::AuthResult,
    state::AppState,
};

pub fn bubble_routes() -> Router<AppState> {
    Router::new()
        // patient side
        .route("/bubble", get(my_bubble))
        .route("/bubble/messages", post(post_patient_message))
        .route("/bubble/severity", put(set_severity))
        // therapist side
        .route("/patients/:id/bubble", get(patient_bubble))
        .route("/patients/:id/bubble/messages", post(post_therapist_message))
        .route("/patients/:id/bubble/summary", post(summarize))
}

#[instrument(skip(state, auth))]
pub async fn my_bubble(
    State(state): State<AppState>,
    auth: AuthSession,
) -> AuthResult<Json<ChatSession>> {
    let patient_id = auth.patient_id()?;
    Ok(Json(services::open_bubble(state.store.as_ref(), patient_id).await?))
}

#[instrument(skip(state, auth, body))]
pub async fn post_patient_message(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(body): Json<PostMessageRequest>,
) -> AuthResult<Json<ChatSession>> {
    let patient_id = auth.patient_id()?;
    Ok(Json(
        services::post_patient_message(state.store.as_ref(), patient_id, &body.text).await?,
    ))
}

#[instrument(skip(state, auth))]
pub async fn set_severity(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(body): Json<SeverityRequest>,
) -> AuthResult<Json<ChatSession>> {
    let patient_id = auth.patient_id()?;
    Ok(Json(
        services::set_severity(state.store.as_ref(), patient_id, body.level).await?,
    ))
}

#[instrument(skip(state, auth))]
pub async fn patient_bubble(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(id): Path<String>,
) -> AuthResult<Json<ChatSession>> {
    let patient = AuthService::new(state.store.clone())
        .owned_patient(&auth.0, &id)
        .await?;
    Ok(Json(services::open_bubble(state.store.as_ref(), &patient.id).await?))
}

#[instrument(skip(state, auth, body))]
pub async fn post_therapist_message(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(id): Path<String>,
    Json(body): Json<PostMessageRequest>,
) -> AuthResult<Json<ChatSession>> {
    let patient = AuthService::new(state.store.clone())
        .owned_patient(&auth.0, &id)
        .await?;
    Ok(Json(
        services::post_therapist_message(state.store.as_ref(), &patient.id, &body.text).await?,
    ))
}

#[instrument(skip(state, auth))]
pub async fn summarize(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(id): Path<String>,
) -> AuthResult<Json<ChatSession>> {
    let patient = AuthService::new(state.store.clone())
        .owned_patient(&auth.0, &id)
        .await?;
    Ok(Json(services::summarize(state.store.as_ref(), &patient.id).await?))
}
