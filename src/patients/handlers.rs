use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::dto::{CreatePatientRequest, PatientView, TokenResponse};
use crate::{
    auth::{extractors::AuthSession, AuthService},
    config::AppConfig,
    domain::Patient,
    error::AuthResult,
    state::AppState,
};

pub fn patient_routes() -> Router<AppState> {
    Router::new()
        .route("/patients", get(list_patients).post(create_patient))
        .route("/patients/:id/token", post(regenerate_token))
}

fn view(config: &AppConfig, patient: Patient) -> PatientView {
    PatientView {
        onboarding_link: config.onboarding_link(&patient.magic_token),
        patient,
    }
}

#[instrument(skip(state, auth))]
pub async fn list_patients(
    State(state): State<AppState>,
    auth: AuthSession,
) -> AuthResult<Json<Vec<PatientView>>> {
    let therapist_id = auth.therapist_id()?;
    let patients = state.store.list_patients(therapist_id).await?;
    Ok(Json(
        patients
            .into_iter()
            .map(|p| view(&state.config, p))
            .collect(),
    ))
}

/// POST /patients: onboard a patient and hand back their first magic token.
#[instrument(skip(state, auth, body))]
pub async fn create_patient(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(body): Json<CreatePatientRequest>,
) -> AuthResult<(StatusCode, HeaderMap, Json<PatientView>)> {
    let therapist_id = auth.therapist_id()?;
    let patient = AuthService::new(state.store.clone())
        .create_patient(therapist_id, &body.name, &body.email)
        .await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/v1/patients/{}", patient.id).parse::<HeaderValue>() {
        headers.insert(axum::http::header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(view(&state.config, patient))))
}

#[instrument(skip(state, auth))]
pub async fn regenerate_token(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(id): Path<String>,
) -> AuthResult<Json<TokenResponse>> {
    let token = AuthService::new(state.store.clone())
        .regenerate_for(&auth.0, &id)
        .await?;
    Ok(Json(TokenResponse {
        onboarding_link: state.config.onboarding_link(&token),
        patient_id: id,
        token,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::build_app;
    use crate::auth::dto::{AuthResponse, PatientLoginRequest, TherapistLoginRequest};
    use crate::domain::{Author, ChatSession, Severity};
    use crate::store::{seed::*, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    async fn spawn_server() -> String {
        let store = Arc::new(MemoryStore::seeded().await.unwrap());
        let app = build_app(AppState::fake(store));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api/v1")
    }

    async fn therapist_bearer(http: &reqwest::Client, base: &str) -> String {
        let resp: AuthResponse = http
            .post(format!("{base}/auth/therapist/login"))
            .json(&TherapistLoginRequest {
                email: DEMO_THERAPIST_EMAIL.into(),
                password: DEMO_THERAPIST_PASSWORD.into(),
            })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        resp.access_token
    }

    #[tokio::test]
    async fn onboard_patient_then_share_the_bubble() {
        let base = spawn_server().await;
        let http = reqwest::Client::new();
        let therapist = therapist_bearer(&http, &base).await;

        let created = http
            .post(format!("{base}/patients"))
            .bearer_auth(&therapist)
            .json(&json!({ "name": "Robin", "email": "robin@bubble.test" }))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), reqwest::StatusCode::CREATED);
        let view: PatientView = created.json().await.unwrap();
        assert_eq!(view.patient.therapist_id, DEMO_THERAPIST_ID);
        assert!(view.onboarding_link.ends_with(&format!("?token={}", view.patient.magic_token)));

        let listed: Vec<PatientView> = http
            .get(format!("{base}/patients"))
            .bearer_auth(&therapist)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed.len(), 3);

        let patient: AuthResponse = http
            .post(format!("{base}/auth/patient/login"))
            .json(&PatientLoginRequest {
                token_or_email: view.patient.magic_token.to_lowercase(),
            })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let bubble: ChatSession = http
            .post(format!("{base}/bubble/messages"))
            .bearer_auth(&patient.access_token)
            .json(&json!({ "text": "Couldn't sleep, worried about exams" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(bubble.messages.len(), 2);
        assert_eq!(bubble.messages[1].author, Author::Ai);

        let status = http
            .put(format!("{base}/bubble/severity"))
            .bearer_auth(&patient.access_token)
            .json(&json!({ "level": 2 }))
            .send()
            .await
            .unwrap()
            .status();
        assert!(status.is_success());

        let summarized: ChatSession = http
            .post(format!("{base}/patients/{}/bubble/summary", view.patient.id))
            .bearer_auth(&therapist)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(summarized.severity, Some(Severity::Medium));
        assert!(summarized.keywords.contains(&"exams".to_string()));
    }

    #[tokio::test]
    async fn patients_cannot_use_therapist_routes() {
        let base = spawn_server().await;
        let http = reqwest::Client::new();
        let patient: AuthResponse = http
            .post(format!("{base}/auth/patient/login"))
            .json(&PatientLoginRequest {
                token_or_email: DEMO_PATIENT_TOKEN.into(),
            })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let status = http
            .get(format!("{base}/patients"))
            .bearer_auth(&patient.access_token)
            .send()
            .await
            .unwrap()
            .status();
        assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);

        let status = http
            .post(format!("{base}/patients/{DEMO_PATIENT_ID}/token"))
            .send()
            .await
            .unwrap()
            .status();
        assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn regenerated_token_cuts_off_outstanding_patient_bearers() {
        let base = spawn_server().await;
        let http = reqwest::Client::new();
        let patient: AuthResponse = http
            .post(format!("{base}/auth/patient/login"))
            .json(&PatientLoginRequest {
                token_or_email: DEMO_PATIENT_TOKEN.into(),
            })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let post = |bearer: String| {
            http.post(format!("{base}/bubble/messages"))
                .bearer_auth(bearer)
                .json(&json!({ "text": "still here" }))
                .send()
        };
        assert!(post(patient.access_token.clone()).await.unwrap().status().is_success());

        let therapist = therapist_bearer(&http, &base).await;
        let fresh: TokenResponse = http
            .post(format!("{base}/patients/{DEMO_PATIENT_ID}/token"))
            .bearer_auth(&therapist)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_ne!(fresh.token, DEMO_PATIENT_TOKEN);

        let status = post(patient.access_token.clone()).await.unwrap().status();
        assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);
        let status = http
            .get(format!("{base}/bubble"))
            .bearer_auth(&patient.access_token)
            .send()
            .await
            .unwrap()
            .status();
        assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_key_guards_therapist_creation() {
        let base = spawn_server().await;
        let http = reqwest::Client::new();
        let body = json!({
            "email": "new@bubble.test",
            "password": "long-enough",
            "name": "Dr. New"
        });

        let denied = http
            .post(format!("{base}/admin/therapists"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(denied.status(), reqwest::StatusCode::UNAUTHORIZED);

        let created = http
            .post(format!("{base}/admin/therapists"))
            .header("x-admin-key", "test-admin")
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), reqwest::StatusCode::CREATED);
        let json: serde_json::Value = created.json().await.unwrap();
        assert_eq!(json["email"], "new@bubble.test");
        assert!(json.get("password_hash").is_none());
    }
}
