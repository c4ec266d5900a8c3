//! HTTP client for the Bubble REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::AuthBackend;
use crate::auth::dto::{AuthResponse, PatientLoginRequest, TherapistLoginRequest};
use crate::domain::{Session, SignedSession};
use crate::error::{AuthError, AuthResult, ErrorBody};
use crate::patients::dto::TokenResponse;

/// Maximum length for error response bodies carried into errors
const MAX_ERROR_BODY_LENGTH: usize = 300;

/// Clone is cheap; reqwest::Client shares its connection pool.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> AuthResult<T> {
        let response = Self::check(req.send().await.map_err(transport_error)?).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| AuthError::Internal(format!("invalid response: {e}")))
    }

    async fn check(response: Response) -> AuthResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let err = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => AuthError::from_body(parsed),
            Err(_) => from_status(status, &body),
        };
        debug!(%status, error = %err, "api error response");
        Err(err)
    }

    fn bearer(signed: &SignedSession) -> AuthResult<&str> {
        signed.bearer.as_deref().ok_or(AuthError::Unauthorized)
    }
}

/// Only connect and timeout failures mean the service could not be reached.
/// Anything else (a malformed base URL, a broken body) is a local fault.
fn transport_error(e: reqwest::Error) -> AuthError {
    if e.is_connect() || e.is_timeout() {
        warn!(error = %e, "api unreachable");
        AuthError::Unreachable(e.to_string())
    } else {
        AuthError::Internal(e.to_string())
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_LENGTH).collect()
}

/// Fallback for error responses without a JSON body (proxies, gateways).
fn from_status(status: StatusCode, body: &str) -> AuthError {
    match status.as_u16() {
        400 | 422 => AuthError::Validation(truncate(body)),
        401 | 403 => AuthError::Unauthorized,
        404 => AuthError::NotFound(truncate(body)),
        409 => AuthError::Conflict(truncate(body)),
        502..=504 => AuthError::Unreachable(format!("status {status}")),
        _ => AuthError::Internal(format!("status {}: {}", status, truncate(body))),
    }
}

impl From<AuthResponse> for SignedSession {
    fn from(r: AuthResponse) -> Self {
        SignedSession {
            session: r.session,
            bearer: Some(r.access_token),
        }
    }
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn authenticate_therapist(&self, email: &str, password: &str) -> AuthResult<SignedSession> {
        let req = self
            .client
            .post(self.url("/auth/therapist/login"))
            .json(&TherapistLoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            });
        let resp: AuthResponse = self.send(req).await?;
        Ok(resp.into())
    }

    async fn authenticate_patient(&self, token_or_email: &str) -> AuthResult<SignedSession> {
        let req = self
            .client
            .post(self.url("/auth/patient/login"))
            .json(&PatientLoginRequest {
                token_or_email: token_or_email.to_string(),
            });
        let resp: AuthResponse = self.send(req).await?;
        Ok(resp.into())
    }

    async fn verify(&self, signed: &SignedSession) -> AuthResult<Session> {
        let req = self
            .client
            .get(self.url("/auth/verify"))
            .bearer_auth(Self::bearer(signed)?);
        self.send(req).await
    }

    async fn regenerate_magic_token(&self, caller: &SignedSession, patient_id: &str) -> AuthResult<String> {
        let req = self
            .client
            .post(self.url(&format!("/patients/{patient_id}/token")))
            .bearer_auth(Self::bearer(caller)?);
        let resp: TokenResponse = self.send(req).await?;
        Ok(resp.token)
    }

    async fn logout(&self, signed: &SignedSession) -> AuthResult<()> {
        let Some(bearer) = signed.bearer.as_deref() else {
            return Ok(());
        };
        let response = self
            .client
            .post(self.url("/auth/logout"))
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::build_app;
    use crate::state::AppState;
    use crate::store::{seed::*, MemoryStore};
    use std::sync::Arc;

    async fn spawn_server() -> ApiClient {
        let store = Arc::new(MemoryStore::seeded().await.unwrap());
        let app = build_app(AppState::fake(store));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        ApiClient::new(format!("http://{addr}/api/v1"), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn plain_status_fallbacks() {
        assert_eq!(from_status(StatusCode::UNAUTHORIZED, ""), AuthError::Unauthorized);
        assert!(matches!(
            from_status(StatusCode::BAD_GATEWAY, "<html>"),
            AuthError::Unreachable(_)
        ));
        assert!(matches!(
            from_status(StatusCode::IM_A_TEAPOT, "?"),
            AuthError::Internal(_)
        ));
    }

    #[tokio::test]
    async fn onboarding_flow_over_http() {
        let api = spawn_server().await;

        let patient = api.authenticate_patient("alex-2026").await.unwrap();
        assert!(patient.bearer.is_some());
        assert_eq!(
            patient.session,
            Session::Patient {
                patient_id: DEMO_PATIENT_ID.into(),
                therapist_id: DEMO_THERAPIST_ID.into(),
                token: DEMO_PATIENT_TOKEN.into(),
            }
        );
        assert_eq!(api.verify(&patient).await.unwrap(), patient.session);

        let therapist = api
            .authenticate_therapist(DEMO_THERAPIST_EMAIL, DEMO_THERAPIST_PASSWORD)
            .await
            .unwrap();
        let fresh = api
            .regenerate_magic_token(&therapist, DEMO_PATIENT_ID)
            .await
            .unwrap();
        assert_ne!(fresh, DEMO_PATIENT_TOKEN);

        assert_eq!(
            api.authenticate_patient(DEMO_PATIENT_TOKEN).await.unwrap_err(),
            AuthError::InvalidToken
        );
        // the old patient session died with its token
        assert_eq!(api.verify(&patient).await.unwrap_err(), AuthError::Unauthorized);
        api.logout(&therapist).await.unwrap();
    }

    #[tokio::test]
    async fn typed_errors_cross_the_wire() {
        let api = spawn_server().await;
        assert_eq!(
            api.authenticate_therapist(DEMO_THERAPIST_EMAIL, "nope-nope").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            api.authenticate_patient("").await.unwrap_err(),
            AuthError::Validation("token or email is required".into())
        );

        let patient = api.authenticate_patient(DEMO_PATIENT_TOKEN).await.unwrap();
        assert_eq!(
            api.regenerate_magic_token(&patient, DEMO_PATIENT_ID).await.unwrap_err(),
            AuthError::Unauthorized
        );
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let api = ApiClient::new(format!("http://{addr}/api/v1"), Duration::from_secs(2)).unwrap();
        assert!(matches!(
            api.authenticate_patient(DEMO_PATIENT_TOKEN).await,
            Err(AuthError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn malformed_base_url_is_not_treated_as_offline() {
        let api = ApiClient::new("not a url", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            api.authenticate_patient(DEMO_PATIENT_TOKEN).await,
            Err(AuthError::Internal(_))
        ));
    }
}
