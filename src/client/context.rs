//! The app's single owner of "who is signed in".

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{AuthBackend, FileStorage, LocalStorage, RemoteThenLocal};
use crate::config::ClientConfig;
use crate::domain::{Session, SignedSession};
use crate::error::{AuthError, AuthResult};

const SESSION_KEY: &str = "session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Restoring,
    Authenticated(SignedSession),
    Anonymous,
}

/// Holds the current session, restores it at startup and tears it down on
/// logout or when the backend rejects it. There is no automatic refresh.
pub struct SessionContext {
    backend: Arc<dyn AuthBackend>,
    storage: Arc<dyn LocalStorage>,
    state: SessionState,
}

impl SessionContext {
    pub fn new(backend: Arc<dyn AuthBackend>, storage: Arc<dyn LocalStorage>) -> Self {
        Self {
            backend,
            storage,
            state: SessionState::Uninitialized,
        }
    }

    /// Remote API with offline fallback, session persisted under `session_dir`.
    pub async fn from_config(cfg: &ClientConfig) -> anyhow::Result<Self> {
        let backend = RemoteThenLocal::from_config(cfg).await?;
        Ok(Self::new(
            Arc::new(backend),
            Arc::new(FileStorage::new(cfg.session_dir.clone())),
        ))
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current(&self) -> Option<&Session> {
        self.signed().map(|s| &s.session)
    }

    pub fn signed(&self) -> Option<&SignedSession> {
        match &self.state {
            SessionState::Authenticated(signed) => Some(signed),
            _ => None,
        }
    }

    fn load(&self) -> Option<SignedSession> {
        let raw = match self.storage.get(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "could not read stored session");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(signed) => Some(signed),
            Err(e) => {
                warn!(error = %e, "stored session unreadable; discarding");
                self.purge();
                None
            }
        }
    }

    fn persist(&self, signed: &SignedSession) -> AuthResult<()> {
        let raw = serde_json::to_string(signed).map_err(AuthError::internal)?;
        self.storage
            .set(SESSION_KEY, &raw)
            .map_err(|e| AuthError::Internal(format!("{e:#}")))
    }

    fn purge(&self) {
        if let Err(e) = self.storage.remove(SESSION_KEY) {
            warn!(error = %e, "could not clear stored session");
        }
    }

    /// Load the persisted session and keep it only if the backend still accepts it.
    pub async fn restore(&mut self) -> &SessionState {
        self.state = SessionState::Restoring;
        let Some(stored) = self.load() else {
            self.state = SessionState::Anonymous;
            return &self.state;
        };

        match self.backend.verify(&stored).await {
            Ok(session) => {
                info!(sub = %session.subject(), "session restored");
                self.state = SessionState::Authenticated(SignedSession {
                    session,
                    bearer: stored.bearer,
                });
            }
            Err(e) => {
                warn!(error = %e, "stored session rejected; signing out");
                self.purge();
                self.state = SessionState::Anonymous;
            }
        }
        &self.state
    }

    fn establish(&mut self, signed: SignedSession) -> AuthResult<Session> {
        self.persist(&signed)?;
        let session = signed.session.clone();
        self.state = SessionState::Authenticated(signed);
        Ok(session)
    }

    pub async fn sign_in_therapist(&mut self, email: &str, password: &str) -> AuthResult<Session> {
        let signed = self.backend.authenticate_therapist(email, password).await?;
        self.establish(signed)
    }

    pub async fn sign_in_patient(&mut self, token_or_email: &str) -> AuthResult<Session> {
        let signed = self.backend.authenticate_patient(token_or_email).await?;
        self.establish(signed)
    }

    /// Clear local state, then tell the backend. Backend failures are ignored.
    pub async fn logout(&mut self) {
        let previous = std::mem::replace(&mut self.state, SessionState::Anonymous);
        self.purge();
        if let SessionState::Authenticated(signed) = previous {
            if let Err(e) = self.backend.logout(&signed).await {
                debug!(error = %e, "remote logout failed; ignored");
            }
            info!(sub = %signed.session.subject(), "signed out");
        }
    }

    /// Force a sign-out when a privileged call was rejected mid-session.
    ///
    /// Returns whether the session was torn down.
    pub async fn handle_failure(&mut self, err: &AuthError) -> bool {
        if matches!(err, AuthError::Unauthorized) && self.signed().is_some() {
            warn!("session rejected by backend; forcing sign-out");
            self.logout().await;
            return true;
        }
        false
    }

    /// Regenerate a patient's magic token as the signed-in therapist.
    pub async fn regenerate_magic_token(&mut self, patient_id: &str) -> AuthResult<String> {
        let signed = self.signed().cloned().ok_or(AuthError::Unauthorized)?;
        let result = self.backend.regenerate_magic_token(&signed, patient_id).await;
        if let Err(e) = &result {
            self.handle_failure(e).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{LocalBackend, MemoryStorage};
    use crate::store::seed::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn context() -> (SessionContext, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let backend = Arc::new(LocalBackend::seeded().await.unwrap());
        (SessionContext::new(backend, storage.clone()), storage)
    }

    #[tokio::test]
    async fn starts_uninitialized_and_restores_to_anonymous_when_empty() {
        let (mut ctx, _) = context().await;
        assert_eq!(ctx.state(), &SessionState::Uninitialized);
        assert_eq!(ctx.restore().await, &SessionState::Anonymous);
        assert!(ctx.current().is_none());
    }

    #[tokio::test]
    async fn current_is_stable_between_calls() {
        let (mut ctx, _) = context().await;
        ctx.sign_in_patient("alex-2026").await.unwrap();
        let first = ctx.current().cloned();
        let second = ctx.current().cloned();
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(
            first.unwrap(),
            Session::Patient {
                patient_id: DEMO_PATIENT_ID.into(),
                therapist_id: DEMO_THERAPIST_ID.into(),
                token: DEMO_PATIENT_TOKEN.into(),
            }
        );
    }

    #[tokio::test]
    async fn logout_clears_state_and_storage() {
        let (mut ctx, storage) = context().await;
        ctx.sign_in_therapist(DEMO_THERAPIST_EMAIL, DEMO_THERAPIST_PASSWORD)
            .await
            .unwrap();
        assert!(storage.get(SESSION_KEY).unwrap().is_some());

        ctx.logout().await;
        assert!(ctx.current().is_none());
        assert_eq!(ctx.state(), &SessionState::Anonymous);
        assert!(storage.get(SESSION_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_sign_in_leaves_state_untouched() {
        let (mut ctx, storage) = context().await;
        ctx.restore().await;
        let err = ctx
            .sign_in_therapist(DEMO_THERAPIST_EMAIL, "wrong-password")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
        assert_eq!(ctx.state(), &SessionState::Anonymous);
        assert!(storage.get(SESSION_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_keeps_a_valid_session() {
        let storage = Arc::new(MemoryStorage::new());
        let backend: Arc<dyn AuthBackend> = Arc::new(LocalBackend::seeded().await.unwrap());

        let mut first = SessionContext::new(backend.clone(), storage.clone());
        let session = first.sign_in_patient(DEMO_PATIENT_TOKEN).await.unwrap();

        let mut second = SessionContext::new(backend, storage);
        second.restore().await;
        assert_eq!(second.current(), Some(&session));
    }

    #[tokio::test]
    async fn restore_purges_session_whose_token_was_regenerated() {
        let storage = Arc::new(MemoryStorage::new());
        let local = LocalBackend::seeded().await.unwrap();
        let backend: Arc<dyn AuthBackend> = Arc::new(local.clone());

        let mut patient_ctx = SessionContext::new(backend.clone(), storage.clone());
        patient_ctx.sign_in_patient(DEMO_PATIENT_TOKEN).await.unwrap();

        let mut therapist_ctx = SessionContext::new(backend.clone(), Arc::new(MemoryStorage::new()));
        therapist_ctx
            .sign_in_therapist(DEMO_THERAPIST_EMAIL, DEMO_THERAPIST_PASSWORD)
            .await
            .unwrap();
        therapist_ctx.regenerate_magic_token(DEMO_PATIENT_ID).await.unwrap();

        let mut restarted = SessionContext::new(backend, storage.clone());
        assert_eq!(restarted.restore().await, &SessionState::Anonymous);
        assert!(storage.get(SESSION_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_stored_session_is_discarded() {
        let (mut ctx, storage) = context().await;
        storage.set(SESSION_KEY, "{not json").unwrap();
        assert_eq!(ctx.restore().await, &SessionState::Anonymous);
        assert!(storage.get(SESSION_KEY).unwrap().is_none());
    }

    /// Accepts sign-in, then rejects everything privileged with `Unauthorized`.
    struct ExpiringBackend {
        inner: LocalBackend,
        logouts: AtomicUsize,
    }

    #[async_trait]
    impl AuthBackend for ExpiringBackend {
        async fn authenticate_therapist(&self, e: &str, p: &str) -> AuthResult<SignedSession> {
            self.inner.authenticate_therapist(e, p).await
        }
        async fn authenticate_patient(&self, t: &str) -> AuthResult<SignedSession> {
            self.inner.authenticate_patient(t).await
        }
        async fn verify(&self, _: &SignedSession) -> AuthResult<Session> {
            Err(AuthError::Unauthorized)
        }
        async fn regenerate_magic_token(&self, _: &SignedSession, _: &str) -> AuthResult<String> {
            Err(AuthError::Unauthorized)
        }
        async fn logout(&self, _: &SignedSession) -> AuthResult<()> {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            Err(AuthError::Unreachable("offline".into()))
        }
    }

    #[tokio::test]
    async fn unauthorized_mid_session_forces_sign_out() {
        let backend = Arc::new(ExpiringBackend {
            inner: LocalBackend::seeded().await.unwrap(),
            logouts: AtomicUsize::new(0),
        });
        let mut ctx = SessionContext::new(backend.clone(), Arc::new(MemoryStorage::new()));
        ctx.sign_in_therapist(DEMO_THERAPIST_EMAIL, DEMO_THERAPIST_PASSWORD)
            .await
            .unwrap();

        let err = ctx.regenerate_magic_token(DEMO_PATIENT_ID).await.unwrap_err();
        assert_eq!(err, AuthError::Unauthorized);
        assert_eq!(ctx.state(), &SessionState::Anonymous);
        // remote logout attempted once, its failure ignored
        assert_eq!(backend.logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_failures_do_not_sign_out() {
        let (mut ctx, _) = context().await;
        ctx.sign_in_therapist(DEMO_THERAPIST_EMAIL, DEMO_THERAPIST_PASSWORD)
            .await
            .unwrap();
        assert!(!ctx.handle_failure(&AuthError::Unreachable("x".into())).await);
        assert!(!ctx.handle_failure(&AuthError::validation("x")).await);
        assert!(ctx.current().is_some());
    }
}
