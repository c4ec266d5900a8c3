use std::sync::Arc;

use async_trait::async_trait;

use super::AuthBackend;
use crate::auth::AuthService;
use crate::domain::{Session, SignedSession};
use crate::error::AuthResult;
use crate::store::{MemoryStore, Store};

/// Runs the auth operations against an on-device store. Sessions carry no bearer.
#[derive(Clone)]
pub struct LocalBackend {
    service: AuthService,
}

impl LocalBackend {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            service: AuthService::new(store),
        }
    }

    /// Backend over a fresh copy of the demo dataset.
    pub async fn seeded() -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(MemoryStore::seeded().await?)))
    }
}

#[async_trait]
impl AuthBackend for LocalBackend {
    async fn authenticate_therapist(&self, email: &str, password: &str) -> AuthResult<SignedSession> {
        let session = self.service.authenticate_therapist(email, password).await?;
        Ok(SignedSession::local(session))
    }

    async fn authenticate_patient(&self, token_or_email: &str) -> AuthResult<SignedSession> {
        let session = self.service.authenticate_patient(token_or_email).await?;
        Ok(SignedSession::local(session))
    }

    async fn verify(&self, signed: &SignedSession) -> AuthResult<Session> {
        self.service.verify_session(&signed.session).await
    }

    async fn regenerate_magic_token(&self, caller: &SignedSession, patient_id: &str) -> AuthResult<String> {
        self.service.regenerate_for(&caller.session, patient_id).await
    }

    async fn logout(&self, _signed: &SignedSession) -> AuthResult<()> {
        Ok(())
    }
}
