use std::future::Future;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{AuthBackend, HttpProbe, LocalBackend, Reachability, ApiClient};
use crate::config::ClientConfig;
use crate::domain::{Session, SignedSession};
use crate::error::{AuthError, AuthResult};

/// Remote first, local store when the remote cannot be reached.
///
/// Only [`AuthError::Unreachable`] triggers the fallback; every answer the
/// remote service actually gives (bad password, unknown token, validation)
/// is returned as-is. Nothing written locally is replayed to the remote.
pub struct RemoteThenLocal<R, L, P> {
    remote: R,
    local: L,
    probe: P,
}

impl<R, L, P> RemoteThenLocal<R, L, P>
where
    R: AuthBackend,
    L: AuthBackend,
    P: Reachability,
{
    pub fn new(remote: R, local: L, probe: P) -> Self {
        Self {
            remote,
            local,
            probe,
        }
    }

    async fn resolve<T, FR, FL>(&self, op: &'static str, remote: FR, local: FL) -> AuthResult<T>
    where
        FR: Future<Output = AuthResult<T>> + Send,
        FL: Future<Output = AuthResult<T>> + Send,
    {
        if !self.probe.is_available().await {
            debug!(op, "remote unavailable; using local store");
            return local.await;
        }
        match remote.await {
            Err(AuthError::Unreachable(reason)) => {
                warn!(op, %reason, "remote unreachable; falling back to local store");
                local.await
            }
            other => other,
        }
    }
}

impl RemoteThenLocal<ApiClient, LocalBackend, HttpProbe> {
    /// The app's standard wiring: REST client, seeded local store, HTTP probe.
    pub async fn from_config(cfg: &ClientConfig) -> anyhow::Result<Self> {
        let remote = ApiClient::new(cfg.api_base_url.clone(), cfg.request_timeout)?;
        let probe = HttpProbe::new(remote.http().clone(), &cfg.api_base_url, cfg.probe_timeout);
        let local = LocalBackend::seeded().await?;
        Ok(Self::new(remote, local, probe))
    }
}

#[async_trait]
impl<R, L, P> AuthBackend for RemoteThenLocal<R, L, P>
where
    R: AuthBackend,
    L: AuthBackend,
    P: Reachability,
{
    async fn authenticate_therapist(&self, email: &str, password: &str) -> AuthResult<SignedSession> {
        self.resolve(
            "authenticate_therapist",
            self.remote.authenticate_therapist(email, password),
            self.local.authenticate_therapist(email, password),
        )
        .await
    }

    async fn authenticate_patient(&self, token_or_email: &str) -> AuthResult<SignedSession> {
        self.resolve(
            "authenticate_patient",
            self.remote.authenticate_patient(token_or_email),
            self.local.authenticate_patient(token_or_email),
        )
        .await
    }

    async fn verify(&self, signed: &SignedSession) -> AuthResult<Session> {
        self.resolve("verify", self.remote.verify(signed), self.local.verify(signed))
            .await
    }

    async fn regenerate_magic_token(&self, caller: &SignedSession, patient_id: &str) -> AuthResult<String> {
        self.resolve(
            "regenerate_magic_token",
            self.remote.regenerate_magic_token(caller, patient_id),
            self.local.regenerate_magic_token(caller, patient_id),
        )
        .await
    }

    async fn logout(&self, signed: &SignedSession) -> AuthResult<()> {
        self.resolve("logout", self.remote.logout(signed), self.local.logout(signed))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::probe::StaticProbe;
    use crate::store::seed::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Remote double that fails every call with a fixed error and counts calls.
    struct FailingRemote {
        error: AuthError,
        calls: AtomicUsize,
    }

    impl FailingRemote {
        fn new(error: AuthError) -> Self {
            Self {
                error,
                calls: AtomicUsize::new(0),
            }
        }

        fn fail<T>(&self) -> AuthResult<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        }
    }

    #[async_trait]
    impl AuthBackend for FailingRemote {
        async fn authenticate_therapist(&self, _: &str, _: &str) -> AuthResult<SignedSession> {
            self.fail()
        }
        async fn authenticate_patient(&self, _: &str) -> AuthResult<SignedSession> {
            self.fail()
        }
        async fn verify(&self, _: &SignedSession) -> AuthResult<Session> {
            self.fail()
        }
        async fn regenerate_magic_token(&self, _: &SignedSession, _: &str) -> AuthResult<String> {
            self.fail()
        }
        async fn logout(&self, _: &SignedSession) -> AuthResult<()> {
            self.fail()
        }
    }

    /// Local double that records whether it was consulted.
    struct CountingLocal {
        inner: LocalBackend,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AuthBackend for CountingLocal {
        async fn authenticate_therapist(&self, e: &str, p: &str) -> AuthResult<SignedSession> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.authenticate_therapist(e, p).await
        }
        async fn authenticate_patient(&self, t: &str) -> AuthResult<SignedSession> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.authenticate_patient(t).await
        }
        async fn verify(&self, s: &SignedSession) -> AuthResult<Session> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.verify(s).await
        }
        async fn regenerate_magic_token(&self, c: &SignedSession, id: &str) -> AuthResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.regenerate_magic_token(c, id).await
        }
        async fn logout(&self, s: &SignedSession) -> AuthResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.logout(s).await
        }
    }

    async fn counting_local() -> CountingLocal {
        CountingLocal {
            inner: LocalBackend::seeded().await.unwrap(),
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn probe_down_goes_straight_to_local() {
        let resolver = RemoteThenLocal::new(
            FailingRemote::new(AuthError::Internal("must not be called".into())),
            counting_local().await,
            StaticProbe(false),
        );
        let signed = resolver.authenticate_patient(DEMO_PATIENT_TOKEN).await.unwrap();
        assert_eq!(signed.session.subject(), DEMO_PATIENT_ID);
        assert_eq!(resolver.remote.calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.local.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_remote_falls_back() {
        let resolver = RemoteThenLocal::new(
            FailingRemote::new(AuthError::Unreachable("connection refused".into())),
            counting_local().await,
            StaticProbe(true),
        );
        let signed = resolver.authenticate_patient("alex-2026").await.unwrap();
        assert_eq!(signed.session.therapist_id(), DEMO_THERAPIST_ID);
        assert!(signed.bearer.is_none());
        assert_eq!(resolver.remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn domain_errors_are_not_masked() {
        for error in [
            AuthError::InvalidCredentials,
            AuthError::InvalidToken,
            AuthError::Validation("email is required".into()),
            AuthError::Unauthorized,
        ] {
            let resolver = RemoteThenLocal::new(
                FailingRemote::new(error.clone()),
                counting_local().await,
                StaticProbe(true),
            );
            let got = resolver
                .authenticate_therapist(DEMO_THERAPIST_EMAIL, DEMO_THERAPIST_PASSWORD)
                .await
                .unwrap_err();
            assert_eq!(got, error);
            assert_eq!(resolver.local.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn closed_port_end_to_end_uses_seeded_store() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cfg = ClientConfig {
            api_base_url: format!("http://{addr}/api/v1"),
            probe_timeout: std::time::Duration::from_millis(300),
            request_timeout: std::time::Duration::from_secs(2),
            session_dir: std::env::temp_dir(),
        };
        let resolver = RemoteThenLocal::from_config(&cfg).await.unwrap();
        let signed = resolver.authenticate_patient("ALEX-2026").await.unwrap();
        assert_eq!(signed.session.subject(), DEMO_PATIENT_ID);
    }
}
