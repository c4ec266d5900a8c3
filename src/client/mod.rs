//! Client-side session layer used by the app.
//!
//! - [`AuthBackend`]: the operations the app needs from "the server"
//! - [`remote::ApiClient`]: the REST service over HTTP
//! - [`local::LocalBackend`]: the same operations against an on-device seeded store
//! - [`fallback::RemoteThenLocal`]: tries remote, falls back on connectivity failure only
//! - [`context::SessionContext`]: owns the signed-in session and its persistence

use async_trait::async_trait;

use crate::domain::{Session, SignedSession};
use crate::error::AuthResult;

pub mod context;
pub mod fallback;
pub mod local;
pub mod probe;
pub mod remote;
pub mod storage;

pub use context::{SessionContext, SessionState};
pub use fallback::RemoteThenLocal;
pub use local::LocalBackend;
pub use probe::{HttpProbe, Reachability};
pub use remote::ApiClient;
pub use storage::{FileStorage, LocalStorage, MemoryStorage};

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn authenticate_therapist(&self, email: &str, password: &str) -> AuthResult<SignedSession>;

    async fn authenticate_patient(&self, token_or_email: &str) -> AuthResult<SignedSession>;

    /// Confirm a stored session is still valid, returning its current descriptor.
    async fn verify(&self, signed: &SignedSession) -> AuthResult<Session>;

    async fn regenerate_magic_token(&self, caller: &SignedSession, patient_id: &str) -> AuthResult<String>;

    async fn logout(&self, signed: &SignedSession) -> AuthResult<()>;
}
