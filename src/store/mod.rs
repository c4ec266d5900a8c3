//! Persistence for therapists, patients and chat sessions.
//!
//! `PgStore` is the server's document store; `MemoryStore` backs demos, tests
//! and the client's offline dataset.

use async_trait::async_trait;

use crate::domain::{ChatSession, Message, Patient, Severity, Therapist};

mod memory;
mod postgres;
pub mod seed;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Lookups take already-normalized keys: emails lowercase, tokens uppercase.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_therapist_by_email(&self, email: &str) -> StoreResult<Therapist>;
    async fn find_therapist_by_id(&self, id: &str) -> StoreResult<Therapist>;
    async fn insert_therapist(&self, therapist: &Therapist) -> StoreResult<()>;

    async fn find_patient_by_token(&self, token: &str) -> StoreResult<Patient>;
    async fn find_patient_by_email(&self, email: &str) -> StoreResult<Patient>;
    async fn find_patient_by_id(&self, id: &str) -> StoreResult<Patient>;
    async fn list_patients(&self, therapist_id: &str) -> StoreResult<Vec<Patient>>;
    async fn insert_patient(&self, patient: &Patient) -> StoreResult<()>;

    async fn token_in_use(&self, token: &str) -> StoreResult<bool>;
    /// Overwrite the patient's active token. `Conflict` if another patient holds it.
    async fn save_token(&self, patient_id: &str, token: &str) -> StoreResult<()>;

    async fn find_chat_session(&self, patient_id: &str) -> StoreResult<ChatSession>;
    /// `Conflict` if the patient already has a chat session.
    async fn insert_chat_session(&self, session: &ChatSession) -> StoreResult<()>;

    // Chat updates are applied in place, never as a read-modify-write of the
    // whole document, so concurrent writers cannot drop each other's messages.
    async fn append_messages(&self, patient_id: &str, messages: &[Message]) -> StoreResult<ChatSession>;
    async fn set_chat_severity(&self, patient_id: &str, severity: Severity) -> StoreResult<ChatSession>;
    async fn save_chat_summary(
        &self,
        patient_id: &str,
        summary: &str,
        keywords: &[String],
    ) -> StoreResult<ChatSession>;
}
