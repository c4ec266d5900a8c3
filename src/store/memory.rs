use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Store, StoreError, StoreResult};
use crate::domain::{ChatSession, Message, Patient, Severity, Therapist};

#[derive(Default)]
struct Inner {
    therapists: HashMap<String, Therapist>,
    patients: HashMap<String, Patient>,
    chats: HashMap<String, ChatSession>, // keyed by patient id
}

/// In-process store. Lookups are linear scans; datasets are demo-sized.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update_chat(
        &self,
        patient_id: &str,
        f: impl FnOnce(&mut ChatSession),
    ) -> StoreResult<ChatSession> {
        let mut inner = self.inner.write().await;
        let chat = inner
            .chats
            .get_mut(patient_id)
            .ok_or_else(|| StoreError::NotFound(format!("chat session for {patient_id}")))?;
        f(chat);
        Ok(chat.clone())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_therapist_by_email(&self, email: &str) -> StoreResult<Therapist> {
        let inner = self.inner.read().await;
        inner
            .therapists
            .values()
            .find(|t| t.email == email)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("therapist {email}")))
    }

    async fn find_therapist_by_id(&self, id: &str) -> StoreResult<Therapist> {
        let inner = self.inner.read().await;
        inner
            .therapists
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("therapist {id}")))
    }

    async fn insert_therapist(&self, therapist: &Therapist) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.therapists.values().any(|t| t.email == therapist.email) {
            return Err(StoreError::Conflict(format!("therapist {}", therapist.email)));
        }
        inner
            .therapists
            .insert(therapist.id.clone(), therapist.clone());
        Ok(())
    }

    async fn find_patient_by_token(&self, token: &str) -> StoreResult<Patient> {
        let inner = self.inner.read().await;
        inner
            .patients
            .values()
            .find(|p| p.magic_token == token)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("patient for token".into()))
    }

    async fn find_patient_by_email(&self, email: &str) -> StoreResult<Patient> {
        let inner = self.inner.read().await;
        inner
            .patients
            .values()
            .find(|p| p.email == email)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("patient {email}")))
    }

    async fn find_patient_by_id(&self, id: &str) -> StoreResult<Patient> {
        let inner = self.inner.read().await;
        inner
            .patients
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("patient {id}")))
    }

    async fn list_patients(&self, therapist_id: &str) -> StoreResult<Vec<Patient>> {
        let inner = self.inner.read().await;
        let mut out: Vec<Patient> = inner
            .patients
            .values()
            .filter(|p| p.therapist_id == therapist_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn insert_patient(&self, patient: &Patient) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.patients.contains_key(&patient.id) {
            return Err(StoreError::Conflict(format!("patient {}", patient.id)));
        }
        if inner.patients.values().any(|p| p.email == patient.email) {
            return Err(StoreError::Conflict(format!("patient {}", patient.email)));
        }
        if inner
            .patients
            .values()
            .any(|p| p.magic_token == patient.magic_token)
        {
            return Err(StoreError::Conflict("magic token".into()));
        }
        inner.patients.insert(patient.id.clone(), patient.clone());
        Ok(())
    }

    async fn token_in_use(&self, token: &str) -> StoreResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner.patients.values().any(|p| p.magic_token == token))
    }

    async fn save_token(&self, patient_id: &str, token: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner
            .patients
            .values()
            .any(|p| p.id != patient_id && p.magic_token == token)
        {
            return Err(StoreError::Conflict("magic token".into()));
        }
        let patient = inner
            .patients
            .get_mut(patient_id)
            .ok_or_else(|| StoreError::NotFound(format!("patient {patient_id}")))?;
        patient.magic_token = token.to_string();
        Ok(())
    }

    async fn find_chat_session(&self, patient_id: &str) -> StoreResult<ChatSession> {
        let inner = self.inner.read().await;
        inner
            .chats
            .get(patient_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("chat session for {patient_id}")))
    }

    async fn insert_chat_session(&self, session: &ChatSession) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.chats.contains_key(&session.patient_id) {
            return Err(StoreError::Conflict(format!("chat session for {}", session.patient_id)));
        }
        inner
            .chats
            .insert(session.patient_id.clone(), session.clone());
        Ok(())
    }

    async fn append_messages(&self, patient_id: &str, messages: &[Message]) -> StoreResult<ChatSession> {
        self.update_chat(patient_id, |c| c.messages.extend_from_slice(messages))
            .await
    }

    async fn set_chat_severity(&self, patient_id: &str, severity: Severity) -> StoreResult<ChatSession> {
        self.update_chat(patient_id, |c| c.severity = Some(severity))
            .await
    }

    async fn save_chat_summary(
        &self,
        patient_id: &str,
        summary: &str,
        keywords: &[String],
    ) -> StoreResult<ChatSession> {
        self.update_chat(patient_id, |c| {
            c.summary = Some(summary.to_string());
            c.keywords = keywords.to_vec();
        })
        .await
    }
}
