//! Demo dataset: loaded into the server when `SEED_DEMO` is set, and used as
//! the client's offline store.

use time::OffsetDateTime;
use tracing::info;

use super::{MemoryStore, Store, StoreError};
use crate::auth::password::hash_password;
use crate::domain::{Patient, Therapist};

pub const DEMO_THERAPIST_ID: &str = "th_001";
pub const DEMO_THERAPIST_EMAIL: &str = "dr.rivera@bubble.test";
pub const DEMO_THERAPIST_PASSWORD: &str = "bubble-demo";

pub const DEMO_PATIENT_ID: &str = "pa_001";
pub const DEMO_PATIENT_EMAIL: &str = "alex@bubble.test";
pub const DEMO_PATIENT_TOKEN: &str = "ALEX-2026";

pub fn demo_therapist() -> anyhow::Result<Therapist> {
    Ok(Therapist {
        id: DEMO_THERAPIST_ID.into(),
        email: DEMO_THERAPIST_EMAIL.into(),
        password_hash: hash_password(DEMO_THERAPIST_PASSWORD)?,
        name: "Dr. Jordan Rivera".into(),
        profession: Some("Psychotherapist".into()),
        city: Some("Lisbon".into()),
        booking_link: Some("https://cal.bubble.test/rivera".into()),
        created_at: OffsetDateTime::now_utc(),
    })
}

pub fn demo_patients() -> Vec<Patient> {
    let now = OffsetDateTime::now_utc();
    vec![
        Patient {
            id: DEMO_PATIENT_ID.into(),
            therapist_id: DEMO_THERAPIST_ID.into(),
            name: "Alex".into(),
            email: DEMO_PATIENT_EMAIL.into(),
            magic_token: DEMO_PATIENT_TOKEN.into(),
            created_at: now,
        },
        Patient {
            id: "pa_002".into(),
            therapist_id: DEMO_THERAPIST_ID.into(),
            name: "Sam".into(),
            email: "sam@bubble.test".into(),
            magic_token: "SAM-2026".into(),
            created_at: now,
        },
    ]
}

/// Insert the demo records; records that already exist are left alone.
pub async fn seed_demo(store: &dyn Store) -> anyhow::Result<()> {
    match store.insert_therapist(&demo_therapist()?).await {
        Ok(()) | Err(StoreError::Conflict(_)) => {}
        Err(e) => return Err(e.into()),
    }
    for patient in demo_patients() {
        match store.insert_patient(&patient).await {
            Ok(()) | Err(StoreError::Conflict(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    info!(therapist_id = DEMO_THERAPIST_ID, "demo dataset seeded");
    Ok(())
}

impl MemoryStore {
    /// A fresh in-memory store holding the demo dataset.
    pub async fn seeded() -> anyhow::Result<Self> {
        let store = Self::new();
        seed_demo(&store).await?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeding_twice_is_harmless() {
        let store = MemoryStore::seeded().await.unwrap();
        seed_demo(&store).await.unwrap();
        let alex = store.find_patient_by_token(DEMO_PATIENT_TOKEN).await.unwrap();
        assert_eq!(alex.id, DEMO_PATIENT_ID);
        assert_eq!(alex.therapist_id, DEMO_THERAPIST_ID);
        assert_eq!(store.list_patients(DEMO_THERAPIST_ID).await.unwrap().len(), 2);
    }
}
