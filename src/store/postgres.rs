use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};
use time::OffsetDateTime;

use super::{Store, StoreError, StoreResult};
use crate::domain::{ChatSession, Message, Patient, Severity, Therapist};

const UNIQUE_VIOLATION: &str = "23505";

/// Postgres-backed store. Chat sessions are kept as JSONB documents.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

fn map_err(what: impl Into<String>) -> impl FnOnce(sqlx::Error) -> StoreError {
    let what = what.into();
    move |e| match e {
        sqlx::Error::RowNotFound => StoreError::NotFound(what),
        sqlx::Error::Database(ref db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Conflict(what)
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

#[derive(FromRow)]
struct ChatRow {
    id: String,
    patient_id: String,
    therapist_id: String,
    messages: Json<Vec<Message>>,
    severity: Option<i16>,
    summary: Option<String>,
    keywords: Json<Vec<String>>,
    created_at: OffsetDateTime,
}

impl TryFrom<ChatRow> for ChatSession {
    type Error = StoreError;

    fn try_from(r: ChatRow) -> Result<Self, Self::Error> {
        let severity = r
            .severity
            .map(|v| {
                u8::try_from(v)
                    .map_err(|_| format!("severity out of range: {v}"))
                    .and_then(Severity::try_from)
            })
            .transpose()
            .map_err(StoreError::Backend)?;
        Ok(ChatSession {
            id: r.id,
            patient_id: r.patient_id,
            therapist_id: r.therapist_id,
            messages: r.messages.0,
            severity,
            summary: r.summary,
            keywords: r.keywords.0,
            created_at: r.created_at,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_therapist_by_email(&self, email: &str) -> StoreResult<Therapist> {
        sqlx::query_as::<_, Therapist>(
            r#"
            SELECT id, email, password_hash, name, profession, city, booking_link, created_at
            FROM therapists
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_one(&self.db)
        .await
        .map_err(map_err(format!("therapist {email}")))
    }

    async fn find_therapist_by_id(&self, id: &str) -> StoreResult<Therapist> {
        sqlx::query_as::<_, Therapist>(
            r#"
            SELECT id, email, password_hash, name, profession, city, booking_link, created_at
            FROM therapists
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await
        .map_err(map_err(format!("therapist {id}")))
    }

    async fn insert_therapist(&self, t: &Therapist) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO therapists (id, email, password_hash, name, profession, city, booking_link, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&t.id)
        .bind(&t.email)
        .bind(&t.password_hash)
        .bind(&t.name)
        .bind(&t.profession)
        .bind(&t.city)
        .bind(&t.booking_link)
        .bind(t.created_at)
        .execute(&self.db)
        .await
        .map_err(map_err(format!("therapist {}", t.email)))?;
        Ok(())
    }

    async fn find_patient_by_token(&self, token: &str) -> StoreResult<Patient> {
        sqlx::query_as::<_, Patient>(
            r#"
            SELECT id, therapist_id, name, email, magic_token, created_at
            FROM patients
            WHERE magic_token = $1
            "#,
        )
        .bind(token)
        .fetch_one(&self.db)
        .await
        .map_err(map_err("patient for token"))
    }

    async fn find_patient_by_email(&self, email: &str) -> StoreResult<Patient> {
        sqlx::query_as::<_, Patient>(
            r#"
            SELECT id, therapist_id, name, email, magic_token, created_at
            FROM patients
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_one(&self.db)
        .await
        .map_err(map_err(format!("patient {email}")))
    }

    async fn find_patient_by_id(&self, id: &str) -> StoreResult<Patient> {
        sqlx::query_as::<_, Patient>(
            r#"
            SELECT id, therapist_id, name, email, magic_token, created_at
            FROM patients
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await
        .map_err(map_err(format!("patient {id}")))
    }

    async fn list_patients(&self, therapist_id: &str) -> StoreResult<Vec<Patient>> {
        sqlx::query_as::<_, Patient>(
            r#"
            SELECT id, therapist_id, name, email, magic_token, created_at
            FROM patients
            WHERE therapist_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(therapist_id)
        .fetch_all(&self.db)
        .await
        .map_err(map_err(format!("patients of {therapist_id}")))
    }

    async fn insert_patient(&self, p: &Patient) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO patients (id, therapist_id, name, email, magic_token, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&p.id)
        .bind(&p.therapist_id)
        .bind(&p.name)
        .bind(&p.email)
        .bind(&p.magic_token)
        .bind(p.created_at)
        .execute(&self.db)
        .await
        .map_err(map_err(format!("patient {}", p.email)))?;
        Ok(())
    }

    async fn token_in_use(&self, token: &str) -> StoreResult<bool> {
        let (exists,): (bool,) =
            sqlx::query_as(r#"SELECT EXISTS (SELECT 1 FROM patients WHERE magic_token = $1)"#)
                .bind(token)
                .fetch_one(&self.db)
                .await
                .map_err(map_err("magic token"))?;
        Ok(exists)
    }

    async fn save_token(&self, patient_id: &str, token: &str) -> StoreResult<()> {
        let res = sqlx::query(r#"UPDATE patients SET magic_token = $2 WHERE id = $1"#)
            .bind(patient_id)
            .bind(token)
            .execute(&self.db)
            .await
            .map_err(map_err("magic token"))?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("patient {patient_id}")));
        }
        Ok(())
    }

    async fn find_chat_session(&self, patient_id: &str) -> StoreResult<ChatSession> {
        let row = sqlx::query_as::<_, ChatRow>(
            r#"
            SELECT id, patient_id, therapist_id, messages, severity, summary, keywords, created_at
            FROM chat_sessions
            WHERE patient_id = $1
            "#,
        )
        .bind(patient_id)
        .fetch_one(&self.db)
        .await
        .map_err(map_err(format!("chat session for {patient_id}")))?;
        row.try_into()
    }

    async fn insert_chat_session(&self, s: &ChatSession) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_sessions (id, patient_id, therapist_id, messages, severity, summary, keywords, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&s.id)
        .bind(&s.patient_id)
        .bind(&s.therapist_id)
        .bind(Json(&s.messages))
        .bind(s.severity.map(|v| u8::from(v) as i16))
        .bind(&s.summary)
        .bind(Json(&s.keywords))
        .bind(s.created_at)
        .execute(&self.db)
        .await
        .map_err(map_err(format!("chat session for {}", s.patient_id)))?;
        Ok(())
    }

    async fn append_messages(&self, patient_id: &str, messages: &[Message]) -> StoreResult<ChatSession> {
        let row = sqlx::query_as::<_, ChatRow>(
            r#"
            UPDATE chat_sessions
               SET messages = messages || $2::jsonb
             WHERE patient_id = $1
            RETURNING id, patient_id, therapist_id, messages, severity, summary, keywords, created_at
            "#,
        )
        .bind(patient_id)
        .bind(Json(messages))
        .fetch_one(&self.db)
        .await
        .map_err(map_err(format!("chat session for {patient_id}")))?;
        row.try_into()
    }

    async fn set_chat_severity(&self, patient_id: &str, severity: Severity) -> StoreResult<ChatSession> {
        let row = sqlx::query_as::<_, ChatRow>(
            r#"
            UPDATE chat_sessions
               SET severity = $2
             WHERE patient_id = $1
            RETURNING id, patient_id, therapist_id, messages, severity, summary, keywords, created_at
            "#,
        )
        .bind(patient_id)
        .bind(u8::from(severity) as i16)
        .fetch_one(&self.db)
        .await
        .map_err(map_err(format!("chat session for {patient_id}")))?;
        row.try_into()
    }

    async fn save_chat_summary(
        &self,
        patient_id: &str,
        summary: &str,
        keywords: &[String],
    ) -> StoreResult<ChatSession> {
        let row = sqlx::query_as::<_, ChatRow>(
            r#"
            UPDATE chat_sessions
               SET summary = $2, keywords = $3
             WHERE patient_id = $1
            RETURNING id, patient_id, therapist_id, messages, severity, summary, keywords, created_at
            "#,
        )
        .bind(patient_id)
        .bind(summary)
        .bind(Json(keywords))
        .fetch_one(&self.db)
        .await
        .map_err(map_err(format!("chat session for {patient_id}")))?;
        row.try_into()
    }
}
