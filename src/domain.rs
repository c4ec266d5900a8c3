use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Therapist record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Therapist {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub name: String,
    pub profession: Option<String>,
    pub city: Option<String>,
    pub booking_link: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Patient record, owned by exactly one therapist.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Patient {
    pub id: String,
    pub therapist_id: String,
    pub name: String,
    pub email: String,
    pub magic_token: String, // single active token, uppercase
    pub created_at: OffsetDateTime,
}

pub fn new_therapist_id() -> String {
    format!("th_{}", Uuid::new_v4().simple())
}

pub fn new_patient_id() -> String {
    format!("pa_{}", Uuid::new_v4().simple())
}

pub fn new_chat_session_id() -> String {
    format!("cs_{}", Uuid::new_v4().simple())
}

/// Session descriptor: who is signed in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Session {
    Therapist {
        therapist_id: String,
        email: String,
    },
    Patient {
        patient_id: String,
        therapist_id: String,
        token: String,
    },
}

impl Session {
    pub fn for_therapist(t: &Therapist) -> Self {
        Session::Therapist {
            therapist_id: t.id.clone(),
            email: t.email.clone(),
        }
    }

    pub fn for_patient(p: &Patient) -> Self {
        Session::Patient {
            patient_id: p.id.clone(),
            therapist_id: p.therapist_id.clone(),
            token: p.magic_token.clone(),
        }
    }

    /// Id of the entity this session belongs to.
    pub fn subject(&self) -> &str {
        match self {
            Session::Therapist { therapist_id, .. } => therapist_id,
            Session::Patient { patient_id, .. } => patient_id,
        }
    }

    pub fn therapist_id(&self) -> &str {
        match self {
            Session::Therapist { therapist_id, .. } | Session::Patient { therapist_id, .. } => {
                therapist_id
            }
        }
    }
}

/// A session descriptor together with the bearer token that proves it.
///
/// `bearer` is `None` when the session was established against the local
/// offline store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedSession {
    pub session: Session,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer: Option<String>,
}

impl SignedSession {
    pub fn local(session: Session) -> Self {
        Self {
            session,
            bearer: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    Patient,
    Ai,
    Therapist,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub author: Author,
    pub text: String,
    pub sent_at: OffsetDateTime,
}

/// Patient self-reported severity, carried on the wire as 1..=3.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub enum Severity {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Severity::Low),
            2 => Ok(Severity::Medium),
            3 => Ok(Severity::High),
            other => Err(format!("severity must be 1, 2 or 3 (got {other})")),
        }
    }
}

impl From<Severity> for u8 {
    fn from(s: Severity) -> Self {
        s as u8
    }
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// The patient's bubble: one thread between a patient and their therapist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSession {
    pub id: String,
    pub patient_id: String,
    pub therapist_id: String,
    pub messages: Vec<Message>,
    pub severity: Option<Severity>,
    pub summary: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub created_at: OffsetDateTime,
}

impl ChatSession {
    pub fn open(patient: &Patient) -> Self {
        Self {
            id: new_chat_session_id(),
            patient_id: patient.id.clone(),
            therapist_id: patient.therapist_id.clone(),
            messages: Vec::new(),
            severity: None,
            summary: None,
            keywords: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_serializes_with_role_tag() {
        let s = Session::Patient {
            patient_id: "pa_001".into(),
            therapist_id: "th_001".into(),
            token: "ALEX-2026".into(),
        };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["role"], "patient");
        assert_eq!(v["patient_id"], "pa_001");
        assert_eq!(v["therapist_id"], "th_001");

        let back: Session = serde_json::from_value(v).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn severity_is_numeric_on_the_wire() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "3");
        let s: Severity = serde_json::from_str("2").unwrap();
        assert_eq!(s, Severity::Medium);
        assert!(serde_json::from_str::<Severity>("4").is_err());
    }

    #[test]
    fn therapist_hash_is_not_serialized() {
        let t = Therapist {
            id: "th_001".into(),
            email: "dr@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            name: "Dr. Rivera".into(),
            profession: None,
            city: None,
            booking_link: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&t).unwrap();
        assert!(!json.contains("argon2"));
    }

    #[test]
    fn generated_ids_carry_prefixes() {
        assert!(new_therapist_id().starts_with("th_"));
        assert!(new_patient_id().starts_with("pa_"));
        assert!(new_chat_session_id().starts_with("cs_"));
    }
}
