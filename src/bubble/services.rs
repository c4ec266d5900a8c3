use std::collections::{BTreeMap, HashSet};

use lazy_static::lazy_static;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::replies::{is_crisis, reply_for};
use crate::domain::{Author, ChatSession, Message, Severity};
use crate::error::{AuthError, AuthResult};
use crate::store::{Store, StoreError};

const MAX_KEYWORDS: usize = 5;
const MIN_KEYWORD_LEN: usize = 4;
const MAX_MESSAGE_LEN: usize = 4000;

lazy_static! {
    static ref STOP_WORDS: HashSet<&'static str> = [
        "about", "after", "again", "also", "been", "before", "being", "could", "didn't", "does",
        "doing", "don't", "even", "feel", "feeling", "from", "have", "having", "just", "know",
        "like", "more", "much", "really", "should", "some", "that", "their", "them", "then",
        "there", "these", "they", "thing", "things", "this", "today", "very", "want", "were",
        "what", "when", "which", "while", "with", "would", "your",
    ]
    .into_iter()
    .collect();
}

/// Fetch the patient's bubble, creating it on first access.
#[instrument(skip(store))]
pub async fn open_bubble(store: &dyn Store, patient_id: &str) -> AuthResult<ChatSession> {
    match store.find_chat_session(patient_id).await {
        Ok(session) => Ok(session),
        Err(StoreError::NotFound(_)) => {
            let patient = store.find_patient_by_id(patient_id).await?;
            let session = ChatSession::open(&patient);
            match store.insert_chat_session(&session).await {
                Ok(()) => {
                    info!(%patient_id, chat_id = %session.id, "bubble opened");
                    Ok(session)
                }
                // opened concurrently by another request
                Err(StoreError::Conflict(_)) => Ok(store.find_chat_session(patient_id).await?),
                Err(e) => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn message_text(text: &str) -> AuthResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AuthError::validation("message text is required"));
    }
    if text.chars().count() > MAX_MESSAGE_LEN {
        return Err(AuthError::validation("message is too long"));
    }
    Ok(text.to_string())
}

fn message(author: Author, text: String) -> Message {
    Message {
        author,
        text,
        sent_at: OffsetDateTime::now_utc(),
    }
}

/// Append a patient message followed by the assistant's canned reply.
#[instrument(skip(store, text))]
pub async fn post_patient_message(
    store: &dyn Store,
    patient_id: &str,
    text: &str,
) -> AuthResult<ChatSession> {
    let text = message_text(text)?;
    open_bubble(store, patient_id).await?;
    if is_crisis(&text) {
        warn!(%patient_id, "crisis language in bubble message");
    }
    let reply = reply_for(&text);
    let batch = [
        message(Author::Patient, text),
        message(Author::Ai, reply.to_string()),
    ];
    Ok(store.append_messages(patient_id, &batch).await?)
}

#[instrument(skip(store, text))]
pub async fn post_therapist_message(
    store: &dyn Store,
    patient_id: &str,
    text: &str,
) -> AuthResult<ChatSession> {
    let text = message_text(text)?;
    open_bubble(store, patient_id).await?;
    Ok(store
        .append_messages(patient_id, &[message(Author::Therapist, text)])
        .await?)
}

#[instrument(skip(store))]
pub async fn set_severity(store: &dyn Store, patient_id: &str, level: u8) -> AuthResult<ChatSession> {
    let severity = Severity::try_from(level).map_err(AuthError::Validation)?;
    open_bubble(store, patient_id).await?;
    let session = store.set_chat_severity(patient_id, severity).await?;
    if severity == Severity::High {
        warn!(%patient_id, "patient reported high severity");
    }
    Ok(session)
}

/// Most frequent meaningful words across patient messages.
pub fn extract_keywords(messages: &[Message], limit: usize) -> Vec<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for m in messages.iter().filter(|m| m.author == Author::Patient) {
        for word in m
            .text
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .map(|w| w.trim_matches('\'').to_lowercase())
        {
            if word.chars().count() < MIN_KEYWORD_LEN || STOP_WORDS.contains(word.as_str()) {
                continue;
            }
            *counts.entry(word).or_default() += 1;
        }
    }
    // BTreeMap iteration is alphabetical, and the sort is stable.
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.into_iter().take(limit).map(|(w, _)| w).collect()
}

pub fn summarize_messages(messages: &[Message], severity: Option<Severity>) -> String {
    let count = |a: Author| messages.iter().filter(|m| m.author == a).count();
    let mut summary = format!(
        "{} patient message(s), {} therapist message(s)",
        count(Author::Patient),
        count(Author::Therapist)
    );
    if let Some(s) = severity {
        summary.push_str(&format!("; severity {}", s.label()));
    }
    if let Some(first) = messages.iter().find(|m| m.author == Author::Patient) {
        let opening: String = first.text.chars().take(120).collect();
        summary.push_str(&format!(". Opened with: \"{opening}\""));
    }
    summary
}

/// Derive and store summary and keywords for the patient's bubble.
#[instrument(skip(store))]
pub async fn summarize(store: &dyn Store, patient_id: &str) -> AuthResult<ChatSession> {
    let session = open_bubble(store, patient_id).await?;
    let summary = summarize_messages(&session.messages, session.severity);
    let keywords = extract_keywords(&session.messages, MAX_KEYWORDS);
    Ok(store
        .save_chat_summary(patient_id, &summary, &keywords)
        .await?)
}
