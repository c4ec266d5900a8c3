//! Canned assistant replies, picked by keyword.

use lazy_static::lazy_static;
use regex::Regex;

const CRISIS_REPLY: &str = "It sounds like you are going through something very painful. \
If you are in danger right now, please call your local emergency number. \
Your therapist has been notified of this message.";

const DEFAULT_REPLY: &str = "Thank you for sharing. Your therapist will read this before your next session.";

/// First matching row wins; crisis terms are checked before everything else.
const TABLE: &[(&[&str], &str)] = &[
    (
        &["suicide", "kill myself", "hurt myself", "end it all", "self-harm"],
        CRISIS_REPLY,
    ),
    (
        &["anxious", "anxiety", "panic", "nervous", "worried"],
        "Anxiety can feel overwhelming. Try slowing your breath: in for four, hold for four, out for six.",
    ),
    (
        &["sad", "down", "depressed", "empty", "cry", "crying"],
        "I'm sorry you're feeling low. Noticing it and writing it down is already a step.",
    ),
    (
        &["angry", "furious", "frustrated", "irritated"],
        "Anger often points at something that matters to you. What was happening just before you felt it?",
    ),
    (
        &["sleep", "insomnia", "tired", "exhausted"],
        "Rest has a big effect on mood. It might help to note when you went to bed and woke up this week.",
    ),
    (
        &["better", "good", "happy", "calm", "grateful"],
        "That's good to hear. What helped you feel this way?",
    ),
];

lazy_static! {
    // One case-insensitive whole-word pattern per table row.
    static ref MATCHERS: Vec<(Regex, &'static str)> = TABLE
        .iter()
        .map(|(keys, reply)| {
            let words: Vec<String> = keys.iter().map(|k| regex::escape(k)).collect();
            let re = Regex::new(&format!(r"(?i)\b(?:{})\b", words.join("|"))).unwrap();
            (re, *reply)
        })
        .collect();
}

pub fn reply_for(text: &str) -> &'static str {
    MATCHERS
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, reply)| *reply)
        .unwrap_or(DEFAULT_REPLY)
}

pub fn is_crisis(text: &str) -> bool {
    reply_for(text) == CRISIS_REPLY
}
