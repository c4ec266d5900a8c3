use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct PostMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeverityRequest {
    pub level: u8, // 1=low, 2=medium, 3=high
}
