use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::auth::password::hash_password;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    /// Argon2 digest of the key required in `x-admin-key` to create therapists.
    /// Admin routes are closed when unset.
    pub admin_key_hash: Option<String>,
    /// Base of the onboarding links handed out with magic tokens.
    pub public_base_url: String,
    pub seed_demo: bool,
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "bubble".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "bubble-app".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
        };
        Ok(Self {
            database_url,
            jwt,
            admin_key_hash: std::env::var("ADMIN_KEY")
                .ok()
                .filter(|v| !v.is_empty())
                .map(|key| hash_password(&key))
                .transpose()?,
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "https://app.bubble.test".into()),
            seed_demo: env_flag("SEED_DEMO"),
        })
    }

    pub fn onboarding_link(&self, token: &str) -> String {
        format!(
            "{}/join?token={}",
            self.public_base_url.trim_end_matches('/'),
            token
        )
    }
}

/// Settings for the client-side session layer.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub probe_timeout: Duration,
    pub request_timeout: Duration,
    pub session_dir: PathBuf,
}

const APP_NAME: &str = "bubble";

/// `BUBBLE_SESSION_DIR` when set, otherwise the per-user local data directory.
fn session_dir(configured: Option<String>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = configured.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let data_dir = dirs::data_local_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not find local data directory"))?;
    Ok(data_dir.join(APP_NAME))
}

impl ClientConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let probe_ms = std::env::var("BUBBLE_PROBE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1500);
        Ok(Self {
            api_base_url: std::env::var("BUBBLE_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api/v1".into()),
            probe_timeout: Duration::from_millis(probe_ms),
            request_timeout: Duration::from_secs(15),
            session_dir: session_dir(std::env::var("BUBBLE_SESSION_DIR").ok())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onboarding_link_trims_trailing_slash() {
        let cfg = AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "s".into(),
                issuer: "i".into(),
                audience: "a".into(),
                ttl_minutes: 5,
            },
            admin_key_hash: None,
            public_base_url: "https://app.example/".into(),
            seed_demo: false,
        };
        assert_eq!(
            cfg.onboarding_link("A1B2C3-2026"),
            "https://app.example/join?token=A1B2C3-2026"
        );
    }

    #[test]
    fn session_dir_prefers_override_then_user_data_dir() {
        assert_eq!(
            session_dir(Some("/srv/bubble-sessions".into())).unwrap(),
            PathBuf::from("/srv/bubble-sessions")
        );
        if let Some(data) = dirs::data_local_dir() {
            let dir = session_dir(None).unwrap();
            assert_eq!(dir, data.join("bubble"));
            assert_eq!(session_dir(Some(String::new())).unwrap(), dir);
        }
    }
}
