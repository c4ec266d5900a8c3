use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::app::HEALTH_PATH;

/// Answers "is the remote service there at all?".
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn is_available(&self) -> bool;
}

/// Bounded-timeout GET against the health endpoint.
///
/// The first answer is kept for the lifetime of the probe.
pub struct HttpProbe {
    client: Client,
    url: String,
    timeout: Duration,
    cached: OnceCell<bool>,
}

impl HttpProbe {
    pub fn new(client: Client, api_base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            url: format!("{}{}", api_base_url.trim_end_matches('/'), HEALTH_PATH),
            timeout,
            cached: OnceCell::new(),
        }
    }

    async fn probe(&self) -> bool {
        let result = self.client.get(&self.url).timeout(self.timeout).send().await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                info!(url = %self.url, "remote reachable");
                true
            }
            Ok(resp) => {
                warn!(url = %self.url, status = %resp.status(), "health check failed");
                false
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "remote unreachable");
                false
            }
        }
    }
}

#[async_trait]
impl Reachability for HttpProbe {
    async fn is_available(&self) -> bool {
        *self.cached.get_or_init(|| self.probe()).await
    }
}

/// Fixed answer; for tests and forced-offline mode.
pub struct StaticProbe(pub bool);

#[async_trait]
impl Reachability for StaticProbe {
    async fn is_available(&self) -> bool {
        self.0
    }
}
