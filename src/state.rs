use std::sync::Arc;

use tracing::info;

use crate::auth::password::hash_password;
use crate::config::{AppConfig, JwtConfig};
use crate::store::{seed, MemoryStore, PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store: Arc<dyn Store> = match &config.database_url {
            Some(url) => {
                let pg = PgStore::connect(url).await?;
                // Run migrations if present
                if let Err(e) = sqlx::migrate!("./migrations").run(pg.pool()).await {
                    tracing::warn!(error = %e, "migration failed; continuing");
                }
                Arc::new(pg)
            }
            None => {
                info!("DATABASE_URL not set; using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        if config.seed_demo {
            seed::seed_demo(store.as_ref()).await?;
        }

        Ok(Self { store, config })
    }

    pub fn from_parts(store: Arc<dyn Store>, config: Arc<AppConfig>) -> Self {
        Self { store, config }
    }

    /// State over the given store with fixed test settings.
    pub fn fake(store: Arc<dyn Store>) -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            admin_key_hash: hash_password("test-admin").ok(),
            public_base_url: "https://app.bubble.test".into(),
            seed_demo: false,
        });
        Self { store, config }
    }
}
