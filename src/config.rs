//! Runtime configuration read from the environment.
//!
//! A `.env` file is honoured through `dotenv`. Required variables fail startup
//! with an error naming the variable.

use std::time::Duration;

use anyhow::Context;
use secrecy::Secret;

#[derive(Clone, Debug)]
pub struct Settings {
    pub bind_address: String,
    pub environment: String,
    pub app_url: String,
    pub database_url: Secret<String>,
    pub database_max_connections: u32,
    pub jwt_secret: Secret<String>,
    pub heygen: HeyGenSettings,
    pub stripe: StripeSettings,
    pub storage: Option<StorageSettings>,
    pub status_sync_interval: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct HeyGenSettings {
    pub base_url: String,
    pub api_key: Secret<String>,
}

#[derive(Clone, Debug)]
pub struct StripeSettings {
    pub base_url: String,
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub founder_price_id: String,
    pub pro_price_id: String,
}

#[derive(Clone, Debug)]
pub struct StorageSettings {
    pub base_url: String,
    pub service_key: Secret<String>,
    pub bucket: String,
}

impl Settings {
    #[tracing::instrument(name = "Load settings from environment")]
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup so tests don't touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> anyhow::Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} must be set", key))
        };
        let optional = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let storage = match (lookup("STORAGE_URL"), lookup("STORAGE_SERVICE_KEY")) {
            (Some(base_url), Some(service_key))
                if !base_url.trim().is_empty() && !service_key.trim().is_empty() =>
            {
                Some(StorageSettings {
                    base_url: base_url.trim_end_matches('/').to_string(),
                    service_key: Secret::new(service_key),
                    bucket: optional("STORAGE_BUCKET", "videos"),
                })
            }
            _ => {
                tracing::warn!("STORAGE_URL or STORAGE_SERVICE_KEY not set, completed videos stay on the provider URL");
                None
            }
        };

        let sync_secs: u64 = optional("STATUS_SYNC_INTERVAL_SECS", "30")
            .parse()
            .context("STATUS_SYNC_INTERVAL_SECS must be a whole number of seconds")?;

        let database_max_connections: u32 = optional("DATABASE_MAX_CONNECTIONS", "10")
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        Ok(Self {
            bind_address: optional("BIND_ADDRESS", "0.0.0.0:3001"),
            environment: optional("ENVIRONMENT", "production").to_lowercase(),
            app_url: required("APP_URL")?.trim_end_matches('/').to_string(),
            database_url: Secret::new(required("DATABASE_URL")?),
            database_max_connections,
            jwt_secret: Secret::new(required("JWT_SECRET")?),
            heygen: HeyGenSettings {
                base_url: optional("HEYGEN_BASE_URL", "https://api.heygen.com")
                    .trim_end_matches('/')
                    .to_string(),
                api_key: Secret::new(required("HEYGEN_API_KEY")?),
            },
            stripe: StripeSettings {
                base_url: optional("STRIPE_BASE_URL", "https://api.stripe.com/v1")
                    .trim_end_matches('/')
                    .to_string(),
                secret_key: Secret::new(required("STRIPE_SECRET_KEY")?),
                webhook_secret: Secret::new(required("STRIPE_WEBHOOK_SECRET")?),
                founder_price_id: required("STRIPE_FOUNDER_PRICE_ID")?,
                pro_price_id: required("STRIPE_PRO_PRICE_ID")?,
            },
            storage,
            status_sync_interval: (sync_secs > 0).then(|| Duration::from_secs(sync_secs)),
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}
