//! Settings resolution: database row first, environment second.

use std::sync::Arc;

use serde::Serialize;
use trailsync_core::settings::{
    env_var_for, is_secret_key, mask_secret, resolve_setting, GOOGLE_CLIENT_ID,
    GOOGLE_CLIENT_SECRET, KNOWN_KEYS, OPENAI_API_KEY, OPENAI_BASE_URL, OPENAI_MODEL,
    STRAVA_CLIENT_ID, STRAVA_CLIENT_SECRET,
};
use trailsync_core::storage::SettingsRepository;

use crate::config::Config;
use crate::integrations::openai::OpenAiSettings;
use crate::integrations::{ClientCredentials, IntegrationError};
use crate::storage::{with_retry, RetryPolicy};

/// Looks up an environment variable by name.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Where a resolved setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingSource {
    Database,
    Environment,
    Unset,
}

/// A well-known key with its effective, masked value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSetting {
    pub key: &'static str,
    pub source: SettingSource,
    pub value: Option<String>,
}

#[derive(Clone)]
pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    policy: RetryPolicy,
    env: EnvLookup,
    default_openai_base_url: String,
    default_openai_model: String,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepository>, config: &Config) -> Self {
        Self {
            repo,
            policy: config.retry_policy(),
            env: Arc::new(|name: &str| std::env::var(name).ok()),
            default_openai_base_url: config.openai_base_url.clone(),
            default_openai_model: config.openai_model.clone(),
        }
    }

    /// Replaces the process environment, for tests.
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    async fn database_value(&self, key: &str) -> Option<String> {
        match with_retry(&self.policy, "get_setting", || self.repo.get_setting(key)).await {
            Ok(setting) => setting.map(|s| s.value),
            Err(e) => {
                tracing::warn!(key, error = %e, "settings lookup failed, using environment");
                None
            }
        }
    }

    fn env_value(&self, key: &str) -> Option<String> {
        (self.env)(&env_var_for(key))
    }

    /// Effective value of `key`. A failing database read falls back to the
    /// environment.
    pub async fn resolve(&self, key: &str) -> Option<String> {
        let db = self.database_value(key).await;
        resolve_setting(db.as_deref(), self.env_value(key).as_deref())
    }

    async fn credentials(
        &self,
        service: &'static str,
        id_key: &str,
        secret_key: &str,
    ) -> Result<ClientCredentials, IntegrationError> {
        match (self.resolve(id_key).await, self.resolve(secret_key).await) {
            (Some(client_id), Some(client_secret)) => Ok(ClientCredentials {
                client_id,
                client_secret,
            }),
            _ => Err(IntegrationError::NotConfigured(service)),
        }
    }

    pub async fn strava_credentials(&self) -> Result<ClientCredentials, IntegrationError> {
        self.credentials("Strava", STRAVA_CLIENT_ID, STRAVA_CLIENT_SECRET)
            .await
    }

    pub async fn google_credentials(&self) -> Result<ClientCredentials, IntegrationError> {
        self.credentials("Google Photos", GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET)
            .await
    }

    /// API key is required; model and base URL fall back to the server config.
    pub async fn openai_settings(&self) -> Result<OpenAiSettings, IntegrationError> {
        let api_key = self
            .resolve(OPENAI_API_KEY)
            .await
            .ok_or(IntegrationError::NotConfigured("OpenAI"))?;
        let model = self
            .resolve(OPENAI_MODEL)
            .await
            .unwrap_or_else(|| self.default_openai_model.clone());
        let base_url = self
            .resolve(OPENAI_BASE_URL)
            .await
            .unwrap_or_else(|| self.default_openai_base_url.clone());
        Ok(OpenAiSettings {
            base_url,
            api_key,
            model,
        })
    }

    /// Every well-known key with its source; secrets are masked.
    pub async fn describe(&self) -> Vec<ResolvedSetting> {
        let mut out = Vec::with_capacity(KNOWN_KEYS.len());
        for key in KNOWN_KEYS {
            let db = resolve_setting(self.database_value(key).await.as_deref(), None);
            let env = resolve_setting(None, self.env_value(key).as_deref());
            let (source, value) = match (db, env) {
                (Some(v), _) => (SettingSource::Database, Some(v)),
                (None, Some(v)) => (SettingSource::Environment, Some(v)),
                (None, None) => (SettingSource::Unset, None),
            };
            let value = match value {
                Some(v) if is_secret_key(key) => Some(mask_secret(&v)),
                other => other,
            };
            out.push(ResolvedSetting { key, source, value });
        }
        out
    }
}
