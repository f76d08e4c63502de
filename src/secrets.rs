use crate::util::env::env_opt;
use anyhow::{anyhow, Result};
use tracing::debug;

/// Secret id under which the Steam Web API key is stored.
pub const STEAM_API_KEY_SECRET_ID: &str = "SteamAPIKey";

/// Resolves named credentials from an external store.
#[async_trait::async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret(&self, key: &str) -> Result<String>;
}

/// Reads secrets from process env: secret `SteamAPIKey` lives in
/// `SECRET_STEAMAPIKEY`.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretProvider;

impl EnvSecretProvider {
    pub fn env_key(secret_id: &str) -> String {
        format!("SECRET_{}", secret_id.to_ascii_uppercase())
    }
}

#[async_trait::async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get_secret(&self, key: &str) -> Result<String> {
        let env_key = Self::env_key(key);
        debug!(secret = key, env_key = %env_key, "resolving secret from env");
        env_opt(&env_key).ok_or_else(|| anyhow!("secret {key} not set (expected {env_key})"))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_key_is_prefixed_and_upper_cased() {
        assert_eq!(
            EnvSecretProvider::env_key(STEAM_API_KEY_SECRET_ID),
            "SECRET_STEAMAPIKEY"
        );
    }

    #[tokio::test]
    async fn missing_secret_is_an_error() {
        let err = EnvSecretProvider
            .get_secret("DefinitelyNotConfiguredForTests")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("SECRET_DEFINITELYNOTCONFIGUREDFORTESTS"));
    }
}
