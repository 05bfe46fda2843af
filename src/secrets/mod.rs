//! Live credential environment
//!
//! Integrations never read `std::env` directly: every credential lookup goes
//! through the `SecretsProvider` trait. Stored user configurations are mirrored
//! into the provider so that a key saved through the API is visible to the
//! Telegram client, the reconciler and `CredentialRequirement.configured`
//! without touching the process environment.

mod env;

pub use env::EnvSecretsProvider;

use crate::Result;
use std::collections::HashMap;

/// Provides access to credentials and environment variables
///
/// The trait is async so that remote secret stores can implement it; the
/// default provider answers synchronously.
#[async_trait::async_trait]
pub trait SecretsProvider: Send + Sync {
    /// Get a single secret value by key
    ///
    /// Returns None if the secret doesn't exist or is empty.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use flowsmith::secrets::{SecretsProvider, EnvSecretsProvider};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let provider = EnvSecretsProvider::new();
    /// let token = provider.get_secret("TELEGRAM_BOT_TOKEN").await?;
    /// # Ok(())
    /// # }
    /// ```
    async fn get_secret(&self, key: &str) -> Result<Option<String>>;

    /// Get a secret value with a default fallback
    async fn get_secret_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_secret(key)
            .await?
            .unwrap_or_else(|| default.to_string()))
    }

    /// Check if a secret exists
    async fn has_secret(&self, key: &str) -> bool {
        self.get_secret(key).await.ok().flatten().is_some()
    }

    /// Get all visible secrets
    async fn get_all_secrets(&self) -> Result<HashMap<String, String>>;

    /// Make a value visible to every subsequent lookup
    async fn set_secret(&self, key: &str, value: &str) -> Result<()>;

    /// Drop a previously set value
    async fn remove_secret(&self, key: &str) -> Result<()>;
}

/// Returns the subset of `keys` that have no value
pub async fn missing_keys(provider: &dyn SecretsProvider, keys: &[String]) -> Vec<String> {
    let mut missing = Vec::new();
    for key in keys {
        if !provider.has_secret(key).await {
            missing.push(key.clone());
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_secrets_provider_trait() {
        let provider = EnvSecretsProvider::isolated();
        provider.set_secret("FLOWSMITH_TEST_SECRET", "secret_value").await.unwrap();

        let secret = provider.get_secret("FLOWSMITH_TEST_SECRET").await.unwrap();
        assert_eq!(secret, Some("secret_value".to_string()));

        let with_default = provider.get_secret_or("MISSING", "default").await.unwrap();
        assert_eq!(with_default, "default");

        assert!(provider.has_secret("FLOWSMITH_TEST_SECRET").await);
        assert!(!provider.has_secret("MISSING").await);

        let all = provider.get_all_secrets().await.unwrap();
        assert!(all.contains_key("FLOWSMITH_TEST_SECRET"));
    }

    #[tokio::test]
    async fn test_missing_keys() {
        let provider = EnvSecretsProvider::isolated();
        provider.set_secret("A_KEY", "1").await.unwrap();

        let keys = vec!["A_KEY".to_string(), "B_KEY".to_string()];
        assert_eq!(missing_keys(&provider, &keys).await, vec!["B_KEY"]);
    }
}
