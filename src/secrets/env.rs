//! Environment variable based secrets provider
//!
//! Reads the process environment, with an in-process override layer on top for
//! values saved through the configuration API.

use super::*;
use parking_lot::RwLock;

/// Default secrets provider
///
/// This is the ONLY place in the crate where `std::env::var()` and
/// `std::env::vars()` are called. Overrides shadow the environment and are
/// never written back to it.
///
/// ```no_run
/// use flowsmith::secrets::{SecretsProvider, EnvSecretsProvider};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = EnvSecretsProvider::new();
/// provider.set_secret("TELEGRAM_CHAT_ID", "12345").await?;
/// assert!(provider.has_secret("TELEGRAM_CHAT_ID").await);
/// # Ok(())
/// # }
/// ```
pub struct EnvSecretsProvider {
    overrides: RwLock<HashMap<String, String>>,
    read_env: bool,
}

impl EnvSecretsProvider {
    /// Provider backed by the process environment
    pub fn new() -> Self {
        Self {
            overrides: RwLock::new(HashMap::new()),
            read_env: true,
        }
    }

    /// Provider that ignores the process environment
    ///
    /// Only values set through `set_secret` are visible. Used by tests so a
    /// developer's exported tokens cannot leak into assertions.
    pub fn isolated() -> Self {
        Self {
            overrides: RwLock::new(HashMap::new()),
            read_env: false,
        }
    }
}

impl Default for EnvSecretsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SecretsProvider for EnvSecretsProvider {
    async fn get_secret(&self, key: &str) -> Result<Option<String>> {
        if let Some(value) = self.overrides.read().get(key) {
            return Ok(Some(value.clone()).filter(|v| !v.is_empty()));
        }
        if !self.read_env {
            return Ok(None);
        }
        Ok(std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    async fn get_all_secrets(&self) -> Result<HashMap<String, String>> {
        let mut all: HashMap<String, String> = if self.read_env {
            std::env::vars().collect()
        } else {
            HashMap::new()
        };
        all.extend(
            self.overrides
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Ok(all)
    }

    async fn set_secret(&self, key: &str, value: &str) -> Result<()> {
        self.overrides
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_secret(&self, key: &str) -> Result<()> {
        self.overrides.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_env_provider_reads_process_env() {
        unsafe {
            std::env::set_var("FLOWSMITH_TEST_ENV_VAR", "test_value");
        }

        let provider = EnvSecretsProvider::new();
        let result = provider.get_secret("FLOWSMITH_TEST_ENV_VAR").await.unwrap();
        assert_eq!(result, Some("test_value".to_string()));

        unsafe {
            std::env::remove_var("FLOWSMITH_TEST_ENV_VAR");
        }
    }

    #[tokio::test]
    async fn test_override_shadows_env_without_mutating_it() {
        unsafe {
            std::env::set_var("FLOWSMITH_SHADOWED", "from_env");
        }

        let provider = EnvSecretsProvider::new();
        provider.set_secret("FLOWSMITH_SHADOWED", "from_store").await.unwrap();
        assert_eq!(
            provider.get_secret("FLOWSMITH_SHADOWED").await.unwrap(),
            Some("from_store".to_string())
        );
        assert_eq!(std::env::var("FLOWSMITH_SHADOWED").unwrap(), "from_env");

        provider.remove_secret("FLOWSMITH_SHADOWED").await.unwrap();
        assert_eq!(
            provider.get_secret("FLOWSMITH_SHADOWED").await.unwrap(),
            Some("from_env".to_string())
        );

        unsafe {
            std::env::remove_var("FLOWSMITH_SHADOWED");
        }
    }

    #[tokio::test]
    async fn test_isolated_provider_ignores_env() {
        unsafe {
            std::env::set_var("FLOWSMITH_ISOLATED_VAR", "visible");
        }

        let provider = EnvSecretsProvider::isolated();
        assert_eq!(provider.get_secret("FLOWSMITH_ISOLATED_VAR").await.unwrap(), None);
        assert!(provider.get_all_secrets().await.unwrap().is_empty());

        unsafe {
            std::env::remove_var("FLOWSMITH_ISOLATED_VAR");
        }
    }

    #[tokio::test]
    async fn test_empty_values_count_as_missing() {
        let provider = EnvSecretsProvider::isolated();
        provider.set_secret("BLANK", "").await.unwrap();
        assert!(!provider.has_secret("BLANK").await);
    }
}
