//! API key lookup for the generation service

use hive_core::{GenerationConfig, HiveError, Result};
use std::env;

/// Read the API key from the environment variable named by the config
pub fn resolve_api_key(config: &GenerationConfig) -> Result<String> {
    api_key_from_env(&config.api_key_env)
}

/// Read a non-empty API key from `var`
pub fn api_key_from_env(var: &str) -> Result<String> {
    match env::var(var) {
        Ok(key) if !key.trim().is_empty() => {
            tracing::debug!("Using API key from {}", var);
            Ok(key.trim().to_string())
        }
        Ok(_) => Err(HiveError::Auth(format!("{} is set but empty", var))),
        Err(_) => Err(HiveError::Auth(format!(
            "No API key found. Set {}=sk-ant-... or point [generation].api_key_env at another variable",
            var
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes env mutations across tests
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env_var<F, R>(key: &str, value: Option<&str>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_LOCK.lock().unwrap();
        let original = env::var(key).ok();

        match value {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
        let result = f();
        match original {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
        result
    }

    #[test]
    fn test_reads_configured_variable() {
        let config = GenerationConfig {
            api_key_env: "HIVE_AUTH_TEST_KEY".to_string(),
            ..GenerationConfig::default()
        };
        with_env_var("HIVE_AUTH_TEST_KEY", Some(" sk-ant-123 \n"), || {
            assert_eq!(resolve_api_key(&config).unwrap(), "sk-ant-123");
        });
    }

    #[test]
    fn test_missing_variable() {
        with_env_var("HIVE_AUTH_TEST_MISSING", None, || {
            let err = api_key_from_env("HIVE_AUTH_TEST_MISSING").unwrap_err();
            assert!(matches!(err, HiveError::Auth(_)));
            assert!(err.to_string().contains("HIVE_AUTH_TEST_MISSING"));
        });
    }

    #[test]
    fn test_empty_variable() {
        with_env_var("HIVE_AUTH_TEST_EMPTY", Some("   "), || {
            assert!(api_key_from_env("HIVE_AUTH_TEST_EMPTY").is_err());
        });
    }
}
