//! Storage configuration.

use serde::Deserialize;

/// Tunables for a [`crate::ListenerStorage`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// OS thread name given to the callback delivery thread.
    #[serde(default = "default_delivery_thread_name")]
    pub delivery_thread_name: String,
}

fn default_delivery_thread_name() -> String {
    "ntevent-listener".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            delivery_thread_name: default_delivery_thread_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: StorageConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, StorageConfig::default());
        assert_eq!(config.delivery_thread_name, "ntevent-listener");
    }
}
