use serde::{Deserialize, Serialize};

/// Server configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// port: 6443
/// data-dir: /var/lib/poolrs/data
/// token: my-secret-token
/// pool-resync-secs: 30
/// conflict-retry-attempts: 5
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfigFile {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, alias = "data-dir")]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, alias = "server-id")]
    pub server_id: Option<String>,
    #[serde(default, alias = "in-memory")]
    pub in_memory: Option<bool>,
    #[serde(default, alias = "pool-resync-secs")]
    pub pool_resync_secs: Option<u64>,
    #[serde(default, alias = "claim-resync-secs")]
    pub claim_resync_secs: Option<u64>,
    #[serde(default, alias = "conflict-retry-attempts")]
    pub conflict_retry_attempts: Option<u32>,
    #[serde(default, alias = "conflict-retry-backoff-ms")]
    pub conflict_retry_backoff_ms: Option<u64>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let cfg: ServerConfigFile = load_config_file("/nonexistent/poolrs/config.yaml").unwrap();
        assert!(cfg.port.is_none());
        assert!(cfg.conflict_retry_attempts.is_none());
    }

    #[test]
    fn test_kebab_case_aliases() {
        let cfg: ServerConfigFile = serde_yaml::from_str(
            "port: 7443\ndata-dir: /srv/poolrs\nin-memory: true\nconflict-retry-attempts: 9\n",
        )
        .unwrap();
        assert_eq!(cfg.port, Some(7443));
        assert_eq!(cfg.data_dir.as_deref(), Some("/srv/poolrs"));
        assert_eq!(cfg.in_memory, Some(true));
        assert_eq!(cfg.conflict_retry_attempts, Some(9));
    }
}
