use crate::pool::DEFAULT_BUCKETS;
use serde::{Deserialize, Serialize};

// ─── Config ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,

    // Debug & logging
    pub debug: bool,
    pub dry_run: bool,
    pub logging_to_file: bool,
    pub log_dir: Option<String>,

    // Request body size limit (MB)
    pub body_limit_mb: usize,

    // Engine knobs
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BatchConfig {
    /// Bounded worker concurrency for batch translation.
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PoolConfig {
    pub buckets: Vec<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8323,
            debug: false,
            dry_run: false,
            logging_to_file: false,
            log_dir: None,
            body_limit_mb: 10,
            cache: CacheConfig::default(),
            batch: BatchConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1024,
            ttl_secs: 300,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            buckets: DEFAULT_BUCKETS.to_vec(),
        }
    }
}

impl Config {
    /// Load config from a YAML file, sanitize, and validate.
    pub fn load(path: &str) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml_ng::from_str(&contents)?;
        config.sanitize();
        config.validate()?;
        Ok(config)
    }

    /// Clamp out-of-range values instead of rejecting them.
    fn sanitize(&mut self) {
        if self.batch.workers == 0 {
            self.batch.workers = 1;
        }
        if self.cache.max_entries == 0 {
            self.cache.max_entries = 1;
        }
        self.pool.buckets.retain(|&b| b > 0);
        self.pool.buckets.sort_unstable();
        self.pool.buckets.dedup();
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.body_limit_mb == 0 {
            anyhow::bail!("body-limit-mb must be at least 1");
        }
        if self.pool.buckets.is_empty() {
            anyhow::bail!("pool.buckets must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8323);
        assert!(config.cache.enabled);
        assert_eq!(config.batch.workers, 4);
        assert_eq!(config.pool.buckets.len(), 8);
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "port: 9000\ncache:\n  max-entries: 16\n  ttl-secs: 60\nbatch:\n  workers: 0\n",
        )
        .unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.cache.max_entries, 16);
        assert_eq!(config.cache.ttl_secs, 60);
        // workers clamped to the minimum of 1
        assert_eq!(config.batch.workers, 1);
    }

    #[test]
    fn test_invalid_body_limit_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "body-limit-mb: 0\n").unwrap();
        assert!(Config::load(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_bucket_sanitize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "pool:\n  buckets: [512, 0, 64, 512]\n").unwrap();
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.pool.buckets, vec![64, 512]);
    }
}
