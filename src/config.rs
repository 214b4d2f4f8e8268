// Engine configuration: the on-disk JSON config under the project's
// state directory (§6) plus a validating builder in the style of
// `builders.rs` upstream — invalid values simply cannot be constructed.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageEngineKind {
    InMemory,
    EmbeddedKv,
    EmbeddedSql,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalIndexConfig {
    pub port: u16,
    pub binary_dir: PathBuf,
    #[serde(with = "duration_secs")]
    pub reindex_min_interval: Duration,
    #[serde(with = "duration_secs")]
    pub health_poll_timeout: Duration,
}

impl Default for LexicalIndexConfig {
    fn default() -> Self {
        Self {
            port: 6070,
            binary_dir: PathBuf::from("."),
            reindex_min_interval: Duration::from_secs(30),
            health_poll_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    pub bloom_false_positive_rate: f64,
    pub bloom_expected_items: usize,
    pub lru_capacity: usize,
    #[serde(with = "opt_duration_secs")]
    pub lru_ttl: Option<Duration>,
    #[serde(with = "duration_ms")]
    pub heat_decay_interval: Duration,
    pub heat_decay_factor: f64,
    pub heat_hot_threshold: f64,
    pub heat_cold_threshold: f64,
    pub worker_min: usize,
    pub worker_max: usize,
    pub worker_max_queue: usize,
    pub batch_max_size: usize,
    #[serde(with = "duration_ms")]
    pub batch_max_wait: Duration,
    pub batch_max_retries: u32,
    #[serde(with = "duration_ms")]
    pub batch_retry_delay: Duration,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            bloom_false_positive_rate: 0.01,
            bloom_expected_items: 10_000,
            lru_capacity: 1_000,
            lru_ttl: Some(Duration::from_secs(600)),
            heat_decay_interval: Duration::from_millis(60_000),
            heat_decay_factor: 0.9,
            heat_hot_threshold: 0.7,
            heat_cold_threshold: 0.1,
            worker_min: 2,
            worker_max: num_cpus::get().max(2),
            worker_max_queue: 10_000,
            batch_max_size: 256,
            batch_max_wait: Duration::from_millis(100),
            batch_max_retries: 5,
            batch_retry_delay: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(with = "duration_ms")]
    pub session_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub max_session_duration: Duration,
    pub retention_days: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_millis(30 * 60 * 1000),
            max_session_duration: Duration::from_millis(8 * 60 * 60 * 1000),
            retention_days: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub root: PathBuf,
    pub languages: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub embedding_model: String,
    pub storage_engine: StorageEngineKind,
    pub lexical_index: LexicalIndexConfig,
    pub optimization: OptimizationConfig,
    pub ledger: LedgerConfig,
}

impl EngineConfig {
    /// The state directory under the project root: `<root>/.codegraph`.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(".codegraph")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.state_dir().join("data")
    }

    pub fn lexical_dir(&self) -> PathBuf {
        self.state_dir().join("lexical")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir().join("logs")
    }

    /// Load `<root>/.codegraph/config.json` if present, else defaults.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config_path = root.join(".codegraph").join("config.json");
        if config_path.exists() {
            let raw = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            let mut config: Self = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            config.root = root;
            Ok(config)
        } else {
            Ok(Self::defaults_for(root))
        }
    }

    pub fn defaults_for(root: PathBuf) -> Self {
        Self {
            root,
            languages: vec!["typescript".into(), "javascript".into(), "python".into(), "rust".into()],
            exclude_patterns: vec!["node_modules".into(), "target".into(), ".git".into()],
            embedding_model: "default".into(),
            storage_engine: StorageEngineKind::InMemory,
            lexical_index: LexicalIndexConfig::default(),
            optimization: OptimizationConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }

    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(self.state_dir())?;
        let path = self.state_dir().join("config.json");
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

/// Validating builder for [`EngineConfig`], mirroring the
/// construct-cannot-be-invalid discipline of `types::ValidatedLimit`.
pub struct EngineConfigBuilder {
    root: PathBuf,
    languages: Vec<String>,
    exclude_patterns: Vec<String>,
    embedding_model: String,
    storage_engine: StorageEngineKind,
    lexical_port: u16,
    optimization: OptimizationConfig,
    ledger: LedgerConfig,
}

impl EngineConfigBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let defaults = EngineConfig::defaults_for(root.into());
        Self {
            root: defaults.root,
            languages: defaults.languages,
            exclude_patterns: defaults.exclude_patterns,
            embedding_model: defaults.embedding_model,
            storage_engine: defaults.storage_engine,
            lexical_port: defaults.lexical_index.port,
            optimization: defaults.optimization,
            ledger: defaults.ledger,
        }
    }

    pub fn languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    pub fn storage_engine(mut self, engine: StorageEngineKind) -> Self {
        self.storage_engine = engine;
        self
    }

    pub fn lexical_port(mut self, port: u16) -> Self {
        self.lexical_port = port;
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        ensure!(self.lexical_port > 0, "lexical index port must be non-zero");
        ensure!(
            self.optimization.worker_min <= self.optimization.worker_max,
            "worker_min must be <= worker_max"
        );
        ensure!(
            self.optimization.bloom_false_positive_rate > 0.0
                && self.optimization.bloom_false_positive_rate < 1.0,
            "bloom false positive rate must be in (0, 1)"
        );
        let mut lexical_index = LexicalIndexConfig::default();
        lexical_index.port = self.lexical_port;
        Ok(EngineConfig {
            root: self.root,
            languages: self.languages,
            exclude_patterns: self.exclude_patterns,
            embedding_model: self.embedding_model,
            storage_engine: self.storage_engine,
            lexical_index,
            optimization: self.optimization,
            ledger: self.ledger,
        })
    }
}

fn find_config_dir(root: &Path) -> PathBuf {
    root.join(".codegraph")
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_some(&d.map(|v| v.as_secs()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_inverted_worker_bounds() {
        let mut builder = EngineConfigBuilder::new("/tmp/project");
        builder.optimization.worker_min = 10;
        builder.optimization.worker_max = 2;
        assert!(builder.build().is_err());
    }

    #[test]
    fn builder_produces_derived_paths() {
        let config = EngineConfigBuilder::new("/tmp/project").build().unwrap();
        assert_eq!(config.state_dir(), PathBuf::from("/tmp/project/.codegraph"));
        assert_eq!(find_config_dir(&config.root), config.state_dir());
    }

    #[test]
    fn defaults_round_trip_json() {
        let config = EngineConfig::defaults_for(PathBuf::from("/tmp/p"));
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.embedding_model, config.embedding_model);
    }
}
