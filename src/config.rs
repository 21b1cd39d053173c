use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::service::matcher::MatcherConfig;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// postgres://... 或 memory:// (进程内存储)
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/lpo_engine".to_string(),
            max_connections: 20,
            acquire_timeout_secs: 10,
        }
    }
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url.starts_with("memory://")
    }
}

/// 流水线运行参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch_size: i64,
    pub concurrency: usize,
    pub extractor_timeout_ms: u64,
    pub stale_after_secs: u64,
    pub poll_interval_secs: u64,
    pub export_batch_limit: i64,
    pub auto_export: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            concurrency: 4,
            extractor_timeout_ms: 60_000,
            stale_after_secs: 900,
            poll_interval_secs: 300,
            export_batch_limit: 100,
            auto_export: true,
        }
    }
}

impl PipelineConfig {
    pub fn extractor_timeout(&self) -> Duration {
        Duration::from_millis(self.extractor_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub export_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("exports"),
        }
    }
}

impl AppConfig {
    /// 加载配置: 默认值 → lpo-engine.toml (可选) → LPO__* 环境变量 → 旧变量名
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Some("lpo-engine"))
    }

    pub fn load(file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if let Some(name) = file {
            builder = builder.add_source(File::with_name(name).required(false));
        }

        builder
            .add_source(
                Environment::with_prefix("LPO")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pipeline.batch_size, 20);
        assert_eq!(config.pipeline.extractor_timeout(), Duration::from_secs(60));
        assert!((config.matcher.acceptance_threshold - 0.5).abs() < 1e-9);
        assert!(!config.database.is_memory());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[pipeline]\nconcurrency = 8\n\n[matcher]\nmax_quantity = 50\n\n[export]\nexport_dir = \"/srv/out\""
        )
        .unwrap();

        let config = AppConfig::load(path.to_str()).unwrap();
        assert_eq!(config.pipeline.concurrency, 8);
        assert_eq!(config.pipeline.batch_size, 20);
        assert_eq!(config.matcher.max_quantity, 50);
        assert_eq!(config.export.export_dir, PathBuf::from("/srv/out"));
    }
}
