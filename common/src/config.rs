//! Configuración por variables de entorno, con defaults para correr local.
//! Los binarios pueden sobreescribir cada valor con flags de la CLI.

use std::{env, path::PathBuf, str::FromStr};

use crate::lake::DataFormat;

pub const DEFAULT_LAKE_ROOT: &str = "/data/lake";
pub const DEFAULT_LAKE_URI: &str = "s3://nyc-taxi-data-lake";
pub const DEFAULT_JOB_NAME: &str = "nyc_taxi_etl_job";
pub const DEFAULT_RAW_CRAWLER: &str = "nyc-taxi-raw-crawler";
pub const DEFAULT_PROCESSED_CRAWLER: &str = "nyc_taxi_processed_crawler";
pub const DEFAULT_NOTIFY_TOPIC: &str = "glue-failure-topic";
pub const DEFAULT_RETRY_LIMIT: u32 = 1;
pub const DEFAULT_RETRY_LEDGER_PATH: &str = "/data/state/retries.db";
pub const DEFAULT_CONTROL_PLANE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Raíz local del data lake
    pub lake_root: PathBuf,
    /// Prefijo de URI que ven los crawlers, ej: "s3://bucket"
    pub lake_uri: String,
    pub format: DataFormat,
    pub job_name: String,
    pub raw_crawler: String,
    pub processed_crawler: String,
    pub notify_topic: String,
    pub retry_limit: u32,
    pub retry_ledger_path: PathBuf,
    pub control_plane_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lake_root: PathBuf::from(DEFAULT_LAKE_ROOT),
            lake_uri: DEFAULT_LAKE_URI.to_string(),
            format: DataFormat::default(),
            job_name: DEFAULT_JOB_NAME.to_string(),
            raw_crawler: DEFAULT_RAW_CRAWLER.to_string(),
            processed_crawler: DEFAULT_PROCESSED_CRAWLER.to_string(),
            notify_topic: DEFAULT_NOTIFY_TOPIC.to_string(),
            retry_limit: DEFAULT_RETRY_LIMIT,
            retry_ledger_path: PathBuf::from(DEFAULT_RETRY_LEDGER_PATH),
            control_plane_url: DEFAULT_CONTROL_PLANE_URL.to_string(),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Lee y parsea `key`; si falta o no parsea usa `default`.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            lake_root: PathBuf::from(env_string("LAKE_ROOT", DEFAULT_LAKE_ROOT)),
            lake_uri: env_string("LAKE_URI", &d.lake_uri),
            format: env_parse("OUTPUT_FORMAT", d.format),
            job_name: env_string("JOB_NAME", &d.job_name),
            raw_crawler: env_string("RAW_CRAWLER", &d.raw_crawler),
            processed_crawler: env_string("PROCESSED_CRAWLER", &d.processed_crawler),
            notify_topic: env_string("NOTIFY_TOPIC", &d.notify_topic),
            retry_limit: env_parse("RETRY_LIMIT", d.retry_limit),
            retry_ledger_path: PathBuf::from(env_string(
                "RETRY_LEDGER_PATH",
                DEFAULT_RETRY_LEDGER_PATH,
            )),
            control_plane_url: env_string("CONTROL_PLANE_URL", &d.control_plane_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Un solo test toca el entorno para no pisarse con otros en paralelo.
    #[test]
    fn from_env_respeta_env_vars_y_defaults() {
        env::set_var("JOB_NAME", "otro_job");
        env::set_var("RETRY_LIMIT", "3");
        env::set_var("OUTPUT_FORMAT", "jsonl");
        env::set_var("LAKE_URI", "   ");
        env::remove_var("RAW_CRAWLER");

        let cfg = PipelineConfig::from_env();
        assert_eq!(cfg.job_name, "otro_job");
        assert_eq!(cfg.retry_limit, 3);
        assert_eq!(cfg.format, DataFormat::Jsonl);
        assert_eq!(cfg.lake_uri, DEFAULT_LAKE_URI);
        assert_eq!(cfg.raw_crawler, DEFAULT_RAW_CRAWLER);

        env::set_var("RETRY_LIMIT", "muchos");
        assert_eq!(PipelineConfig::from_env().retry_limit, DEFAULT_RETRY_LIMIT);

        for k in ["JOB_NAME", "RETRY_LIMIT", "OUTPUT_FORMAT", "LAKE_URI"] {
            env::remove_var(k);
        }
    }
}
