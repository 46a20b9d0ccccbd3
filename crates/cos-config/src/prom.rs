//! Metrics-server configuration file model and validation.
//!
//! Only the structure is modelled strictly (top-level, `global`, and
//! per-job keys); nested service-discovery, auth, and remote-storage blocks
//! are accepted as opaque YAML.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_yaml::Value;

use crate::types::PromDuration;

const DEFAULT_SCRAPE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub alerting: Option<Value>,
    #[serde(default)]
    pub rule_files: Vec<String>,
    #[serde(default)]
    pub scrape_config_files: Vec<String>,
    #[serde(default)]
    pub scrape_configs: Vec<ScrapeConfig>,
    #[serde(default)]
    pub remote_write: Vec<Value>,
    #[serde(default)]
    pub remote_read: Vec<Value>,
    #[serde(default)]
    pub storage: Option<Value>,
    #[serde(default)]
    pub tracing: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    pub scrape_interval: Option<PromDuration>,
    pub scrape_timeout: Option<PromDuration>,
    pub evaluation_interval: Option<PromDuration>,
    pub rule_query_offset: Option<PromDuration>,
    pub external_labels: BTreeMap<String, String>,
    pub query_log_file: Option<String>,
    pub scrape_failure_log_file: Option<String>,
    pub body_size_limit: Option<String>,
    pub sample_limit: Option<u64>,
    pub target_limit: Option<u64>,
    pub label_limit: Option<u64>,
    pub label_name_length_limit: Option<u64>,
    pub label_value_length_limit: Option<u64>,
    pub keep_dropped_targets: Option<u64>,
    pub scrape_protocols: Option<Vec<String>>,
}

impl GlobalConfig {
    pub fn effective_scrape_interval(&self) -> Duration {
        self.scrape_interval
            .map(Duration::from)
            .unwrap_or(DEFAULT_SCRAPE_INTERVAL)
    }

    pub fn effective_scrape_timeout(&self) -> Duration {
        self.scrape_timeout
            .map(Duration::from)
            .unwrap_or(DEFAULT_SCRAPE_TIMEOUT)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrapeConfig {
    pub job_name: String,
    #[serde(default)]
    pub honor_labels: Option<bool>,
    #[serde(default)]
    pub honor_timestamps: Option<bool>,
    #[serde(default)]
    pub track_timestamps_staleness: Option<bool>,
    #[serde(default)]
    pub scrape_interval: Option<PromDuration>,
    #[serde(default)]
    pub scrape_timeout: Option<PromDuration>,
    #[serde(default)]
    pub scrape_protocols: Option<Vec<String>>,
    #[serde(default)]
    pub metrics_path: Option<String>,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub static_configs: Vec<StaticConfig>,
    #[serde(default)]
    pub relabel_configs: Vec<Value>,
    #[serde(default)]
    pub metric_relabel_configs: Vec<Value>,
    #[serde(default)]
    pub basic_auth: Option<Value>,
    #[serde(default)]
    pub authorization: Option<Value>,
    #[serde(default)]
    pub oauth2: Option<Value>,
    #[serde(default)]
    pub tls_config: Option<Value>,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub no_proxy: Option<String>,
    #[serde(default)]
    pub follow_redirects: Option<bool>,
    #[serde(default)]
    pub enable_http2: Option<bool>,
    #[serde(default)]
    pub enable_compression: Option<bool>,
    #[serde(default)]
    pub body_size_limit: Option<String>,
    #[serde(default)]
    pub sample_limit: Option<u64>,
    #[serde(default)]
    pub target_limit: Option<u64>,
    #[serde(default)]
    pub label_limit: Option<u64>,
    #[serde(default)]
    pub label_name_length_limit: Option<u64>,
    #[serde(default)]
    pub label_value_length_limit: Option<u64>,
    #[serde(default)]
    pub keep_dropped_targets: Option<u64>,
    #[serde(default)]
    pub file_sd_configs: Vec<Value>,
    #[serde(default)]
    pub http_sd_configs: Vec<Value>,
    #[serde(default)]
    pub dns_sd_configs: Vec<Value>,
    #[serde(default)]
    pub kubernetes_sd_configs: Vec<Value>,
    #[serde(default)]
    pub consul_sd_configs: Vec<Value>,
    #[serde(default)]
    pub ec2_sd_configs: Vec<Value>,
    #[serde(default)]
    pub gce_sd_configs: Vec<Value>,
    #[serde(default)]
    pub azure_sd_configs: Vec<Value>,
    #[serde(default)]
    pub openstack_sd_configs: Vec<Value>,
    #[serde(default)]
    pub docker_sd_configs: Vec<Value>,
    #[serde(default)]
    pub dockerswarm_sd_configs: Vec<Value>,
    #[serde(default)]
    pub nomad_sd_configs: Vec<Value>,
    #[serde(default)]
    pub digitalocean_sd_configs: Vec<Value>,
    #[serde(default)]
    pub hetzner_sd_configs: Vec<Value>,
    #[serde(default)]
    pub linode_sd_configs: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticConfig {
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing YAML file {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("{}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

/// Read, strictly decode, and semantically check a configuration file.
pub fn validate_config_file(path: impl AsRef<Path>) -> Result<PromConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&content).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    validate(&config).map_err(|message| ConfigError::Invalid {
        path: path.to_path_buf(),
        message,
    })?;
    Ok(config)
}

/// Decode configuration text. An empty document is an empty configuration.
pub fn parse_config(content: &str) -> Result<PromConfig, serde_yaml::Error> {
    if content.trim().is_empty() {
        return Ok(PromConfig::default());
    }
    serde_yaml::from_str(content)
}

/// Semantic checks that decoding alone cannot express.
pub fn validate(config: &PromConfig) -> Result<(), String> {
    let global = &config.global;
    let interval = global.effective_scrape_interval();
    if global.effective_scrape_timeout() > interval {
        return Err("global scrape timeout greater than scrape interval".to_string());
    }

    for name in global.external_labels.keys() {
        if !cos_lang::is_valid_label_name(name) {
            return Err(format!("{name:?} is not a valid label name"));
        }
    }

    for pattern in config.rule_files.iter().chain(&config.scrape_config_files) {
        glob::Pattern::new(pattern).map_err(|e| format!("invalid file path {pattern:?}: {e}"))?;
    }

    let mut jobs = HashSet::new();
    for sc in &config.scrape_configs {
        if sc.job_name.is_empty() {
            return Err("job_name is empty".to_string());
        }
        if !jobs.insert(sc.job_name.as_str()) {
            return Err(format!(
                "found multiple scrape configs with job name {:?}",
                sc.job_name
            ));
        }
        validate_scrape_config(sc, global)?;
    }
    Ok(())
}

fn validate_scrape_config(sc: &ScrapeConfig, global: &GlobalConfig) -> Result<(), String> {
    let job = &sc.job_name;
    let interval = sc
        .scrape_interval
        .map(Duration::from)
        .unwrap_or_else(|| global.effective_scrape_interval());
    // An inherited timeout is clipped to the job's own interval.
    let timeout = match sc.scrape_timeout {
        Some(t) => t.into(),
        None => global.effective_scrape_timeout().min(interval),
    };
    if timeout > interval {
        return Err(format!(
            "scrape timeout greater than scrape interval for scrape config with job name {job:?}"
        ));
    }

    if let Some(scheme) = &sc.scheme {
        if scheme != "http" && scheme != "https" {
            return Err(format!(
                "scheme {scheme:?} not supported for scrape config with job name {job:?}"
            ));
        }
    }
    if let Some(path) = &sc.metrics_path {
        if !path.starts_with('/') {
            return Err(format!(
                "metrics_path {path:?} must start with '/' for scrape config with job name {job:?}"
            ));
        }
    }

    for static_config in &sc.static_configs {
        for name in static_config.labels.keys() {
            if !cos_lang::is_valid_label_name(name) {
                return Err(format!(
                    "{name:?} is not a valid label name in scrape config with job name {job:?}"
                ));
            }
        }
        for target in &static_config.targets {
            if target.contains('/') {
                return Err(format!(
                    "{target:?} is not a valid hostname in scrape config with job name {job:?}"
                ));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const GOOD: &str = r#"
global:
  scrape_interval: 15s
  evaluation_interval: 30s
  external_labels:
    juju_model: lma
rule_files:
  - "rules/*.rules"
alerting:
  alertmanagers:
    - static_configs:
        - targets: ["localhost:9093"]
scrape_configs:
  - job_name: prometheus
    static_configs:
      - targets: ["localhost:9090"]
        labels:
          env: dev
  - job_name: node
    scheme: https
    scrape_interval: 1m
    scrape_timeout: 20s
    kubernetes_sd_configs:
      - role: node
    relabel_configs:
      - source_labels: [__address__]
        target_label: instance
"#;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn good_config_validates() {
        let f = write_temp(GOOD);
        let cfg = validate_config_file(f.path()).unwrap();
        assert_eq!(cfg.scrape_configs.len(), 2);
        assert_eq!(cfg.global.external_labels["juju_model"], "lma");
        assert_eq!(
            cfg.global.effective_scrape_interval(),
            Duration::from_secs(15)
        );
    }

    #[test]
    fn empty_config_is_valid() {
        let f = write_temp("");
        assert!(validate_config_file(f.path()).is_ok());
    }

    #[test]
    fn bad_yaml_rejected() {
        let f = write_temp("global:\n  scrape_interval: [15s\n");
        let err = validate_config_file(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }), "{err}");
    }

    #[test]
    fn unknown_keys_rejected() {
        for doc in [
            "scrape_config:\n  - job_name: x\n",
            "global:\n  scrape_intervals: 15s\n",
            "scrape_configs:\n  - job_name: x\n    target: localhost\n",
        ] {
            assert!(parse_config(doc).is_err(), "{doc}");
        }
    }

    #[test]
    fn duplicate_job_rejected() {
        let cfg = parse_config("scrape_configs:\n  - job_name: a\n  - job_name: a\n").unwrap();
        let err = validate(&cfg).unwrap_err();
        assert!(err.contains("multiple scrape configs with job name \"a\""), "{err}");
    }

    #[test]
    fn timeout_must_fit_interval() {
        let cfg = parse_config(
            "scrape_configs:\n  - job_name: a\n    scrape_interval: 5s\n    scrape_timeout: 10s\n",
        )
        .unwrap();
        assert!(validate(&cfg).is_err());

        let inherited = parse_config("scrape_configs:\n  - job_name: a\n    scrape_interval: 5s\n").unwrap();
        assert!(validate(&inherited).is_ok());

        let global = parse_config("global:\n  scrape_interval: 5s\n  scrape_timeout: 10s\n").unwrap();
        assert!(validate(&global).is_err());
    }

    #[test]
    fn external_label_names_checked() {
        let cfg = parse_config("global:\n  external_labels:\n    \"bad-name\": x\n").unwrap();
        assert!(validate(&cfg).unwrap_err().contains("not a valid label name"));
    }

    #[test]
    fn scheme_checked() {
        let cfg = parse_config("scrape_configs:\n  - job_name: a\n    scheme: ftp\n").unwrap();
        assert!(validate(&cfg).unwrap_err().contains("scheme \"ftp\" not supported"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = validate_config_file("/nonexistent/cos-tool/prometheus.yml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
