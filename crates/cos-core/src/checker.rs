//! Dialect dispatch: one capability set, two query languages.

use std::path::Path;

use cos_config::{ConfigError, QueryFormat, RuleGroups, validate_config_file};
use cos_lang::{LogQlGrammar, PromQlGrammar};

use crate::error::{Reasoned, ToolReason};
use crate::inject::InjectionSet;
use crate::rules::{RulesError, validate_rules};
use crate::transform::{TransformError, transform};

#[derive(Debug, thiserror::Error)]
pub enum ConfigCheckError {
    #[error(transparent)]
    Invalid(#[from] ConfigError),
    #[error("Loki not supported for validate-config")]
    Unsupported,
}

impl Reasoned for ConfigCheckError {
    fn reason(&self) -> ToolReason {
        ToolReason::Config
    }
}

/// Everything the tool can do with a query dialect.
pub trait Checker {
    /// Inject `matchers` into every selector of `query`.
    fn transform(&self, query: &str, matchers: &InjectionSet) -> Result<String, TransformError>;

    /// Decode and validate the rule file `filename` with body `content`.
    fn validate_rules(&self, filename: &str, content: &[u8]) -> Result<RuleGroups, RulesError>;

    /// Validate a server configuration file.
    fn validate_config(&self, path: &Path) -> Result<(), ConfigCheckError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PromQl;

impl Checker for PromQl {
    fn transform(&self, query: &str, matchers: &InjectionSet) -> Result<String, TransformError> {
        transform::<PromQlGrammar>(query, matchers)
    }

    fn validate_rules(&self, filename: &str, content: &[u8]) -> Result<RuleGroups, RulesError> {
        validate_rules::<PromQlGrammar>(filename, content)
    }

    fn validate_config(&self, path: &Path) -> Result<(), ConfigCheckError> {
        let config = validate_config_file(path)?;
        ct_debug!(
            conf,
            file = %path.display(),
            jobs = config.scrape_configs.len(),
            "configuration valid"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogQl;

impl Checker for LogQl {
    fn transform(&self, query: &str, matchers: &InjectionSet) -> Result<String, TransformError> {
        transform::<LogQlGrammar>(query, matchers)
    }

    fn validate_rules(&self, filename: &str, content: &[u8]) -> Result<RuleGroups, RulesError> {
        validate_rules::<LogQlGrammar>(filename, content)
    }

    fn validate_config(&self, _path: &Path) -> Result<(), ConfigCheckError> {
        Err(ConfigCheckError::Unsupported)
    }
}

/// The dialect chosen for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    PromQl,
    LogQl,
}

impl Dialect {
    /// Resolve a `--format` value. Anything other than `logql` selects the
    /// metrics dialect.
    pub fn from_flag(flag: &str) -> Self {
        if flag.trim().eq_ignore_ascii_case("logql") {
            Dialect::LogQl
        } else {
            if !flag.trim().eq_ignore_ascii_case("promql") {
                ct_warn!(sys, format = flag, "unknown query format, using promql");
            }
            Dialect::PromQl
        }
    }

    fn checker(self) -> &'static dyn Checker {
        match self {
            Dialect::PromQl => &PromQl,
            Dialect::LogQl => &LogQl,
        }
    }
}

impl From<QueryFormat> for Dialect {
    fn from(format: QueryFormat) -> Self {
        match format {
            QueryFormat::Promql => Dialect::PromQl,
            QueryFormat::Logql => Dialect::LogQl,
        }
    }
}

impl Checker for Dialect {
    fn transform(&self, query: &str, matchers: &InjectionSet) -> Result<String, TransformError> {
        self.checker().transform(query, matchers)
    }

    fn validate_rules(&self, filename: &str, content: &[u8]) -> Result<RuleGroups, RulesError> {
        self.checker().validate_rules(filename, content)
    }

    fn validate_config(&self, path: &Path) -> Result<(), ConfigCheckError> {
        self.checker().validate_config(path)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn env_prod() -> InjectionSet {
        [("env", "prod")].into_iter().collect()
    }

    #[test]
    fn flag_resolution() {
        assert_eq!(Dialect::from_flag("promql"), Dialect::PromQl);
        assert_eq!(Dialect::from_flag("logql"), Dialect::LogQl);
        assert_eq!(Dialect::from_flag("LogQL"), Dialect::LogQl);
        assert_eq!(Dialect::from_flag("sql"), Dialect::PromQl);
        assert_eq!(Dialect::from_flag(""), Dialect::PromQl);
        assert_eq!(Dialect::from(QueryFormat::Logql), Dialect::LogQl);
    }

    #[test]
    fn dispatch_uses_dialect_printer() {
        let q = r#"rate({job="a"}[1m])"#;
        assert_eq!(
            Dialect::LogQl.transform(q, &env_prod()).unwrap(),
            r#"rate({job="a", env="prod"}[1m])"#
        );
        assert_eq!(
            Dialect::PromQl.transform(r#"up{job="a"}"#, &env_prod()).unwrap(),
            r#"up{env="prod",job="a"}"#
        );
        // Line filters only exist in the log dialect.
        assert!(Dialect::PromQl.transform(r#"{job="a"} |= "x""#, &env_prod()).is_err());
    }

    #[test]
    fn rules_dispatch() {
        let rules = b"groups:\n  - name: g\n    rules:\n      - alert: A\n        expr: count_over_time({job=\"a\"} |= \"x\" [5m]) > 0\n";
        assert!(Dialect::LogQl.validate_rules("r.yaml", rules).is_ok());
        assert!(Dialect::PromQl.validate_rules("r.yaml", rules).is_err());
    }

    #[test]
    fn config_validation() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "global:\n  scrape_interval: 30s\nscrape_configs:\n  - job_name: node\n    static_configs:\n      - targets: [\"localhost:9100\"]"
        )
        .unwrap();
        assert!(Dialect::PromQl.validate_config(file.path()).is_ok());

        let err = Dialect::LogQl.validate_config(file.path()).unwrap_err();
        assert_eq!(err.to_string(), "Loki not supported for validate-config");
        assert_eq!(err.reason(), ToolReason::Config);
    }

    #[test]
    fn config_validation_reports_problems() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "scrape_configs:\n  - job_name: a\n  - job_name: a").unwrap();
        let err = PromQl.validate_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigCheckError::Invalid(_)));
        assert!(err.to_string().contains("found multiple scrape configs with job name \"a\""), "{err}");
    }
}
