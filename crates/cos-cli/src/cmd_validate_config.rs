use std::path::PathBuf;

use anyhow::Result;
use orion_error::ErrorCode;

use cos_core::{Checker, Dialect, Reasoned, ct_debug};

pub fn run(dialect: Dialect, file: PathBuf) -> Result<()> {
    dialect.validate_config(&file).map_err(|e| {
        ct_debug!(
            conf,
            code = e.reason().error_code(),
            file = %file.display(),
            "configuration rejected"
        );
        anyhow::anyhow!("{e}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_metrics_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prometheus.yml");
        std::fs::write(
            &path,
            "scrape_configs:\n  - job_name: node\n    static_configs:\n      - targets: [\"localhost:9100\"]\n",
        )
        .unwrap();
        assert!(run(Dialect::PromQl, path.clone()).is_ok());

        let err = run(Dialect::LogQl, path).unwrap_err();
        assert_eq!(err.to_string(), "Loki not supported for validate-config");
    }

    #[test]
    fn missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(Dialect::PromQl, dir.path().join("absent.yml")).is_err());
    }
}
