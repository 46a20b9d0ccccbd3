use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::logging::LoggingConfig;

/// Query dialect named in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryFormat {
    #[default]
    Promql,
    Logql,
}

// ---------------------------------------------------------------------------
// Raw TOML structure (intermediate representation)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolConfigRaw {
    #[serde(default)]
    format: QueryFormat,
    #[serde(default)]
    matchers: BTreeMap<String, String>,
    #[serde(default)]
    logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// ToolConfig (resolved, validated)
// ---------------------------------------------------------------------------

/// Settings read from `cos-tool.toml`. Every section is optional.
#[derive(Debug, Clone, Default)]
pub struct ToolConfig {
    /// Default dialect when `--format` is not given.
    pub format: QueryFormat,
    /// Default labels injected by `transform`; command-line matchers win.
    pub matchers: BTreeMap<String, String>,
    pub logging: LoggingConfig,
}

impl ToolConfig {
    /// Read and parse a `cos-tool.toml` file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.as_ref().display()))?;
        content.parse()
    }

    /// Config defaults overlaid with `overrides`.
    pub fn merged_matchers(
        &self,
        overrides: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let mut out = self.matchers.clone();
        out.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }
}

impl FromStr for ToolConfig {
    type Err = anyhow::Error;

    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let raw: ToolConfigRaw = toml::from_str(toml_str)?;

        for name in raw.matchers.keys() {
            if !cos_lang::is_valid_label_name(name) {
                anyhow::bail!("matchers: {name:?} is not a valid label name");
            }
        }
        if raw.logging.level.trim().is_empty() {
            anyhow::bail!("logging.level must not be empty");
        }

        Ok(ToolConfig {
            format: raw.format,
            matchers: raw.matchers,
            logging: raw.logging,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
