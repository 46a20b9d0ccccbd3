//! Rule-file data model.
//!
//! Decoding is strict: unknown keys anywhere in the file are rejected and a
//! malformed document yields no groups at all. Semantic checks (group names,
//! rule shape, label names, templates) live in `cos_core::rules`.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{PromDuration, scalar_map, scalar_string};

/// Top-level document: `groups: [...]`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleGroups {
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleGroup {
    #[serde(default, deserialize_with = "scalar_string")]
    pub name: String,
    #[serde(default)]
    pub interval: Option<PromDuration>,
    #[serde(default)]
    pub query_offset: Option<PromDuration>,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub rules: Vec<RuleNode>,
}

/// One recording or alerting rule as written. Exactly one of `record` and
/// `alert` is expected to be non-empty.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleNode {
    #[serde(default, deserialize_with = "scalar_string")]
    pub record: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub alert: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub expr: String,
    #[serde(default, rename = "for")]
    pub for_duration: Option<PromDuration>,
    #[serde(default)]
    pub keep_firing_for: Option<PromDuration>,
    #[serde(default, deserialize_with = "scalar_map")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "scalar_map")]
    pub annotations: BTreeMap<String, String>,
}

/// Which of the two rule kinds a node declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Record,
    Alert,
}

impl RuleNode {
    /// The declared kind, or `None` when both or neither name is set.
    pub fn kind(&self) -> Option<RuleKind> {
        match (self.record.is_empty(), self.alert.is_empty()) {
            (false, true) => Some(RuleKind::Record),
            (true, false) => Some(RuleKind::Alert),
            _ => None,
        }
    }

    /// The record or alert name, whichever is set.
    pub fn name(&self) -> &str {
        if self.record.is_empty() {
            &self.alert
        } else {
            &self.record
        }
    }
}

/// The rule file could not be decoded into the model.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DecodeError(#[from] serde_yaml::Error);

/// Strictly decode a rule file. Whitespace- or comment-only content decodes
/// to an empty set of groups.
pub fn decode_rule_file(content: &[u8]) -> Result<RuleGroups, DecodeError> {
    if is_blank(content) {
        return Ok(RuleGroups::default());
    }
    Ok(serde_yaml::from_slice(content)?)
}

fn is_blank(content: &[u8]) -> bool {
    content.split(|&b| b == b'\n').all(|line| {
        let line = line.trim_ascii();
        line.is_empty() || line.starts_with(b"#") || line == b"---"
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
