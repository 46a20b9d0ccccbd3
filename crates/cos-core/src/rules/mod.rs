//! Rule group validation.
//!
//! A rule file is decoded strictly, then every group and rule is checked.
//! Decode failures abort the file; every other violation is collected so a
//! single run reports all of them.

mod template;

use std::collections::HashSet;
use std::fmt;

use cos_config::{DecodeError, RuleGroup, RuleGroups, RuleKind, RuleNode, decode_rule_file};
use cos_lang::{Grammar, SyntaxError, is_valid_label_name, is_valid_metric_name};

pub use template::{TemplateError, check_alert_template, parse_check};

use crate::error::{Reasoned, ToolReason};

/// Label that alert and recording rules may not set.
const METRIC_NAME_LABEL: &str = "__name__";

#[derive(Debug, thiserror::Error)]
pub enum RuleErrorKind {
    #[error("group {index}: Groupname must not be empty")]
    EmptyGroupName { index: usize },
    #[error("groupname: \"{name}\" is repeated in the same file")]
    DuplicateGroup { name: String },
    #[error("only one of 'record' and 'alert' must be set")]
    BothKinds,
    #[error("one of 'record' or 'alert' must be set")]
    NoKind,
    #[error("field 'expr' must be set in rule")]
    MissingExpr,
    #[error("could not parse expression: {0}")]
    Expr(SyntaxError),
    #[error("invalid field '{0}' in recording rule")]
    RecordingField(&'static str),
    #[error("invalid recording rule name: {0}")]
    RecordName(String),
    #[error("invalid label name: {0}")]
    LabelName(String),
    #[error("invalid annotation name: {0}")]
    AnnotationName(String),
    #[error("{field} {key:?}: {source}")]
    Template {
        field: &'static str,
        key: String,
        #[source]
        source: TemplateError,
    },
}

/// Position of a rule inside its group: 1-based index and declared name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRef {
    pub index: usize,
    pub name: String,
}

/// One violation, tagged with the group (and rule) it was found in.
#[derive(Debug)]
pub struct RuleError {
    pub group: String,
    pub rule: Option<RuleRef>,
    pub kind: RuleErrorKind,
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rule {
            Some(rule) => write!(
                f,
                "group {:?}, rule {}, {:?}: {}",
                self.group, rule.index, rule.name, self.kind
            ),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for RuleError {}

fn join_errors(errors: &[RuleError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Aggregate outcome of a failed file validation.
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    /// The file did not decode; no groups are available.
    #[error("error validating {filename}: {source}")]
    Decode {
        filename: String,
        #[source]
        source: DecodeError,
    },
    /// The file decoded but has violations. `groups` is still usable.
    #[error("error validating {filename}: {}", join_errors(.errors))]
    Invalid {
        filename: String,
        groups: RuleGroups,
        errors: Vec<RuleError>,
    },
}

impl RulesError {
    /// Every individual violation; empty for decode failures.
    pub fn errors(&self) -> &[RuleError] {
        match self {
            RulesError::Decode { .. } => &[],
            RulesError::Invalid { errors, .. } => errors,
        }
    }

    /// The decoded groups, when decoding got that far.
    pub fn groups(&self) -> Option<&RuleGroups> {
        match self {
            RulesError::Decode { .. } => None,
            RulesError::Invalid { groups, .. } => Some(groups),
        }
    }
}

impl Reasoned for RulesError {
    fn reason(&self) -> ToolReason {
        match self {
            RulesError::Decode { .. } => ToolReason::RuleDecode,
            RulesError::Invalid { .. } => ToolReason::RuleInvalid,
        }
    }
}

/// Decode and validate one rule file, checking expressions with grammar `G`.
pub fn validate_rules<G: Grammar>(filename: &str, content: &[u8]) -> Result<RuleGroups, RulesError> {
    let groups = decode_rule_file(content).map_err(|source| {
        ct_debug!(rules, file = filename, error = %source, "rule file does not decode");
        RulesError::Decode {
            filename: filename.to_string(),
            source,
        }
    })?;

    let errors = check_groups::<G>(&groups.groups);
    if errors.is_empty() {
        ct_info!(rules, file = filename, groups = groups.groups.len(), "rule file valid");
        return Ok(groups);
    }
    ct_debug!(rules, file = filename, errors = errors.len(), "rule file invalid");
    Err(RulesError::Invalid {
        filename: filename.to_string(),
        groups,
        errors,
    })
}

/// Check every group and rule, collecting all violations.
pub fn check_groups<G: Grammar>(groups: &[RuleGroup]) -> Vec<RuleError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, group) in groups.iter().enumerate() {
        let group_error = |kind| RuleError {
            group: group.name.clone(),
            rule: None,
            kind,
        };
        if group.name.is_empty() {
            errors.push(group_error(RuleErrorKind::EmptyGroupName { index }));
        }
        if !seen.insert(group.name.as_str()) {
            errors.push(group_error(RuleErrorKind::DuplicateGroup {
                name: group.name.clone(),
            }));
        }

        for (i, rule) in group.rules.iter().enumerate() {
            let mut kinds = Vec::new();
            check_rule::<G>(rule, &mut kinds);
            errors.extend(kinds.into_iter().map(|kind| RuleError {
                group: group.name.clone(),
                rule: Some(RuleRef {
                    index: i + 1,
                    name: rule.name().to_string(),
                }),
                kind,
            }));
        }
    }
    errors
}

fn check_rule<G: Grammar>(rule: &RuleNode, errors: &mut Vec<RuleErrorKind>) {
    let kind = rule.kind();
    match (rule.record.is_empty(), rule.alert.is_empty()) {
        (false, false) => errors.push(RuleErrorKind::BothKinds),
        (true, true) => errors.push(RuleErrorKind::NoKind),
        _ => {}
    }

    if rule.expr.trim().is_empty() {
        errors.push(RuleErrorKind::MissingExpr);
    } else if let Err(e) = G::parse(&rule.expr) {
        errors.push(RuleErrorKind::Expr(e));
    }

    if kind == Some(RuleKind::Record) {
        check_recording_rule(rule, errors);
    }

    for name in rule.labels.keys() {
        if !is_valid_label_name(name) || name == METRIC_NAME_LABEL {
            errors.push(RuleErrorKind::LabelName(name.clone()));
        }
    }
    for name in rule.annotations.keys() {
        if !is_valid_label_name(name) {
            errors.push(RuleErrorKind::AnnotationName(name.clone()));
        }
    }

    if kind == Some(RuleKind::Alert) {
        check_templates(rule, errors);
    }
}

fn check_recording_rule(rule: &RuleNode, errors: &mut Vec<RuleErrorKind>) {
    if !rule.annotations.is_empty() {
        errors.push(RuleErrorKind::RecordingField("annotations"));
    }
    if rule.for_duration.is_some_and(|d| !d.is_zero()) {
        errors.push(RuleErrorKind::RecordingField("for"));
    }
    if rule.keep_firing_for.is_some_and(|d| !d.is_zero()) {
        errors.push(RuleErrorKind::RecordingField("keep_firing_for"));
    }
    if !is_valid_metric_name(&rule.record) {
        errors.push(RuleErrorKind::RecordName(rule.record.clone()));
    }
}

/// Label and annotation values of alerting rules must parse as templates.
fn check_templates(rule: &RuleNode, errors: &mut Vec<RuleErrorKind>) {
    let fields = [("label", &rule.labels), ("annotation", &rule.annotations)];
    for (field, map) in fields {
        for (key, text) in map {
            if let Err(source) = check_alert_template(&rule.alert, text) {
                errors.push(RuleErrorKind::Template {
                    field,
                    key: key.clone(),
                    source,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests;
