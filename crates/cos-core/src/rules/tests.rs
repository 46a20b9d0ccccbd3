use std::path::PathBuf;

use cos_lang::{LogQlGrammar, PromQlGrammar};

use super::*;

fn testdata(rel: &str) -> (String, Vec<u8>) {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata").join(rel);
    let content = std::fs::read(&path).unwrap();
    (path.display().to_string(), content)
}

fn prom(src: &str) -> Result<RuleGroups, RulesError> {
    validate_rules::<PromQlGrammar>("rules.yaml", src.as_bytes())
}

fn kinds(err: &RulesError) -> Vec<String> {
    err.errors().iter().map(|e| e.kind.to_string()).collect()
}

// -----------------------------------------------------------------------
// Fixture files
// -----------------------------------------------------------------------

#[test]
fn prom_basic_file_is_valid() {
    let (name, content) = testdata("prom_alerts/basic.yaml");
    let groups = validate_rules::<PromQlGrammar>(&name, &content).unwrap();
    assert_eq!(groups.groups.len(), 2);
    assert_eq!(groups.groups[0].rules.len(), 2);
}

#[test]
fn prom_fixture_failures() {
    for (file, msg) in [
        ("prom_alerts/duplicate_group.yaml", "groupname: \"yolo\" is repeated in the same file"),
        ("prom_alerts/bad_expr.yaml", "could not parse expression"),
    ] {
        let (name, content) = testdata(file);
        let err = validate_rules::<PromQlGrammar>(&name, &content).unwrap_err();
        let text = err.to_string();
        assert!(text.contains(msg), "{file}: {text}");
        assert!(text.starts_with(&format!("error validating {name}: ")), "{text}");
    }
}

#[test]
fn loki_basic_file_is_valid() {
    let (name, content) = testdata("loki_alerts/basic.yaml");
    let groups = validate_rules::<LogQlGrammar>(&name, &content).unwrap();
    assert_eq!(groups.groups.len(), 2);
}

#[test]
fn loki_fixture_failures() {
    for (file, msg) in [
        ("loki_alerts/duplicate_group.yaml", "groupname: \"testgroup\" is repeated in the same file"),
        ("loki_alerts/bad_expr.yaml", "syntax error"),
    ] {
        let (name, content) = testdata(file);
        let err = validate_rules::<LogQlGrammar>(&name, &content).unwrap_err();
        assert!(err.to_string().contains(msg), "{file}: {err}");
        assert_eq!(err.reason(), ToolReason::RuleInvalid);
    }
}

// -----------------------------------------------------------------------
// Decode
// -----------------------------------------------------------------------

#[test]
fn unknown_field_fails_decode() {
    let err = prom(
        r#"
groups:
  - name: g
    rules:
      - alert: A
        expr: up == 0
        severity: page
"#,
    )
    .unwrap_err();
    assert!(matches!(err, RulesError::Decode { .. }));
    assert!(err.groups().is_none());
    assert!(err.errors().is_empty());
    assert_eq!(err.reason(), ToolReason::RuleDecode);
    assert!(err.to_string().starts_with("error validating rules.yaml: "));
}

#[test]
fn empty_file_is_valid() {
    assert!(prom("").unwrap().groups.is_empty());
    assert!(prom("# nothing here\n").unwrap().groups.is_empty());
}

// -----------------------------------------------------------------------
// Group checks
// -----------------------------------------------------------------------

#[test]
fn duplicate_group_keeps_checking_other_groups() {
    let err = prom(
        r#"
groups:
  - name: g
    rules:
      - alert: A
        expr: up == 0
  - name: g
    rules:
      - alert: B
        expr: up == 0
  - name: h
    rules:
      - record: "bad name"
        expr: up
"#,
    )
    .unwrap_err();
    assert_eq!(
        kinds(&err),
        vec![
            "groupname: \"g\" is repeated in the same file".to_string(),
            "invalid recording rule name: bad name".to_string(),
        ]
    );
    assert_eq!(err.groups().map(|g| g.groups.len()), Some(3));
}

#[test]
fn empty_group_name() {
    let err = prom("groups:\n  - name: \"\"\n    rules: []\n").unwrap_err();
    assert_eq!(kinds(&err), vec!["group 0: Groupname must not be empty".to_string()]);
    assert!(err.errors()[0].rule.is_none());
}

// -----------------------------------------------------------------------
// Rule checks
// -----------------------------------------------------------------------

#[test]
fn rule_kind_must_be_exactly_one() {
    let err = prom(
        r#"
groups:
  - name: g
    rules:
      - record: a
        alert: b
        expr: up
      - expr: up
"#,
    )
    .unwrap_err();
    assert_eq!(
        kinds(&err),
        vec![
            "only one of 'record' and 'alert' must be set".to_string(),
            "one of 'record' or 'alert' must be set".to_string(),
        ]
    );
}

#[test]
fn missing_and_unparsable_expr() {
    let err = prom(
        r#"
groups:
  - name: g
    rules:
      - alert: NoExpr
      - alert: Broken
        expr: "sum("
"#,
    )
    .unwrap_err();
    let errors = err.errors();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].kind.to_string(), "field 'expr' must be set in rule");
    assert!(matches!(errors[1].kind, RuleErrorKind::Expr(_)));
    assert_eq!(
        errors[1].rule,
        Some(RuleRef {
            index: 2,
            name: "Broken".to_string()
        })
    );
    assert!(
        errors[1]
            .to_string()
            .starts_with("group \"g\", rule 2, \"Broken\": could not parse expression: ")
    );
}

#[test]
fn recording_rule_restrictions() {
    let err = prom(
        r#"
groups:
  - name: g
    rules:
      - record: job:up:sum
        expr: sum(up)
        for: 5m
        keep_firing_for: 1m
        annotations:
          summary: nope
"#,
    )
    .unwrap_err();
    assert_eq!(
        kinds(&err),
        vec![
            "invalid field 'annotations' in recording rule".to_string(),
            "invalid field 'for' in recording rule".to_string(),
            "invalid field 'keep_firing_for' in recording rule".to_string(),
        ]
    );
}

#[test]
fn zero_for_is_allowed_on_recording_rules() {
    assert!(
        prom("groups:\n  - name: g\n    rules:\n      - record: a\n        expr: up\n        for: 0s\n")
            .is_ok()
    );
}

#[test]
fn label_and_annotation_names() {
    let err = prom(
        r#"
groups:
  - name: g
    rules:
      - alert: A
        expr: up == 0
        labels:
          __name__: x
          bad-label: y
          ok_label: z
        annotations:
          1summary: text
"#,
    )
    .unwrap_err();
    assert_eq!(
        kinds(&err),
        vec![
            "invalid label name: __name__".to_string(),
            "invalid label name: bad-label".to_string(),
            "invalid annotation name: 1summary".to_string(),
        ]
    );
}

#[test]
fn alert_templates_are_checked_per_key() {
    let err = prom(
        r#"
groups:
  - name: g
    rules:
      - alert: A
        expr: up == 0
        labels:
          team: "{{ $labels.team"
        annotations:
          summary: "{{ nosuch $value }}"
          description: "{{ $labels.instance }} fine"
"#,
    )
    .unwrap_err();
    let errors = err.errors();
    assert_eq!(errors.len(), 2);
    match &errors[0].kind {
        RuleErrorKind::Template { field, key, source } => {
            assert_eq!(*field, "label");
            assert_eq!(key, "team");
            assert_eq!(source.name, "__alert_A");
        }
        other => panic!("expected template error, got {other:?}"),
    }
    assert_eq!(
        errors[1].kind.to_string(),
        r#"annotation "summary": template: __alert_A:1: function "nosuch" not defined"#
    );
}

#[test]
fn recording_rule_labels_are_not_templates() {
    assert!(
        prom("groups:\n  - name: g\n    rules:\n      - record: a\n        expr: up\n        labels:\n          t: \"{{ broken\"\n")
            .is_ok()
    );
}

#[test]
fn rule_errors_join_into_one_message() {
    let err = prom(
        r#"
groups:
  - name: g
    rules:
      - expr: up
      - expr: up
"#,
    )
    .unwrap_err();
    let text = err.to_string();
    assert_eq!(text.matches("one of 'record' or 'alert' must be set").count(), 2);
    assert!(text.contains("; "));
}
