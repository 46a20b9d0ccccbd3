use super::*;

fn check(text: &str) -> Result<(), TemplateError> {
    check_alert_template("HostDown", text)
}

fn message(text: &str) -> String {
    check(text).unwrap_err().message
}

#[test]
fn plain_text_and_common_alert_templates() {
    for ok in [
        "",
        "no actions at all",
        "{{ $labels.instance }} is down",
        "{{ $value | humanize }}",
        "{{ $value | humanizePercentage }} of requests failed",
        r#"{{ printf "%.2f" $value }}"#,
        "{{ .Labels.job }}/{{ .Value }}",
        "{{ $externalLabels.cluster }}",
        r#"{{ with query "up" }}{{ . | first | value }}{{ end }}"#,
        r#"{{ range $i, $e := .Labels }}{{ $i }}={{ $e }} {{ end }}"#,
        r#"{{ if gt $value 80.0 }}high{{ else if gt $value 50.0 }}mid{{ else }}low{{ end }}"#,
        "{{- $labels.instance -}}",
        "{{/* a comment */}}text",
        "{{- /* trimmed comment */ -}}",
        r#"{{ reReplaceAll "(.*):.*" "$1" $labels.instance }}"#,
        "{{ `raw {{ string` }}",
        "{{ 'x' }} {{ 0x1F }} {{ 1e3 }} {{ -3 }}",
        "{{ (index .Labels \"job\") | toUpper }}",
        "{{ $x := 1 }}{{ $x = 2 }}{{ $x }}",
        "{{ range .Labels }}{{ if . }}{{ break }}{{ end }}{{ continue }}{{ end }}",
        r#"{{ define "t" }}inner{{ end }}{{ template "t" . }}"#,
        r#"{{ block "b" . }}default{{ end }}"#,
        "{{ $labels.instance\n}}",
        "{{ nil | print }}",
    ] {
        assert!(check(ok).is_ok(), "{ok:?}: {:?}", check(ok));
    }
}

#[test]
fn error_display_names_template_and_line() {
    let err = check("line one\n{{ nosuch }}").unwrap_err();
    assert_eq!(err.name, "__alert_HostDown");
    assert_eq!(err.line, 2);
    assert_eq!(
        err.to_string(),
        r#"template: __alert_HostDown:2: function "nosuch" not defined"#
    );
}

#[test]
fn lexical_errors() {
    assert_eq!(message("{{ \"abc }}"), "unterminated quoted string");
    assert_eq!(message("{{ `abc }}"), "unterminated raw quoted string");
    assert_eq!(message("{{ 'a }}"), "unterminated character constant");
    assert_eq!(message("{{ 3k }}"), r#"bad number syntax: "3k""#);
    assert_eq!(message("{{ .a-b }}"), "bad character U+002D '-'");
    assert_eq!(message("{{ $value"), "unclosed action");
    assert_eq!(message("{{/* open"), "unclosed comment");
    assert_eq!(message("{{/* c */ x }}"), "comment ends before closing delimiter");
    assert_eq!(message("{{ ( $value }}"), "unclosed left paren");
    assert_eq!(message("{{ $value ) }}"), "unexpected right paren");
    assert_eq!(message("{{ : }}"), "expected :=");
    assert_eq!(
        message("{{ \u{1} }}"),
        "unrecognized character in action: U+0001"
    );
}

#[test]
fn unclosed_action_reports_where_it_started() {
    let err = check("{{ $value\n\n").unwrap_err();
    assert_eq!(err.message, "unclosed action started at __alert_HostDown:1");
}

#[test]
fn structure_errors() {
    assert_eq!(message("{{ end }}"), "unexpected {{end}}");
    assert_eq!(message("{{ else }}"), "unexpected {{else}}");
    assert_eq!(message("{{ if true }}open"), "unexpected EOF");
    assert_eq!(message("{{ break }}"), "{{break}} outside {{range}}");
    assert_eq!(message("{{ continue }}"), "{{continue}} outside {{range}}");
    assert_eq!(message("{{ if }}x{{ end }}"), "missing value for if");
    assert_eq!(message("{{ }}"), "missing value for command");
    assert_eq!(
        message("{{ range . }}{{ else }}{{ else }}{{ end }}"),
        "expected end; found {{else}}"
    );
    assert_eq!(
        message(r#"{{ define "x" }}{{ else }}{{ end }}"#),
        "unexpected {{else}} in define clause"
    );
    assert_eq!(message("{{ template x }}"), "unexpected \"x\" in template clause");
}

#[test]
fn pipeline_errors() {
    assert_eq!(
        message("{{ $value | 3 }}"),
        "non executable command in pipeline stage 2"
    );
    assert_eq!(message("{{ \"a\".b }}"), r#"unexpected . after term "\"a\"""#);
    assert_eq!(message("{{ $value # }}"), "unexpected \"#\" in operand");
    assert_eq!(message("{{ $a, $b := 1 }}"), "too many declarations in command");
    assert_eq!(message("{{ $value , }}"), "too many declarations in command");
}

#[test]
fn variable_scoping() {
    assert_eq!(message("{{ $nope }}"), r#"undefined variable "$nope""#);
    assert!(check("{{ $ }}").is_ok());
    assert_eq!(
        message("{{ if true }}{{ $x := 1 }}{{ end }}{{ $x }}"),
        r#"undefined variable "$x""#
    );
    assert_eq!(
        message(r#"{{ define "t" }}{{ $labels }}{{ end }}"#),
        r#"undefined variable "$labels""#
    );
    assert!(check("{{ with $v := .Value }}{{ $v }}{{ end }}").is_ok());
}

#[test]
fn string_escapes() {
    assert!(check(r#"{{ "tab\there é \x41 \101 \"q\"" }}"#).is_ok());
    assert_eq!(message(r#"{{ "\q" }}"#), "invalid syntax");
    assert_eq!(message(r#"{{ 'ab' }}"#), "malformed character constant: 'ab'");
}

#[test]
fn numbers() {
    assert!(is_valid_number("10"));
    assert!(is_valid_number("-1.5e3"));
    assert!(is_valid_number("0x1F"));
    assert!(is_valid_number("1_000"));
    assert!(is_valid_number("1+2i"));
    assert!(!is_valid_number("-"));
    assert!(!is_valid_number("0x"));
    assert_eq!(message("{{ - }}"), r#"illegal number syntax: "-""#);
}

#[test]
fn lexer_items() {
    let kinds: Vec<Kind> = lex("a{{- $x := .F | f 1 -}}b").iter().map(|i| i.kind).collect();
    assert_eq!(
        kinds,
        vec![
            Kind::Text,
            Kind::LeftDelim,
            Kind::Variable,
            Kind::Space,
            Kind::Declare,
            Kind::Space,
            Kind::Field,
            Kind::Space,
            Kind::Pipe,
            Kind::Space,
            Kind::Identifier,
            Kind::Space,
            Kind::Number,
            Kind::RightDelim,
            Kind::Text,
            Kind::Eof,
        ]
    );
}
