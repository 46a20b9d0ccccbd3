use super::*;

fn kinds(query: &str) -> Vec<(String, ContextKind, bool)> {
    classify(query)
        .unwrap()
        .into_iter()
        .map(|o| (o.text, o.kind, o.quoted))
        .collect()
}

// -----------------------------------------------------------------------
// Tokenizing
// -----------------------------------------------------------------------

#[test]
fn recognises_variable_forms() {
    let found: Vec<String> = classify("a{x=\"$one\"} + $two + ${three} + ${four:csv}")
        .unwrap()
        .into_iter()
        .map(|o| o.text)
        .collect();
    assert_eq!(found, ["$one", "$two", "${three}", "${four:csv}"]);
}

#[test]
fn lone_dollar_is_not_a_variable() {
    assert!(classify(r#"up{path=~"/api$"} > $"#).unwrap().is_empty());
    assert!(classify("${}").unwrap().is_empty());
}

// -----------------------------------------------------------------------
// Context classification
// -----------------------------------------------------------------------

#[test]
fn metric_name_component() {
    assert_eq!(
        kinds(r#"otelcol_receiver${suffix_total}{job="x"}"#),
        [("${suffix_total}".to_string(), ContextKind::MetricName, false)]
    );
}

#[test]
fn duration_positions() {
    let k = kinds("rate(x[$__rate_interval]) + max_over_time(y[$r:$s]) + z offset $off");
    let all_durations = k.iter().all(|(_, kind, _)| *kind == ContextKind::Duration);
    assert!(all_durations, "{k:?}");
    assert_eq!(k.len(), 4);
}

#[test]
fn label_values_quoted_and_bare() {
    assert_eq!(
        kinds(r#"up{job="$job", env=$env, a!~"$re"}"#),
        [
            ("$job".to_string(), ContextKind::LabelValue, true),
            ("$env".to_string(), ContextKind::LabelValue, false),
            ("$re".to_string(), ContextKind::LabelValue, true),
        ]
    );
}

#[test]
fn comparison_is_not_a_matcher() {
    let k = kinds("up == $a and up >= $b");
    assert!(k.iter().all(|(_, kind, _)| *kind == ContextKind::Generic));
}

#[test]
fn line_filter_strings_are_generic() {
    assert_eq!(
        kinds(r#"{job="a"} |= "$text" != "$other""#),
        [
            ("$text".to_string(), ContextKind::Generic, false),
            ("$other".to_string(), ContextKind::Generic, false),
        ]
    );
}

#[test]
fn partial_string_is_generic() {
    assert_eq!(
        kinds(r#"up{job=~"$job.*"}"#),
        [("$job".to_string(), ContextKind::Generic, false)]
    );
}

// -----------------------------------------------------------------------
// Unsupported positions
// -----------------------------------------------------------------------

#[test]
fn function_name_position() {
    let err = encode("$fn(metric[5m])").unwrap_err();
    assert!(matches!(err, PositionError::FunctionName { .. }));
    assert!(err.to_string().contains("function name positions are not supported"));
    assert!(matches!(
        encode("rate_${kind}(x[5m])").unwrap_err(),
        PositionError::FunctionName { .. }
    ));
}

#[test]
fn grouping_position() {
    for q in ["sum by ($label) (x)", "sum(x) without (a, $b)", "sum by($l)(x)"] {
        let err = encode(q).unwrap_err();
        assert!(
            err.to_string()
                .contains("grouping (by/without) positions are not supported"),
            "{q}: {err}"
        );
    }
}

#[test]
fn leading_metric_name_position() {
    let err = encode(r#"${prefix}_metric{job="x"}"#).unwrap_err();
    assert_eq!(
        err,
        PositionError::LeadingMetricName {
            variable: "${prefix}".to_string(),
            offset: 0,
        }
    );
    assert!(encode(r#"$metric{job="x"}"#).is_err());
}

#[test]
fn leading_metric_name_before_range() {
    for q in ["rate($metric[5m])", "rate(${metric}[$__rate_interval])"] {
        let err = encode(q).unwrap_err();
        assert!(
            matches!(err, PositionError::LeadingMetricName { offset: 5, .. }),
            "{q}: {err}"
        );
    }
    // Glued after a literal prefix the run is still one identifier.
    assert!(encode("rate(node_${suffix}[5m])").is_ok());
}

#[test]
fn strings_are_exempt_from_structural_checks() {
    assert!(encode(r#"label_replace(up, "dst", "$1(", "src", "(.*)")"#).is_ok());
}

// -----------------------------------------------------------------------
// Encoding
// -----------------------------------------------------------------------

#[test]
fn allocation_follows_context_precedence() {
    let enc = encode(r#"m${s}{a="$v"}[$r] > $g"#).unwrap();
    assert_eq!(
        enc.text,
        r#"m__var99990000__{a="99990002"}[99990001] > 99990003"#
    );
    assert_eq!(enc.table.len(), 4);
    assert_eq!(enc.table.get("$r").map(|p| p.in_duration), Some(true));
    assert_eq!(enc.table.get("$v").and_then(|p| p.label_quoted), Some(true));
}

#[test]
fn at_modifier_timestamp() {
    assert_eq!(
        kinds("x @ $ts + y @${__to:date:seconds}"),
        [
            ("$ts".to_string(), ContextKind::Timestamp, false),
            ("${__to:date:seconds}".to_string(), ContextKind::Timestamp, false),
        ]
    );
    let enc = encode("x @ $ts").unwrap();
    assert_eq!(enc.text, "x @ 99990000");
    assert_eq!(enc.table.get("$ts").map(|p| p.in_timestamp), Some(true));
}

#[test]
fn bare_label_value_is_quoted() {
    let enc = encode("up{job=$job}").unwrap();
    assert_eq!(enc.text, r#"up{job="99990000"}"#);
    assert_eq!(enc.table.entries()[0].label_quoted, Some(false));
}

#[test]
fn repeated_variable_shares_token() {
    let enc = encode(r#"a{x="$v"} / b{x="$v"}"#).unwrap();
    assert_eq!(enc.table.len(), 1);
    assert_eq!(enc.text, r#"a{x="99990000"} / b{x="99990000"}"#);
}

#[test]
fn no_variables_is_identity() {
    let enc = encode("sum(rate(x[5m]))").unwrap();
    assert!(enc.table.is_empty());
    assert_eq!(enc.text, "sum(rate(x[5m]))");
}

// -----------------------------------------------------------------------
// Decoding
// -----------------------------------------------------------------------

#[test]
fn decode_restores_each_context() {
    let enc = encode(r#"m${s}{a="$v",b=$w}[$r] > $g"#).unwrap();
    let rendered = r#"m__var99990000__{a="99990002",b="99990003",env="prod"}[1157d7h1s] > 99990004"#;
    assert_eq!(
        decode(rendered, &enc.table),
        r#"m${s}{a="$v",b=$w,env="prod"}[$r] > $g"#
    );
}

#[test]
fn decode_keeps_quotes_of_generic_strings() {
    let enc = encode(r#"{job="a"} |= "$text""#).unwrap();
    assert_eq!(
        decode(r#"{job="a", env="p"} |= "99990000""#, &enc.table),
        r#"{job="a", env="p"} |= "$text""#
    );
}

#[test]
fn decode_prefers_longer_duration_renderings() {
    let enc = encode("x[$a] + y[$b]").unwrap();
    assert_eq!(
        decode("x[1157d7h] + y[1157d7h1s]", &enc.table),
        "x[$a] + y[$b]"
    );
}

#[test]
fn decode_strips_timestamp_decimals() {
    let enc = encode("x @ $ts > $ts").unwrap();
    assert_eq!(
        decode(r#"x{env="prod"} @ 99990000.000 > 99990000"#, &enc.table),
        r#"x{env="prod"} @ $ts > $ts"#
    );
}
