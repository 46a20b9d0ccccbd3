use super::*;

fn roundtrip(q: &str) -> String {
    parse(q).unwrap().to_string()
}

#[test]
fn stream_selector_keeps_matcher_order() {
    assert_eq!(
        roundtrip(r#"{job="loki",app=~"web.*"}"#),
        r#"{job="loki", app=~"web.*"}"#
    );
}

#[test]
fn line_filters() {
    assert_eq!(
        roundtrip(r#"{job="a"} |= "error" != "timeout" |~ "5.." !~ ".+""#),
        r#"{job="a"} |= "error" != "timeout" |~ "5.." !~ ".+""#
    );
    assert_eq!(
        roundtrip(r#"{job="a"} |= "x" or "y""#),
        r#"{job="a"} |= "x" or "y""#
    );
    assert_eq!(
        roundtrip(r#"{job="a"} |= ip("10.0.0.0/8")"#),
        r#"{job="a"} |= ip("10.0.0.0/8")"#
    );
}

#[test]
fn parser_and_format_stages() {
    assert_eq!(
        roundtrip(r#"{job="a"} | json | logfmt --strict | unpack | decolorize"#),
        r#"{job="a"} | json | logfmt --strict | unpack | decolorize"#
    );
    assert_eq!(
        roundtrip(r#"{job="a"} | json first="servers[0]", ua"#),
        r#"{job="a"} | json first="servers[0]",ua"#
    );
    assert_eq!(
        roundtrip(r#"{job="a"} | regexp "(?P<method>\\w+)" | line_format "{{.method}}""#),
        r#"{job="a"} | regexp "(?P<method>\\w+)" | line_format "{{.method}}""#
    );
    assert_eq!(
        roundtrip(r#"{job="a"} | label_format dst=src, msg="{{.x}}" | drop a, b="c" | keep d"#),
        r#"{job="a"} | label_format dst=src,msg="{{.x}}" | drop a,b="c" | keep d"#
    );
}

#[test]
fn label_filters() {
    assert_eq!(
        roundtrip(r#"{job="a"} | logfmt | level="error" | status>=400"#),
        r#"{job="a"} | logfmt | level="error" | status>=400"#
    );
    assert_eq!(
        roundtrip(r#"{job="a"} | json | latency > 250ms"#),
        r#"{job="a"} | json | latency>250ms"#
    );
    assert_eq!(
        roundtrip(r#"{job="a"} | logfmt | status = 200 or (a="b", c=~"d.*")"#),
        r#"{job="a"} | logfmt | ( status==200 or ( a="b" , c=~"d.*" ) )"#
    );
}

#[test]
fn range_and_vector_aggregations() {
    assert_eq!(
        roundtrip(r#"sum(rate({app="foo", env="production"} |= "error" [5m])) by (job) "#),
        r#"sum by(job)(rate({app="foo", env="production"} |= "error"[5m]))"#
    );
    assert_eq!(
        roundtrip(r#"count_over_time({job="a"}[1h] |= "x")"#),
        r#"count_over_time({job="a"} |= "x"[1h])"#
    );
    assert_eq!(
        roundtrip(r#"topk(3, sum by (app) (bytes_rate({job="a"}[1m])))"#),
        r#"topk(3,sum by(app)(bytes_rate({job="a"}[1m])))"#
    );
    assert_eq!(
        roundtrip(r#"quantile_over_time(0.99, {job="a"} | json | unwrap duration(latency) | __error__="" [5m]) by (path)"#),
        r#"quantile_over_time(0.99,{job="a"} | json | unwrap duration(latency) | __error__=""[5m]) by(path)"#
    );
}

#[test]
fn offset_on_log_range() {
    assert_eq!(
        roundtrip(r#"rate({job="a"}[5m] offset 1h)"#),
        r#"rate({job="a"}[5m] offset 1h)"#
    );
}

#[test]
fn binary_and_literals() {
    assert_eq!(
        roundtrip(r#"sum(rate({job="a"}[1m])) / sum(rate({job="b"}[1m])) > 0.5"#),
        r#"((sum(rate({job="a"}[1m])) / sum(rate({job="b"}[1m]))) > 0.5)"#
    );
    assert_eq!(
        roundtrip(r#"sum(count_over_time({job="a"}[1m])) or vector(0)"#),
        r#"(sum(count_over_time({job="a"}[1m])) or vector(0))"#
    );
    assert_eq!(
        roundtrip(r#"label_replace(rate({job="a"}[1m]), "dst", "$1", "src", "(.*)")"#),
        r#"label_replace(rate({job="a"}[1m]),"dst","$1","src","(.*)")"#
    );
}

#[test]
fn walk_visits_nested_selectors() {
    let mut e = parse(r#"sum(rate({a="1"}[1m])) + sum(rate({b="2"}[1m]))"#).unwrap();
    let mut seen = Vec::new();
    e.walk_selectors_mut(&mut |s| seen.push(s.matchers()[0].name.clone()));
    assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn unwrap_rules() {
    assert!(parse(r#"sum_over_time({job="a"}[5m])"#).is_err());
    assert!(parse(r#"count_over_time({job="a"} | unwrap x [5m])"#).is_err());
    assert!(parse(r#"sum_over_time({job="a"} | logfmt | unwrap bytes(size) [5m])"#).is_ok());
}

#[test]
fn syntax_errors() {
    for bad in [
        "",
        r#"{job="test""#,
        r#"{job=~"["}"#,
        r#"{job="test"} |"#,
        r#"sum(rate({job="a"}[5m])"#,
        r#"sum by(job)() > 0"#,
        r#"{}"#,
        r#"{job=""}"#,
        r#"rate({job="a"})"#,
        r#"{job="a"} |~ "(""#,
        r#"topk(1.5, rate({job="a"}[1m]))"#,
    ] {
        let err = parse(bad).unwrap_err();
        assert!(err.to_string().contains("syntax error"), "{bad:?} -> {err}");
    }
}

#[test]
fn negative_range_is_not_a_duration() {
    let err = parse(r#"count_over_time({job="a"}[-5m])"#).unwrap_err();
    assert!(err.to_string().contains("not a valid duration string"), "{err}");
}
