use std::time::Duration;

use winnow::prelude::*;

use super::*;

// -----------------------------------------------------------------------
// Durations
// -----------------------------------------------------------------------

#[test]
fn parse_duration_units() {
    assert_eq!(duration_value.parse("30s").unwrap(), Duration::from_secs(30));
    assert_eq!(duration_value.parse("5m").unwrap(), Duration::from_secs(300));
    assert_eq!(duration_value.parse("250ms").unwrap(), Duration::from_millis(250));
    assert_eq!(duration_value.parse("2w").unwrap(), Duration::from_secs(14 * 86400));
    assert_eq!(duration_value.parse("1y").unwrap(), Duration::from_secs(365 * 86400));
}

#[test]
fn parse_duration_compound() {
    assert_eq!(
        duration_value.parse("1h30m").unwrap(),
        Duration::from_secs(5400)
    );
    assert_eq!(
        duration_value.parse("1d2h3m4s5ms").unwrap(),
        Duration::from_millis(((86400 + 7200 + 180 + 4) * 1000) + 5)
    );
}

#[test]
fn parse_duration_bare_seconds() {
    assert_eq!(duration_value.parse("90").unwrap(), Duration::from_secs(90));
    assert_eq!(duration_value.parse("0").unwrap(), Duration::ZERO);
}

#[test]
fn parse_duration_rejects() {
    assert!(duration_value.parse("-5m").is_err());
    assert!(duration_value.parse("5m1h").is_err());
    assert!(duration_value.parse("5x").is_err());
    assert!(duration_value.parse("m").is_err());
    assert!(duration_value.parse("1.5h").is_err());
}

#[test]
fn negative_duration_message() {
    let err = parse_duration("-5m").unwrap_err();
    assert_eq!(err.message, "not a valid duration string");
}

#[test]
fn format_duration_forms() {
    assert_eq!(format_duration(Duration::ZERO), "0s");
    assert_eq!(format_duration(Duration::from_secs(300)), "5m");
    assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
    assert_eq!(format_duration(Duration::from_secs(90 * 86400)), "90d");
    assert_eq!(format_duration(Duration::from_secs(14 * 86400)), "2w");
    assert_eq!(format_duration(Duration::from_secs(365 * 86400)), "1y");
    assert_eq!(format_duration(Duration::from_millis(1500)), "1s500ms");
    assert_eq!(format_duration(Duration::from_secs(99_990_000)), "1157d7h");
    assert_eq!(format_duration(Duration::from_secs(99_990_001)), "1157d7h1s");
}

// -----------------------------------------------------------------------
// Strings
// -----------------------------------------------------------------------

#[test]
fn quoted_string_forms() {
    assert_eq!(quoted_string.parse(r#""a\"b""#).unwrap(), "a\"b");
    assert_eq!(quoted_string.parse(r#"'it\'s'"#).unwrap(), "it's");
    assert_eq!(quoted_string.parse(r#""\x41é\n""#).unwrap(), "A\u{e9}\n");
    assert_eq!(quoted_string.parse(r"`raw\d+`").unwrap(), r"raw\d+");
}

#[test]
fn quoted_string_errors() {
    assert!(quoted_string.parse(r#""unterminated"#).is_err());
    assert!(quoted_string.parse(r#""bad \q escape""#).is_err());
    assert!(quoted_string.parse("\"line\nbreak\"").is_err());
}

#[test]
fn quote_escapes() {
    assert_eq!(quote("plain"), "\"plain\"");
    assert_eq!(quote("a\"b\\c"), r#""a\"b\\c""#);
    assert_eq!(quote("tab\there"), r#""tab\there""#);
    assert_eq!(quote("\u{1}"), r#""\x01""#);
    assert_eq!(quote("caf\u{e9}"), "\"caf\u{e9}\"");
}

// -----------------------------------------------------------------------
// Numbers & identifiers
// -----------------------------------------------------------------------

#[test]
fn numbers() {
    assert_eq!(number_literal.parse("42").unwrap(), 42.0);
    assert_eq!(number_literal.parse(".5").unwrap(), 0.5);
    assert_eq!(number_literal.parse("1.5e-3").unwrap(), 0.0015);
    assert_eq!(number_literal.parse("0xff").unwrap(), 255.0);
    assert!(number_literal.parse("NaN").unwrap().is_nan());
    assert!(number_literal.parse("Info").is_err());
    assert!(number_literal.parse(".").is_err());
}

#[test]
fn number_formatting() {
    assert_eq!(format_number(0.5), "0.5");
    assert_eq!(format_number(50.0), "50");
    assert_eq!(format_number(99_990_000.0), "99990000");
    assert_eq!(format_number(f64::INFINITY), "+Inf");
    assert_eq!(format_number(f64::NEG_INFINITY), "-Inf");
    assert_eq!(format_number(f64::NAN), "NaN");
}

#[test]
fn keyword_boundary() {
    let mut input = "offsetx";
    assert!(kw("offset").parse_next(&mut input).is_err());
    assert_eq!(input, "offsetx");
    assert!(peek_kw("by (x)", "by"));
    assert!(!peek_kw("bytes", "by"));
}

#[test]
fn ws_skips_comments() {
    let mut input = "  # comment\n  up";
    ws_skip.parse_next(&mut input).unwrap();
    assert_eq!(input, "up");
}

#[test]
fn syntax_error_position() {
    let src = "abc\n  def";
    let err = (ident, ws_skip, ident, ws_skip, literal("("))
        .parse(src)
        .unwrap_err();
    let rendered = SyntaxError::from_parse(src, &err);
    assert_eq!(rendered.line, 2);
    assert_eq!(rendered.column, 6);
    assert!(rendered.to_string().contains("syntax error"));
}
