use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// PromDuration
// ---------------------------------------------------------------------------

/// A duration in the query-language grammar: `"30s"`, `"1h30m"`, `"2w"`,
/// `"500ms"`. Units must appear largest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct PromDuration(Duration);

impl PromDuration {
    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<PromDuration> for Duration {
    fn from(pd: PromDuration) -> Self {
        pd.0
    }
}

impl From<Duration> for PromDuration {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl FromStr for PromDuration {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            anyhow::bail!("empty duration string");
        }
        cos_lang::parse_duration(s)
            .map(Self)
            .map_err(|_| anyhow::anyhow!("not a valid duration string: {s:?}"))
    }
}

impl fmt::Display for PromDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&cos_lang::format_duration(self.0))
    }
}

impl Serialize for PromDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PromDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Scalar coercion
// ---------------------------------------------------------------------------

/// YAML scalars (`5`, `true`, `1.5`) read as their source text wherever the
/// model expects a string. `null` reads as the empty string.
pub(crate) fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_yaml::Value::deserialize(deserializer)?;
    scalar_to_string(value).map_err(de::Error::custom)
}

pub(crate) fn scalar_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<std::collections::BTreeMap<String, String>, D::Error> {
    let raw = Option::<std::collections::BTreeMap<String, serde_yaml::Value>>::deserialize(
        deserializer,
    )?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            scalar_to_string(v)
                .map(|s| (k.clone(), s))
                .map_err(|e| de::Error::custom(format!("key {k:?}: {e}")))
        })
        .collect()
}

fn scalar_to_string(value: serde_yaml::Value) -> Result<String, String> {
    use serde_yaml::Value;
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Sequence(_) => Err("expected a scalar value, found a sequence".into()),
        Value::Mapping(_) => Err("expected a scalar value, found a mapping".into()),
        Value::Tagged(t) => scalar_to_string(t.value),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_prom_duration() {
        assert_eq!(
            "30s".parse::<PromDuration>().unwrap().as_duration(),
            Duration::from_secs(30)
        );
        assert_eq!(
            "1h30m".parse::<PromDuration>().unwrap().as_duration(),
            Duration::from_secs(5400)
        );
        assert_eq!(
            " 2w ".parse::<PromDuration>().unwrap().as_duration(),
            Duration::from_secs(14 * 86400)
        );
        assert!("".parse::<PromDuration>().is_err());
        assert!("5 minutes".parse::<PromDuration>().is_err());
        assert!("-1m".parse::<PromDuration>().is_err());
    }

    #[test]
    fn display_prom_duration() {
        let d: PromDuration = "90m".parse().unwrap();
        assert_eq!(d.to_string(), "1h30m");
        assert_eq!(PromDuration::default().to_string(), "0s");
    }

    #[test]
    fn deserialize_from_yaml() {
        #[derive(Deserialize)]
        struct Holder {
            every: PromDuration,
        }
        let h: Holder = serde_yaml::from_str("every: 5m").unwrap();
        assert_eq!(h.every.as_duration(), Duration::from_secs(300));
        let err = serde_yaml::from_str::<Holder>("every: 5x").err().unwrap();
        assert!(err.to_string().contains("not a valid duration string"));
    }

    #[test]
    fn scalars_read_as_text() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(deserialize_with = "scalar_string")]
            a: String,
            #[serde(default, deserialize_with = "scalar_map")]
            m: std::collections::BTreeMap<String, String>,
        }
        let h: Holder = serde_yaml::from_str("a: 42\nm:\n  x: true\n  y: 1.5\n  z: text\n").unwrap();
        assert_eq!(h.a, "42");
        assert_eq!(h.m["x"], "true");
        assert_eq!(h.m["y"], "1.5");
        assert_eq!(h.m["z"], "text");
        assert!(serde_yaml::from_str::<Holder>("a: [1, 2]").is_err());
    }
}
