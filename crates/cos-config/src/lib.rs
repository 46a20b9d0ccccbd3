pub mod logging;
pub mod project;
pub mod prom;
pub mod rulefmt;
pub mod tool;
pub mod types;

pub use logging::{LogFormat, LoggingConfig};
pub use project::{parse_label_matchers, resolve_rule_paths};
pub use prom::{ConfigError, PromConfig, validate_config_file};
pub use rulefmt::{DecodeError, RuleGroup, RuleGroups, RuleKind, RuleNode, decode_rule_file};
pub use tool::{QueryFormat, ToolConfig};
pub use types::PromDuration;
