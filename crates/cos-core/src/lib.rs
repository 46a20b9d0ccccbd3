#[macro_use]
mod log_macros;

pub mod checker;
pub mod error;
pub mod inject;
pub mod rules;
pub mod transform;

pub use checker::{Checker, ConfigCheckError, Dialect, LogQl, PromQl};
pub use error::{Reasoned, ToolError, ToolReason, ToolResult};
pub use inject::{InjectionSet, inject};
pub use rules::{RuleError, RuleErrorKind, RulesError, TemplateError, validate_rules};
pub use transform::{TransformError, TransformErrorKind, transform};

#[doc(hidden)]
pub use tracing;
