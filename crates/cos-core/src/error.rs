use std::fmt::Display;

use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum ToolReason {
    #[error("unsupported variable position")]
    StructuralPosition,
    #[error("query parse error")]
    GrammarParse,
    #[error("rule file decode error")]
    RuleDecode,
    #[error("rule validation error")]
    RuleInvalid,
    #[error("configuration error")]
    Config,
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for ToolReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::StructuralPosition => 1001,
            Self::GrammarParse => 1002,
            Self::RuleDecode => 1101,
            Self::RuleInvalid => 1102,
            Self::Config => 1201,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type ToolError = StructError<ToolReason>;
pub type ToolResult<T> = Result<T, ToolError>;

/// Domain errors that map onto a [`ToolReason`].
pub trait Reasoned: Display {
    fn reason(&self) -> ToolReason;

    /// Structured form carrying the domain message as detail.
    fn to_tool_error(&self) -> ToolError {
        StructError::from(self.reason()).with_detail(self.to_string())
    }
}
