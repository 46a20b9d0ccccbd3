//! Query transformation: inject matchers into a dashboard query while
//! keeping its template variables intact.
//!
//! Pipeline: encode variables, parse, inject, print, decode. Any failure
//! leaves the caller with the original text via [`TransformError::original`].

use cos_lang::{Grammar, PositionError, SyntaxError, placeholder};

use crate::error::{Reasoned, ToolReason};
use crate::inject::{InjectionSet, inject};

#[derive(Debug, thiserror::Error)]
pub enum TransformErrorKind {
    #[error(transparent)]
    StructuralPosition(#[from] PositionError),
    #[error(transparent)]
    GrammarParse(#[from] SyntaxError),
}

/// A failed transformation. `original` is the untouched input.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct TransformError {
    pub original: String,
    pub kind: TransformErrorKind,
}

impl TransformError {
    fn new(original: &str, kind: impl Into<TransformErrorKind>) -> Self {
        Self {
            original: original.to_string(),
            kind: kind.into(),
        }
    }
}

impl Reasoned for TransformError {
    fn reason(&self) -> ToolReason {
        match self.kind {
            TransformErrorKind::StructuralPosition(_) => ToolReason::StructuralPosition,
            TransformErrorKind::GrammarParse(_) => ToolReason::GrammarParse,
        }
    }
}

/// Inject `matchers` into every selector of `query` under grammar `G`.
pub fn transform<G: Grammar>(query: &str, matchers: &InjectionSet) -> Result<String, TransformError> {
    let encoded = placeholder::encode(query).map_err(|e| {
        ct_debug!(xform, error = %e, "variable in unsupported position");
        TransformError::new(query, e)
    })?;
    if !encoded.table.is_empty() {
        ct_trace!(xform, placeholders = encoded.table.len(), text = %encoded.text, "encoded template variables");
    }

    let mut ast = G::parse(&encoded.text).map_err(|e| {
        ct_debug!(xform, error = %e, "query does not parse");
        TransformError::new(query, e)
    })?;

    let added = inject(&mut ast, matchers);
    let rendered = ast.to_string();
    ct_debug!(xform, added, "matchers injected");

    Ok(placeholder::decode(&rendered, &encoded.table))
}
