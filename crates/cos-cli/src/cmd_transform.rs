use std::io::Write;

use anyhow::Result;
use orion_error::ErrorCode;

use cos_config::{ToolConfig, parse_label_matchers};
use cos_core::{Checker, Dialect, InjectionSet, Reasoned, ct_debug};

/// Inject the configured and command-line matchers into `expr`.
pub fn transform_expr(
    dialect: Dialect,
    config: &ToolConfig,
    expr: &str,
    label_matchers: &[String],
) -> Result<String> {
    let overrides = parse_label_matchers(label_matchers)?;
    let set = InjectionSet::from(config.merged_matchers(&overrides));

    dialect.transform(expr, &set).map_err(|e| {
        let err = e.to_tool_error();
        ct_debug!(
            xform,
            code = e.reason().error_code(),
            original = %e.original,
            error = %err,
            "transform failed"
        );
        anyhow::anyhow!("{e}")
    })
}

pub fn run(
    dialect: Dialect,
    config: &ToolConfig,
    expr: String,
    label_matchers: Vec<String>,
) -> Result<()> {
    let output = transform_expr(dialect, config, &expr, &label_matchers)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
