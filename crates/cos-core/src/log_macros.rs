/// Domain-aware logging macros.
///
/// Each macro injects a `domain` field so callers never repeat the string
/// literal. Domains in use: `sys`, `xform` (query transformation), `rules`
/// (rule-file validation), `conf` (configuration checks).
///
/// # Usage
///
/// ```ignore
/// ct_debug!(xform, placeholders = 3, "encoded template variables");
/// ct_info!(rules, file = %name, groups = 2, "rule file valid");
/// ```
///
/// The domain is a bare identifier, not a string. The macros are exported so
/// the binary logs through the same domains.

/// Internal helper. Use `ct_error!` … `ct_trace!`.
#[doc(hidden)]
#[macro_export]
macro_rules! ct_log {
    ($level:ident, $domain:ident, $($field:tt)*) => {
        $crate::tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

/// Log at ERROR level with an automatic `domain` field.
#[macro_export]
macro_rules! ct_error {
    ($domain:ident, $($rest:tt)*) => {
        $crate::ct_log!(error, $domain, $($rest)*)
    };
}

/// Log at WARN level with an automatic `domain` field.
#[macro_export]
macro_rules! ct_warn {
    ($domain:ident, $($rest:tt)*) => {
        $crate::ct_log!(warn, $domain, $($rest)*)
    };
}

/// Log at INFO level with an automatic `domain` field.
#[macro_export]
macro_rules! ct_info {
    ($domain:ident, $($rest:tt)*) => {
        $crate::ct_log!(info, $domain, $($rest)*)
    };
}

/// Log at DEBUG level with an automatic `domain` field.
#[macro_export]
macro_rules! ct_debug {
    ($domain:ident, $($rest:tt)*) => {
        $crate::ct_log!(debug, $domain, $($rest)*)
    };
}

/// Log at TRACE level with an automatic `domain` field.
#[macro_export]
macro_rules! ct_trace {
    ($domain:ident, $($rest:tt)*) => {
        $crate::ct_log!(trace, $domain, $($rest)*)
    };
}
