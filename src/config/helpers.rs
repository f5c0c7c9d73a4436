use std::str::FromStr;

use crate::error::ConfigError;

/// Read an env var, treating unset and blank values the same.
///
/// Surrounding whitespace and one layer of quotes are stripped, so values
/// pasted from `.env` files with `KEY="value"` still resolve cleanly.
pub(crate) fn optional_env(key: &str) -> Option<String> {
    let raw = std::env::var(key).ok()?;
    let normalized = normalize_env_value(&raw);
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Read a required env var, failing with a hint for the operator.
pub(crate) fn required_env(key: &str, hint: &str) -> Result<String, ConfigError> {
    optional_env(key).ok_or_else(|| ConfigError::MissingRequired {
        key: key.to_string(),
        hint: hint.to_string(),
    })
}

/// Parse an optional env var into `T`, reporting the key on failure.
pub(crate) fn parsed_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)
        .map(|s| s.parse())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{e}"),
        })
}

fn normalize_env_value(raw: &str) -> String {
    let trimmed = raw.trim();
    let maybe_unquoted = trimmed
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .or_else(|| {
            trimmed
                .strip_prefix('\'')
                .and_then(|inner| inner.strip_suffix('\''))
        })
        .unwrap_or(trimmed);
    maybe_unquoted.trim().to_string()
}
