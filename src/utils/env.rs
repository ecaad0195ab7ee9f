use std::str::FromStr;

/// Get environment variable with TIDEWAY_ prefix, falling back to unprefixed version
///
/// `get_env_with_prefix("IMPERSONATION_TTL_SECONDS")` checks
/// `TIDEWAY_IMPERSONATION_TTL_SECONDS` first, then `IMPERSONATION_TTL_SECONDS`.
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("TIDEWAY_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Parse a prefixed environment variable, logging and ignoring unparsable values.
pub fn get_env_parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = get_env_with_prefix(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key = key, value = %raw, "Ignoring unparsable environment variable");
            None
        }
    }
}
