//! Env var parsing helpers shared by the config sections.

use std::str::FromStr;

use crate::error::ConfigError;

/// Read an env var, treating empty values as unset.
pub(crate) fn optional_env(name: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(name) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            var: name.to_string(),
            reason: "value is not valid unicode".to_string(),
        }),
    }
}

/// Parse a boolean env var; accepts true/false, 1/0, yes/no.
pub(crate) fn parse_bool_env(name: &str, default: bool) -> Result<bool, ConfigError> {
    match optional_env(name)? {
        None => Ok(default),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                var: name.to_string(),
                reason: format!("expected a boolean, got '{other}'"),
            }),
        },
    }
}

/// Read a string env var with a default.
pub(crate) fn parse_string_env(name: &str, default: &str) -> Result<String, ConfigError> {
    Ok(optional_env(name)?.unwrap_or_else(|| default.to_string()))
}

/// Parse any `FromStr` value with a default.
pub(crate) fn parse_optional_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(name)? {
        None => Ok(default),
        Some(v) => v.parse::<T>().map_err(|e| ConfigError::InvalidValue {
            var: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_var_yields_default() {
        assert!(!parse_bool_env("TOOLGATE_TEST_UNSET_BOOL", false).unwrap());
        assert_eq!(
            parse_optional_env::<u64>("TOOLGATE_TEST_UNSET_NUM", 42).unwrap(),
            42
        );
        assert_eq!(
            parse_string_env("TOOLGATE_TEST_UNSET_STR", "fallback").unwrap(),
            "fallback"
        );
    }

    #[test]
    fn test_invalid_number_is_reported() {
        // SAFETY: test-only env mutation; key is unique to this test.
        unsafe { std::env::set_var("TOOLGATE_TEST_BAD_NUM", "not-a-number") };
        let err = parse_optional_env::<u64>("TOOLGATE_TEST_BAD_NUM", 1).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        unsafe { std::env::remove_var("TOOLGATE_TEST_BAD_NUM") };
    }
}
