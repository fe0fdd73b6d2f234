use crate::error::{Result, UniqueError};
use std::str::FromStr;

/// Value of `var_name`, or `default` when unset or blank
pub(crate) fn env_or(var_name: &str, default: &str) -> String {
    std::env::var(var_name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub(crate) fn parse_env<T>(var_name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(var_name, &env_or(var_name, default))
}

pub(crate) fn parse_value<T>(var_name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| UniqueError::EnvParse {
        var_name: var_name.to_string(),
        value: value.to_string(),
        error: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_reports_variable() {
        let err = parse_value::<u16>("UNIQUE_REDIS_PORT", "nope").unwrap_err();
        match err {
            UniqueError::EnvParse {
                var_name, value, ..
            } => {
                assert_eq!(var_name, "UNIQUE_REDIS_PORT");
                assert_eq!(value, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_value_trims() {
        assert_eq!(parse_value::<usize>("X", " 42 ").unwrap(), 42);
    }

    #[test]
    fn test_unset_variable_falls_back() {
        assert_eq!(
            env_or("UNIQUE_FILTER_TEST_SURELY_UNSET", "fallback"),
            "fallback"
        );
    }
}
