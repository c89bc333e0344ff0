//! Environment-variable configuration helpers
//!
//! AudioLevel is a single process with no multi-tier TOML/database config
//! layering — every knob is an environment variable with a compiled
//! default. These helpers keep the "parse, warn, fall back" shape the
//! rest of the stack uses for anything read from the environment.

use std::str::FromStr;
use tracing::warn;

/// Read an environment variable and parse it, falling back to `default`
/// and logging a warning if it is present but fails to parse.
pub fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, raw, "failed to parse environment variable, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Read a comma-separated environment variable into a `Vec<String>`,
/// trimming whitespace and dropping empty entries.
pub fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_or_falls_back_to_default_when_unset() {
        std::env::remove_var("AL_TEST_VALUE");
        let v: u64 = env_or("AL_TEST_VALUE", 42);
        assert_eq!(v, 42);
    }

    #[test]
    #[serial]
    fn env_or_parses_present_value() {
        std::env::set_var("AL_TEST_VALUE", "99");
        let v: u64 = env_or("AL_TEST_VALUE", 42);
        assert_eq!(v, 99);
        std::env::remove_var("AL_TEST_VALUE");
    }

    #[test]
    #[serial]
    fn env_or_falls_back_on_parse_failure() {
        std::env::set_var("AL_TEST_VALUE", "not-a-number");
        let v: u64 = env_or("AL_TEST_VALUE", 42);
        assert_eq!(v, 42);
        std::env::remove_var("AL_TEST_VALUE");
    }

    #[test]
    #[serial]
    fn env_list_splits_and_trims() {
        std::env::set_var("AL_TEST_LIST", "a, b ,, c");
        let v = env_list("AL_TEST_LIST", &[]);
        assert_eq!(v, vec!["a", "b", "c"]);
        std::env::remove_var("AL_TEST_LIST");
    }

    #[test]
    #[serial]
    fn env_list_uses_default_when_unset() {
        std::env::remove_var("AL_TEST_LIST_2");
        let v = env_list("AL_TEST_LIST_2", &["x", "y"]);
        assert_eq!(v, vec!["x", "y"]);
    }
}
