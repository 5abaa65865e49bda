//! Environment helpers: centralized dotenv loading and typed getters.
//! Call `init_env()` once early in each binary (or rely on the lazy Once).

use std::str::FromStr;
use std::sync::Once;

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        let _ = dotenv::dotenv();
    });
}

/// Required env var; error if missing.
pub fn env_req(key: &str) -> anyhow::Result<String> {
    init_env();
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing env var {key}"))
}

/// Optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

/// Parsed value with a default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Boolean flag; 1/true/on/yes (case-insensitive) count as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => {
            let value = raw.trim().to_ascii_lowercase();
            matches!(value.as_str(), "1" | "true" | "on" | "yes")
        }
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_falls_back_on_garbage() {
        std::env::set_var("SIP_TEST_PARSE", "not-a-number");
        assert_eq!(env_parse("SIP_TEST_PARSE", 7u32), 7);
        std::env::remove_var("SIP_TEST_PARSE");
    }

    #[test]
    fn flag_accepts_common_truthy_spellings() {
        for raw in ["1", "true", "ON", "yes"] {
            std::env::set_var("SIP_TEST_FLAG", raw);
            assert!(env_flag("SIP_TEST_FLAG", false));
        }
        std::env::remove_var("SIP_TEST_FLAG");
        assert!(!env_flag("SIP_TEST_FLAG", false));
    }
}
