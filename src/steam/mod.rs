pub mod inventory;
pub mod prices;

use clap::ValueEnum;
use reqwest::Client;
use std::time::Duration;

pub const BASE_URL: &str = "https://steamcommunity.com";

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Steam Community handle. One client per batch run; the inventory and
/// price endpoints all reuse it.
#[derive(Clone)]
pub struct SteamApi {
    http: Client,
    base_url: String,
}

impl SteamApi {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

impl Default for SteamApi {
    fn default() -> Self {
        Self::new()
    }
}

/// Currencies the price endpoints understand, by Steam's numeric code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Currency {
    Brl,
    Eur,
    Usd,
}

impl Currency {
    pub fn code(self) -> u32 {
        match self {
            Currency::Usd => 1,
            Currency::Eur => 3,
            Currency::Brl => 7,
        }
    }
}

/// Language item names are fetched in; also selects which name column the
/// relational sink fills.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Language {
    Portuguese,
    English,
}

impl Language {
    /// Tag the inventory endpoint expects in its `l=` parameter.
    pub fn tag(self) -> &'static str {
        match self {
            Language::Portuguese => "portuguese",
            Language::English => "english",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_codes_match_steam() {
        assert_eq!(Currency::Usd.code(), 1);
        assert_eq!(Currency::Eur.code(), 3);
        assert_eq!(Currency::Brl.code(), 7);
    }
}
