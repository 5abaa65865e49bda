//! Price source adapters and the batch retrieval orchestrator.
//!
//! Three endpoints disagree on shape and reliability: the overview JSON is
//! rate limited quickly, the history JSON only works with login cookies
//! upstream, and the listing page embeds the series in a script block but
//! prices in whatever currency the Steam session renders. Per-item failures
//! are folded into the output records; they never abort a batch.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::ValueEnum;
use futures::future::join_all;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::{Currency, SteamApi};
use crate::models::{InventoryItem, PricedItem};

/// The community market rate limit sits around 20 requests/minute; eleven
/// seconds between serial requests stays under it.
pub const SERIAL_REQUEST_DELAY: Duration = Duration::from_secs(11);

/// Which endpoint unit prices are scraped from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PriceSource {
    /// `priceoverview` median price.
    Overview,
    /// `pricehistory` daily/hourly series; last point wins.
    History,
    /// Market listing page with the series embedded in a script block.
    /// The currency parameter is ignored here; Steam renders the page in
    /// the session's currency.
    Html,
}

/// Batch pacing policy. Not auto-negotiated; the caller picks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum RetrieveMode {
    /// One request at a time with a fixed delay after each. The only mode
    /// safe for unattended batches of any size.
    Serial,
    /// Everything at once, awaited together. Trips the rate limit on
    /// anything but small batches.
    Concurrent,
}

/// `[label, price, volume]` triple, as both history payloads encode it.
type PricePoint = (String, f64, String);

#[derive(Debug, Deserialize)]
struct OverviewResponse {
    #[serde(default)]
    success: bool,
    median_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    prices: Vec<PricePoint>,
}

/// Numeric token out of a `"<symbol> <number>"` median price string. Steam
/// formats decimals with a comma in some locales.
fn parse_median_price(raw: &str) -> Result<f64> {
    let token = raw
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow!("median price {raw:?} has no numeric token"))?;
    token
        .replace(',', ".")
        .parse::<f64>()
        .with_context(|| format!("median price token {token:?} is not a number"))
}

fn last_price(prices: &[PricePoint]) -> Option<f64> {
    prices.last().map(|(_, price, _)| *price)
}

fn line1_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"var line1=(\[.*?\]);").expect("static regex"))
}

/// The listing page inlines the full sale history as a JSON array literal
/// assigned to `line1`.
fn extract_embedded_prices(html: &str) -> Result<Vec<PricePoint>> {
    let captured = line1_marker()
        .captures(html)
        .ok_or_else(|| anyhow!("listing page has no embedded price series"))?;
    serde_json::from_str(&captured[1]).context("embedded price series is not valid JSON")
}

impl SteamApi {
    async fn price_from_overview(&self, item: &InventoryItem, currency: Currency) -> Result<f64> {
        let url = format!(
            "{}/market/priceoverview/?appid={}&currency={}&market_hash_name={}",
            self.base_url,
            item.app_id,
            currency.code(),
            urlencoding::encode(&item.market_hash_name),
        );
        let response = self.http.get(&url).send().await.with_context(|| {
            format!(
                "overview request failed for {} ({})",
                item.name, item.market_hash_name
            )
        })?;
        let status = response.status();
        let overview: OverviewResponse = response.json().await.with_context(|| {
            format!(
                "overview payload for {} ({}) is not the expected JSON - status {status}",
                item.name, item.market_hash_name
            )
        })?;
        if !overview.success {
            bail!(
                "overview lookup unsuccessful for {} ({}) - status {status}",
                item.name,
                item.market_hash_name
            );
        }
        let median_price = overview.median_price.ok_or_else(|| {
            anyhow!(
                "overview for {} ({}) carries no median price - status {status}",
                item.name,
                item.market_hash_name
            )
        })?;
        parse_median_price(&median_price)
    }

    async fn price_from_history(&self, item: &InventoryItem, currency: Currency) -> Result<f64> {
        let url = format!(
            "{}/market/pricehistory/?appid={}&currency={}&market_hash_name={}",
            self.base_url,
            item.app_id,
            currency.code(),
            urlencoding::encode(&item.market_hash_name),
        );
        let response = self.http.get(&url).send().await.with_context(|| {
            format!(
                "history request failed for {} ({})",
                item.name, item.market_hash_name
            )
        })?;
        let status = response.status();
        let history: HistoryResponse = response.json().await.with_context(|| {
            format!(
                "history payload for {} ({}) is not the expected JSON - status {status}",
                item.name, item.market_hash_name
            )
        })?;
        if !history.success {
            bail!(
                "history lookup unsuccessful for {} ({}) - status {status}",
                item.name,
                item.market_hash_name
            );
        }
        last_price(&history.prices).ok_or_else(|| {
            anyhow!(
                "history for {} ({}) has an empty price series - status {status}",
                item.name,
                item.market_hash_name
            )
        })
    }

    async fn price_from_market_html(&self, item: &InventoryItem) -> Result<f64> {
        let url = format!(
            "{}/market/listings/{}/{}",
            self.base_url,
            item.app_id,
            urlencoding::encode(&item.market_hash_name),
        );
        let response = self.http.get(&url).send().await.with_context(|| {
            format!(
                "listing request failed for {} ({})",
                item.name, item.market_hash_name
            )
        })?;
        let status = response.status();
        let body = response.text().await.with_context(|| {
            format!(
                "listing body unreadable for {} ({}) - status {status}",
                item.name, item.market_hash_name
            )
        })?;
        let prices = extract_embedded_prices(&body).with_context(|| {
            format!(
                "listing page for {} ({}) - status {status}",
                item.name, item.market_hash_name
            )
        })?;
        last_price(&prices).ok_or_else(|| {
            anyhow!(
                "listing page for {} ({}) has an empty price series",
                item.name,
                item.market_hash_name
            )
        })
    }

    async fn fetch_price(
        &self,
        item: &InventoryItem,
        currency: Currency,
        source: PriceSource,
    ) -> Result<f64> {
        match source {
            PriceSource::Overview => self.price_from_overview(item, currency).await,
            PriceSource::History => self.price_from_history(item, currency).await,
            PriceSource::Html => self.price_from_market_html(item).await,
        }
    }

    /// Price one item. The price date and timestamp are stamped at request
    /// time, so long serial batches span a range of timestamps. Failures are
    /// logged and folded into the record; nothing is propagated.
    pub async fn price_item(
        &self,
        item: &InventoryItem,
        currency: Currency,
        source: PriceSource,
    ) -> PricedItem {
        let now = Utc::now();
        let price_unitary = match self.fetch_price(item, currency, source).await {
            Ok(price) => Some(price),
            Err(error) => {
                let error = format!("{error:#}");
                warn!(
                    name = %item.name,
                    market_hash_name = %item.market_hash_name,
                    source = ?source,
                    error = %error,
                    "price lookup failed"
                );
                None
            }
        };
        PricedItem {
            item: item.clone(),
            price_unitary,
            price_date: now.date_naive(),
            price_date_timestamp: now.timestamp(),
        }
    }

    async fn price_items_serial(
        &self,
        items: &[InventoryItem],
        currency: Currency,
        source: PriceSource,
    ) -> Vec<PricedItem> {
        info!(count = items.len(), "requesting item prices serially");
        let mut priced = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            info!(
                current = index + 1,
                total = items.len(),
                name = %item.name,
                "requesting item price"
            );
            priced.push(self.price_item(item, currency, source).await);
            sleep(SERIAL_REQUEST_DELAY).await;
        }
        priced
    }

    async fn price_items_concurrent(
        &self,
        items: &[InventoryItem],
        currency: Currency,
        source: PriceSource,
    ) -> Vec<PricedItem> {
        info!(count = items.len(), "requesting item prices concurrently");
        join_all(
            items
                .iter()
                .map(|item| self.price_item(item, currency, source)),
        )
        .await
    }

    /// Batch price lookup under the chosen pacing policy. The output always
    /// has one record per input item; failed items come back with the error
    /// flag set rather than being dropped.
    pub async fn price_items(
        &self,
        items: &[InventoryItem],
        currency: Currency,
        source: PriceSource,
        mode: RetrieveMode,
    ) -> Vec<PricedItem> {
        match mode {
            RetrieveMode::Serial => self.price_items_serial(items, currency, source).await,
            RetrieveMode::Concurrent => self.price_items_concurrent(items, currency, source).await,
        }
    }
}
