//! Inventory endpoint: raw payload models and aggregation into
//! [`InventoryItem`] records.

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

use super::{Language, SteamApi};
use crate::models::InventoryItem;

/// Raw inventory payload. `assets` carry quantities keyed by a transient
/// class id, `descriptions` carry identity; the two join on `classid` and
/// the class id is discarded after aggregation.
#[derive(Debug, Deserialize)]
struct InventoryResponse {
    assets: Vec<InventoryAsset>,
    descriptions: Vec<InventoryDescription>,
    #[allow(dead_code)]
    total_inventory_count: i64,
    success: i64,
}

#[derive(Debug, Deserialize)]
struct InventoryAsset {
    classid: String,
    amount: String,
}

#[derive(Debug, Deserialize)]
struct InventoryDescription {
    appid: u32,
    classid: String,
    marketable: i64,
    market_name: String,
    market_hash_name: String,
}

/// Fold the raw arrays into one record per marketable item type, ordered by
/// first appearance in `descriptions`. Assets whose class id belongs to no
/// marketable description are dropped.
fn aggregate_items(inventory: InventoryResponse) -> Result<Vec<InventoryItem>> {
    let mut items: IndexMap<String, InventoryItem> = IndexMap::new();
    let mut class_to_hash: HashMap<String, String> = HashMap::new();

    for description in inventory
        .descriptions
        .into_iter()
        .filter(|description| description.marketable == 1)
    {
        if description.market_hash_name.is_empty() {
            bail!(
                "description for {:?} has an empty market_hash_name",
                description.market_name
            );
        }
        class_to_hash.insert(
            description.classid.clone(),
            description.market_hash_name.clone(),
        );
        items
            .entry(description.market_hash_name.clone())
            .or_insert_with(|| InventoryItem {
                app_id: description.appid,
                name: description.market_name,
                amount: 0,
                market_hash_name: description.market_hash_name,
            });
    }

    for asset in &inventory.assets {
        let Some(hash) = class_to_hash.get(&asset.classid) else {
            continue;
        };
        let amount: u32 = asset.amount.parse().with_context(|| {
            format!(
                "asset of class {} has a non-numeric amount {:?}",
                asset.classid, asset.amount
            )
        })?;
        if let Some(item) = items.get_mut(hash) {
            item.amount += amount;
        }
    }

    Ok(items.into_values().collect())
}

impl SteamApi {
    /// All marketable items one user owns for one app, quantities aggregated.
    ///
    /// Single page with a 5000-item count; inventories past that size are a
    /// known boundary condition. A non-success response aborts the whole
    /// call, there is no partial data.
    pub async fn user_app_items(
        &self,
        steam_user_id: u64,
        app_id: u32,
        language: Language,
    ) -> Result<Vec<InventoryItem>> {
        let url = format!(
            "{}/inventory/{steam_user_id}/{app_id}/2?l={}&count=5000",
            self.base_url,
            language.tag(),
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("inventory request failed for app {app_id}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("inventory endpoint returned {status} for app {app_id}");
        }
        let inventory: InventoryResponse = response.json().await.with_context(|| {
            format!("inventory payload for app {app_id} did not match the expected shape")
        })?;
        if inventory.success != 1 {
            bail!(
                "inventory endpoint reported success={} for app {app_id}",
                inventory.success
            );
        }

        let items = aggregate_items(inventory)?;
        info!(app_id, count = items.len(), "fetched marketable inventory");
        Ok(items)
    }
}
