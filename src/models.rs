use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One marketable item type from a user's inventory, quantities already
/// aggregated across the raw asset records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub app_id: u32,
    pub name: String,
    pub amount: u32,
    pub market_hash_name: String,
}

impl InventoryItem {
    /// Composite key used wherever a day's items are ordered.
    pub fn sort_key(&self) -> String {
        format!("{}-{}", self.app_id, self.name)
    }
}

/// An inventory item with the outcome of one price lookup attached.
///
/// `price_unitary` is `None` exactly when the lookup failed; the error flag
/// is derived from it and never stored separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedItem {
    pub item: InventoryItem,
    pub price_unitary: Option<f64>,
    pub price_date: NaiveDate,
    pub price_date_timestamp: i64,
}

impl PricedItem {
    pub fn api_error(&self) -> bool {
        self.price_unitary.is_none()
    }

    /// Failed lookups contribute zero to totals; the sheet cell stays empty.
    pub fn price_total(&self) -> f64 {
        self.price_unitary.unwrap_or(0.0) * f64::from(self.item.amount)
    }

    pub fn sort_key(&self) -> String {
        self.item.sort_key()
    }
}

/// Aggregate over one day's item set. Unique per price date in the summary
/// sheet; recomputed whenever the day's items change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub price_date: NaiveDate,
    pub price_total: f64,
    pub api_error: bool,
}

impl DailySummary {
    pub fn compute(price_date: NaiveDate, items: &[PricedItem]) -> Self {
        Self {
            price_date,
            price_total: items.iter().map(PricedItem::price_total).sum(),
            api_error: items.iter().any(PricedItem::api_error),
        }
    }
}

pub fn total_amount(items: &[PricedItem]) -> u32 {
    items.iter().map(|priced| priced.item.amount).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priced(name: &str, amount: u32, price: Option<f64>) -> PricedItem {
        PricedItem {
            item: InventoryItem {
                app_id: 730,
                name: name.to_string(),
                amount,
                market_hash_name: format!("hash-{name}"),
            },
            price_unitary: price,
            price_date: NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(),
            price_date_timestamp: 1_785_000_000,
        }
    }

    #[test]
    fn error_flag_tracks_missing_price() {
        assert!(priced("a", 1, None).api_error());
        assert!(!priced("a", 1, Some(2.5)).api_error());
    }

    #[test]
    fn failed_lookups_count_as_zero_in_totals() {
        let items = [priced("a", 2, Some(5.0)), priced("b", 3, None)];
        let summary = DailySummary::compute(items[0].price_date, &items);
        assert_eq!(summary.price_total, 10.0);
        assert!(summary.api_error);
        assert_eq!(total_amount(&items), 5);
    }

    #[test]
    fn summary_without_errors_clears_flag() {
        let items = [priced("a", 2, Some(1.5)), priced("b", 1, Some(4.0))];
        let summary = DailySummary::compute(items[0].price_date, &items);
        assert_eq!(summary.price_total, 7.0);
        assert!(!summary.api_error);
    }

    #[test]
    fn sort_key_orders_by_app_then_name() {
        let mut items = vec![priced("knife", 1, None), priced("ak-47", 1, None)];
        items.sort_by_key(PricedItem::sort_key);
        assert_eq!(items[0].item.name, "ak-47");
    }
}
