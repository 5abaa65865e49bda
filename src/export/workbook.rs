//! Day-partitioned CSV workbook: one sheet file per calendar day plus a
//! rolling `Summary` sheet, preserving the spreadsheet layout column for
//! column. Every day sheet ends with one aggregate row holding the item
//! count and price totals.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, Utc};
use csv::StringRecord;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::models::{total_amount, DailySummary, InventoryItem, PricedItem};

pub const ITEM_COLUMNS: [&str; 9] = [
    "app_id",
    "name",
    "price_unitary",
    "amount",
    "price_total",
    "api_error",
    "price_date",
    "price_date_timestamp",
    "market_hash_name",
];

pub const SUMMARY_COLUMNS: [&str; 3] = ["price_date", "price_total", "api_error"];

const SUMMARY_SHEET: &str = "Summary";
const PLACEHOLDER: &str = "---";
const SUM_ROW_NAME: &str = "Sum of all items";

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

pub struct Workbook {
    dir: PathBuf,
}

impl Workbook {
    /// Open the workbook directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("cannot create workbook directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn sheet_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.csv"))
    }

    /// Day sheets present, oldest first.
    pub fn day_sheets(&self) -> Result<Vec<NaiveDate>> {
        let mut days = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("cannot read workbook directory {}", self.dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("csv") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if stem == SUMMARY_SHEET {
                continue;
            }
            if let Ok(date) = stem.parse::<NaiveDate>() {
                days.push(date);
            }
        }
        days.sort();
        Ok(days)
    }

    pub fn most_recent_day(&self) -> Result<NaiveDate> {
        self.day_sheets()?
            .pop()
            .ok_or_else(|| anyhow!("workbook {} has no day sheets", self.dir.display()))
    }

    /// Items on one day's sheet, aggregate row excluded.
    pub fn read_day_items(&self, date: NaiveDate) -> Result<Vec<PricedItem>> {
        let path = self.sheet_path(&date.to_string());
        let mut reader = csv::Reader::from_path(&path)
            .with_context(|| format!("cannot open sheet {}", path.display()))?;
        let mut items = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.get(0) == Some(PLACEHOLDER) {
                continue;
            }
            items.push(
                parse_item_record(&record)
                    .with_context(|| format!("malformed row in sheet {date}"))?,
            );
        }
        Ok(items)
    }

    pub fn read_summary(&self) -> Result<Vec<DailySummary>> {
        let path = self.sheet_path(SUMMARY_SHEET);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&path)
            .with_context(|| format!("cannot open sheet {}", path.display()))?;
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(parse_summary_record(&record).context("malformed row in summary sheet")?);
        }
        Ok(rows)
    }

    fn write_day_sheet(&self, date: NaiveDate, items: &[PricedItem]) -> Result<()> {
        let path = self.sheet_path(&date.to_string());
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("cannot write sheet {}", path.display()))?;
        writer.write_record(ITEM_COLUMNS)?;
        for item in items {
            writer.write_record(item_record(item))?;
        }
        let summary = DailySummary::compute(date, items);
        writer.write_record([
            PLACEHOLDER.to_string(),
            SUM_ROW_NAME.to_string(),
            PLACEHOLDER.to_string(),
            total_amount(items).to_string(),
            summary.price_total.to_string(),
            yes_no(summary.api_error).to_string(),
            date.to_string(),
            Utc::now().timestamp().to_string(),
            PLACEHOLDER.to_string(),
        ])?;
        writer.flush()?;
        Ok(())
    }

    fn write_summary(&self, rows: &[DailySummary]) -> Result<()> {
        let path = self.sheet_path(SUMMARY_SHEET);
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("cannot write sheet {}", path.display()))?;
        writer.write_record(SUMMARY_COLUMNS)?;
        for row in rows {
            writer.write_record([
                row.price_date.to_string(),
                row.price_total.to_string(),
                yes_no(row.api_error).to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Replace-by-day: rewrite the date's sheet from scratch and upsert its
    /// summary row, dropping any previous row for the same date.
    pub fn export_day(&self, date: NaiveDate, items: &[PricedItem]) -> Result<DailySummary> {
        let summary = DailySummary::compute(date, items);
        self.write_day_sheet(date, items)?;
        let mut rows = self.read_summary()?;
        rows.retain(|row| row.price_date != date);
        rows.push(summary.clone());
        rows.sort_by_key(|row| row.price_date);
        self.write_summary(&rows)?;
        info!(
            date = %date,
            items = items.len(),
            price_total = summary.price_total,
            "exported day sheet"
        );
        Ok(summary)
    }

    /// Partition the most recent sheet into still-good items and items whose
    /// lookup failed, guarded so retries only run against the still-open
    /// current day.
    pub fn retryable_items(
        &self,
        today: NaiveDate,
    ) -> Result<(Vec<PricedItem>, Vec<PricedItem>)> {
        let most_recent = self.most_recent_day()?;
        if most_recent != today {
            bail!(
                "can only retry api errors on the current date ({today}); \
                 most recent sheet is from {most_recent}"
            );
        }
        let items = self.read_day_items(most_recent)?;
        Ok(items.into_iter().partition(|item| !item.api_error()))
    }

    /// Refresh quantities on every day sheet from a current inventory
    /// snapshot (market hash name to owned amount). Items gone from the
    /// inventory are dropped from all sheets and the summary sheet is
    /// rebuilt in date order.
    pub fn update_amounts(&self, current: &HashMap<String, u32>) -> Result<()> {
        let mut summaries = Vec::new();
        for date in self.day_sheets()? {
            let mut items = self.read_day_items(date)?;
            items.retain(|priced| current.contains_key(&priced.item.market_hash_name));
            for priced in &mut items {
                priced.item.amount = current[&priced.item.market_hash_name];
            }
            self.write_day_sheet(date, &items)?;
            summaries.push(DailySummary::compute(date, &items));
            info!(date = %date, items = items.len(), "refreshed sheet amounts");
        }
        self.write_summary(&summaries)?;
        Ok(())
    }
}

fn item_record(priced: &PricedItem) -> [String; 9] {
    [
        priced.item.app_id.to_string(),
        priced.item.name.clone(),
        priced
            .price_unitary
            .map(|price| price.to_string())
            .unwrap_or_default(),
        priced.item.amount.to_string(),
        priced.price_total().to_string(),
        yes_no(priced.api_error()).to_string(),
        priced.price_date.to_string(),
        priced.price_date_timestamp.to_string(),
        priced.item.market_hash_name.clone(),
    ]
}

fn field<'r>(record: &'r StringRecord, index: usize) -> Result<&'r str> {
    record
        .get(index)
        .ok_or_else(|| anyhow!("row is missing column {:?}", ITEM_COLUMNS[index]))
}

fn parse_item_record(record: &StringRecord) -> Result<PricedItem> {
    let price_raw = field(record, 2)?;
    let price_unitary = if price_raw.is_empty() {
        None
    } else {
        Some(
            price_raw
                .parse::<f64>()
                .with_context(|| format!("price_unitary {price_raw:?} is not a number"))?,
        )
    };
    Ok(PricedItem {
        item: InventoryItem {
            app_id: field(record, 0)?
                .parse()
                .context("app_id is not a number")?,
            name: field(record, 1)?.to_string(),
            amount: field(record, 3)?
                .parse()
                .context("amount is not a number")?,
            market_hash_name: field(record, 8)?.to_string(),
        },
        price_unitary,
        price_date: field(record, 6)?
            .parse()
            .context("price_date is not an ISO date")?,
        price_date_timestamp: field(record, 7)?
            .parse()
            .context("price_date_timestamp is not a number")?,
    })
}

fn parse_summary_record(record: &StringRecord) -> Result<DailySummary> {
    Ok(DailySummary {
        price_date: record
            .get(0)
            .ok_or_else(|| anyhow!("summary row is missing price_date"))?
            .parse()
            .context("price_date is not an ISO date")?,
        price_total: record
            .get(1)
            .ok_or_else(|| anyhow!("summary row is missing price_total"))?
            .parse()
            .context("price_total is not a number")?,
        api_error: record.get(2) == Some("yes"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_workbook(tag: &str) -> Workbook {
        let dir = std::env::temp_dir().join(format!(
            "sip-workbook-{tag}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        Workbook::open(dir).unwrap()
    }

    fn day(raw: &str) -> NaiveDate {
        raw.parse().unwrap()
    }

    fn priced(name: &str, amount: u32, price: Option<f64>, date: NaiveDate) -> PricedItem {
        PricedItem {
            item: InventoryItem {
                app_id: 730,
                name: name.to_string(),
                amount,
                market_hash_name: format!("hash-{name}"),
            },
            price_unitary: price,
            price_date: date,
            price_date_timestamp: 1_785_000_000,
        }
    }

    #[test]
    fn day_sheet_roundtrip_excludes_aggregate_row() {
        let workbook = temp_workbook("roundtrip");
        let date = day("2026-08-06");
        let items = vec![
            priced("ak-47", 2, Some(5.0), date),
            priced("knife", 3, None, date),
        ];
        workbook.export_day(date, &items).unwrap();

        let read_back = workbook.read_day_items(date).unwrap();
        assert_eq!(read_back, items);
    }

    #[test]
    fn aggregate_row_totals_match_the_data_rows() {
        let workbook = temp_workbook("aggregate");
        let date = day("2026-08-06");
        let items = vec![
            priced("ak-47", 2, Some(5.0), date),
            priced("case", 4, Some(0.25), date),
            priced("knife", 3, None, date),
        ];
        workbook.export_day(date, &items).unwrap();

        let raw = fs::read_to_string(workbook.sheet_path("2026-08-06")).unwrap();
        let last_line = raw.lines().last().unwrap();
        let cells: Vec<&str> = last_line.split(',').collect();
        assert_eq!(cells[0], "---");
        assert_eq!(cells[1], "Sum of all items");
        assert_eq!(cells[3], "9");
        assert_eq!(cells[4].parse::<f64>().unwrap(), 11.0);
        assert_eq!(cells[5], "yes");
    }

    #[test]
    fn export_day_is_idempotent() {
        let workbook = temp_workbook("idempotent");
        let date = day("2026-08-06");
        let items = vec![priced("ak-47", 2, Some(5.0), date)];
        workbook.export_day(date, &items).unwrap();
        workbook.export_day(date, &items).unwrap();

        assert_eq!(workbook.day_sheets().unwrap(), vec![date]);
        let summary = workbook.read_summary().unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].price_date, date);
        assert_eq!(summary[0].price_total, 10.0);
    }

    #[test]
    fn export_day_overwrites_the_summary_row_for_the_date() {
        let workbook = temp_workbook("overwrite");
        let date = day("2026-08-06");
        workbook
            .export_day(date, &[priced("ak-47", 2, Some(5.0), date)])
            .unwrap();
        workbook
            .export_day(date, &[priced("ak-47", 2, Some(7.0), date)])
            .unwrap();

        let summary = workbook.read_summary().unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].price_total, 14.0);
    }

    #[test]
    fn summary_rows_stay_date_ordered_across_days() {
        let workbook = temp_workbook("ordered");
        let earlier = day("2026-08-05");
        let later = day("2026-08-06");
        workbook
            .export_day(later, &[priced("ak-47", 1, Some(2.0), later)])
            .unwrap();
        workbook
            .export_day(earlier, &[priced("ak-47", 1, Some(1.0), earlier)])
            .unwrap();

        let summary = workbook.read_summary().unwrap();
        let dates: Vec<_> = summary.iter().map(|row| row.price_date).collect();
        assert_eq!(dates, vec![earlier, later]);
    }

    #[test]
    fn retryable_items_partitions_by_error_flag() {
        let workbook = temp_workbook("retry-partition");
        let date = day("2026-08-06");
        let items = vec![
            priced("ak-47", 2, Some(5.0), date),
            priced("knife", 3, None, date),
        ];
        workbook.export_day(date, &items).unwrap();

        let (ok, errored) = workbook.retryable_items(date).unwrap();
        assert_eq!(ok, vec![items[0].clone()]);
        assert_eq!(errored, vec![items[1].clone()]);
    }

    #[test]
    fn retry_merge_leaves_successful_items_untouched() {
        let workbook = temp_workbook("retry-merge");
        let date = day("2026-08-06");
        workbook
            .export_day(
                date,
                &[
                    priced("ak-47", 2, Some(5.0), date),
                    priced("knife", 3, None, date),
                ],
            )
            .unwrap();

        let (ok, errored) = workbook.retryable_items(date).unwrap();
        let mut merged = ok;
        merged.extend(errored.into_iter().map(|failed| PricedItem {
            price_unitary: Some(90.0),
            price_date_timestamp: failed.price_date_timestamp + 120,
            ..failed
        }));
        merged.sort_by_key(PricedItem::sort_key);
        workbook.export_day(date, &merged).unwrap();

        let after = workbook.read_day_items(date).unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].item.name, "ak-47");
        assert_eq!(after[0].price_unitary, Some(5.0));
        assert_eq!(after[0].price_date_timestamp, 1_785_000_000);
        assert_eq!(after[1].price_unitary, Some(90.0));
    }

    #[test]
    fn retryable_items_refuses_stale_sheets() {
        let workbook = temp_workbook("retry-stale");
        let yesterday = day("2026-08-05");
        workbook
            .export_day(yesterday, &[priced("knife", 3, None, yesterday)])
            .unwrap();
        let before = fs::read_to_string(workbook.sheet_path("2026-08-05")).unwrap();

        let error = workbook.retryable_items(day("2026-08-06")).unwrap_err();
        assert!(error.to_string().contains("most recent sheet"));

        let after = fs::read_to_string(workbook.sheet_path("2026-08-05")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn update_amounts_drops_missing_items_and_rebuilds_the_summary() {
        let workbook = temp_workbook("amounts");
        let earlier = day("2026-08-05");
        let later = day("2026-08-06");
        workbook
            .export_day(
                earlier,
                &[
                    priced("ak-47", 2, Some(5.0), earlier),
                    priced("knife", 1, Some(100.0), earlier),
                ],
            )
            .unwrap();
        workbook
            .export_day(
                later,
                &[
                    priced("ak-47", 2, Some(6.0), later),
                    priced("knife", 1, Some(90.0), later),
                ],
            )
            .unwrap();

        // The knife left the inventory; the rifles doubled.
        let current = HashMap::from([("hash-ak-47".to_string(), 4u32)]);
        workbook.update_amounts(&current).unwrap();

        for date in [earlier, later] {
            let items = workbook.read_day_items(date).unwrap();
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].item.market_hash_name, "hash-ak-47");
            assert_eq!(items[0].item.amount, 4);
        }
        let summary = workbook.read_summary().unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].price_total, 20.0);
        assert_eq!(summary[1].price_total, 24.0);
    }
}
