//! Relational sink: long-term per-item price history plus named item lists,
//! kept in a local SQLite file.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::info;

use crate::models::{InventoryItem, PricedItem};
use crate::steam::Language;

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("cannot open database {}", path.display()))?;
        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory().context("cannot open in-memory database")?,
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS item (
                    market_hash_name TEXT PRIMARY KEY,
                    app_id INTEGER NOT NULL,
                    name_pt TEXT,
                    name_en TEXT
                );
                CREATE TABLE IF NOT EXISTS item_price (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    item_id TEXT NOT NULL REFERENCES item(market_hash_name),
                    date TEXT NOT NULL,
                    price_usd REAL NOT NULL,
                    UNIQUE (item_id, date)
                );
                CREATE TABLE IF NOT EXISTS list (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    steam_id INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS item_list (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    item_id TEXT NOT NULL REFERENCES item(market_hash_name),
                    list_id INTEGER NOT NULL REFERENCES list(id),
                    quantity INTEGER NOT NULL,
                    UNIQUE (item_id, list_id)
                );",
            )
            .context("failed to create database tables")
    }

    /// Upsert item identity. Only the requested language's name column is
    /// touched, so names in the other language survive.
    pub fn upsert_item(&self, item: &InventoryItem, language: Language) -> Result<()> {
        let sql = match language {
            Language::Portuguese => {
                "INSERT INTO item (market_hash_name, app_id, name_pt) VALUES (?1, ?2, ?3)
                 ON CONFLICT (market_hash_name)
                 DO UPDATE SET app_id = excluded.app_id, name_pt = excluded.name_pt"
            }
            Language::English => {
                "INSERT INTO item (market_hash_name, app_id, name_en) VALUES (?1, ?2, ?3)
                 ON CONFLICT (market_hash_name)
                 DO UPDATE SET app_id = excluded.app_id, name_en = excluded.name_en"
            }
        };
        self.conn
            .execute(sql, params![item.market_hash_name, item.app_id, item.name])
            .with_context(|| format!("failed to upsert item {}", item.market_hash_name))?;
        Ok(())
    }

    /// One price point per item per day; re-running a day overwrites it.
    pub fn record_price(&self, market_hash_name: &str, date: NaiveDate, price: f64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO item_price (item_id, date, price_usd) VALUES (?1, ?2, ?3)
                 ON CONFLICT (item_id, date) DO UPDATE SET price_usd = excluded.price_usd",
                params![market_hash_name, date.to_string(), price],
            )
            .with_context(|| format!("failed to record price for {market_hash_name}"))?;
        Ok(())
    }

    /// Load one day's priced items into the history. Errored items have no
    /// price and get no `item_price` row; their identity is still upserted.
    pub fn sync_priced_items(&self, items: &[PricedItem], language: Language) -> Result<usize> {
        let mut recorded = 0;
        for priced in items {
            self.upsert_item(&priced.item, language)?;
            if let Some(price) = priced.price_unitary {
                self.record_price(&priced.item.market_hash_name, priced.price_date, price)?;
                recorded += 1;
            }
        }
        info!(
            items = items.len(),
            recorded, "synced priced items to the database"
        );
        Ok(recorded)
    }

    pub fn create_list(&self, steam_id: u64, name: &str) -> Result<i64> {
        let today = Utc::now().date_naive().to_string();
        self.conn
            .execute(
                "INSERT INTO list (steam_id, name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![steam_id as i64, name, today],
            )
            .with_context(|| format!("failed to create list {name:?}"))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Add an item to a list, or update its quantity when already present.
    pub fn add_list_item(
        &self,
        list_id: i64,
        market_hash_name: &str,
        quantity: u32,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO item_list (item_id, list_id, quantity) VALUES (?1, ?2, ?3)
                 ON CONFLICT (item_id, list_id) DO UPDATE SET quantity = excluded.quantity",
                params![market_hash_name, list_id, quantity],
            )
            .with_context(|| format!("failed to add {market_hash_name} to list {list_id}"))?;
        self.conn
            .execute(
                "UPDATE list SET updated_at = ?1 WHERE id = ?2",
                params![Utc::now().date_naive().to_string(), list_id],
            )
            .with_context(|| format!("failed to touch list {list_id}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str) -> InventoryItem {
        InventoryItem {
            app_id: 730,
            name: name.to_string(),
            amount: 1,
            market_hash_name: format!("hash-{name}"),
        }
    }

    fn priced(name: &str, price: Option<f64>, date: &str) -> PricedItem {
        PricedItem {
            item: item(name),
            price_unitary: price,
            price_date: date.parse().unwrap(),
            price_date_timestamp: 1_785_000_000,
        }
    }

    fn price_rows(db: &Db) -> Vec<(String, String, f64)> {
        let mut statement = db
            .conn
            .prepare("SELECT item_id, date, price_usd FROM item_price ORDER BY item_id, date")
            .unwrap();
        statement
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap()
    }

    #[test]
    fn upsert_keeps_the_other_language_name() {
        let db = Db::open_in_memory().unwrap();
        db.upsert_item(&item("knife"), Language::English).unwrap();
        let mut renamed = item("knife");
        renamed.name = "Faca".to_string();
        db.upsert_item(&renamed, Language::Portuguese).unwrap();

        let (name_pt, name_en): (Option<String>, Option<String>) = db
            .conn
            .query_row(
                "SELECT name_pt, name_en FROM item WHERE market_hash_name = 'hash-knife'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(name_pt.as_deref(), Some("Faca"));
        assert_eq!(name_en.as_deref(), Some("knife"));
    }

    #[test]
    fn same_day_price_is_overwritten_not_duplicated() {
        let db = Db::open_in_memory().unwrap();
        db.upsert_item(&item("knife"), Language::English).unwrap();
        let date = "2026-08-06".parse().unwrap();
        db.record_price("hash-knife", date, 5.0).unwrap();
        db.record_price("hash-knife", date, 7.5).unwrap();

        let rows = price_rows(&db);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].2, 7.5);
    }

    #[test]
    fn sync_skips_errored_items_but_keeps_their_identity() {
        let db = Db::open_in_memory().unwrap();
        let items = vec![
            priced("ak-47", Some(5.0), "2026-08-06"),
            priced("knife", None, "2026-08-06"),
        ];
        let recorded = db.sync_priced_items(&items, Language::English).unwrap();
        assert_eq!(recorded, 1);

        let item_count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM item", [], |row| row.get(0))
            .unwrap();
        assert_eq!(item_count, 2);
        assert_eq!(price_rows(&db).len(), 1);
    }

    #[test]
    fn list_membership_updates_quantity_in_place() {
        let db = Db::open_in_memory().unwrap();
        db.upsert_item(&item("knife"), Language::English).unwrap();
        let list_id = db.create_list(76_561_198_066_658_320, "trade-ups").unwrap();
        db.add_list_item(list_id, "hash-knife", 2).unwrap();
        db.add_list_item(list_id, "hash-knife", 6).unwrap();

        let (rows, quantity): (i64, i64) = db
            .conn
            .query_row(
                "SELECT COUNT(*), MAX(quantity) FROM item_list WHERE list_id = ?1",
                [list_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(quantity, 6);
    }
}
