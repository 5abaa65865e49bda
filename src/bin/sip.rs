use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use steam_inventory_prices::db::Db;
use steam_inventory_prices::export::workbook::Workbook;
use steam_inventory_prices::models::{InventoryItem, PricedItem};
use steam_inventory_prices::steam::prices::{PriceSource, RetrieveMode};
use steam_inventory_prices::steam::{Currency, Language, SteamApi};
use steam_inventory_prices::util::env as env_util;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sip", version, about = "Steam inventory price tracker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct InventoryArgs {
    /// Steam user id (see 'ID Steam' on store.steampowered.com/account);
    /// falls back to the STEAM_USER_ID env var
    #[arg(long)]
    steam_user_id: Option<u64>,
    /// App ids to pull items from (730 is CS:GO)
    #[arg(long, value_delimiter = ',', default_values_t = [730u32])]
    app_ids: Vec<u32>,
    /// Language to fetch item names in
    #[arg(long, value_enum, default_value_t = Language::Portuguese)]
    language: Language,
}

#[derive(Args, Debug)]
struct PricingArgs {
    /// Currency for the price endpoints (html listings ignore this and
    /// follow Steam session state)
    #[arg(long, value_enum, default_value_t = Currency::Brl)]
    currency: Currency,
    /// Endpoint to scrape unit prices from
    #[arg(long, value_enum, default_value_t = PriceSource::Html)]
    source: PriceSource,
    /// Serial waits 11s between requests; concurrent trips the rate limit
    /// on anything but small batches
    #[arg(long, value_enum, default_value_t = RetrieveMode::Serial)]
    mode: RetrieveMode,
}

#[derive(Args, Debug)]
struct WorkbookArgs {
    /// Workbook directory holding one CSV sheet per day plus the Summary
    #[arg(long, default_value = "prices")]
    workbook: PathBuf,
}

#[derive(Args, Debug)]
struct DbArgs {
    /// SQLite database file
    #[arg(long, default_value = "sip.db")]
    db: PathBuf,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Fetch the user's marketable inventory, price it and write today's sheet
    Generate {
        #[command(flatten)]
        inventory: InventoryArgs,
        #[command(flatten)]
        pricing: PricingArgs,
        #[command(flatten)]
        book: WorkbookArgs,
    },
    /// Re-price the most recent sheet's items under today's date
    UpdatePrices {
        #[command(flatten)]
        pricing: PricingArgs,
        #[command(flatten)]
        book: WorkbookArgs,
    },
    /// Retry price lookups for today's errored items only
    RetryErrors {
        #[command(flatten)]
        pricing: PricingArgs,
        #[command(flatten)]
        book: WorkbookArgs,
    },
    /// Refresh item quantities on every sheet from the live inventory
    UpdateAmounts {
        #[command(flatten)]
        inventory: InventoryArgs,
        #[command(flatten)]
        book: WorkbookArgs,
    },
    /// Load the most recent sheet into the SQLite history
    SyncDb {
        #[command(flatten)]
        book: WorkbookArgs,
        #[command(flatten)]
        db: DbArgs,
        /// Which name column the sheet's names fill
        #[arg(long, value_enum, default_value_t = Language::Portuguese)]
        language: Language,
    },
    /// Create a named item list
    ListCreate {
        #[command(flatten)]
        db: DbArgs,
        #[arg(long)]
        steam_user_id: Option<u64>,
        name: String,
    },
    /// Add an item to a list, or update its quantity
    ListAdd {
        #[command(flatten)]
        db: DbArgs,
        #[arg(long)]
        list_id: i64,
        market_hash_name: String,
        #[arg(long, default_value_t = 1)]
        quantity: u32,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn resolve_steam_user_id(flag: Option<u64>) -> Result<u64> {
    if let Some(id) = flag {
        return Ok(id);
    }
    env_util::env_req("STEAM_USER_ID")?
        .parse()
        .context("STEAM_USER_ID is not a number")
}

/// One inventory fetch per app id, merged and sorted by the composite key.
async fn fetch_inventory(
    api: &SteamApi,
    steam_user_id: u64,
    app_ids: &[u32],
    language: Language,
) -> Result<Vec<InventoryItem>> {
    let mut items = Vec::new();
    for &app_id in app_ids {
        items.extend(api.user_app_items(steam_user_id, app_id, language).await?);
    }
    items.sort_by_key(InventoryItem::sort_key);
    Ok(items)
}

async fn generate(
    inventory: InventoryArgs,
    pricing: PricingArgs,
    book: WorkbookArgs,
) -> Result<()> {
    let steam_user_id = resolve_steam_user_id(inventory.steam_user_id)?;
    let api = SteamApi::new();
    let items = fetch_inventory(&api, steam_user_id, &inventory.app_ids, inventory.language).await?;
    let priced = api
        .price_items(&items, pricing.currency, pricing.source, pricing.mode)
        .await;
    let workbook = Workbook::open(book.workbook)?;
    let summary = workbook.export_day(Utc::now().date_naive(), &priced)?;
    info!(price_total = summary.price_total, "generate finished");
    Ok(())
}

async fn update_prices(pricing: PricingArgs, book: WorkbookArgs) -> Result<()> {
    let workbook = Workbook::open(book.workbook)?;
    let most_recent = workbook.most_recent_day()?;
    let items: Vec<InventoryItem> = workbook
        .read_day_items(most_recent)?
        .into_iter()
        .map(|priced| priced.item)
        .collect();
    let api = SteamApi::new();
    let priced = api
        .price_items(&items, pricing.currency, pricing.source, pricing.mode)
        .await;
    let summary = workbook.export_day(Utc::now().date_naive(), &priced)?;
    info!(price_total = summary.price_total, "update-prices finished");
    Ok(())
}

async fn retry_errors(pricing: PricingArgs, book: WorkbookArgs) -> Result<()> {
    let workbook = Workbook::open(book.workbook)?;
    let today = Utc::now().date_naive();
    let (ok, errored) = workbook.retryable_items(today)?;
    if errored.is_empty() {
        info!(date = %today, "no items with api errors on the current sheet");
        return Ok(());
    }

    let api = SteamApi::new();
    let to_retry: Vec<InventoryItem> = errored.into_iter().map(|priced| priced.item).collect();
    let retried = api
        .price_items(&to_retry, pricing.currency, pricing.source, pricing.mode)
        .await;

    let mut merged = ok;
    merged.extend(retried);
    merged.sort_by_key(PricedItem::sort_key);
    let summary = workbook.export_day(today, &merged)?;
    info!(
        price_total = summary.price_total,
        api_error = summary.api_error,
        "retry-errors finished"
    );
    Ok(())
}

async fn update_amounts(inventory: InventoryArgs, book: WorkbookArgs) -> Result<()> {
    let workbook = Workbook::open(book.workbook)?;
    let most_recent = workbook.most_recent_day()?;
    let mut app_ids: Vec<u32> = workbook
        .read_day_items(most_recent)?
        .iter()
        .map(|priced| priced.item.app_id)
        .collect();
    app_ids.sort_unstable();
    app_ids.dedup();

    let steam_user_id = resolve_steam_user_id(inventory.steam_user_id)?;
    let api = SteamApi::new();
    let mut current: HashMap<String, u32> = HashMap::new();
    for app_id in app_ids {
        for item in api
            .user_app_items(steam_user_id, app_id, inventory.language)
            .await?
        {
            current.insert(item.market_hash_name, item.amount);
        }
    }
    workbook.update_amounts(&current)?;
    info!("update-amounts finished");
    Ok(())
}

fn sync_db(book: WorkbookArgs, db: DbArgs, language: Language) -> Result<()> {
    let workbook = Workbook::open(book.workbook)?;
    let date = workbook.most_recent_day()?;
    let items = workbook.read_day_items(date)?;
    let database = Db::open(db.db)?;
    let recorded = database.sync_priced_items(&items, language)?;
    info!(date = %date, recorded, "sync-db finished");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Generate {
            inventory,
            pricing,
            book,
        } => generate(inventory, pricing, book).await,
        Commands::UpdatePrices { pricing, book } => update_prices(pricing, book).await,
        Commands::RetryErrors { pricing, book } => retry_errors(pricing, book).await,
        Commands::UpdateAmounts { inventory, book } => update_amounts(inventory, book).await,
        Commands::SyncDb { book, db, language } => sync_db(book, db, language),
        Commands::ListCreate {
            db,
            steam_user_id,
            name,
        } => {
            let steam_user_id = resolve_steam_user_id(steam_user_id)?;
            let database = Db::open(db.db)?;
            let list_id = database.create_list(steam_user_id, &name)?;
            info!(list_id, name = %name, "created list");
            Ok(())
        }
        Commands::ListAdd {
            db,
            list_id,
            market_hash_name,
            quantity,
        } => {
            let database = Db::open(db.db)?;
            database.add_list_item(list_id, &market_hash_name, quantity)?;
            info!(list_id, market_hash_name = %market_hash_name, quantity, "updated list item");
            Ok(())
        }
    }
}
