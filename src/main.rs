//! Menucache - dining court menus and nutrition from the command line
//!
//! Fetches menus and nutrition facts from the dining GraphQL API through a
//! local cache, and ranks foods by nutrient.

use std::error::Error;
use std::io;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use menucache::cache::{CacheKey, CacheManager, DayCache, DurableStore, FileStore};
use menucache::cli::{batch_item_ids, Cli, CliError, Command};
use menucache::config::Config;
use menucache::daily::DailyMenus;
use menucache::data::MenuClient;
use menucache::ranking::{self, FoodEntry, Metric, SortOrder};
use menucache::report;
use menucache::service::{ErrorBody, MenuService, INTERNAL_ERROR_STATUS};
use menucache::sweep::{SweepConfig, SweepHandle};

/// Initialize the tracing subscriber; logs go to stderr so stdout stays parseable
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// HTTP-style status for a failed run: 400 for bad input, 500 for everything else
fn status_of(e: &(dyn Error + 'static)) -> u16 {
    e.downcast_ref::<CliError>()
        .map(CliError::status_code)
        .unwrap_or(INTERNAL_ERROR_STATUS)
}

/// Bad input exits with 2, any other failure with 1
fn exit_code(status: u16) -> i32 {
    if status < INTERNAL_ERROR_STATUS {
        2
    } else {
        1
    }
}

/// Prints either the JSON form of `value` or the text produced by `text`
fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", text());
    }
    Ok(())
}

struct Ranking {
    meal: Option<String>,
    metric: Metric,
    order: Option<SortOrder>,
    limit: usize,
    search: Option<String>,
    date: Option<NaiveDate>,
}

async fn rank(daily: &DailyMenus, courts: &[String], args: Ranking, json: bool) -> Result<(), Box<dyn Error>> {
    let menus = match args.date {
        Some(date) => daily.menus_for(date).await,
        None => daily.load().await,
    };

    let all_foods = ranking::collect_foods(&menus);
    let mut foods: Vec<FoodEntry> = ranking::filter_meal(&all_foods, args.meal.as_deref())
        .into_iter()
        .cloned()
        .collect();
    if let Some(term) = &args.search {
        foods = ranking::search(&foods, term).into_iter().cloned().collect();
    }

    let nutrition = daily.nutrition_for(&foods).await;
    let order = args.order.unwrap_or_else(|| args.metric.default_order());

    let (ranked, distribution) = match &args.meal {
        Some(meal) => {
            let top = ranking::top_foods(&foods, &nutrition, meal, args.metric, order, args.limit);
            let distribution = ranking::hall_distribution(&foods, &nutrition, meal, courts);
            (top, Some(distribution))
        }
        None => {
            let mut sorted = ranking::sort_foods(&foods, &nutrition, args.metric, order);
            sorted.truncate(args.limit);
            (sorted, None)
        }
    };

    let body = json!({
        "metric": args.metric.to_string(),
        "foods": ranked,
        "distribution": distribution,
    });
    emit(json, &body, || {
        let mut text = report::ranking_text(args.metric, &ranked);
        if let (Some(meal), Some(distribution)) = (&args.meal, &distribution) {
            text.push('\n');
            text.push_str(&report::distribution_text(meal, distribution));
        }
        text
    })
}

async fn clean(config: &Config, watch: bool, json: bool) -> Result<(), Box<dyn Error>> {
    let cache = Arc::new(CacheManager::open(config.server_cache_dir())?);
    let client_removed = DayCache::new(FileStore::open(config.client_cache_dir())?).sweep();

    let stats = cache.clean_expired();
    let body = json!({ "server": stats, "clientRemoved": client_removed });
    emit(json, &body, || report::sweep_text(&stats, client_removed))?;

    if !watch {
        return Ok(());
    }

    info!(interval = ?config.sweep_interval, "Sweeping until interrupted");
    let mut handle = SweepHandle::spawn(
        cache,
        SweepConfig {
            interval: config.sweep_interval,
            enabled: true,
        },
    );
    loop {
        tokio::select! {
            Some(stats) = handle.receiver.recv() => {
                emit(json, &json!({ "server": stats }), || report::sweep_text(&stats, 0))?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    handle.shutdown().await;
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = Config::from_env()?.with_overrides(cli.cache_dir.as_deref(), cli.api_url.as_deref());
    let json = cli.json;

    // Commands that never touch the network
    match &cli.command {
        Command::Clean { watch } => return clean(&config, *watch, json).await,
        Command::Clear => {
            CacheManager::open(config.server_cache_dir())?.clear();
            if let Err(e) = FileStore::open(config.client_cache_dir()).and_then(|store| store.clear()) {
                warn!(error = %e, "Failed to clear client cache");
            }
            return emit(json, &json!({ "cleared": true }), || "Cache cleared\n".to_string());
        }
        Command::ForgetToday => {
            let cache = DayCache::new(FileStore::open(config.client_cache_dir())?);
            let date = cache.today();
            cache.remove(&CacheKey::all_menus(date));
            return emit(json, &json!({ "forgotten": date }), || {
                format!("Forgot cached menus for {}\n", date)
            });
        }
        _ => {}
    }

    // Validate batch input before building anything
    let batch_ids = match &cli.command {
        Command::Batch { item_ids, body } => Some(batch_item_ids(item_ids, body.as_deref())?),
        _ => None,
    };

    let cache = Arc::new(CacheManager::open(config.server_cache_dir())?);
    let client = MenuClient::new()?.with_api_url(config.api_url.as_str());
    let service = Arc::new(
        MenuService::new(Arc::new(client), cache)
            .with_ttl(config.ttl)
            .with_fetch_timeout(config.fetch_timeout)
            .with_courts(config.courts.clone()),
    );
    let daily = DailyMenus::new(
        DayCache::new(FileStore::open(config.client_cache_dir())?),
        Arc::clone(&service),
    );

    match cli.command {
        Command::Menu { court, date } => {
            let date = date.unwrap_or_else(|| daily.today());
            let menu = service.menu(&court, date).await?;
            emit(json, &menu, || report::menu_text(&court, date, menu.as_ref()))
        }
        Command::All { date } => {
            let date = date.unwrap_or_else(|| daily.today());
            let menus = service.all_menus(date).await;
            emit(json, &menus, || report::all_menus_text(date, &menus, None))
        }
        Command::Nutrition { item_id } => {
            let doc = service.nutrition(&item_id).await?;
            emit(json, &doc, || report::nutrition_text(&item_id, doc.as_ref()))
        }
        Command::Batch { .. } => {
            let ids = batch_ids.unwrap_or_default();
            let results = service.nutrition_batch(&ids).await;
            emit(json, &results, || report::batch_text(&results))
        }
        Command::Today => {
            let menus = daily.load().await;
            let date = daily.today();
            emit(json, &menus, || report::all_menus_text(date, &menus, daily.cached_at()))
        }
        Command::Rank {
            meal,
            metric,
            order,
            limit,
            search,
            date,
        } => {
            let args = Ranking {
                meal,
                metric,
                order,
                limit,
                search,
                date,
            };
            rank(&daily, service.courts(), args, json).await
        }
        Command::Clean { .. } | Command::Clear | Command::ForgetToday => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli).await {
        let status = status_of(&*e);
        if json {
            println!("{}", serde_json::to_string(&ErrorBody::new(e.to_string(), status))?);
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(exit_code(status));
    }
    Ok(())
}
