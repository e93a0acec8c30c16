//! Command-line interface parsing for menucache
//!
//! Each subcommand maps onto one cache or service operation. Arguments are
//! validated here, before anything touches the network.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::ranking::{Metric, SortOrder, DEFAULT_TOP_N};
use crate::service::{BatchRequest, RequestError};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// Dates must be given as YYYY-MM-DD
    #[error("Invalid date: '{0}'. Expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Invalid batch request: {0}")]
    InvalidBatch(#[from] RequestError),
    #[error("Give item ids or --body, not both")]
    AmbiguousBatch,
}

impl CliError {
    /// Every CLI error is a caller mistake
    pub fn status_code(&self) -> u16 {
        match self {
            CliError::InvalidBatch(e) => e.status_code(),
            CliError::InvalidDate(_) | CliError::AmbiguousBatch => 400,
        }
    }
}

/// Dining menus and nutrition facts, cached
#[derive(Parser, Debug)]
#[command(name = "menucache")]
#[command(about = "Dining court menus and nutrition with a local cache")]
#[command(version)]
pub struct Cli {
    /// Cache root directory (overrides MENUCACHE_CACHE_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// GraphQL endpoint (overrides MENUCACHE_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Menu for one dining court
    Menu {
        court: String,
        /// Menu date (YYYY-MM-DD), defaults to today
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },
    /// Menus for every dining court
    All {
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },
    /// Nutrition facts for one item
    Nutrition { item_id: String },
    /// Nutrition facts for many items
    ///
    /// Examples:
    ///   menucache batch id-1 id-2
    ///   menucache batch --body '{"itemIds": ["id-1", "id-2"]}'
    Batch {
        item_ids: Vec<String>,
        /// JSON request body with an itemIds array
        #[arg(long, value_name = "JSON")]
        body: Option<String>,
    },
    /// Today's menus, reusing anything already fetched today
    Today,
    /// Rank today's foods by a nutrient
    Rank {
        /// Only foods served at this meal (e.g. Lunch)
        #[arg(long)]
        meal: Option<String>,
        #[arg(long, value_enum, default_value = "cal-per-protein")]
        metric: Metric,
        /// Defaults to the metric's best-first order
        #[arg(long, value_enum)]
        order: Option<SortOrder>,
        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        limit: usize,
        /// Case-insensitive name filter
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },
    /// Remove expired and corrupt cache records
    Clean {
        /// Keep sweeping on the configured interval until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Remove every cached record
    Clear,
    /// Forget today's cached menus so the next run refetches them
    ForgetToday,
}

/// Parses a YYYY-MM-DD date argument
pub fn parse_date_arg(s: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| CliError::InvalidDate(s.to_string()))
}

/// Item ids for a batch command, from positional ids or a JSON body
pub fn batch_item_ids(item_ids: &[String], body: Option<&str>) -> Result<Vec<String>, CliError> {
    match body {
        Some(_) if !item_ids.is_empty() => Err(CliError::AmbiguousBatch),
        Some(body) => Ok(BatchRequest::parse(body)?.item_ids),
        None => Ok(item_ids.to_vec()),
    }
}
