//! Plain-text rendering of menus, nutrition, and rankings
//!
//! Every function returns the text rather than printing it so output can be
//! checked in tests.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Local, NaiveDate};

use crate::cache::SweepStats;
use crate::data::{AllMenus, DailyMenu, Nutrition};
use crate::ranking::{HallDistribution, Metric, RankedFood};

/// Whole numbers print without decimals, everything else with one
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

pub fn menu_text(court: &str, date: NaiveDate, menu: Option<&DailyMenu>) -> String {
    let mut out = format!("{} ({})\n", court, date);
    let Some(menu) = menu else {
        out.push_str("  No menu\n");
        return out;
    };
    if menu.meals.is_empty() {
        out.push_str("  No meals listed\n");
    }

    for meal in &menu.meals {
        let _ = writeln!(out, "  {}", meal.name);
        for station in &meal.stations {
            let _ = writeln!(out, "    {}", station.name);
            for entry in &station.items {
                let _ = writeln!(out, "      - {} [{}]", entry.item.name, entry.item.item_id);
            }
        }
    }
    out
}

pub fn all_menus_text(date: NaiveDate, menus: &AllMenus, cached_at: Option<DateTime<Local>>) -> String {
    let mut out = String::new();
    if let Some(at) = cached_at {
        let _ = writeln!(out, "Cached at {}\n", at.format("%H:%M"));
    }
    for (court, menu) in menus {
        out.push_str(&menu_text(court, date, menu.as_ref()));
    }
    out
}

pub fn nutrition_text(item_id: &str, nutrition: Option<&Nutrition>) -> String {
    let Some(doc) = nutrition else {
        return format!("{}: not found\n", item_id);
    };

    let mut out = format!("{} [{}]\n", doc.name, doc.item_id);
    if let Some(serving) = &doc.serving_size {
        let _ = writeln!(out, "  Serving size: {}", serving);
    }
    if !doc.is_nutrition_ready {
        out.push_str("  Nutrition not available\n");
        return out;
    }
    for fact in &doc.nutrition_facts {
        if let Some(value) = fact.value {
            let _ = writeln!(out, "  {}: {}", fact.name, format_value(value));
        }
    }
    out
}

pub fn batch_text(results: &BTreeMap<String, Option<Nutrition>>) -> String {
    let mut out = String::new();
    for (id, doc) in results {
        let line = match doc {
            Some(doc) => {
                let calories = doc
                    .fact_value(Metric::Calories.aliases())
                    .map(format_value)
                    .unwrap_or_else(|| "?".to_string());
                let protein = doc
                    .fact_value(Metric::Protein.aliases())
                    .map(format_value)
                    .unwrap_or_else(|| "?".to_string());
                format!("{} [{}]: {} cal, {}g protein", doc.name, id, calories, protein)
            }
            None => format!("{}: unavailable", id),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

pub fn ranking_text(metric: Metric, ranked: &[RankedFood]) -> String {
    if ranked.is_empty() {
        return "No foods to rank\n".to_string();
    }

    let mut out = format!("Ranked by {}\n", metric);
    for (i, entry) in ranked.iter().enumerate() {
        let value = entry
            .value
            .map(|v| format!("{}{}", format_value(v), metric.unit()))
            .unwrap_or_else(|| "n/a".to_string());
        let _ = writeln!(
            out,
            "{:>3}. {} ({}, {}): {}",
            i + 1,
            entry.food.name,
            entry.food.hall,
            entry.food.meal,
            value
        );
    }
    out
}

pub fn distribution_text(meal: &str, distribution: &HallDistribution) -> String {
    let mut out = format!(
        "Top {} foods for {} by hall\n",
        distribution.total_top_foods, meal
    );
    for (hall, count) in &distribution.counts {
        let _ = writeln!(out, "  {:<12} {}", hall, count);
    }
    out
}

pub fn sweep_text(stats: &SweepStats, client_removed: usize) -> String {
    let mut out = format!(
        "Scanned {} records: removed {} expired, {} corrupt, {} old client records ({} failed)\n",
        stats.scanned, stats.expired, stats.corrupt, client_removed, stats.failed
    );
    if stats.incomplete > 0 {
        let _ = writeln!(out, "Removed {} unfinished writes", stats.incomplete);
    }
    out
}
