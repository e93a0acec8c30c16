//! Core data models for dining menus and nutrition
//!
//! These types mirror the upstream GraphQL payloads (camelCase on the wire) and
//! are stored in the cache as-is.

pub mod client;

pub use client::{Fetcher, FetchError, MenuClient, MENU_API_URL};

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Dining courts queried when fetching every menu for a date
pub const DINING_COURTS: [&str; 5] = ["Earhart", "Ford", "Hillenbrand", "Wiley", "Windsor"];

/// Every court's menu for one date; `None` where the court had no menu or its fetch failed
pub type AllMenus = BTreeMap<String, Option<DailyMenu>>;

/// One dining court's menu for one date
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyMenu {
    #[serde(default, deserialize_with = "null_as_default")]
    pub meals: Vec<Meal>,
}

/// A meal period such as Breakfast or Lunch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stations: Vec<Station>,
}

/// A serving station within a meal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<StationItem>,
}

/// Wrapper the upstream puts around each item on a station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationItem {
    pub item: ItemSummary,
}

/// Identity of a food item as listed on a menu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub item_id: String,
    pub name: String,
}

/// Nutrition document for one food item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nutrition {
    pub item_id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_nutrition_ready: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nutrition_facts: Vec<NutritionFact>,
    /// Label of the first nutrition fact, filled in by the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_size: Option<String>,
}

impl Nutrition {
    /// Value of the first fact whose name matches one of `names`, in order
    pub fn fact_value(&self, names: &[&str]) -> Option<f64> {
        names.iter().find_map(|name| {
            self.nutrition_facts
                .iter()
                .find(|fact| fact.name == *name)
                .and_then(|fact| fact.value)
        })
    }
}

/// A single nutrition fact such as Calories or Protein
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionFact {
    pub name: String,
    /// Numeric value; the upstream sends numbers or numeric strings
    #[serde(default, deserialize_with = "number_or_string")]
    pub value: Option<f64>,
    #[serde(default)]
    pub label: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_menu_tolerates_null_collections() {
        let menu: DailyMenu = serde_json::from_value(json!({
            "meals": [
                { "name": "Lunch", "stations": null },
                { "name": "Dinner", "stations": [ { "name": "Grill", "items": null } ] }
            ]
        }))
        .unwrap();

        assert_eq!(menu.meals.len(), 2);
        assert!(menu.meals[0].stations.is_empty());
        assert!(menu.meals[1].stations[0].items.is_empty());
    }

    #[test]
    fn test_menu_reads_camel_case_items() {
        let menu: DailyMenu = serde_json::from_value(json!({
            "meals": [{
                "name": "Breakfast",
                "stations": [{
                    "name": "Eggs",
                    "items": [{ "item": { "itemId": "id-1", "name": "Scrambled Eggs" } }]
                }]
            }]
        }))
        .unwrap();

        let item = &menu.meals[0].stations[0].items[0].item;
        assert_eq!(item.item_id, "id-1");
        assert_eq!(item.name, "Scrambled Eggs");
    }

    #[test]
    fn test_fact_values_accept_numbers_and_strings() {
        let nutrition: Nutrition = serde_json::from_value(json!({
            "itemId": "id-1",
            "name": "Chicken",
            "isNutritionReady": true,
            "nutritionFacts": [
                { "name": "Serving Size", "value": null, "label": "4 oz" },
                { "name": "Calories", "value": 220 },
                { "name": "protein", "value": "31.5" },
                { "name": "Sodium", "value": "n/a" }
            ]
        }))
        .unwrap();

        assert_eq!(nutrition.fact_value(&["Calories"]), Some(220.0));
        assert_eq!(nutrition.fact_value(&["Protein", "protein"]), Some(31.5));
        assert_eq!(nutrition.fact_value(&["Sodium"]), None);
        assert_eq!(nutrition.fact_value(&["Fiber"]), None);
    }

    #[test]
    fn test_nutrition_missing_optional_fields() {
        let nutrition: Nutrition = serde_json::from_value(json!({
            "itemId": "id-2",
            "name": "Water",
            "isNutritionReady": null,
            "nutritionFacts": null
        }))
        .unwrap();

        assert!(!nutrition.is_nutrition_ready);
        assert!(nutrition.nutrition_facts.is_empty());
        assert!(nutrition.serving_size.is_none());
    }
}
