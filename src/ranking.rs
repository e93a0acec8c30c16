//! Food rankings over menus and nutrition data
//!
//! Flattens every court's menu into food entries, looks up nutrient values, and
//! ranks foods by a metric. The headline metric is calories per gram of protein,
//! where lower is better.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use clap::ValueEnum;
use serde::Serialize;

use crate::data::{AllMenus, Nutrition};

/// Stations that list made-to-order items rather than real dishes
const EXCLUDED_STATION: &str = "By Request";

/// Foods whose names contain any of these (case-insensitive) are never recommended
const EXCLUDED_NAME_FRAGMENTS: [&str; 2] = ["cheese", "garlic herb chicken strip"];

/// Default number of foods in a recommendation list
pub const DEFAULT_TOP_N: usize = 15;

/// Recommendations need at least this much protein (grams)
const MIN_PROTEIN_GRAMS: f64 = 3.0;

/// Recommendations need at least this many calories
const MIN_CALORIES: f64 = 30.0;

/// Calories-per-gram-protein above this is treated as bad data
const MAX_CALORIES_PER_PROTEIN: f64 = 100.0;

/// One food as served at one hall during one meal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodEntry {
    pub item_id: String,
    pub name: String,
    pub meal: String,
    pub hall: String,
}

impl FoodEntry {
    /// Identity used for de-duplication: `<itemId>-<meal>-<hall>`
    pub fn key(&self) -> String {
        format!("{}-{}-{}", self.item_id, self.meal, self.hall)
    }
}

/// Values a food can be ranked by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Metric {
    Calories,
    #[value(name = "fat")]
    TotalFat,
    Protein,
    Sodium,
    #[value(name = "carbs")]
    Carbohydrates,
    #[value(name = "cal-per-protein")]
    CaloriesPerProtein,
}

impl Metric {
    /// Fact names that hold this nutrient, tried in order
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Metric::Calories => &["Calories", "calories"],
            Metric::TotalFat => &["Total Fat", "Total fat", "total fat"],
            Metric::Protein => &["Protein", "protein"],
            Metric::Sodium => &["Sodium", "sodium"],
            Metric::Carbohydrates => &[
                "Carbohydrates",
                "Total Carbohydrate",
                "Carbohydrate",
                "carbohydrates",
            ],
            Metric::CaloriesPerProtein => &[],
        }
    }

    /// The order in which this metric is "best first"
    pub fn default_order(self) -> SortOrder {
        match self {
            Metric::CaloriesPerProtein => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Metric::Calories => "",
            Metric::Sodium => "mg",
            Metric::CaloriesPerProtein => " cal/g protein",
            _ => "g",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Metric::Calories => "Calories",
            Metric::TotalFat => "Total Fat",
            Metric::Protein => "Protein",
            Metric::Sodium => "Sodium",
            Metric::Carbohydrates => "Carbohydrates",
            Metric::CaloriesPerProtein => "Cal/g Protein",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// A food paired with its value for the metric it was ranked by
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedFood {
    #[serde(flatten)]
    pub food: FoodEntry,
    pub value: Option<f64>,
}

/// How many top foods each hall contributed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HallDistribution {
    pub counts: BTreeMap<String, usize>,
    pub total_top_foods: usize,
}

/// Nutrition documents keyed by item id; `None` where the lookup failed
pub type NutritionMap = HashMap<String, Option<Nutrition>>;

/// Flattens menus into one entry per distinct item, meal, and hall
pub fn collect_foods(menus: &AllMenus) -> Vec<FoodEntry> {
    let mut seen = HashSet::new();
    let mut foods = Vec::new();

    for (hall, menu) in menus {
        let Some(menu) = menu else { continue };
        for meal in &menu.meals {
            for station in meal.stations.iter().filter(|s| s.name != EXCLUDED_STATION) {
                for entry in &station.items {
                    let food = FoodEntry {
                        item_id: entry.item.item_id.clone(),
                        name: entry.item.name.clone(),
                        meal: meal.name.clone(),
                        hall: hall.clone(),
                    };
                    if seen.insert(food.key()) {
                        foods.push(food);
                    }
                }
            }
        }
    }
    foods
}

/// Distinct item ids across `foods`, in first-seen order
pub fn item_ids(foods: &[FoodEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    foods
        .iter()
        .filter(|f| seen.insert(f.item_id.as_str()))
        .map(|f| f.item_id.clone())
        .collect()
}

/// Raw nutrient value, or `None` when absent or non-numeric
pub fn nutrient_value(nutrition: &Nutrition, metric: Metric) -> Option<f64> {
    match metric {
        Metric::CaloriesPerProtein => calories_per_protein(nutrition).map(f64::round),
        _ => nutrition.fact_value(metric.aliases()),
    }
}

/// Unrounded calories per gram of protein; `None` if either is missing or zero
pub fn calories_per_protein(nutrition: &Nutrition) -> Option<f64> {
    let calories = nutrition.fact_value(Metric::Calories.aliases())?;
    let protein = nutrition.fact_value(Metric::Protein.aliases())?;
    if calories == 0.0 || protein == 0.0 {
        return None;
    }
    Some(calories / protein)
}

fn lookup<'a>(nutrition: &'a NutritionMap, food: &FoodEntry) -> Option<&'a Nutrition> {
    nutrition.get(&food.item_id).and_then(Option::as_ref)
}

fn value_for(nutrition: &NutritionMap, food: &FoodEntry, metric: Metric) -> Option<f64> {
    lookup(nutrition, food).and_then(|n| nutrient_value(n, metric))
}

/// Sorts by metric; foods without a value go last, in their original order
pub fn sort_foods(
    foods: &[FoodEntry],
    nutrition: &NutritionMap,
    metric: Metric,
    order: SortOrder,
) -> Vec<RankedFood> {
    let mut ranked: Vec<RankedFood> = foods
        .iter()
        .map(|food| RankedFood {
            food: food.clone(),
            value: value_for(nutrition, food, metric),
        })
        .collect();

    ranked.sort_by(|a, b| match (a.value, b.value) {
        (Some(x), Some(y)) => match order {
            SortOrder::Asc => x.total_cmp(&y),
            SortOrder::Desc => y.total_cmp(&x),
        },
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    ranked
}

fn is_excluded_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    EXCLUDED_NAME_FRAGMENTS.iter().any(|fragment| lower.contains(fragment))
}

/// Whether a food qualifies for a recommendation list
fn is_recommendable(nutrition: &NutritionMap, food: &FoodEntry, metric: Metric) -> bool {
    if is_excluded_name(&food.name) {
        return false;
    }
    let Some(doc) = lookup(nutrition, food) else {
        return false;
    };

    if metric != Metric::CaloriesPerProtein {
        return nutrient_value(doc, metric).is_some();
    }

    let calories = doc.fact_value(Metric::Calories.aliases());
    let protein = doc.fact_value(Metric::Protein.aliases());
    match (calories, protein) {
        (Some(cal), Some(pro)) if cal != 0.0 && pro != 0.0 => {
            pro >= MIN_PROTEIN_GRAMS && cal >= MIN_CALORIES && cal / pro <= MAX_CALORIES_PER_PROTEIN
        }
        _ => false,
    }
}

/// Best `limit` foods for one meal by `metric`
pub fn top_foods(
    foods: &[FoodEntry],
    nutrition: &NutritionMap,
    meal: &str,
    metric: Metric,
    order: SortOrder,
    limit: usize,
) -> Vec<RankedFood> {
    let candidates: Vec<FoodEntry> = foods
        .iter()
        .filter(|f| f.meal == meal)
        .filter(|f| is_recommendable(nutrition, f, metric))
        .cloned()
        .collect();

    let mut ranked = sort_foods(&candidates, nutrition, metric, order);
    ranked.truncate(limit);
    ranked
}

/// Counts how many of a meal's top calories-per-protein foods each hall serves
///
/// Every hall in `halls` appears in the result, with zero if it placed nothing.
/// Returns an empty distribution when no nutrition data is available at all.
pub fn hall_distribution(
    foods: &[FoodEntry],
    nutrition: &NutritionMap,
    meal: &str,
    halls: &[String],
) -> HallDistribution {
    let has_data = nutrition.values().any(Option::is_some);
    if foods.is_empty() || !has_data {
        return HallDistribution::default();
    }

    let top = top_foods(
        foods,
        nutrition,
        meal,
        Metric::CaloriesPerProtein,
        Metric::CaloriesPerProtein.default_order(),
        DEFAULT_TOP_N,
    );

    let mut counts: BTreeMap<String, usize> = halls.iter().map(|h| (h.clone(), 0)).collect();
    for ranked in &top {
        if let Some(count) = counts.get_mut(&ranked.food.hall) {
            *count += 1;
        }
    }

    HallDistribution {
        counts,
        total_top_foods: top.len(),
    }
}

/// Foods served at `meal`, or all foods when `meal` is `None`
pub fn filter_meal<'a>(foods: &'a [FoodEntry], meal: Option<&str>) -> Vec<&'a FoodEntry> {
    foods
        .iter()
        .filter(|f| meal.map_or(true, |m| f.meal == m))
        .collect()
}

/// Case-insensitive name search
pub fn search<'a>(foods: &'a [FoodEntry], term: &str) -> Vec<&'a FoodEntry> {
    let needle = term.to_lowercase();
    foods
        .iter()
        .filter(|f| f.name.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DailyMenu, ItemSummary, Meal, NutritionFact, Station, StationItem};

    fn item(id: &str, name: &str) -> StationItem {
        StationItem {
            item: ItemSummary {
                item_id: id.to_string(),
                name: name.to_string(),
            },
        }
    }

    fn station(name: &str, items: Vec<StationItem>) -> Station {
        Station {
            name: name.to_string(),
            items,
        }
    }

    fn meal(name: &str, stations: Vec<Station>) -> Meal {
        Meal {
            name: name.to_string(),
            stations,
        }
    }

    fn food(id: &str, name: &str, meal: &str, hall: &str) -> FoodEntry {
        FoodEntry {
            item_id: id.to_string(),
            name: name.to_string(),
            meal: meal.to_string(),
            hall: hall.to_string(),
        }
    }

    fn facts(id: &str, facts: &[(&str, f64)]) -> Nutrition {
        Nutrition {
            item_id: id.to_string(),
            name: id.to_string(),
            is_nutrition_ready: true,
            nutrition_facts: facts
                .iter()
                .map(|(name, value)| NutritionFact {
                    name: name.to_string(),
                    value: Some(*value),
                    label: None,
                })
                .collect(),
            serving_size: None,
        }
    }

    fn cal_pro(id: &str, calories: f64, protein: f64) -> Option<Nutrition> {
        Some(facts(id, &[("Calories", calories), ("Protein", protein)]))
    }

    fn halls() -> Vec<String> {
        crate::data::DINING_COURTS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_collect_foods_skips_by_request_and_null_menus() {
        let mut menus = AllMenus::new();
        menus.insert(
            "Ford".to_string(),
            Some(DailyMenu {
                meals: vec![meal(
                    "Lunch",
                    vec![
                        station("Grill", vec![item("a", "Burger"), item("a", "Burger")]),
                        station("By Request", vec![item("b", "Custom Omelet")]),
                    ],
                )],
            }),
        );
        menus.insert("Wiley".to_string(), None);

        let foods = collect_foods(&menus);

        assert_eq!(foods, vec![food("a", "Burger", "Lunch", "Ford")]);
    }

    #[test]
    fn test_collect_foods_keeps_same_item_in_different_meals_and_halls() {
        let mut menus = AllMenus::new();
        let menu = DailyMenu {
            meals: vec![
                meal("Lunch", vec![station("Grill", vec![item("a", "Burger")])]),
                meal("Dinner", vec![station("Grill", vec![item("a", "Burger")])]),
            ],
        };
        menus.insert("Ford".to_string(), Some(menu.clone()));
        menus.insert("Windsor".to_string(), Some(menu));

        let foods = collect_foods(&menus);

        assert_eq!(foods.len(), 4);
        assert_eq!(item_ids(&foods), vec!["a".to_string()]);
    }

    #[test]
    fn test_nutrient_aliases() {
        let doc = facts("x", &[("Total Carbohydrate", 40.0), ("total fat", 3.0)]);
        assert_eq!(nutrient_value(&doc, Metric::Carbohydrates), Some(40.0));
        assert_eq!(nutrient_value(&doc, Metric::TotalFat), Some(3.0));
        assert_eq!(nutrient_value(&doc, Metric::Sodium), None);
    }

    #[test]
    fn test_calories_per_protein_rounds_and_rejects_zero() {
        let doc = facts("x", &[("Calories", 250.0), ("Protein", 30.0)]);
        assert_eq!(nutrient_value(&doc, Metric::CaloriesPerProtein), Some(8.0));

        let no_protein = facts("y", &[("Calories", 250.0), ("Protein", 0.0)]);
        assert_eq!(nutrient_value(&no_protein, Metric::CaloriesPerProtein), None);
    }

    #[test]
    fn test_sort_foods_puts_missing_values_last() {
        let foods = vec![
            food("a", "A", "Lunch", "Ford"),
            food("b", "B", "Lunch", "Ford"),
            food("c", "C", "Lunch", "Ford"),
        ];
        let mut nutrition = NutritionMap::new();
        nutrition.insert("a".to_string(), cal_pro("a", 100.0, 10.0));
        nutrition.insert("b".to_string(), None);
        nutrition.insert("c".to_string(), cal_pro("c", 300.0, 10.0));

        let desc = sort_foods(&foods, &nutrition, Metric::Calories, SortOrder::Desc);
        let ids: Vec<&str> = desc.iter().map(|r| r.food.item_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        let asc = sort_foods(&foods, &nutrition, Metric::Calories, SortOrder::Asc);
        let ids: Vec<&str> = asc.iter().map(|r| r.food.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_top_foods_applies_recommendation_filters() {
        let foods = vec![
            food("chicken", "Grilled Chicken", "Lunch", "Ford"),
            food("cheese", "Mac and Cheese", "Lunch", "Ford"),
            food("strip", "Garlic Herb Chicken Strip", "Lunch", "Wiley"),
            food("lettuce", "Lettuce", "Lunch", "Wiley"),
            food("soda", "Soda", "Lunch", "Wiley"),
            food("tofu", "Tofu", "Lunch", "Windsor"),
            food("eggs", "Eggs", "Breakfast", "Ford"),
        ];
        let mut nutrition = NutritionMap::new();
        nutrition.insert("chicken".to_string(), cal_pro("chicken", 200.0, 40.0));
        nutrition.insert("cheese".to_string(), cal_pro("cheese", 300.0, 15.0));
        nutrition.insert("strip".to_string(), cal_pro("strip", 200.0, 20.0));
        nutrition.insert("lettuce".to_string(), cal_pro("lettuce", 10.0, 1.0));
        nutrition.insert("soda".to_string(), cal_pro("soda", 400.0, 3.0));
        nutrition.insert("tofu".to_string(), cal_pro("tofu", 150.0, 12.0));
        nutrition.insert("eggs".to_string(), cal_pro("eggs", 140.0, 12.0));

        let top = top_foods(
            &foods,
            &nutrition,
            "Lunch",
            Metric::CaloriesPerProtein,
            SortOrder::Asc,
            DEFAULT_TOP_N,
        );

        let ids: Vec<&str> = top.iter().map(|r| r.food.item_id.as_str()).collect();
        assert_eq!(ids, vec!["chicken", "tofu"]);
        assert_eq!(top[0].value, Some(5.0));
        assert_eq!(top[1].value, Some(13.0));
    }

    #[test]
    fn test_top_foods_respects_limit() {
        let foods: Vec<FoodEntry> = (0..20)
            .map(|i| food(&format!("f{}", i), "Beans", "Dinner", "Ford"))
            .collect();
        let nutrition: NutritionMap = (0..20)
            .map(|i| {
                let id = format!("f{}", i);
                let doc = cal_pro(&id, 100.0 + i as f64, 10.0);
                (id, doc)
            })
            .collect();

        let top = top_foods(&foods, &nutrition, "Dinner", Metric::Calories, SortOrder::Desc, 15);

        assert_eq!(top.len(), 15);
        assert_eq!(top[0].food.item_id, "f19");
    }

    #[test]
    fn test_hall_distribution_counts_every_hall() {
        let foods = vec![
            food("a", "Chicken", "Lunch", "Ford"),
            food("b", "Turkey", "Lunch", "Ford"),
            food("c", "Fish", "Lunch", "Earhart"),
            food("d", "Pizza", "Dinner", "Wiley"),
        ];
        let mut nutrition = NutritionMap::new();
        nutrition.insert("a".to_string(), cal_pro("a", 200.0, 30.0));
        nutrition.insert("b".to_string(), cal_pro("b", 150.0, 20.0));
        nutrition.insert("c".to_string(), cal_pro("c", 180.0, 25.0));
        nutrition.insert("d".to_string(), cal_pro("d", 300.0, 12.0));

        let dist = hall_distribution(&foods, &nutrition, "Lunch", &halls());

        assert_eq!(dist.total_top_foods, 3);
        assert_eq!(dist.counts["Ford"], 2);
        assert_eq!(dist.counts["Earhart"], 1);
        assert_eq!(dist.counts["Wiley"], 0);
        assert_eq!(dist.counts.len(), 5);
    }

    #[test]
    fn test_hall_distribution_without_data_is_empty() {
        let foods = vec![food("a", "Chicken", "Lunch", "Ford")];
        let mut nutrition = NutritionMap::new();
        nutrition.insert("a".to_string(), None);

        assert_eq!(
            hall_distribution(&foods, &nutrition, "Lunch", &halls()),
            HallDistribution::default()
        );
    }

    #[test]
    fn test_search_and_meal_filter() {
        let foods = vec![
            food("a", "Grilled Chicken", "Lunch", "Ford"),
            food("b", "Chicken Soup", "Dinner", "Ford"),
            food("c", "Salad", "Lunch", "Ford"),
        ];

        assert_eq!(search(&foods, "CHICKEN").len(), 2);
        assert_eq!(filter_meal(&foods, Some("Lunch")).len(), 2);
        assert_eq!(filter_meal(&foods, None).len(), 3);
    }

    #[test]
    fn test_metric_defaults() {
        assert_eq!(Metric::CaloriesPerProtein.default_order(), SortOrder::Asc);
        assert_eq!(Metric::Protein.default_order(), SortOrder::Desc);
        assert_eq!(Metric::Sodium.unit(), "mg");
        assert_eq!(Metric::CaloriesPerProtein.to_string(), "Cal/g Protein");
    }
}
