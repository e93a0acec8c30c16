//! Typed cache keys
//!
//! Every cached artifact is addressed by a `CacheKey`. The string form is the
//! on-disk record name, so `Display` and `CacheKey::parse` must stay inverses.

use std::fmt;

use chrono::NaiveDate;

/// Date format used in every date-bearing key
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Identifies one cached artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Menu for one dining court on one date (`menu_<court>_<date>`)
    Menu { court: String, date: NaiveDate },
    /// Nutrition document for one food item (`nutrition_<itemId>`)
    Nutrition { item_id: String },
    /// Map of every court to its menu for a date (`menus_<date>`)
    AllMenus { date: NaiveDate },
}

impl CacheKey {
    pub fn menu(court: impl Into<String>, date: NaiveDate) -> Self {
        Self::Menu {
            court: court.into(),
            date,
        }
    }

    pub fn nutrition(item_id: impl Into<String>) -> Self {
        Self::Nutrition {
            item_id: item_id.into(),
        }
    }

    pub fn all_menus(date: NaiveDate) -> Self {
        Self::AllMenus { date }
    }

    /// Parses the string form produced by `Display`.
    ///
    /// Court names may contain underscores; the date is always the last segment.
    pub fn parse(s: &str) -> Option<Self> {
        if let Some(rest) = s.strip_prefix("menus_") {
            let date = NaiveDate::parse_from_str(rest, DATE_FORMAT).ok()?;
            return Some(Self::AllMenus { date });
        }
        if let Some(rest) = s.strip_prefix("menu_") {
            let (court, date) = rest.rsplit_once('_')?;
            if court.is_empty() {
                return None;
            }
            let date = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
            return Some(Self::menu(court, date));
        }
        if let Some(item_id) = s.strip_prefix("nutrition_") {
            if item_id.is_empty() {
                return None;
            }
            return Some(Self::nutrition(item_id));
        }
        None
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Menu { court, date } => {
                write!(f, "menu_{}_{}", court, date.format(DATE_FORMAT))
            }
            Self::Nutrition { item_id } => write!(f, "nutrition_{}", item_id),
            Self::AllMenus { date } => write!(f, "menus_{}", date.format(DATE_FORMAT)),
        }
    }
}
