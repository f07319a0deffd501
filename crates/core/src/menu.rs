//! Restaurant and menu catalog types.
//!
//! A call resolves exactly one `Restaurant` at start; every catalog query made
//! during the call is scoped to that restaurant's available `MenuItem`s.

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_VOICE: &str = "alloy";

/// The restaurant a call is answered on behalf of.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Restaurant {
    pub id: Uuid,
    pub name: String,
    /// The inbound number callers dial to reach this restaurant.
    pub phone: Option<String>,
    pub cuisine: Option<String>,
    /// Realtime voice name, e.g. "alloy" or "shimmer".
    pub voice: Option<String>,
    pub greeting_message: Option<String>,
    /// A complete replacement for the rendered system prompt.
    pub system_prompt: Option<String>,
}

impl Restaurant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            phone: None,
            cuisine: None,
            voice: None,
            greeting_message: None,
            system_prompt: None,
        }
    }

    pub fn voice(&self) -> &str {
        non_empty(self.voice.as_deref()).unwrap_or(DEFAULT_VOICE)
    }

    /// The text the assistant says verbatim when the call connects.
    pub fn greeting(&self) -> String {
        match non_empty(self.greeting_message.as_deref()) {
            Some(greeting) => greeting.to_string(),
            None => format!("Welcome to {}! How can I help you today?", self.name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuItem {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: f64,
    pub available: bool,
    #[serde(default)]
    pub modifications: Vec<String>,
}

impl MenuItem {
    pub fn new(restaurant_id: Uuid, name: impl Into<String>, price: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            restaurant_id,
            name: name.into(),
            description: None,
            category: None,
            price,
            available: true,
            modifications: Vec::new(),
        }
    }

    /// Line used in the system prompt's menu section.
    pub fn prompt_line(&self) -> String {
        let mut line = format!(
            "- {} (${}): {}",
            self.name,
            self.price,
            non_empty(self.description.as_deref()).unwrap_or("No description")
        );
        if !self.modifications.is_empty() {
            line.push_str(" | Modifications: ");
            line.push_str(&self.modifications.join(", "));
        }
        line
    }

    /// Line used in `lookup_menu` results.
    pub fn lookup_line(&self) -> String {
        match non_empty(self.description.as_deref()) {
            Some(description) => format!("{} - ${}: {}", self.name, self.price, description),
            None => format!("{} - ${}", self.name, self.price),
        }
    }
}

/// Filter for catalog listings. All present filters must match, each as a
/// case-insensitive substring. Only available items are ever listed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenuQuery {
    /// Matches against the item's category.
    pub category: Option<String>,
    /// Matches against the item's name or description.
    pub search: Option<String>,
    /// Matches against the item's name only.
    pub name: Option<String>,
}

impl MenuQuery {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, item: &MenuItem) -> bool {
        if !item.available {
            return false;
        }
        if let Some(category) = non_empty(self.category.as_deref()) {
            if !contains_ignore_case(item.category.as_deref().unwrap_or_default(), category) {
                return false;
            }
        }
        if let Some(search) = non_empty(self.search.as_deref()) {
            let in_name = contains_ignore_case(&item.name, search);
            let in_description =
                contains_ignore_case(item.description.as_deref().unwrap_or_default(), search);
            if !in_name && !in_description {
                return false;
            }
        }
        if let Some(name) = non_empty(self.name.as_deref()) {
            if !contains_ignore_case(&item.name, name) {
                return false;
            }
        }
        true
    }
}

/// Picks the catalog item a spoken item name refers to.
///
/// Only items whose name contains `query` (case-insensitively) are
/// candidates; among those the highest fuzzy score wins and ties keep
/// catalog order.
pub fn best_name_match<'a>(items: &'a [MenuItem], query: &str) -> Option<&'a MenuItem> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    let matcher = SkimMatcherV2::default().ignore_case();
    let mut best: Option<(&MenuItem, i64)> = None;
    for item in items
        .iter()
        .filter(|item| item.available && contains_ignore_case(&item.name, query))
    {
        let score = matcher.fuzzy_match(&item.name, query).unwrap_or(0);
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((item, score));
        }
    }
    best.map(|(item, _)| item)
}

pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
