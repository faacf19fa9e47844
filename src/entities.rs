/// Typed search request produced by the NLU collaborator.
///
/// The intent and entity categories are closed sets: every dispatch site matches
/// exhaustively, so a new intent or category forces all of them to be revisited.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Classified purpose of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// General recommendation ("parking-friendly sushi near Gangnam station")
    Search,
    /// Several named places side by side
    Compare,
    /// Facts about one named place
    Information,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Search => write!(f, "search"),
            Intent::Compare => write!(f, "compare"),
            Intent::Information => write!(f, "information"),
        }
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "search" => Ok(Intent::Search),
            "compare" => Ok(Intent::Compare),
            "information" => Ok(Intent::Information),
            other => Err(format!("Unknown intent: {}", other)),
        }
    }
}

/// Entity categories the NLU step extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityCategory {
    Location,
    Title,
    Category,
    Convenience,
    Menu,
    Atmosphere,
    Occasion,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 7] = [
        EntityCategory::Location,
        EntityCategory::Title,
        EntityCategory::Category,
        EntityCategory::Convenience,
        EntityCategory::Menu,
        EntityCategory::Atmosphere,
        EntityCategory::Occasion,
    ];

    /// Document field the category is matched against.
    pub fn field(&self) -> &'static str {
        match self {
            EntityCategory::Location => "address",
            EntityCategory::Title => "title",
            EntityCategory::Category => "category",
            EntityCategory::Convenience => "convenience",
            EntityCategory::Menu => "review_food",
            EntityCategory::Atmosphere => "atmosphere",
            EntityCategory::Occasion => "occasion",
        }
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityCategory::Location => "location",
            EntityCategory::Title => "title",
            EntityCategory::Category => "category",
            EntityCategory::Convenience => "convenience",
            EntityCategory::Menu => "menu",
            EntityCategory::Atmosphere => "atmosphere",
            EntityCategory::Occasion => "occasion",
        };
        f.write_str(name)
    }
}

/// Extracted entities, one ordered value list per category. Any list may be empty.
///
/// Unknown categories in the NLU payload are ignored on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EntitySet {
    /// Station, district or neighborhood names
    pub location: Vec<String>,
    /// Restaurant names
    pub title: Vec<String>,
    /// Cuisine or venue type (e.g. 일식, 술집)
    pub category: Vec<String>,
    /// Facilities such as parking, delivery, private rooms
    pub convenience: Vec<String>,
    /// Dish names
    pub menu: Vec<String>,
    pub atmosphere: Vec<String>,
    pub occasion: Vec<String>,
}

impl EntitySet {
    pub fn get(&self, category: EntityCategory) -> &[String] {
        match category {
            EntityCategory::Location => &self.location,
            EntityCategory::Title => &self.title,
            EntityCategory::Category => &self.category,
            EntityCategory::Convenience => &self.convenience,
            EntityCategory::Menu => &self.menu,
            EntityCategory::Atmosphere => &self.atmosphere,
            EntityCategory::Occasion => &self.occasion,
        }
    }

    fn get_mut(&mut self, category: EntityCategory) -> &mut Vec<String> {
        match category {
            EntityCategory::Location => &mut self.location,
            EntityCategory::Title => &mut self.title,
            EntityCategory::Category => &mut self.category,
            EntityCategory::Convenience => &mut self.convenience,
            EntityCategory::Menu => &mut self.menu,
            EntityCategory::Atmosphere => &mut self.atmosphere,
            EntityCategory::Occasion => &mut self.occasion,
        }
    }

    pub fn is_empty(&self) -> bool {
        EntityCategory::ALL.iter().all(|c| self.get(*c).is_empty())
    }

    /// Values of a category joined the way the store's match query expects them.
    pub fn joined(&self, category: EntityCategory) -> Option<String> {
        let values = self.get(category);
        if values.is_empty() {
            None
        } else {
            Some(values.join(","))
        }
    }

    /// Trim values, drop empty ones and remove duplicates keeping the first occurrence.
    pub fn normalized(mut self) -> Self {
        for category in EntityCategory::ALL {
            let values = self.get_mut(category);
            let mut seen: Vec<String> = Vec::with_capacity(values.len());
            for value in values.drain(..) {
                let trimmed = value.trim();
                if !trimmed.is_empty() && !seen.iter().any(|s| s == trimmed) {
                    seen.push(trimmed.to_string());
                }
            }
            *values = seen;
        }
        self
    }
}

/// One search request: the NLU collaborator's output contract.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchRequest {
    pub intent: Intent,
    #[serde(default)]
    pub entities: EntitySet,
    #[serde(default)]
    pub negation_entities: EntitySet,
    /// Reformulated sub-queries; compare intents usually carry one per target
    #[serde(default)]
    pub suggested_queries: Vec<String>,
}

impl SearchRequest {
    /// Normalize entities and drop blank sub-queries.
    pub fn normalized(self) -> Self {
        SearchRequest {
            intent: self.intent,
            entities: self.entities.normalized(),
            negation_entities: self.negation_entities.normalized(),
            suggested_queries: self
                .suggested_queries
                .into_iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .collect(),
        }
    }
}
