/// Entity-to-filter translation
///
/// Turns extracted entities into document-store query fragments. Location strings are
/// ambiguous (a neighborhood can share its name with a restaurant), so a location only
/// becomes a geo-radius filter when the coordinate lookup is unambiguous; otherwise it
/// degrades to a soft match on the address field. Which fragments end up as `must`,
/// `should` or `filter` is decided by the query composer, not here.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::entities::{EntityCategory, EntitySet};
use crate::store::{CoordinateLookup, GeoPoint, PlaceCandidate};

/// Indexed geo_point field of restaurant documents.
pub const GEO_FIELD: &str = "pin.coordinate";

/// A match on one text field with the joined entity values.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchFragment {
    pub field: &'static str,
    pub query: String,
}

impl MatchFragment {
    /// Mandatory form: every term must match.
    pub fn required(&self) -> Value {
        json!({
            "match": {
                self.field: {
                    "query": self.query,
                    "operator": "and"
                }
            }
        })
    }

    /// Optional scoring form.
    pub fn boosted(&self, boost: f64) -> Value {
        json!({
            "match": {
                self.field: {
                    "query": self.query,
                    "boost": boost
                }
            }
        })
    }
}

/// Menu entities hit two places: the structured `menus` nested documents and the
/// free-text dish mentions extracted from reviews.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuFragment {
    pub query: String,
}

impl MenuFragment {
    fn nested_menu_name(&self, boost: Option<f64>) -> Value {
        let mut inner = json!({ "query": self.query });
        if let Some(boost) = boost {
            inner["boost"] = json!(boost);
        }
        json!({
            "nested": {
                "path": "menus",
                "query": { "match": { "menus.name": inner } }
            }
        })
    }

    fn review_mention(&self, boost: Option<f64>) -> Value {
        let mut inner = json!({ "query": self.query });
        if let Some(boost) = boost {
            inner["boost"] = json!(boost);
        }
        json!({ "match": { "review_food": inner } })
    }

    /// Mandatory form: either the menu or a review mentions the dish.
    pub fn required(&self) -> Value {
        json!({
            "bool": {
                "should": [self.nested_menu_name(None), self.review_mention(None)],
                "minimum_should_match": 1
            }
        })
    }

    /// Optional scoring form: two independent should clauses.
    pub fn boosted(&self, boost: f64) -> Vec<Value> {
        vec![
            self.nested_menu_name(Some(boost)),
            self.review_mention(Some(boost)),
        ]
    }
}

/// Filter fragments derived from one entity set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityFilters {
    /// One geo_distance or address match per location value, in entity order
    pub location: Vec<Value>,
    pub convenience: Option<MatchFragment>,
    pub category: Option<MatchFragment>,
    pub menu: Option<MenuFragment>,
}

/// How a single location value was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationResolution {
    /// Unambiguous coordinate
    Geo { name: String, coordinate: GeoPoint },
    /// Ambiguous or unknown: soft address match on the raw string
    Address,
}

/// Decide between a geo filter and an address match for a lookup result.
///
/// Trusted when the lookup returns exactly one candidate, or when the best candidate's
/// name equals the input after trimming. A trusted candidate without a coordinate
/// still falls back to the address match.
pub fn resolve_location(location: &str, candidates: &[PlaceCandidate]) -> LocationResolution {
    let trusted = match candidates {
        [only] => only,
        [best, ..] if best.name.trim() == location.trim() => best,
        _ => return LocationResolution::Address,
    };
    match trusted.coordinate {
        Some(coordinate) => LocationResolution::Geo {
            name: trusted.name.clone(),
            coordinate,
        },
        None => LocationResolution::Address,
    }
}

pub fn geo_distance_filter(coordinate: &GeoPoint, radius: &str) -> Value {
    json!({
        "geo_distance": {
            "distance": radius,
            GEO_FIELD: {
                "lat": coordinate.lat,
                "lon": coordinate.lon
            }
        }
    })
}

pub fn address_match_filter(location: &str) -> Value {
    json!({
        "match": {
            "address": {
                "query": location
            }
        }
    })
}

pub struct EntityFilterBuilder {
    lookup: Arc<dyn CoordinateLookup>,
    geo_radius: String,
}

impl EntityFilterBuilder {
    pub fn new(lookup: Arc<dyn CoordinateLookup>, geo_radius: impl Into<String>) -> Self {
        EntityFilterBuilder {
            lookup,
            geo_radius: geo_radius.into(),
        }
    }

    /// Resolve location values one at a time.
    ///
    /// A failed lookup omits that location's filter entirely; the store is never sent
    /// a guessed coordinate.
    pub async fn location_filters(&self, entities: &EntitySet) -> Vec<Value> {
        let mut filters = Vec::with_capacity(entities.location.len());

        for location in &entities.location {
            let candidates = match self.lookup.lookup(location).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!(
                        location = %location,
                        error = %e,
                        "Coordinate lookup failed, dropping location filter"
                    );
                    continue;
                }
            };

            match resolve_location(location, &candidates) {
                LocationResolution::Geo { name, coordinate } => {
                    tracing::debug!(
                        location = %location,
                        matched = %name,
                        lat = coordinate.lat,
                        lon = coordinate.lon,
                        "Location resolved to coordinate"
                    );
                    filters.push(geo_distance_filter(&coordinate, &self.geo_radius));
                }
                LocationResolution::Address => {
                    tracing::debug!(
                        location = %location,
                        candidates = candidates.len(),
                        "Ambiguous location, falling back to address match"
                    );
                    filters.push(address_match_filter(location));
                }
            }
        }

        filters
    }

    pub async fn build(&self, entities: &EntitySet) -> EntityFilters {
        EntityFilters {
            location: self.location_filters(entities).await,
            convenience: entities
                .joined(EntityCategory::Convenience)
                .map(|query| MatchFragment { field: "convenience", query }),
            category: entities
                .joined(EntityCategory::Category)
                .map(|query| MatchFragment { field: "category", query }),
            menu: entities
                .joined(EntityCategory::Menu)
                .map(|query| MenuFragment { query }),
        }
    }
}
