/// Keyword-channel query bodies, one policy per intent.
///
/// - search: weak fuzzy match on the raw text plus boosted entity clauses; location and
///   convenience are hard filters.
/// - compare: titles boosted very highly, nothing mandatory, so every named target
///   surfaces its own candidates.
/// - information: the named place is required; the rest only boosts.
///
/// A body with no clause at all matches nothing rather than everything.

use serde_json::{json, Map, Value};

use crate::entities::{EntityCategory, EntitySet, Intent};
use crate::filters::{address_match_filter, EntityFilters, MatchFragment};
use crate::store::SOURCE_FIELDS;

/// Fields and weights of the raw-text multi_match in the search intent.
pub const SEARCH_TEXT_FIELDS: [&str; 8] = [
    "title^2.0",
    "category^1.5",
    "review_food^1.5",
    "convenience^1.2",
    "atmosphere^1.2",
    "occasion^1.2",
    "features^1.2",
    "address^0.8",
];

const RAW_TEXT_BOOST: f64 = 0.5;

const SEARCH_TITLE_BOOST: f64 = 1.0;
const SEARCH_CATEGORY_BOOST: f64 = 2.0;
const SEARCH_ATMOSPHERE_BOOST: f64 = 1.0;
const SEARCH_OCCASION_BOOST: f64 = 1.0;
const SEARCH_MENU_BOOST: f64 = 1.2;

const COMPARE_TITLE_BOOST: f64 = 5.0;
const COMPARE_LOCATION_BOOST: f64 = 1.0;
const COMPARE_CATEGORY_BOOST: f64 = 0.5;

const INFORMATION_LOCATION_BOOST: f64 = 1.0;
const INFORMATION_CONVENIENCE_BOOST: f64 = 1.0;

/// Accumulates boolean clauses before rendering.
#[derive(Debug, Default)]
struct BoolQuery {
    must: Vec<Value>,
    should: Vec<Value>,
    filter: Vec<Value>,
    must_not: Vec<Value>,
    minimum_should_match: Option<u32>,
}

impl BoolQuery {
    /// Exclusions alone carry no positive signal.
    fn has_signal(&self) -> bool {
        !(self.must.is_empty() && self.should.is_empty() && self.filter.is_empty())
    }

    fn into_query(self) -> Value {
        if !self.has_signal() {
            return match_nothing();
        }

        let mut clauses = Map::new();
        if !self.must.is_empty() {
            clauses.insert("must".to_string(), Value::Array(self.must));
        }
        if !self.should.is_empty() {
            clauses.insert("should".to_string(), Value::Array(self.should));
            if let Some(minimum) = self.minimum_should_match {
                clauses.insert("minimum_should_match".to_string(), json!(minimum));
            }
        }
        if !self.filter.is_empty() {
            clauses.insert("filter".to_string(), Value::Array(self.filter));
        }
        if !self.must_not.is_empty() {
            clauses.insert("must_not".to_string(), Value::Array(self.must_not));
        }

        json!({ "bool": clauses })
    }
}

/// Explicit empty-result query.
pub fn match_nothing() -> Value {
    json!({ "bool": { "must_not": { "match_all": {} } } })
}

/// True when a composed body is the empty-result marker.
pub fn is_match_nothing(body: &Value) -> bool {
    body.get("query") == Some(&match_nothing())
}

fn title_match(title: &str, boost: Option<f64>) -> Value {
    let mut inner = json!({ "query": title });
    if let Some(boost) = boost {
        inner["boost"] = json!(boost);
    }
    json!({ "match": { "title": inner } })
}

fn address_boost(location: &str, boost: f64) -> Value {
    let mut clause = address_match_filter(location);
    clause["match"]["address"]["boost"] = json!(boost);
    clause
}

fn entity_fragment(entities: &EntitySet, category: EntityCategory) -> Option<MatchFragment> {
    entities.joined(category).map(|query| MatchFragment {
        field: category.field(),
        query,
    })
}

fn search_clauses(query_text: &str, entities: &EntitySet, filters: &EntityFilters) -> BoolQuery {
    let mut query = BoolQuery {
        minimum_should_match: Some(1),
        ..Default::default()
    };

    // Weak raw-text match catches whatever entity extraction missed.
    if !query_text.trim().is_empty() {
        query.should.push(json!({
            "multi_match": {
                "query": query_text,
                "fields": SEARCH_TEXT_FIELDS,
                "type": "best_fields",
                "fuzziness": "AUTO",
                "boost": RAW_TEXT_BOOST
            }
        }));
    }

    for title in &entities.title {
        query.should.push(title_match(title, Some(SEARCH_TITLE_BOOST)));
    }
    if let Some(category) = &filters.category {
        query.should.push(category.boosted(SEARCH_CATEGORY_BOOST));
    }
    if let Some(atmosphere) = entity_fragment(entities, EntityCategory::Atmosphere) {
        query.should.push(atmosphere.boosted(SEARCH_ATMOSPHERE_BOOST));
    }
    if let Some(occasion) = entity_fragment(entities, EntityCategory::Occasion) {
        query.should.push(occasion.boosted(SEARCH_OCCASION_BOOST));
    }
    if let Some(menu) = &filters.menu {
        query.should.extend(menu.boosted(SEARCH_MENU_BOOST));
    }

    query.filter.extend(filters.location.iter().cloned());
    if let Some(convenience) = &filters.convenience {
        query.filter.push(convenience.required());
    }

    query
}

fn compare_clauses(entities: &EntitySet, filters: &EntityFilters) -> BoolQuery {
    let mut query = BoolQuery {
        minimum_should_match: Some(1),
        ..Default::default()
    };

    for title in &entities.title {
        query.should.push(title_match(title, Some(COMPARE_TITLE_BOOST)));
    }

    // A location already contained in a compared title ("강남 진대감") adds nothing.
    for location in &entities.location {
        let needle = location.to_lowercase();
        let subsumed = entities
            .title
            .iter()
            .any(|title| title.to_lowercase().contains(&needle));
        if !subsumed {
            query.should.push(address_boost(location, COMPARE_LOCATION_BOOST));
        }
    }

    if let Some(category) = &filters.category {
        query.should.push(category.boosted(COMPARE_CATEGORY_BOOST));
    }

    query
}

fn information_clauses(entities: &EntitySet, filters: &EntityFilters) -> BoolQuery {
    let mut query = BoolQuery::default();

    for title in &entities.title {
        query.must.push(title_match(title, None));
    }
    for location in &entities.location {
        query.should.push(address_boost(location, INFORMATION_LOCATION_BOOST));
    }
    if let Some(convenience) = &filters.convenience {
        query.should.push(convenience.boosted(INFORMATION_CONVENIENCE_BOOST));
    }

    query.filter.extend(filters.location.iter().cloned());

    query
}

/// Build the full keyword-channel request body.
pub fn build_keyword_query(
    intent: Intent,
    query_text: &str,
    entities: &EntitySet,
    filters: &EntityFilters,
    exclusions: Vec<Value>,
    size: usize,
) -> Value {
    let mut clauses = match intent {
        Intent::Search => search_clauses(query_text, entities, filters),
        Intent::Compare => compare_clauses(entities, filters),
        Intent::Information => information_clauses(entities, filters),
    };
    clauses.must_not = exclusions;

    json!({
        "size": size,
        "_source": { "includes": SOURCE_FIELDS },
        "query": clauses.into_query()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::MenuFragment;

    fn geo_filter() -> Value {
        json!({"geo_distance": {"distance": "3km", "pin.coordinate": {"lat": 37.4979, "lon": 127.0276}}})
    }

    fn filters_for(entities: &EntitySet, location: Vec<Value>) -> EntityFilters {
        EntityFilters {
            location,
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

    fn contains_match_on(clauses: &Value, field: &str) -> bool {
        clauses
            .as_array()
            .map(|arr| arr.iter().any(|c| c["match"].get(field).is_some()))
            .unwrap_or(false)
    }

    #[test]
    fn test_search_convenience_is_mandatory_filter() {
        let entities = EntitySet {
            location: vec!["강남역".into()],
            category: vec!["일식".into()],
            convenience: vec!["주차".into()],
            ..Default::default()
        };
        let filters = filters_for(&entities, vec![geo_filter()]);

        let body = build_keyword_query(Intent::Search, "강남역 일식 주차", &entities, &filters, vec![], 50);
        let bool_query = &body["query"]["bool"];

        assert!(contains_match_on(&bool_query["filter"], "convenience"));
        assert!(!contains_match_on(&bool_query["should"], "convenience"));
        assert_eq!(bool_query["filter"][0], geo_filter());
        assert_eq!(bool_query["minimum_should_match"], 1);
        assert_eq!(body["size"], 50);
        assert_eq!(body["_source"]["includes"].as_array().unwrap().len(), 9);
    }

    #[test]
    fn test_search_boost_weights() {
        let entities = EntitySet {
            title: vec!["스시히로바".into()],
            category: vec!["일식".into()],
            atmosphere: vec!["조용한".into()],
            occasion: vec!["데이트".into()],
            menu: vec!["초밥".into()],
            ..Default::default()
        };
        let filters = filters_for(&entities, vec![]);

        let body = build_keyword_query(Intent::Search, "조용한 초밥 데이트", &entities, &filters, vec![], 50);
        let should = body["query"]["bool"]["should"].as_array().unwrap();

        assert_eq!(should[0]["multi_match"]["boost"], 0.5);
        assert_eq!(should[0]["multi_match"]["fuzziness"], "AUTO");
        assert_eq!(should[1]["match"]["title"]["boost"], 1.0);
        assert_eq!(should[2]["match"]["category"]["boost"], 2.0);
        assert_eq!(should[3]["match"]["atmosphere"]["boost"], 1.0);
        assert_eq!(should[4]["match"]["occasion"]["boost"], 1.0);
        assert_eq!(should[5]["nested"]["query"]["match"]["menus.name"]["boost"], 1.2);
        assert_eq!(should[6]["match"]["review_food"]["boost"], 1.2);
        assert!(body["query"]["bool"].get("filter").is_none());
    }

    #[test]
    fn test_compare_skips_location_inside_title() {
        let entities = EntitySet {
            title: vec!["강남 진대감".into(), "삼육가".into()],
            location: vec!["강남".into(), "역삼".into()],
            ..Default::default()
        };
        let filters = filters_for(&entities, vec![geo_filter()]);

        let body = build_keyword_query(Intent::Compare, "진대감", &entities, &filters, vec![], 20);
        let bool_query = &body["query"]["bool"];
        let should = bool_query["should"].as_array().unwrap();

        assert_eq!(should.len(), 3);
        assert_eq!(should[0]["match"]["title"]["boost"], 5.0);
        assert_eq!(should[1]["match"]["title"]["query"], "삼육가");
        assert_eq!(should[2]["match"]["address"]["query"], "역삼");
        // no mandatory clauses in compare, even with a resolved location
        assert!(bool_query.get("filter").is_none());
        assert!(bool_query.get("must").is_none());
    }

    #[test]
    fn test_compare_substring_check_ignores_case() {
        let entities = EntitySet {
            title: vec!["Outback Gangnam".into()],
            location: vec!["GANGNAM".into()],
            ..Default::default()
        };
        let filters = filters_for(&entities, vec![]);
        let body = build_keyword_query(Intent::Compare, "", &entities, &filters, vec![], 20);
        assert_eq!(body["query"]["bool"]["should"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_information_title_required() {
        let entities = EntitySet {
            title: vec!["진대감".into()],
            location: vec!["마포".into()],
            convenience: vec!["주차".into()],
            ..Default::default()
        };
        let address = json!({"match": {"address": {"query": "마포"}}});
        let filters = filters_for(&entities, vec![address.clone()]);

        let body = build_keyword_query(Intent::Information, "마포 진대감 주차", &entities, &filters, vec![], 50);
        let bool_query = &body["query"]["bool"];

        assert_eq!(bool_query["must"][0]["match"]["title"]["query"], "진대감");
        assert!(contains_match_on(&bool_query["should"], "convenience"));
        assert!(contains_match_on(&bool_query["should"], "address"));
        assert_eq!(bool_query["filter"][0], address);
        assert!(bool_query.get("minimum_should_match").is_none());
    }

    #[test]
    fn test_no_signal_matches_nothing() {
        let entities = EntitySet::default();
        let filters = EntityFilters::default();

        for intent in [Intent::Search, Intent::Compare, Intent::Information] {
            let body = build_keyword_query(intent, "", &entities, &filters, vec![], 50);
            assert!(is_match_nothing(&body), "intent {} should match nothing", intent);
        }
    }

    #[test]
    fn test_exclusions_alone_still_match_nothing() {
        let exclusions = vec![json!({"match": {"category": {"query": "술집"}}})];
        let body = build_keyword_query(
            Intent::Compare,
            "",
            &EntitySet::default(),
            &EntityFilters::default(),
            exclusions,
            20,
        );
        assert!(is_match_nothing(&body));
    }

    #[test]
    fn test_exclusions_rendered_as_must_not() {
        let entities = EntitySet {
            occasion: vec!["회식".into()],
            ..Default::default()
        };
        let filters = filters_for(&entities, vec![]);
        let exclusions = vec![json!({"match": {"category": {"query": "술집"}}})];

        let body = build_keyword_query(Intent::Search, "회식", &entities, &filters, exclusions.clone(), 50);
        assert_eq!(body["query"]["bool"]["must_not"], Value::Array(exclusions));
    }
}
