//! Endpoint categorization and category-catalog aggregation.
//!
//! Each endpoint is assigned exactly one category by a priority cascade,
//! first match wins:
//!
//! 1. **Primary tag**: the first declared tag, normalized to `lower_snake_case`.
//! 2. **Tag groups**: untagged endpoints whose path mentions a tag listed in
//!    the `x-tagGroups` extension resolve to that tag.
//! 3. **Path**: the first path segment after version/client prefixes
//!    (`/api/client/{category}/...`, `/v2/{category}`).
//! 4. **Fallback**: [`UNCATEGORIZED`].
//!
//! Category membership at query time is *derived* from tags through
//! [`tag_matches_category`]; nothing links an endpoint row to a category row.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::EndpointCategory;
use crate::spec::{ParsedEndpoint, ParsedSpec};

/// Category assigned when nothing else resolves.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Leading path segments that never name a category.
const PREFIX_SEGMENTS: [&str; 8] = [
    "api", "apis", "rest", "client", "clients", "public", "internal", "external",
];

/// Normalize a tag or path segment to `lower_snake_case`: lower-case, runs
/// of non-alphanumeric characters collapsed into a single `_`.
pub fn normalize_category_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Title-case each `_`-separated word and join with `-`:
/// `search_promo` → `Search-Promo`.
pub fn display_name(category: &str) -> String {
    category
        .split('_')
        .filter(|w| !w.is_empty())
        .map(capitalize_first)
        .collect::<Vec<_>>()
        .join("-")
}

/// The form a category name takes when compared against tags: `_` → `-`,
/// first character upper-cased (`search_promo` → `Search-promo`).
pub fn category_tag_form(category: &str) -> String {
    capitalize_first(&category.replace('_', "-"))
}

/// Whether `tag` places an endpoint in `category`.
///
/// Case-insensitive *substring* check of [`category_tag_form`] against the
/// tag. This over-matches short names (`ad` matches `Advanced`); the rule is
/// kept as-is so stored catalogs and filters agree, and is isolated here so
/// it can be tightened without touching query plumbing.
pub fn tag_matches_category(tag: &str, category: &str) -> bool {
    if category.is_empty() {
        return false;
    }
    let needle = category_tag_form(category).to_lowercase();
    tag.to_lowercase().contains(&needle)
}

fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_version_segment(segment: &str) -> bool {
    let s = segment.to_ascii_lowercase();
    let digits = s.strip_prefix('v').unwrap_or(&s);
    !digits.is_empty()
        && digits.chars().next().is_some_and(|c| c.is_ascii_digit())
        && digits
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == '-')
}

fn is_param_segment(segment: &str) -> bool {
    segment.starts_with('{') || segment.starts_with(':')
}

/// Derive a category from the first meaningful path segment.
pub fn category_from_path(path: &str) -> Option<String> {
    path.split('/')
        .filter(|s| !s.is_empty() && !is_param_segment(s))
        .skip_while(|s| {
            PREFIX_SEGMENTS.contains(&s.to_ascii_lowercase().as_str()) || is_version_segment(s)
        })
        .map(normalize_category_name)
        .find(|s| !s.is_empty())
}

/// Which cascade step produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategorySource {
    Tag,
    TagGroup,
    Path,
    Fallback,
}

/// The category chosen for one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: String,
    pub source: CategorySource,
}

/// An endpoint paired with its resolved category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorizedEndpoint {
    pub endpoint: ParsedEndpoint,
    pub category: String,
}

/// Output of [`categorize`]: enriched endpoints plus the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Categorization {
    pub endpoints: Vec<CategorizedEndpoint>,
    pub catalog: Vec<EndpointCategory>,
}

/// Classifier holding the tag-group hierarchy of one specification.
pub struct Categorizer {
    /// Normalized grouped tag → group name.
    grouped_tags: Vec<(String, String)>,
}

impl Categorizer {
    pub fn new(spec: &ParsedSpec) -> Self {
        let grouped_tags = spec
            .tag_groups
            .iter()
            .flat_map(|g| {
                g.tags
                    .iter()
                    .map(move |t| (normalize_category_name(t), g.name.clone()))
            })
            .filter(|(t, _)| !t.is_empty())
            .collect();
        Self { grouped_tags }
    }

    /// Run the cascade for a single endpoint.
    pub fn classify(&self, endpoint: &ParsedEndpoint) -> Classification {
        if let Some(primary) = endpoint.tags.first() {
            let name = normalize_category_name(primary);
            if !name.is_empty() {
                return Classification {
                    category: name,
                    source: CategorySource::Tag,
                };
            }
        }

        if endpoint.tags.is_empty() {
            let grouped = endpoint
                .path
                .split('/')
                .filter(|s| !s.is_empty() && !is_param_segment(s))
                .map(normalize_category_name)
                .find(|seg| self.grouped_tags.iter().any(|(t, _)| t == seg));
            if let Some(name) = grouped {
                return Classification {
                    category: name,
                    source: CategorySource::TagGroup,
                };
            }
        }

        match category_from_path(&endpoint.path) {
            Some(name) => Classification {
                category: name,
                source: CategorySource::Path,
            },
            None => Classification {
                category: UNCATEGORIZED.to_string(),
                source: CategorySource::Fallback,
            },
        }
    }

    /// Parent group declared for a normalized category name.
    pub fn group_of(&self, category: &str) -> Option<String> {
        self.grouped_tags
            .iter()
            .find(|(t, _)| t == category)
            .map(|(_, g)| g.clone())
    }
}

#[derive(Default)]
struct Aggregate {
    count: i64,
    methods: BTreeSet<String>,
}

/// Classify every endpoint of `spec` and aggregate the category catalog.
///
/// Tags declared at the top level but used by no endpoint appear in the
/// catalog with a zero count.
pub fn categorize(spec: &ParsedSpec) -> Categorization {
    let categorizer = Categorizer::new(spec);
    let mut aggregates: BTreeMap<String, Aggregate> = BTreeMap::new();

    let endpoints: Vec<CategorizedEndpoint> = spec
        .endpoints
        .iter()
        .map(|ep| {
            let classification = categorizer.classify(ep);
            let agg = aggregates
                .entry(classification.category.clone())
                .or_default();
            agg.count += 1;
            agg.methods.insert(ep.method.to_ascii_uppercase());
            CategorizedEndpoint {
                endpoint: ep.clone(),
                category: classification.category,
            }
        })
        .collect();

    for tag in &spec.tags {
        let name = normalize_category_name(&tag.name);
        if !name.is_empty() {
            aggregates.entry(name).or_default();
        }
    }

    let catalog = aggregates
        .into_iter()
        .map(|(name, agg)| {
            let description = spec
                .tags
                .iter()
                .find(|t| normalize_category_name(&t.name) == name)
                .and_then(|t| t.description.clone())
                .or_else(|| Some(format!("Endpoints related to {}", display_name(&name))));
            EndpointCategory {
                display_name: display_name(&name),
                group: categorizer.group_of(&name),
                description,
                endpoint_count: agg.count,
                http_methods: agg.methods.into_iter().collect(),
                name,
            }
        })
        .collect();

    Categorization { endpoints, catalog }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{SpecFormat, TagDefinition, TagGroup};

    fn endpoint(path: &str, method: &str, tags: &[&str]) -> ParsedEndpoint {
        ParsedEndpoint {
            path: path.to_string(),
            method: method.to_string(),
            operation_id: None,
            summary: None,
            description: None,
            parameters: Vec::new(),
            request_body_ref: None,
            request_body_schema: None,
            response_refs: Vec::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            deprecated: false,
            auth: None,
        }
    }

    fn spec_with(endpoints: Vec<ParsedEndpoint>) -> ParsedSpec {
        ParsedSpec {
            format: SpecFormat::OpenApi3("3.0.0".into()),
            title: "t".into(),
            version: "1".into(),
            description: None,
            servers: Vec::new(),
            base_url: "https://api.example.com".into(),
            endpoints,
            schemas: Vec::new(),
            tags: Vec::new(),
            tag_groups: Vec::new(),
        }
    }

    #[test]
    fn test_normalize_category_name() {
        assert_eq!(normalize_category_name("Search-Promo"), "search_promo");
        assert_eq!(normalize_category_name("Search Promo"), "search_promo");
        assert_eq!(normalize_category_name("  Campaign  "), "campaign");
        assert_eq!(normalize_category_name("a--b__c"), "a_b_c");
        assert_eq!(normalize_category_name("---"), "");
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("search_promo"), "Search-Promo");
        assert_eq!(display_name("campaign"), "Campaign");
    }

    #[test]
    fn test_tag_matching_rule() {
        assert_eq!(category_tag_form("search_promo"), "Search-promo");
        assert!(tag_matches_category("Search-Promo", "search_promo"));
        assert!(tag_matches_category("statistics", "statistics"));
        assert!(!tag_matches_category("Campaign", "statistics"));
        assert!(!tag_matches_category("anything", ""));
    }

    #[test]
    fn test_tag_matching_substring_false_positive_is_reproduced() {
        // Known defect: a short category name matches any tag containing it.
        assert!(tag_matches_category("Advanced", "ad"));
        assert!(tag_matches_category("Campaign-Stats", "campaign"));
    }

    #[test]
    fn test_primary_tag_wins() {
        let spec = spec_with(vec![endpoint(
            "/api/client/statistics/report",
            "GET",
            &["Campaign", "Statistics"],
        )]);
        let c = Categorizer::new(&spec).classify(&spec.endpoints[0]);
        assert_eq!(c.category, "campaign");
        assert_eq!(c.source, CategorySource::Tag);
    }

    #[test]
    fn test_tag_group_for_untagged() {
        let mut spec = spec_with(vec![endpoint("/api/v1/accounts/{id}/Search-Promo", "GET", &[])]);
        spec.tag_groups = vec![TagGroup {
            name: "Advertising".into(),
            tags: vec!["Search Promo".into()],
        }];
        let categorizer = Categorizer::new(&spec);
        let c = categorizer.classify(&spec.endpoints[0]);
        assert_eq!(c.category, "search_promo");
        assert_eq!(c.source, CategorySource::TagGroup);
        assert_eq!(categorizer.group_of("search_promo").as_deref(), Some("Advertising"));
    }

    #[test]
    fn test_path_fallback_skips_prefixes() {
        assert_eq!(
            category_from_path("/api/client/campaign/{id}").as_deref(),
            Some("campaign")
        );
        assert_eq!(category_from_path("/v2.1/Orders").as_deref(), Some("orders"));
        assert_eq!(
            category_from_path("/2024-01-01/{tenant}/invoices").as_deref(),
            Some("invoices")
        );
        assert_eq!(category_from_path("/api/v1/"), None);
        assert_eq!(category_from_path("/"), None);
    }

    #[test]
    fn test_uncategorized_fallback() {
        let spec = spec_with(vec![endpoint("/api/{id}", "GET", &[])]);
        let c = Categorizer::new(&spec).classify(&spec.endpoints[0]);
        assert_eq!(c.category, UNCATEGORIZED);
        assert_eq!(c.source, CategorySource::Fallback);
    }

    #[test]
    fn test_catalog_aggregation() {
        let mut spec = spec_with(vec![
            endpoint("/campaigns", "GET", &["Campaign"]),
            endpoint("/campaigns", "POST", &["Campaign"]),
            endpoint("/campaigns/{id}", "GET", &["Campaign"]),
            endpoint("/stats", "GET", &["Statistics"]),
        ]);
        spec.tags = vec![
            TagDefinition {
                name: "Campaign".into(),
                description: Some("Manage campaigns".into()),
            },
            TagDefinition {
                name: "Billing".into(),
                description: None,
            },
        ];
        let result = categorize(&spec);
        assert_eq!(result.endpoints.len(), 4);
        assert_eq!(result.endpoints[3].category, "statistics");

        let names: Vec<&str> = result.catalog.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["billing", "campaign", "statistics"]);

        let campaign = &result.catalog[1];
        assert_eq!(campaign.endpoint_count, 3);
        assert_eq!(campaign.http_methods, vec!["GET", "POST"]);
        assert_eq!(campaign.description.as_deref(), Some("Manage campaigns"));
        assert_eq!(campaign.display_name, "Campaign");

        let billing = &result.catalog[0];
        assert_eq!(billing.endpoint_count, 0);
        assert!(billing.http_methods.is_empty());
    }
}
