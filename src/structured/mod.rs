//! Structured-data analysis: JSON-LD and microdata validated against a
//! per-type rule table, plus Open Graph / Twitter Card coverage.

mod extract;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{AnalyzerResult, Impact, Recommendation, Severity};

pub use extract::{entity_types, extract_structured_data, short_type_name, ExtractedData};

/// Required and recommended properties of one schema.org type.
struct SchemaRule {
    schema_type: &'static str,
    required: &'static [&'static str],
    recommended: &'static [&'static str],
}

const SCHEMA_RULES: &[SchemaRule] = &[
    SchemaRule {
        schema_type: "Organization",
        required: &["name"],
        recommended: &["url"],
    },
    SchemaRule {
        schema_type: "Article",
        required: &["headline"],
        recommended: &["author", "datePublished"],
    },
    SchemaRule {
        schema_type: "LocalBusiness",
        required: &["name", "address"],
        recommended: &[],
    },
    SchemaRule {
        schema_type: "Product",
        required: &["name"],
        recommended: &[],
    },
    SchemaRule {
        schema_type: "BreadcrumbList",
        required: &["itemListElement"],
        recommended: &[],
    },
];

/// Article subtypes validated with the Article rule.
const ARTICLE_SUBTYPES: &[&str] = &["NewsArticle", "BlogPosting", "TechArticle", "ScholarlyArticle"];

/// Types that can produce rich results.
const RICH_SNIPPET_TYPES: &[&str] = &[
    "Organization",
    "LocalBusiness",
    "Article",
    "Product",
    "Recipe",
    "Event",
    "Review",
    "BreadcrumbList",
];

fn rule_for(schema_type: &str) -> Option<&'static SchemaRule> {
    let canonical = if ARTICLE_SUBTYPES.contains(&schema_type) {
        "Article"
    } else {
        schema_type
    };
    SCHEMA_RULES.iter().find(|r| r.schema_type == canonical)
}

fn has_field(item: &Value, field: &str) -> bool {
    match item.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub schema_type: String,
    pub field: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredDataReport {
    /// Valid JSON-LD blocks.
    pub total_count: usize,
    pub invalid_count: usize,
    pub items: Vec<Value>,
    /// Distinct types from JSON-LD and microdata, sorted.
    pub schema_types: Vec<String>,
    pub microdata_types: Vec<String>,
    pub missing_required: Vec<FieldIssue>,
    pub missing_recommended: Vec<FieldIssue>,
    pub rich_snippet_eligible: bool,
    pub eligible_types: Vec<String>,
    pub open_graph: BTreeMap<String, String>,
    pub twitter_cards: BTreeMap<String, String>,
}

impl StructuredDataReport {
    pub fn has_structured_data(&self) -> bool {
        !self.items.is_empty() || !self.microdata_types.is_empty()
    }
}

fn validate(items: &[Value]) -> (Vec<FieldIssue>, Vec<FieldIssue>) {
    let mut required = Vec::new();
    let mut recommended = Vec::new();
    for item in items {
        for schema_type in entity_types(item) {
            let Some(rule) = rule_for(&schema_type) else {
                continue;
            };
            let issue = |field: &str, severity| FieldIssue {
                schema_type: schema_type.clone(),
                field: field.to_string(),
                severity,
            };
            required.extend(
                rule.required
                    .iter()
                    .filter(|f| !has_field(item, f))
                    .map(|f| issue(f, Severity::Error)),
            );
            recommended.extend(
                rule.recommended
                    .iter()
                    .filter(|f| !has_field(item, f))
                    .map(|f| issue(f, Severity::Warning)),
            );
        }
    }
    (required, recommended)
}

/// 40 for any structured data, +20 no invalid blocks, +20 no missing required
/// fields, +10 no missing recommended fields, +10 rich-snippet eligible.
fn compute_score(report: &StructuredDataReport) -> u8 {
    if !report.has_structured_data() {
        return 0;
    }
    let mut score = 40;
    if report.invalid_count == 0 {
        score += 20;
    }
    if report.missing_required.is_empty() {
        score += 20;
    }
    if report.missing_recommended.is_empty() {
        score += 10;
    }
    if report.rich_snippet_eligible {
        score += 10;
    }
    score
}

fn build_recommendations(report: &StructuredDataReport) -> Vec<Recommendation> {
    let mut recs = Vec::new();
    if !report.has_structured_data() {
        recs.push(Recommendation::warning(
            Impact::Medium,
            "No structured data found",
            "Describe the page with schema.org JSON-LD (Organization, Article, Product, ...)",
        ));
    }
    if report.invalid_count > 0 {
        recs.push(Recommendation::error(
            Impact::Medium,
            format!("{} JSON-LD blocks contain invalid JSON", report.invalid_count),
            "Validate the JSON-LD blocks and fix syntax errors",
        ));
    }
    for issue in &report.missing_required {
        recs.push(Recommendation::error(
            Impact::Medium,
            format!("{} is missing required field '{}'", issue.schema_type, issue.field),
            format!("Add '{}' to the {} markup", issue.field, issue.schema_type),
        ));
    }
    for issue in &report.missing_recommended {
        recs.push(Recommendation::warning(
            Impact::Low,
            format!("{} is missing recommended field '{}'", issue.schema_type, issue.field),
            format!("Add '{}' to the {} markup", issue.field, issue.schema_type),
        ));
    }
    if report.has_structured_data() && !report.rich_snippet_eligible {
        recs.push(Recommendation::info(
            Impact::Low,
            "No rich-result eligible schema types found",
            "Mark up content with a rich-result type such as Article, Product or BreadcrumbList",
        ));
    }
    if !report.open_graph.contains_key("og:title") {
        recs.push(Recommendation::info(
            Impact::Low,
            "Missing Open Graph tags",
            "Add og:title, og:description and og:image meta tags",
        ));
    }
    if !report.twitter_cards.contains_key("twitter:card") {
        recs.push(Recommendation::info(
            Impact::Low,
            "Missing Twitter Card tags",
            "Add a twitter:card meta tag",
        ));
    }
    recs
}

/// Structured-data analyzer. Works on markup alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredDataAnalyzer;

impl StructuredDataAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, html: &str) -> AnalyzerResult<StructuredDataReport> {
        let data = extract_structured_data(html);

        let mut schema_types: Vec<String> = data
            .items
            .iter()
            .flat_map(entity_types)
            .chain(data.microdata_types.iter().cloned())
            .collect();
        schema_types.sort();
        schema_types.dedup();

        let eligible_types: Vec<String> = schema_types
            .iter()
            .filter(|t| {
                RICH_SNIPPET_TYPES.contains(&t.as_str()) || ARTICLE_SUBTYPES.contains(&t.as_str())
            })
            .cloned()
            .collect();
        let (missing_required, missing_recommended) = validate(&data.items);

        let report = StructuredDataReport {
            total_count: data.valid_blocks,
            invalid_count: data.invalid_blocks,
            items: data.items,
            schema_types,
            microdata_types: data.microdata_types,
            missing_required,
            missing_recommended,
            rich_snippet_eligible: !eligible_types.is_empty(),
            eligible_types,
            open_graph: data.open_graph,
            twitter_cards: data.twitter_cards,
        };
        let score = compute_score(&report);
        let recs = build_recommendations(&report);
        log::debug!(
            "Structured data: {} valid / {} invalid blocks, types {:?}, score {score}",
            report.total_count,
            report.invalid_count,
            report.schema_types
        );

        AnalyzerResult::completed(score, report, recs, Vec::new())
    }
}
