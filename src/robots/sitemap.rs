//! Sitemap XML parsing, per-entry validation, and statistics.
//!
//! Parsing is streaming (`quick-xml` events), so a `<urlset>` larger than the
//! retention cap still contributes to `total_urls` and the statistics without
//! being held in memory.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{CHANGEFREQ_VALUES, SITEMAP_FRESHNESS_DAYS};

/// Validation issues kept per sitemap; the counts keep going past this.
const MAX_RECORDED_ISSUES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SitemapKind {
    #[serde(rename = "urlset")]
    UrlSet,
    SitemapIndex,
}

/// One `<url>` of a `<urlset>`, with values as written in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<String>,
    pub changefreq: Option<String>,
    pub priority: Option<String>,
}

/// One `<sitemap>` child of a `<sitemapindex>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitemapReference {
    pub loc: String,
    pub lastmod: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: IssueLevel,
    pub loc: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitemapValidation {
    pub error_count: usize,
    pub warning_count: usize,
    pub issues: Vec<ValidationIssue>,
}

impl SitemapValidation {
    fn record(&mut self, level: IssueLevel, loc: &str, message: String) {
        match level {
            IssueLevel::Error => self.error_count += 1,
            IssueLevel::Warning => self.warning_count += 1,
        }
        if self.issues.len() < MAX_RECORDED_ISSUES {
            self.issues.push(ValidationIssue {
                level,
                loc: loc.to_string(),
                message,
            });
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitemapStatistics {
    pub total_urls: usize,
    pub with_lastmod: usize,
    pub with_changefreq: usize,
    pub with_priority: usize,
    pub changefreq_distribution: BTreeMap<String, usize>,
    pub recently_updated: usize,
    pub newest_lastmod: Option<String>,
    pub oldest_lastmod: Option<String>,
    /// Entries beyond the retention cap were dropped from `entries`.
    pub truncated: bool,
}

/// A parsed sitemap document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedSitemap {
    pub kind: SitemapKind,
    pub entries: Vec<SitemapEntry>,
    pub children: Vec<SitemapReference>,
    pub statistics: SitemapStatistics,
    pub validation: SitemapValidation,
}

/// Parses a W3C datetime (`YYYY`, `YYYY-MM`, `YYYY-MM-DD`, or a full
/// timestamp with offset).
pub fn parse_lastmod(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Some(minutes) = value.strip_suffix('Z') {
        if let Ok(dt) = DateTime::parse_from_str(&format!("{minutes}+00:00"), "%Y-%m-%dT%H:%M%:z")
        {
            return Some(dt.with_timezone(&Utc));
        }
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{value}-01-01"), "%Y-%m-%d"))
        .ok()?;
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

fn is_valid_loc(loc: &str) -> bool {
    Url::parse(loc)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Loc,
    Lastmod,
    Changefreq,
    Priority,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"loc" => Some(Field::Loc),
            b"lastmod" => Some(Field::Lastmod),
            b"changefreq" => Some(Field::Changefreq),
            b"priority" => Some(Field::Priority),
            _ => None,
        }
    }
}

/// Accumulates statistics and validation over every entry seen.
struct Accumulator {
    now: DateTime<Utc>,
    statistics: SitemapStatistics,
    validation: SitemapValidation,
    newest: Option<DateTime<Utc>>,
    oldest: Option<DateTime<Utc>>,
}

impl Accumulator {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            statistics: SitemapStatistics::default(),
            validation: SitemapValidation::default(),
            newest: None,
            oldest: None,
        }
    }

    fn observe_lastmod(&mut self, loc: &str, lastmod: &str) {
        self.statistics.with_lastmod += 1;
        match parse_lastmod(lastmod) {
            Some(dt) => {
                if dt >= self.now - Duration::days(SITEMAP_FRESHNESS_DAYS) {
                    self.statistics.recently_updated += 1;
                }
                self.newest = Some(self.newest.map_or(dt, |n| n.max(dt)));
                self.oldest = Some(self.oldest.map_or(dt, |o| o.min(dt)));
            }
            None => self.validation.record(
                IssueLevel::Warning,
                loc,
                format!("Unparseable lastmod '{lastmod}'"),
            ),
        }
    }

    fn observe_loc(&mut self, loc: &str) {
        if loc.is_empty() {
            self.validation
                .record(IssueLevel::Error, loc, "Missing <loc>".to_string());
        } else if !is_valid_loc(loc) {
            self.validation.record(
                IssueLevel::Error,
                loc,
                "Invalid absolute URL in <loc>".to_string(),
            );
        }
    }

    fn observe_entry(&mut self, entry: &SitemapEntry) {
        self.statistics.total_urls += 1;
        self.observe_loc(&entry.loc);
        if let Some(lastmod) = &entry.lastmod {
            self.observe_lastmod(&entry.loc, lastmod);
        }
        if let Some(changefreq) = &entry.changefreq {
            self.statistics.with_changefreq += 1;
            let token = changefreq.to_ascii_lowercase();
            if CHANGEFREQ_VALUES.contains(&token.as_str()) {
                *self
                    .statistics
                    .changefreq_distribution
                    .entry(token)
                    .or_insert(0) += 1;
            } else {
                self.validation.record(
                    IssueLevel::Warning,
                    &entry.loc,
                    format!("Invalid changefreq '{changefreq}'"),
                );
            }
        }
        if let Some(priority) = &entry.priority {
            self.statistics.with_priority += 1;
            let valid = priority
                .parse::<f64>()
                .map(|p| (0.0..=1.0).contains(&p))
                .unwrap_or(false);
            if !valid {
                self.validation.record(
                    IssueLevel::Warning,
                    &entry.loc,
                    format!("Priority '{priority}' is not a number between 0.0 and 1.0"),
                );
            }
        }
    }

    fn observe_reference(&mut self, reference: &SitemapReference) {
        self.observe_loc(&reference.loc);
        if let Some(lastmod) = &reference.lastmod {
            self.observe_lastmod(&reference.loc, lastmod);
        }
    }

    fn finish(mut self) -> (SitemapStatistics, SitemapValidation) {
        self.statistics.newest_lastmod = self.newest.map(|d| d.to_rfc3339());
        self.statistics.oldest_lastmod = self.oldest.map(|d| d.to_rfc3339());
        (self.statistics, self.validation)
    }
}

/// Parses a sitemap document.
///
/// The root must be `<urlset>` or `<sitemapindex>` (namespace prefixes are
/// ignored). At most `max_urls` entries are retained; the rest are still
/// validated and counted. Malformed XML after the root element ends parsing
/// with a validation error and keeps what was read so far.
///
/// # Errors
///
/// Returns an error when the document is empty, malformed before the root
/// element, or has an unexpected root.
pub fn parse_sitemap_xml(
    xml: &str,
    max_urls: usize,
    now: DateTime<Utc>,
) -> anyhow::Result<ParsedSitemap> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut kind: Option<SitemapKind> = None;
    let mut entries: Vec<SitemapEntry> = Vec::new();
    let mut children: Vec<SitemapReference> = Vec::new();
    let mut acc = Accumulator::new(now);

    let mut current: Option<SitemapEntry> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                let message = format!(
                    "XML parse error at position {}: {}",
                    reader.error_position(),
                    e
                );
                if kind.is_none() {
                    return Err(anyhow::anyhow!(message));
                }
                acc.validation.record(IssueLevel::Error, "", message);
                break;
            }
        };

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let local = e.local_name();
                let name = local.as_ref();
                match kind {
                    None => {
                        kind = match name {
                            b"urlset" => Some(SitemapKind::UrlSet),
                            b"sitemapindex" => Some(SitemapKind::SitemapIndex),
                            other => {
                                return Err(anyhow::anyhow!(
                                    "Unexpected root element <{}>",
                                    String::from_utf8_lossy(other)
                                ))
                            }
                        };
                    }
                    Some(root) => {
                        let opens_entry = matches!(
                            (root, name),
                            (SitemapKind::UrlSet, b"url") | (SitemapKind::SitemapIndex, b"sitemap")
                        );
                        if opens_entry {
                            current = Some(SitemapEntry::default());
                            field = None;
                            if is_empty {
                                finish_entry(
                                    root,
                                    current.take(),
                                    max_urls,
                                    &mut entries,
                                    &mut children,
                                    &mut acc,
                                );
                            }
                        } else if current.is_some() && !is_empty {
                            field = Field::from_name(name);
                            text.clear();
                        }
                    }
                }
            }
            Event::Text(ref t) => {
                if field.is_some() {
                    let decoded = t
                        .unescape()
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                    text.push_str(&decoded);
                }
            }
            Event::CData(ref c) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(c.as_ref()));
                }
            }
            Event::End(ref e) => {
                let local = e.local_name();
                let name = local.as_ref();
                let closing_field = field.filter(|f| Field::from_name(name) == Some(*f));
                if let (Some(f), Some(entry)) = (closing_field, current.as_mut()) {
                    let value = text.trim().to_string();
                    match f {
                        Field::Loc => entry.loc = value,
                        Field::Lastmod => entry.lastmod = Some(value),
                        Field::Changefreq => entry.changefreq = Some(value),
                        Field::Priority => entry.priority = Some(value),
                    }
                    field = None;
                    text.clear();
                } else if let Some(root) = kind {
                    let closes_entry = matches!(
                        (root, name),
                        (SitemapKind::UrlSet, b"url") | (SitemapKind::SitemapIndex, b"sitemap")
                    );
                    if closes_entry {
                        finish_entry(
                            root,
                            current.take(),
                            max_urls,
                            &mut entries,
                            &mut children,
                            &mut acc,
                        );
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let kind = kind.ok_or_else(|| anyhow::anyhow!("Empty sitemap document"))?;
    let (mut statistics, validation) = acc.finish();
    statistics.truncated = statistics.total_urls > entries.len() && kind == SitemapKind::UrlSet;

    Ok(ParsedSitemap {
        kind,
        entries,
        children,
        statistics,
        validation,
    })
}

fn finish_entry(
    root: SitemapKind,
    entry: Option<SitemapEntry>,
    max_urls: usize,
    entries: &mut Vec<SitemapEntry>,
    children: &mut Vec<SitemapReference>,
    acc: &mut Accumulator,
) {
    let Some(entry) = entry else {
        return;
    };
    match root {
        SitemapKind::UrlSet => {
            acc.observe_entry(&entry);
            if entries.len() < max_urls {
                entries.push(entry);
            }
        }
        SitemapKind::SitemapIndex => {
            let reference = SitemapReference {
                loc: entry.loc,
                lastmod: entry.lastmod,
            };
            acc.observe_reference(&reference);
            children.push(reference);
        }
    }
}
