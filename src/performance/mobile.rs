//! Mobile-friendliness heuristics from static markup.

use scraper::Html;
use serde::{Deserialize, Serialize};

use crate::config::MOBILE_FRIENDLY_THRESHOLD;
use crate::models::{Impact, Recommendation};
use crate::utils::{clamp_score, parse_selector_with_fallback};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MobileReport {
    pub has_viewport: bool,
    pub viewport_content: Option<String>,
    pub width_device_width: bool,
    pub has_initial_scale: bool,
    pub zoom_disabled: bool,
    pub media_query_count: usize,
    pub image_count: usize,
    pub responsive_image_count: usize,
    pub responsive_image_ratio: f64,
    pub mobile_score: u8,
    pub is_mobile_friendly: bool,
}

/// `key=value` pairs of a viewport `content` attribute, keys lower-cased.
fn viewport_pairs(content: &str) -> Vec<(String, String)> {
    content
        .split([',', ';'])
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((k.trim().to_ascii_lowercase(), v.trim().to_ascii_lowercase()))
        })
        .collect()
}

fn disables_zoom(pairs: &[(String, String)]) -> bool {
    pairs.iter().any(|(k, v)| match k.as_str() {
        "user-scalable" => v == "no" || v == "0",
        "maximum-scale" => v.parse::<f64>().map(|m| m <= 1.0).unwrap_or(false),
        _ => false,
    })
}

fn count_media_queries(document: &Html) -> usize {
    let styles = parse_selector_with_fallback("style", "mobile media queries");
    let inline: usize = document
        .select(&styles)
        .map(|s| s.text().collect::<String>().to_ascii_lowercase().matches("@media").count())
        .sum();
    let links = parse_selector_with_fallback("link[media]", "mobile media links");
    let linked = document
        .select(&links)
        .filter(|l| l.value().attr("media").map(|m| m.contains('(')).unwrap_or(false))
        .count();
    inline + linked
}

/// Viewport 30, device-width 20, initial-scale 10, zoom allowed 10, any media
/// query 15, responsive image ratio x 15 (full credit without images).
fn mobile_score(report: &MobileReport) -> u8 {
    let mut score = 0.0;
    if report.has_viewport {
        score += 30.0;
        if report.width_device_width {
            score += 20.0;
        }
        if report.has_initial_scale {
            score += 10.0;
        }
        if !report.zoom_disabled {
            score += 10.0;
        }
    }
    if report.media_query_count > 0 {
        score += 15.0;
    }
    score += 15.0 * report.responsive_image_ratio;
    clamp_score(score)
}

pub fn analyze_mobile(html: &str) -> MobileReport {
    let document = Html::parse_document(html);

    let viewport_selector = parse_selector_with_fallback("meta[name][content]", "mobile viewport");
    let viewport_content = document
        .select(&viewport_selector)
        .find(|m| {
            m.value()
                .attr("name")
                .map(|n| n.trim().eq_ignore_ascii_case("viewport"))
                .unwrap_or(false)
        })
        .and_then(|m| m.value().attr("content"))
        .map(|c| c.trim().to_string());
    let pairs = viewport_content.as_deref().map(viewport_pairs).unwrap_or_default();

    let images = parse_selector_with_fallback("img", "mobile images");
    let (image_count, responsive_image_count) =
        document.select(&images).fold((0, 0), |(total, responsive), img| {
            let is_responsive =
                img.value().attr("srcset").is_some() || img.value().attr("sizes").is_some();
            (total + 1, responsive + usize::from(is_responsive))
        });

    let mut report = MobileReport {
        has_viewport: viewport_content.is_some(),
        width_device_width: pairs
            .iter()
            .any(|(k, v)| k == "width" && v == "device-width"),
        has_initial_scale: pairs.iter().any(|(k, _)| k == "initial-scale"),
        zoom_disabled: disables_zoom(&pairs),
        viewport_content,
        media_query_count: count_media_queries(&document),
        image_count,
        responsive_image_count,
        responsive_image_ratio: if image_count == 0 {
            1.0
        } else {
            responsive_image_count as f64 / image_count as f64
        },
        ..Default::default()
    };
    report.mobile_score = mobile_score(&report);
    report.is_mobile_friendly = report.mobile_score >= MOBILE_FRIENDLY_THRESHOLD;
    report
}

pub fn mobile_recommendations(report: &MobileReport) -> Vec<Recommendation> {
    let mut recs = Vec::new();
    if !report.has_viewport {
        recs.push(Recommendation::error(
            Impact::High,
            "Missing viewport meta tag",
            "Add <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">",
        ));
    } else {
        if !report.width_device_width {
            recs.push(Recommendation::warning(
                Impact::High,
                "Viewport does not use width=device-width",
                "Set width=device-width in the viewport meta tag",
            ));
        }
        if report.zoom_disabled {
            recs.push(Recommendation::warning(
                Impact::Medium,
                "Viewport disables user zoom",
                "Remove user-scalable=no and maximum-scale=1 from the viewport",
            ));
        }
    }
    if report.media_query_count == 0 {
        recs.push(Recommendation::info(
            Impact::Medium,
            "No CSS media queries found",
            "Use media queries to adapt the layout to small screens",
        ));
    }
    if report.image_count > 0 && report.responsive_image_ratio < 0.5 {
        recs.push(Recommendation::info(
            Impact::Medium,
            format!(
                "Only {} of {} images are responsive",
                report.responsive_image_count, report.image_count
            ),
            "Serve images with srcset and sizes",
        ));
    }
    recs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fully_mobile_friendly_page() {
        let html = r#"<html><head>
            <meta name="viewport" content="width=device-width, initial-scale=1">
            <style>@media (max-width: 600px) { body { font-size: 14px } }</style>
            </head><body><img src="a.png" srcset="a-2x.png 2x"></body></html>"#;
        let report = analyze_mobile(html);
        assert!(report.width_device_width);
        assert!(report.has_initial_scale);
        assert!(!report.zoom_disabled);
        assert_eq!(report.media_query_count, 1);
        assert_eq!(report.mobile_score, 100);
        assert!(report.is_mobile_friendly);
        assert!(mobile_recommendations(&report).is_empty());
    }

    #[test]
    fn test_no_viewport_is_not_friendly() {
        let report = analyze_mobile("<html><body><img src=a.png><img src=b.png></body></html>");
        assert!(!report.has_viewport);
        assert_eq!(report.responsive_image_ratio, 0.0);
        assert_eq!(report.mobile_score, 0);
        assert!(!report.is_mobile_friendly);
        assert!(mobile_recommendations(&report)
            .iter()
            .any(|r| r.message == "Missing viewport meta tag"));
    }

    #[test]
    fn test_zoom_disabled_and_threshold() {
        let html = r#"<meta name="viewport" content="width=device-width, initial-scale=1, user-scalable=no">"#;
        let report = analyze_mobile(html);
        assert!(report.zoom_disabled);
        // 30 + 20 + 10 + 0 media + 15 (no images)
        assert_eq!(report.mobile_score, 75);
        assert!(report.is_mobile_friendly);
    }

    #[test]
    fn test_linked_media_queries_counted() {
        let html = r#"<link rel="stylesheet" media="(max-width: 800px)" href="m.css"><link rel="stylesheet" media="print" href="p.css">"#;
        assert_eq!(analyze_mobile(html).media_query_count, 1);
    }
}
