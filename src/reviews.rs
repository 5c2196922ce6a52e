//! Review extraction.
//!
//! Three sources are tried in fixed order: the review-listing API (behind a
//! scraped anti-forgery token), the page's embedded state JSON, and finally
//! the raw review markup. The first source yielding anything wins; sets are
//! never merged across sources. Every tier caps at ten reviews and feeds
//! through the same normalization.

use chrono::{DateTime, Local, NaiveDateTime};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::config::{ACCEPT_LANGUAGE, MAPS_HOME_URL, ORG_BASE_URL, REVIEWS_API_URL};
use crate::fetch::Fetch;
use crate::report::Review;
use crate::state;
use crate::text;

/// Hard cap on extracted reviews
pub const MAX_REVIEWS: usize = 10;

/// Placeholder author for reviews without one
const ANONYMOUS: &str = "Аноним";

/// Placeholder body for reviews without text
const NO_TEXT: &str = "Без текста";

static CSRF_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""csrfToken":"([^"]+)""#).expect("Invalid csrf token regex"));

/// One review block: from its opening marker up to the next actions/card marker
static REVIEW_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)<div\s+class="business-review-view"[^>]*itemProp="review"[^>]*>(.*?)(?:<div\s+class="business-review-view__actions"|<div\s+class="business-reviews-card-view__review")"#,
    )
    .expect("Invalid review block regex")
});

static AUTHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<span\s+itemProp="name"[^>]*>(.*?)</span>"#).expect("Invalid author regex"));

static RATING_META_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<meta\s+itemProp="ratingValue"\s+content="(\d+\.?\d*)""#)
        .expect("Invalid rating meta regex")
});

static SPOILER_TEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<div[^>]*class="[^"]*spoiler-view__text[^"]*"[^>]*>(.*?)</div>"#)
        .expect("Invalid spoiler text regex")
});

static DATE_META_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<meta\s+itemProp="datePublished"\s+content="([^"]+)""#)
        .expect("Invalid date meta regex")
});

/// How a review date is rendered; the API gives day precision, the page
/// sources a full timestamp.
#[derive(Clone, Copy)]
enum DateStyle {
    Date,
    DateTime,
}

/// Extract up to ten reviews for an organization.
///
/// Tier order: API, embedded state JSON, raw markup. A tier that fails or
/// comes back empty hands over to the next; an empty final result is still
/// a success.
pub fn extract(fetch: &dyn Fetch, org_id: &str, html: &str) -> Vec<Review> {
    let reviews = from_api(fetch, org_id);
    if !reviews.is_empty() {
        info!("reviews: {} via api", reviews.len());
        return reviews;
    }

    let reviews = from_state(html);
    if !reviews.is_empty() {
        info!("reviews: {} via state blob", reviews.len());
        return reviews;
    }

    let reviews = from_markup(html);
    if reviews.is_empty() {
        warn!("reviews: all tiers came back empty");
    } else {
        info!("reviews: {} via markup", reviews.len());
    }
    reviews
}

// --- tier A: authenticated API ---------------------------------------------

/// Fetch reviews from the listing API, newest first.
pub fn from_api(fetch: &dyn Fetch, org_id: &str) -> Vec<Review> {
    let token = csrf_token(fetch);
    let url = format!(
        "{}?oid={}&page=1&pageSize={}&businessReviews=1&ranking=by_time",
        REVIEWS_API_URL, org_id, MAX_REVIEWS
    );
    let referer = format!("{}{}", ORG_BASE_URL, org_id);

    let headers = [
        ("Accept", "application/json, text/javascript, */*; q=0.01"),
        ("Accept-Language", ACCEPT_LANGUAGE),
        ("Content-Type", "application/json"),
        ("X-Requested-With", "XMLHttpRequest"),
        ("Referer", referer.as_str()),
        ("X-Csrf-Token", token.as_str()),
    ];

    let response = match fetch.get(&url, &headers) {
        Ok(response) if response.is_success() => response,
        Ok(response) => {
            warn!("review api returned status {}", response.status);
            return Vec::new();
        }
        Err(e) => {
            warn!("review api request failed: {}", e);
            return Vec::new();
        }
    };

    let data: Value = match serde_json::from_str(&response.body) {
        Ok(data) => data,
        Err(e) => {
            warn!("review api returned unparseable body: {}", e);
            return Vec::new();
        }
    };

    match data.pointer("/data/reviews").and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .take(MAX_REVIEWS)
            .map(|item| normalize_item(item, DateStyle::Date))
            .collect(),
        None => Vec::new(),
    }
}

/// Scrape the short-lived anti-forgery token off the maps landing page.
/// Best effort: the API call goes out with an empty token when this fails.
fn csrf_token(fetch: &dyn Fetch) -> String {
    match fetch.get(MAPS_HOME_URL, &[]) {
        Ok(response) => match CSRF_TOKEN_RE.captures(&response.body) {
            Some(caps) => caps[1].to_string(),
            None => {
                debug!("no csrf token on landing page");
                String::new()
            }
        },
        Err(e) => {
            warn!("csrf token fetch failed: {}", e);
            String::new()
        }
    }
}

// --- tier B: embedded state JSON -------------------------------------------

/// Read reviews out of the page's inline state blob.
///
/// The blob nests them under `views` or, on other renders, under `stack`;
/// within either, several shapes occur. Entries are visited in document
/// order and accumulation stops at the cap.
pub fn from_state(html: &str) -> Vec<Review> {
    let state = match state::parse_state(html) {
        Some(state) => state,
        None => return Vec::new(),
    };

    let mut reviews = Vec::new();

    for view in state::views(&state) {
        collect_items(view.pointer("/businessReviews/items"), &mut reviews);
        collect_items(view.pointer("/reviews/items"), &mut reviews);
        if reviews.len() >= MAX_REVIEWS {
            return reviews;
        }
    }

    if reviews.is_empty() {
        for entry in state::stack(&state) {
            collect_items(entry.pointer("/businessReviews/items"), &mut reviews);
            collect_items(entry.pointer("/reviewResults/reviews"), &mut reviews);
            collect_items(entry.pointer("/reviews/items"), &mut reviews);
            if reviews.len() >= MAX_REVIEWS {
                return reviews;
            }
        }
    }

    reviews
}

fn collect_items(items: Option<&Value>, out: &mut Vec<Review>) {
    let items = match items.and_then(Value::as_array) {
        Some(items) => items,
        None => return,
    };

    for item in items {
        if out.len() >= MAX_REVIEWS {
            return;
        }
        out.push(normalize_item(item, DateStyle::DateTime));
    }
}

// --- tier C: raw markup ----------------------------------------------------

/// Scan repeated review fragments straight out of the markup.
pub fn from_markup(html: &str) -> Vec<Review> {
    let mut reviews = Vec::new();

    for caps in REVIEW_BLOCK_RE.captures_iter(html) {
        if reviews.len() >= MAX_REVIEWS {
            break;
        }
        let fragment = &caps[1];

        let author = AUTHOR_RE
            .captures(fragment)
            .map(|c| text::clean_fragment(&c[1]))
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| ANONYMOUS.to_string());

        let rating = RATING_META_RE
            .captures(fragment)
            .and_then(|c| c[1].parse::<f64>().ok())
            .map(|r| r.round() as u8)
            .unwrap_or(5);

        let body = SPOILER_TEXT_RE
            .captures(fragment)
            .map(|c| text::clean_fragment(&c[1]))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| NO_TEXT.to_string());

        let date = DATE_META_RE
            .captures(fragment)
            .and_then(|c| parse_timestamp(&c[1]))
            .unwrap_or_else(now_local);

        reviews.push(Review {
            author,
            rating,
            text: body,
            date: render_date(date, DateStyle::DateTime),
        });
    }

    reviews
}

// --- normalization ---------------------------------------------------------

/// Normalize one JSON review entry (API and state blob share the shape).
fn normalize_item(item: &Value, style: DateStyle) -> Review {
    let author = item
        .pointer("/author/name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string();

    let rating = item
        .get("rating")
        .and_then(state::scalar_to_f64)
        .map(|r| r as u8)
        .unwrap_or(5);

    let body = item
        .get("text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(NO_TEXT)
        .to_string();

    let date = item
        .get("updatedTime")
        .or_else(|| item.get("createdTime"))
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .unwrap_or_else(now_local);

    Review {
        author,
        rating,
        text: body,
        date: render_date(date, style),
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Local).naive_local());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok()
}

fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

fn render_date(date: NaiveDateTime, style: DateStyle) -> String {
    match style {
        DateStyle::Date => date.format("%Y-%m-%d").to_string(),
        DateStyle::DateTime => date.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OtzyvError;
    use crate::fetch::Response;

    /// Routes the landing page and the review API to canned responses
    struct StubFetch {
        api_status: u16,
        api_body: String,
    }

    impl StubFetch {
        fn api(body: &str) -> Self {
            Self {
                api_status: 200,
                api_body: body.to_string(),
            }
        }
    }

    impl Fetch for StubFetch {
        fn get(&self, url: &str, headers: &[(&str, &str)]) -> crate::error::Result<Response> {
            if url.starts_with(REVIEWS_API_URL) {
                // The token scraped from the landing page must ride along
                assert!(headers.iter().any(|(k, _)| *k == "X-Csrf-Token"));
                return Ok(Response {
                    status: self.api_status,
                    url: url.to_string(),
                    body: self.api_body.clone(),
                });
            }
            Ok(Response {
                status: 200,
                url: url.to_string(),
                body: r#"<script>{"csrfToken":"tok123:456"}</script>"#.to_string(),
            })
        }
    }

    struct FailingFetch;

    impl Fetch for FailingFetch {
        fn get(&self, _url: &str, _headers: &[(&str, &str)]) -> crate::error::Result<Response> {
            Err(OtzyvError::Upstream("offline".to_string()))
        }
    }

    const API_BODY: &str = r#"{"data":{"reviews":[
        {"author":{"name":"Иван"},"rating":5,"text":"Отлично","updatedTime":"2024-03-01T12:00:00+03:00"},
        {"author":{"name":"Мария"},"rating":4,"text":"  Неплохо  ","createdTime":"2024-02-15T12:00:00+03:00"},
        {"rating":3,"text":""}
    ]}}"#;

    #[test]
    fn test_api_tier_normalizes() {
        let stub = StubFetch::api(API_BODY);
        let reviews = from_api(&stub, "123456789");

        assert_eq!(reviews.len(), 3);
        assert_eq!(reviews[0].author, "Иван");
        assert_eq!(reviews[0].rating, 5);
        assert!(reviews[0].date.starts_with("2024-0"));
        assert_eq!(reviews[1].text, "Неплохо");
        assert_eq!(reviews[2].author, ANONYMOUS);
        assert_eq!(reviews[2].text, NO_TEXT);
    }

    #[test]
    fn test_api_tier_caps_at_ten() {
        let entries: Vec<String> = (0..15)
            .map(|i| format!(r#"{{"author":{{"name":"u{}"}},"rating":5,"text":"t"}}"#, i))
            .collect();
        let body = format!(r#"{{"data":{{"reviews":[{}]}}}}"#, entries.join(","));
        let stub = StubFetch::api(&body);

        assert_eq!(from_api(&stub, "1").len(), MAX_REVIEWS);
    }

    #[test]
    fn test_api_tier_error_status_is_empty() {
        let stub = StubFetch {
            api_status: 403,
            api_body: r#"{"error":"forbidden"}"#.to_string(),
        };
        assert!(from_api(&stub, "1").is_empty());
    }

    #[test]
    fn test_api_tier_network_failure_is_empty() {
        assert!(from_api(&FailingFetch, "1").is_empty());
    }

    #[test]
    fn test_state_tier_views() {
        let html = r#"<script class="state-view">{"views":{"v":{"businessReviews":{"items":[
            {"author":{"name":"Пётр"},"rating":4,"text":"Хорошо","updatedTime":"2024-01-10T12:00:00+03:00"}
        ]}}}}</script>"#;
        let reviews = from_state(html);

        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].author, "Пётр");
        assert_eq!(reviews[0].rating, 4);
        assert!(reviews[0].date.starts_with("2024-01"));
    }

    #[test]
    fn test_state_tier_stack_review_results() {
        let html = r#"<script class="state-view">{"stack":[{"reviewResults":{"reviews":[
            {"author":{"name":"Ольга"},"rating":5,"text":"Супер"}
        ]}}]}</script>"#;
        let reviews = from_state(html);

        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].author, "Ольга");
    }

    #[test]
    fn test_state_tier_stack_ignored_when_views_yield() {
        let html = r#"<script class="state-view">{
            "views":{"v":{"reviews":{"items":[{"author":{"name":"A"},"text":"a"}]}}},
            "stack":[{"reviews":{"items":[{"author":{"name":"B"},"text":"b"}]}}]
        }</script>"#;
        let reviews = from_state(html);

        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].author, "A");
    }

    #[test]
    fn test_state_tier_caps_across_sources() {
        let items: Vec<String> = (0..8)
            .map(|i| format!(r#"{{"author":{{"name":"u{}"}},"text":"t"}}"#, i))
            .collect();
        let list = items.join(",");
        let html = format!(
            r#"<script class="state-view">{{"views":{{"v":{{"businessReviews":{{"items":[{}]}},"reviews":{{"items":[{}]}}}}}}}}</script>"#,
            list, list
        );
        assert_eq!(from_state(&html).len(), MAX_REVIEWS);
    }

    #[test]
    fn test_markup_tier() {
        let html = r#"
            <div class="business-review-view" itemProp="review">
                <span itemProp="name">Анна К.</span>
                <meta itemProp="ratingValue" content="4.5">
                <div class="spoiler-view__text">Очень  <b>вкусно</b> и уютно,
                рекомендую</div>
                <meta itemProp="datePublished" content="2024-04-20T12:30:00+03:00">
            <div class="business-review-view__actions"></div>
            <div class="business-review-view" itemProp="review">
                <meta itemProp="ratingValue" content="2">
            <div class="business-reviews-card-view__review">
        "#;
        let reviews = from_markup(html);

        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].author, "Анна К.");
        assert_eq!(reviews[0].rating, 5); // 4.5 rounds up
        assert_eq!(reviews[0].text, "Очень вкусно и уютно, рекомендую");
        assert!(reviews[0].date.starts_with("2024-04-20"));
        assert_eq!(reviews[1].author, ANONYMOUS);
        assert_eq!(reviews[1].rating, 2);
        assert_eq!(reviews[1].text, NO_TEXT);
    }

    #[test]
    fn test_markup_tier_absent_is_empty() {
        assert!(from_markup("<html><body></body></html>").is_empty());
    }

    #[test]
    fn test_tier_order_api_wins() {
        let stub = StubFetch::api(API_BODY);
        let html = r#"<script class="state-view">{"views":{"v":{"reviews":{"items":[{"author":{"name":"B"},"text":"b"}]}}}}</script>"#;
        let reviews = extract(&stub, "1", html);

        assert_eq!(reviews[0].author, "Иван");
    }

    #[test]
    fn test_tier_order_falls_to_state_then_markup() {
        let stub = StubFetch {
            api_status: 403,
            api_body: String::new(),
        };

        let state_html = r#"<script class="state-view">{"views":{"v":{"reviews":{"items":[{"author":{"name":"B"},"text":"b"}]}}}}</script>"#;
        assert_eq!(extract(&stub, "1", state_html)[0].author, "B");

        let markup_html = r#"<div class="business-review-view" itemProp="review"><span itemProp="name">C</span><div class="business-review-view__actions">"#;
        assert_eq!(extract(&stub, "1", markup_html)[0].author, "C");

        assert!(extract(&stub, "1", "<html></html>").is_empty());
    }
}
