//! Field extractors over the fetched organization page.
//!
//! Each field runs its own cascade of independent heuristics against the
//! raw page text. The first hit wins; later sources are not consulted even
//! when they might be fresher, matching how the page itself prioritizes its
//! redundant copies. A total miss resolves to the field's documented
//! default, never an error.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::cascade::{first_match, Strategy};
use crate::state;

/// Placeholder when no strategy can name the company
pub const UNKNOWN_COMPANY: &str = "Неизвестная компания";

/// Size substituted into the state blob's photo url template
const PHOTO_SIZE: &str = "400x300";

/// Split-span summary badge: integer span, separator span, fraction span
static SUMMARY_BADGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)<span\s+class="business-summary-rating-badge-view__rating-text">(\d+)</span>\s*<span[^>]*>[,.]?\s*</span>\s*<span[^>]*>(\d+)</span>"#,
    )
    .expect("Invalid summary badge regex")
});

static BADGE_COMMA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<span\s+class="[^"]*business-rating-badge-view__rating-text[^"]*"[^>]*>(\d+),(\d+)</span>"#)
        .expect("Invalid comma badge regex")
});

static BADGE_DOT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<span\s+class="[^"]*business-rating-badge-view__rating-text[^"]*"[^>]*>(\d+)\.(\d+)</span>"#)
        .expect("Invalid dot badge regex")
});

static LOOSE_RATING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""ratingValue":\s*(\d+\.?\d*)"#).expect("Invalid loose rating regex"));

static AMOUNT_VIEW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<span\s+class="business-rating-amount-view[^"]*"[^>]*>(\d+)\s+оцен"#)
        .expect("Invalid amount view regex")
});

static HEADER_RATING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<div\s+class="[^"]*business-header-rating-view__text[^"]*"[^>]*>(\d+)\s+оцен"#)
        .expect("Invalid header rating regex")
});

static LOOSE_COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""ratingCount":\s*(\d+)"#).expect("Invalid loose count regex"));

static LOOSE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""name"\s*:\s*"([^"]+)""#).expect("Invalid loose name regex"));

static LOOSE_IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""image"\s*:\s*"([^"]+)""#).expect("Invalid loose image regex"));

/// Page titles end in the site suffix; a title without it is not trusted
static TITLE_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)\s*—\s*Яндекс\s*Карты$").expect("Invalid title suffix regex"));

static OG_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*—\s*Яндекс\s*Карты.*$").expect("Invalid og suffix regex"));

static BG_IMAGE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"background-image:\s*url\(([^)]+)\)").expect("Invalid background image regex")
});

static RATING_STRATEGIES: &[Strategy<f64>] = &[
    Strategy {
        name: "meta-rating-value",
        run: rating_from_meta,
    },
    Strategy {
        name: "summary-badge",
        run: rating_from_summary_badge,
    },
    Strategy {
        name: "badge-comma",
        run: rating_from_badge_comma,
    },
    Strategy {
        name: "badge-dot",
        run: rating_from_badge_dot,
    },
    Strategy {
        name: "state-blob",
        run: rating_from_state,
    },
    Strategy {
        name: "loose-json",
        run: rating_from_loose_json,
    },
];

static COUNT_STRATEGIES: &[Strategy<u32>] = &[
    Strategy {
        name: "meta-rating-count",
        run: count_from_meta,
    },
    Strategy {
        name: "amount-view",
        run: count_from_amount_view,
    },
    Strategy {
        name: "header-view",
        run: count_from_header_view,
    },
    Strategy {
        name: "state-blob",
        run: count_from_state,
    },
    Strategy {
        name: "loose-json",
        run: count_from_loose_json,
    },
    Strategy {
        name: "meta-review-count",
        run: count_from_review_count_meta,
    },
];

static NAME_STRATEGIES: &[Strategy<String>] = &[
    Strategy {
        name: "heading",
        run: name_from_heading,
    },
    Strategy {
        name: "title",
        run: name_from_title,
    },
    Strategy {
        name: "loose-json",
        run: name_from_loose_json,
    },
    Strategy {
        name: "og-title",
        run: name_from_og_title,
    },
];

static PHOTO_STRATEGIES: &[Strategy<String>] = &[
    Strategy {
        name: "carousel",
        run: photo_from_carousel,
    },
    Strategy {
        name: "card-background",
        run: photo_from_card,
    },
    Strategy {
        name: "og-image",
        run: photo_from_og,
    },
    Strategy {
        name: "loose-json",
        run: photo_from_loose_json,
    },
    Strategy {
        name: "state-blob",
        run: photo_from_state,
    },
];

/// Aggregate rating, 0.0 when no strategy matches.
pub fn rating(html: &str) -> f64 {
    first_match("rating", html, RATING_STRATEGIES).unwrap_or(0.0)
}

/// Total rating count, 0 when no strategy matches.
pub fn review_count(html: &str) -> u32 {
    first_match("review-count", html, COUNT_STRATEGIES).unwrap_or(0)
}

/// Company name, placeholder when no strategy matches.
pub fn company_name(html: &str) -> String {
    first_match("company-name", html, NAME_STRATEGIES).unwrap_or_else(|| UNKNOWN_COMPANY.to_string())
}

/// Company photo URL, absent when no strategy matches.
/// Protocol-relative results are normalized to https.
pub fn company_photo(html: &str) -> Option<String> {
    first_match("company-photo", html, PHOTO_STRATEGIES).map(ensure_https)
}

// --- DOM helpers -----------------------------------------------------------

/// Text of the first element matching a CSS selector, entity-decoded by the
/// parser, trimmed, empty filtered out.
fn select_text(html: &str, selector: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(selector).ok()?;
    let element = document.select(&selector).next()?;
    let joined = element.text().collect::<Vec<_>>().join("");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Attribute of the first element matching a CSS selector.
fn select_attr(html: &str, selector: &str, attr: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(selector).ok()?;
    let value = document.select(&selector).next()?.value().attr(attr)?;
    Some(value.to_string())
}

/// Unescape a raw JSON string fragment captured out of loose page text.
fn json_unescape(raw: &str) -> Option<String> {
    serde_json::from_str(&format!("\"{}\"", raw)).ok()
}

fn ensure_https(url: String) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => url,
    }
}

// --- rating ----------------------------------------------------------------

fn rating_from_meta(html: &str) -> Option<f64> {
    select_attr(html, r#"meta[itemprop="ratingValue"]"#, "content")?.parse().ok()
}

fn rating_from_summary_badge(html: &str) -> Option<f64> {
    let caps = SUMMARY_BADGE_RE.captures(html)?;
    format!("{}.{}", &caps[1], &caps[2]).parse().ok()
}

fn rating_from_badge_comma(html: &str) -> Option<f64> {
    let caps = BADGE_COMMA_RE.captures(html)?;
    format!("{}.{}", &caps[1], &caps[2]).parse().ok()
}

fn rating_from_badge_dot(html: &str) -> Option<f64> {
    let caps = BADGE_DOT_RE.captures(html)?;
    format!("{}.{}", &caps[1], &caps[2]).parse().ok()
}

fn rating_from_state(html: &str) -> Option<f64> {
    let state = state::parse_state(html)?;
    state::scalar_to_f64(state.pointer("/stack/0/results/items/0/ratingData/ratingValue")?)
}

fn rating_from_loose_json(html: &str) -> Option<f64> {
    LOOSE_RATING_RE.captures(html)?[1].parse().ok()
}

// --- review count ----------------------------------------------------------

fn count_from_meta(html: &str) -> Option<u32> {
    select_attr(html, r#"meta[itemprop="ratingCount"]"#, "content")?.parse().ok()
}

fn count_from_amount_view(html: &str) -> Option<u32> {
    AMOUNT_VIEW_RE.captures(html)?[1].parse().ok()
}

fn count_from_header_view(html: &str) -> Option<u32> {
    HEADER_RATING_RE.captures(html)?[1].parse().ok()
}

fn count_from_state(html: &str) -> Option<u32> {
    let state = state::parse_state(html)?;
    let value =
        state::scalar_to_f64(state.pointer("/stack/0/results/items/0/ratingData/ratingCount")?)?;
    Some(value as u32)
}

fn count_from_loose_json(html: &str) -> Option<u32> {
    LOOSE_COUNT_RE.captures(html)?[1].parse().ok()
}

fn count_from_review_count_meta(html: &str) -> Option<u32> {
    select_attr(html, r#"meta[itemprop="reviewCount"]"#, "content")?.parse().ok()
}

// --- company name ----------------------------------------------------------

fn name_from_heading(html: &str) -> Option<String> {
    select_text(html, "h1.orgpage-header-view__header")
}

fn name_from_title(html: &str) -> Option<String> {
    let title = select_text(html, "title")?;
    let caps = TITLE_SUFFIX_RE.captures(&title)?;
    let name = caps[1].trim().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn name_from_loose_json(html: &str) -> Option<String> {
    let raw = &LOOSE_NAME_RE.captures(html)?[1];
    json_unescape(raw).filter(|name| !name.trim().is_empty())
}

fn name_from_og_title(html: &str) -> Option<String> {
    let raw = select_attr(html, r#"meta[property="og:title"]"#, "content")?;
    let name = OG_SUFFIX_RE.replace(&raw, "").trim().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

// --- company photo ---------------------------------------------------------

fn photo_from_carousel(html: &str) -> Option<String> {
    select_attr(html, "img.business-photos-carousel-view__image", "src")
}

fn photo_from_card(html: &str) -> Option<String> {
    let style = select_attr(html, "div.business-card-photo-view__image", "style")?;
    let caps = BG_IMAGE_URL_RE.captures(&style)?;
    Some(caps[1].trim_matches(|c| c == '\'' || c == '"').to_string())
}

fn photo_from_og(html: &str) -> Option<String> {
    select_attr(html, r#"meta[property="og:image"]"#, "content")
}

fn photo_from_loose_json(html: &str) -> Option<String> {
    let raw = &LOOSE_IMAGE_RE.captures(html)?[1];
    json_unescape(raw)
}

/// The state blob carries photos as size-templated URLs
fn photo_from_state(html: &str) -> Option<String> {
    let state = state::parse_state(html)?;

    for entry in state::views(&state).into_iter().chain(state::stack(&state)) {
        if let Some(template) = entry
            .pointer("/photos/items/0/urlTemplate")
            .and_then(|v| v.as_str())
        {
            return Some(template.replace("%{size}", PHOTO_SIZE));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_from_meta() {
        let html = r#"<html><head><meta itemProp="ratingValue" content="4.8"></head></html>"#;
        assert_eq!(rating(html), 4.8);
    }

    #[test]
    fn test_rating_from_summary_badge() {
        let html = concat!(
            r#"<span class="business-summary-rating-badge-view__rating-text">4</span>"#,
            r#"<span class="business-summary-rating-badge-view__rating-separator">,</span>"#,
            r#"<span class="business-summary-rating-badge-view__rating-text">6</span>"#,
        );
        assert_eq!(rating(html), 4.6);
    }

    #[test]
    fn test_rating_from_badge_comma_and_dot() {
        let comma = r#"<span class="a business-rating-badge-view__rating-text b">4,7</span>"#;
        assert_eq!(rating(comma), 4.7);

        let dot = r#"<span class="business-rating-badge-view__rating-text">4.2</span>"#;
        assert_eq!(rating(dot), 4.2);
    }

    #[test]
    fn test_rating_from_state_blob() {
        let html = r#"<script class="state-view">{"stack":[{"results":{"items":[{"ratingData":{"ratingValue":4.9,"ratingCount":120}}]}}]}</script>"#;
        assert_eq!(rating(html), 4.9);
        assert_eq!(review_count(html), 120);
    }

    #[test]
    fn test_rating_from_loose_json() {
        let html = r#"<script>{"aggregateRating":{"ratingValue": 4.3}}</script>"#;
        assert_eq!(rating(html), 4.3);
    }

    #[test]
    fn test_rating_unknown_is_zero() {
        assert_eq!(rating("<html><body>no rating anywhere</body></html>"), 0.0);
    }

    #[test]
    fn test_meta_beats_loose_json() {
        let html = r#"<meta itemProp="ratingValue" content="4.8"><script>{"ratingValue": 1.0}</script>"#;
        assert_eq!(rating(html), 4.8);
    }

    #[test]
    fn test_count_from_meta() {
        let html = r#"<meta itemProp="ratingCount" content="57">"#;
        assert_eq!(review_count(html), 57);
    }

    #[test]
    fn test_count_from_amount_view() {
        let html = r#"<span class="business-rating-amount-view _summary">214 оценок</span>"#;
        assert_eq!(review_count(html), 214);
    }

    #[test]
    fn test_count_from_review_count_meta() {
        let html = r#"<meta itemprop="reviewCount" content="31">"#;
        assert_eq!(review_count(html), 31);
    }

    #[test]
    fn test_count_unknown_is_zero() {
        assert_eq!(review_count("<html></html>"), 0);
    }

    #[test]
    fn test_name_from_heading() {
        let html = r#"<h1 class="orgpage-header-view__header">Кафе &quot;Ромашка&quot;</h1>"#;
        assert_eq!(company_name(html), "Кафе \"Ромашка\"");
    }

    #[test]
    fn test_name_from_title_requires_suffix() {
        let html = "<title>Кафе Ромашка — Яндекс Карты</title>";
        assert_eq!(company_name(html), "Кафе Ромашка");
    }

    #[test]
    fn test_name_from_loose_json_unescapes() {
        let html = r#"<script>{"name":"Кафе & Бар"}</script>"#;
        assert_eq!(company_name(html), "Кафе & Бар");
    }

    #[test]
    fn test_name_from_og_title_strips_suffix() {
        let html = r#"<meta property="og:title" content="Бар Маяк — Яндекс Карты: отзывы">"#;
        assert_eq!(company_name(html), "Бар Маяк");
    }

    #[test]
    fn test_name_unknown_placeholder() {
        assert_eq!(company_name("<html></html>"), UNKNOWN_COMPANY);
    }

    #[test]
    fn test_photo_from_carousel() {
        let html = r#"<img class="business-photos-carousel-view__image" src="https://img.example/1.jpg">"#;
        assert_eq!(company_photo(html), Some("https://img.example/1.jpg".to_string()));
    }

    #[test]
    fn test_photo_from_card_background() {
        let html = r#"<div class="business-card-photo-view__image" style="background-image: url('//img.example/2.jpg')"></div>"#;
        assert_eq!(company_photo(html), Some("https://img.example/2.jpg".to_string()));
    }

    #[test]
    fn test_photo_from_og_image() {
        let html = r#"<meta property="og:image" content="//avatars.mds.yandex.net/get-altay/abc/XXL">"#;
        assert_eq!(
            company_photo(html),
            Some("https://avatars.mds.yandex.net/get-altay/abc/XXL".to_string())
        );
    }

    #[test]
    fn test_photo_from_state_template() {
        let html = r#"<script class="state-view">{"views":{"v1":{"photos":{"items":[{"urlTemplate":"//avatars.mds.yandex.net/get-altay/abc/%{size}"}]}}}}</script>"#;
        assert_eq!(
            company_photo(html),
            Some("https://avatars.mds.yandex.net/get-altay/abc/400x300".to_string())
        );
    }

    #[test]
    fn test_photo_unknown_is_none() {
        assert_eq!(company_photo("<html></html>"), None);
    }
}
