//! Short-link resolution.
//!
//! Shared links come as `yandex.ru/maps/-/<token>` and have to be expanded
//! before an organization id can be read off the URL. Resolution is best
//! effort: whatever fails, the original URL is returned and the id extractor
//! gets its own chance later.

use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::cascade::{first_match, Strategy};
use crate::config::{ACCEPT_LANGUAGE, ORG_BASE_URL};
use crate::fetch::Fetch;
use crate::state;
use crate::text;

/// Precompiled regex for the short-link form
static SHORT_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"yandex\.ru/maps/-/[A-Za-z0-9]+").expect("Invalid short url regex"));

static META_REFRESH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"content="0;\s*url=([^"]+)""#).expect("Invalid meta refresh regex")
});

static JS_REDIRECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"window\.location\.href\s*=\s*["']([^"']+)["']"#)
        .expect("Invalid js redirect regex")
});

static DATA_BEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"data-bem="([^"]*)""#).expect("Invalid data-bem regex"));

static OID_JSON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""oid":"(\d+)""#).expect("Invalid oid regex"));

const RESOLVE_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", ACCEPT_LANGUAGE),
];

/// Body-level resolution strategies, tried after the redirect location itself
static BODY_STRATEGIES: &[Strategy<String>] = &[
    Strategy {
        name: "meta-refresh",
        run: from_meta_refresh,
    },
    Strategy {
        name: "js-redirect",
        run: from_js_redirect,
    },
    Strategy {
        name: "bem-data",
        run: from_bem_data,
    },
    Strategy {
        name: "oid-json",
        run: from_oid_json,
    },
];

/// True when the URL is a `yandex.ru/maps/-/<token>` short link.
pub fn is_short_url(url: &str) -> bool {
    SHORT_URL_RE.is_match(url)
}

/// Expand a short link to a canonical organization URL.
///
/// Long-form input is returned unchanged without network traffic. When no
/// strategy succeeds, or the fetch fails, the original URL is returned and
/// the failure is only logged.
pub fn resolve(fetch: &dyn Fetch, url: &str) -> String {
    if !is_short_url(url) {
        return url.to_string();
    }

    match try_resolve(fetch, url) {
        Some(resolved) => {
            info!("resolved short url to {}", resolved);
            resolved
        }
        None => {
            warn!("could not resolve short url, using original: {}", url);
            url.to_string()
        }
    }
}

fn try_resolve(fetch: &dyn Fetch, url: &str) -> Option<String> {
    let response = match fetch.get(url, RESOLVE_HEADERS) {
        Ok(response) => response,
        Err(e) => {
            warn!("short url fetch failed: {}", e);
            return None;
        }
    };

    // The effective post-redirect location wins when the server cooperated
    if !response.url.is_empty() && response.url != url {
        return Some(response.url);
    }

    first_match("short-url", &response.body, BODY_STRATEGIES)
        .map(|target| absolutize(url, &target))
}

/// Resolve a possibly relative redirect target against the short link.
fn absolutize(base: &str, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        return target.to_string();
    }

    match url::Url::parse(base).and_then(|base| base.join(target)) {
        Ok(joined) => joined.to_string(),
        Err(_) => target.to_string(),
    }
}

fn from_meta_refresh(body: &str) -> Option<String> {
    Some(META_REFRESH_RE.captures(body)?[1].to_string())
}

fn from_js_redirect(body: &str) -> Option<String> {
    Some(JS_REDIRECT_RE.captures(body)?[1].to_string())
}

/// Serp items carry their organization id inside an entity-encoded
/// `data-bem` JSON attribute.
fn from_bem_data(body: &str) -> Option<String> {
    let raw = DATA_BEM_RE.captures(body)?.get(1)?.as_str();
    let bem: Value = serde_json::from_str(&text::decode_entities(raw)).ok()?;
    let id = state::scalar_to_string(bem.pointer("/serp-item/data/properties/id")?)?;
    Some(org_url(&id))
}

fn from_oid_json(body: &str) -> Option<String> {
    Some(org_url(&OID_JSON_RE.captures(body)?[1]))
}

fn org_url(org_id: &str) -> String {
    format!("{}{}", ORG_BASE_URL, org_id)
}
