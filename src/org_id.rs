//! Organization-identifier extraction.
//!
//! The id is read off the URL when possible; only when every structural
//! pattern misses is the page fetched and scanned. Failure here is fatal to
//! the whole pipeline: without an id there is no page to extract from.

use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::cascade::{first_match, Strategy};
use crate::error::{OtzyvError, Result};
use crate::fetch::Fetch;

/// User-facing message for URLs nothing could be extracted from
const INVALID_URL_MESSAGE: &str = "Не удалось извлечь ID организации из URL. \
                                   Попробуйте использовать другую ссылку из Яндекс Карт.";

static ORG_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/org/[^/]*/(\d+)").expect("Invalid org path regex"));

static ORG_BARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/org/(\d+)").expect("Invalid bare org regex"));

static OID_PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]oid=(\d+)").expect("Invalid oid param regex"));

static POI_URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"poi%5Buri%5D=ymapsbm1[^&]*%3Foid%3D(\d+)").expect("Invalid poi uri regex")
});

static OID_LOOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"oid=(\d+)").expect("Invalid loose oid regex"));

/// Path segments of 10+ digits are organization ids in practice
static LONG_SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(\d{10,})(?:/|$|\?)").expect("Invalid long segment regex"));

static BUSINESS_OID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""businessOid":"?(\d+)"?"#).expect("Invalid businessOid regex"));

static OID_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""oid":"?(\d+)"?"#).expect("Invalid oid key regex"));

static OID_FLEX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"oid["']?\s*:\s*["']?(\d+)"#).expect("Invalid flexible oid regex"));

static LONG_ID_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""id":"?(\d{10,})"?"#).expect("Invalid id key regex"));

const FETCH_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    ),
    ("Accept-Language", "ru-RU,ru;q=0.9"),
];

/// Structural patterns tried against the URL string itself
static URL_STRATEGIES: &[Strategy<String>] = &[
    Strategy {
        name: "org-path",
        run: |url| capture(&ORG_PATH_RE, url),
    },
    Strategy {
        name: "org-bare",
        run: |url| capture(&ORG_BARE_RE, url),
    },
    Strategy {
        name: "oid-param",
        run: |url| capture(&OID_PARAM_RE, url),
    },
    Strategy {
        name: "poi-uri",
        run: |url| capture(&POI_URI_RE, url),
    },
    Strategy {
        name: "decoded-oid",
        run: from_decoded_url,
    },
    Strategy {
        name: "long-segment",
        run: |url| capture(&LONG_SEGMENT_RE, url),
    },
];

/// Id-shaped keys scanned in a fetched page body
static PAGE_STRATEGIES: &[Strategy<String>] = &[
    Strategy {
        name: "business-oid",
        run: |body| capture(&BUSINESS_OID_RE, body),
    },
    Strategy {
        name: "oid-key",
        run: |body| capture(&OID_KEY_RE, body),
    },
    Strategy {
        name: "oid-flexible",
        run: |body| capture(&OID_FLEX_RE, body),
    },
    Strategy {
        name: "long-id-key",
        run: |body| capture(&LONG_ID_KEY_RE, body),
    },
    Strategy {
        name: "org-path-in-body",
        run: |body| capture(&ORG_BARE_RE, body),
    },
];

fn capture(re: &Regex, input: &str) -> Option<String> {
    Some(re.captures(input)?[1].to_string())
}

fn from_decoded_url(url: &str) -> Option<String> {
    let decoded = urlencoding::decode(url).ok()?;
    capture(&OID_LOOSE_RE, &decoded)
}

/// Extract the organization id from the URL alone, without network access.
pub fn from_url(url: &str) -> Option<String> {
    first_match("org-id-url", url, URL_STRATEGIES)
}

/// Extract the organization id, fetching the page as a last resort.
///
/// Never returns an empty id: when both the URL cascade and the page scan
/// miss, the result is `InvalidUrl` with a user-facing message.
pub fn extract(fetch: &dyn Fetch, url: &str) -> Result<String> {
    if let Some(id) = from_url(url) {
        return Ok(id);
    }

    if let Some(id) = from_page(fetch, url) {
        return Ok(id);
    }

    Err(OtzyvError::InvalidUrl(INVALID_URL_MESSAGE.to_string()))
}

fn from_page(fetch: &dyn Fetch, url: &str) -> Option<String> {
    info!("fetching {} to locate the organization id", url);

    let response = match fetch.get(url, FETCH_HEADERS) {
        Ok(response) => response,
        Err(e) => {
            warn!("org id fallback fetch failed: {}", e);
            return None;
        }
    };

    first_match("org-id-page", &response.body, PAGE_STRATEGIES)
}
