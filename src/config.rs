/// Base URL for organization pages.
pub const ORG_BASE_URL: &str = "https://yandex.ru/maps/org/";

/// Landing page scraped for the anti-forgery token.
pub const MAPS_HOME_URL: &str = "https://yandex.ru/maps/";

/// Review listing API endpoint.
pub const REVIEWS_API_URL: &str = "https://yandex.ru/maps/api/business/fetch_reviews";

/// Accept-Language sent with every browser-mimicking request.
pub const ACCEPT_LANGUAGE: &str = "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7";

/// Immutable HTTP configuration handed to the fetcher at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// User agent sent with every outbound request
    pub user_agent: String,
    /// Global request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            timeout_secs: 30,
        }
    }
}
